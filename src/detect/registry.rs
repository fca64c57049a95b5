use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};

use crate::config::DetectionSettings;

use super::backend::DetectorBackend;
use super::backends::StubBackend;

/// Detector backends that can be selected by name from configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Stub,
    Tract,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "stub" => Ok(Self::Stub),
            "tract" | "onnx" => Ok(Self::Tract),
            other => Err(anyhow!(
                "unknown detector backend '{}'; expected 'stub' or 'tract'",
                other
            )),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stub => f.write_str("stub"),
            Self::Tract => f.write_str("tract"),
        }
    }
}

/// Construct the configured backend.
pub fn build_backend(settings: &DetectionSettings) -> Result<Box<dyn DetectorBackend>> {
    match settings.backend {
        BackendKind::Stub => {
            log::warn!("using stub detector backend; no detections will be reported");
            Ok(Box::new(StubBackend::new()))
        }
        BackendKind::Tract => build_tract(settings),
    }
}

#[cfg(feature = "backend-tract")]
fn build_tract(settings: &DetectionSettings) -> Result<Box<dyn DetectorBackend>> {
    let backend = super::backends::TractBackend::new(&settings.model_path, settings.input_size)?
        .with_confidence_floor(settings.min_confidence)
        .with_iou_threshold(settings.iou_threshold);
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(_settings: &DetectionSettings) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!(
        "tract backend requested but this build lacks the backend-tract feature"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_names() {
        assert_eq!("stub".parse::<BackendKind>().unwrap(), BackendKind::Stub);
        assert_eq!(" Tract ".parse::<BackendKind>().unwrap(), BackendKind::Tract);
        assert_eq!("onnx".parse::<BackendKind>().unwrap(), BackendKind::Tract);
        assert!("cuda".parse::<BackendKind>().is_err());
    }

    #[test]
    fn builds_stub_backend() {
        let settings = DetectionSettings {
            backend: BackendKind::Stub,
            ..DetectionSettings::default()
        };
        let backend = build_backend(&settings).unwrap();
        assert_eq!(backend.name(), "stub");
    }
}
