use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::detect::{BackendKind, DetectionFilter};
use crate::ingest::DemuxConfig;

const DEFAULT_STREAM_URL: &str = "http://127.0.0.1:8080/video";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;
const DEFAULT_ACTUATOR_BASE_URL: &str = "http://127.0.0.1:5000";
const LED_ON_PATH: &str = "/led/on";
const LED_OFF_PATH: &str = "/led/off";
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 1000;
const DEFAULT_MODEL_PATH: &str = "yolov8n.onnx";
const DEFAULT_INPUT_SIZE: u32 = 640;
// COCO "cell phone".
const DEFAULT_CLASSES: &[u32] = &[67];
const DEFAULT_MIN_CONFIDENCE: f32 = 0.4;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_STREAK_THRESHOLD: u32 = 5;
const DEFAULT_HEALTH_LOG_SECS: u64 = 5;

#[derive(Debug, Deserialize, Default)]
struct SentinelConfigFile {
    stream: Option<StreamConfigFile>,
    actuator: Option<ActuatorConfigFile>,
    detection: Option<DetectionConfigFile>,
    trigger: Option<TriggerConfigFile>,
    output: Option<OutputConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    url: Option<String>,
    chunk_size: Option<usize>,
    flush_reads: Option<usize>,
    max_buffer_bytes: Option<usize>,
    connect_timeout_secs: Option<u64>,
    read_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ActuatorConfigFile {
    base_url: Option<String>,
    on_url: Option<String>,
    off_url: Option<String>,
    timeout_ms: Option<u64>,
    probe: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    classes: Option<Vec<u32>>,
    min_confidence: Option<f32>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct TriggerConfigFile {
    streak_threshold: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    annotated_path: Option<PathBuf>,
    health_log_secs: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct SentinelConfig {
    pub stream: StreamSettings,
    pub actuator: ActuatorSettings,
    pub detection: DetectionSettings,
    pub trigger: TriggerSettings,
    pub output: OutputSettings,
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub url: String,
    pub demux: DemuxConfig,
    pub connect_timeout: Duration,
    /// Upper bound on one blocking read, so a stalled camera still lets the
    /// loop observe cancellation.
    pub read_timeout: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
            demux: DemuxConfig::default(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActuatorSettings {
    pub base_url: String,
    pub on_url: String,
    pub off_url: String,
    pub timeout: Duration,
    /// Check that the LED server answers before starting the loop.
    pub probe: bool,
}

impl Default for ActuatorSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ACTUATOR_BASE_URL.to_string(),
            on_url: join_url(DEFAULT_ACTUATOR_BASE_URL, LED_ON_PATH),
            off_url: join_url(DEFAULT_ACTUATOR_BASE_URL, LED_OFF_PATH),
            timeout: Duration::from_millis(DEFAULT_HTTP_TIMEOUT_MS),
            probe: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub backend: BackendKind,
    pub model_path: PathBuf,
    pub input_size: u32,
    /// Allowed class ids. Empty means every class.
    pub classes: Vec<u32>,
    pub min_confidence: f32,
    pub iou_threshold: f32,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Tract,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            input_size: DEFAULT_INPUT_SIZE,
            classes: DEFAULT_CLASSES.to_vec(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        }
    }
}

impl DetectionSettings {
    pub fn filter(&self) -> DetectionFilter {
        DetectionFilter::new(self.classes.iter().copied(), self.min_confidence)
    }
}

#[derive(Debug, Clone)]
pub struct TriggerSettings {
    pub streak_threshold: u32,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            streak_threshold: DEFAULT_STREAK_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputSettings {
    /// Where to write the latest annotated frame, if anywhere.
    pub annotated_path: Option<PathBuf>,
    pub health_interval: Duration,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            annotated_path: None,
            health_interval: Duration::from_secs(DEFAULT_HEALTH_LOG_SECS),
        }
    }
}

impl SentinelConfig {
    /// Load from `SENTINEL_CONFIG` (if set), then environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SENTINEL_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file path (if any), then environment overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentinelConfigFile) -> Result<Self> {
        let stream_file = file.stream.unwrap_or_default();
        let demux_defaults = DemuxConfig::default();
        let stream = StreamSettings {
            url: stream_file
                .url
                .unwrap_or_else(|| DEFAULT_STREAM_URL.to_string()),
            demux: DemuxConfig {
                chunk_size: stream_file.chunk_size.unwrap_or(demux_defaults.chunk_size),
                flush_reads: stream_file.flush_reads.unwrap_or(demux_defaults.flush_reads),
                max_buffer_bytes: stream_file
                    .max_buffer_bytes
                    .unwrap_or(demux_defaults.max_buffer_bytes),
            },
            connect_timeout: Duration::from_secs(
                stream_file
                    .connect_timeout_secs
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
            read_timeout: Duration::from_millis(
                stream_file.read_timeout_ms.unwrap_or(DEFAULT_READ_TIMEOUT_MS),
            ),
        };

        let actuator_file = file.actuator.unwrap_or_default();
        let base_url = actuator_file
            .base_url
            .unwrap_or_else(|| DEFAULT_ACTUATOR_BASE_URL.to_string());
        let actuator = ActuatorSettings {
            on_url: actuator_file
                .on_url
                .unwrap_or_else(|| join_url(&base_url, LED_ON_PATH)),
            off_url: actuator_file
                .off_url
                .unwrap_or_else(|| join_url(&base_url, LED_OFF_PATH)),
            base_url,
            timeout: Duration::from_millis(
                actuator_file.timeout_ms.unwrap_or(DEFAULT_HTTP_TIMEOUT_MS),
            ),
            probe: actuator_file.probe.unwrap_or(true),
        };

        let detection_file = file.detection.unwrap_or_default();
        let detection = DetectionSettings {
            backend: match detection_file.backend.as_deref() {
                Some(name) => name.parse()?,
                None => BackendKind::Tract,
            },
            model_path: detection_file
                .model_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            input_size: detection_file.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
            classes: detection_file
                .classes
                .unwrap_or_else(|| DEFAULT_CLASSES.to_vec()),
            min_confidence: detection_file
                .min_confidence
                .unwrap_or(DEFAULT_MIN_CONFIDENCE),
            iou_threshold: detection_file.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
        };

        let trigger = TriggerSettings {
            streak_threshold: file
                .trigger
                .and_then(|trigger| trigger.streak_threshold)
                .unwrap_or(DEFAULT_STREAK_THRESHOLD),
        };

        let output_file = file.output.unwrap_or_default();
        let output = OutputSettings {
            annotated_path: output_file.annotated_path,
            health_interval: Duration::from_secs(
                output_file.health_log_secs.unwrap_or(DEFAULT_HEALTH_LOG_SECS),
            ),
        };

        Ok(Self {
            stream,
            actuator,
            detection,
            trigger,
            output,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = env_string("SENTINEL_STREAM_URL") {
            self.stream.url = url;
        }
        if let Some(size) = env_parse("SENTINEL_CHUNK_SIZE")? {
            self.stream.demux.chunk_size = size;
        }
        if let Some(reads) = env_parse("SENTINEL_FLUSH_READS")? {
            self.stream.demux.flush_reads = reads;
        }
        if let Some(ms) = env_parse::<u64>("SENTINEL_READ_TIMEOUT_MS")? {
            self.stream.read_timeout = Duration::from_millis(ms);
        }
        // A new base URL only moves endpoints still derived from the old one.
        if let Some(base) = env_string("SENTINEL_ACTUATOR_BASE_URL") {
            let old_base = std::mem::replace(&mut self.actuator.base_url, base);
            let base = &self.actuator.base_url;
            if self.actuator.on_url == join_url(&old_base, LED_ON_PATH) {
                self.actuator.on_url = join_url(base, LED_ON_PATH);
            }
            if self.actuator.off_url == join_url(&old_base, LED_OFF_PATH) {
                self.actuator.off_url = join_url(base, LED_OFF_PATH);
            }
        }
        if let Some(url) = env_string("SENTINEL_LED_ON_URL") {
            self.actuator.on_url = url;
        }
        if let Some(url) = env_string("SENTINEL_LED_OFF_URL") {
            self.actuator.off_url = url;
        }
        if let Some(ms) = env_parse::<u64>("SENTINEL_HTTP_TIMEOUT_MS")? {
            self.actuator.timeout = Duration::from_millis(ms);
        }
        if let Some(backend) = env_parse("SENTINEL_BACKEND")? {
            self.detection.backend = backend;
        }
        if let Some(path) = env_string("SENTINEL_MODEL_PATH") {
            self.detection.model_path = PathBuf::from(path);
        }
        if let Ok(classes) = std::env::var("SENTINEL_CLASSES") {
            self.detection.classes = parse_class_list(&classes)?;
        }
        if let Some(conf) = env_parse("SENTINEL_MIN_CONFIDENCE")? {
            self.detection.min_confidence = conf;
        }
        if let Some(threshold) = env_parse("SENTINEL_STREAK_THRESHOLD")? {
            self.trigger.streak_threshold = threshold;
        }
        if let Some(path) = env_string("SENTINEL_ANNOTATED_PATH") {
            self.output.annotated_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        validate_http_url("stream url", &self.stream.url)?;
        validate_http_url("actuator on url", &self.actuator.on_url)?;
        validate_http_url("actuator off url", &self.actuator.off_url)?;
        if self.actuator.probe {
            validate_http_url("actuator base url", &self.actuator.base_url)?;
        }

        let demux = &self.stream.demux;
        if demux.chunk_size == 0 {
            return Err(anyhow!("chunk size must be greater than zero"));
        }
        if demux.max_buffer_bytes < demux.chunk_size {
            return Err(anyhow!(
                "max buffer bytes ({}) must be at least the chunk size ({})",
                demux.max_buffer_bytes,
                demux.chunk_size
            ));
        }
        if self.stream.read_timeout.is_zero() {
            return Err(anyhow!("stream read timeout must be greater than zero"));
        }
        if self.actuator.timeout.is_zero() {
            return Err(anyhow!("actuator timeout must be greater than zero"));
        }
        if self.trigger.streak_threshold == 0 {
            return Err(anyhow!("streak threshold must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.detection.min_confidence) {
            return Err(anyhow!(
                "min confidence must be within [0, 1], got {}",
                self.detection.min_confidence
            ));
        }
        if !(0.0..=1.0).contains(&self.detection.iou_threshold) {
            return Err(anyhow!(
                "iou threshold must be within [0, 1], got {}",
                self.detection.iou_threshold
            ));
        }
        if self.detection.input_size == 0 {
            return Err(anyhow!("model input size must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<SentinelConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow!("{} has invalid value '{}': {}", key, raw, e)),
        None => Ok(None),
    }
}

fn parse_class_list(value: &str) -> Result<Vec<u32>> {
    split_csv(value)
        .into_iter()
        .map(|entry| {
            entry
                .parse()
                .with_context(|| format!("invalid class id '{}'", entry))
        })
        .collect()
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

fn validate_http_url(what: &str, value: &str) -> Result<()> {
    let url = url::Url::parse(value).with_context(|| format!("invalid {} '{}'", what, value))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(anyhow!(
            "{} '{}' uses unsupported scheme '{}'; expected http(s)",
            what,
            value,
            other
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = SentinelConfig::from_file(SentinelConfigFile::default()).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.actuator.on_url, "http://127.0.0.1:5000/led/on");
        assert_eq!(cfg.actuator.off_url, "http://127.0.0.1:5000/led/off");
        assert_eq!(cfg.stream.demux.chunk_size, 1024);
        assert_eq!(cfg.stream.demux.flush_reads, 5);
        assert_eq!(cfg.trigger.streak_threshold, 5);
        assert_eq!(cfg.actuator.timeout, Duration::from_secs(1));
        assert_eq!(cfg.stream.read_timeout, Duration::from_secs(1));
        assert_eq!(cfg.detection.classes, vec![67]);
    }

    #[test]
    fn join_url_trims_trailing_slash() {
        assert_eq!(join_url("http://pi:5000/", "/led/on"), "http://pi:5000/led/on");
    }

    #[test]
    fn parse_class_list_rejects_garbage() {
        assert_eq!(parse_class_list("0, 67,").unwrap(), vec![0, 67]);
        assert!(parse_class_list("phone").is_err());
        assert!(parse_class_list("").unwrap().is_empty());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = SentinelConfig::default();
        cfg.trigger.streak_threshold = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = SentinelConfig::default();
        cfg.stream.url = "rtsp://camera".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = SentinelConfig::default();
        cfg.detection.min_confidence = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = SentinelConfig::default();
        cfg.stream.demux.chunk_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = SentinelConfig::default();
        cfg.stream.read_timeout = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }
}
