mod backend;
mod backends;
mod filter;
mod registry;
mod result;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use filter::DetectionFilter;
pub use registry::{build_backend, BackendKind};
pub use result::{BoundingBox, Detection, DetectionResult};
