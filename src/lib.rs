//! MJPEG sentinel
//!
//! Watches a live MJPEG camera stream, runs object detection on the freshest
//! frame, and switches a remote LED once a target has been seen for a run of
//! consecutive frames.
//!
//! # Module Structure
//!
//! - `ingest`: HTTP stream connection and JPEG frame demultiplexing
//! - `frame`: encoded frame container and decoding
//! - `detect`: detector backends (stub, tract/ONNX) and detection filtering
//! - `trigger`: debounced ON/OFF state machine
//! - `actuator`: best-effort HTTP LED client
//! - `pipeline`: the single-threaded loop tying it all together
//! - `diagnostics`: frame rate and failure counters
//! - `overlay`: annotated snapshots of the latest frame
//! - `config`: file and environment configuration

pub mod actuator;
pub mod config;
pub mod detect;
pub mod diagnostics;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod pipeline;
pub mod trigger;

pub use actuator::{Actuator, HttpActuator};
pub use config::SentinelConfig;
pub use detect::{
    build_backend, BackendKind, BoundingBox, Detection, DetectionFilter, DetectionResult,
    DetectorBackend, StubBackend,
};
pub use diagnostics::Diagnostics;
pub use frame::Frame;
pub use ingest::{DemuxConfig, FrameDemuxer};
pub use pipeline::{FrameReport, PipelineDriver, Stage, StepOutcome};
pub use trigger::{Actuation, TriggerState, TriggerStateMachine};
