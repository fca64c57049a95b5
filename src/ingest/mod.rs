//! Frame ingestion.
//!
//! The only source is an HTTP MJPEG stream. The ingestion layer is
//! responsible for:
//! - Connecting to the stream endpoint
//! - Reassembling JPEG frames from arbitrarily chunked reads
//! - Dropping stale frames so the detector always sees a recent one
//!
//! Decoding happens downstream in the pipeline so that a corrupt frame can be
//! skipped without disturbing the stream state.

pub mod mjpeg;

pub use mjpeg::{connect, DemuxConfig, FrameDemuxer};
