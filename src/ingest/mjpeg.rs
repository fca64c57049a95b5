//! MJPEG-over-HTTP frame source.
//!
//! `FrameDemuxer` cuts complete JPEG frames out of an unstructured byte
//! stream using only the SOI/EOI markers. The multipart boundary and part
//! headers are never parsed, so any server that concatenates JPEGs works.
//!
//! Live streams outrun the detector, so each `pull()` first performs a
//! configurable number of flush reads that discard every complete frame they
//! uncover. Only the frame completed by the final authoritative read is
//! returned. This trades delivery for latency: stale frames are dropped, and
//! `flush_reads = 0` turns the policy off.

use anyhow::{anyhow, Context, Result};
use std::io::{ErrorKind, Read};
use std::time::Duration;

use crate::frame::{Frame, EOI, SOI};

pub const DEFAULT_CHUNK_SIZE: usize = 1024;
pub const DEFAULT_FLUSH_READS: usize = 5;
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 10 * 1024 * 1024;

/// Read/flush policy for a `FrameDemuxer`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DemuxConfig {
    /// Bytes requested per read.
    pub chunk_size: usize,
    /// Unconditional reads per `pull()` whose complete frames are discarded.
    pub flush_reads: usize,
    /// Upper bound on buffered bytes before the buffer is cut back.
    pub max_buffer_bytes: usize,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            flush_reads: DEFAULT_FLUSH_READS,
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
        }
    }
}

/// Splits a byte stream into JPEG frames.
pub struct FrameDemuxer<R> {
    reader: R,
    config: DemuxConfig,
    buffer: Vec<u8>,
    chunk: Vec<u8>,
    stale_dropped: u64,
}

impl<R: Read> FrameDemuxer<R> {
    pub fn new(reader: R, config: DemuxConfig) -> Self {
        let chunk = vec![0u8; config.chunk_size.max(1)];
        Self {
            reader,
            config,
            buffer: Vec::with_capacity(64 * 1024),
            chunk,
            stale_dropped: 0,
        }
    }

    pub fn config(&self) -> &DemuxConfig {
        &self.config
    }

    /// Bytes currently held and not yet part of an extracted frame.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Total frames discarded by flush passes so far.
    pub fn stale_frames_dropped(&self) -> u64 {
        self.stale_dropped
    }

    /// Flush stale frames, then read once and try to extract a frame.
    ///
    /// `Ok(None)` means no frame is complete yet and the caller should retry.
    /// `Err` means the stream is gone.
    pub fn pull(&mut self) -> Result<Option<Frame>> {
        self.flush()?;
        self.read_chunk()?;
        Ok(self.extract())
    }

    /// Run the configured flush passes. Returns frames dropped.
    pub fn flush(&mut self) -> Result<usize> {
        let mut dropped = 0;
        for _ in 0..self.config.flush_reads {
            self.read_chunk()?;
            while self.extract().is_some() {
                dropped += 1;
            }
        }
        if dropped > 0 {
            log::trace!("flushed {} stale frame(s)", dropped);
        }
        self.stale_dropped += dropped as u64;
        Ok(dropped)
    }

    /// Read one chunk into the buffer. Returns bytes appended.
    pub fn read_chunk(&mut self) -> Result<usize> {
        let read = match self.reader.read(&mut self.chunk) {
            Ok(0) => return Err(anyhow!("mjpeg stream ended")),
            Ok(read) => read,
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
                ) =>
            {
                return Ok(0)
            }
            Err(e) => return Err(e).context("read mjpeg chunk"),
        };
        self.buffer.extend_from_slice(&self.chunk[..read]);
        self.enforce_bound();
        Ok(read)
    }

    /// Remove and return the first complete frame in the buffer, if any.
    ///
    /// Everything up to and including the frame's EOI is discarded. When no
    /// frame is complete the buffer is left untouched.
    pub fn extract(&mut self) -> Option<Frame> {
        let (start, end) = find_jpeg_bounds(&self.buffer)?;
        let frame = self.buffer[start..end].to_vec();
        self.buffer.drain(..end);
        Some(Frame::from_marked(frame))
    }

    fn enforce_bound(&mut self) {
        if self.buffer.len() <= self.config.max_buffer_bytes {
            return;
        }
        if let Some(start) = find_marker(&self.buffer, SOI, 0) {
            if start > 0 {
                self.buffer.drain(..start);
            }
        }
        if self.buffer.len() > self.config.max_buffer_bytes {
            // Keep the last byte: it may be the first half of a marker.
            let drain_len = self.buffer.len() - 1;
            self.buffer.drain(..drain_len);
            log::warn!(
                "mjpeg buffer exceeded {} bytes without a complete frame; discarded",
                self.config.max_buffer_bytes
            );
        }
    }
}

/// Open an HTTP stream and return its body reader.
///
/// The response is accepted whatever its content type; frame boundaries come
/// from JPEG markers, not from the multipart boundary. Body reads give up
/// after `read_timeout`, which `read_chunk` treats as "no data yet".
pub fn connect(
    url: &str,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Box<dyn Read + Send>> {
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(connect_timeout)
        .timeout_read(read_timeout)
        .build();
    let response = agent
        .get(url)
        .call()
        .with_context(|| format!("connect to mjpeg stream {}", url))?;
    let content_type = response.header("Content-Type").unwrap_or("").to_string();
    if content_type.to_lowercase().contains("multipart") {
        log::debug!("mjpeg stream content type: {}", content_type);
    } else {
        log::warn!(
            "stream {} reports content type '{}'; scanning for jpeg markers anyway",
            url,
            content_type
        );
    }
    Ok(Box::new(response.into_reader()))
}

/// Locate `[start, end)` of the first complete JPEG in `buffer`.
///
/// The EOI search starts after the first SOI, so an EOI belonging to an
/// earlier partial frame never terminates the next one.
pub fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = find_marker(buffer, SOI, 0)?;
    let end = find_marker(buffer, EOI, start + SOI.len())?;
    Some((start, end + EOI.len()))
}

fn find_marker(buffer: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    buffer
        .get(from..)?
        .windows(2)
        .position(|w| w == marker)
        .map(|pos| pos + from)
}
