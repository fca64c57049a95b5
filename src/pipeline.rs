//! Detection pipeline loop.
//!
//! One worker, one frame at a time:
//! 1. Pull the freshest complete frame from the MJPEG demuxer
//! 2. Decode it to RGB
//! 3. Run the detector backend
//! 4. Reduce detections to a present/absent signal with `DetectionFilter`
//! 5. Step the trigger and send any resulting actuation
//! 6. Update diagnostics and the optional annotated snapshot
//!
//! Only a stream failure ends the loop. Decode and detector failures skip the
//! frame without touching the trigger. Actuator failures are logged and the
//! trigger keeps the state it already committed to, so the believed and real
//! LED state can drift until the next transition.

use anyhow::{Context, Result};
use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::actuator::Actuator;
use crate::detect::{DetectionFilter, DetectorBackend};
use crate::frame::Frame;
use crate::ingest::FrameDemuxer;
use crate::overlay;
use crate::trigger::{Actuation, TriggerStateMachine};
use crate::Diagnostics;

/// Pipeline stage, attached to errors as context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Connect,
    Read,
    Decode,
    Classify,
    Actuate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Connect => "connect",
            Stage::Read => "read",
            Stage::Decode => "decode",
            Stage::Classify => "classify",
            Stage::Actuate => "actuate",
        };
        f.write_str(name)
    }
}

/// What happened to one processed frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameReport {
    pub index: u64,
    pub detections: usize,
    pub qualifying: usize,
    pub streak: u32,
    pub fps: f32,
    pub actuation: Option<Actuation>,
    /// Whether the actuation request succeeded. `None` when nothing was sent.
    pub delivered: Option<bool>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    /// No complete frame yet.
    Pending,
    /// A frame was dropped at the given stage.
    Skipped(Stage),
    Processed(FrameReport),
}

pub struct PipelineDriver<R, A> {
    demuxer: FrameDemuxer<R>,
    detector: Box<dyn DetectorBackend>,
    filter: DetectionFilter,
    trigger: TriggerStateMachine,
    actuator: A,
    diagnostics: Diagnostics,
    annotated_path: Option<PathBuf>,
    health_interval: Duration,
}

impl<R: Read, A: Actuator> PipelineDriver<R, A> {
    pub fn new(
        demuxer: FrameDemuxer<R>,
        detector: Box<dyn DetectorBackend>,
        filter: DetectionFilter,
        trigger: TriggerStateMachine,
        actuator: A,
    ) -> Self {
        Self {
            demuxer,
            detector,
            filter,
            trigger,
            actuator,
            diagnostics: Diagnostics::new(),
            annotated_path: None,
            health_interval: Duration::from_secs(5),
        }
    }

    /// Write each processed frame, annotated, to `path`.
    pub fn with_annotated_output(mut self, path: PathBuf) -> Self {
        self.annotated_path = Some(path);
        self
    }

    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn trigger(&self) -> &TriggerStateMachine {
        &self.trigger
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn demuxer(&self) -> &FrameDemuxer<R> {
        &self.demuxer
    }

    /// One loop iteration. Errors are fatal stream failures.
    pub fn step(&mut self) -> Result<StepOutcome> {
        match self.demuxer.pull().context(Stage::Read)? {
            Some(frame) => Ok(self.process_frame(&frame)),
            None => Ok(StepOutcome::Pending),
        }
    }

    /// Run one frame through decode, detect, trigger and actuate.
    pub fn process_frame(&mut self, frame: &Frame) -> StepOutcome {
        let mut image = match frame.decode() {
            Ok(image) => image,
            Err(e) => {
                self.diagnostics.decode_failures += 1;
                log::warn!(
                    "{} stage: skipping {}-byte frame: {:#}",
                    Stage::Decode,
                    frame.as_bytes().len(),
                    e
                );
                return StepOutcome::Skipped(Stage::Decode);
            }
        };

        let result = match self.detector.detect(&image) {
            Ok(result) => result,
            Err(e) => {
                self.diagnostics.classify_failures += 1;
                log::warn!(
                    "{} stage: {} backend failed: {:#}",
                    Stage::Classify,
                    self.detector.name(),
                    e
                );
                return StepOutcome::Skipped(Stage::Classify);
            }
        };

        let qualifying = self.filter.count(&result);
        let actuation = self.trigger.step(qualifying > 0);
        let delivered = actuation.map(|actuation| self.dispatch(actuation));

        let index = self.diagnostics.record_frame(Instant::now());
        let report = FrameReport {
            index,
            detections: result.len(),
            qualifying,
            streak: self.trigger.consecutive_hits(),
            fps: self.diagnostics.fps(),
            actuation,
            delivered,
        };
        log::debug!(
            "frame={} detections={} qualifying={} streak={} fps={:.1}",
            report.index,
            report.detections,
            report.qualifying,
            report.streak,
            report.fps
        );

        if let Some(path) = &self.annotated_path {
            overlay::annotate(&mut image, &result, &self.filter, self.trigger.actuator_on());
            if let Err(e) = overlay::write_snapshot(path, &image) {
                log::warn!("annotated output failed: {:#}", e);
            }
        }

        StepOutcome::Processed(report)
    }

    /// Loop until `cancel` is set or the stream fails.
    pub fn run(&mut self, cancel: &AtomicBool) -> Result<()> {
        log::info!(
            "pipeline running: backend={} threshold={} flush_reads={} chunk_size={}",
            self.detector.name(),
            self.trigger.threshold(),
            self.demuxer.config().flush_reads,
            self.demuxer.config().chunk_size
        );
        let result = self.run_until(cancel);
        self.log_summary();
        result
    }

    fn run_until(&mut self, cancel: &AtomicBool) -> Result<()> {
        let mut last_health_log = Instant::now();
        while !cancel.load(Ordering::SeqCst) {
            self.step()?;

            if last_health_log.elapsed() >= self.health_interval {
                log::info!(
                    "health frames={} fps={:.1} streak={} led_on={} stale_dropped={}",
                    self.diagnostics.frames(),
                    self.diagnostics.fps(),
                    self.trigger.consecutive_hits(),
                    self.trigger.actuator_on(),
                    self.demuxer.stale_frames_dropped()
                );
                last_health_log = Instant::now();
            }
        }
        log::info!("shutdown requested, stopping pipeline");
        Ok(())
    }

    fn dispatch(&mut self, actuation: Actuation) -> bool {
        match actuation {
            Actuation::TurnOn => self.diagnostics.on_events += 1,
            Actuation::TurnOff => self.diagnostics.off_events += 1,
        }
        match self.actuator.send(actuation).context(Stage::Actuate) {
            Ok(()) => {
                log::info!("led {} command sent", actuation);
                true
            }
            Err(e) => {
                self.diagnostics.actuator_failures += 1;
                log::warn!("failed to trigger led {}: {:#}", actuation, e);
                false
            }
        }
    }

    fn log_summary(&self) {
        let diag = &self.diagnostics;
        log::info!(
            "processed {} frames (stale dropped {}, decode failures {}, classifier failures {}); led on/off commands {}/{} with {} send failures",
            diag.frames(),
            self.demuxer.stale_frames_dropped(),
            diag.decode_failures,
            diag.classify_failures,
            diag.on_events,
            diag.off_events,
            diag.actuator_failures
        );
    }
}
