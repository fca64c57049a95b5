use std::time::Instant;

/// Running counters for the pipeline loop. Presentational only.
#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    frames: u64,
    last_frame_at: Option<Instant>,
    fps: f32,
    pub decode_failures: u64,
    pub classify_failures: u64,
    pub actuator_failures: u64,
    pub on_events: u64,
    pub off_events: u64,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a processed frame arriving at `now`. Returns its 1-based index.
    ///
    /// FPS is the reciprocal of the gap since the previous frame; the first
    /// frame reports 0.
    pub fn record_frame(&mut self, now: Instant) -> u64 {
        self.frames += 1;
        if let Some(prev) = self.last_frame_at {
            let dt = now.saturating_duration_since(prev).as_secs_f32();
            self.fps = if dt > 0.0 { 1.0 / dt } else { 0.0 };
        }
        self.last_frame_at = Some(now);
        self.frames
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn frame_index_is_monotonic_and_fps_follows_gap() {
        let mut diag = Diagnostics::new();
        let t0 = Instant::now();
        assert_eq!(diag.record_frame(t0), 1);
        assert_eq!(diag.fps(), 0.0);

        assert_eq!(diag.record_frame(t0 + Duration::from_millis(100)), 2);
        assert!((diag.fps() - 10.0).abs() < 0.01);

        assert_eq!(diag.record_frame(t0 + Duration::from_millis(100)), 3);
        assert_eq!(diag.fps(), 0.0);
    }
}
