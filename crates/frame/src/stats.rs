use std::time::Duration;

/// Frames-per-second counter, fed by the frame driver's clock.
///
/// FPS is an exponential moving average of the interval between frame
/// starts; `frame_time` is how long the last tick itself took.
#[derive(Debug, Clone)]
pub struct FrameStats {
    frames: u64,
    last_begin: Option<Duration>,
    current_begin: Duration,
    smoothed_fps: f32,
    /// Weight of the newest sample (0.0-1.0).
    smoothing: f32,
    frame_time: Duration,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new(0.05)
    }
}

impl FrameStats {
    pub fn new(smoothing: f32) -> Self {
        Self {
            frames: 0,
            last_begin: None,
            current_begin: Duration::ZERO,
            smoothed_fps: 0.0,
            smoothing: smoothing.clamp(0.0, 1.0),
            frame_time: Duration::ZERO,
        }
    }

    pub fn begin(&mut self, now: Duration) {
        if let Some(prev) = self.last_begin {
            let interval = now.saturating_sub(prev).as_secs_f32();
            if interval > 0.0 {
                let instant_fps = 1.0 / interval;
                // First sample seeds the average instead of easing up from zero.
                self.smoothed_fps = if self.smoothed_fps == 0.0 {
                    instant_fps
                } else {
                    self.smoothed_fps * (1.0 - self.smoothing) + instant_fps * self.smoothing
                };
            }
        }
        self.last_begin = Some(now);
        self.current_begin = now;
    }

    pub fn end(&mut self, now: Duration) {
        self.frame_time = now.saturating_sub(self.current_begin);
        self.frames += 1;
    }

    /// Smoothed frames per second; zero until two frames have started.
    pub fn fps(&self) -> f32 {
        self.smoothed_fps
    }

    pub fn frame_time(&self) -> Duration {
        self.frame_time
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}
