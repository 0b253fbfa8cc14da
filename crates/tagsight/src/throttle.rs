use std::time::Duration;

/// Limits how often the detector runs.
#[derive(Debug, Clone)]
pub struct DetectionThrottle {
    interval: Duration,
    last_run: Option<Duration>,
}

impl DetectionThrottle {
    /// Allow at most `max_per_second` runs per second.
    ///
    /// A non positive rate disables throttling.
    pub fn new(max_per_second: f32) -> Self {
        let interval = if max_per_second.is_finite() && max_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / f64::from(max_per_second))
        } else {
            Duration::ZERO
        };
        Self {
            interval,
            last_run: None,
        }
    }

    /// Minimum time between two runs.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a run is due at `now`. Records the run when it is.
    pub fn try_acquire(&mut self, now: Duration) -> bool {
        let due = match self.last_run {
            Some(last) => now.saturating_sub(last) >= self.interval,
            None => true,
        };
        if due {
            self.last_run = Some(now);
        }
        due
    }

    /// Forget the last run so the next call is due.
    pub fn reset(&mut self) {
        self.last_run = None;
    }
}
