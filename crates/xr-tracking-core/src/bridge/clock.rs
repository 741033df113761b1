//! Alignment of native timestamps with the local monotonic clock

use std::time::Instant;

/// Running mean of `local_now - native_time` samples
#[derive(Debug, Clone)]
pub struct NativeClock {
    origin: Instant,
    offset_sum: f64,
    samples: u32,
}

impl NativeClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_sum: 0.0,
            samples: 0,
        }
    }

    /// Milliseconds since this clock was created
    pub fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    pub fn record(&mut self, native_time: f64) {
        self.record_at(self.now_ms(), native_time);
    }

    fn record_at(&mut self, local_now: f64, native_time: f64) {
        self.offset_sum += local_now - native_time;
        self.samples += 1;
    }

    pub fn offset(&self) -> Option<f64> {
        (self.samples > 0).then(|| self.offset_sum / self.samples as f64)
    }

    /// Native time on the local clock; the local time itself until a
    /// sample has been recorded
    pub fn adjust(&self, native_time: f64) -> f64 {
        match self.offset() {
            Some(offset) => native_time + offset,
            None => self.now_ms(),
        }
    }
}

impl Default for NativeClock {
    fn default() -> Self {
        Self::new()
    }
}
