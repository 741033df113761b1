//! Frame scheduling sources

use crate::shared::lock;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use xr_tracking_config::FrameConfig;

/// Where displays get their refresh signal from
pub trait FrameClock: Send + Sync {
    /// Resolves with the next frame's timestamp in milliseconds. Dropping
    /// the receiver cancels the request.
    fn request_frame(&self) -> oneshot::Receiver<f64>;
}

/// Fixed-interval refresh for hosts without a vsync signal.
/// Must be used inside a tokio runtime.
#[derive(Debug)]
pub struct IntervalFrameClock {
    interval: Duration,
    origin: Instant,
}

impl IntervalFrameClock {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            origin: Instant::now(),
        }
    }
}

impl From<&FrameConfig> for IntervalFrameClock {
    fn from(config: &FrameConfig) -> Self {
        Self::new(Duration::from_millis(config.refresh_interval_ms))
    }
}

impl FrameClock for IntervalFrameClock {
    fn request_frame(&self) -> oneshot::Receiver<f64> {
        let (tx, rx) = oneshot::channel();
        let interval = self.interval;
        let origin = self.origin;
        tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let _ = tx.send(origin.elapsed().as_secs_f64() * 1000.0);
        });
        rx
    }
}

/// Clock driven by explicit ticks
#[derive(Debug, Default)]
pub struct ManualFrameClock {
    waiting: Mutex<Vec<oneshot::Sender<f64>>>,
}

impl ManualFrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire every outstanding request; returns how many were still listening
    pub fn tick(&self, timestamp: f64) -> usize {
        let waiting = std::mem::take(&mut *lock(&self.waiting));
        waiting
            .into_iter()
            .filter_map(|tx| tx.send(timestamp).ok())
            .count()
    }

    pub fn pending(&self) -> usize {
        lock(&self.waiting).len()
    }
}

impl FrameClock for ManualFrameClock {
    fn request_frame(&self) -> oneshot::Receiver<f64> {
        let (tx, rx) = oneshot::channel();
        lock(&self.waiting).push(tx);
        rx
    }
}
