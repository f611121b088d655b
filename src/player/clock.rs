use std::time::Duration;

use tokio::time::Instant;

/// Playback position derived from wall-clock time.
///
/// While running, elapsed time is `now - baseline`. Pausing freezes the
/// value; resuming moves the baseline so the position continues from where
/// it stopped.
#[derive(Debug, Clone, Default)]
pub struct PositionClock {
    baseline: Option<Instant>,
    paused_at_ms: Option<u64>,
}

impl PositionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs from `offset_ms`.
    pub fn start(&mut self, offset_ms: u64) {
        self.baseline = Some(baseline_for(offset_ms));
        self.paused_at_ms = None;
    }

    pub fn pause(&mut self) {
        if self.baseline.is_some() && self.paused_at_ms.is_none() {
            self.paused_at_ms = Some(self.elapsed_ms());
        }
    }

    pub fn resume(&mut self) {
        if let Some(frozen) = self.paused_at_ms.take() {
            self.baseline = Some(baseline_for(frozen));
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        if let Some(frozen) = self.paused_at_ms {
            return frozen;
        }
        self.baseline
            .map(|b| b.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }

    pub fn is_started(&self) -> bool {
        self.baseline.is_some()
    }

    pub fn reset(&mut self) {
        self.baseline = None;
        self.paused_at_ms = None;
    }
}

fn baseline_for(offset_ms: u64) -> Instant {
    let now = Instant::now();
    now.checked_sub(Duration::from_millis(offset_ms))
        .unwrap_or(now)
}
