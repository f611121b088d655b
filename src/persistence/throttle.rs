use std::{
    hash::{DefaultHasher, Hash, Hasher},
    time::Duration,
};

use tokio::time::Instant;

use super::SessionSnapshot;

/// What [`SaveThrottle::check`] wants done with a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveDecision {
    Save,
    /// Identical to the last written snapshot.
    Unchanged,
    /// Changed, but the last write was too recent. Check again after this.
    Defer(Duration),
}

/// Never writes a snapshot identical to the last one written, and writes
/// changed snapshots at most once per window.
pub struct SaveThrottle {
    window: Duration,
    last: Option<(u64, Instant)>,
}

impl SaveThrottle {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn signature(snapshot: &SessionSnapshot) -> u64 {
        let mut hasher = DefaultHasher::new();
        // Serialization failure only loses deduplication, never the save.
        serde_json::to_string(snapshot)
            .unwrap_or_default()
            .hash(&mut hasher);
        hasher.finish()
    }

    /// Decides about `snapshot`; a `Save` answer records it as written.
    pub fn check(&mut self, snapshot: &SessionSnapshot, force: bool) -> SaveDecision {
        let signature = Self::signature(snapshot);
        let now = Instant::now();

        if !force {
            if let Some((last_signature, at)) = self.last {
                if last_signature == signature {
                    return SaveDecision::Unchanged;
                }
                let since = now.duration_since(at);
                if since < self.window {
                    return SaveDecision::Defer(self.window - since);
                }
            }
        }

        self.last = Some((signature, now));
        SaveDecision::Save
    }

    /// Treats `snapshot` as just written.
    pub fn record(&mut self, snapshot: &SessionSnapshot) {
        self.last = Some((Self::signature(snapshot), Instant::now()));
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{player::LoopMode, protocol::tracks::Track};

    fn snapshot(volume: u8) -> SessionSnapshot {
        SessionSnapshot {
            queue: vec![Track::new("https://x.test/a.mp3", "A", "B")],
            cursor: Some(0),
            loop_mode: LoopMode::Off,
            volume,
            auto_continuation: true,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_snapshot_is_never_rewritten() {
        let mut throttle = SaveThrottle::new(Duration::from_secs(5));
        assert_eq!(throttle.check(&snapshot(50), false), SaveDecision::Save);
        assert_eq!(throttle.check(&snapshot(50), false), SaveDecision::Unchanged);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(throttle.check(&snapshot(50), false), SaveDecision::Unchanged);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changed_snapshot_waits_for_window() {
        let mut throttle = SaveThrottle::new(Duration::from_secs(5));
        assert_eq!(throttle.check(&snapshot(50), false), SaveDecision::Save);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(
            throttle.check(&snapshot(60), false),
            SaveDecision::Defer(Duration::from_secs(3))
        );

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(throttle.check(&snapshot(60), false), SaveDecision::Save);
        assert_eq!(throttle.check(&snapshot(60), false), SaveDecision::Unchanged);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_and_reset_saves() {
        let mut throttle = SaveThrottle::new(Duration::from_secs(5));
        assert_eq!(throttle.check(&snapshot(50), false), SaveDecision::Save);
        assert_eq!(throttle.check(&snapshot(50), true), SaveDecision::Save);

        throttle.reset();
        assert_eq!(throttle.check(&snapshot(50), false), SaveDecision::Save);

        throttle.record(&snapshot(70));
        assert_eq!(throttle.check(&snapshot(70), false), SaveDecision::Unchanged);
    }
}
