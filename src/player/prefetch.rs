use std::{collections::HashSet, time::Duration};

use crate::{configs::PrefetchConfig, protocol::tracks::Track};

use super::queue::Queue;

/// Decides when and what to warm ahead of the current track.
///
/// The scheduler holds no timer itself; the session arms the `Prefetch`
/// slot with [`PrefetchScheduler::delay_for`] and calls
/// [`PrefetchScheduler::take_candidates`] when it fires.
#[derive(Debug, Clone)]
pub struct PrefetchScheduler {
    enabled: bool,
    lead: Duration,
    depth: usize,
    prefetched: HashSet<String>,
}

impl PrefetchScheduler {
    pub fn new(config: &PrefetchConfig) -> Self {
        Self {
            enabled: config.enabled,
            lead: Duration::from_millis(config.lead_ms),
            depth: config.depth.clamp(1, 5),
            prefetched: HashSet::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Time left until the lead window before the end of the track.
    /// Zero when the window is already open or the length is unknown.
    pub fn delay_for(&self, duration_ms: Option<u64>, elapsed_ms: u64) -> Duration {
        match duration_ms.filter(|d| *d > 0) {
            Some(duration) => {
                let lead = self.lead.as_millis() as u64;
                Duration::from_millis(duration.saturating_sub(elapsed_ms).saturating_sub(lead))
            }
            None => Duration::ZERO,
        }
    }

    /// Up to `depth` tracks after the cursor that were not warmed yet.
    /// Returned tracks are marked as prefetched by url.
    pub fn take_candidates(&mut self, queue: &Queue) -> Vec<Track> {
        let mut picked = Vec::new();
        for track in queue.upcoming().iter().take(self.depth) {
            if track.prefetch_resolved.is_some() || self.prefetched.contains(&track.url) {
                continue;
            }
            self.prefetched.insert(track.url.clone());
            picked.push(track.clone());
        }
        picked
    }

    /// Allows `url` to be warmed again (after a failure or invalidation).
    pub fn forget(&mut self, url: &str) {
        self.prefetched.remove(url);
    }

    pub fn clear(&mut self) {
        self.prefetched.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::TrackId;

    fn config(depth: usize) -> PrefetchConfig {
        PrefetchConfig {
            depth,
            ..PrefetchConfig::default()
        }
    }

    fn queue(n: usize, current: Option<usize>) -> Queue {
        let tracks = (0..n)
            .map(|i| {
                let mut t = Track::new(format!("https://x.test/{}", i), format!("t{}", i), "a");
                t.id = TrackId::generate();
                t
            })
            .collect();
        Queue::from_parts(tracks, current)
    }

    #[test]
    fn test_delay_from_duration_and_lead() {
        let scheduler = PrefetchScheduler::new(&config(2));
        assert_eq!(
            scheduler.delay_for(Some(180_000), 0),
            Duration::from_millis(150_000)
        );
        assert_eq!(
            scheduler.delay_for(Some(180_000), 100_000),
            Duration::from_millis(50_000)
        );
    }

    #[test]
    fn test_delay_is_zero_when_window_already_open() {
        let scheduler = PrefetchScheduler::new(&config(2));
        assert_eq!(scheduler.delay_for(Some(180_000), 170_000), Duration::ZERO);
        assert_eq!(scheduler.delay_for(Some(20_000), 0), Duration::ZERO);
        assert_eq!(scheduler.delay_for(None, 0), Duration::ZERO);
        assert_eq!(scheduler.delay_for(Some(0), 0), Duration::ZERO);
    }

    #[test]
    fn test_candidates_walk_forward_up_to_depth() {
        let mut scheduler = PrefetchScheduler::new(&config(2));
        let q = queue(5, Some(1));
        let urls: Vec<_> = scheduler
            .take_candidates(&q)
            .into_iter()
            .map(|t| t.url)
            .collect();
        assert_eq!(urls, ["https://x.test/2", "https://x.test/3"]);

        assert!(scheduler.take_candidates(&q).is_empty());
        scheduler.forget("https://x.test/3");
        assert_eq!(scheduler.take_candidates(&q).len(), 1);
    }

    #[test]
    fn test_depth_is_clamped() {
        let mut scheduler = PrefetchScheduler::new(&config(40));
        assert_eq!(scheduler.take_candidates(&queue(10, Some(0))).len(), 5);

        let mut scheduler = PrefetchScheduler::new(&config(0));
        assert_eq!(scheduler.take_candidates(&queue(10, Some(0))).len(), 1);
    }

    #[test]
    fn test_already_resolved_tracks_are_skipped() {
        let mut scheduler = PrefetchScheduler::new(&config(3));
        let mut q = queue(4, Some(0));
        let id = q.get(1).map(|t| t.id.clone()).expect("queue has four tracks");
        if let Some(t) = q.find_mut(&id) {
            t.prefetch_resolved = Some("cdn".into());
        }
        let picked = scheduler.take_candidates(&q);
        assert_eq!(picked.len(), 2);
        assert!(!picked.iter().any(|t| t.url == "https://x.test/1"));
    }
}
