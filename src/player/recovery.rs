use std::{collections::HashMap, time::Duration};

use serde::Serialize;

use crate::{
    common::{StreamErrorKind, types::TrackId},
    configs::RecoveryConfig,
};

/// What the session does about a failed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RecoveryAction {
    /// The failure is an artifact of a seek tearing its own stream down.
    Suppress,
    /// Play the same track again after invalidating its cached stream.
    Retry,
    /// Drop the failed track and play whatever follows it.
    SkipToNext,
    /// Drop the failed track and ask the recommender for the next one.
    Recommend,
    /// Drop the failed track and stop.
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryDecision {
    pub action: RecoveryAction,
    pub delay: Duration,
    /// Error count crossed the session-wide ceiling.
    pub systemic: bool,
    /// Auto-continuation must be switched off before acting.
    pub disable_auto_continuation: bool,
}

impl RecoveryDecision {
    fn new(action: RecoveryAction, delay: Duration) -> Self {
        Self {
            action,
            delay,
            systemic: false,
            disable_auto_continuation: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackErrorStats {
    pub total: u32,
    pub forbidden: u32,
    pub restricted: u32,
}

/// Session-wide and per-track failure counts.
#[derive(Debug, Clone, Default)]
pub struct ErrorCounters {
    pub consecutive: u32,
    pub per_track: HashMap<TrackId, TrackErrorStats>,
}

impl ErrorCounters {
    pub fn record(&mut self, track: &TrackId, kind: StreamErrorKind) -> TrackErrorStats {
        self.consecutive = self.consecutive.saturating_add(1);
        let stats = self.per_track.entry(track.clone()).or_default();
        stats.total = stats.total.saturating_add(1);
        match kind {
            StreamErrorKind::Forbidden => stats.forbidden += 1,
            StreamErrorKind::Restricted => stats.restricted += 1,
            _ => {}
        }
        *stats
    }

    pub fn track(&self, track: &TrackId) -> TrackErrorStats {
        self.per_track.get(track).copied().unwrap_or_default()
    }

    /// A track played to its natural end.
    pub fn finished(&mut self, track: &TrackId) {
        self.end_streak();
        self.per_track.remove(track);
    }

    /// A stream played long enough to count as healthy. Per-track counts
    /// stay, so a track that keeps failing still gets dropped.
    pub fn end_streak(&mut self) {
        self.consecutive = 0;
    }

    pub fn forget(&mut self, track: &TrackId) {
        self.per_track.remove(track);
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
        self.per_track.clear();
    }
}

/// Facts about the session at the moment a failure is reported.
#[derive(Debug, Clone)]
pub struct FailureContext<'a> {
    pub track: &'a TrackId,
    pub kind: StreamErrorKind,
    pub seeking: bool,
    /// A track follows the failed one in the queue.
    pub has_next: bool,
    pub auto_continuation: bool,
}

/// Tiered decision table for stream failures.
#[derive(Debug, Clone)]
pub struct RecoveryPolicy {
    config: RecoveryConfig,
}

impl RecoveryPolicy {
    pub fn new(config: RecoveryConfig) -> Self {
        Self { config }
    }

    pub fn transition_timeout(&self) -> Duration {
        Duration::from_millis(self.config.transition_timeout_ms)
    }

    pub fn max_recommendation_attempts(&self) -> u32 {
        self.config.max_recommendation_attempts.max(1)
    }

    pub fn backoff(&self, count: u32) -> Duration {
        let ms = self
            .config
            .backoff_step_ms
            .saturating_mul(count.max(1) as u64)
            .min(self.config.backoff_cap_ms);
        Duration::from_millis(ms)
    }

    /// Records the failure in `counters` and picks the next step.
    pub fn decide(&self, counters: &mut ErrorCounters, ctx: FailureContext<'_>) -> RecoveryDecision {
        if ctx.seeking {
            return RecoveryDecision::new(RecoveryAction::Suppress, Duration::ZERO);
        }

        let stats = counters.record(ctx.track, ctx.kind);
        let consecutive = counters.consecutive;
        let systemic = self.config.systemic_threshold;

        if consecutive > systemic.saturating_mul(2) {
            return RecoveryDecision {
                action: RecoveryAction::Stop,
                delay: Duration::ZERO,
                systemic: true,
                disable_auto_continuation: true,
            };
        }

        if consecutive > systemic {
            let mut decision = RecoveryDecision::new(self.fallback(&ctx), Duration::ZERO);
            decision.systemic = true;
            return decision;
        }

        let terminal = stats.restricted > 0 || stats.forbidden >= self.config.forbidden_threshold;
        if terminal || stats.total >= self.config.track_threshold {
            return RecoveryDecision::new(
                self.fallback(&ctx),
                Duration::from_millis(self.config.skip_delay_ms),
            );
        }

        RecoveryDecision::new(RecoveryAction::Retry, self.backoff(stats.total))
    }

    fn fallback(&self, ctx: &FailureContext<'_>) -> RecoveryAction {
        if ctx.has_next {
            RecoveryAction::SkipToNext
        } else if ctx.auto_continuation {
            RecoveryAction::Recommend
        } else {
            RecoveryAction::Stop
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RecoveryPolicy {
        RecoveryPolicy::new(RecoveryConfig::default())
    }

    fn ctx(track: &TrackId, kind: StreamErrorKind) -> FailureContext<'_> {
        FailureContext {
            track,
            kind,
            seeking: false,
            has_next: true,
            auto_continuation: true,
        }
    }

    #[test]
    fn test_seek_suppresses_without_counting() {
        let policy = policy();
        let mut counters = ErrorCounters::default();
        let id = TrackId::from("t");
        let decision = policy.decide(
            &mut counters,
            FailureContext {
                seeking: true,
                ..ctx(&id, StreamErrorKind::Transport)
            },
        );
        assert_eq!(decision.action, RecoveryAction::Suppress);
        assert_eq!(counters.consecutive, 0);
        assert_eq!(counters.track(&id).total, 0);
    }

    #[test]
    fn test_retry_backoff_grows_and_caps() {
        let policy = policy();
        let mut counters = ErrorCounters::default();
        let id = TrackId::from("t");

        let delays: Vec<_> = (0..4)
            .map(|_| {
                let d = policy.decide(&mut counters, ctx(&id, StreamErrorKind::Transport));
                assert_eq!(d.action, RecoveryAction::Retry);
                d.delay.as_millis()
            })
            .collect();
        assert_eq!(delays, [1000, 2000, 3000, 3000]);
    }

    #[test]
    fn test_track_threshold_skips_with_delay() {
        let policy = policy();
        let mut counters = ErrorCounters::default();
        let id = TrackId::from("t");
        for _ in 0..4 {
            policy.decide(&mut counters, ctx(&id, StreamErrorKind::Unavailable));
        }
        let decision = policy.decide(&mut counters, ctx(&id, StreamErrorKind::Unavailable));
        assert_eq!(decision.action, RecoveryAction::SkipToNext);
        assert_eq!(decision.delay, Duration::from_millis(500));
        assert!(!decision.systemic);
    }

    #[test]
    fn test_restricted_is_terminal_immediately() {
        let policy = policy();
        let mut counters = ErrorCounters::default();
        let id = TrackId::from("t");
        let decision = policy.decide(
            &mut counters,
            FailureContext {
                has_next: false,
                ..ctx(&id, StreamErrorKind::Restricted)
            },
        );
        assert_eq!(decision.action, RecoveryAction::Recommend);
    }

    #[test]
    fn test_forbidden_needs_three_hits() {
        let policy = policy();
        let mut counters = ErrorCounters::default();
        let id = TrackId::from("t");
        let no_auto = |id| FailureContext {
            has_next: false,
            auto_continuation: false,
            ..ctx(id, StreamErrorKind::Forbidden)
        };
        assert_eq!(policy.decide(&mut counters, no_auto(&id)).action, RecoveryAction::Retry);
        assert_eq!(policy.decide(&mut counters, no_auto(&id)).action, RecoveryAction::Retry);
        assert_eq!(policy.decide(&mut counters, no_auto(&id)).action, RecoveryAction::Stop);
    }

    #[test]
    fn test_systemic_escalation() {
        let policy = policy();
        let mut counters = ErrorCounters::default();

        // Fresh track each time so only the session-wide count grows.
        for i in 0..8 {
            let id = TrackId::from(format!("t{}", i).as_str());
            let d = policy.decide(&mut counters, ctx(&id, StreamErrorKind::Transport));
            assert_eq!(d.action, RecoveryAction::Retry);
        }

        let id = TrackId::from("t8");
        let d = policy.decide(&mut counters, ctx(&id, StreamErrorKind::Transport));
        assert!(d.systemic);
        assert_eq!(d.action, RecoveryAction::SkipToNext);
        assert_eq!(d.delay, Duration::ZERO);

        for i in 9..16 {
            let id = TrackId::from(format!("t{}", i).as_str());
            policy.decide(&mut counters, ctx(&id, StreamErrorKind::Transport));
        }
        let id = TrackId::from("t16");
        let d = policy.decide(&mut counters, ctx(&id, StreamErrorKind::Transport));
        assert_eq!(d.action, RecoveryAction::Stop);
        assert!(d.disable_auto_continuation);
    }

    #[test]
    fn test_natural_finish_resets_consecutive() {
        let mut counters = ErrorCounters::default();
        let id = TrackId::from("t");
        counters.record(&id, StreamErrorKind::Transport);
        counters.record(&id, StreamErrorKind::Transport);
        counters.finished(&id);
        assert_eq!(counters.consecutive, 0);
        assert_eq!(counters.track(&id), TrackErrorStats::default());
    }

    #[test]
    fn test_end_streak_keeps_per_track_counts() {
        let mut counters = ErrorCounters::default();
        let id = TrackId::from("t");
        counters.record(&id, StreamErrorKind::Transport);
        counters.record(&id, StreamErrorKind::Forbidden);
        counters.end_streak();
        assert_eq!(counters.consecutive, 0);
        assert_eq!(counters.track(&id).total, 2);
        assert_eq!(counters.track(&id).forbidden, 1);
    }
}
