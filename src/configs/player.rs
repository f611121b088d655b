use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlayerConfig {
    #[serde(default = "default_volume")]
    pub default_volume: u8,
    /// Fetch a recommendation when the queue runs out.
    #[serde(default = "default_true")]
    pub auto_continuation: bool,
    /// Pause between stopping a live stream and starting its replacement.
    #[serde(default = "default_play_grace_ms")]
    pub play_grace_ms: u64,
    #[serde(default = "default_skip_settle_ms")]
    pub skip_settle_ms: u64,
    /// Streams that end sooner than this are treated as failures.
    #[serde(default = "default_min_play_duration_ms")]
    pub min_play_duration_ms: u64,
    /// How long the transport may take to report playing before the track
    /// is considered stuck.
    #[serde(default = "default_start_timeout_ms")]
    pub start_timeout_ms: u64,
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    /// Number of most recent history entries checked for duplicates.
    #[serde(default = "default_duplicate_window")]
    pub duplicate_window: usize,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
            auto_continuation: true,
            play_grace_ms: default_play_grace_ms(),
            skip_settle_ms: default_skip_settle_ms(),
            min_play_duration_ms: default_min_play_duration_ms(),
            start_timeout_ms: default_start_timeout_ms(),
            history_size: default_history_size(),
            duplicate_window: default_duplicate_window(),
            event_capacity: default_event_capacity(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PrefetchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Prefetch starts this long before the current track ends.
    #[serde(default = "default_lead_ms")]
    pub lead_ms: u64,
    /// Upcoming tracks warmed per prefetch (1..=5).
    #[serde(default = "default_depth")]
    pub depth: usize,
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lead_ms: default_lead_ms(),
            depth: default_depth(),
            cache_ttl_ms: default_cache_ttl_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RecoveryConfig {
    /// Session-wide consecutive errors above which failures are systemic.
    #[serde(default = "default_systemic_threshold")]
    pub systemic_threshold: u32,
    /// Per-track errors at which a track is given up on.
    #[serde(default = "default_track_threshold")]
    pub track_threshold: u32,
    /// Occurrences of a permanent failure signal that make a track terminal.
    #[serde(default = "default_forbidden_threshold")]
    pub forbidden_threshold: u32,
    #[serde(default = "default_backoff_step_ms")]
    pub backoff_step_ms: u64,
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    #[serde(default = "default_skip_delay_ms")]
    pub skip_delay_ms: u64,
    /// Hard ceiling after which a stuck transition is force-cleared.
    #[serde(default = "default_transition_timeout_ms")]
    pub transition_timeout_ms: u64,
    #[serde(default = "default_max_recommendation_attempts")]
    pub max_recommendation_attempts: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            systemic_threshold: default_systemic_threshold(),
            track_threshold: default_track_threshold(),
            forbidden_threshold: default_forbidden_threshold(),
            backoff_step_ms: default_backoff_step_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            skip_delay_ms: default_skip_delay_ms(),
            transition_timeout_ms: default_transition_timeout_ms(),
            max_recommendation_attempts: default_max_recommendation_attempts(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PersistenceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Minimum time between two writes of a changed snapshot.
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            throttle_ms: default_throttle_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_volume() -> u8 {
    80
}

fn default_play_grace_ms() -> u64 {
    300
}

fn default_skip_settle_ms() -> u64 {
    250
}

fn default_min_play_duration_ms() -> u64 {
    5_000
}

fn default_start_timeout_ms() -> u64 {
    10_000
}

fn default_history_size() -> usize {
    50
}

fn default_duplicate_window() -> usize {
    20
}

fn default_event_capacity() -> usize {
    256
}

fn default_lead_ms() -> u64 {
    30_000
}

fn default_depth() -> usize {
    2
}

fn default_cache_ttl_ms() -> u64 {
    120_000
}

fn default_systemic_threshold() -> u32 {
    8
}

fn default_track_threshold() -> u32 {
    5
}

fn default_forbidden_threshold() -> u32 {
    3
}

fn default_backoff_step_ms() -> u64 {
    1_000
}

fn default_backoff_cap_ms() -> u64 {
    3_000
}

fn default_skip_delay_ms() -> u64 {
    500
}

fn default_transition_timeout_ms() -> u64 {
    15_000
}

fn default_max_recommendation_attempts() -> u32 {
    3
}

fn default_throttle_ms() -> u64 {
    5_000
}
