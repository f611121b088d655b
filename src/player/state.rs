use serde::{Deserialize, Serialize};

use crate::{
    common::types::{GuildId, StreamToken, TrackId},
    protocol::tracks::Track,
};

/// Where a session is in its playback lifecycle.
///
/// `Loading`, `Seeking` and `Transitioning` are in-flight states: they last
/// while a resolver or recommender call is outstanding or a delayed advance
/// is pending, and they block every command that would start another stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayerStatus {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Transitioning,
    Seeking,
    Stopped,
}

/// Command families as far as status gating is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Play,
    Pause,
    Resume,
    Skip,
    Previous,
    Seek,
    JumpTo,
    Stop,
    /// Queue edits, mode toggles, volume and snapshots.
    Edit,
}

impl PlayerStatus {
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Loading | Self::Seeking | Self::Transitioning)
    }

    /// Whether a command of `kind` may run in this status.
    pub fn accepts(self, kind: CommandKind) -> bool {
        use CommandKind as C;
        match (self, kind) {
            (_, C::Edit | C::Stop) => true,
            (s, _) if s.is_in_flight() => false,
            (Self::Playing, C::Pause) | (Self::Paused, C::Resume) => true,
            (_, C::Pause | C::Resume) => false,
            (Self::Playing | Self::Paused, C::Seek) => true,
            (_, C::Seek) => false,
            (_, C::Play | C::Skip | C::Previous | C::JumpTo) => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    #[default]
    Off,
    Track,
    Queue,
}

impl LoopMode {
    /// Off -> Track -> Queue -> Off.
    pub fn next(self) -> Self {
        match self {
            Self::Off => Self::Track,
            Self::Track => Self::Queue,
            Self::Queue => Self::Off,
        }
    }
}

/// Why the session itself tore a stream down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Skip,
    Seek,
    /// Another stream is taking its place (play, jump, removal).
    Replaced,
    Stopped,
    Cleared,
}

/// Tag set right before an intentional stop; the idle event of that stream
/// consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingStop {
    pub token: StreamToken,
    pub reason: StopReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    Queued { index: usize, track_id: TrackId },
    SkippedDuplicate(Track),
}

impl EnqueueOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }
}

/// Read-only view of a session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueInfo {
    pub guild_id: GuildId,
    pub queue: Vec<Track>,
    pub current: Option<Track>,
    pub current_index: Option<usize>,
    pub status: PlayerStatus,
    pub playing: bool,
    pub paused: bool,
    pub volume: u8,
    pub loop_mode: LoopMode,
    pub shuffle: bool,
    pub auto_continuation: bool,
    pub length: usize,
    /// Rest of the current track plus everything after it.
    pub remaining_ms: u64,
    pub position_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_mode_cycles() {
        assert_eq!(LoopMode::Off.next(), LoopMode::Track);
        assert_eq!(LoopMode::Track.next(), LoopMode::Queue);
        assert_eq!(LoopMode::Queue.next(), LoopMode::Off);
    }

    #[test]
    fn test_in_flight_states_block_stream_commands() {
        for status in [
            PlayerStatus::Loading,
            PlayerStatus::Seeking,
            PlayerStatus::Transitioning,
        ] {
            for kind in [
                CommandKind::Play,
                CommandKind::Skip,
                CommandKind::Previous,
                CommandKind::Seek,
                CommandKind::JumpTo,
                CommandKind::Pause,
                CommandKind::Resume,
            ] {
                assert!(!status.accepts(kind), "{:?} accepted {:?}", status, kind);
            }
            assert!(status.accepts(CommandKind::Edit));
            assert!(status.accepts(CommandKind::Stop));
        }
    }

    #[test]
    fn test_pause_resume_only_from_complementary_state() {
        assert!(PlayerStatus::Playing.accepts(CommandKind::Pause));
        assert!(!PlayerStatus::Paused.accepts(CommandKind::Pause));
        assert!(PlayerStatus::Paused.accepts(CommandKind::Resume));
        assert!(!PlayerStatus::Playing.accepts(CommandKind::Resume));
        assert!(!PlayerStatus::Idle.accepts(CommandKind::Resume));
    }

    #[test]
    fn test_seek_needs_an_active_stream() {
        assert!(PlayerStatus::Playing.accepts(CommandKind::Seek));
        assert!(PlayerStatus::Paused.accepts(CommandKind::Seek));
        assert!(!PlayerStatus::Idle.accepts(CommandKind::Seek));
        assert!(!PlayerStatus::Stopped.accepts(CommandKind::Seek));
    }
}
