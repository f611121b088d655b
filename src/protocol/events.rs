use serde::Serialize;

use crate::{
    common::{Severity, StreamError, types::GuildId},
    player::{LoopMode, PlayerStatus, RecoveryAction},
    protocol::tracks::Track,
};

/// Notifications broadcast by a player session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    #[serde(rename = "TrackStartEvent")]
    #[serde(rename_all = "camelCase")]
    TrackStart { guild_id: GuildId, track: Track },

    #[serde(rename = "TrackEndEvent")]
    #[serde(rename_all = "camelCase")]
    TrackEnd {
        guild_id: GuildId,
        track: Track,
        reason: TrackEndReason,
    },

    #[serde(rename = "TrackExceptionEvent")]
    #[serde(rename_all = "camelCase")]
    TrackException {
        guild_id: GuildId,
        track: Track,
        exception: TrackException,
    },

    #[serde(rename = "TrackStuckEvent")]
    #[serde(rename_all = "camelCase")]
    TrackStuck {
        guild_id: GuildId,
        track: Track,
        threshold_ms: u64,
    },

    #[serde(rename = "QueueUpdateEvent")]
    #[serde(rename_all = "camelCase")]
    QueueUpdate {
        guild_id: GuildId,
        length: usize,
        current_index: Option<usize>,
        loop_mode: LoopMode,
    },

    #[serde(rename = "StatusChangedEvent")]
    #[serde(rename_all = "camelCase")]
    StatusChanged {
        guild_id: GuildId,
        status: PlayerStatus,
    },

    #[serde(rename = "RecoveryScheduledEvent")]
    #[serde(rename_all = "camelCase")]
    RecoveryScheduled {
        guild_id: GuildId,
        track: Track,
        action: RecoveryAction,
        delay_ms: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Skipped,
    Cleanup,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackException {
    pub message: Option<String>,
    pub severity: Severity,
    pub cause: String,
}

impl From<&StreamError> for TrackException {
    fn from(err: &StreamError) -> Self {
        Self {
            message: Some(err.message.clone()),
            severity: err.severity(),
            cause: format!("{:?}", err.kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_end_serializes_like_lavalink() {
        let event = PlayerEvent::TrackEnd {
            guild_id: GuildId::from("42"),
            track: Track::new("https://x.test/a.mp3", "A", "B"),
            reason: TrackEndReason::LoadFailed,
        };
        let json = serde_json::to_value(&event).expect("event serializes");
        assert_eq!(json["type"], "TrackEndEvent");
        assert_eq!(json["guildId"], "42");
        assert_eq!(json["reason"], "loadFailed");
        assert_eq!(json["track"]["title"], "A");
    }

    #[test]
    fn test_exception_from_stream_error() {
        let err = StreamError::new(crate::common::StreamErrorKind::Forbidden, "status 403");
        let exception = TrackException::from(&err);
        assert_eq!(exception.message.as_deref(), Some("status 403"));
        assert_eq!(exception.severity, Severity::Common);
        assert_eq!(exception.cause, "Forbidden");
    }
}
