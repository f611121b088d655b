use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Exception severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Common,
    Suspicious,
    Fault,
}

/// Errors returned by the public player API.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("invalid command: {0}")]
    InvalidCommand(#[from] InvalidCommand),

    /// The session task has shut down and no longer accepts commands.
    #[error("player session is closed")]
    Closed,

    #[error("search failed: {0}")]
    Search(String),
}

/// Rejections for malformed commands. These never change session state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidCommand {
    #[error("cannot seek to a negative position")]
    NegativeSeek,

    #[error("index {index} is out of bounds for a queue of {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("volume {0} is outside 0..=100")]
    VolumeOutOfRange(i64),
}

/// Classification of a stream failure, used by the recovery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StreamErrorKind {
    /// The resolver returned nothing, or a stream that was not readable.
    Unavailable,
    /// The transport failed mid-stream, including connectivity loss.
    Transport,
    /// The stream ended before the minimum play duration.
    TooShort,
    /// Permanent failure signal from upstream (e.g. HTTP 403).
    Forbidden,
    /// Rights or DRM restriction; never retried.
    Restricted,
    /// The transport never reported playing.
    Stuck,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct StreamError {
    pub kind: StreamErrorKind,
    pub message: String,
}

impl StreamError {
    pub fn new(kind: StreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StreamErrorKind::Unavailable, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(StreamErrorKind::Transport, message)
    }

    pub fn severity(&self) -> Severity {
        match self.kind {
            StreamErrorKind::Forbidden | StreamErrorKind::Restricted => Severity::Common,
            StreamErrorKind::TooShort | StreamErrorKind::Stuck => Severity::Suspicious,
            StreamErrorKind::Unavailable | StreamErrorKind::Transport => Severity::Fault,
        }
    }
}
