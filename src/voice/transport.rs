use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use crate::{
    common::{
        StreamError,
        types::{GuildId, StreamToken},
    },
    sources::AudioStream,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    Playing,
    Paused,
    Buffering,
    /// The stream ended, either naturally or because it was stopped.
    Idle,
    Error(StreamError),
}

/// Event reported by the voice transport about one handed-over stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub token: StreamToken,
    pub kind: TransportEventKind,
}

impl TransportEvent {
    pub fn new(token: StreamToken, kind: TransportEventKind) -> Self {
        Self { token, kind }
    }
}

/// Sink that carries audio to the remote voice endpoint.
///
/// Implementations report progress through the event sender they were
/// created with, tagging every event with the token of the stream it
/// concerns.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Start playing `stream`, replacing anything currently playing.
    async fn play(
        &self,
        token: StreamToken,
        stream: AudioStream,
        volume: f32,
    ) -> Result<(), StreamError>;

    fn stop(&self, force_flush: bool);

    fn pause(&self) -> bool;

    fn unpause(&self) -> bool;

    fn set_volume(&self, volume: f32);
}

/// Builds one transport per session.
pub trait TransportFactory: Send + Sync {
    fn create(
        &self,
        guild_id: &GuildId,
        events: UnboundedSender<TransportEvent>,
    ) -> Arc<dyn VoiceTransport>;
}
