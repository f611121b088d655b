use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{
    context::{Collaborators, PlayerContext},
    manager::{Command, PlayerActor},
    state::{EnqueueOutcome, LoopMode, QueueInfo},
};
use crate::{
    common::{PlayerError, types::GuildId},
    configs::Config,
    persistence::PersistenceStore,
    protocol::{PlayerEvent, tracks::Track},
    recommend::Recommender,
    sources::SourceResolver,
    voice::TransportFactory,
};

const COMMAND_BUFFER: usize = 64;

/// Shared services every session is built from.
#[derive(Clone)]
pub struct PlayerServices {
    pub resolver: Arc<dyn SourceResolver>,
    pub transports: Arc<dyn TransportFactory>,
    pub recommender: Option<Arc<dyn Recommender>>,
    pub store: Option<Arc<dyn PersistenceStore>>,
}

/// Cheap, cloneable front of a running session.
///
/// Every call is a message to the session task. Once that task is gone
/// calls fail with [`PlayerError::Closed`].
#[derive(Clone)]
pub struct PlayerHandle {
    guild_id: GuildId,
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<PlayerEvent>,
    resolver: Arc<dyn SourceResolver>,
    cancel: CancellationToken,
}

impl PlayerHandle {
    /// Starts a session task for `guild_id` and returns its handle. A saved
    /// session for the same key is restored before any command runs.
    pub fn spawn(guild_id: GuildId, config: Arc<Config>, services: &PlayerServices) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.player.event_capacity);
        let cancel = CancellationToken::new();

        let transport = services.transports.create(&guild_id, transport_tx);
        let collaborators = Collaborators {
            resolver: services.resolver.clone(),
            transport,
            recommender: services.recommender.clone(),
            store: services.store.clone(),
        };

        let player = PlayerContext::new(
            guild_id.clone(),
            config,
            collaborators,
            internal_tx,
            events.clone(),
        );
        let actor = PlayerActor {
            player,
            commands: commands_rx,
            transport_events: transport_rx,
            internal: internal_rx,
            cancel: cancel.clone(),
        };
        tokio::spawn(actor.run());
        debug!("[{}] spawned player session", guild_id);

        Self {
            guild_id,
            commands: commands_tx,
            events,
            resolver: services.resolver.clone(),
            cancel,
        }
    }

    pub fn guild_id(&self) -> &GuildId {
        &self.guild_id
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, PlayerError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| PlayerError::Closed)?;
        rx.await.map_err(|_| PlayerError::Closed)
    }

    pub async fn add_to_queue(&self, track: Track) -> Result<EnqueueOutcome, PlayerError> {
        let mut outcomes = self.add_many(vec![track]).await?;
        outcomes.pop().ok_or(PlayerError::Closed)
    }

    /// Enqueues `tracks` in order; duplicates come back tagged instead of
    /// being queued.
    pub async fn add_many(&self, tracks: Vec<Track>) -> Result<Vec<EnqueueOutcome>, PlayerError> {
        self.request(|reply| Command::Enqueue { tracks, reply })
            .await
    }

    pub async fn remove_from_queue(&self, index: usize) -> Result<Track, PlayerError> {
        Ok(self
            .request(|reply| Command::Remove { index, reply })
            .await??)
    }

    pub async fn move_in_queue(&self, from: usize, to: usize) -> Result<bool, PlayerError> {
        Ok(self
            .request(|reply| Command::Move { from, to, reply })
            .await??)
    }

    /// Plays the track at `index`. Resolves to whether it started.
    pub async fn jump_to(&self, index: usize) -> Result<bool, PlayerError> {
        Ok(self
            .request(|reply| Command::JumpTo { index, reply })
            .await??)
    }

    pub async fn play(&self) -> Result<bool, PlayerError> {
        self.request(|reply| Command::Play { reply }).await
    }

    pub async fn pause(&self) -> Result<bool, PlayerError> {
        self.request(|reply| Command::Pause { reply }).await
    }

    pub async fn resume(&self) -> Result<bool, PlayerError> {
        self.request(|reply| Command::Resume { reply }).await
    }

    pub async fn skip(&self) -> Result<bool, PlayerError> {
        self.request(|reply| Command::Skip { reply }).await
    }

    pub async fn previous(&self) -> Result<bool, PlayerError> {
        self.request(|reply| Command::Previous { reply }).await
    }

    /// Restarts the current track at `seconds`. Negative or non-finite
    /// positions are rejected without touching the session.
    pub async fn seek(&self, seconds: f64) -> Result<bool, PlayerError> {
        Ok(self
            .request(|reply| Command::Seek { seconds, reply })
            .await??)
    }

    pub async fn stop(&self, user_initiated: bool) -> Result<bool, PlayerError> {
        self.request(|reply| Command::Stop {
            user_initiated,
            reply,
        })
        .await
    }

    pub async fn toggle_shuffle(&self) -> Result<bool, PlayerError> {
        self.request(|reply| Command::ToggleShuffle { reply }).await
    }

    /// Cycles Off -> Track -> Queue -> Off.
    pub async fn toggle_repeat(&self) -> Result<LoopMode, PlayerError> {
        self.request(|reply| Command::ToggleRepeat { reply }).await
    }

    pub async fn set_loop_mode(&self, mode: LoopMode) -> Result<(), PlayerError> {
        self.request(|reply| Command::SetLoopMode { mode, reply })
            .await
    }

    pub async fn set_auto_play(&self, enabled: bool) -> Result<(), PlayerError> {
        self.request(|reply| Command::SetAutoPlay { enabled, reply })
            .await
    }

    pub async fn set_volume(&self, volume: i64) -> Result<u8, PlayerError> {
        Ok(self
            .request(|reply| Command::SetVolume { volume, reply })
            .await??)
    }

    pub async fn clear_queue(&self, user_initiated: bool) -> Result<(), PlayerError> {
        self.request(|reply| Command::ClearQueue {
            user_initiated,
            reply,
        })
        .await
    }

    pub async fn queue_info(&self) -> Result<QueueInfo, PlayerError> {
        self.request(|reply| Command::QueueInfo { reply }).await
    }

    /// Looks tracks up through the session's resolver. Does not touch the
    /// queue.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>, PlayerError> {
        self.resolver
            .search(query, limit)
            .await
            .map_err(|e| PlayerError::Search(e.to_string()))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    /// Stops playback, saves the session and ends its task.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}
