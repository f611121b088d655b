use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{broadcast, mpsc::UnboundedSender, oneshot},
    time::Instant,
};
use tracing::{debug, warn};

use super::{
    clock::PositionClock,
    history::PlayHistory,
    prefetch::PrefetchScheduler,
    queue::Queue,
    recovery::{ErrorCounters, RecoveryDecision, RecoveryPolicy},
    state::{LoopMode, PendingStop, PlayerStatus, QueueInfo},
    timers::{TimerFired, TimerSlot, Timers},
};
use crate::{
    common::{
        StreamError,
        types::{GuildId, StreamToken, TrackId},
    },
    configs::Config,
    persistence::{PersistenceStore, SaveDecision, SaveThrottle, SessionSnapshot},
    protocol::{PlayerEvent, tracks::Track},
    recommend::{RecommendError, Recommender},
    sources::{AudioStream, SourceError, SourceResolver},
    voice::VoiceTransport,
};

/// External services a session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn SourceResolver>,
    pub transport: Arc<dyn VoiceTransport>,
    pub recommender: Option<Arc<dyn Recommender>>,
    pub store: Option<Arc<dyn PersistenceStore>>,
}

/// Why a stream is being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPurpose {
    /// A track starting from the top.
    Start,
    /// The same track again after a failure.
    Retry,
    Seek { target_ms: u64 },
}

/// Work scheduled on one of the session timers.
#[derive(Debug, Clone)]
pub enum TimerAction {
    Prefetch(TrackId),
    Advance,
    Recovery {
        decision: RecoveryDecision,
        track_id: TrackId,
    },
    TransitionDeadline,
    StartTimeout(StreamToken),
    Persist,
}

/// Results posted back to the session by its own spawned work.
pub enum Internal {
    Timer(TimerFired),
    Resolved {
        op: u64,
        track_id: TrackId,
        purpose: LoadPurpose,
        result: Result<AudioStream, StreamError>,
    },
    Recommended {
        op: u64,
        seed: Track,
        attempt: u32,
        result: Result<Option<Track>, RecommendError>,
    },
    Prewarmed {
        track_id: TrackId,
        url: String,
        result: Result<Option<String>, SourceError>,
    },
}

/// The stream currently handed to the transport.
#[derive(Debug, Clone)]
pub struct ActiveStream {
    pub token: StreamToken,
    pub track_id: TrackId,
    pub offset_ms: u64,
    /// Set on the first `Playing` report for this stream.
    pub started_at: Option<Instant>,
}

pub struct PlayerContext {
    pub guild_id: GuildId,
    pub config: Arc<Config>,
    pub status: PlayerStatus,
    pub queue: Queue,
    pub history: PlayHistory,
    pub clock: PositionClock,
    pub prefetch: PrefetchScheduler,
    pub policy: RecoveryPolicy,
    pub errors: ErrorCounters,
    pub volume: u8,
    pub loop_mode: LoopMode,
    pub shuffle: bool,
    pub auto_continuation: bool,
    pub last_token: StreamToken,
    pub active: Option<ActiveStream>,
    pub pending_stop: Option<PendingStop>,
    /// Generation of the in-flight resolve/recommend; older results are dropped.
    pub op: u64,
    /// Caller waiting for the outcome of the current load.
    pub waiter: Option<oneshot::Sender<bool>>,
    pub timers: Timers<TimerAction, Internal>,
    pub internal_tx: UnboundedSender<Internal>,
    pub events: broadcast::Sender<PlayerEvent>,
    pub throttle: SaveThrottle,
    pub services: Collaborators,
}

impl PlayerContext {
    pub fn new(
        guild_id: GuildId,
        config: Arc<Config>,
        services: Collaborators,
        internal_tx: UnboundedSender<Internal>,
        events: broadcast::Sender<PlayerEvent>,
    ) -> Self {
        Self {
            guild_id,
            status: PlayerStatus::Idle,
            queue: Queue::new(),
            history: PlayHistory::new(config.player.history_size),
            clock: PositionClock::new(),
            prefetch: PrefetchScheduler::new(&config.prefetch),
            policy: RecoveryPolicy::new(config.recovery.clone()),
            errors: ErrorCounters::default(),
            volume: config.player.default_volume.min(100),
            loop_mode: LoopMode::Off,
            shuffle: false,
            auto_continuation: config.player.auto_continuation,
            last_token: StreamToken::default(),
            active: None,
            pending_stop: None,
            op: 0,
            waiter: None,
            timers: Timers::new(internal_tx.clone(), Internal::Timer),
            internal_tx,
            events,
            throttle: SaveThrottle::new(Duration::from_millis(config.persistence.throttle_ms)),
            services,
            config,
        }
    }

    pub fn set_status(&mut self, status: PlayerStatus) {
        if self.status == status {
            return;
        }
        debug!("[{}] status {:?} -> {:?}", self.guild_id, self.status, status);
        self.status = status;
        self.emit(PlayerEvent::StatusChanged {
            guild_id: self.guild_id.clone(),
            status,
        });
    }

    pub fn emit(&self, event: PlayerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub fn emit_queue_update(&self) {
        self.emit(PlayerEvent::QueueUpdate {
            guild_id: self.guild_id.clone(),
            length: self.queue.len(),
            current_index: self.queue.current_index(),
            loop_mode: self.loop_mode,
        });
    }

    /// Starts a new generation of in-flight work. Whoever waited on the
    /// previous one is told it did not go through.
    pub fn next_op(&mut self) -> u64 {
        self.settle(false);
        self.op += 1;
        self.op
    }

    pub fn settle(&mut self, ok: bool) {
        if let Some(waiter) = self.waiter.take() {
            let _ = waiter.send(ok);
        }
    }

    pub fn next_token(&mut self) -> StreamToken {
        self.last_token = self.last_token.next();
        self.last_token
    }

    pub fn is_active_token(&self, token: StreamToken) -> bool {
        self.active.as_ref().is_some_and(|a| a.token == token)
    }

    pub fn gain(&self) -> f32 {
        self.volume as f32 / 100.0
    }

    pub fn duplicate_window(&self) -> usize {
        self.config.player.duplicate_window
    }

    pub fn min_play_duration(&self) -> Duration {
        Duration::from_millis(self.config.player.min_play_duration_ms)
    }

    /// Audio `active` actually delivered. Paused time does not count.
    pub fn played_ms(&self, active: &ActiveStream) -> u64 {
        if active.started_at.is_none() {
            return 0;
        }
        self.clock.elapsed_ms().saturating_sub(active.offset_ms)
    }

    /// Ends the consecutive-error streak once `active` has played past the
    /// minimum play duration.
    pub fn note_playback(&mut self, active: &ActiveStream) {
        if self.errors.consecutive == 0 {
            return;
        }
        let played_ms = self.played_ms(active);
        if played_ms >= self.config.player.min_play_duration_ms {
            debug!(
                "[{}] stream {} played {}ms, error streak of {} cleared",
                self.guild_id, active.token, played_ms, self.errors.consecutive
            );
            self.errors.end_streak();
        }
    }

    pub fn position_ms(&self) -> u64 {
        let elapsed = self.clock.elapsed_ms();
        match self.queue.current().and_then(Track::length_ms) {
            Some(len) => elapsed.min(len),
            None => elapsed,
        }
    }

    pub fn queue_info(&self) -> QueueInfo {
        let position_ms = self.position_ms();
        QueueInfo {
            guild_id: self.guild_id.clone(),
            queue: self.queue.tracks().to_vec(),
            current: self.queue.current().cloned(),
            current_index: self.queue.current_index(),
            status: self.status,
            playing: self.status == PlayerStatus::Playing,
            paused: self.status == PlayerStatus::Paused,
            volume: self.volume,
            loop_mode: self.loop_mode,
            shuffle: self.shuffle,
            auto_continuation: self.auto_continuation,
            length: self.queue.len(),
            remaining_ms: self.queue.remaining_ms(position_ms),
            position_ms,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            queue: self.queue.tracks().to_vec(),
            cursor: self.queue.current_index(),
            loop_mode: self.loop_mode,
            volume: self.volume,
            auto_continuation: self.auto_continuation,
        }
    }

    pub fn restore(&mut self, snapshot: SessionSnapshot) {
        let cursor = snapshot.valid_cursor();
        let tracks = snapshot
            .queue
            .into_iter()
            .map(|mut t| {
                if t.id.is_empty() {
                    t.id = TrackId::generate();
                }
                t.prefetch_resolved = None;
                t
            })
            .collect();

        self.queue = Queue::from_parts(tracks, cursor);
        self.loop_mode = snapshot.loop_mode;
        self.volume = snapshot.volume.min(100);
        self.auto_continuation = snapshot.auto_continuation;
    }

    /// Writes the session snapshot if it changed since the last write.
    /// A change that comes too soon after a write is written when the
    /// throttle window closes.
    pub async fn persist(&mut self, force: bool) {
        if !self.config.persistence.enabled {
            return;
        }
        let Some(store) = self.services.store.clone() else {
            return;
        };

        let snapshot = self.snapshot();
        match self.throttle.check(&snapshot, force) {
            SaveDecision::Save => {}
            SaveDecision::Unchanged => return,
            SaveDecision::Defer(wait) => {
                if !self.timers.is_armed(TimerSlot::Persist) {
                    self.timers.arm(TimerSlot::Persist, wait, TimerAction::Persist);
                }
                return;
            }
        }
        self.timers.cancel(TimerSlot::Persist);
        if let Err(e) = store.save(&self.guild_id, &snapshot).await {
            warn!("[{}] failed to save session: {}", self.guild_id, e);
            self.throttle.reset();
        }
    }

    /// Drops the stored snapshot; the current (cleared) state counts as
    /// written so it is not saved right back.
    pub async fn forget_persisted(&mut self) {
        let snapshot = self.snapshot();
        self.throttle.record(&snapshot);
        let Some(store) = self.services.store.clone() else {
            return;
        };
        if let Err(e) = store.clear(&self.guild_id).await {
            warn!("[{}] failed to clear saved session: {}", self.guild_id, e);
        }
    }
}
