use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, trace, warn};

use super::{
    context::{Internal, PlayerContext, TimerAction},
    state::{EnqueueOutcome, LoopMode, QueueInfo, StopReason},
};
use crate::{common::InvalidCommand, protocol::tracks::Track, voice::TransportEvent};

pub mod advance;
pub mod commands;
pub mod error;
pub mod events;
pub mod prefetch;
pub mod start;

/// Requests sent from a [`super::PlayerHandle`] to its session task.
pub enum Command {
    Enqueue {
        tracks: Vec<Track>,
        reply: oneshot::Sender<Vec<EnqueueOutcome>>,
    },
    Remove {
        index: usize,
        reply: oneshot::Sender<Result<Track, InvalidCommand>>,
    },
    Move {
        from: usize,
        to: usize,
        reply: oneshot::Sender<Result<bool, InvalidCommand>>,
    },
    JumpTo {
        index: usize,
        reply: oneshot::Sender<Result<bool, InvalidCommand>>,
    },
    Play {
        reply: oneshot::Sender<bool>,
    },
    Pause {
        reply: oneshot::Sender<bool>,
    },
    Resume {
        reply: oneshot::Sender<bool>,
    },
    Skip {
        reply: oneshot::Sender<bool>,
    },
    Previous {
        reply: oneshot::Sender<bool>,
    },
    Seek {
        seconds: f64,
        reply: oneshot::Sender<Result<bool, InvalidCommand>>,
    },
    Stop {
        user_initiated: bool,
        reply: oneshot::Sender<bool>,
    },
    ToggleShuffle {
        reply: oneshot::Sender<bool>,
    },
    ToggleRepeat {
        reply: oneshot::Sender<LoopMode>,
    },
    SetLoopMode {
        mode: LoopMode,
        reply: oneshot::Sender<()>,
    },
    SetAutoPlay {
        enabled: bool,
        reply: oneshot::Sender<()>,
    },
    SetVolume {
        volume: i64,
        reply: oneshot::Sender<Result<u8, InvalidCommand>>,
    },
    ClearQueue {
        user_initiated: bool,
        reply: oneshot::Sender<()>,
    },
    QueueInfo {
        reply: oneshot::Sender<QueueInfo>,
    },
}

/// The task that owns one session.
///
/// Commands, transport reports and the session's own timer and resolver
/// results are handled one at a time, so no state is ever shared.
pub struct PlayerActor {
    pub player: PlayerContext,
    pub commands: mpsc::Receiver<Command>,
    pub transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    pub internal: mpsc::UnboundedReceiver<Internal>,
    pub cancel: CancellationToken,
}

impl PlayerActor {
    pub async fn run(self) {
        let span = info_span!("player", guild = %self.player.guild_id);
        self.run_inner().instrument(span).await;
    }

    async fn run_inner(mut self) {
        self.restore().await;
        info!("[{}] player session started", self.player.guild_id);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.dispatch(cmd).await,
                    None => break,
                },
                Some(event) = self.transport_events.recv() => {
                    events::handle_transport_event(&mut self.player, event);
                }
                Some(msg) = self.internal.recv() => self.on_internal(msg).await,
            }
            self.player.persist(false).await;
        }

        self.shutdown().await;
    }

    async fn restore(&mut self) {
        if !self.player.config.persistence.enabled {
            return;
        }
        let Some(store) = self.player.services.store.clone() else {
            return;
        };

        match store.load(&self.player.guild_id).await {
            Ok(Some(snapshot)) => {
                info!(
                    "[{}] restored {} queued track(s)",
                    self.player.guild_id,
                    snapshot.queue.len()
                );
                self.player.restore(snapshot);
                self.player.emit_queue_update();
            }
            Ok(None) => {}
            Err(e) => warn!(
                "[{}] failed to load saved session: {}",
                self.player.guild_id, e
            ),
        }
    }

    async fn shutdown(&mut self) {
        let player = &mut self.player;
        player.next_op();
        start::stop_active(player, StopReason::Stopped);
        player.timers.clear_all();
        player.persist(true).await;
        info!("[{}] player session closed", player.guild_id);
    }

    async fn dispatch(&mut self, cmd: Command) {
        let player = &mut self.player;
        match cmd {
            Command::Enqueue { tracks, reply } => {
                let outcomes: Vec<_> = tracks
                    .into_iter()
                    .map(|track| commands::enqueue(player, track))
                    .collect();
                if outcomes.iter().any(EnqueueOutcome::is_queued) {
                    player.emit_queue_update();
                    commands::maybe_autostart(player);
                }
                let _ = reply.send(outcomes);
            }
            Command::Remove { index, reply } => {
                let _ = reply.send(commands::remove(player, index));
            }
            Command::Move { from, to, reply } => {
                let _ = reply.send(commands::move_track(player, from, to));
            }
            Command::JumpTo { index, reply } => {
                let (waiter, outcome) = oneshot::channel();
                match commands::jump_to(player, index, waiter) {
                    Ok(()) => forward(outcome, reply),
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Command::Play { reply } => commands::play(player, reply),
            Command::Pause { reply } => {
                let _ = reply.send(commands::pause(player));
            }
            Command::Resume { reply } => {
                let _ = reply.send(commands::resume(player));
            }
            Command::Skip { reply } => {
                let _ = reply.send(commands::skip(player));
            }
            Command::Previous { reply } => commands::previous(player, reply),
            Command::Seek { seconds, reply } => {
                let (waiter, outcome) = oneshot::channel();
                match commands::seek(player, seconds, waiter) {
                    Ok(()) => forward(outcome, reply),
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Command::Stop {
                user_initiated,
                reply,
            } => {
                let _ = reply.send(commands::stop(player, user_initiated));
            }
            Command::ToggleShuffle { reply } => {
                let _ = reply.send(commands::toggle_shuffle(player));
            }
            Command::ToggleRepeat { reply } => {
                let _ = reply.send(commands::toggle_repeat(player));
            }
            Command::SetLoopMode { mode, reply } => {
                commands::set_loop_mode(player, mode);
                let _ = reply.send(());
            }
            Command::SetAutoPlay { enabled, reply } => {
                debug!("[{}] auto-continuation: {}", player.guild_id, enabled);
                player.auto_continuation = enabled;
                let _ = reply.send(());
            }
            Command::SetVolume { volume, reply } => {
                let _ = reply.send(commands::set_volume(player, volume));
            }
            Command::ClearQueue {
                user_initiated,
                reply,
            } => {
                commands::clear_queue(player, user_initiated);
                player.forget_persisted().await;
                let _ = reply.send(());
            }
            Command::QueueInfo { reply } => {
                let _ = reply.send(player.queue_info());
            }
        }
    }

    async fn on_internal(&mut self, msg: Internal) {
        let player = &mut self.player;
        match msg {
            Internal::Timer(fired) => match player.timers.fire(fired) {
                Some(action) => on_timer(player, action).await,
                None => trace!("[{}] stale {:?} timer", player.guild_id, fired.slot),
            },
            Internal::Resolved {
                op,
                track_id,
                purpose,
                result,
            } => start::on_resolved(player, op, track_id, purpose, result).await,
            Internal::Recommended {
                op,
                seed,
                attempt,
                result,
            } => advance::on_recommended(player, op, seed, attempt, result),
            Internal::Prewarmed {
                track_id,
                url,
                result,
            } => prefetch::on_prewarmed(player, track_id, url, result),
        }
    }
}

async fn on_timer(player: &mut PlayerContext, action: TimerAction) {
    match action {
        TimerAction::Prefetch(track_id) => prefetch::on_prefetch_timer(player, track_id),
        TimerAction::Advance => advance::on_advance(player),
        TimerAction::Recovery { decision, track_id } => {
            error::execute_recovery(player, decision, track_id).await
        }
        TimerAction::TransitionDeadline => error::on_transition_deadline(player),
        TimerAction::StartTimeout(token) => error::on_start_timeout(player, token),
        // The loop saves after every step.
        TimerAction::Persist => {}
    }
}

/// Answers `reply` once the load behind `outcome` settles.
fn forward(
    outcome: oneshot::Receiver<bool>,
    reply: oneshot::Sender<Result<bool, InvalidCommand>>,
) {
    tokio::spawn(async move {
        let ok = outcome.await.unwrap_or(false);
        let _ = reply.send(Ok(ok));
    });
}
