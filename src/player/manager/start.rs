use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::{error::handle_failure, prefetch::arm_prefetch};
use crate::{
    common::{StreamError, types::TrackId},
    player::{
        context::{ActiveStream, Internal, LoadPurpose, PlayerContext, TimerAction},
        state::{PendingStop, PlayerStatus, StopReason},
        timers::TimerSlot,
    },
    protocol::{PlayerEvent, TrackEndReason, TrackException},
    sources::{AudioStream, ResolveOptions},
};

/// Tears the active stream down, tagging it so its idle report is not
/// taken for a natural end. Returns true if something was playing.
pub fn stop_active(player: &mut PlayerContext, reason: StopReason) -> bool {
    let Some(active) = player.active.take() else {
        return false;
    };
    player.note_playback(&active);

    player.pending_stop = Some(PendingStop {
        token: active.token,
        reason,
    });
    player.services.transport.stop(true);
    player.timers.cancel(TimerSlot::StartTimeout);
    player.timers.cancel(TimerSlot::Prefetch);

    let end_reason = match reason {
        StopReason::Skip => Some(TrackEndReason::Skipped),
        StopReason::Replaced => Some(TrackEndReason::Replaced),
        StopReason::Stopped => Some(TrackEndReason::Stopped),
        StopReason::Cleared => Some(TrackEndReason::Cleanup),
        StopReason::Seek => None,
    };
    if let Some(end_reason) = end_reason {
        if let Some(track) = player.queue.position_of(&active.track_id).and_then(|i| player.queue.get(i)) {
            player.emit(PlayerEvent::TrackEnd {
                guild_id: player.guild_id.clone(),
                track: track.clone(),
                reason: end_reason,
            });
        }
    }

    debug!(
        "[{}] stopped stream {} ({:?})",
        player.guild_id, active.token, reason
    );
    true
}

/// Resolves the track at `index` and hands it to the transport once the
/// resolver answers. `waiter` is told whether the stream went out.
pub fn begin_load(
    player: &mut PlayerContext,
    index: usize,
    purpose: LoadPurpose,
    waiter: Option<oneshot::Sender<bool>>,
) -> bool {
    let Some(track) = player.queue.get(index).cloned() else {
        if let Some(waiter) = waiter {
            let _ = waiter.send(false);
        }
        return false;
    };

    // -- 1. Make room for the new stream -----------------------------------
    let stop_reason = match purpose {
        LoadPurpose::Seek { .. } => StopReason::Seek,
        _ => StopReason::Replaced,
    };
    let had_stream = stop_active(player, stop_reason);

    player.queue.set_current(Some(index));
    let op = player.next_op();
    player.waiter = waiter;
    player.timers.cancel(TimerSlot::Advance);
    player.timers.cancel(TimerSlot::Recovery);

    match purpose {
        LoadPurpose::Seek { .. } => player.set_status(PlayerStatus::Seeking),
        _ => {
            player.clock.reset();
            player.set_status(PlayerStatus::Loading);
        }
    }
    player.timers.arm(
        TimerSlot::TransitionDeadline,
        player.policy.transition_timeout(),
        TimerAction::TransitionDeadline,
    );

    // -- 2. Resolve off the actor ------------------------------------------
    let grace = match purpose {
        LoadPurpose::Start if had_stream => Duration::from_millis(player.config.player.play_grace_ms),
        _ => Duration::ZERO,
    };
    let options = match purpose {
        LoadPurpose::Seek { target_ms } => ResolveOptions::seek(target_ms),
        _ => ResolveOptions::default(),
    };

    debug!(
        "[{}] resolving '{}' ({:?}, op {})",
        player.guild_id, track.title, purpose, op
    );

    let resolver = player.services.resolver.clone();
    let tx = player.internal_tx.clone();
    tokio::spawn(async move {
        if !grace.is_zero() {
            tokio::time::sleep(grace).await;
        }

        let result = match resolver.resolve(&track, options).await {
            Ok(Some(stream)) if stream.is_readable() => Ok(stream),
            Ok(Some(mut stream)) => {
                stream.destroy();
                Err(StreamError::unavailable("resolved stream is not readable"))
            }
            Ok(None) => Err(StreamError::unavailable(format!(
                "no stream for {}",
                track.url
            ))),
            Err(e) => Err(e.to_stream_error()),
        };

        let _ = tx.send(Internal::Resolved {
            op,
            track_id: track.id,
            purpose,
            result,
        });
    });

    true
}

/// Handles the resolver's answer for a load started by [`begin_load`].
pub async fn on_resolved(
    player: &mut PlayerContext,
    op: u64,
    track_id: TrackId,
    purpose: LoadPurpose,
    result: Result<AudioStream, StreamError>,
) {
    if op != player.op {
        debug!("[{}] dropping stale resolve (op {})", player.guild_id, op);
        if let Ok(mut stream) = result {
            stream.destroy();
        }
        return;
    }
    player.timers.cancel(TimerSlot::TransitionDeadline);

    let Some(index) = player.queue.position_of(&track_id) else {
        if let Ok(mut stream) = result {
            stream.destroy();
        }
        player.settle(false);
        player.set_status(PlayerStatus::Idle);
        return;
    };
    player.queue.set_current(Some(index));

    let outcome = match result {
        Ok(stream) => handover(player, &track_id, purpose, stream).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(()) => player.settle(true),
        Err(e) => {
            player.settle(false);
            on_load_failed(player, &track_id, purpose, e);
        }
    }
}

async fn handover(
    player: &mut PlayerContext,
    track_id: &TrackId,
    purpose: LoadPurpose,
    stream: AudioStream,
) -> Result<(), StreamError> {
    let offset_ms = stream.offset_ms();
    let token = player.next_token();

    // -- 3. Hand the stream to the transport -------------------------------
    player
        .services
        .transport
        .play(token, stream, player.gain())
        .await?;

    player.active = Some(ActiveStream {
        token,
        track_id: track_id.clone(),
        offset_ms,
        started_at: None,
    });

    let Some(track) = player.queue.find_mut(track_id) else {
        return Ok(());
    };
    track.last_error = None;
    let track = track.clone();

    // -- 4. Bookkeeping and events -----------------------------------------
    match purpose {
        LoadPurpose::Seek { target_ms } => {
            player.clock.start(target_ms);
            info!(
                "[{}] seeked '{}' to {}ms",
                player.guild_id, track.title, target_ms
            );
        }
        LoadPurpose::Start | LoadPurpose::Retry => {
            if purpose == LoadPurpose::Start {
                player.history.push(track.clone());
            }
            info!(
                "[{}] playback starting: {} (source: {})",
                player.guild_id,
                track.title,
                track.source.as_str()
            );
            player.emit(PlayerEvent::TrackStart {
                guild_id: player.guild_id.clone(),
                track,
            });
        }
    }

    // -- 5. Expect a playing report within the start timeout ---------------
    player.timers.arm(
        TimerSlot::StartTimeout,
        Duration::from_millis(player.config.player.start_timeout_ms),
        TimerAction::StartTimeout(token),
    );
    Ok(())
}

fn on_load_failed(
    player: &mut PlayerContext,
    track_id: &TrackId,
    purpose: LoadPurpose,
    error: StreamError,
) {
    warn!("[{}] failed to load track: {}", player.guild_id, error);

    let Some(track) = player.queue.find_mut(track_id) else {
        player.set_status(PlayerStatus::Idle);
        return;
    };
    track.last_error = Some(error.message.clone());
    let track = track.clone();

    player.emit(PlayerEvent::TrackException {
        guild_id: player.guild_id.clone(),
        track: track.clone(),
        exception: TrackException::from(&error),
    });

    if let LoadPurpose::Seek { .. } = purpose {
        // A failed seek stays on its track.
        player.clock.reset();
        player.set_status(PlayerStatus::Stopped);
        return;
    }

    player.emit(PlayerEvent::TrackEnd {
        guild_id: player.guild_id.clone(),
        track,
        reason: TrackEndReason::LoadFailed,
    });
    handle_failure(player, track_id, error);
}

/// First `Playing` report of the active stream.
pub fn on_stream_playing(player: &mut PlayerContext) {
    let Some(active) = player.active.as_mut() else {
        return;
    };
    let first = active.started_at.is_none();
    if first {
        active.started_at = Some(tokio::time::Instant::now());
    }
    let offset_ms = active.offset_ms;

    player.timers.cancel(TimerSlot::StartTimeout);
    player.pending_stop = None;

    if !player.clock.is_started() {
        player.clock.start(offset_ms);
    } else {
        player.clock.resume();
    }
    player.set_status(PlayerStatus::Playing);

    if first {
        arm_prefetch(player);
    }
}
