use tracing::{debug, error, info, warn};

use super::{
    advance::{continue_after_removal, finish_queue, request_recommendation},
    start::begin_load,
};
use crate::{
    common::{
        StreamError, StreamErrorKind,
        types::{StreamToken, TrackId},
    },
    player::{
        context::{LoadPurpose, PlayerContext, TimerAction},
        recovery::{FailureContext, RecoveryAction, RecoveryDecision},
        state::{PendingStop, PlayerStatus, StopReason},
        timers::TimerSlot,
    },
    protocol::{PlayerEvent, TrackEndReason, TrackException},
};

/// Emit `TrackException` followed by `TrackEnd: LoadFailed` for a stream
/// that died under the transport.
pub fn send_stream_failed(player: &mut PlayerContext, track_id: &TrackId, error: &StreamError) {
    let Some(track) = player.queue.find_mut(track_id) else {
        return;
    };
    track.last_error = Some(error.message.clone());
    let track = track.clone();

    player.emit(PlayerEvent::TrackException {
        guild_id: player.guild_id.clone(),
        track: track.clone(),
        exception: TrackException::from(error),
    });
    player.emit(PlayerEvent::TrackEnd {
        guild_id: player.guild_id.clone(),
        track,
        reason: TrackEndReason::LoadFailed,
    });
}

/// Routes a stream failure through the recovery policy and schedules
/// whatever it decides.
pub fn handle_failure(player: &mut PlayerContext, track_id: &TrackId, error: StreamError) {
    if player.timers.is_armed(TimerSlot::Recovery) {
        debug!(
            "[{}] recovery already scheduled, ignoring: {}",
            player.guild_id, error
        );
        return;
    }

    player.timers.cancel(TimerSlot::StartTimeout);
    player.timers.cancel(TimerSlot::Prefetch);

    let has_next = player
        .queue
        .position_of(track_id)
        .is_some_and(|i| i + 1 < player.queue.len());
    let decision = player.policy.decide(
        &mut player.errors,
        FailureContext {
            track: track_id,
            kind: error.kind,
            seeking: player.status == PlayerStatus::Seeking,
            has_next,
            auto_continuation: player.auto_continuation,
        },
    );

    if decision.action == RecoveryAction::Suppress {
        // A seek that loses its stream stays on its track.
        debug!("[{}] failure during seek suppressed", player.guild_id);
        player.clock.reset();
        player.set_status(PlayerStatus::Stopped);
        return;
    }

    if decision.systemic {
        error!(
            "[{}] systemic failure: {} consecutive stream errors",
            player.guild_id, player.errors.consecutive
        );
    }
    if decision.disable_auto_continuation {
        player.auto_continuation = false;
    }

    let track = player.queue.position_of(track_id).and_then(|i| player.queue.get(i)).cloned();
    warn!(
        "[{}] {:?} after {:?} failure, acting in {}ms",
        player.guild_id,
        decision.action,
        error.kind,
        decision.delay.as_millis()
    );
    if let Some(track) = track {
        player.emit(PlayerEvent::RecoveryScheduled {
            guild_id: player.guild_id.clone(),
            track,
            action: decision.action,
            delay_ms: decision.delay.as_millis() as u64,
        });
    }

    player.clock.reset();
    player.set_status(PlayerStatus::Transitioning);
    player.timers.arm(
        TimerSlot::Recovery,
        decision.delay,
        TimerAction::Recovery {
            decision,
            track_id: track_id.clone(),
        },
    );
    player.timers.arm(
        TimerSlot::TransitionDeadline,
        player.policy.transition_timeout() + decision.delay,
        TimerAction::TransitionDeadline,
    );
}

/// Applies a recovery decision once its delay has passed.
pub async fn execute_recovery(
    player: &mut PlayerContext,
    decision: RecoveryDecision,
    track_id: TrackId,
) {
    player.timers.cancel(TimerSlot::TransitionDeadline);
    let index = player.queue.position_of(&track_id);

    if decision.action == RecoveryAction::Retry {
        if let Some(index) = index {
            if let Some(track) = player.queue.find_mut(&track_id) {
                track.fallback_index += 1;
                track.prefetch_resolved = None;
                let url = track.url.clone();
                player.services.resolver.invalidate_cache(&url);
                player.prefetch.forget(&url);
            }
            info!("[{}] retrying track at index {}", player.guild_id, index);
            begin_load(player, index, LoadPurpose::Retry, None);
            return;
        }
    }

    // Every other action gives up on the track.
    let seed = index.and_then(|i| player.queue.remove(i)).inspect(|removed| {
        player.errors.forget(&removed.id);
        player.prefetch.forget(&removed.url);
    });
    player.emit_queue_update();

    match decision.action {
        RecoveryAction::Retry | RecoveryAction::SkipToNext => {
            continue_after_removal(player, seed);
        }
        RecoveryAction::Recommend => match seed.or_else(|| player.history.last().cloned()) {
            Some(seed) if player.auto_continuation => request_recommendation(player, seed, 1),
            _ => continue_after_removal(player, None),
        },
        RecoveryAction::Stop => {
            finish_queue(player, PlayerStatus::Stopped);
        }
        RecoveryAction::Suppress => {}
    }
    player.persist(false).await;
}

/// The transport took too long to report playing.
pub fn on_start_timeout(player: &mut PlayerContext, token: StreamToken) {
    let stuck = player
        .active
        .as_ref()
        .is_some_and(|a| a.token == token && a.started_at.is_none());
    if !stuck {
        return;
    }
    let Some(active) = player.active.take() else {
        return;
    };

    let threshold_ms = player.config.player.start_timeout_ms;
    warn!(
        "[{}] stream {} never started within {}ms",
        player.guild_id, token, threshold_ms
    );
    if let Some(track) = player.queue.position_of(&active.track_id).and_then(|i| player.queue.get(i)) {
        player.emit(PlayerEvent::TrackStuck {
            guild_id: player.guild_id.clone(),
            track: track.clone(),
            threshold_ms,
        });
    }

    player.pending_stop = Some(PendingStop {
        token,
        reason: StopReason::Stopped,
    });
    player.services.transport.stop(true);

    let error = StreamError::new(StreamErrorKind::Stuck, format!("no playback after {}ms", threshold_ms));
    send_stream_failed(player, &active.track_id, &error);
    handle_failure(player, &active.track_id, error);
}

/// A transition stayed in flight past the hard ceiling.
pub fn on_transition_deadline(player: &mut PlayerContext) {
    if !player.status.is_in_flight() {
        return;
    }
    error!(
        "[{}] {:?} did not finish in time, forcing it clear",
        player.guild_id, player.status
    );

    player.next_op();
    player.timers.cancel(TimerSlot::Advance);
    player.timers.cancel(TimerSlot::Recovery);
    player.clock.reset();
    player.settle(false);

    let status = if player.queue.current().is_some() {
        PlayerStatus::Stopped
    } else {
        PlayerStatus::Idle
    };
    player.set_status(status);
}
