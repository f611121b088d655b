use tracing::{debug, info, warn};

use super::{commands::admit, start::begin_load};
use crate::{
    common::types::TrackId,
    player::{
        context::{ActiveStream, Internal, LoadPurpose, PlayerContext, TimerAction},
        fingerprint::fingerprint,
        state::{LoopMode, PlayerStatus},
        timers::TimerSlot,
    },
    protocol::{PlayerEvent, TrackEndReason, tracks::Track},
    recommend::{RecommendError, RecommendationContext},
};

/// Picks what plays after the current track left the queue:
/// the track now under the cursor, a wrap to the top in queue loop, a
/// recommendation seeded by `seed`, or nothing.
pub fn continue_after_removal(player: &mut PlayerContext, seed: Option<Track>) {
    if let Some(index) = player.queue.current_index() {
        begin_load(player, index, LoadPurpose::Start, None);
        return;
    }

    if player.loop_mode == LoopMode::Queue && !player.queue.is_empty() {
        debug!("[{}] queue loop wraps to the top", player.guild_id);
        begin_load(player, 0, LoadPurpose::Start, None);
        return;
    }

    if player.auto_continuation {
        if let Some(seed) = seed.or_else(|| player.history.last().cloned()) {
            request_recommendation(player, seed, 1);
            return;
        }
    }

    finish_queue(player, PlayerStatus::Idle);
}

/// Nothing left to play.
pub fn finish_queue(player: &mut PlayerContext, status: PlayerStatus) {
    player.next_op();
    player.queue.set_current(None);
    player.clock.reset();
    player.timers.cancel(TimerSlot::Prefetch);
    player.timers.cancel(TimerSlot::StartTimeout);
    player.timers.cancel(TimerSlot::TransitionDeadline);
    info!("[{}] playback finished", player.guild_id);
    player.set_status(status);
    player.emit_queue_update();
}

pub fn request_recommendation(player: &mut PlayerContext, seed: Track, attempt: u32) {
    let Some(recommender) = player.services.recommender.clone() else {
        debug!("[{}] no recommender configured", player.guild_id);
        finish_queue(player, PlayerStatus::Idle);
        return;
    };

    let op = player.next_op();
    player.set_status(PlayerStatus::Transitioning);
    player.timers.arm(
        TimerSlot::TransitionDeadline,
        player.policy.transition_timeout(),
        TimerAction::TransitionDeadline,
    );

    let window = player.duplicate_window();
    let excluded = player
        .queue
        .iter()
        .chain(player.history.recent(window).iter())
        .map(fingerprint)
        .collect();
    let context = RecommendationContext {
        guild_id: player.guild_id.clone(),
        attempt,
        excluded,
    };
    let history = player.history.to_vec();
    let tx = player.internal_tx.clone();

    debug!(
        "[{}] asking for a recommendation after '{}' (attempt {})",
        player.guild_id, seed.title, attempt
    );

    tokio::spawn(async move {
        let result = recommender
            .next_recommendation(&seed, &history, &context)
            .await;
        let _ = tx.send(Internal::Recommended {
            op,
            seed,
            attempt,
            result,
        });
    });
}

pub fn on_recommended(
    player: &mut PlayerContext,
    op: u64,
    seed: Track,
    attempt: u32,
    result: Result<Option<Track>, RecommendError>,
) {
    if op != player.op {
        debug!("[{}] dropping stale recommendation", player.guild_id);
        return;
    }
    player.timers.cancel(TimerSlot::TransitionDeadline);

    let track = match result {
        Ok(Some(track)) => track,
        Ok(None) => {
            info!("[{}] no recommendation available", player.guild_id);
            finish_queue(player, PlayerStatus::Idle);
            return;
        }
        Err(e) => {
            warn!("[{}] recommendation failed: {}", player.guild_id, e);
            finish_queue(player, PlayerStatus::Idle);
            return;
        }
    };

    match admit(player, track) {
        Ok(index) => {
            info!(
                "[{}] continuing with recommendation '{}'",
                player.guild_id,
                player.queue.get(index).map(|t| t.title.as_str()).unwrap_or_default()
            );
            player.emit_queue_update();
            begin_load(player, index, LoadPurpose::Start, None);
        }
        Err(duplicate) => {
            debug!(
                "[{}] recommendation '{}' is a duplicate",
                player.guild_id, duplicate.title
            );
            if attempt < player.policy.max_recommendation_attempts() {
                request_recommendation(player, seed, attempt + 1);
            } else {
                finish_queue(player, PlayerStatus::Idle);
            }
        }
    }
}

/// The active stream reached its end on its own.
pub fn on_natural_end(player: &mut PlayerContext, active: ActiveStream) {
    let Some(index) = player.queue.position_of(&active.track_id) else {
        finish_queue(player, PlayerStatus::Idle);
        return;
    };
    let Some(track) = player.queue.get(index).cloned() else {
        return;
    };

    player.errors.finished(&track.id);
    player.prefetch.forget(&track.url);
    player.clock.reset();
    player.timers.cancel(TimerSlot::Prefetch);
    player.set_status(PlayerStatus::Transitioning);

    player.emit(PlayerEvent::TrackEnd {
        guild_id: player.guild_id.clone(),
        track: track.clone(),
        reason: TrackEndReason::Finished,
    });

    if player.loop_mode == LoopMode::Track {
        begin_load(player, index, LoadPurpose::Start, None);
        return;
    }

    player.queue.set_current(Some(index));
    player.queue.remove(index);
    player.emit_queue_update();
    continue_after_removal(player, Some(track));
}

/// Settle delay after a skip has passed.
pub fn on_advance(player: &mut PlayerContext) {
    if player.status != PlayerStatus::Transitioning {
        return;
    }
    player.timers.cancel(TimerSlot::TransitionDeadline);

    match player.queue.current_index() {
        Some(index) => {
            begin_load(player, index, LoadPurpose::Start, None);
        }
        None if player.loop_mode == LoopMode::Queue && !player.queue.is_empty() => {
            begin_load(player, 0, LoadPurpose::Start, None);
        }
        None => finish_queue(player, PlayerStatus::Idle),
    }
}

/// Drops bookkeeping tied to a track that left the queue.
pub fn forget_track(player: &mut PlayerContext, track_id: &TrackId, url: &str) {
    player.errors.forget(track_id);
    player.prefetch.forget(url);
}
