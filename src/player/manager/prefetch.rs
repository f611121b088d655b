use tracing::{debug, trace};

use crate::{
    common::types::TrackId,
    player::{
        context::{Internal, PlayerContext, TimerAction},
        state::PlayerStatus,
        timers::TimerSlot,
    },
    sources::SourceError,
};

/// Arms the prefetch timer for the current track, or warms right away when
/// the lead window is already open.
pub fn arm_prefetch(player: &mut PlayerContext) {
    player.timers.cancel(TimerSlot::Prefetch);
    if !player.prefetch.is_enabled() {
        return;
    }
    let Some(track) = player.queue.current() else {
        return;
    };

    let delay = player
        .prefetch
        .delay_for(track.length_ms(), player.clock.elapsed_ms());
    let track_id = track.id.clone();

    if delay.is_zero() {
        run_prefetch(player);
    } else {
        trace!(
            "[{}] prefetch armed in {}ms",
            player.guild_id,
            delay.as_millis()
        );
        player
            .timers
            .arm(TimerSlot::Prefetch, delay, TimerAction::Prefetch(track_id));
    }
}

pub fn on_prefetch_timer(player: &mut PlayerContext, track_id: TrackId) {
    let still_current = player.queue.current().is_some_and(|t| t.id == track_id);
    if !still_current || player.status != PlayerStatus::Playing {
        return;
    }
    run_prefetch(player);
}

fn run_prefetch(player: &mut PlayerContext) {
    let candidates = player.prefetch.take_candidates(&player.queue);
    if candidates.is_empty() {
        return;
    }
    debug!(
        "[{}] prefetching {} upcoming track(s)",
        player.guild_id,
        candidates.len()
    );

    for track in candidates {
        let resolver = player.services.resolver.clone();
        let tx = player.internal_tx.clone();
        tokio::spawn(async move {
            let result = resolver.prewarm(&track).await;
            let _ = tx.send(Internal::Prewarmed {
                track_id: track.id,
                url: track.url,
                result,
            });
        });
    }
}

pub fn on_prewarmed(
    player: &mut PlayerContext,
    track_id: TrackId,
    url: String,
    result: Result<Option<String>, SourceError>,
) {
    match result {
        Ok(Some(descriptor)) => {
            if let Some(track) = player.queue.find_mut(&track_id) {
                track.prefetch_resolved = Some(descriptor);
            }
        }
        Ok(None) => {}
        Err(e) => {
            debug!("[{}] prefetch of {} failed: {}", player.guild_id, url, e);
            player.prefetch.forget(&url);
        }
    }
}

/// Pausing holds the prefetch; resuming re-arms it from the frozen position.
pub fn hold_prefetch(player: &mut PlayerContext) {
    player.timers.cancel(TimerSlot::Prefetch);
}
