use std::time::Duration;

use tracing::{debug, trace};

use super::{
    advance::on_natural_end,
    error::{handle_failure, send_stream_failed},
    prefetch::hold_prefetch,
    start::on_stream_playing,
};
use crate::{
    common::{StreamError, StreamErrorKind},
    player::{
        context::{ActiveStream, PlayerContext},
        state::PlayerStatus,
    },
    voice::{TransportEvent, TransportEventKind},
};

/// Single entry point for everything the transport reports.
pub fn handle_transport_event(player: &mut PlayerContext, event: TransportEvent) {
    let TransportEvent { token, kind } = event;

    if kind == TransportEventKind::Idle {
        // The tag only ever applies to the next idle report.
        if let Some(pending) = player.pending_stop.take() {
            if pending.token == token {
                debug!(
                    "[{}] stream {} ended after {:?}",
                    player.guild_id, token, pending.reason
                );
                return;
            }
        }
    }

    if !player.is_active_token(token) {
        trace!("[{}] ignoring {:?} from stale stream {}", player.guild_id, kind, token);
        return;
    }

    match kind {
        TransportEventKind::Playing => on_stream_playing(player),
        TransportEventKind::Paused => {
            if player.status == PlayerStatus::Playing {
                player.clock.pause();
                hold_prefetch(player);
                player.set_status(PlayerStatus::Paused);
            }
        }
        TransportEventKind::Buffering => {
            trace!("[{}] stream {} buffering", player.guild_id, token);
        }
        TransportEventKind::Error(error) => {
            let Some(active) = player.active.take() else {
                return;
            };
            player.note_playback(&active);
            send_stream_failed(player, &active.track_id, &error);
            handle_failure(player, &active.track_id, error);
        }
        TransportEventKind::Idle => {
            let Some(active) = player.active.take() else {
                return;
            };
            on_stream_ended(player, active);
        }
    }
}

/// Tells a natural end apart from a stream that died right after starting.
fn on_stream_ended(player: &mut PlayerContext, active: ActiveStream) {
    let min = player.min_play_duration();
    let played = Duration::from_millis(player.played_ms(&active));

    // Tracks shorter than the minimum can't be judged by it.
    let expected_ms = player
        .queue
        .position_of(&active.track_id)
        .and_then(|i| player.queue.get(i))
        .and_then(|t| t.length_ms())
        .map(|len| len.saturating_sub(active.offset_ms));
    let judged = expected_ms.is_none_or(|ms| ms >= min.as_millis() as u64);

    if judged && played < min {
        let error = StreamError::new(
            StreamErrorKind::TooShort,
            format!("stream ended after {}ms", played.as_millis()),
        );
        send_stream_failed(player, &active.track_id, &error);
        handle_failure(player, &active.track_id, error);
        return;
    }

    on_natural_end(player, active);
}
