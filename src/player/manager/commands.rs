use tokio::sync::oneshot;
use tracing::{debug, info};

use super::{
    advance::{finish_queue, forget_track},
    prefetch::{arm_prefetch, hold_prefetch},
    start::{begin_load, stop_active},
};
use crate::{
    common::{InvalidCommand, types::TrackId},
    player::{
        context::{LoadPurpose, PlayerContext, TimerAction},
        fingerprint::is_duplicate,
        state::{CommandKind, EnqueueOutcome, LoopMode, PlayerStatus, StopReason},
        timers::TimerSlot,
    },
    protocol::tracks::Track,
};

fn reject(waiter: oneshot::Sender<bool>) {
    let _ = waiter.send(false);
}

/// Normalizes `track`, gives it a session id and appends it unless it
/// duplicates something queued or recently played.
pub fn admit(player: &mut PlayerContext, mut track: Track) -> Result<usize, Track> {
    if !track.normalize_duration() {
        debug!(
            "[{}] '{}' has no known duration",
            player.guild_id, track.title
        );
    }
    track.reset_bookkeeping();
    track.id = TrackId::generate();

    let window = player.duplicate_window();
    if is_duplicate(&track, player.queue.iter(), player.history.iter(), window) {
        return Err(track);
    }
    Ok(player.queue.push(track))
}

pub fn enqueue(player: &mut PlayerContext, track: Track) -> EnqueueOutcome {
    match admit(player, track) {
        Ok(index) => {
            let track_id = player
                .queue
                .get(index)
                .map(|t| t.id.clone())
                .unwrap_or_default();
            EnqueueOutcome::Queued { index, track_id }
        }
        Err(track) => {
            info!(
                "[{}] skipped duplicate '{}' by {}",
                player.guild_id, track.title, track.author
            );
            EnqueueOutcome::SkippedDuplicate(track)
        }
    }
}

/// Starts playback on enqueue when the session is idle with nothing
/// current and auto-continuation is on.
pub fn maybe_autostart(player: &mut PlayerContext) {
    if player.status == PlayerStatus::Idle
        && player.queue.current().is_none()
        && player.auto_continuation
        && !player.queue.is_empty()
    {
        debug!("[{}] auto-starting playback", player.guild_id);
        begin_load(player, 0, LoadPurpose::Start, None);
    }
}

pub fn remove(player: &mut PlayerContext, index: usize) -> Result<Track, InvalidCommand> {
    let len = player.queue.len();
    if index >= len {
        return Err(InvalidCommand::IndexOutOfBounds { index, len });
    }

    let is_current = player.queue.current_index() == Some(index);
    let was_live = is_current
        && (player.active.is_some()
            || player.status.is_in_flight()
            || matches!(player.status, PlayerStatus::Playing | PlayerStatus::Paused));

    if is_current {
        stop_active(player, StopReason::Replaced);
        player.next_op();
        player.timers.cancel(TimerSlot::Advance);
        player.timers.cancel(TimerSlot::Recovery);
        player.timers.cancel(TimerSlot::TransitionDeadline);
        player.clock.reset();
    }

    let Some(removed) = player.queue.remove(index) else {
        return Err(InvalidCommand::IndexOutOfBounds { index, len });
    };
    forget_track(player, &removed.id, &removed.url);

    if was_live {
        match player.queue.current_index() {
            Some(next) => {
                begin_load(player, next, LoadPurpose::Start, None);
            }
            None => finish_queue(player, PlayerStatus::Idle),
        }
    }

    player.emit_queue_update();
    Ok(removed)
}

pub fn move_track(player: &mut PlayerContext, from: usize, to: usize) -> Result<bool, InvalidCommand> {
    let len = player.queue.len();
    if let Some(&index) = [from, to].iter().find(|&&i| i >= len) {
        return Err(InvalidCommand::IndexOutOfBounds { index, len });
    }
    let moved = player.queue.move_track(from, to);
    if moved {
        player.emit_queue_update();
    }
    Ok(moved)
}

pub fn play(player: &mut PlayerContext, waiter: oneshot::Sender<bool>) {
    if player.queue.is_empty() || !player.status.accepts(CommandKind::Play) {
        reject(waiter);
        return;
    }
    let index = player.queue.current_index().unwrap_or(0);
    begin_load(player, index, LoadPurpose::Start, Some(waiter));
}

pub fn jump_to(
    player: &mut PlayerContext,
    index: usize,
    waiter: oneshot::Sender<bool>,
) -> Result<(), InvalidCommand> {
    let len = player.queue.len();
    if index >= len {
        return Err(InvalidCommand::IndexOutOfBounds { index, len });
    }
    if !player.status.accepts(CommandKind::JumpTo) {
        reject(waiter);
        return Ok(());
    }
    begin_load(player, index, LoadPurpose::Start, Some(waiter));
    Ok(())
}

pub fn pause(player: &mut PlayerContext) -> bool {
    if !player.status.accepts(CommandKind::Pause) {
        return false;
    }
    player.services.transport.pause();
    player.clock.pause();
    hold_prefetch(player);
    player.set_status(PlayerStatus::Paused);
    true
}

pub fn resume(player: &mut PlayerContext) -> bool {
    if !player.status.accepts(CommandKind::Resume) {
        return false;
    }
    player.services.transport.unpause();
    player.clock.resume();
    player.set_status(PlayerStatus::Playing);
    arm_prefetch(player);
    true
}

/// Stops the current track and, after a short settle delay, plays what
/// follows it. With track loop on, the same track plays again instead.
pub fn skip(player: &mut PlayerContext) -> bool {
    if !player.status.accepts(CommandKind::Skip) {
        return false;
    }
    let Some(index) = player.queue.current_index() else {
        return false;
    };

    player.next_op();
    stop_active(player, StopReason::Skip);
    player.clock.reset();

    if player.loop_mode != LoopMode::Track {
        if let Some(removed) = player.queue.remove(index) {
            forget_track(player, &removed.id, &removed.url);
            debug!("[{}] skipped '{}'", player.guild_id, removed.title);
        }
        player.emit_queue_update();
    }

    player.set_status(PlayerStatus::Transitioning);
    player.timers.arm(
        TimerSlot::Advance,
        std::time::Duration::from_millis(player.config.player.skip_settle_ms),
        TimerAction::Advance,
    );
    player.timers.arm(
        TimerSlot::TransitionDeadline,
        player.policy.transition_timeout(),
        TimerAction::TransitionDeadline,
    );
    true
}

pub fn previous(player: &mut PlayerContext, waiter: oneshot::Sender<bool>) {
    if !player.status.accepts(CommandKind::Previous) || player.history.is_empty() {
        reject(waiter);
        return;
    }

    if let Some(index) = player.queue.current_index().filter(|&i| i > 0) {
        begin_load(player, index - 1, LoadPurpose::Start, Some(waiter));
        return;
    }

    let current_id = player.queue.current().map(|t| t.id.clone());
    let Some(mut track) = player.history.last_other_than(current_id.as_ref()).cloned() else {
        reject(waiter);
        return;
    };
    track.reset_bookkeeping();
    track.id = TrackId::generate();
    player.queue.insert(0, track);
    player.emit_queue_update();
    begin_load(player, 0, LoadPurpose::Start, Some(waiter));
}

pub fn seek(
    player: &mut PlayerContext,
    seconds: f64,
    waiter: oneshot::Sender<bool>,
) -> Result<(), InvalidCommand> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(InvalidCommand::NegativeSeek);
    }
    let Some(index) = player.queue.current_index() else {
        reject(waiter);
        return Ok(());
    };
    if !player.status.accepts(CommandKind::Seek) {
        reject(waiter);
        return Ok(());
    }

    let target_ms = (seconds * 1000.0).round() as u64;
    debug!("[{}] seeking to {}ms", player.guild_id, target_ms);
    begin_load(player, index, LoadPurpose::Seek { target_ms }, Some(waiter));
    Ok(())
}

pub fn stop(player: &mut PlayerContext, user_initiated: bool) -> bool {
    let was_active = player.active.is_some()
        || !matches!(player.status, PlayerStatus::Idle | PlayerStatus::Stopped);

    player.next_op();
    stop_active(player, StopReason::Stopped);
    player.timers.clear_all();
    player.queue.set_current(None);
    player.clock.reset();

    if user_initiated {
        player.auto_continuation = false;
        player.errors.reset();
    }
    player.set_status(PlayerStatus::Stopped);
    player.emit_queue_update();
    was_active
}

pub fn clear_queue(player: &mut PlayerContext, user_initiated: bool) {
    player.next_op();
    stop_active(player, StopReason::Cleared);
    player.timers.clear_all();
    player.queue.clear();
    player.prefetch.clear();
    player.clock.reset();

    if user_initiated {
        player.auto_continuation = false;
        player.errors.reset();
    }
    info!("[{}] queue cleared", player.guild_id);
    player.set_status(PlayerStatus::Idle);
    player.emit_queue_update();
}

pub fn toggle_shuffle(player: &mut PlayerContext) -> bool {
    player.shuffle = !player.shuffle;
    if player.shuffle {
        player.queue.shuffle_upcoming(&mut rand::thread_rng());
        player.emit_queue_update();
    }
    player.shuffle
}

pub fn toggle_repeat(player: &mut PlayerContext) -> LoopMode {
    let next = player.loop_mode.next();
    set_loop_mode(player, next);
    next
}

pub fn set_loop_mode(player: &mut PlayerContext, mode: LoopMode) {
    player.loop_mode = mode;
    player.emit_queue_update();
}

pub fn set_volume(player: &mut PlayerContext, volume: i64) -> Result<u8, InvalidCommand> {
    let volume = u8::try_from(volume)
        .ok()
        .filter(|v| *v <= 100)
        .ok_or(InvalidCommand::VolumeOutOfRange(volume))?;
    player.volume = volume;
    player.services.transport.set_volume(player.gain());
    Ok(volume)
}
