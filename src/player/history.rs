use std::collections::VecDeque;

use crate::{common::types::TrackId, protocol::tracks::Track};

/// Bounded record of started tracks, oldest first.
#[derive(Debug, Clone)]
pub struct PlayHistory {
    entries: VecDeque<Track>,
    capacity: usize,
}

impl PlayHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, track: Track) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(track);
    }

    pub fn last(&self) -> Option<&Track> {
        self.entries.back()
    }

    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, Track> {
        self.entries.iter()
    }

    /// Newest entry that is not the track with `id`.
    pub fn last_other_than(&self, id: Option<&TrackId>) -> Option<&Track> {
        self.entries
            .iter()
            .rev()
            .find(|t| id.is_none_or(|id| &t.id != id))
    }

    /// Last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Track> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn to_vec(&self) -> Vec<Track> {
        self.entries.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
