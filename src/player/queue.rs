use rand::{Rng, seq::SliceRandom};

use crate::{common::types::TrackId, protocol::tracks::Track};

/// Ordered tracks plus a cursor.
///
/// The cursor is either `None` or a valid index; every mutation keeps it
/// that way.
#[derive(Debug, Clone, Default)]
pub struct Queue {
    tracks: Vec<Track>,
    current: Option<usize>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a queue from stored parts, dropping an invalid cursor.
    pub fn from_parts(tracks: Vec<Track>, current: Option<usize>) -> Self {
        let current = current.filter(|&i| i < tracks.len());
        Self { tracks, current }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Track> {
        self.tracks.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.and_then(|i| self.tracks.get(i))
    }

    pub fn position_of(&self, id: &TrackId) -> Option<usize> {
        self.tracks.iter().position(|t| &t.id == id)
    }

    pub fn find_mut(&mut self, id: &TrackId) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| &t.id == id)
    }

    /// Tracks after the cursor (the whole queue when nothing is current).
    pub fn upcoming(&self) -> &[Track] {
        match self.current {
            Some(i) => &self.tracks[i + 1..],
            None => &self.tracks,
        }
    }

    /// Appends and returns the new index.
    pub fn push(&mut self, track: Track) -> usize {
        self.tracks.push(track);
        self.tracks.len() - 1
    }

    /// Inserts at `index` (clamped to the end), shifting the cursor if the
    /// insert lands at or before it.
    pub fn insert(&mut self, index: usize, track: Track) -> usize {
        let index = index.min(self.tracks.len());
        self.tracks.insert(index, track);
        if let Some(cur) = self.current {
            if index <= cur {
                self.current = Some(cur + 1);
            }
        }
        index
    }

    /// Removes the track at `index`.
    ///
    /// Removing below the cursor moves it down by one. Removing the current
    /// track leaves the cursor on whatever now occupies that slot, or clears
    /// it when the slot no longer exists.
    pub fn remove(&mut self, index: usize) -> Option<Track> {
        if index >= self.tracks.len() {
            return None;
        }
        let track = self.tracks.remove(index);

        self.current = match self.current {
            Some(cur) if index < cur => Some(cur - 1),
            Some(cur) if index == cur => (cur < self.tracks.len()).then_some(cur),
            other => other,
        };

        Some(track)
    }

    /// Moves a track, keeping the cursor on the same track.
    pub fn move_track(&mut self, from: usize, to: usize) -> bool {
        let len = self.tracks.len();
        if from >= len || to >= len {
            return false;
        }
        if from == to {
            return true;
        }

        let current_id = self.current().map(|t| t.id.clone());
        let track = self.tracks.remove(from);
        self.tracks.insert(to, track);

        if let Some(id) = current_id {
            self.current = self.position_of(&id);
        }
        true
    }

    pub fn set_current(&mut self, index: Option<usize>) -> bool {
        match index {
            Some(i) if i >= self.tracks.len() => false,
            other => {
                self.current = other;
                true
            }
        }
    }

    pub fn clear(&mut self) -> Vec<Track> {
        self.current = None;
        std::mem::take(&mut self.tracks)
    }

    /// One-shot Fisher-Yates shuffle of the tracks after the cursor.
    /// Entries at or before the cursor keep their place.
    pub fn shuffle_upcoming<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let start = self.current.map(|i| i + 1).unwrap_or(0);
        if start < self.tracks.len() {
            self.tracks[start..].shuffle(rng);
        }
    }

    /// Known length of everything from the cursor on, minus what already
    /// played of the current track.
    pub fn remaining_ms(&self, elapsed_ms: u64) -> u64 {
        let start = self.current.unwrap_or(0);
        self.tracks
            .iter()
            .skip(start)
            .enumerate()
            .map(|(i, t)| {
                let len = t.length_ms().unwrap_or(0);
                if i == 0 && self.current.is_some() {
                    len.saturating_sub(elapsed_ms)
                } else {
                    len
                }
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn track(name: &str) -> Track {
        let mut t = Track::new(format!("https://x.test/{}.mp3", name), name, "artist")
            .with_duration_ms(60_000);
        t.id = TrackId::from(name);
        t
    }

    fn queue_of(names: &[&str], current: Option<usize>) -> Queue {
        Queue::from_parts(names.iter().map(|n| track(n)).collect(), current)
    }

    fn titles(queue: &Queue) -> Vec<String> {
        queue.iter().map(|t| t.title.clone()).collect()
    }

    #[test]
    fn test_remove_below_cursor_decrements() {
        let mut queue = queue_of(&["a", "b", "c", "d"], Some(2));
        let removed = queue.remove(0).expect("index exists");
        assert_eq!(removed.title, "a");
        assert_eq!(queue.current_index(), Some(1));
        assert_eq!(queue.current().map(|t| t.title.as_str()), Some("c"));
    }

    #[test]
    fn test_remove_above_cursor_keeps_it() {
        let mut queue = queue_of(&["a", "b", "c"], Some(0));
        queue.remove(2);
        assert_eq!(queue.current_index(), Some(0));
    }

    #[test]
    fn test_remove_current_moves_to_successor() {
        let mut queue = queue_of(&["a", "b", "c"], Some(1));
        let removed = queue.remove(1).expect("current exists");
        assert_eq!(removed.title, "b");
        assert_eq!(queue.current().map(|t| t.title.as_str()), Some("c"));
    }

    #[test]
    fn test_remove_last_current_clears_cursor() {
        let mut queue = queue_of(&["a", "b"], Some(1));
        queue.remove(1);
        assert_eq!(queue.current_index(), None);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_remove_out_of_bounds() {
        let mut queue = queue_of(&["a"], Some(0));
        assert!(queue.remove(3).is_none());
        assert_eq!(queue.current_index(), Some(0));
    }

    #[test]
    fn test_insert_before_cursor_shifts_it() {
        let mut queue = queue_of(&["a", "b"], Some(1));
        queue.insert(0, track("z"));
        assert_eq!(queue.current_index(), Some(2));
        assert_eq!(queue.current().map(|t| t.title.as_str()), Some("b"));
        assert_eq!(queue.insert(99, track("y")), 3);
    }

    #[test]
    fn test_move_keeps_cursor_on_track() {
        let mut queue = queue_of(&["a", "b", "c", "d"], Some(1));
        assert!(queue.move_track(3, 0));
        assert_eq!(titles(&queue), ["d", "a", "b", "c"]);
        assert_eq!(queue.current().map(|t| t.title.as_str()), Some("b"));

        assert!(queue.move_track(2, 3));
        assert_eq!(queue.current().map(|t| t.title.as_str()), Some("b"));
        assert_eq!(queue.current_index(), Some(3));

        assert!(!queue.move_track(0, 4));
    }

    #[test]
    fn test_set_current_bounds() {
        let mut queue = queue_of(&["a", "b"], None);
        assert!(!queue.set_current(Some(2)));
        assert!(queue.set_current(Some(1)));
        assert!(queue.set_current(None));
        assert_eq!(queue.current_index(), None);
    }

    #[test]
    fn test_shuffle_leaves_prefix_alone() {
        let mut queue = queue_of(&["a", "b", "c", "d", "e", "f", "g", "h"], Some(2));
        let mut rng = StdRng::seed_from_u64(7);
        queue.shuffle_upcoming(&mut rng);

        let after = titles(&queue);
        assert_eq!(&after[..3], ["a", "b", "c"]);
        let mut tail = after[3..].to_vec();
        tail.sort();
        assert_eq!(tail, ["d", "e", "f", "g", "h"]);
        assert_eq!(queue.current_index(), Some(2));
    }

    #[test]
    fn test_remaining_ms() {
        let queue = queue_of(&["a", "b", "c"], Some(1));
        assert_eq!(queue.remaining_ms(15_000), 45_000 + 60_000);

        let idle = queue_of(&["a", "b"], None);
        assert_eq!(idle.remaining_ms(0), 120_000);
    }

    #[test]
    fn test_upcoming_follows_cursor() {
        let queue = queue_of(&["a", "b", "c"], Some(1));
        assert_eq!(queue.upcoming().len(), 1);

        let last = queue_of(&["a"], Some(0));
        assert!(last.upcoming().is_empty());

        let idle = queue_of(&["a", "b"], None);
        assert_eq!(idle.upcoming().len(), 2);
    }

    mod props {
        use proptest::prelude::*;

        use super::*;

        #[derive(Debug, Clone)]
        enum Op {
            Push,
            Insert(usize),
            Remove(usize),
            Move(usize, usize),
            SetCurrent(Option<usize>),
            Shuffle(u64),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                Just(Op::Push),
                (0usize..12).prop_map(Op::Insert),
                (0usize..12).prop_map(Op::Remove),
                (0usize..12, 0usize..12).prop_map(|(a, b)| Op::Move(a, b)),
                proptest::option::of(0usize..12).prop_map(Op::SetCurrent),
                any::<u64>().prop_map(Op::Shuffle),
            ]
        }

        proptest! {
            /// The cursor is always `None` or a valid index, and removals
            /// below it move it down by exactly one.
            #[test]
            fn cursor_stays_valid(ops in prop::collection::vec(op(), 1..60)) {
                let mut queue = queue_of(&["a", "b", "c"], Some(1));
                let mut counter = 0;

                for op in ops {
                    match op {
                        Op::Push => {
                            counter += 1;
                            queue.push(track(&format!("p{}", counter)));
                        }
                        Op::Insert(i) => {
                            counter += 1;
                            queue.insert(i, track(&format!("i{}", counter)));
                        }
                        Op::Remove(i) => {
                            let before = queue.current_index();
                            let len = queue.len();
                            queue.remove(i);
                            if let Some(cur) = before {
                                if i < cur && i < len {
                                    prop_assert_eq!(queue.current_index(), Some(cur - 1));
                                }
                            }
                        }
                        Op::Move(a, b) => {
                            let id = queue.current().map(|t| t.id.clone());
                            queue.move_track(a, b);
                            prop_assert_eq!(queue.current().map(|t| t.id.clone()), id);
                        }
                        Op::SetCurrent(i) => {
                            queue.set_current(i);
                        }
                        Op::Shuffle(seed) => {
                            let prefix_end = queue.current_index().map(|i| i + 1).unwrap_or(0);
                            let before: Vec<_> = queue.tracks()[..prefix_end].to_vec();
                            let mut tail_before: Vec<_> =
                                queue.tracks()[prefix_end..].iter().map(|t| t.id.clone()).collect();
                            queue.shuffle_upcoming(&mut StdRng::seed_from_u64(seed));
                            prop_assert_eq!(&queue.tracks()[..prefix_end], &before[..]);
                            let mut tail_after: Vec<_> =
                                queue.tracks()[prefix_end..].iter().map(|t| t.id.clone()).collect();
                            tail_before.sort_by(|x, y| x.0.cmp(&y.0));
                            tail_after.sort_by(|x, y| x.0.cmp(&y.0));
                            prop_assert_eq!(tail_before, tail_after);
                        }
                    }

                    if let Some(i) = queue.current_index() {
                        prop_assert!(i < queue.len());
                    }
                }
            }
        }
    }
}
