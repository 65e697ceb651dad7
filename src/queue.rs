//! # Playback Queue
//!
//! An ordered list of [`TrackRecord`]s plus a cursor pointing at the entry that is
//! playing (or would play next).
//!
//! ## Invariant
//!
//! Whenever the queue is non-empty, `cursor < len`. When it is empty the cursor is `0`
//! and every cursor-based operation returns [`QueueError::Empty`]. Every method leaves
//! the invariant intact on every return path, errors included.
//!
//! ## Cursor Tracking
//!
//! | Operation | Cursor afterwards |
//! |---|---|
//! | remove before the cursor | moves back one, same track |
//! | remove at the cursor | same index (the next track), wraps to `0` past the end |
//! | remove after the cursor | unchanged |
//! | move | follows the track it pointed at |
//! | shuffle | unchanged, and so is the track under it |

use crate::track::TrackRecord;
use log::{debug, trace};
use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

/// Expected failures of queue operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("the queue is empty")]
    Empty,
    #[error("'{0}' is not in the queue")]
    NotFound(String),
    #[error("position {position} is invalid, expected 1 to {}", .len.saturating_sub(1))]
    InvalidPosition { position: usize, len: usize },
    #[error("index {index} is out of range for a queue of {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

pub type QueueResult<T> = Result<T, QueueError>;

/// The queue of one listening context.
#[derive(Debug, Clone, Default)]
pub struct PlaybackQueue {
    entries: Vec<TrackRecord>,
    cursor: usize,
}

impl PlaybackQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn entries(&self) -> &[TrackRecord] {
        &self.entries
    }

    /// Appends tracks in order. An empty queue keeps its cursor at `0`, so the first
    /// appended track becomes current.
    pub fn add<I>(&mut self, tracks: I)
    where
        I: IntoIterator<Item = TrackRecord>,
    {
        let before = self.entries.len();
        self.entries.extend(tracks);
        debug!("Queued {} tracks ({} total)", self.entries.len() - before, self.entries.len());
    }

    pub fn current(&self) -> QueueResult<&TrackRecord> {
        self.entries.get(self.cursor).ok_or(QueueError::Empty)
    }

    /// Advances the cursor with wraparound and returns the new current track.
    pub fn next(&mut self) -> QueueResult<&TrackRecord> {
        if self.entries.is_empty() {
            return Err(QueueError::Empty);
        }
        self.cursor = (self.cursor + 1) % self.entries.len();
        trace!("Cursor advanced to {}", self.cursor);
        Ok(&self.entries[self.cursor])
    }

    /// Moves the cursor back with wraparound and returns the new current track.
    pub fn previous(&mut self) -> QueueResult<&TrackRecord> {
        if self.entries.is_empty() {
            return Err(QueueError::Empty);
        }
        let len = self.entries.len();
        self.cursor = (self.cursor + len - 1) % len;
        trace!("Cursor moved back to {}", self.cursor);
        Ok(&self.entries[self.cursor])
    }

    /// Removes the first entry whose title matches, ignoring case and artist.
    pub fn remove_by_title(&mut self, title: &str) -> QueueResult<TrackRecord> {
        if self.entries.is_empty() {
            return Err(QueueError::Empty);
        }
        let index = self
            .position_of(title)
            .ok_or_else(|| QueueError::NotFound(title.to_string()))?;
        Ok(self.remove_index(index))
    }

    /// Removes the entry at a 0-based index.
    pub fn remove_at(&mut self, index: usize) -> QueueResult<TrackRecord> {
        if self.entries.is_empty() {
            return Err(QueueError::Empty);
        }
        if index >= self.entries.len() {
            return Err(QueueError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        Ok(self.remove_index(index))
    }

    /// Moves the first entry titled `title` so that it lands at index `position`.
    ///
    /// Valid positions are `1..len`: slot 0 is never a destination. The position is
    /// validated before the title is looked up.
    ///
    /// ```
    /// use jukebox::queue::{PlaybackQueue, QueueError};
    /// use jukebox::track::TrackRecord;
    ///
    /// let mut queue = PlaybackQueue::new();
    /// queue.add(["TiK ToK", "Baby", "Marry You", "Telephone", "Secrets"]
    ///     .map(|t| TrackRecord::from_dataset(t, "Various")));
    ///
    /// queue.move_song("Secrets", 1).unwrap();
    /// let titles: Vec<_> = queue.entries().iter().map(|t| t.title()).collect();
    /// assert_eq!(titles, ["TiK ToK", "Secrets", "Baby", "Marry You", "Telephone"]);
    ///
    /// assert!(matches!(queue.move_song("Secrets", 5), Err(QueueError::InvalidPosition { .. })));
    /// assert!(matches!(queue.move_song("Nope", 2), Err(QueueError::NotFound(_))));
    /// ```
    pub fn move_song(&mut self, title: &str, position: usize) -> QueueResult<()> {
        if self.entries.is_empty() {
            return Err(QueueError::Empty);
        }
        let len = self.entries.len();
        if position < 1 || position >= len {
            return Err(QueueError::InvalidPosition { position, len });
        }
        let from = self
            .position_of(title)
            .ok_or_else(|| QueueError::NotFound(title.to_string()))?;
        self.relocate(from, position);
        Ok(())
    }

    /// Moves the entry at `from` to `to`, both 0-based.
    pub fn move_by_index(&mut self, from: usize, to: usize) -> QueueResult<()> {
        if self.entries.is_empty() {
            return Err(QueueError::Empty);
        }
        let len = self.entries.len();
        for index in [from, to] {
            if index >= len {
                return Err(QueueError::IndexOutOfRange { index, len });
            }
        }
        self.relocate(from, to);
        Ok(())
    }

    /// Shuffles every entry except the current one, which keeps its index.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if self.entries.len() < 2 {
            return;
        }
        let current = self.entries.remove(self.cursor);
        self.entries.shuffle(rng);
        self.entries.insert(self.cursor, current);
        debug!("Shuffled {} entries around position {}", self.entries.len(), self.cursor);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }

    /// Entries before the cursor, at the cursor, and after it.
    #[must_use]
    pub fn sections(&self) -> (&[TrackRecord], Option<&TrackRecord>, &[TrackRecord]) {
        match self.entries.get(self.cursor) {
            Some(current) => (
                &self.entries[..self.cursor],
                Some(current),
                &self.entries[self.cursor + 1..],
            ),
            None => (&self.entries[..0], None, &self.entries[..0]),
        }
    }

    /// Index of the first entry whose title matches, ignoring case and artist.
    #[must_use]
    pub fn position_of(&self, title: &str) -> Option<usize> {
        self.entries.iter().position(|track| track.title_matches(title))
    }

    /// Caller guarantees `index < len`.
    fn remove_index(&mut self, index: usize) -> TrackRecord {
        let removed = self.entries.remove(index);
        if self.entries.is_empty() {
            self.cursor = 0;
        } else if index < self.cursor {
            self.cursor -= 1;
        } else if self.cursor >= self.entries.len() {
            self.cursor = 0;
        }
        debug!("Removed '{removed}' at {index}, cursor now {}", self.cursor);
        removed
    }

    /// Caller guarantees both indices are `< len`.
    fn relocate(&mut self, from: usize, to: usize) {
        if from == to {
            return;
        }
        let track = self.entries.remove(from);
        self.entries.insert(to, track);

        self.cursor = if self.cursor == from {
            to
        } else if from < self.cursor && self.cursor <= to {
            self.cursor - 1
        } else if to <= self.cursor && self.cursor < from {
            self.cursor + 1
        } else {
            self.cursor
        };
        trace!("Moved entry {from} -> {to}, cursor now {}", self.cursor);
    }
}
