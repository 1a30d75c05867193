//! Queue Manager
//!
//! Tracks which tracks are where in the session: the one playing, the ones
//! waiting, and a bounded history of the ones that finished.
//!
//! Pure data structure; locking, events and playback belong to the engine.
//! Queue indices are 0-based positions among the waiting tracks (the current
//! track is not part of the queue).

use crate::error::{Error, Result};
use cadence_common::config::MAX_HISTORY_CAPACITY;
use cadence_common::events::RepeatMode;
use cadence_common::Track;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::VecDeque;

/// Why the queue is advancing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceKind {
    /// The current track played to the end
    Natural,
    /// A user skipped the current track
    Skip,
}

/// Queue position tracking
///
/// - Current: playing (or about to start)
/// - Queue: waiting, in play order
/// - History: finished, most recent last, at most `history_capacity` entries
pub struct QueueManager {
    current: Option<Track>,
    queue: VecDeque<Track>,
    history: VecDeque<Track>,
    history_capacity: usize,
}

impl QueueManager {
    /// `history_capacity` is capped at `MAX_HISTORY_CAPACITY`
    pub fn new(history_capacity: usize) -> Self {
        Self {
            current: None,
            queue: VecDeque::new(),
            history: VecDeque::new(),
            history_capacity: history_capacity.min(MAX_HISTORY_CAPACITY),
        }
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut Track> {
        self.current.as_mut()
    }

    /// First waiting track
    pub fn peek_next(&self) -> Option<&Track> {
        self.queue.front()
    }

    pub fn queue(&self) -> &VecDeque<Track> {
        &self.queue
    }

    pub fn history(&self) -> &VecDeque<Track> {
        &self.history
    }

    /// Waiting tracks
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// No current track and nothing waiting
    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.queue.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Track> {
        self.queue.iter().cloned().collect()
    }

    /// Append to the end of the queue; returns the track's position
    pub fn enqueue(&mut self, track: Track) -> usize {
        self.queue.push_back(track);
        self.queue.len() - 1
    }

    /// Insert at `index` (`index == len` appends)
    pub fn insert(&mut self, index: usize, track: Track) -> Result<usize> {
        if index > self.queue.len() {
            return Err(Error::invalid(format!(
                "Position {} is out of range (queue has {} tracks)",
                index,
                self.queue.len()
            )));
        }
        self.queue.insert(index, track);
        Ok(index)
    }

    /// Remove the waiting track at `index`
    pub fn remove(&mut self, index: usize) -> Result<Track> {
        let len = self.queue.len();
        self.queue.remove(index).ok_or_else(|| {
            Error::invalid(format!(
                "Position {} is out of range (queue has {} tracks)",
                index, len
            ))
        })
    }

    /// Move the waiting track at `from` to position `to`
    pub fn move_track(&mut self, from: usize, to: usize) -> Result<()> {
        let len = self.queue.len();
        if from >= len || to >= len {
            return Err(Error::invalid(format!(
                "Cannot move {} to {} (queue has {} tracks)",
                from, to, len
            )));
        }
        if let Some(track) = self.queue.remove(from) {
            self.queue.insert(to, track);
        }
        Ok(())
    }

    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.queue.make_contiguous().shuffle(rng);
    }

    /// Drop every waiting track; returns how many were dropped
    pub fn clear_upcoming(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }

    /// Drop the current and waiting tracks (history is kept)
    pub fn clear(&mut self) {
        self.current = None;
        self.queue.clear();
    }

    /// Drop everything, history included (session teardown)
    pub fn reset(&mut self) {
        self.clear();
        self.history.clear();
    }

    /// Record a finished track, evicting the oldest beyond capacity
    pub fn push_history(&mut self, track: Track) {
        if self.history_capacity == 0 {
            return;
        }
        while self.history.len() >= self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(track);
    }

    /// Advance to the next track
    ///
    /// Precedence:
    /// 1. Repeat-track on a natural end keeps the current track.
    /// 2. Repeat-queue moves the current track to history and to the queue tail.
    /// 3. Otherwise the current track moves to history.
    ///
    /// Then (except in case 1) the queue head becomes current. Returns the new
    /// current track, None when nothing is left.
    pub fn select_next(&mut self, repeat: RepeatMode, kind: AdvanceKind) -> Option<&Track> {
        if repeat == RepeatMode::Track && kind == AdvanceKind::Natural && self.current.is_some() {
            return self.current.as_ref();
        }

        if let Some(finished) = self.current.take() {
            if repeat == RepeatMode::Queue {
                self.queue.push_back(finished.clone());
            }
            self.push_history(finished);
        }

        self.current = self.queue.pop_front();
        self.current.as_ref()
    }

    /// Drop the current track without recording it (it failed to start)
    pub fn discard_current(&mut self) -> Option<Track> {
        self.current.take()
    }

    /// Step back: current returns to the queue head, the last history entry plays
    pub fn previous(&mut self) -> Result<&Track> {
        let Some(previous) = self.history.pop_back() else {
            return Err(Error::invalid("No previous track in history"));
        };
        if let Some(current) = self.current.take() {
            self.queue.push_front(current);
        }
        Ok(&*self.current.insert(previous))
    }

    /// Jump to the waiting track at `index`, recording the current one in history
    ///
    /// Tracks before `index` stay queued.
    pub fn jump(&mut self, index: usize) -> Result<&Track> {
        if index >= self.queue.len() {
            return Err(Error::invalid(format!(
                "Position {} is out of range (queue has {} tracks)",
                index,
                self.queue.len()
            )));
        }
        let target = self.queue.remove(index);
        if let Some(current) = self.current.take() {
            self.push_history(current);
        }
        self.current = target;
        self.current
            .as_ref()
            .ok_or_else(|| Error::Internal("jump target vanished".to_string()))
    }
}

impl Default for QueueManager {
    fn default() -> Self {
        Self::new(50)
    }
}
