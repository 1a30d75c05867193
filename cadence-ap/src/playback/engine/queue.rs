//! Queue operations - enqueue, skip, stop, previous, jump, reorder
//!
//! Every command validates before it mutates: a rejected command returns
//! `Error::InvalidOperation` and leaves the session untouched.

use super::core::PlaybackEngine;
use crate::error::{Error, Result};
use crate::playback::queue_manager::AdvanceKind;
use cadence_common::events::{QueueChangeTrigger, RepeatMode, SessionEvent};
use cadence_common::{Locator, Requester, Track};
use tracing::info;

impl PlaybackEngine {
    /// Append a track; returns its 0-based queue position
    ///
    /// Starts playback if the session was idle. A track that becomes the queue
    /// head while something plays is prefetched.
    pub async fn enqueue(&self, track: Track) -> Result<usize> {
        self.ensure_running()?;

        let (position, queue_len) = {
            let mut queue = self.queue.write().await;
            let position = queue.enqueue(track.clone());
            (position, queue.len())
        };
        info!("Enqueued {} at position {}", track, position);

        if queue_len == 1 && !self.player.is_idle() {
            self.prefetch.prefetch(&track);
        }

        self.state.broadcast_event(SessionEvent::TrackAdded {
            session_id: self.state.session_id,
            track,
            position,
            timestamp: chrono::Utc::now(),
        });
        self.broadcast_queue_changed(QueueChangeTrigger::UserEnqueue).await;

        self.process_queue().await?;
        Ok(position)
    }

    /// Append several tracks in order; returns how many were added
    pub async fn enqueue_many(&self, tracks: Vec<Track>) -> Result<usize> {
        self.ensure_running()?;
        if tracks.is_empty() {
            return Ok(0);
        }

        let added = tracks.len();
        let positions: Vec<(Track, usize)> = {
            let mut queue = self.queue.write().await;
            tracks
                .into_iter()
                .map(|track| {
                    let position = queue.enqueue(track.clone());
                    (track, position)
                })
                .collect()
        };
        info!("Enqueued {} tracks", added);

        for (track, position) in positions {
            self.state.broadcast_event(SessionEvent::TrackAdded {
                session_id: self.state.session_id,
                track,
                position,
                timestamp: chrono::Utc::now(),
            });
        }
        self.broadcast_queue_changed(QueueChangeTrigger::UserEnqueue).await;

        if !self.player.is_idle() {
            self.prefetch_head().await;
        }
        self.process_queue().await?;
        Ok(added)
    }

    /// Resolve a query and enqueue the result
    ///
    /// A URL enqueues everything it resolves to (a playlist); free text
    /// enqueues the best match only.
    pub async fn enqueue_query(&self, query: &str, requester: &Requester) -> Result<Vec<Track>> {
        self.ensure_running()?;

        let mut found = self.services.resolver.resolve(query, requester).await?;
        if found.is_empty() {
            return Err(Error::Resolution(format!("No results for '{}'", query.trim())));
        }

        if Locator::new(query.trim()).is_url() {
            self.enqueue_many(found.clone()).await?;
        } else {
            found.truncate(1);
            self.enqueue(found[0].clone()).await?;
        }
        Ok(found)
    }

    /// Insert a track at a 0-based queue position
    pub async fn insert(&self, index: usize, track: Track) -> Result<usize> {
        self.ensure_running()?;

        let position = self.queue.write().await.insert(index, track.clone())?;
        self.state.broadcast_event(SessionEvent::TrackAdded {
            session_id: self.state.session_id,
            track,
            position,
            timestamp: chrono::Utc::now(),
        });
        self.broadcast_queue_changed(QueueChangeTrigger::UserEnqueue).await;

        if position == 0 && !self.player.is_idle() {
            self.prefetch_head().await;
        }
        self.process_queue().await?;
        Ok(position)
    }

    /// Remove the waiting track at a 0-based position
    pub async fn remove(&self, index: usize) -> Result<Track> {
        self.ensure_running()?;

        let removed = self.queue.write().await.remove(index)?;
        info!("Removed {} from position {}", removed, index);
        self.broadcast_queue_changed(QueueChangeTrigger::UserDequeue).await;

        if index == 0 {
            self.prefetch_head().await;
        }
        Ok(removed)
    }

    /// Move a waiting track between 0-based positions
    pub async fn move_track(&self, from: usize, to: usize) -> Result<()> {
        self.ensure_running()?;

        self.queue.write().await.move_track(from, to)?;
        self.broadcast_queue_changed(QueueChangeTrigger::UserReorder).await;
        if from == 0 || to == 0 {
            self.prefetch_head().await;
        }
        Ok(())
    }

    pub async fn shuffle(&self) -> Result<()> {
        self.ensure_running()?;

        {
            let mut queue = self.queue.write().await;
            if queue.len() < 2 {
                return Err(Error::invalid("Not enough tracks in the queue to shuffle"));
            }
            queue.shuffle(&mut rand::thread_rng());
        }
        self.broadcast_queue_changed(QueueChangeTrigger::UserReorder).await;
        self.prefetch_head().await;
        Ok(())
    }

    /// Drop every waiting track, keeping the current one; returns how many were dropped
    pub async fn clear_upcoming(&self) -> Result<usize> {
        self.ensure_running()?;

        let dropped = self.queue.write().await.clear_upcoming();
        if dropped == 0 {
            return Err(Error::invalid("The queue is already empty"));
        }
        self.broadcast_queue_changed(QueueChangeTrigger::UserDequeue).await;
        Ok(dropped)
    }

    /// Skip the current track
    ///
    /// Ignores repeat-track for this advance; repeat-queue still requeues.
    /// Rejected when nothing is waiting, unless autoplay or repeat-queue can
    /// supply the next track.
    pub async fn skip(&self, actor: Option<Requester>) -> Result<()> {
        self.ensure_running()?;
        let guard = self.transition.lock().await;
        let result = self.skip_locked(actor).await;
        self.finish_transition(guard).await;
        result
    }

    async fn skip_locked(&self, actor: Option<Requester>) -> Result<()> {
        let (autoplay, repeat_mode) = {
            let settings = self.state.settings.read().await;
            (settings.autoplay, settings.repeat_mode)
        };
        let current = {
            let queue = self.queue.read().await;
            if queue.is_empty() {
                return Err(Error::invalid("Nothing is playing and the queue is empty"));
            }
            // Autoplay and repeat-queue can still supply a next track
            let has_next = queue.peek_next().is_some()
                || autoplay
                || (repeat_mode == RepeatMode::Queue && queue.current().is_some());
            if !has_next {
                return Err(Error::invalid("There is no next track to skip to"));
            }
            queue.current().cloned()
        };

        if let Some(track) = current {
            info!("Skipping {}", track);
            self.state.broadcast_event(SessionEvent::TrackSkipped {
                session_id: self.state.session_id,
                track,
                actor,
                timestamp: chrono::Utc::now(),
            });
        }

        self.player.stop().await;
        self.advance_locked(AdvanceKind::Skip, QueueChangeTrigger::Skip)
            .await
    }

    /// Stop playback and clear the queue
    pub async fn stop(&self, actor: Option<Requester>) -> Result<()> {
        self.ensure_running()?;
        let guard = self.transition.lock().await;
        let result = self.stop_locked(actor).await;
        self.finish_transition(guard).await;
        result
    }

    async fn stop_locked(&self, actor: Option<Requester>) -> Result<()> {
        let current = {
            let mut queue = self.queue.write().await;
            if queue.is_empty() && self.player.is_idle() {
                return Err(Error::invalid("Nothing is playing and the queue is empty"));
            }
            let current = queue.current().cloned();
            queue.clear();
            current
        };

        self.player.stop().await;
        self.prefetch.clear();
        self.state.clock.write().await.reset();

        info!("Playback stopped");
        self.state.broadcast_event(SessionEvent::TrackStopped {
            session_id: self.state.session_id,
            track: current,
            actor,
            timestamp: chrono::Utc::now(),
        });
        self.broadcast_queue_changed(QueueChangeTrigger::Stop).await;
        Ok(())
    }

    /// Replay the most recent history entry; the current track returns to the queue head
    pub async fn previous(&self) -> Result<()> {
        self.ensure_running()?;
        let guard = self.transition.lock().await;
        let result = self.previous_locked().await;
        self.finish_transition(guard).await;
        result
    }

    async fn previous_locked(&self) -> Result<()> {
        let track = self.queue.write().await.previous().cloned()?;
        info!("Going back to {}", track);

        self.player.stop().await;
        self.start_or_advance(track, QueueChangeTrigger::Previous)
            .await
    }

    /// Play the waiting track at a 0-based position now
    ///
    /// The current track goes to history; tracks before the target stay queued.
    pub async fn jump(&self, index: usize) -> Result<()> {
        self.ensure_running()?;
        let guard = self.transition.lock().await;
        let result = self.jump_locked(index).await;
        self.finish_transition(guard).await;
        result
    }

    async fn jump_locked(&self, index: usize) -> Result<()> {
        let track = self.queue.write().await.jump(index).cloned()?;
        info!("Jumping to {} (position {})", track, index);

        self.player.stop().await;
        self.start_or_advance(track, QueueChangeTrigger::Jump).await
    }
}
