//! Status accessors and the player event handler
//!
//! **Responsibilities:**
//! - Read-only views of the session (now playing, elapsed, queue, history, settings)
//! - Event subscription
//! - Player event handler: forwards state changes, advances on natural ends

use super::core::PlaybackEngine;
use crate::playback::events::{IdleCause, PlayerEvent};
use crate::prefetch::PrefetchKey;
use cadence_common::events::{PlaybackState, SessionEvent, SettingsInfo};
use cadence_common::Track;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

impl PlaybackEngine {
    pub fn session_id(&self) -> Uuid {
        self.state.session_id
    }

    pub async fn now_playing(&self) -> Option<Track> {
        self.queue.read().await.current().cloned()
    }

    /// Position in the current track (zero when nothing plays)
    pub async fn elapsed(&self) -> Duration {
        self.state.clock.read().await.elapsed()
    }

    /// Upcoming tracks in play order
    pub async fn queue_snapshot(&self) -> Vec<Track> {
        self.queue.read().await.snapshot()
    }

    /// Finished tracks, most recent last
    pub async fn history_snapshot(&self) -> Vec<Track> {
        self.queue.read().await.history().iter().cloned().collect()
    }

    pub async fn settings(&self) -> SettingsInfo {
        self.state.settings_info().await
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.player.state()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.state.subscribe_events()
    }

    /// Publish an event on the session's bus (used by the transport supervisor)
    pub fn broadcast(&self, event: SessionEvent) {
        self.state.broadcast_event(event);
    }

    /// Whether a completed prefetch is waiting for `track`
    pub fn is_prefetched(&self, track: &Track) -> bool {
        self.prefetch.contains(&PrefetchKey::for_track(track))
    }

    /// Frames delivered to the sink over the session's lifetime
    pub fn frames_written(&self) -> u64 {
        self.player.frames_written()
    }

    /// Player event handler - forwards state changes and advances the queue
    ///
    /// Only natural ends (finished, errored) of the latest playback advance;
    /// `Stopped` ends come from commands that already chose what plays next.
    pub(super) async fn player_event_handler(&self, mut rx: mpsc::UnboundedReceiver<PlayerEvent>) {
        info!("Player event handler started");

        loop {
            let event = tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            match event {
                PlayerEvent::StateChanged {
                    old_state,
                    new_state,
                } => {
                    debug!("Player state: {:?} -> {:?}", old_state, new_state);
                    self.state.broadcast_event(SessionEvent::PlaybackStateChanged {
                        session_id: self.state.session_id,
                        old_state,
                        new_state,
                        timestamp: chrono::Utc::now(),
                    });
                }
                PlayerEvent::Idle { playback_id, cause } => {
                    if !cause.advances_queue() {
                        debug!("Playback {} stopped by command", playback_id);
                        continue;
                    }
                    if playback_id != self.player.latest_playback_id() {
                        debug!("Ignoring stale end of playback {}", playback_id);
                        continue;
                    }
                    if let IdleCause::Errored(reason) = &cause {
                        warn!("Playback {} failed, advancing: {}", playback_id, reason);
                    }
                    if let Err(e) = self.process_queue().await {
                        warn!("Queue advance failed: {}", e);
                    }
                }
            }
        }

        info!("Player event handler stopped");
    }
}
