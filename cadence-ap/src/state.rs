//! Shared session state
//!
//! Playback modifiers, the playback clock and the event bus of one session,
//! shared between the engine, the player listener and the transport supervisor.
//! Queue contents are not here: they live in the engine's `QueueManager`.

use crate::pipeline::{FilterChain, VolumeHandle};
use cadence_common::events::{EventBus, RepeatMode, SessionEvent, SettingsInfo};
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

/// Playback modifiers of a session
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSettings {
    pub repeat_mode: RepeatMode,
    pub filters: FilterChain,
    pub autoplay: bool,
}

/// Wall-clock anchor for elapsed-time computation
///
/// Elapsed = seek offset + time since start, minus time spent paused.
#[derive(Debug, Clone, Default)]
pub struct PlaybackClock {
    started_at: Option<Instant>,
    offset: Duration,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

impl PlaybackClock {
    /// Anchor the clock at `offset` into the track
    pub fn start(&mut self, offset: Duration) {
        self.started_at = Some(Instant::now());
        self.offset = offset;
        self.paused_at = None;
        self.paused_total = Duration::ZERO;
    }

    pub fn pause(&mut self) {
        if self.started_at.is_some() && self.paused_at.is_none() {
            self.paused_at = Some(Instant::now());
        }
    }

    pub fn resume(&mut self) {
        if let Some(paused_at) = self.paused_at.take() {
            self.paused_total += paused_at.elapsed();
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Position in the current track
    pub fn elapsed(&self) -> Duration {
        let Some(started_at) = self.started_at else {
            return Duration::ZERO;
        };
        let end = self.paused_at.unwrap_or_else(Instant::now);
        let running = end.saturating_duration_since(started_at);
        self.offset + running.saturating_sub(self.paused_total)
    }
}

/// Shared state accessible by all session components
///
/// Uses RwLock for concurrent read access with rare writes.
pub struct SharedState {
    /// Session identifier carried by every emitted event
    pub session_id: Uuid,

    /// Repeat mode, filters, autoplay
    pub settings: RwLock<PlaybackSettings>,

    /// Volume percent, read live by the pipeline's gain stage
    pub volume: VolumeHandle,

    /// Elapsed-time anchor of the current track
    pub clock: RwLock<PlaybackClock>,

    /// Event broadcaster for observers
    pub events: EventBus,
}

impl SharedState {
    pub fn new(initial_volume: u16, autoplay: bool, event_capacity: usize) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            settings: RwLock::new(PlaybackSettings {
                repeat_mode: RepeatMode::Off,
                filters: FilterChain::default(),
                autoplay,
            }),
            volume: VolumeHandle::new(initial_volume),
            clock: RwLock::new(PlaybackClock::default()),
            events: EventBus::new(event_capacity),
        }
    }

    /// Broadcast an event to all observers
    pub fn broadcast_event(&self, event: SessionEvent) {
        // No receivers is OK
        self.events.emit_lossy(event);
    }

    /// Subscribe to this session's event stream
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn get_settings(&self) -> PlaybackSettings {
        self.settings.read().await.clone()
    }

    /// Observer view of the current modifiers
    pub async fn settings_info(&self) -> SettingsInfo {
        let settings = self.settings.read().await;
        SettingsInfo {
            volume: self.volume.get(),
            filters: settings.filters.names(),
            repeat_mode: settings.repeat_mode,
            autoplay: settings.autoplay,
        }
    }

    /// Broadcast the current modifiers
    pub async fn broadcast_settings(&self) {
        let settings = self.settings_info().await;
        self.broadcast_event(SessionEvent::SettingsChanged {
            session_id: self.session_id,
            settings,
            timestamp: chrono::Utc::now(),
        });
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(100, false, 256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_settings() {
        let state = SharedState::default();
        let settings = state.get_settings().await;

        assert_eq!(settings.repeat_mode, RepeatMode::Off);
        assert!(settings.filters.is_empty());
        assert!(!settings.autoplay);
        assert_eq!(state.volume.get(), 100);
    }

    #[tokio::test]
    async fn test_settings_broadcast() {
        let state = SharedState::new(80, true, 16);
        let mut rx = state.subscribe_events();

        state.broadcast_settings().await;

        match rx.recv().await.unwrap() {
            SessionEvent::SettingsChanged { session_id, settings, .. } => {
                assert_eq!(session_id, state.session_id);
                assert_eq!(settings.volume, 80);
                assert!(settings.autoplay);
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_excludes_paused_time() {
        let mut clock = PlaybackClock::default();
        assert_eq!(clock.elapsed(), Duration::ZERO);

        clock.start(Duration::from_secs(30));
        tokio::time::advance(Duration::from_secs(10)).await;
        clock.pause();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(clock.elapsed(), Duration::from_secs(40));

        clock.resume();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(clock.elapsed(), Duration::from_secs(42));

        clock.reset();
        assert!(!clock.is_running());
    }
}
