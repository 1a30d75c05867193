//! Event types for the Cadence event system
//!
//! Provides the session event definitions and the EventBus observers subscribe to.
//! This is the only channel external layers (notifications, dashboards) use to
//! observe engine state changes.

// Sub-modules (supporting types)
mod playback_types;
mod queue_types;
mod shared_types;

pub use playback_types::{ConnectionStatus, PlaybackState, RepeatMode};
pub use queue_types::QueueChangeTrigger;
pub use shared_types::SettingsInfo;

use crate::track::{Requester, Track};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Session event types
///
/// Events are broadcast via EventBus and can be serialized for external transmission.
/// Every event carries the id of the session that emitted it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// A track resolved successfully and started playing
    ///
    /// Triggers:
    /// - Notifications: "Now playing" message
    /// - UI: Update now-playing display
    TrackStarted {
        session_id: Uuid,
        track: Track,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A track was added to the queue
    TrackAdded {
        session_id: Uuid,
        track: Track,
        /// 0-based queue position the track landed at
        position: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The current track was skipped by a user
    TrackSkipped {
        session_id: Uuid,
        track: Track,
        actor: Option<Requester>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback was stopped and the queue cleared
    TrackStopped {
        session_id: Uuid,
        /// Track that was playing when stop was requested
        track: Option<Track>,
        actor: Option<Requester>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Queue contents changed
    ///
    /// Carries a full snapshot of the upcoming tracks (current track excluded).
    QueueChanged {
        session_id: Uuid,
        queue: Vec<Track>,
        trigger: QueueChangeTrigger,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Nothing left to play; the session went idle
    SessionFinished {
        session_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Audio player state changed (Idle / Playing / Paused)
    PlaybackStateChanged {
        session_id: Uuid,
        old_state: PlaybackState,
        new_state: PlaybackState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Volume, filters, repeat mode or autoplay changed
    SettingsChanged {
        session_id: Uuid,
        settings: SettingsInfo,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Voice transport connectivity changed
    ConnectionStateChanged {
        session_id: Uuid,
        status: ConnectionStatus,
        /// Reconnect attempt number (0 when not reconnecting)
        attempt: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl SessionEvent {
    /// Session that emitted this event
    pub fn session_id(&self) -> Uuid {
        match self {
            SessionEvent::TrackStarted { session_id, .. }
            | SessionEvent::TrackAdded { session_id, .. }
            | SessionEvent::TrackSkipped { session_id, .. }
            | SessionEvent::TrackStopped { session_id, .. }
            | SessionEvent::QueueChanged { session_id, .. }
            | SessionEvent::SessionFinished { session_id, .. }
            | SessionEvent::PlaybackStateChanged { session_id, .. }
            | SessionEvent::SettingsChanged { session_id, .. }
            | SessionEvent::ConnectionStateChanged { session_id, .. } => *session_id,
        }
    }

    /// Event type name as used in the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::TrackStarted { .. } => "TrackStarted",
            SessionEvent::TrackAdded { .. } => "TrackAdded",
            SessionEvent::TrackSkipped { .. } => "TrackSkipped",
            SessionEvent::TrackStopped { .. } => "TrackStopped",
            SessionEvent::QueueChanged { .. } => "QueueChanged",
            SessionEvent::SessionFinished { .. } => "SessionFinished",
            SessionEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            SessionEvent::SettingsChanged { .. } => "SettingsChanged",
            SessionEvent::ConnectionStateChanged { .. } => "ConnectionStateChanged",
        }
    }
}

/// Broadcast channel carrying one session's events to its observers
///
/// Publishing never waits on a subscriber. A subscriber that falls more than
/// `capacity` events behind sees `RecvError::Lagged` and resumes from the oldest
/// buffered event.
///
/// # Examples
///
/// ```
/// use cadence_common::events::{EventBus, SessionEvent};
/// use uuid::Uuid;
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(SessionEvent::SessionFinished {
///     session_id: Uuid::new_v4(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(matches!(rx.try_recv(), Ok(SessionEvent::SessionFinished { .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
    capacity: usize,
}

impl EventBus {
    /// `capacity` events are buffered per subscriber before it lags
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Receiver for events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Publish to every subscriber, returning how many received it
    ///
    /// Fails when nobody is subscribed.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SessionEvent,
    ) -> Result<usize, broadcast::error::SendError<SessionEvent>> {
        self.tx.send(event)
    }

    /// Publish without caring whether anyone listens
    pub fn emit_lossy(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
