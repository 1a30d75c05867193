//! Internal playback events (player → engine)
//!
//! Converted to `SessionEvent`s by the engine's player event handler before
//! reaching observers.

use cadence_common::events::PlaybackState;

/// Identifies one `AudioPlayer::play` call
pub type PlaybackId = u64;

/// Why a playback ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleCause {
    /// The stream reached its end
    Finished,
    /// Reading the stream or writing the sink failed
    Errored(String),
    /// Ended by an explicit `stop` (skip, seek, filter rebuild, teardown)
    Stopped,
}

impl IdleCause {
    /// True when the queue should advance on its own
    pub fn advances_queue(&self) -> bool {
        !matches!(self, IdleCause::Stopped)
    }
}

/// Player → engine events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    StateChanged {
        old_state: PlaybackState,
        new_state: PlaybackState,
    },

    /// A playback ended; emitted exactly once per `PlaybackId`
    Idle {
        playback_id: PlaybackId,
        cause: IdleCause,
    },
}
