//! Playback-related type definitions
//!
//! Supporting types for player state and playback modifiers.

use serde::{Deserialize, Serialize};

/// Audio player state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Nothing playing, ready for the next stream
    #[default]
    Idle,
    Playing,
    Paused,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
        }
    }
}

/// What happens to the current track when it ends
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    /// Replay the current track
    Track,
    /// Requeue the current track at the tail
    Queue,
}

impl std::fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepeatMode::Off => write!(f, "off"),
            RepeatMode::Track => write!(f, "track"),
            RepeatMode::Queue => write!(f, "queue"),
        }
    }
}

impl std::str::FromStr for RepeatMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(RepeatMode::Off),
            "track" | "song" | "one" => Ok(RepeatMode::Track),
            "queue" | "all" => Ok(RepeatMode::Queue),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown repeat mode: {}",
                other
            ))),
        }
    }
}

/// Voice transport connectivity as reported to observers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Ready,
    Reconnecting,
    Disconnected,
    Destroyed,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Ready => write!(f, "ready"),
            ConnectionStatus::Reconnecting => write!(f, "reconnecting"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Destroyed => write!(f, "destroyed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_mode_parsing() {
        assert_eq!("off".parse::<RepeatMode>().unwrap(), RepeatMode::Off);
        assert_eq!("Track".parse::<RepeatMode>().unwrap(), RepeatMode::Track);
        assert_eq!(" all ".parse::<RepeatMode>().unwrap(), RepeatMode::Queue);
        assert!("sometimes".parse::<RepeatMode>().is_err());
    }

    #[test]
    fn test_playback_state_default_is_idle() {
        assert_eq!(PlaybackState::default(), PlaybackState::Idle);
        assert_eq!(PlaybackState::Paused.to_string(), "paused");
    }
}
