//! Shared type definitions for event data
//!
//! Common structs used across multiple event types.

use serde::{Deserialize, Serialize};

use super::playback_types::RepeatMode;

/// Playback modifiers of a session as seen by observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsInfo {
    /// Volume percent (0-200)
    pub volume: u16,
    /// Active filter names, in graph order
    pub filters: Vec<String>,
    pub repeat_mode: RepeatMode,
    pub autoplay: bool,
}
