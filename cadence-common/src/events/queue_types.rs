//! Queue-related type definitions
//!
//! Supporting types for queue change notifications.

use serde::{Deserialize, Serialize};

/// Why the queue changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum QueueChangeTrigger {
    UserEnqueue,
    UserDequeue,
    UserReorder,
    TrackCompletion,
    Skip,
    Previous,
    Jump,
    Stop,
    Autoplay,
    ResolutionFailure,
    Teardown,
}

impl std::fmt::Display for QueueChangeTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueChangeTrigger::UserEnqueue => write!(f, "UserEnqueue"),
            QueueChangeTrigger::UserDequeue => write!(f, "UserDequeue"),
            QueueChangeTrigger::UserReorder => write!(f, "UserReorder"),
            QueueChangeTrigger::TrackCompletion => write!(f, "TrackCompletion"),
            QueueChangeTrigger::Skip => write!(f, "Skip"),
            QueueChangeTrigger::Previous => write!(f, "Previous"),
            QueueChangeTrigger::Jump => write!(f, "Jump"),
            QueueChangeTrigger::Stop => write!(f, "Stop"),
            QueueChangeTrigger::Autoplay => write!(f, "Autoplay"),
            QueueChangeTrigger::ResolutionFailure => write!(f, "ResolutionFailure"),
            QueueChangeTrigger::Teardown => write!(f, "Teardown"),
        }
    }
}
