//! Playback engine, player and queue management

pub mod engine;
pub mod events;
pub mod player;
pub mod queue_manager;

pub use engine::{EngineServices, PlaybackEngine};
pub use events::{IdleCause, PlaybackId, PlayerEvent};
pub use player::AudioPlayer;
pub use queue_manager::{AdvanceKind, QueueManager};
