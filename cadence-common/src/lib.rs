//! # Cadence Common Library
//!
//! Shared code for the Cadence engine and the layers that observe it:
//! - Track data model (resolved tracks and lazily-resolved placeholders)
//! - Session event types and the EventBus
//! - Configuration loading and resolution
//! - Common error type

pub mod config;
pub mod error;
pub mod events;
pub mod track;

pub use error::{Error, Result};
pub use track::{DirectStream, Locator, PlaceholderTrack, Requester, Track, TrackMetadata, TrackSource};
