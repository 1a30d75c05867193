//! # Cadence Audio Player Library (cadence-ap)
//!
//! Real-time playback orchestration for voice sessions.
//!
//! **Purpose:** Queue tracks resolved from URLs or search text, stream them through
//! an external fetch/decode chain, and deliver 20 ms PCM frames to a voice
//! transport, surviving transient disconnects.
//!
//! **Architecture:** One `PlaybackEngine` per session (guild), owned by its
//! transport connection through the `SessionRegistry`. The engine drives an
//! `AudioPlayer` fed by a `StreamPipeline`, prefetches the next track, and reports
//! every transition on a broadcast `EventBus`.

pub mod audio;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod playback;
pub mod prefetch;
pub mod registry;
pub mod resolver;
pub mod state;
pub mod transport;

pub use error::{Error, Result};
pub use playback::{EngineServices, PlaybackEngine};
pub use registry::SessionRegistry;
pub use state::SharedState;
