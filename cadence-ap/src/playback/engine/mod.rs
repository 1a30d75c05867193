//! Playback engine (session orchestrator)
//!
//! **Module Structure:**
//! - `core.rs`: Struct, lifecycle, queue advancement, transition locking
//! - `queue.rs`: Queue operations (enqueue, skip, stop, previous, jump, reorder)
//! - `playback.rs`: Playback control (pause, resume, seek, volume, filters, modes)
//! - `diagnostics.rs`: Status accessors, player event handler

mod core;
mod diagnostics;
mod playback;
mod queue;

pub use core::{EngineServices, PlaybackEngine};
