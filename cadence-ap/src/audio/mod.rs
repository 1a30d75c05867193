//! Audio output and PCM format types

pub mod output;
pub mod types;

pub use output::{AudioSink, WriterSink};
pub use types::{PcmFormat, FRAME_DURATION};
