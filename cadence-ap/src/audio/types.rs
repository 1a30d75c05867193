//! Core audio data types
//!
//! The whole engine speaks one PCM format: signed 16-bit little-endian,
//! interleaved, delivered in fixed-duration frames.

use cadence_common::config::AudioConfig;
use std::time::Duration;

/// Length of one frame handed to the sink
pub const FRAME_DURATION: Duration = Duration::from_millis(20);

/// Bytes per sample (s16le)
pub const BYTES_PER_SAMPLE: usize = 2;

/// Raw PCM stream format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmFormat {
    pub const fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Size in bytes of one frame (`FRAME_DURATION` of audio)
    pub fn frame_bytes(&self) -> usize {
        let samples_per_channel =
            (self.sample_rate as u128 * FRAME_DURATION.as_millis() / 1000) as usize;
        samples_per_channel * self.channels as usize * BYTES_PER_SAMPLE
    }

    /// Playback time represented by `bytes` of audio
    pub fn duration_of(&self, bytes: u64) -> Duration {
        let bytes_per_second =
            self.sample_rate as u64 * self.channels as u64 * BYTES_PER_SAMPLE as u64;
        if bytes_per_second == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(bytes.saturating_mul(1_000_000) / bytes_per_second)
    }
}

impl Default for PcmFormat {
    /// 48 kHz stereo, what voice transports expect
    fn default() -> Self {
        Self::new(48_000, 2)
    }
}

impl From<&AudioConfig> for PcmFormat {
    fn from(config: &AudioConfig) -> Self {
        Self::new(config.sample_rate, config.channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_frame_size() {
        // 20 ms at 48 kHz stereo s16le = 960 samples * 2 channels * 2 bytes
        assert_eq!(PcmFormat::default().frame_bytes(), 3840);
    }

    #[test]
    fn test_duration_of() {
        let format = PcmFormat::default();
        assert_eq!(format.duration_of(192_000), Duration::from_secs(1));
        assert_eq!(format.duration_of(3840), FRAME_DURATION);
    }
}
