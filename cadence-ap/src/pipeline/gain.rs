//! Volume stage
//!
//! Volume is applied in-process on decoded s16le frames rather than baked into
//! the decoder's filter graph, so a change is heard on the next frame without
//! restarting the process chain.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

/// Highest accepted volume percent
pub const MAX_VOLUME: u16 = 200;

/// Unity gain
pub const UNITY_VOLUME: u16 = 100;

/// Clamp a requested volume into `0..=MAX_VOLUME`
pub fn clamp_volume(requested: i64) -> u16 {
    requested.clamp(0, MAX_VOLUME as i64) as u16
}

/// Live volume setting shared between the session and the playing stream
#[derive(Debug, Clone)]
pub struct VolumeHandle(Arc<AtomicU16>);

impl VolumeHandle {
    pub fn new(percent: u16) -> Self {
        Self(Arc::new(AtomicU16::new(percent.min(MAX_VOLUME))))
    }

    pub fn get(&self) -> u16 {
        self.0.load(Ordering::Relaxed)
    }

    /// Store a clamped volume and return the applied value
    pub fn set(&self, requested: i64) -> u16 {
        let applied = clamp_volume(requested);
        self.0.store(applied, Ordering::Relaxed);
        applied
    }
}

impl Default for VolumeHandle {
    fn default() -> Self {
        Self::new(UNITY_VOLUME)
    }
}

/// Scale interleaved s16le samples in place, saturating at the sample limits
pub fn apply_gain(frame: &mut [u8], percent: u16) {
    if percent == UNITY_VOLUME {
        return;
    }
    if percent == 0 {
        frame.fill(0);
        return;
    }

    let factor = percent as i32;
    for sample in frame.chunks_exact_mut(2) {
        let value = i16::from_le_bytes([sample[0], sample[1]]) as i32;
        let scaled = (value * factor / UNITY_VOLUME as i32)
            .clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        sample.copy_from_slice(&scaled.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(values: &[i16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn decode(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect()
    }

    #[test]
    fn test_clamp_volume() {
        assert_eq!(clamp_volume(250), 200);
        assert_eq!(clamp_volume(-5), 0);
        assert_eq!(clamp_volume(75), 75);
    }

    #[test]
    fn test_handle_is_shared() {
        let handle = VolumeHandle::new(100);
        let reader = handle.clone();

        assert_eq!(handle.set(300), 200);
        assert_eq!(reader.get(), 200);
    }

    #[test]
    fn test_half_volume() {
        let mut frame = samples(&[1000, -1000, 0, 32767]);
        apply_gain(&mut frame, 50);
        assert_eq!(decode(&frame), vec![500, -500, 0, 16383]);
    }

    #[test]
    fn test_boost_saturates() {
        let mut frame = samples(&[20000, -20000, 100]);
        apply_gain(&mut frame, 200);
        assert_eq!(decode(&frame), vec![i16::MAX, i16::MIN, 200]);
    }

    #[test]
    fn test_unity_and_mute() {
        let original = samples(&[123, -456]);

        let mut frame = original.clone();
        apply_gain(&mut frame, 100);
        assert_eq!(frame, original);

        apply_gain(&mut frame, 0);
        assert_eq!(decode(&frame), vec![0, 0]);
    }
}
