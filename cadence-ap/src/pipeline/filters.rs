//! Named audio filters
//!
//! Each filter maps to an ffmpeg audio filter expression. A `FilterChain` is the
//! ordered, de-duplicated set active on a session; it is folded into the decode
//! stage's `-af` graph when a stream is opened.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Known filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFilter {
    BassBoost,
    Nightcore,
    Vaporwave,
    EightD,
    Karaoke,
    Tremolo,
    Vibrato,
    Treble,
    Normalizer,
    Surround,
}

impl AudioFilter {
    pub const ALL: [AudioFilter; 10] = [
        AudioFilter::BassBoost,
        AudioFilter::Nightcore,
        AudioFilter::Vaporwave,
        AudioFilter::EightD,
        AudioFilter::Karaoke,
        AudioFilter::Tremolo,
        AudioFilter::Vibrato,
        AudioFilter::Treble,
        AudioFilter::Normalizer,
        AudioFilter::Surround,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AudioFilter::BassBoost => "bassboost",
            AudioFilter::Nightcore => "nightcore",
            AudioFilter::Vaporwave => "vaporwave",
            AudioFilter::EightD => "8d",
            AudioFilter::Karaoke => "karaoke",
            AudioFilter::Tremolo => "tremolo",
            AudioFilter::Vibrato => "vibrato",
            AudioFilter::Treble => "treble",
            AudioFilter::Normalizer => "normalizer",
            AudioFilter::Surround => "surround",
        }
    }

    /// ffmpeg filter expression at the given output rate
    pub fn expression(&self, sample_rate: u32) -> String {
        match self {
            AudioFilter::BassBoost => "bass=g=10".to_string(),
            // asetrate scales whatever rate reaches it, so pin the input rate first
            AudioFilter::Nightcore => rate_shift(sample_rate, "1.25"),
            AudioFilter::Vaporwave => rate_shift(sample_rate, "0.8"),
            AudioFilter::EightD => "apulsator=hz=0.08".to_string(),
            AudioFilter::Karaoke => "stereotools=mlev=0.03".to_string(),
            AudioFilter::Tremolo => "tremolo=f=6:d=0.5".to_string(),
            AudioFilter::Vibrato => "vibrato=f=6.5:d=0.5".to_string(),
            AudioFilter::Treble => "treble=g=5".to_string(),
            AudioFilter::Normalizer => "dynaudnorm=f=200".to_string(),
            AudioFilter::Surround => "surround".to_string(),
        }
    }
}

/// Pitch and tempo shift by `factor`, resampled back to `sample_rate`
fn rate_shift(sample_rate: u32, factor: &str) -> String {
    format!("aresample={sample_rate},asetrate={sample_rate}*{factor},aresample={sample_rate}")
}

impl fmt::Display for AudioFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AudioFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        AudioFilter::ALL
            .iter()
            .copied()
            .find(|f| f.name() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = AudioFilter::ALL.iter().map(|f| f.name()).collect();
                Error::invalid(format!(
                    "Unknown filter '{}' (available: {})",
                    s.trim(),
                    known.join(", ")
                ))
            })
    }
}

/// Ordered set of active filters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterChain(Vec<AudioFilter>);

impl FilterChain {
    /// Parse filter names; repeats keep their first position, unknown names reject the whole set
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let mut filters = Vec::with_capacity(names.len());
        for name in names {
            let filter: AudioFilter = name.as_ref().parse()?;
            if !filters.contains(&filter) {
                filters.push(filter);
            }
        }
        Ok(Self(filters))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn filters(&self) -> &[AudioFilter] {
        &self.0
    }

    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|f| f.name().to_string()).collect()
    }

    /// Comma-joined filter graph, or None when no filter is active
    pub fn to_graph(&self, sample_rate: u32) -> Option<String> {
        if self.0.is_empty() {
            return None;
        }
        Some(
            self.0
                .iter()
                .map(|f| f.expression(sample_rate))
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}
