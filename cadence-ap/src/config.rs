//! cadence-ap specific configuration
//!
//! The engine takes the sections of the shared TOML config it needs, with
//! command-line overrides applied on top.

use crate::error::{Error, Result};
use cadence_common::config::{
    load_config, AudioConfig, LoggingConfig, PrefetchConfig, SessionConfig, TomlConfig,
    TransportConfig,
};
use std::path::Path;

/// Per-session engine configuration
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub audio: AudioConfig,
    pub session: SessionConfig,
    pub prefetch: PrefetchConfig,
    pub transport: TransportConfig,
}

impl EngineConfig {
    /// Resolve and load the config file, returning the engine part and the logging part
    pub fn load(cli_arg: Option<&Path>) -> Result<(Self, LoggingConfig)> {
        let toml = load_config(cli_arg)?;
        let config = Self::from(&toml);
        config.validate()?;
        Ok((config, toml.logging))
    }

    /// Reject timeouts the engine can't work with
    pub fn validate(&self) -> Result<()> {
        if self.audio.first_audio_timeout_ms == 0 {
            return Err(Error::Config(
                "audio.first_audio_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.prefetch.enabled && self.prefetch.resolve_timeout_ms == 0 {
            return Err(Error::Config(
                "prefetch.resolve_timeout_ms must be non-zero when prefetch is enabled".to_string(),
            ));
        }
        if self.transport.ready_timeout_ms == 0 {
            return Err(Error::Config(
                "transport.ready_timeout_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Override the starting volume (clamped like any volume change)
    pub fn with_volume(mut self, volume: Option<i64>) -> Self {
        if let Some(volume) = volume {
            self.session.default_volume = crate::pipeline::clamp_volume(volume);
        }
        self
    }

    pub fn with_autoplay(mut self, autoplay: bool) -> Self {
        if autoplay {
            self.session.autoplay = true;
        }
        self
    }
}

impl From<&TomlConfig> for EngineConfig {
    fn from(config: &TomlConfig) -> Self {
        Self {
            audio: config.audio.clone(),
            session: config.session.clone(),
            prefetch: config.prefetch.clone(),
            transport: config.transport.clone(),
        }
    }
}
