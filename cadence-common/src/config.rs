//! Configuration loading and config file resolution
//!
//! Bootstrap configuration lives in one TOML file. Every field has a built-in
//! default, so a missing file (or a file with missing sections) still yields a
//! complete configuration.
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `CADENCE_CONFIG` environment variable
//! 3. User config directory (`~/.config/cadence/config.toml` on Linux)
//! 4. Built-in defaults (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "CADENCE_CONFIG";

/// Complete bootstrap configuration
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    pub logging: LoggingConfig,
    pub audio: AudioConfig,
    pub session: SessionConfig,
    pub prefetch: PrefetchConfig,
    pub transport: TransportConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Decode pipeline configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Decoder binary (fast and slow path)
    pub ffmpeg_path: PathBuf,

    /// Fetcher binary used by the slow path and the bundled resolver
    pub fetcher_path: PathBuf,

    /// Output sample rate in Hz
    pub sample_rate: u32,

    /// Output channel count
    pub channels: u16,

    /// How long a freshly spawned chain may take to produce its first audio bytes
    pub first_audio_timeout_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            fetcher_path: PathBuf::from("yt-dlp"),
            sample_rate: 48_000,
            channels: 2,
            first_audio_timeout_ms: 8_000,
        }
    }
}

impl AudioConfig {
    pub fn first_audio_timeout(&self) -> Duration {
        Duration::from_millis(self.first_audio_timeout_ms)
    }
}

/// Most finished tracks a session remembers for `previous`
pub const MAX_HISTORY_CAPACITY: usize = 50;

/// Per-session playback defaults
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of finished tracks kept for `previous` (1-50)
    pub history_capacity: usize,

    /// Initial volume percent (0-200)
    pub default_volume: u16,

    /// Initial autoplay flag
    pub autoplay: bool,

    /// Event bus capacity
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_capacity: MAX_HISTORY_CAPACITY,
            default_volume: 100,
            autoplay: false,
            event_capacity: 256,
        }
    }
}

/// Prefetch cache configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PrefetchConfig {
    pub enabled: bool,

    /// Upper bound on one in-flight prefetch resolution
    pub resolve_timeout_ms: u64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            resolve_timeout_ms: 30_000,
        }
    }
}

impl PrefetchConfig {
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }
}

/// Voice transport supervision configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    /// Reconnect attempts before the session is torn down
    pub max_reconnect_attempts: u32,

    /// First backoff delay; doubles on every attempt
    pub reconnect_base_delay_ms: u64,

    /// How long to wait for Ready (initial connect and after each reconnect)
    pub ready_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            reconnect_base_delay_ms: 1_000,
            ready_timeout_ms: 20_000,
        }
    }
}

impl TransportConfig {
    /// Backoff before reconnect attempt `attempt` (0-based)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(16)).unwrap_or(u64::MAX);
        Duration::from_millis(self.reconnect_base_delay_ms.saturating_mul(factor))
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.session.default_volume > 200 {
            return Err(Error::Config(format!(
                "session.default_volume must be 0-200, got {}",
                self.session.default_volume
            )));
        }
        if self.session.history_capacity == 0
            || self.session.history_capacity > MAX_HISTORY_CAPACITY
        {
            return Err(Error::Config(format!(
                "session.history_capacity must be 1-{}, got {}",
                MAX_HISTORY_CAPACITY, self.session.history_capacity
            )));
        }
        if self.session.event_capacity == 0 {
            return Err(Error::Config(
                "session.event_capacity must be at least 1".to_string(),
            ));
        }
        if self.audio.channels == 0 || self.audio.sample_rate == 0 {
            return Err(Error::Config(
                "audio.sample_rate and audio.channels must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Resolve which config file to read, following the priority order above
///
/// Returns None when no file applies (built-in defaults are used).
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: User config directory, only when the file exists
    default_config_file().filter(|path| path.exists())
}

/// Platform user config file location
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cadence").join("config.toml"))
}

/// Resolve and load configuration
///
/// An explicit command-line path that does not exist is an error. A missing file
/// from any other source logs a warning and falls back to defaults. A malformed
/// file is always an error.
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = resolve_config_path(cli_arg) else {
        info!("No config file found, using built-in defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        if cli_arg.is_some() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        warn!(
            "Config file {} does not exist, using built-in defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    info!("Loading config from {}", path.display());
    TomlConfig::load(&path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_is_all_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
        assert_eq!(config.session.history_capacity, 50);
        assert_eq!(config.transport.max_reconnect_attempts, 5);
        assert_eq!(config.audio.sample_rate, 48_000);
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            [session]
            default_volume = 80

            [transport]
            reconnect_base_delay_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.session.default_volume, 80);
        assert_eq!(config.session.history_capacity, 50);
        assert_eq!(config.transport.reconnect_base_delay_ms, 250);
        assert_eq!(config.transport.ready_timeout_ms, 20_000);
    }

    #[test]
    fn test_invalid_volume_rejected() {
        let result = TomlConfig::from_toml_str("[session]\ndefault_volume = 300\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_history_capacity_bounded() {
        let config = TomlConfig::from_toml_str("[session]\nhistory_capacity = 50\n").unwrap();
        assert_eq!(config.session.history_capacity, MAX_HISTORY_CAPACITY);

        for bad in ["0", "51", "500"] {
            let toml = format!("[session]\nhistory_capacity = {}\n", bad);
            let result = TomlConfig::from_toml_str(&toml);
            assert!(matches!(result, Err(Error::Config(_))), "{} accepted", bad);
        }
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let result = TomlConfig::from_toml_str("[session\nvolume = ");
        assert!(matches!(result, Err(Error::ConfigParse(_))));
    }

    #[test]
    fn test_backoff_doubles() {
        let transport = TransportConfig {
            reconnect_base_delay_ms: 100,
            ..TransportConfig::default()
        };
        assert_eq!(transport.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(transport.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(transport.backoff_delay(4), Duration::from_millis(1_600));
    }
}
