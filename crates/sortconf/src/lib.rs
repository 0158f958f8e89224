//! Layered configuration loading for Sortilege.
//!
//! The voice core and the HTTP server both import this crate, so it stays
//! small: serde, toml, directories.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/sortilege/config.toml` (system)
//! 2. `~/.config/sortilege/config.toml` (user)
//! 3. `./sortilege.toml` or the `--config` path (local override)
//! 4. Environment variables (`DISCORD_BOT_TOKEN`, `DISCORD_GUILD_ID`,
//!    `BOT_TOKEN`, `PORT`, `SORTILEGE_*`)
//!
//! # Example Config
//!
//! ```toml
//! [bind]
//! host = "0.0.0.0"
//! http_port = 3001
//!
//! [telemetry]
//! otlp_endpoint = "127.0.0.1:4317"
//! log_level = "info"
//!
//! [discord]
//! guild_id = "123456789012345678"
//!
//! [voice]
//! ffmpeg_path = "/usr/bin/ffmpeg"
//! bitrate_kbps = 128
//! reconnect_probe_ms = 5000
//!
//! [limits]
//! max_audio_bytes = 8388608
//! ```

pub mod discord;
pub mod infra;
pub mod loader;
pub mod voice;

pub use discord::DiscordConfig;
pub use infra::{BindConfig, LimitsConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, expand_path, ConfigSources};
pub use voice::VoiceConfig;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete Sortilege configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortConfig {
    #[serde(default)]
    pub bind: BindConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub discord: DiscordConfig,

    #[serde(default)]
    pub voice: VoiceConfig,

    #[serde(default)]
    pub limits: LimitsConfig,
}

impl SortConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration with an explicit local file, then apply env overrides.
    ///
    /// System and user configs still load first.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let files = loader::discover_config_files_with_override(config_path);
        let (mut config, mut sources) = Self::load_files(&files)?;
        loader::apply_env_overrides(&mut config, &mut sources);
        Ok((config, sources))
    }

    /// Merge the given files in order, without consulting the environment.
    pub fn load_files(files: &[PathBuf]) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in files {
            let table = loader::load_table(path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path.clone());
        }

        let origin = files
            .last()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("<defaults>"));
        let config = loader::from_table(merged, &origin)?;
        Ok((config, sources))
    }

    /// Serialize config to a TOML string. Secrets are redacted.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# Sortilege Configuration\n\n");

        output.push_str("[bind]\n");
        output.push_str(&format!("host = \"{}\"\n", self.bind.host));
        output.push_str(&format!("http_port = {}\n", self.bind.http_port));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!(
            "otlp_endpoint = \"{}\"\n",
            self.telemetry.otlp_endpoint
        ));
        output.push_str(&format!("log_level = \"{}\"\n", self.telemetry.log_level));

        output.push_str("\n[discord]\n");
        output.push_str(&format!(
            "bot_token = \"{}\"\n",
            redact(self.discord.credential())
        ));
        output.push_str(&format!(
            "guild_id = \"{}\"\n",
            self.discord.default_guild().unwrap_or_default()
        ));
        output.push_str(&format!(
            "api_token = \"{}\"\n",
            redact(self.discord.api_token())
        ));

        output.push_str("\n[voice]\n");
        output.push_str(&format!(
            "ffmpeg_path = \"{}\"\n",
            self.voice.ffmpeg_path.display()
        ));
        output.push_str(&format!("bitrate_kbps = {}\n", self.voice.bitrate_kbps));
        output.push_str(&format!("sample_rate = {}\n", self.voice.sample_rate));
        output.push_str(&format!("channels = {}\n", self.voice.channels));
        output.push_str(&format!(
            "connect_timeout_ms = {}\n",
            self.voice.connect_timeout_ms
        ));
        output.push_str(&format!("join_timeout_ms = {}\n", self.voice.join_timeout_ms));
        output.push_str(&format!(
            "reconnect_probe_ms = {}\n",
            self.voice.reconnect_probe_ms
        ));
        output.push_str(&format!(
            "first_output_timeout_ms = {}\n",
            self.voice.first_output_timeout_ms
        ));

        output.push_str("\n[limits]\n");
        output.push_str(&format!(
            "max_audio_bytes = {}\n",
            self.limits.max_audio_bytes
        ));
        output.push_str(&format!("max_body_bytes = {}\n", self.limits.max_body_bytes));

        output
    }
}

fn redact(secret: Option<&str>) -> &'static str {
    match secret {
        Some(_) => "<redacted>",
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = SortConfig::default();
        assert_eq!(config.bind.http_port, 3001);
        assert!(config.discord.credential().is_none());
    }

    #[test]
    fn test_to_toml_redacts_secrets() {
        let mut config = SortConfig::default();
        config.discord.bot_token = Some("very-secret".to_string());
        config.discord.api_token = Some("also-secret".to_string());
        config.discord.guild_id = Some("42".to_string());

        let toml = config.to_toml();
        assert!(toml.contains("[bind]"));
        assert!(toml.contains("[voice]"));
        assert!(toml.contains("guild_id = \"42\""));
        assert!(!toml.contains("very-secret"));
        assert!(!toml.contains("also-secret"));
        assert!(toml.contains("<redacted>"));
    }

    #[test]
    fn test_to_toml_parses_back() {
        let config = SortConfig::default();
        let parsed: SortConfig = toml::from_str(&config.to_toml()).unwrap();
        assert_eq!(parsed.bind, config.bind);
        assert_eq!(parsed.voice, config.voice);
        assert_eq!(parsed.limits, config.limits);
    }

    #[test]
    fn test_later_files_win() {
        let dir = tempfile::tempdir().unwrap();

        let user = dir.path().join("user.toml");
        let mut f = std::fs::File::create(&user).unwrap();
        writeln!(f, "[bind]\nhttp_port = 4000\n\n[voice]\nbitrate_kbps = 64").unwrap();

        let local = dir.path().join("local.toml");
        let mut f = std::fs::File::create(&local).unwrap();
        writeln!(f, "[bind]\nhttp_port = 4100").unwrap();

        let (config, sources) = SortConfig::load_files(&[user, local]).unwrap();
        assert_eq!(config.bind.http_port, 4100);
        assert_eq!(config.voice.bitrate_kbps, 64);
        assert_eq!(sources.files.len(), 2);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = SortConfig::load_files(&[PathBuf::from("/nonexistent/sortilege.toml")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }
}
