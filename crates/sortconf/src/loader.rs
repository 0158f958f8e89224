//! Config file discovery, table merging, and environment variable overlay.

use crate::{ConfigError, SortConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/sortilege/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("sortilege/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("sortilege.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a config file into a raw TOML table.
pub fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_table(&contents, path)
}

fn parse_table(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Merge `overlay` into `base`. Nested tables merge key by key; any other
/// value in the overlay replaces the base value.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Turn a merged table into a typed config; missing keys take defaults.
pub fn from_table(table: toml::Table, origin: &Path) -> Result<SortConfig, ConfigError> {
    toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
}

/// Apply process environment overrides to config.
pub fn apply_env_overrides(config: &mut SortConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, |key| env::var(key).ok());
}

/// Apply overrides from an arbitrary key lookup.
///
/// The bare deployment names (`DISCORD_BOT_TOKEN`, `DISCORD_GUILD_ID`,
/// `BOT_TOKEN`, `PORT`) and the `SORTILEGE_*` names are both honoured.
/// The `SORTILEGE_*` form wins when both are set.
pub fn apply_overrides_from<F>(config: &mut SortConfig, sources: &mut ConfigSources, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let mut take = |keys: &[&str]| -> Option<String> {
        let mut found = None;
        for key in keys {
            if let Some(value) = lookup(key) {
                sources.env_overrides.push(key.to_string());
                found = Some(value);
            }
        }
        found
    };

    // Discord
    if let Some(v) = take(&["DISCORD_BOT_TOKEN", "SORTILEGE_DISCORD_TOKEN"]) {
        config.discord.bot_token = Some(v);
    }
    if let Some(v) = take(&["DISCORD_GUILD_ID", "SORTILEGE_GUILD_ID"]) {
        config.discord.guild_id = Some(v);
    }
    if let Some(v) = take(&["BOT_TOKEN", "SORTILEGE_API_TOKEN"]) {
        config.discord.api_token = Some(v);
    }

    // Bind
    if let Some(v) = take(&["PORT", "SORTILEGE_HTTP_PORT"]) {
        if let Ok(port) = v.trim().parse() {
            config.bind.http_port = port;
        }
    }
    if let Some(v) = take(&["SORTILEGE_BIND_HOST"]) {
        config.bind.host = v;
    }

    // Telemetry (standard OTEL and RUST_LOG names lose to ours)
    if let Some(v) = take(&["OTEL_EXPORTER_OTLP_ENDPOINT", "SORTILEGE_OTLP_ENDPOINT"]) {
        config.telemetry.otlp_endpoint = v;
    }
    if let Some(v) = take(&["RUST_LOG", "SORTILEGE_LOG_LEVEL"]) {
        config.telemetry.log_level = v;
    }

    // Voice
    if let Some(v) = take(&["SORTILEGE_FFMPEG"]) {
        config.voice.ffmpeg_path = expand_path(&v);
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
        return PathBuf::from(path);
    }

    if let Some(stripped) = path.strip_prefix('$') {
        // $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                return PathBuf::from(var_value).join(&stripped[slash_pos + 1..]);
            }
            return PathBuf::from(path);
        }
        return env::var(stripped)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(path));
    }

    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn table(src: &str) -> toml::Table {
        parse_table(src, Path::new("test.toml")).unwrap()
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/bin/ffmpeg");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("bin/ffmpeg"));
    }

    #[test]
    fn test_expand_path_absolute() {
        assert_eq!(expand_path("/usr/bin/ffmpeg"), PathBuf::from("/usr/bin/ffmpeg"));
    }

    #[test]
    fn test_discover_config_files() {
        // Just verify it doesn't panic
        let _files = discover_config_files();
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = from_table(table("[bind]\nhttp_port = 9000\n"), Path::new("test.toml")).unwrap();
        assert_eq!(config.bind.http_port, 9000);
        // Other values should be defaults
        assert_eq!(config.bind.host, "0.0.0.0");
        assert_eq!(config.voice.bitrate_kbps, 128);
    }

    #[test]
    fn test_merge_keeps_unrelated_keys() {
        let mut base = table(
            r#"
[bind]
host = "127.0.0.1"
http_port = 9000

[voice]
bitrate_kbps = 96
"#,
        );
        merge_tables(&mut base, table("[bind]\nhttp_port = 9100\n"));

        let config = from_table(base, Path::new("merged")).unwrap();
        assert_eq!(config.bind.host, "127.0.0.1");
        assert_eq!(config.bind.http_port, 9100);
        assert_eq!(config.voice.bitrate_kbps, 96);
    }

    #[test]
    fn test_bad_type_is_parse_error() {
        let err = from_table(table("[bind]\nhttp_port = \"nope\"\n"), Path::new("bad.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DISCORD_BOT_TOKEN", "bot-secret"),
            ("DISCORD_GUILD_ID", "424242"),
            ("BOT_TOKEN", "api-secret"),
            ("PORT", "4000"),
        ]
        .into_iter()
        .collect();

        let mut config = SortConfig::default();
        let mut sources = ConfigSources::default();
        apply_overrides_from(&mut config, &mut sources, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.discord.credential(), Some("bot-secret"));
        assert_eq!(config.discord.default_guild(), Some("424242"));
        assert_eq!(config.discord.api_token(), Some("api-secret"));
        assert_eq!(config.bind.http_port, 4000);
        assert_eq!(sources.env_overrides.len(), 4);
    }

    #[test]
    fn test_prefixed_env_wins() {
        let env: HashMap<&str, &str> = [("PORT", "4000"), ("SORTILEGE_HTTP_PORT", "5000")]
            .into_iter()
            .collect();

        let mut config = SortConfig::default();
        let mut sources = ConfigSources::default();
        apply_overrides_from(&mut config, &mut sources, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.bind.http_port, 5000);
    }

    #[test]
    fn test_unparseable_port_is_ignored() {
        let mut config = SortConfig::default();
        let mut sources = ConfigSources::default();
        apply_overrides_from(&mut config, &mut sources, |k| {
            (k == "PORT").then(|| "not-a-port".to_string())
        });
        assert_eq!(config.bind.http_port, 3001);
    }
}
