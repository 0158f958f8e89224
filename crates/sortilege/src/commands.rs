//! CLI command implementations

use anyhow::{bail, Context, Result};
use base64::Engine as _;
use sortconf::SortConfig;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::api::PlayBody;
use crate::client::Client;

/// Check that a server answers `/health`.
pub async fn ping(url: &str, timeout_ms: u64) -> Result<()> {
    let client = Client::new(url, None, Duration::from_millis(timeout_ms))?;

    let start = Instant::now();
    let health = client.health().await?;
    let elapsed = start.elapsed();

    let ready = health
        .pointer("/session/ready")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    println!(
        "ok from {} (version {}, uptime {}s, discord {}) in {:?}",
        url,
        health["version"].as_str().unwrap_or("?"),
        health["uptime_secs"].as_u64().unwrap_or(0),
        if ready { "ready" } else { "not ready" },
        elapsed
    );
    Ok(())
}

/// Where to play a clip, as given on the command line.
#[derive(Debug, Clone)]
pub enum PlayTarget {
    User(String),
    Channel(String),
    Input(String),
}

pub struct PlayArgs {
    pub url: String,
    pub file: PathBuf,
    pub guild: Option<String>,
    pub target: PlayTarget,
    pub token: Option<String>,
    pub timeout_ms: u64,
}

fn play_body(file: &Path, audio: &[u8], guild: Option<String>, target: PlayTarget) -> PlayBody {
    let mut body = PlayBody {
        guild_id: guild,
        audio_base64: Some(base64::engine::general_purpose::STANDARD.encode(audio)),
        file_name: file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned()),
        ..Default::default()
    };
    match target {
        PlayTarget::User(id) => {
            body.mode = Some("current".into());
            body.user_discord_id = Some(id);
        }
        PlayTarget::Channel(id) => {
            body.mode = Some("list".into());
            body.voice_channel_id = Some(id);
        }
        PlayTarget::Input(input) => {
            body.mode = Some("custom".into());
            body.voice_channel_input = Some(input);
        }
    }
    body
}

/// Upload a clip to a running server and report where it plays.
pub async fn play(args: PlayArgs) -> Result<()> {
    let audio = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    if audio.is_empty() {
        bail!("{} is empty", args.file.display());
    }

    let body = play_body(&args.file, &audio, args.guild, args.target);
    let client = Client::new(&args.url, args.token, Duration::from_millis(args.timeout_ms))?;
    let response = client.play(&body).await?;

    println!("▶️  playing {} in channel {}", args.file.display(), response.channel_id);
    Ok(())
}

/// List voice channels known to a running server.
pub async fn channels(url: &str, guild: Option<&str>, token: Option<String>, timeout_ms: u64) -> Result<()> {
    let client = Client::new(url, token, Duration::from_millis(timeout_ms))?;
    let response = client.voice_channels(guild).await?;
    for channel in response.channels {
        println!("{}\t{}", channel.id, channel.name);
    }
    Ok(())
}

/// Print the effective configuration with secrets redacted.
pub fn show_config(config_path: Option<&Path>) -> Result<()> {
    let (config, sources) =
        SortConfig::load_with_sources_from(config_path).context("Failed to load configuration")?;

    println!("# files: {}", describe_files(&sources.files));
    if !sources.env_overrides.is_empty() {
        println!("# env: {}", sources.env_overrides.join(", "));
    }
    print!("{}", config.to_toml());
    Ok(())
}

fn describe_files(files: &[PathBuf]) -> String {
    if files.is_empty() {
        return "(defaults only)".to_string();
    }
    files
        .iter()
        .map(|f| f.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
