//! sortilege - casts audio clips into Discord voice channels
//!
//! Subcommands:
//! - `sortilege serve` - Run the HTTP bot server
//! - `sortilege ping <url>` - Check a running server
//! - `sortilege play <url> --file <clip>` - Upload a clip to a running server
//! - `sortilege channels <url>` - List voice channels a server can reach
//! - `sortilege config` - Print the effective configuration

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use sortconf::SortConfig;
use std::path::PathBuf;

use sortilege::commands::{self, PlayArgs, PlayTarget};
use sortilege::{serve, telemetry};

#[derive(Parser)]
#[command(name = "sortilege")]
#[command(about = "Discord voice delivery bot for Sortilege")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP bot server
    Serve {
        /// HTTP port to bind (overrides config and PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Config file (default: ./sortilege.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// OTLP gRPC endpoint for OpenTelemetry (e.g., "localhost:4317")
        #[arg(long)]
        otlp_endpoint: Option<String>,
    },

    /// Check that a server is up
    Ping {
        /// Server URL (e.g., http://localhost:3001)
        url: String,

        /// Timeout in milliseconds
        #[arg(short, long, default_value = "5000")]
        timeout: u64,
    },

    /// Play an audio file through a running server
    #[command(group(ArgGroup::new("target").required(true).args(["user", "channel", "input"])))]
    Play {
        /// Server URL
        url: String,

        /// Audio file to upload
        #[arg(short, long)]
        file: PathBuf,

        /// Guild id (defaults to the server's configured guild)
        #[arg(short, long)]
        guild: Option<String>,

        /// Play in this user's current voice channel
        #[arg(long)]
        user: Option<String>,

        /// Play in this voice channel id
        #[arg(long)]
        channel: Option<String>,

        /// Channel mention, id or name
        #[arg(long)]
        input: Option<String>,

        /// API bearer token (defaults to the configured one)
        #[arg(long)]
        token: Option<String>,

        /// Timeout in milliseconds
        #[arg(short, long, default_value = "60000")]
        timeout: u64,
    },

    /// List voice channels of a guild through a running server
    Channels {
        /// Server URL
        url: String,

        /// Guild id (defaults to the server's configured guild)
        #[arg(short, long)]
        guild: Option<String>,

        /// API bearer token (defaults to the configured one)
        #[arg(long)]
        token: Option<String>,

        /// Timeout in milliseconds
        #[arg(short, long, default_value = "15000")]
        timeout: u64,
    },

    /// Print the effective configuration (secrets redacted)
    Config {
        /// Config file (default: ./sortilege.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Token from the flag, else from configuration.
fn api_token(flag: Option<String>) -> Option<String> {
    flag.or_else(|| {
        SortConfig::load()
            .ok()
            .and_then(|c| c.discord.api_token().map(str::to_string))
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // serve picks its own subscriber from configuration
    if !matches!(cli.command, Commands::Serve { .. }) {
        telemetry::init_cli();
    }

    match cli.command {
        Commands::Serve {
            port,
            config,
            otlp_endpoint,
        } => {
            let mut config =
                SortConfig::load_from(config.as_deref()).context("Failed to load configuration")?;
            if let Some(port) = port {
                config.bind.http_port = port;
            }
            if let Some(endpoint) = otlp_endpoint {
                config.telemetry.otlp_endpoint = endpoint;
            }

            telemetry::init(&config.telemetry)?;
            let result = serve::run(config).await;
            telemetry::shutdown();
            result?;
        }
        Commands::Ping { url, timeout } => {
            commands::ping(&url, timeout).await?;
        }
        Commands::Play {
            url,
            file,
            guild,
            user,
            channel,
            input,
            token,
            timeout,
        } => {
            let target = match (user, channel, input) {
                (Some(user), _, _) => PlayTarget::User(user),
                (_, Some(channel), _) => PlayTarget::Channel(channel),
                (_, _, Some(input)) => PlayTarget::Input(input),
                (None, None, None) => anyhow::bail!("one of --user, --channel or --input is required"),
            };
            commands::play(PlayArgs {
                url,
                file,
                guild,
                target,
                token: api_token(token),
                timeout_ms: timeout,
            })
            .await?;
        }
        Commands::Channels {
            url,
            guild,
            token,
            timeout,
        } => {
            commands::channels(&url, guild.as_deref(), api_token(token), timeout).await?;
        }
        Commands::Config { config } => {
            commands::show_config(config.as_deref())?;
        }
    }

    Ok(())
}
