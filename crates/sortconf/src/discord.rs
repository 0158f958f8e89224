//! Discord credentials and the default voice destination.

use serde::{Deserialize, Serialize};

/// Discord-side settings.
///
/// All three values are secrets or deployment identifiers, so they are
/// normally supplied through the environment rather than a checked-in file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot credential used to open the gateway session (`DISCORD_BOT_TOKEN`).
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Guild used when a play request names none (`DISCORD_GUILD_ID`).
    #[serde(default)]
    pub guild_id: Option<String>,

    /// Bearer token callers of the HTTP API must present (`BOT_TOKEN`).
    #[serde(default)]
    pub api_token: Option<String>,
}

impl DiscordConfig {
    /// Bot credential, treating an empty string as absent.
    pub fn credential(&self) -> Option<&str> {
        non_empty(self.bot_token.as_deref())
    }

    /// Default guild, treating an empty string as absent.
    pub fn default_guild(&self) -> Option<&str> {
        non_empty(self.guild_id.as_deref())
    }

    /// API bearer token, treating an empty string as absent.
    pub fn api_token(&self) -> Option<&str> {
        non_empty(self.api_token.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
