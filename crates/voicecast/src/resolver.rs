//! Channel resolution from loose human input.
//!
//! Accepted forms, tried in order: a `<#id>` mention, a bare numeric id,
//! then a case-insensitive exact name among the guild's voice channels.
//! An id always wins over a name. When several channels share a name the
//! first one in directory (creation) order wins.

use std::sync::Arc;
use tracing::debug;

use crate::error::{Result, VoiceError};
use crate::session::Session;
use crate::types::{ChannelId, ChannelInfo, GuildId, UserId};

/// Extract a channel id from `<#123>` or `123`.
pub fn parse_channel_reference(input: &str) -> Option<ChannelId> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("<#")
        .and_then(|rest| rest.strip_suffix('>'))
        .unwrap_or(trimmed);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[derive(Clone)]
pub struct ChannelResolver {
    session: Arc<Session>,
}

impl ChannelResolver {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Resolve free-form input to a voice-capable channel of `guild`.
    pub async fn resolve(&self, guild: GuildId, input: &str) -> Result<ChannelId> {
        self.session.resolve_guild(guild)?;

        let input = input.trim();
        if input.is_empty() {
            return Err(VoiceError::ChannelNotFound(String::new()));
        }

        if let Some(id) = parse_channel_reference(input) {
            match self.session.gateway().fetch_channel(id).await {
                Ok(Some(channel)) if channel.guild == guild && channel.kind.is_voice_capable() => {
                    debug!("resolved {:?} by id to {}", input, channel.id);
                    return Ok(channel.id);
                }
                Ok(Some(channel)) => {
                    debug!(
                        "channel {} is {} in guild {}, trying names",
                        channel.id, channel.kind, channel.guild
                    );
                }
                Ok(None) => debug!("no channel with id {}, trying names", id),
                Err(e) => debug!("lookup of {} failed ({}), trying names", id, e),
            }
        }

        let wanted = input.to_lowercase();
        self.directory(guild)
            .await?
            .into_iter()
            .find(|c| c.kind.is_voice_capable() && c.name.to_lowercase() == wanted)
            .map(|c| {
                debug!("resolved {:?} by name to {}", input, c.id);
                c.id
            })
            .ok_or_else(|| VoiceError::ChannelNotFound(input.to_string()))
    }

    /// Check that a channel picked from a listing is a voice channel of `guild`.
    pub async fn resolve_listed(&self, guild: GuildId, channel: ChannelId) -> Result<ChannelId> {
        self.session.resolve_guild(guild)?;
        match self.session.gateway().fetch_channel(channel).await? {
            Some(info) if info.guild == guild && info.kind.is_voice_capable() => Ok(info.id),
            Some(info) => {
                debug!("listed channel {} is {} in guild {}", info.id, info.kind, info.guild);
                Err(VoiceError::ChannelNotFound(channel.to_string()))
            }
            None => Err(VoiceError::ChannelNotFound(channel.to_string())),
        }
    }

    /// The voice channel `user` currently sits in.
    pub async fn resolve_user_current_channel(&self, guild: GuildId, user: UserId) -> Result<ChannelId> {
        self.session.resolve_guild(guild)?;
        self.session
            .gateway()
            .member_voice_channel(guild, user)
            .await?
            .ok_or(VoiceError::UserNotInVoice { guild, user })
    }

    /// Voice-capable channels of `guild` in directory order.
    pub async fn voice_channels(&self, guild: GuildId) -> Result<Vec<ChannelInfo>> {
        self.session.resolve_guild(guild)?;
        let mut channels = self.directory(guild).await?;
        channels.retain(|c| c.kind.is_voice_capable());
        Ok(channels)
    }

    async fn directory(&self, guild: GuildId) -> Result<Vec<ChannelInfo>> {
        let mut channels = self.session.gateway().guild_channels(guild).await?;
        channels.sort_by_key(|c| c.id);
        Ok(channels)
    }
}
