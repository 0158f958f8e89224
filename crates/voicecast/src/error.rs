//! Error taxonomy for voice delivery.

use std::time::Duration;
use thiserror::Error;

use crate::types::{GuildId, UserId};

pub type Result<T> = std::result::Result<T, VoiceError>;

/// Everything that can go wrong between a play request and audible audio.
///
/// Errors raised before playback starts are returned to the caller; errors
/// after that point are only logged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VoiceError {
    #[error("bot credential is not configured")]
    MissingCredential,

    #[error("no guild given and no default guild configured")]
    MissingGuild,

    #[error("gateway did not become ready within {0:?}")]
    ConnectTimeout(Duration),

    #[error("gateway connection failed: {0}")]
    ConnectError(String),

    #[error("gateway session is not ready")]
    NotReady,

    #[error("guild {0} is not visible to the bot")]
    GuildNotFound(GuildId),

    #[error("no voice channel matches {0:?}")]
    ChannelNotFound(String),

    #[error("user {user} is not in a voice channel in guild {guild}")]
    UserNotInVoice { guild: GuildId, user: UserId },

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("guild {0} already has an active voice connection")]
    GuildBusy(GuildId),

    #[error("directory lookup failed: {0}")]
    Directory(String),

    #[error("voice connection not ready within {0:?}")]
    JoinTimeout(Duration),

    #[error("voice join failed: {0}")]
    JoinError(String),

    #[error("transcode failed: {0}")]
    TranscodeError(String),

    #[error("playback failed: {0}")]
    PlaybackError(String),
}

impl VoiceError {
    /// Stable machine-readable name, used in API error bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            VoiceError::MissingCredential => "missing_credential",
            VoiceError::MissingGuild => "missing_guild",
            VoiceError::ConnectTimeout(_) => "connect_timeout",
            VoiceError::ConnectError(_) => "connect_error",
            VoiceError::NotReady => "not_ready",
            VoiceError::GuildNotFound(_) => "guild_not_found",
            VoiceError::ChannelNotFound(_) => "channel_not_found",
            VoiceError::UserNotInVoice { .. } => "user_not_in_voice",
            VoiceError::InvalidTarget(_) => "invalid_target",
            VoiceError::GuildBusy(_) => "guild_busy",
            VoiceError::Directory(_) => "directory",
            VoiceError::JoinTimeout(_) => "join_timeout",
            VoiceError::JoinError(_) => "join_error",
            VoiceError::TranscodeError(_) => "transcode_error",
            VoiceError::PlaybackError(_) => "playback_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_is_stable() {
        assert_eq!(VoiceError::NotReady.kind(), "not_ready");
        assert_eq!(
            VoiceError::JoinTimeout(Duration::from_secs(30)).kind(),
            "join_timeout"
        );
        assert_eq!(
            VoiceError::TranscodeError("exit 1".into()).kind(),
            "transcode_error"
        );
    }

    #[test]
    fn test_display_mentions_input() {
        let err = VoiceError::ChannelNotFound("Lobby".into());
        assert!(err.to_string().contains("Lobby"));
    }
}
