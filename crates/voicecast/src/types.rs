//! Discord identifiers and directory records.

use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;

use crate::error::VoiceError;

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(NonZeroU64);

        impl $name {
            /// Wrap a raw snowflake. Zero is never a valid id.
            pub fn new(id: u64) -> Option<Self> {
                NonZeroU64::new(id).map(Self)
            }

            pub fn get(self) -> u64 {
                self.0.get()
            }

            pub fn non_zero(self) -> NonZeroU64 {
                self.0
            }
        }

        impl From<NonZeroU64> for $name {
            fn from(id: NonZeroU64) -> Self {
                Self(id)
            }
        }

        impl FromStr for $name {
            type Err = VoiceError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<u64>()
                    .ok()
                    .and_then(Self::new)
                    .ok_or_else(|| VoiceError::InvalidTarget(format!("{:?} is not a valid {}", s, $label)))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

snowflake!(
    /// Guild (server) snowflake.
    GuildId,
    "guild id"
);
snowflake!(
    /// Channel snowflake.
    ChannelId,
    "channel id"
);
snowflake!(
    /// User snowflake.
    UserId,
    "user id"
);

/// Closed set of channel kinds the resolver cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Voice,
    StageVoice,
    Other,
}

impl ChannelKind {
    pub fn is_voice_capable(self) -> bool {
        matches!(self, ChannelKind::Voice | ChannelKind::StageVoice)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Text => "text",
            ChannelKind::Voice => "voice",
            ChannelKind::StageVoice => "stage_voice",
            ChannelKind::Other => "other",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry of a guild's channel directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub guild: GuildId,
    pub name: String,
    pub kind: ChannelKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildInfo {
    pub id: GuildId,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_snowflake() {
        let id: ChannelId = "555".parse().unwrap();
        assert_eq!(id.get(), 555);
        assert_eq!(id.to_string(), "555");

        let padded: GuildId = " 42 ".parse().unwrap();
        assert_eq!(padded.get(), 42);
    }

    #[test]
    fn test_reject_zero_and_garbage() {
        assert!("0".parse::<UserId>().is_err());
        assert!("abc".parse::<UserId>().is_err());
        assert!("".parse::<GuildId>().is_err());
        assert!(matches!(
            "-1".parse::<ChannelId>(),
            Err(VoiceError::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_voice_capable_kinds() {
        assert!(ChannelKind::Voice.is_voice_capable());
        assert!(ChannelKind::StageVoice.is_voice_capable());
        assert!(!ChannelKind::Text.is_voice_capable());
        assert!(!ChannelKind::Other.is_voice_capable());
    }
}
