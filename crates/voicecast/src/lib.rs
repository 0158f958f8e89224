//! Voice delivery for Sortilege.
//!
//! Plays a short clip into a live Discord voice channel:
//!
//! 1. [`Session`] keeps the bot's gateway session and gates everything on readiness.
//! 2. [`ChannelResolver`] turns `<#id>`, ids or channel names into a voice channel.
//! 3. [`FfmpegTranscoder`] re-encodes arbitrary audio to Ogg/Opus.
//! 4. [`VoiceController`] joins, plays without waiting, and tears down when the
//!    player goes idle.
//! 5. The reconnection supervisor gives a dropped transport one short window
//!    to recover before the connection is destroyed.
//!
//! [`VoiceDelivery`] strings these together behind one call. The Discord
//! implementations of the [`Gateway`] and [`VoiceDriver`] seams live in
//! [`discord`]; the `testing` feature adds in-memory ones.
//!
//! ```rust,no_run
//! # async fn example(delivery: voicecast::VoiceDelivery) -> voicecast::Result<()> {
//! use voicecast::{PlaybackRequest, TargetDescriptor};
//!
//! let guild = "123456789012345678".parse()?;
//! let target = TargetDescriptor::Custom { raw_input: "General".into() };
//! let clip = std::fs::read("spell.mp3").unwrap_or_default();
//!
//! let receipt = delivery
//!     .play_in_guild(guild, target, PlaybackRequest::new(clip, "spell.mp3"))
//!     .await?;
//! println!("playing in {}", receipt.channel);
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod controller;
pub mod delivery;
pub mod error;
pub mod gateway;
pub mod player;
pub mod resolver;
pub mod session;
pub mod supervisor;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transcoder;
pub mod types;

#[cfg(feature = "discord")]
pub mod discord;

pub use connection::{GuildSlots, StatusReporter, TransportStatus, VoiceConnection, VoiceDriver, VoiceTransport};
pub use controller::{PlaybackHandle, PlaybackOutcome, Phase, VoiceController};
pub use delivery::{guild_or_default, PlayReceipt, PlaybackRequest, TargetDescriptor, VoiceDelivery};
pub use error::{Result, VoiceError};
pub use gateway::{Gateway, GatewayEvent};
pub use player::{Player, PlayerControl, PlayerEvent, PlayerReporter, PlayerStatus, Volume};
pub use resolver::{parse_channel_reference, ChannelResolver};
pub use session::{Session, SessionState, SessionStatus};
pub use supervisor::{spawn_supervisor, ReconnectPolicy, SupervisorOutcome};
pub use transcoder::{FfmpegTranscoder, OpusStream, Transcode};
pub use types::{ChannelId, ChannelInfo, ChannelKind, GuildId, GuildInfo, UserId};
