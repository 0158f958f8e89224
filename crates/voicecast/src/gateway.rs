//! Control-channel seam: the bot's gateway connection and its directory cache.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::{ChannelId, ChannelInfo, GuildId, GuildInfo, UserId};

/// Lifecycle notifications pushed by a gateway client after login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// Session established; `identity` is the bot's display tag.
    Ready { identity: String },
    /// Session resumed after a transient drop.
    Resumed,
    /// Transport dropped; the client is reconnecting on its own.
    Disconnected,
    /// Non-fatal client error.
    Error(String),
    /// Client stopped for good. A new login is required.
    Terminated(String),
}

/// A gateway client plus read access to what it can see.
///
/// Directory methods are only meaningful once the session reported
/// [`GatewayEvent::Ready`]; callers go through [`crate::Session`] which
/// enforces that.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Open the session. Returns once the client is running; readiness
    /// arrives later on `events`.
    async fn login(&self, credential: &str, events: mpsc::UnboundedSender<GatewayEvent>) -> Result<()>;

    /// Guilds currently visible in the cache.
    fn guild_count(&self) -> usize;

    fn guild(&self, guild: GuildId) -> Option<GuildInfo>;

    /// Look a channel up by id. `Ok(None)` when it does not exist or is not
    /// visible to the bot.
    async fn fetch_channel(&self, channel: ChannelId) -> Result<Option<ChannelInfo>>;

    /// Every channel of a guild, in no particular order.
    async fn guild_channels(&self, guild: GuildId) -> Result<Vec<ChannelInfo>>;

    /// The voice channel a member is currently connected to.
    async fn member_voice_channel(&self, guild: GuildId, user: UserId) -> Result<Option<ChannelId>>;
}
