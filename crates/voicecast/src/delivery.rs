//! Top-level trigger: play a clip into a guild's voice channel.

use bytes::Bytes;
use sortconf::VoiceConfig;
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::connection::VoiceDriver;
use crate::controller::{PlaybackHandle, VoiceController};
use crate::error::{Result, VoiceError};
use crate::gateway::Gateway;
use crate::resolver::ChannelResolver;
use crate::session::{Session, SessionStatus};
use crate::supervisor::ReconnectPolicy;
use crate::transcoder::Transcode;
use crate::types::{ChannelId, ChannelInfo, GuildId, UserId};

/// Where the clip should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetDescriptor {
    /// Whatever voice channel the user sits in right now.
    Current { user_id: UserId },
    /// A channel picked from a list, by id.
    List { channel_id: ChannelId },
    /// Free text: mention, id, or channel name.
    Custom { raw_input: String },
}

impl TargetDescriptor {
    pub fn mode(&self) -> &'static str {
        match self {
            TargetDescriptor::Current { .. } => "current",
            TargetDescriptor::List { .. } => "list",
            TargetDescriptor::Custom { .. } => "custom",
        }
    }
}

/// Audio to play. The buffer moves into the transcoder.
#[derive(Debug, Clone)]
pub struct PlaybackRequest {
    pub audio: Bytes,
    pub file_name: String,
}

impl PlaybackRequest {
    pub fn new(audio: impl Into<Bytes>, file_name: impl Into<String>) -> Self {
        Self {
            audio: audio.into(),
            file_name: file_name.into(),
        }
    }
}

/// Playback has started in `channel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayReceipt {
    pub guild: GuildId,
    pub channel: ChannelId,
}

pub struct VoiceDelivery {
    session: Arc<Session>,
    resolver: ChannelResolver,
    controller: VoiceController,
    transcoder: Arc<dyn Transcode>,
    credential: Option<String>,
}

impl VoiceDelivery {
    pub fn new(
        session: Arc<Session>,
        driver: Arc<dyn VoiceDriver>,
        transcoder: Arc<dyn Transcode>,
        credential: Option<String>,
    ) -> Self {
        Self {
            resolver: ChannelResolver::new(Arc::clone(&session)),
            controller: VoiceController::new(Arc::clone(&session), driver),
            session,
            transcoder,
            credential,
        }
    }

    /// Wire everything with timeouts from configuration.
    pub fn from_config(
        config: &VoiceConfig,
        gateway: Arc<dyn Gateway>,
        driver: Arc<dyn VoiceDriver>,
        transcoder: Arc<dyn Transcode>,
        credential: Option<String>,
    ) -> Self {
        let session =
            Arc::new(Session::new(gateway).with_connect_timeout(config.connect_timeout()));
        let mut delivery = Self::new(session, driver, transcoder, credential);
        delivery.controller = delivery
            .controller
            .with_join_timeout(config.join_timeout())
            .with_reconnect_policy(
                ReconnectPolicy::default().with_probe_timeout(config.reconnect_probe()),
            );
        delivery
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn controller(&self) -> &VoiceController {
        &self.controller
    }

    pub fn resolver(&self) -> &ChannelResolver {
        &self.resolver
    }

    /// Start the gateway session with the configured credential.
    pub async fn start(&self) -> Result<SessionStatus> {
        self.session.start(self.credential.as_deref()).await
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    pub async fn voice_channels(&self, guild: GuildId) -> Result<Vec<ChannelInfo>> {
        self.start().await?;
        self.resolver.voice_channels(guild).await
    }

    /// Resolve the target, join, transcode and start playback.
    ///
    /// Returns once playback started; completion and teardown continue in
    /// the background.
    pub async fn play_in_guild(
        &self,
        guild: GuildId,
        target: TargetDescriptor,
        request: PlaybackRequest,
    ) -> Result<PlayReceipt> {
        self.play_with_handle(guild, target, request)
            .await
            .map(|handle| PlayReceipt {
                guild: handle.guild(),
                channel: handle.channel(),
            })
    }

    /// Like [`play_in_guild`](Self::play_in_guild) but hands back the playback handle.
    #[instrument(skip(self, request), fields(mode = target.mode(), file = %request.file_name, bytes = request.audio.len()))]
    pub async fn play_with_handle(
        &self,
        guild: GuildId,
        target: TargetDescriptor,
        request: PlaybackRequest,
    ) -> Result<PlaybackHandle> {
        self.start().await?;
        self.session.resolve_guild(guild)?;

        let channel = match target {
            TargetDescriptor::Current { user_id } => {
                self.resolver
                    .resolve_user_current_channel(guild, user_id)
                    .await?
            }
            TargetDescriptor::List { channel_id } => {
                self.resolver.resolve_listed(guild, channel_id).await?
            }
            TargetDescriptor::Custom { raw_input } => {
                self.resolver.resolve(guild, &raw_input).await?
            }
        };
        info!("🔮 Delivering {} to channel {} in guild {}", request.file_name, channel, guild);

        let (joined, transcoded) = tokio::join!(
            self.controller.join(channel),
            self.transcoder.transcode(request.audio)
        );

        let connection = joined?;
        let stream = match transcoded {
            Ok(stream) => stream,
            Err(e) => {
                error!("transcode of {} failed: {}", request.file_name, e);
                connection.destroy().await;
                return Err(e);
            }
        };

        self.controller.play(&connection, stream).await
    }
}

/// Pick the request guild, falling back to the configured default.
pub fn guild_or_default(requested: Option<&str>, default: Option<&str>) -> Result<GuildId> {
    match requested.map(str::trim).filter(|g| !g.is_empty()).or(default) {
        Some(raw) => raw.parse(),
        None => Err(VoiceError::MissingGuild),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guild_fallback() {
        assert_eq!(guild_or_default(Some("12"), Some("34")).unwrap().get(), 12);
        assert_eq!(guild_or_default(None, Some("34")).unwrap().get(), 34);
        assert_eq!(guild_or_default(Some(" "), Some("34")).unwrap().get(), 34);
        assert_eq!(guild_or_default(None, None).unwrap_err(), VoiceError::MissingGuild);
        assert_eq!(
            guild_or_default(Some("nope"), None).unwrap_err().kind(),
            "invalid_target"
        );
    }

    #[test]
    fn test_target_modes() {
        let target = TargetDescriptor::Custom {
            raw_input: "<#1>".into(),
        };
        assert_eq!(target.mode(), "custom");
    }
}
