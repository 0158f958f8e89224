//! serenity-backed [`Gateway`].

use async_trait::async_trait;
use serenity::all::{
    Cache, ChannelType, Client, ConnectionStage, Context, EventHandler, GatewayIntents, GuildChannel,
    Http, HttpError, Ready, ResumedEvent, ShardStageUpdateEvent,
};
use serenity::all::{ChannelId as DiscordChannelId, GuildId as DiscordGuildId, UserId as DiscordUserId};
use songbird::{SerenityInit, Songbird};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Result, VoiceError};
use crate::gateway::{Gateway, GatewayEvent};
use crate::types::{ChannelId, ChannelInfo, ChannelKind, GuildId, GuildInfo, UserId};

struct Handles {
    cache: Arc<Cache>,
    http: Arc<Http>,
}

pub struct DiscordGateway {
    songbird: Arc<Songbird>,
    handles: RwLock<Option<Handles>>,
}

impl DiscordGateway {
    pub fn new(songbird: Arc<Songbird>) -> Self {
        Self {
            songbird,
            handles: RwLock::new(None),
        }
    }

    fn cache(&self) -> Option<Arc<Cache>> {
        self.handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|h| Arc::clone(&h.cache))
    }

    fn http(&self) -> Result<Arc<Http>> {
        self.handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|h| Arc::clone(&h.http))
            .ok_or(VoiceError::NotReady)
    }
}

/// Forwards serenity lifecycle callbacks to the session listener.
struct Handler {
    events: mpsc::UnboundedSender<GatewayEvent>,
}

#[serenity::async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        let _ = self.events.send(GatewayEvent::Ready {
            identity: ready.user.name.clone(),
        });
    }

    async fn resume(&self, _ctx: Context, _event: ResumedEvent) {
        let _ = self.events.send(GatewayEvent::Resumed);
    }

    async fn shard_stage_update(&self, _ctx: Context, event: ShardStageUpdateEvent) {
        debug!("shard {:?}: {:?} -> {:?}", event.shard_id, event.old, event.new);
        if event.new == ConnectionStage::Disconnected {
            let _ = self.events.send(GatewayEvent::Disconnected);
        }
    }
}

#[async_trait]
impl Gateway for DiscordGateway {
    async fn login(&self, credential: &str, events: mpsc::UnboundedSender<GatewayEvent>) -> Result<()> {
        let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;
        let mut client = Client::builder(credential, intents)
            .event_handler(Handler {
                events: events.clone(),
            })
            .register_songbird_with(Arc::clone(&self.songbird))
            .await
            .map_err(|e| VoiceError::ConnectError(e.to_string()))?;

        *self.handles.write().unwrap_or_else(PoisonError::into_inner) = Some(Handles {
            cache: Arc::clone(&client.cache),
            http: Arc::clone(&client.http),
        });

        tokio::spawn(async move {
            let reason = match client.start().await {
                Ok(()) => "gateway client stopped".to_string(),
                Err(e) => e.to_string(),
            };
            let _ = events.send(GatewayEvent::Terminated(reason));
        });
        Ok(())
    }

    fn guild_count(&self) -> usize {
        self.cache().map(|c| c.guild_count()).unwrap_or(0)
    }

    fn guild(&self, guild: GuildId) -> Option<GuildInfo> {
        let cache = self.cache()?;
        let name = cache
            .guild(DiscordGuildId::from(guild.non_zero()))
            .map(|g| g.name.clone())?;
        Some(GuildInfo { id: guild, name })
    }

    async fn fetch_channel(&self, channel: ChannelId) -> Result<Option<ChannelInfo>> {
        let http = self.http()?;
        match http.get_channel(DiscordChannelId::from(channel.non_zero())).await {
            Ok(found) => Ok(found.guild().as_ref().and_then(channel_info)),
            // Unknown, inaccessible or malformed ids read as "no such channel".
            Err(serenity::Error::Http(HttpError::UnsuccessfulRequest(response)))
                if matches!(response.status_code.as_u16(), 400 | 403 | 404) =>
            {
                debug!("channel {} not visible: {}", channel, response.status_code);
                Ok(None)
            }
            Err(e) => Err(VoiceError::Directory(e.to_string())),
        }
    }

    async fn guild_channels(&self, guild: GuildId) -> Result<Vec<ChannelInfo>> {
        let id = DiscordGuildId::from(guild.non_zero());

        if let Some(cache) = self.cache() {
            let cached = cache
                .guild(id)
                .map(|g| g.channels.values().filter_map(channel_info).collect::<Vec<_>>());
            if let Some(channels) = cached {
                return Ok(channels);
            }
        }

        let fetched = self
            .http()?
            .get_channels(id)
            .await
            .map_err(|e| VoiceError::Directory(e.to_string()))?;
        Ok(fetched.iter().filter_map(channel_info).collect())
    }

    async fn member_voice_channel(&self, guild: GuildId, user: UserId) -> Result<Option<ChannelId>> {
        let cache = self.cache().ok_or(VoiceError::NotReady)?;
        let guild_ref = cache
            .guild(DiscordGuildId::from(guild.non_zero()))
            .ok_or(VoiceError::GuildNotFound(guild))?;

        let channel = guild_ref
            .voice_states
            .get(&DiscordUserId::from(user.non_zero()))
            .and_then(|state| state.channel_id)
            .and_then(|id| ChannelId::new(id.get()));
        Ok(channel)
    }
}

fn channel_info(channel: &GuildChannel) -> Option<ChannelInfo> {
    let kind = match channel.kind {
        ChannelType::Text => ChannelKind::Text,
        ChannelType::Voice => ChannelKind::Voice,
        ChannelType::Stage => ChannelKind::StageVoice,
        _ => ChannelKind::Other,
    };
    Some(ChannelInfo {
        id: ChannelId::new(channel.id.get())?,
        guild: GuildId::new(channel.guild_id.get())?,
        name: channel.name.clone(),
        kind,
    })
}
