//! songbird-backed voice driver and transport.

use async_trait::async_trait;
use songbird::events::context_data::DisconnectKind;
use songbird::events::{CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent};
use songbird::id::{ChannelId as VoiceChannelId, GuildId as VoiceGuildId};
use songbird::tracks::{PlayMode, TrackHandle};
use songbird::Songbird;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::source::opus_input;
use crate::connection::{StatusReporter, TransportStatus, VoiceDriver, VoiceTransport};
use crate::error::{Result, VoiceError};
use crate::player::{PlayerControl, PlayerReporter, Volume};
use crate::transcoder::OpusStream;
use crate::types::{ChannelId, GuildId};

pub struct SongbirdDriver {
    manager: Arc<Songbird>,
    rejoin_timeout: Duration,
}

impl SongbirdDriver {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            rejoin_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_rejoin_timeout(mut self, timeout: Duration) -> Self {
        self.rejoin_timeout = timeout;
        self
    }
}

#[async_trait]
impl VoiceDriver for SongbirdDriver {
    async fn connect(
        &self,
        guild: GuildId,
        channel: ChannelId,
        status: StatusReporter,
    ) -> Result<Arc<dyn VoiceTransport>> {
        let guild = VoiceGuildId::from(guild.non_zero());
        let channel = VoiceChannelId::from(channel.non_zero());
        let manager = Arc::clone(&self.manager);
        let rejoin_timeout = self.rejoin_timeout;

        let join = tokio::spawn(async move {
            status.report(TransportStatus::Signalling);
            match manager.join(guild, channel).await {
                Ok(call) => {
                    let relay = StatusRelay {
                        manager: Arc::clone(&manager),
                        guild,
                        channel,
                        status: status.clone(),
                        rejoin_timeout,
                    };
                    let mut call = call.lock().await;
                    call.add_global_event(Event::Core(CoreEvent::DriverConnect), relay.clone());
                    call.add_global_event(Event::Core(CoreEvent::DriverReconnect), relay.clone());
                    call.add_global_event(Event::Core(CoreEvent::DriverDisconnect), relay);
                    status.report(TransportStatus::Ready);
                }
                Err(e) => {
                    warn!("songbird join failed: {}", e);
                    status.fail(e.to_string());
                }
            }
        });

        Ok(Arc::new(SongbirdTransport {
            manager: Arc::clone(&self.manager),
            guild,
            join: Mutex::new(Some(join)),
        }))
    }
}

/// Maps songbird driver events onto transport statuses.
///
/// After a runtime disconnect it tries one bounded rejoin, reporting
/// `Signalling` while that is in flight.
#[derive(Clone)]
struct StatusRelay {
    manager: Arc<Songbird>,
    guild: VoiceGuildId,
    channel: VoiceChannelId,
    status: StatusReporter,
    rejoin_timeout: Duration,
}

impl StatusRelay {
    async fn rejoin(self) {
        if self.status.current() == TransportStatus::Destroyed {
            return;
        }
        let Some(call) = self.manager.get(self.guild) else {
            return;
        };

        self.status.report(TransportStatus::Signalling);
        let attempt = async {
            let join = call.lock().await.join(self.channel).await?;
            join.await
        };

        match tokio::time::timeout(self.rejoin_timeout, attempt).await {
            Ok(Ok(())) => {
                info!("Voice transport for guild {:?} rejoined", self.guild);
                self.status.report(TransportStatus::Ready);
            }
            Ok(Err(e)) => {
                warn!("voice rejoin failed: {}", e);
                self.status.report(TransportStatus::Disconnected);
            }
            Err(_) => {
                warn!("voice rejoin timed out after {:?}", self.rejoin_timeout);
                self.status.report(TransportStatus::Disconnected);
            }
        }
    }
}

#[async_trait]
impl VoiceEventHandler for StatusRelay {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        match ctx {
            EventContext::DriverConnect(_) | EventContext::DriverReconnect(_) => {
                self.status.report(TransportStatus::Ready);
            }
            EventContext::DriverDisconnect(data) => {
                debug!("voice driver disconnect: {:?} ({:?})", data.kind, data.reason);
                let runtime = matches!(data.kind, DisconnectKind::Runtime);
                if self.status.report(TransportStatus::Disconnected) && runtime {
                    tokio::spawn(self.clone().rejoin());
                }
            }
            _ => {}
        }
        None
    }
}

/// Relays track end and error to the player.
#[derive(Clone)]
struct TrackRelay {
    player: PlayerReporter,
}

#[async_trait]
impl VoiceEventHandler for TrackRelay {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            for (state, _handle) in tracks.iter() {
                match &state.playing {
                    PlayMode::Errored(e) => self.player.failed(format!("{:?}", e)),
                    _ => self.player.finished(),
                }
            }
        }
        None
    }
}

fn playback_error(e: impl std::fmt::Display) -> VoiceError {
    VoiceError::PlaybackError(e.to_string())
}

struct SongbirdTrack(TrackHandle);

impl PlayerControl for SongbirdTrack {
    fn pause(&self) -> Result<()> {
        self.0.pause().map_err(playback_error)
    }

    fn resume(&self) -> Result<()> {
        self.0.play().map_err(playback_error)
    }

    fn stop(&self) -> Result<()> {
        self.0.stop().map_err(playback_error)
    }
}

pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    guild: VoiceGuildId,
    join: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn play(
        &self,
        stream: OpusStream,
        volume: Volume,
        player: PlayerReporter,
    ) -> Result<Arc<dyn PlayerControl>> {
        let call = self
            .manager
            .get(self.guild)
            .ok_or_else(|| VoiceError::PlaybackError("not in a voice channel".to_string()))?;

        let input = opus_input(stream);
        let track = call.lock().await.play_only_input(input);
        track.set_volume(volume.gain()).map_err(playback_error)?;
        let relay = TrackRelay { player };
        track
            .add_event(Event::Track(TrackEvent::End), relay.clone())
            .map_err(playback_error)?;
        track
            .add_event(Event::Track(TrackEvent::Error), relay)
            .map_err(playback_error)?;

        Ok(Arc::new(SongbirdTrack(track)))
    }

    async fn destroy(&self) {
        let pending = self.join.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(join) = pending {
            join.abort();
        }
        if let Err(e) = self.manager.remove(self.guild).await {
            debug!("leaving voice in {:?}: {}", self.guild, e);
        }
    }
}
