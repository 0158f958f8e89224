//! Voice session controller: join a channel, start playback, tear down.
//!
//! Each invocation walks `Idle → Joining → Connected → Playing → Idle|Error`.
//! `play` returns as soon as playback is issued; a background task owns the
//! rest of the connection's life.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::connection::{GuildSlots, TransportStatus, VoiceConnection, VoiceDriver};
use crate::error::{Result, VoiceError};
use crate::player::{Player, PlayerEvent, PlayerReporter, PlayerStatus, Volume};
use crate::session::Session;
use crate::supervisor::{spawn_supervisor, ReconnectPolicy};
use crate::transcoder::OpusStream;
use crate::types::{ChannelId, GuildId};

/// Phase of a single delivery invocation, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Joining,
    Connected,
    Playing,
    Error,
    Destroyed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Joining => "joining",
            Phase::Connected => "connected",
            Phase::Playing => "playing",
            Phase::Error => "error",
            Phase::Destroyed => "destroyed",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a playback ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Finished,
    Failed(String),
    /// The connection was destroyed under the player.
    Interrupted,
}

/// Returned by [`VoiceController::play`]. Dropping it does not stop playback.
pub struct PlaybackHandle {
    guild: GuildId,
    channel: ChannelId,
    status: watch::Receiver<PlayerStatus>,
    task: JoinHandle<PlaybackOutcome>,
}

impl PlaybackHandle {
    pub fn guild(&self) -> GuildId {
        self.guild
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn status(&self) -> PlayerStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerStatus> {
        self.status.clone()
    }

    /// Wait for the playback task to finish.
    pub async fn finished(self) -> PlaybackOutcome {
        self.task
            .await
            .unwrap_or_else(|e| PlaybackOutcome::Failed(format!("playback task panicked: {}", e)))
    }
}

pub struct VoiceController {
    session: Arc<Session>,
    driver: Arc<dyn VoiceDriver>,
    slots: GuildSlots,
    join_timeout: Duration,
    policy: ReconnectPolicy,
}

impl VoiceController {
    pub fn new(session: Arc<Session>, driver: Arc<dyn VoiceDriver>) -> Self {
        Self {
            session,
            driver,
            slots: GuildSlots::new(),
            join_timeout: Duration::from_secs(30),
            policy: ReconnectPolicy::default(),
        }
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn slots(&self) -> &GuildSlots {
        &self.slots
    }

    /// Join `channel` and wait until its transport is ready.
    pub async fn join(&self, channel: ChannelId) -> Result<Arc<VoiceConnection>> {
        self.session.ensure_ready()?;

        let info = tokio::time::timeout(
            self.join_timeout,
            self.session.gateway().fetch_channel(channel),
        )
        .await
        .map_err(|_| VoiceError::JoinTimeout(self.join_timeout))??
        .filter(|c| c.kind.is_voice_capable())
        .ok_or_else(|| VoiceError::ChannelNotFound(channel.to_string()))?;

        let guild = info.guild;
        let slot = self
            .slots
            .claim(guild)
            .ok_or(VoiceError::GuildBusy(guild))?;

        debug!(phase = %Phase::Joining, "joining {} ({}) in guild {}", info.name, channel, guild);
        let connection = VoiceConnection::new(guild, channel, Some(slot));

        match tokio::time::timeout(self.join_timeout, self.connect(&connection)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(phase = %Phase::Error, "join of {} failed: {}", channel, e);
                connection.destroy().await;
                return Err(e);
            }
            Err(_) => {
                error!(phase = %Phase::Error, "join of {} timed out", channel);
                connection.destroy().await;
                return Err(VoiceError::JoinTimeout(self.join_timeout));
            }
        }

        info!("🔊 Joined voice channel {} ({}) in guild {}", info.name, channel, guild);
        debug!(phase = %Phase::Connected, "supervising {}", channel);
        spawn_supervisor(Arc::clone(&connection), self.policy.clone());
        Ok(connection)
    }

    async fn connect(&self, connection: &Arc<VoiceConnection>) -> Result<()> {
        let transport = self
            .driver
            .connect(connection.guild(), connection.channel(), connection.reporter())
            .await?;
        connection.attach(transport);

        let mut status = connection.subscribe();
        let reached = status
            .wait_for(|s| {
                matches!(
                    s,
                    TransportStatus::Ready | TransportStatus::Disconnected | TransportStatus::Destroyed
                )
            })
            .await
            .map(|s| *s)
            .map_err(|_| VoiceError::JoinError("transport status closed".to_string()))?;

        match reached {
            TransportStatus::Ready => Ok(()),
            TransportStatus::Destroyed => Err(VoiceError::JoinError(
                "connection destroyed while joining".to_string(),
            )),
            _ => Err(VoiceError::JoinError(
                connection
                    .failure()
                    .unwrap_or_else(|| "transport disconnected while joining".to_string()),
            )),
        }
    }

    /// Start playing `stream` on `connection` without waiting for it to end.
    ///
    /// When the player goes idle or errors the connection is destroyed.
    pub async fn play(
        &self,
        connection: &Arc<VoiceConnection>,
        stream: OpusStream,
    ) -> Result<PlaybackHandle> {
        if connection.is_destroyed() {
            return Err(VoiceError::PlaybackError("connection already destroyed".to_string()));
        }
        let transport = connection
            .transport()
            .ok_or_else(|| VoiceError::PlaybackError("no transport attached".to_string()))?;

        let volume = Volume::default();
        let (reporter, events) = PlayerReporter::channel();
        let control = match transport.play(stream, volume, reporter.clone()).await {
            Ok(control) => control,
            Err(e) => {
                error!(phase = %Phase::Error, "could not start playback: {}", e);
                connection.destroy().await;
                return Err(e);
            }
        };

        let player = Arc::new(Player::new(reporter, control, volume));
        if connection.status() != TransportStatus::Ready {
            player.auto_pause();
        }

        info!(phase = %Phase::Playing, "▶️  Playing in {} (guild {})", connection.channel(), connection.guild());
        let status = player.subscribe();
        // Subscribe before spawning so reports made in between are not lost.
        let transport_status = connection.subscribe();
        let task = tokio::spawn(complete_playback(
            Arc::clone(connection),
            player,
            events,
            transport_status,
        ));

        Ok(PlaybackHandle {
            guild: connection.guild(),
            channel: connection.channel(),
            status,
            task,
        })
    }
}

async fn complete_playback(
    connection: Arc<VoiceConnection>,
    player: Arc<Player>,
    mut events: mpsc::UnboundedReceiver<PlayerEvent>,
    mut transport: watch::Receiver<TransportStatus>,
) -> PlaybackOutcome {
    let outcome = loop {
        let status = *transport.borrow_and_update();
        match status {
            TransportStatus::Destroyed => break PlaybackOutcome::Interrupted,
            TransportStatus::Ready => player.auto_resume(),
            _ => player.auto_pause(),
        }

        tokio::select! {
            event = events.recv() => match event {
                Some(PlayerEvent::Idle) => break PlaybackOutcome::Finished,
                Some(PlayerEvent::Error(message)) => {
                    error!(phase = %Phase::Error, "player error in guild {}: {}", connection.guild(), message);
                    break PlaybackOutcome::Failed(message);
                }
                None => break PlaybackOutcome::Failed("player went away".to_string()),
            },
            changed = transport.changed() => {
                if changed.is_err() {
                    break PlaybackOutcome::Interrupted;
                }
            }
        }
    };

    if outcome == PlaybackOutcome::Interrupted {
        player.stop();
    }
    connection.destroy().await;
    debug!(phase = %Phase::Destroyed, "playback in {} ended: {:?}", connection.channel(), outcome);
    outcome
}
