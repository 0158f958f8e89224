//! Voice connection state, the voice-driver seam, and per-guild single flight.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::Result;
use crate::player::{PlayerControl, PlayerReporter, Volume};
use crate::transcoder::OpusStream;
use crate::types::{ChannelId, GuildId};

/// Status of the underlying voice transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    /// Negotiating with the control channel.
    Signalling,
    /// Media connection in progress.
    Connecting,
    Ready,
    Disconnected,
    /// Absorbing; nothing changes after this.
    Destroyed,
}

impl TransportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportStatus::Signalling => "signalling",
            TransportStatus::Connecting => "connecting",
            TransportStatus::Ready => "ready",
            TransportStatus::Disconnected => "disconnected",
            TransportStatus::Destroyed => "destroyed",
        }
    }
}

impl std::fmt::Display for TransportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Write side of a connection's status, handed to the voice driver.
#[derive(Clone)]
pub struct StatusReporter {
    status: Arc<watch::Sender<TransportStatus>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl StatusReporter {
    /// Publish a transport status. Ignored once the connection is destroyed;
    /// `Destroyed` itself is reserved for [`VoiceConnection::destroy`].
    pub fn report(&self, next: TransportStatus) -> bool {
        if next == TransportStatus::Destroyed {
            return false;
        }
        self.status.send_if_modified(|current| {
            if *current == TransportStatus::Destroyed || *current == next {
                return false;
            }
            debug!("transport {} -> {}", current, next);
            *current = next;
            true
        })
    }

    /// Report a failed (re)join with a reason, leaving the transport disconnected.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.into());
        self.report(TransportStatus::Disconnected)
    }

    pub fn current(&self) -> TransportStatus {
        *self.status.borrow()
    }
}

/// A live voice transport for one guild, produced by a [`VoiceDriver`].
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Start playing `stream`. Returns once playback was issued; terminal
    /// player events arrive through `player`.
    async fn play(
        &self,
        stream: OpusStream,
        volume: Volume,
        player: PlayerReporter,
    ) -> Result<Arc<dyn PlayerControl>>;

    /// Leave the channel and release transport resources.
    async fn destroy(&self);
}

/// Opens voice transports.
#[async_trait]
pub trait VoiceDriver: Send + Sync {
    /// Begin connecting to `channel`. Returns as soon as a transport handle
    /// exists; progress is reported through `status` until it reaches
    /// `Ready`, or `Disconnected` via [`StatusReporter::fail`].
    async fn connect(
        &self,
        guild: GuildId,
        channel: ChannelId,
        status: StatusReporter,
    ) -> Result<Arc<dyn VoiceTransport>>;
}

/// Guilds with a live voice connection.
#[derive(Clone, Default)]
pub struct GuildSlots {
    held: Arc<Mutex<HashSet<GuildId>>>,
}

impl GuildSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `guild`; `None` if another connection holds it.
    pub fn claim(&self, guild: GuildId) -> Option<GuildSlot> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.insert(guild).then(|| GuildSlot {
            guild,
            held: Arc::clone(&self.held),
        })
    }

    pub fn is_held(&self, guild: GuildId) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&guild)
    }
}

/// Released on drop.
pub struct GuildSlot {
    guild: GuildId,
    held: Arc<Mutex<HashSet<GuildId>>>,
}

impl Drop for GuildSlot {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.guild);
    }
}

/// One voice connection, owned by the invocation that joined it.
pub struct VoiceConnection {
    guild: GuildId,
    channel: ChannelId,
    reporter: StatusReporter,
    transport: OnceLock<Arc<dyn VoiceTransport>>,
    destroyed: AtomicBool,
    slot: Mutex<Option<GuildSlot>>,
}

impl VoiceConnection {
    pub fn new(guild: GuildId, channel: ChannelId, slot: Option<GuildSlot>) -> Arc<Self> {
        let (status, _) = watch::channel(TransportStatus::Signalling);
        Arc::new(Self {
            guild,
            channel,
            reporter: StatusReporter {
                status: Arc::new(status),
                failure: Arc::new(Mutex::new(None)),
            },
            transport: OnceLock::new(),
            destroyed: AtomicBool::new(false),
            slot: Mutex::new(slot),
        })
    }

    pub fn guild(&self) -> GuildId {
        self.guild
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn status(&self) -> TransportStatus {
        self.reporter.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<TransportStatus> {
        self.reporter.status.subscribe()
    }

    pub fn reporter(&self) -> StatusReporter {
        self.reporter.clone()
    }

    /// Last failure reported by the driver, if any.
    pub fn failure(&self) -> Option<String> {
        self.reporter
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Attach the transport once the driver produced it. Returns false if a
    /// transport is already attached.
    pub fn attach(&self, transport: Arc<dyn VoiceTransport>) -> bool {
        self.transport.set(transport).is_ok()
    }

    pub fn transport(&self) -> Option<Arc<dyn VoiceTransport>> {
        self.transport.get().cloned()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Tear the connection down. Only the first call does anything and
    /// returns true; later calls are no-ops.
    pub async fn destroy(&self) -> bool {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.reporter.status.send_replace(TransportStatus::Destroyed);
        if let Some(transport) = self.transport.get() {
            transport.destroy().await;
        }
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        info!("🔇 Voice connection to {} in guild {} destroyed", self.channel, self.guild);
        true
    }

    /// Resolves once the connection is destroyed.
    pub async fn destroyed(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|s| *s == TransportStatus::Destroyed).await;
    }
}
