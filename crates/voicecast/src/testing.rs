//! In-memory gateway, voice driver and transcoders.
//!
//! Compiled for this crate's tests and behind the `testing` feature, which
//! the HTTP server enables from its dev-dependencies.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use crate::connection::{StatusReporter, TransportStatus, VoiceDriver, VoiceTransport};
use crate::error::{Result, VoiceError};
use crate::gateway::{Gateway, GatewayEvent};
use crate::player::{PlayerControl, PlayerReporter, Volume};
use crate::transcoder::{OpusStream, Transcode};
use crate::types::{ChannelId, ChannelInfo, ChannelKind, GuildId, GuildInfo, UserId};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What [`FakeGateway::login`] does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginBehavior {
    /// Emit `Ready` right away.
    Ready,
    /// Accept the login but never become ready.
    Silent,
    /// Reject the login.
    Fail(String),
}

#[derive(Default)]
struct GatewayState {
    guilds: BTreeMap<GuildId, String>,
    channels: BTreeMap<ChannelId, ChannelInfo>,
    voice_states: HashMap<(GuildId, UserId), ChannelId>,
    events: Option<mpsc::UnboundedSender<GatewayEvent>>,
    logins: usize,
    directory_reads: usize,
}

/// Gateway whose directory is whatever the test put in it.
pub struct FakeGateway {
    state: Mutex<GatewayState>,
    login: Mutex<LoginBehavior>,
    identity: String,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GatewayState::default()),
            login: Mutex::new(LoginBehavior::Ready),
            identity: "Sortilege#0001".to_string(),
        }
    }

    pub fn with_login(self, behavior: LoginBehavior) -> Self {
        *lock(&self.login) = behavior;
        self
    }

    pub fn with_guild(self, guild: GuildId, name: &str) -> Self {
        lock(&self.state).guilds.insert(guild, name.to_string());
        self
    }

    pub fn with_channel(self, guild: GuildId, id: ChannelId, name: &str, kind: ChannelKind) -> Self {
        lock(&self.state).channels.insert(
            id,
            ChannelInfo {
                id,
                guild,
                name: name.to_string(),
                kind,
            },
        );
        self
    }

    pub fn with_voice_state(self, guild: GuildId, user: UserId, channel: ChannelId) -> Self {
        lock(&self.state).voice_states.insert((guild, user), channel);
        self
    }

    pub fn set_login(&self, behavior: LoginBehavior) {
        *lock(&self.login) = behavior;
    }

    /// Push an event to the most recent login's listener.
    pub fn emit(&self, event: GatewayEvent) -> bool {
        lock(&self.state)
            .events
            .as_ref()
            .is_some_and(|tx| tx.send(event).is_ok())
    }

    pub fn login_count(&self) -> usize {
        lock(&self.state).logins
    }

    /// Calls to `guild_channels` and `member_voice_channel`.
    pub fn directory_reads(&self) -> usize {
        lock(&self.state).directory_reads
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn login(&self, _credential: &str, events: mpsc::UnboundedSender<GatewayEvent>) -> Result<()> {
        let behavior = lock(&self.login).clone();
        let mut state = lock(&self.state);
        state.logins += 1;

        match behavior {
            LoginBehavior::Fail(reason) => return Err(VoiceError::ConnectError(reason)),
            LoginBehavior::Ready => {
                let _ = events.send(GatewayEvent::Ready {
                    identity: self.identity.clone(),
                });
            }
            LoginBehavior::Silent => {}
        }
        state.events = Some(events);
        Ok(())
    }

    fn guild_count(&self) -> usize {
        lock(&self.state).guilds.len()
    }

    fn guild(&self, guild: GuildId) -> Option<GuildInfo> {
        lock(&self.state).guilds.get(&guild).map(|name| GuildInfo {
            id: guild,
            name: name.clone(),
        })
    }

    async fn fetch_channel(&self, channel: ChannelId) -> Result<Option<ChannelInfo>> {
        Ok(lock(&self.state).channels.get(&channel).cloned())
    }

    async fn guild_channels(&self, guild: GuildId) -> Result<Vec<ChannelInfo>> {
        let mut state = lock(&self.state);
        state.directory_reads += 1;
        // Reverse id order so callers cannot rely on the fake's ordering.
        Ok(state
            .channels
            .values()
            .rev()
            .filter(|c| c.guild == guild)
            .cloned()
            .collect())
    }

    async fn member_voice_channel(&self, guild: GuildId, user: UserId) -> Result<Option<ChannelId>> {
        let mut state = lock(&self.state);
        state.directory_reads += 1;
        Ok(state.voice_states.get(&(guild, user)).copied())
    }
}

/// What [`FakeDriver::connect`] does with the new transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectBehavior {
    /// Signalling, then ready.
    Ready,
    /// Stay in signalling forever.
    Hang,
    /// Report a join failure.
    Fail(String),
}

/// Voice driver handing out [`FakeTransport`]s.
pub struct FakeDriver {
    behavior: Mutex<ConnectBehavior>,
    transports: Mutex<Vec<Arc<FakeTransport>>>,
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            behavior: Mutex::new(ConnectBehavior::Ready),
            transports: Mutex::new(Vec::new()),
        }
    }

    pub fn with_behavior(self, behavior: ConnectBehavior) -> Self {
        *lock(&self.behavior) = behavior;
        self
    }

    pub fn transports(&self) -> Vec<Arc<FakeTransport>> {
        lock(&self.transports).clone()
    }

    pub fn last_transport(&self) -> Option<Arc<FakeTransport>> {
        lock(&self.transports).last().cloned()
    }

    pub fn connect_count(&self) -> usize {
        lock(&self.transports).len()
    }
}

#[async_trait]
impl VoiceDriver for FakeDriver {
    async fn connect(
        &self,
        guild: GuildId,
        channel: ChannelId,
        status: StatusReporter,
    ) -> Result<Arc<dyn VoiceTransport>> {
        let behavior = lock(&self.behavior).clone();
        let transport = Arc::new(FakeTransport {
            guild,
            channel,
            status: status.clone(),
            player: Mutex::new(None),
            track: Arc::new(FakeTrack::default()),
            destroy_calls: AtomicUsize::new(0),
            played_bytes: Arc::new(AtomicUsize::new(0)),
        });
        lock(&self.transports).push(Arc::clone(&transport));

        status.report(TransportStatus::Signalling);
        match behavior {
            ConnectBehavior::Ready => {
                status.report(TransportStatus::Connecting);
                status.report(TransportStatus::Ready);
            }
            ConnectBehavior::Hang => {}
            ConnectBehavior::Fail(reason) => {
                status.fail(reason);
            }
        }
        Ok(transport)
    }
}

/// Pause/resume/stop counters for a fake track.
#[derive(Default)]
pub struct FakeTrack {
    pub paused: AtomicBool,
    pub pauses: AtomicUsize,
    pub resumes: AtomicUsize,
    pub stops: AtomicUsize,
}

impl PlayerControl for FakeTrack {
    fn pause(&self) -> Result<()> {
        self.paused.store(true, Ordering::SeqCst);
        self.pauses.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        self.paused.store(false, Ordering::SeqCst);
        self.resumes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Transport that plays into a byte counter; tests decide when playback ends.
pub struct FakeTransport {
    pub guild: GuildId,
    pub channel: ChannelId,
    status: StatusReporter,
    player: Mutex<Option<PlayerReporter>>,
    track: Arc<FakeTrack>,
    destroy_calls: AtomicUsize,
    played_bytes: Arc<AtomicUsize>,
}

impl FakeTransport {
    /// Publish a transport status as the real driver would.
    pub fn report(&self, status: TransportStatus) -> bool {
        self.status.report(status)
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.player).is_some()
    }

    /// End playback normally.
    pub fn finish_playback(&self) -> bool {
        lock(&self.player).as_ref().map(PlayerReporter::finished).is_some()
    }

    /// End playback with an error.
    pub fn fail_playback(&self, message: &str) -> bool {
        lock(&self.player)
            .as_ref()
            .map(|p| p.failed(message))
            .is_some()
    }

    pub fn track(&self) -> &FakeTrack {
        &self.track
    }

    pub fn destroy_calls(&self) -> usize {
        self.destroy_calls.load(Ordering::SeqCst)
    }

    pub fn played_bytes(&self) -> usize {
        self.played_bytes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn play(
        &self,
        mut stream: OpusStream,
        _volume: Volume,
        player: PlayerReporter,
    ) -> Result<Arc<dyn PlayerControl>> {
        *lock(&self.player) = Some(player.clone());

        let played = Arc::clone(&self.played_bytes);
        tokio::spawn(async move {
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        played.fetch_add(bytes.len(), Ordering::SeqCst);
                    }
                    Err(e) => {
                        player.failed(e.to_string());
                        return;
                    }
                }
            }
        });

        Ok(self.track.clone())
    }

    async fn destroy(&self) {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Transcoder that ignores its input and yields fixed chunks.
pub struct StaticTranscoder {
    chunks: Vec<Bytes>,
    calls: AtomicUsize,
}

impl StaticTranscoder {
    pub fn new(chunks: Vec<Bytes>) -> Self {
        Self {
            chunks,
            calls: AtomicUsize::new(0),
        }
    }

    /// An Ogg page header followed by `len` bytes of payload.
    pub fn ogg(len: usize) -> Self {
        Self::new(vec![Bytes::from_static(b"OggS"), Bytes::from(vec![0u8; len])])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcode for StaticTranscoder {
    async fn transcode(&self, _input: Bytes) -> Result<OpusStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let chunks: Vec<io::Result<Bytes>> = self.chunks.iter().cloned().map(Ok).collect();
        Ok(OpusStream::new(stream::iter(chunks)))
    }
}

/// Transcoder that always rejects its input.
pub struct FailingTranscoder {
    message: String,
}

impl FailingTranscoder {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl Transcode for FailingTranscoder {
    async fn transcode(&self, _input: Bytes) -> Result<OpusStream> {
        Err(VoiceError::TranscodeError(self.message.clone()))
    }
}
