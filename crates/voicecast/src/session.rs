//! Gateway session manager.
//!
//! One [`Session`] per process. Readiness lives in a `watch` channel that only
//! the listener task writes to; `start` callers wait on it with a timeout.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::error::{Result, VoiceError};
use crate::gateway::{Gateway, GatewayEvent};
use crate::types::{GuildId, GuildInfo};

/// Gateway readiness.
///
/// `Disconnected` means no client is running, `Connecting` means a client is
/// running but has not (re)established its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Ready,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Ready => "ready",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Point-in-time view of the session, safe to hand to HTTP callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub ready: bool,
    pub identity: Option<String>,
    pub guild_count: usize,
    pub last_error: Option<String>,
}

struct Shared {
    state: watch::Sender<SessionState>,
    identity: Mutex<Option<String>>,
    last_error: Mutex<Option<String>>,
    /// Bumped per login so a stale listener cannot clobber a newer client.
    generation: AtomicU64,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    fn set_state(&self, next: SessionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            debug!("session {} -> {}", current, next);
            *current = next;
            true
        });
    }

    fn record_error(&self, message: String) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(message);
    }
}

/// Process-wide gateway session.
pub struct Session {
    gateway: Arc<dyn Gateway>,
    shared: Arc<Shared>,
    login: tokio::sync::Mutex<()>,
    connect_timeout: Duration,
}

impl Session {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            gateway,
            shared: Arc::new(Shared {
                state,
                identity: Mutex::new(None),
                last_error: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
            login: tokio::sync::Mutex::new(()),
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn gateway(&self) -> &Arc<dyn Gateway> {
        &self.gateway
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Watch readiness transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Start the session if needed and wait until it is ready.
    ///
    /// Idempotent: a ready session returns immediately, and concurrent
    /// callers share one login.
    pub async fn start(&self, credential: Option<&str>) -> Result<SessionStatus> {
        let credential = credential
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(VoiceError::MissingCredential)?;

        if self.is_ready() {
            return Ok(self.status());
        }

        {
            let _guard = self.login.lock().await;
            if self.state() == SessionState::Disconnected {
                self.login(credential).await?;
            }
        }

        let mut rx = self.shared.state.subscribe();
        let settled = tokio::time::timeout(self.connect_timeout, async {
            rx.wait_for(|s| *s != SessionState::Connecting)
                .await
                .map(|state| *state)
        })
        .await;

        match settled {
            Ok(Ok(SessionState::Ready)) => Ok(self.status()),
            Ok(_) => Err(VoiceError::ConnectError(
                self.last_error()
                    .unwrap_or_else(|| "gateway client stopped".to_string()),
            )),
            Err(_) => {
                warn!("gateway not ready after {:?}", self.connect_timeout);
                Err(VoiceError::ConnectTimeout(self.connect_timeout))
            }
        }
    }

    async fn login(&self, credential: &str) -> Result<()> {
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let (tx, rx) = mpsc::unbounded_channel();

        self.shared.set_state(SessionState::Connecting);
        info!("🔌 Logging in to Discord gateway");

        if let Err(e) = self.gateway.login(credential, tx).await {
            error!("gateway login failed: {}", e);
            self.shared.record_error(e.to_string());
            self.shared.set_state(SessionState::Disconnected);
            return Err(e);
        }

        tokio::spawn(listen(Arc::clone(&self.shared), rx, generation));
        Ok(())
    }

    /// Non-blocking snapshot.
    pub fn status(&self) -> SessionStatus {
        let state = self.state();
        let ready = state == SessionState::Ready;
        SessionStatus {
            state,
            ready,
            identity: self
                .shared
                .identity
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            guild_count: if ready { self.gateway.guild_count() } else { 0 },
            last_error: self.last_error(),
        }
    }

    fn last_error(&self) -> Option<String> {
        self.shared
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(VoiceError::NotReady)
        }
    }

    pub fn resolve_guild(&self, guild: GuildId) -> Result<GuildInfo> {
        self.ensure_ready()?;
        self.gateway
            .guild(guild)
            .ok_or(VoiceError::GuildNotFound(guild))
    }
}

async fn listen(
    shared: Arc<Shared>,
    mut events: mpsc::UnboundedReceiver<GatewayEvent>,
    generation: u64,
) {
    while let Some(event) = events.recv().await {
        if !shared.is_current(generation) {
            debug!("dropping event from superseded gateway client");
            return;
        }

        match event {
            GatewayEvent::Ready { identity } => {
                info!("✅ Gateway ready as {}", identity);
                *shared.identity.lock().unwrap_or_else(PoisonError::into_inner) = Some(identity);
                shared.set_state(SessionState::Ready);
            }
            GatewayEvent::Resumed => {
                info!("Gateway session resumed");
                shared.set_state(SessionState::Ready);
            }
            GatewayEvent::Disconnected => {
                warn!("⚠️  Gateway disconnected, client is reconnecting");
                shared.set_state(SessionState::Connecting);
            }
            GatewayEvent::Error(message) => {
                error!("gateway error: {}", message);
                shared.record_error(message);
            }
            GatewayEvent::Terminated(reason) => {
                warn!("Gateway client stopped: {}", reason);
                shared.record_error(reason);
                shared.set_state(SessionState::Disconnected);
                return;
            }
        }
    }

    if shared.is_current(generation) {
        warn!("Gateway event stream closed");
        shared.set_state(SessionState::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeGateway, LoginBehavior};

    fn gid(id: u64) -> GuildId {
        GuildId::new(id).unwrap()
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let session = Session::new(Arc::new(FakeGateway::new()));
        assert_eq!(
            session.start(None).await.unwrap_err(),
            VoiceError::MissingCredential
        );
        assert_eq!(
            session.start(Some("   ")).await.unwrap_err(),
            VoiceError::MissingCredential
        );
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let gateway = Arc::new(FakeGateway::new().with_guild(gid(1), "Coven"));
        let session = Session::new(gateway.clone());

        let status = session.start(Some("token")).await.unwrap();
        assert!(status.ready);
        assert_eq!(status.guild_count, 1);

        session.start(Some("token")).await.unwrap();
        assert_eq!(gateway.login_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_starts_share_login() {
        let gateway = Arc::new(FakeGateway::new());
        let session = Arc::new(Session::new(gateway.clone()));

        let (a, b) = tokio::join!(session.start(Some("t")), session.start(Some("t")));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(gateway.login_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let gateway = Arc::new(FakeGateway::new().with_login(LoginBehavior::Silent));
        let session = Session::new(gateway).with_connect_timeout(Duration::from_secs(10));

        let err = session.start(Some("token")).await.unwrap_err();
        assert_eq!(err, VoiceError::ConnectTimeout(Duration::from_secs(10)));
        assert_eq!(session.state(), SessionState::Connecting);
    }

    #[tokio::test]
    async fn test_login_failure() {
        let gateway = Arc::new(FakeGateway::new().with_login(LoginBehavior::Fail("bad token".into())));
        let session = Session::new(gateway);

        let err = session.start(Some("token")).await.unwrap_err();
        assert_eq!(err.kind(), "connect_error");
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.status().last_error.as_deref(), Some("gateway connection failed: bad token"));
    }

    #[tokio::test]
    async fn test_terminated_allows_relogin() {
        let gateway = Arc::new(FakeGateway::new());
        let session = Session::new(gateway.clone());
        session.start(Some("token")).await.unwrap();

        let mut rx = session.subscribe();
        gateway.emit(GatewayEvent::Terminated("shard died".into()));
        rx.wait_for(|s| *s == SessionState::Disconnected).await.unwrap();

        session.start(Some("token")).await.unwrap();
        assert_eq!(gateway.login_count(), 2);
    }

    #[tokio::test]
    async fn test_disconnect_then_resume() {
        let gateway = Arc::new(FakeGateway::new());
        let session = Session::new(gateway.clone());
        session.start(Some("token")).await.unwrap();

        let mut rx = session.subscribe();
        gateway.emit(GatewayEvent::Disconnected);
        rx.wait_for(|s| *s == SessionState::Connecting).await.unwrap();
        assert_eq!(session.ensure_ready(), Err(VoiceError::NotReady));

        gateway.emit(GatewayEvent::Resumed);
        rx.wait_for(|s| *s == SessionState::Ready).await.unwrap();
        assert!(session.is_ready());
    }

    #[tokio::test]
    async fn test_resolve_guild() {
        let gateway = Arc::new(FakeGateway::new().with_guild(gid(7), "Coven"));
        let session = Session::new(gateway);

        assert_eq!(session.resolve_guild(gid(7)).unwrap_err(), VoiceError::NotReady);

        session.start(Some("token")).await.unwrap();
        assert_eq!(session.resolve_guild(gid(7)).unwrap().name, "Coven");
        assert_eq!(
            session.resolve_guild(gid(8)).unwrap_err(),
            VoiceError::GuildNotFound(gid(8))
        );
    }
}
