//! Audio player attached to a voice connection.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    Idle,
    Playing,
    Paused,
    /// Paused by us because the transport is not ready.
    AutoPaused,
}

impl PlayerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerStatus::Idle => "idle",
            PlayerStatus::Playing => "playing",
            PlayerStatus::Paused => "paused",
            PlayerStatus::AutoPaused => "autopaused",
        }
    }
}

impl std::fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal player events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    Idle,
    Error(String),
}

/// Linear gain, 1.0 is unity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Volume(f32);

impl Volume {
    pub fn new(gain: f32) -> Self {
        Self(gain.max(0.0))
    }

    pub fn gain(self) -> f32 {
        self.0
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self(1.0)
    }
}

/// Transport-side controls for a playing track.
pub trait PlayerControl: Send + Sync {
    fn pause(&self) -> Result<()>;
    fn resume(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
}

/// Handed to the transport so it can report how playback ends.
#[derive(Clone)]
pub struct PlayerReporter {
    status: Arc<watch::Sender<PlayerStatus>>,
    events: mpsc::UnboundedSender<PlayerEvent>,
}

impl PlayerReporter {
    /// Create a reporter plus the receiving end of its terminal events.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PlayerEvent>) {
        let (status, _) = watch::channel(PlayerStatus::Idle);
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                status: Arc::new(status),
                events,
            },
            rx,
        )
    }

    pub fn status(&self) -> PlayerStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerStatus> {
        self.status.subscribe()
    }

    fn set(&self, status: PlayerStatus) {
        self.status.send_replace(status);
    }

    /// Playback reached the end of the stream.
    pub fn finished(&self) {
        self.set(PlayerStatus::Idle);
        let _ = self.events.send(PlayerEvent::Idle);
    }

    /// Playback stopped on an error.
    pub fn failed(&self, message: impl Into<String>) {
        self.set(PlayerStatus::Idle);
        let _ = self.events.send(PlayerEvent::Error(message.into()));
    }
}

/// A player bound to a transport track.
pub struct Player {
    reporter: PlayerReporter,
    control: Arc<dyn PlayerControl>,
    volume: Volume,
}

impl Player {
    pub fn new(reporter: PlayerReporter, control: Arc<dyn PlayerControl>, volume: Volume) -> Self {
        reporter.set(PlayerStatus::Playing);
        Self {
            reporter,
            control,
            volume,
        }
    }

    pub fn status(&self) -> PlayerStatus {
        self.reporter.status()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerStatus> {
        self.reporter.subscribe()
    }

    pub fn volume(&self) -> Volume {
        self.volume
    }

    /// Transport went away while playing.
    pub fn auto_pause(&self) {
        if self.status() != PlayerStatus::Playing {
            return;
        }
        match self.control.pause() {
            Ok(()) => {
                debug!("player auto-paused");
                self.reporter.set(PlayerStatus::AutoPaused);
            }
            Err(e) => warn!("auto-pause failed: {}", e),
        }
    }

    /// Transport is back; undo an auto-pause.
    pub fn auto_resume(&self) {
        if self.status() != PlayerStatus::AutoPaused {
            return;
        }
        match self.control.resume() {
            Ok(()) => {
                debug!("player resumed");
                self.reporter.set(PlayerStatus::Playing);
            }
            Err(e) => warn!("resume failed: {}", e),
        }
    }

    pub fn stop(&self) {
        if let Err(e) = self.control.stop() {
            debug!("stop on finished track: {}", e);
        }
        self.reporter.set(PlayerStatus::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingControl {
        pauses: AtomicUsize,
        resumes: AtomicUsize,
    }

    impl PlayerControl for CountingControl {
        fn pause(&self) -> Result<()> {
            self.pauses.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn resume(&self) -> Result<()> {
            self.resumes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_default_volume_is_unity() {
        assert_eq!(Volume::default().gain(), 1.0);
        assert_eq!(Volume::new(-2.0).gain(), 0.0);
    }

    #[test]
    fn test_auto_pause_round_trip() {
        let (reporter, _events) = PlayerReporter::channel();
        let control = Arc::new(CountingControl::default());
        let player = Player::new(reporter, control.clone(), Volume::default());
        assert_eq!(player.status(), PlayerStatus::Playing);

        player.auto_pause();
        player.auto_pause();
        assert_eq!(player.status(), PlayerStatus::AutoPaused);
        assert_eq!(control.pauses.load(Ordering::SeqCst), 1);

        player.auto_resume();
        assert_eq!(player.status(), PlayerStatus::Playing);
        assert_eq!(control.resumes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_resume_only_after_auto_pause() {
        let (reporter, _events) = PlayerReporter::channel();
        let control = Arc::new(CountingControl::default());
        let player = Player::new(reporter, control.clone(), Volume::default());

        player.auto_resume();
        assert_eq!(control.resumes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reporter_events() {
        let (reporter, mut events) = PlayerReporter::channel();
        reporter.failed("decoder blew up");
        assert_eq!(reporter.status(), PlayerStatus::Idle);
        assert_eq!(
            events.recv().await,
            Some(PlayerEvent::Error("decoder blew up".into()))
        );
    }
}
