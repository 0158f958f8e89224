//! Shared fixtures for voicecast integration tests.
//!
//! Builds a small guild with a handful of channels on the in-memory gateway.

#![allow(dead_code)]

use std::sync::Arc;
use voicecast::testing::{FakeDriver, FakeGateway, StaticTranscoder};
use voicecast::{ChannelId, ChannelKind, GuildId, Session, Transcode, UserId, VoiceDelivery};

pub const GUILD: u64 = 900;
pub const OTHER_GUILD: u64 = 901;

pub fn guild(id: u64) -> GuildId {
    GuildId::new(id).unwrap()
}

pub fn channel(id: u64) -> ChannelId {
    ChannelId::new(id).unwrap()
}

pub fn user(id: u64) -> UserId {
    UserId::new(id).unwrap()
}

/// Channels:
/// - 111 "General" (voice), 222 "general" (voice) - duplicate names
/// - 333 "general" (text)
/// - 444 "Stage" (stage)
/// - 555 "Lobby" (voice)
/// - 777 "Elsewhere" (voice, other guild)
///
/// User 42 sits in 555, user 43 is not in voice.
pub fn coven_gateway() -> FakeGateway {
    FakeGateway::new()
        .with_guild(guild(GUILD), "Coven")
        .with_guild(guild(OTHER_GUILD), "Elsewhere")
        .with_channel(guild(GUILD), channel(111), "General", ChannelKind::Voice)
        .with_channel(guild(GUILD), channel(222), "general", ChannelKind::Voice)
        .with_channel(guild(GUILD), channel(333), "general", ChannelKind::Text)
        .with_channel(guild(GUILD), channel(444), "Stage", ChannelKind::StageVoice)
        .with_channel(guild(GUILD), channel(555), "Lobby", ChannelKind::Voice)
        .with_channel(guild(OTHER_GUILD), channel(777), "Elsewhere", ChannelKind::Voice)
        .with_voice_state(guild(GUILD), user(42), channel(555))
}

pub async fn ready_session(gateway: Arc<FakeGateway>) -> Arc<Session> {
    let session = Arc::new(Session::new(gateway));
    session.start(Some("token")).await.unwrap();
    session
}

pub struct Harness {
    pub gateway: Arc<FakeGateway>,
    pub driver: Arc<FakeDriver>,
    pub delivery: VoiceDelivery,
}

pub fn harness_with(driver: FakeDriver, transcoder: Arc<dyn Transcode>) -> Harness {
    let gateway = Arc::new(coven_gateway());
    let driver = Arc::new(driver);
    let session = Arc::new(Session::new(gateway.clone()));
    let delivery = VoiceDelivery::new(
        session,
        driver.clone(),
        transcoder,
        Some("token".to_string()),
    );
    Harness {
        gateway,
        driver,
        delivery,
    }
}

pub fn harness() -> Harness {
    harness_with(FakeDriver::new(), Arc::new(StaticTranscoder::ogg(4096)))
}
