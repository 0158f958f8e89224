//! End-to-end delivery through the in-memory gateway, driver and transcoder.

mod common;

use common::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use voicecast::testing::{ConnectBehavior, FailingTranscoder, FakeDriver, StaticTranscoder};
use voicecast::{
    PlaybackOutcome, PlaybackRequest, PlayerStatus, Session, TargetDescriptor, TransportStatus,
    VoiceDelivery, VoiceError,
};

fn clip() -> PlaybackRequest {
    PlaybackRequest::new(vec![0u8; 1024], "sortilege.mp3")
}

fn custom(input: &str) -> TargetDescriptor {
    TargetDescriptor::Custom {
        raw_input: input.to_string(),
    }
}

#[tokio::test]
async fn test_current_mode_without_voice_state_fails_before_join() {
    let h = harness();
    let err = h
        .delivery
        .play_in_guild(guild(GUILD), TargetDescriptor::Current { user_id: user(43) }, clip())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        VoiceError::UserNotInVoice {
            guild: guild(GUILD),
            user: user(43)
        }
    );
    assert_eq!(h.driver.connect_count(), 0);
}

#[tokio::test]
async fn test_current_mode_joins_users_channel() {
    let h = harness();
    let receipt = h
        .delivery
        .play_in_guild(guild(GUILD), TargetDescriptor::Current { user_id: user(42) }, clip())
        .await
        .unwrap();
    assert_eq!(receipt.channel.get(), 555);
    assert_eq!(receipt.guild.get(), GUILD);
}

#[tokio::test]
async fn test_play_returns_before_playback_ends() {
    // ~60s of 128 kbit/s Opus
    let transcoder = Arc::new(StaticTranscoder::ogg(60 * 16 * 1024));
    let h = harness_with(FakeDriver::new(), transcoder);

    let started = Instant::now();
    let receipt = h
        .delivery
        .play_in_guild(guild(GUILD), custom("<#555>"), clip())
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(receipt.channel.get(), 555);

    let transport = h.driver.last_transport().unwrap();
    assert!(transport.is_playing());
    assert_eq!(transport.destroy_calls(), 0);
}

#[tokio::test]
async fn test_idle_destroys_exactly_once() {
    let h = harness();
    let handle = h
        .delivery
        .play_with_handle(guild(GUILD), custom("general"), clip())
        .await
        .unwrap();
    assert_eq!(handle.channel().get(), 111);
    assert_eq!(handle.status(), PlayerStatus::Playing);

    let transport = h.driver.last_transport().unwrap();
    assert!(transport.finish_playback());
    assert_eq!(handle.finished().await, PlaybackOutcome::Finished);

    assert_eq!(transport.destroy_calls(), 1);
    assert!(!h.delivery.controller().slots().is_held(guild(GUILD)));

    // Late transport noise after destroy changes nothing.
    assert!(!transport.report(TransportStatus::Ready));
    assert_eq!(transport.destroy_calls(), 1);
}

#[tokio::test]
async fn test_guild_is_single_flight() {
    let h = harness();
    h.delivery
        .play_in_guild(guild(GUILD), custom("Lobby"), clip())
        .await
        .unwrap();

    let err = h
        .delivery
        .play_in_guild(guild(GUILD), custom("General"), clip())
        .await
        .unwrap_err();
    assert_eq!(err, VoiceError::GuildBusy(guild(GUILD)));
    assert_eq!(h.driver.connect_count(), 1);
}

#[tokio::test]
async fn test_guild_free_again_after_playback() {
    let h = harness();
    let handle = h
        .delivery
        .play_with_handle(guild(GUILD), custom("Lobby"), clip())
        .await
        .unwrap();
    h.driver.last_transport().unwrap().finish_playback();
    handle.finished().await;

    h.delivery
        .play_in_guild(guild(GUILD), custom("General"), clip())
        .await
        .unwrap();
    assert_eq!(h.driver.connect_count(), 2);
}

#[tokio::test]
async fn test_transcode_failure_plays_nothing() {
    let h = harness_with(
        FakeDriver::new(),
        Arc::new(FailingTranscoder::new("Invalid data found when processing input")),
    );

    let err = h
        .delivery
        .play_in_guild(guild(GUILD), custom("Lobby"), clip())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "transcode_error");

    let transport = h.driver.last_transport().unwrap();
    assert!(!transport.is_playing());
    assert_eq!(transport.played_bytes(), 0);
    assert_eq!(transport.destroy_calls(), 1);
    assert!(!h.delivery.controller().slots().is_held(guild(GUILD)));
}

#[tokio::test]
async fn test_player_error_destroys() {
    let h = harness();
    let handle = h
        .delivery
        .play_with_handle(guild(GUILD), custom("Lobby"), clip())
        .await
        .unwrap();

    let transport = h.driver.last_transport().unwrap();
    transport.fail_playback("opus packet corrupt");
    assert_eq!(
        handle.finished().await,
        PlaybackOutcome::Failed("opus packet corrupt".into())
    );
    assert_eq!(transport.destroy_calls(), 1);
}

#[tokio::test]
async fn test_join_failure_is_reported() {
    let h = harness_with(
        FakeDriver::new().with_behavior(ConnectBehavior::Fail("missing permissions".into())),
        Arc::new(StaticTranscoder::ogg(16)),
    );

    let err = h
        .delivery
        .play_in_guild(guild(GUILD), custom("Lobby"), clip())
        .await
        .unwrap_err();
    assert_eq!(err, VoiceError::JoinError("missing permissions".into()));
    assert_eq!(h.driver.last_transport().unwrap().destroy_calls(), 1);
    assert!(!h.delivery.controller().slots().is_held(guild(GUILD)));
}

#[tokio::test(start_paused = true)]
async fn test_join_timeout() {
    let h = harness_with(
        FakeDriver::new().with_behavior(ConnectBehavior::Hang),
        Arc::new(StaticTranscoder::ogg(16)),
    );

    let err = h
        .delivery
        .play_in_guild(guild(GUILD), custom("Lobby"), clip())
        .await
        .unwrap_err();
    assert_eq!(err, VoiceError::JoinTimeout(Duration::from_secs(30)));
    assert_eq!(h.driver.last_transport().unwrap().destroy_calls(), 1);
}

#[tokio::test]
async fn test_list_mode_rejects_text_channel() {
    let h = harness();
    let err = h
        .delivery
        .play_in_guild(
            guild(GUILD),
            TargetDescriptor::List {
                channel_id: channel(333),
            },
            clip(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "channel_not_found");
    assert_eq!(h.driver.connect_count(), 0);
}

#[tokio::test]
async fn test_list_mode_rejects_channel_of_another_guild() {
    let h = harness();
    let err = h
        .delivery
        .play_in_guild(
            guild(GUILD),
            TargetDescriptor::List {
                channel_id: channel(777),
            },
            clip(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "channel_not_found");
    assert_eq!(h.driver.connect_count(), 0);

    let receipt = h
        .delivery
        .play_in_guild(
            guild(OTHER_GUILD),
            TargetDescriptor::List {
                channel_id: channel(777),
            },
            clip(),
        )
        .await
        .unwrap();
    assert_eq!(receipt.channel.get(), 777);
}

#[tokio::test]
async fn test_missing_credential() {
    let gateway = Arc::new(coven_gateway());
    let delivery = VoiceDelivery::new(
        Arc::new(Session::new(gateway.clone())),
        Arc::new(FakeDriver::new()),
        Arc::new(StaticTranscoder::ogg(16)),
        None,
    );

    let err = delivery
        .play_in_guild(guild(GUILD), custom("Lobby"), clip())
        .await
        .unwrap_err();
    assert_eq!(err, VoiceError::MissingCredential);
    assert_eq!(gateway.login_count(), 0);
}

#[tokio::test]
async fn test_transport_drop_auto_pauses() {
    let h = harness();
    let handle = h
        .delivery
        .play_with_handle(guild(GUILD), custom("Lobby"), clip())
        .await
        .unwrap();
    let transport = h.driver.last_transport().unwrap();
    let mut status = handle.subscribe();

    transport.report(TransportStatus::Disconnected);
    status
        .wait_for(|s| *s == PlayerStatus::AutoPaused)
        .await
        .unwrap();
    assert!(transport.track().paused.load(Ordering::SeqCst));

    transport.report(TransportStatus::Ready);
    status.wait_for(|s| *s == PlayerStatus::Playing).await.unwrap();
    assert!(!transport.track().paused.load(Ordering::SeqCst));
    assert_eq!(transport.destroy_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unrecovered_disconnect_stops_player() {
    let h = harness();
    let handle = h
        .delivery
        .play_with_handle(guild(GUILD), custom("Lobby"), clip())
        .await
        .unwrap();
    let transport = h.driver.last_transport().unwrap();

    transport.report(TransportStatus::Disconnected);
    assert_eq!(handle.finished().await, PlaybackOutcome::Interrupted);
    assert_eq!(transport.track().stops.load(Ordering::SeqCst), 1);
    assert_eq!(transport.destroy_calls(), 1);
}

#[tokio::test]
async fn test_session_started_once_across_requests() {
    let h = harness();
    for input in ["Lobby", "General"] {
        let handle = h
            .delivery
            .play_with_handle(guild(GUILD), custom(input), clip())
            .await
            .unwrap();
        h.driver.last_transport().unwrap().finish_playback();
        handle.finished().await;
    }
    assert_eq!(h.gateway.login_count(), 1);
}
