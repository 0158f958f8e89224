//! Transport drops during playback, driven on paused time.

mod common;

use common::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use voicecast::testing::{FakeDriver, StaticTranscoder};
use voicecast::{
    PlaybackOutcome, PlaybackRequest, PlayerStatus, ReconnectPolicy, TargetDescriptor,
    TransportStatus, VoiceController,
};

fn lobby() -> TargetDescriptor {
    TargetDescriptor::Custom {
        raw_input: "Lobby".into(),
    }
}

fn clip() -> PlaybackRequest {
    PlaybackRequest::new(vec![1u8; 64], "sortilege.ogg")
}

/// Let spawned tasks observe the latest status.
async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_recovery_inside_window_keeps_playing() {
    let h = harness();
    let handle = h
        .delivery
        .play_with_handle(guild(GUILD), lobby(), clip())
        .await
        .unwrap();
    let transport = h.driver.last_transport().unwrap();

    transport.report(TransportStatus::Disconnected);
    settle().await;
    assert_eq!(handle.status(), PlayerStatus::AutoPaused);

    tokio::time::advance(Duration::from_secs(2)).await;
    transport.report(TransportStatus::Signalling);
    tokio::time::advance(Duration::from_secs(1)).await;
    transport.report(TransportStatus::Ready);
    settle().await;
    assert_eq!(handle.status(), PlayerStatus::Playing);

    // Well past the original window.
    tokio::time::advance(Duration::from_secs(10)).await;
    settle().await;
    assert_eq!(transport.destroy_calls(), 0);
    assert_eq!(transport.track().resumes.load(Ordering::SeqCst), 1);

    transport.finish_playback();
    assert_eq!(handle.finished().await, PlaybackOutcome::Finished);
    assert_eq!(transport.destroy_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_signalling_hands_recovery_to_transport() {
    let h = harness();
    let handle = h
        .delivery
        .play_with_handle(guild(GUILD), lobby(), clip())
        .await
        .unwrap();
    let transport = h.driver.last_transport().unwrap();

    transport.report(TransportStatus::Disconnected);
    settle().await;
    tokio::time::advance(Duration::from_secs(1)).await;
    transport.report(TransportStatus::Signalling);
    settle().await;

    tokio::time::advance(Duration::from_secs(30)).await;
    settle().await;
    assert_eq!(transport.destroy_calls(), 0);
    assert_eq!(handle.status(), PlayerStatus::AutoPaused);
    assert!(transport.track().paused.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_second_drop_gets_a_fresh_window() {
    let h = harness();
    let handle = h
        .delivery
        .play_with_handle(guild(GUILD), lobby(), clip())
        .await
        .unwrap();
    let transport = h.driver.last_transport().unwrap();

    transport.report(TransportStatus::Disconnected);
    settle().await;
    tokio::time::advance(Duration::from_secs(4)).await;
    transport.report(TransportStatus::Ready);
    settle().await;

    transport.report(TransportStatus::Disconnected);
    settle().await;
    tokio::time::advance(Duration::from_secs(4)).await;
    settle().await;
    assert_eq!(transport.destroy_calls(), 0);
    assert_eq!(handle.status(), PlayerStatus::AutoPaused);

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(handle.finished().await, PlaybackOutcome::Interrupted);
    assert_eq!(transport.destroy_calls(), 1);
    assert!(!h.delivery.controller().slots().is_held(guild(GUILD)));
}

#[tokio::test(start_paused = true)]
async fn test_recovery_window_is_configurable() {
    let gateway = Arc::new(coven_gateway());
    let driver = Arc::new(FakeDriver::new());
    let session = ready_session(gateway).await;
    let controller = VoiceController::new(session, driver.clone()).with_reconnect_policy(
        ReconnectPolicy::default().with_probe_timeout(Duration::from_secs(1)),
    );

    let connection = controller.join(channel(555)).await.unwrap();
    let stream = {
        use voicecast::Transcode;
        StaticTranscoder::ogg(32)
            .transcode(clip().audio)
            .await
            .unwrap()
    };
    let handle = controller.play(&connection, stream).await.unwrap();
    let transport = driver.last_transport().unwrap();

    transport.report(TransportStatus::Disconnected);
    settle().await;
    tokio::time::advance(Duration::from_millis(1500)).await;
    settle().await;

    assert!(connection.is_destroyed());
    assert_eq!(handle.finished().await, PlaybackOutcome::Interrupted);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_is_terminal_for_status() {
    let session = ready_session(Arc::new(coven_gateway())).await;
    let driver = Arc::new(FakeDriver::new());
    let controller = VoiceController::new(session, driver.clone());

    let connection = controller.join(channel(111)).await.unwrap();
    assert!(connection.destroy().await);
    assert!(!connection.destroy().await);

    let transport = driver.last_transport().unwrap();
    assert!(!transport.report(TransportStatus::Ready));
    assert_eq!(connection.status(), TransportStatus::Destroyed);
    assert_eq!(transport.destroy_calls(), 1);
}
