//! Streaming loop tests
//!
//! Drive `tick()` by hand against a paused tokio clock and check what the
//! sink receives: the current unit exactly once, gaps for audio, stale
//! fallback for video, and a single `Ended` at the end of the track.

mod helpers;

use helpers::*;
use sme_common::events::{EngineEvent, StateTag, TrackKind};
use sme_engine::playback::{PassOutcome, TickOutcome};
use sme_engine::EngineConfig;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_tick_delivers_current_unit_once() {
    let (mut engine, _backend, sink) = loaded_audio_engine().await;
    engine.play(0.0, 1.0).await;

    engine.tick().await;
    engine.tick().await;
    advance_and_tick(&mut engine, Duration::from_millis(50)).await;

    assert_eq!(sink.received(), vec![Some(0.0)]);

    advance_and_tick(&mut engine, Duration::from_millis(60)).await;
    assert_eq!(sink.count_of(0.1), 1);
    assert_eq!(sink.gaps(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_tick_inactive_unless_playing() {
    let (mut engine, _backend, sink) = loaded_audio_engine().await;

    assert_eq!(engine.tick().await, TickOutcome::Inactive);

    engine.play(0.0, 1.0).await;
    engine.pause();
    assert_eq!(engine.tick().await, TickOutcome::Inactive);
    assert!(sink.received().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_tick_keeps_lookahead_filled() {
    let (mut engine, _backend, _sink) = loaded_audio_engine().await;
    engine.play(0.0, 1.0).await;

    for _ in 0..40 {
        advance_and_tick(&mut engine, Duration::from_millis(50)).await;
    }

    let now = engine.current_time();
    assert_near(now, 2.0, 1e-6);
    let range = engine.buffer_range();
    assert!(range.contains(now), "{:?} should contain {}", range, now);
    assert!(range.end >= now + 0.5, "lookahead too short: {:?}", range);
    // Units well behind the presentation time are evicted
    assert!(range.start >= now - 0.5, "stale units kept: {:?}", range);
}

#[tokio::test(start_paused = true)]
async fn test_skipped_decode_abandons_pass() {
    let (mut engine, backend, _sink) = loaded_audio_engine().await;
    engine.play(0.0, 1.0).await;
    backend.skip_next(1);

    let outcome = engine.tick().await;

    let TickOutcome::Playing {
        report: Some(report),
        ..
    } = outcome
    else {
        panic!("expected a buffer-ahead pass, got {:?}", outcome);
    };
    assert_eq!(report.outcome, PassOutcome::NotReady);
    assert_eq!(report.decoded, 0);
    assert_eq!(engine.perf_stats().skipped_passes, 1);

    // The next pass resubmits the same packet
    let outcome = engine.tick().await;
    let TickOutcome::Playing {
        report: Some(report),
        ..
    } = outcome
    else {
        panic!("expected a buffer-ahead pass, got {:?}", outcome);
    };
    assert!(report.decoded > 0);
    assert!(engine.status().buffer_range.contains(0.85));
}

#[tokio::test(start_paused = true)]
async fn test_keyframe_recovery_after_playback_overtakes_decoder() {
    let (mut engine, _backend, sink) = loaded_audio_engine().await;
    engine.play(0.0, 1.0).await;

    // Jump far past the decoded range; 3.3 is not a keyframe
    advance_and_tick(&mut engine, Duration::from_millis(3350)).await;

    let stats = engine.perf_stats();
    assert_eq!(stats.keyframe_recoveries, 1);
    assert_eq!(stats.decode_faults, 0);
    // The unit covering "now" went straight to the sink
    assert_eq!(sink.count_of(3.3), 1);
    assert!(stats.live_deliveries >= 1);
    assert!(engine.buffer_range().contains(3.45));
}

#[tokio::test(start_paused = true)]
async fn test_recovery_progresses_when_gop_exceeds_pass_quota() {
    // 3 s between keyframes, 8 packets decoded per pass
    let track = SyntheticTrack::audio().with_keyframe_interval(30);
    let (mut engine, _backend) = synthetic_engine(track, EngineConfig::default());
    let sink = RecordingSink::new();
    engine.set_output_sink(sink.boxed());
    engine.load(media_input()).await.unwrap();
    engine.play(0.0, 1.0).await;

    advance_and_tick(&mut engine, Duration::from_millis(1500)).await;
    let mut ticks = 0;
    while !sink.timestamps().iter().any(|ts| *ts >= 1.5 - 1e-6) {
        assert!(ticks < 5, "nothing presented after {} ticks", ticks);
        advance_and_tick(&mut engine, Duration::from_millis(16)).await;
        ticks += 1;
    }

    assert_eq!(sink.count_of(1.5), 1);
    let stats = engine.perf_stats();
    assert_eq!(stats.keyframe_recoveries, 1);
    assert_eq!(stats.decode_faults, 0);
    assert!(stats.preroll_discards >= 15);
    assert!(engine.buffer_range().contains(1.65));
}

#[tokio::test(start_paused = true)]
async fn test_audio_gap_delivered_once_on_decode_error() {
    let (mut engine, backend, sink) = loaded_audio_engine().await;
    let mut events = engine.subscribe();
    backend.corrupt(9);
    engine.play(0.0, 1.0).await;

    engine.tick().await;
    assert_eq!(engine.perf_stats().decode_faults, 1);
    let events_seen = drain_events(&mut events);
    assert!(events_seen.iter().any(|e| matches!(
        e,
        EngineEvent::DecodeError { position, .. } if (*position - 0.9).abs() < 1e-6
    )));

    advance_and_tick(&mut engine, Duration::from_millis(950)).await;
    advance_and_tick(&mut engine, Duration::from_millis(20)).await;
    assert_eq!(sink.gaps(), 1);
    assert_eq!(sink.received().last(), Some(&None));

    advance_and_tick(&mut engine, Duration::from_millis(60)).await;
    assert_eq!(sink.received().last(), Some(&Some(1.0)));
    assert_eq!(engine.state(), StateTag::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_video_falls_back_to_stale_picture() {
    let (mut engine, backend) = synthetic_engine(
        SyntheticTrack::video(),
        EngineConfig::for_kind(TrackKind::Video),
    );
    let sink = RecordingSink::new();
    engine.set_output_sink(sink.boxed());
    engine.load(media_input()).await.unwrap();
    backend.corrupt(9);
    engine.play(0.0, 1.0).await;

    engine.tick().await;
    advance_and_tick(&mut engine, Duration::from_millis(850)).await;
    advance_and_tick(&mut engine, Duration::from_millis(100)).await;

    assert_eq!(sink.gaps(), 0);
    // 0.8 stays on screen while 0.9 is missing
    assert_eq!(sink.timestamps().last().copied(), Some(0.8));
    assert_eq!(sink.count_of(0.8), 1);
}

#[tokio::test(start_paused = true)]
async fn test_end_of_track_fires_ended_once() {
    let (mut engine, _backend, _sink) = loaded_audio_engine().await;
    let mut events = engine.subscribe();
    engine.play(9.5, 1.0).await;

    advance_and_tick(&mut engine, Duration::from_millis(300)).await;
    assert_eq!(engine.state(), StateTag::Playing);

    tokio::time::advance(Duration::from_millis(300)).await;
    let outcome = engine.tick().await;
    assert!(matches!(outcome, TickOutcome::Ended { duration } if (duration - 10.0).abs() < 1e-9));
    assert_eq!(engine.state(), StateTag::Paused);
    assert_near(engine.current_time(), 10.0, 1e-9);

    advance_and_tick(&mut engine, Duration::from_millis(500)).await;
    let events_seen = drain_events(&mut events);
    assert_eq!(count_events(&events_seen, "Ended"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_replay_after_end_can_end_again() {
    let (mut engine, _backend, _sink) = loaded_audio_engine().await;
    let mut events = engine.subscribe();

    engine.play(9.8, 1.0).await;
    advance_and_tick(&mut engine, Duration::from_millis(300)).await;
    engine.play(9.8, 1.0).await;
    advance_and_tick(&mut engine, Duration::from_millis(300)).await;

    let events_seen = drain_events(&mut events);
    assert_eq!(count_events(&events_seen, "Ended"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_detached_sink_receives_nothing() {
    let (mut engine, _backend, sink) = loaded_audio_engine().await;
    engine.set_output_sink(None);
    engine.play(0.0, 1.0).await;

    advance_and_tick(&mut engine, Duration::from_millis(100)).await;

    assert!(sink.received().is_empty());
    assert_eq!(engine.perf_stats().delivered_units, 0);
}
