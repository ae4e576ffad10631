//! Decoder preservation across loads
//!
//! A decoder survives a reload when the new track's configuration is
//! identical; otherwise the old one is closed before a new one is created.

mod helpers;

use helpers::*;
use sme_common::events::StateTag;
use sme_engine::EngineConfig;

#[tokio::test]
async fn test_reload_with_identical_config_reuses_decoder() {
    let (mut engine, backend, _sink) = loaded_audio_engine().await;

    let result = engine.load(media_input()).await.unwrap();

    assert!(result.track.is_some());
    assert_eq!(engine.state(), StateTag::Ready);
    assert_eq!(backend.log.of("create"), vec!["create#1"]);
    assert!(backend.log.of("close").is_empty());
    // Reused decoder is reset and rebound before use
    assert!(backend.log.position("reset#1") < backend.log.position("configure#1"));
}

#[tokio::test]
async fn test_reload_with_different_config_closes_before_create() {
    let (mut engine, backend, _sink) = loaded_audio_engine().await;
    backend.set_track(Some(SyntheticTrack::audio().with_codec("synth-pcm-v2")));

    let result = engine.load(media_input()).await.unwrap();

    assert_eq!(result.track.unwrap().codec, "synth-pcm-v2");
    assert_eq!(backend.log.of("create"), vec!["create#1", "create#2"]);
    assert!(backend.log.position("close#1") < backend.log.position("create#2"));
}

#[tokio::test]
async fn test_reload_while_playing_reuses_decoder() {
    let (mut engine, backend, _sink) = loaded_audio_engine().await;
    engine.play(0.0, 1.0).await;
    assert_eq!(engine.state(), StateTag::Playing);

    engine.load(media_input()).await.unwrap();

    assert_eq!(engine.state(), StateTag::Ready);
    assert_eq!(engine.current_time(), 0.0);
    assert_eq!(backend.log.of("create"), vec!["create#1"]);
}

#[tokio::test]
async fn test_failed_open_keeps_decoder_for_next_load() {
    let (mut engine, backend, _sink) = loaded_audio_engine().await;

    assert!(engine.load(missing_input()).await.is_err());
    assert_eq!(engine.state(), StateTag::Idle);

    engine.load(media_input()).await.unwrap();
    assert_eq!(backend.log.of("create"), vec!["create#1"]);
}

#[tokio::test]
async fn test_empty_load_keeps_decoder_for_next_load() {
    let (mut engine, backend, _sink) = loaded_audio_engine().await;
    backend.set_track(None);
    engine.load(media_input()).await.unwrap();
    assert_eq!(engine.state(), StateTag::Idle);

    backend.set_track(Some(SyntheticTrack::audio()));
    engine.load(media_input()).await.unwrap();

    assert_eq!(backend.log.of("create"), vec!["create#1"]);
    assert!(backend.log.of("close").is_empty());
}

#[tokio::test]
async fn test_track_duration_change_still_reuses_decoder() {
    let (mut engine, backend, _sink) = loaded_audio_engine().await;
    backend.set_track(Some(SyntheticTrack::audio().with_duration(4.0)));

    let result = engine.load(media_input()).await.unwrap();

    // Duration is not part of the decoder configuration
    assert_near(result.duration, 4.0, 1e-9);
    assert_eq!(backend.log.of("create"), vec!["create#1"]);
}

#[tokio::test]
async fn test_reused_decoder_decodes_from_start() {
    let (mut engine, backend) = synthetic_engine(SyntheticTrack::audio(), EngineConfig::default());
    engine.load(media_input()).await.unwrap();
    engine.seek(6.0).await;

    engine.load(media_input()).await.unwrap();

    let range = engine.buffer_range();
    assert_near(range.start, 0.0, 1e-9);
    assert!(range.contains(0.05));
    assert_eq!(backend.log.of("create").len(), 1);
}
