use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use futures::future::join_all;

use stt_gateway::application::ports::{EngineConfig, LanguageDetector};
use stt_gateway::application::services::{
    LanguageRouter, SessionError, SessionManager, SessionManagerConfig, StreamUpdate,
};
use stt_gateway::domain::{LanguageTag, PcmAudio, RawPcmFormat, SessionId};

use crate::helpers::{
    BROKEN_ENGINE, BROKEN_STREAMING_ENGINE, FAILING_ENGINE, FAKE_ENGINE, FAKE_STREAMING_ENGINE,
    FakeDetector, FakePlugins, SLOW_ENGINE, SLOW_STREAMING_ENGINE, expected_transcript, pcm_chunk,
};

fn manager(plugins: &FakePlugins, plugin_id: &str, config: SessionManagerConfig) -> SessionManager {
    manager_with_router(
        plugins,
        plugin_id,
        config,
        Arc::new(LanguageRouter::new(None, LanguageTag::new("en-us"))),
    )
}

fn manager_with_router(
    plugins: &FakePlugins,
    plugin_id: &str,
    config: SessionManagerConfig,
    router: Arc<LanguageRouter>,
) -> SessionManager {
    SessionManager::new(
        plugins.plugin(plugin_id),
        EngineConfig::new(LanguageTag::new("en-us")),
        router,
        config,
    )
}

fn id(value: &str) -> SessionId {
    SessionId::new(value)
}

#[tokio::test]
async fn given_batch_engine_when_streaming_chunks_then_final_equals_single_execute_on_concatenation() {
    let plugins = FakePlugins::new();
    let sessions = manager(&plugins, FAKE_ENGINE, SessionManagerConfig::default());
    let lang = LanguageTag::new("en-us");
    let chunks = [pcm_chunk(1, 400), pcm_chunk(2, 250), pcm_chunk(3, 731)];

    sessions.start(&id("abc"), &lang).await.unwrap();
    for chunk in &chunks {
        let update = sessions.feed(&id("abc"), chunk).await.unwrap();
        assert_eq!(update.transcript, "");
    }
    let result = sessions.stop(&id("abc")).await.unwrap();

    let joined: Vec<u8> = chunks.concat();
    let expected = expected_transcript(
        &PcmAudio::from_pcm16_le(&joined, RawPcmFormat::default()),
        &lang,
    );
    assert_eq!(result.transcript, expected);
    assert_eq!(plugins.log.executions.lock().len(), 1);
}

#[tokio::test]
async fn given_streaming_engine_when_feeding_then_partials_returned_and_final_on_stop() {
    let plugins = FakePlugins::new();
    let sessions = manager(&plugins, FAKE_STREAMING_ENGINE, SessionManagerConfig::default());
    let session = id("live");

    sessions.start(&session, &LanguageTag::new("en")).await.unwrap();
    let first = sessions.feed(&session, &[0u8; 64]).await.unwrap();
    let second = sessions.feed(&session, &[0u8; 32]).await.unwrap();
    let last = sessions.stop(&session).await.unwrap();

    assert_eq!(first.transcript, "partial 1");
    assert_eq!(second.transcript, "partial 2");
    assert_eq!(last.transcript, "final 2 chunks 96 bytes");
    assert_eq!(plugins.log.stream_starts.load(Ordering::SeqCst), 1);
    assert_eq!(plugins.log.stream_stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn given_unknown_session_when_feeding_then_session_not_found() {
    let plugins = FakePlugins::new();
    let sessions = manager(&plugins, FAKE_ENGINE, SessionManagerConfig::default());

    let result = sessions.feed(&id("ghost"), &[0u8; 4]).await;

    assert!(matches!(result, Err(SessionError::SessionNotFound(s)) if s == id("ghost")));
}

#[tokio::test]
async fn given_stopped_session_when_feeding_or_stopping_again_then_session_not_found() {
    let plugins = FakePlugins::new();
    let sessions = manager(&plugins, FAKE_ENGINE, SessionManagerConfig::default());
    let session = id("abc");

    sessions.start(&session, &LanguageTag::new("en")).await.unwrap();
    sessions.stop(&session).await.unwrap();

    assert!(matches!(
        sessions.feed(&session, &[0u8; 4]).await,
        Err(SessionError::SessionNotFound(_))
    ));
    assert!(matches!(
        sessions.stop(&session).await,
        Err(SessionError::SessionNotFound(_))
    ));
    assert_eq!(sessions.session_count(), 0);
}

#[tokio::test]
async fn given_stopped_session_id_when_started_again_then_fresh_session() {
    let plugins = FakePlugins::new();
    let sessions = manager(&plugins, FAKE_ENGINE, SessionManagerConfig::default());
    let session = id("again");

    sessions.start(&session, &LanguageTag::new("en")).await.unwrap();
    sessions.feed(&session, &pcm_chunk(1, 100)).await.unwrap();
    sessions.stop(&session).await.unwrap();
    sessions.start(&session, &LanguageTag::new("en")).await.unwrap();
    let result = sessions.stop(&session).await.unwrap();

    assert_eq!(result.transcript, "");
    assert_eq!(plugins.constructions(), 2);
}

#[tokio::test]
async fn given_open_session_when_started_again_then_reused_with_original_language() {
    let plugins = FakePlugins::new();
    let sessions = manager(&plugins, FAKE_ENGINE, SessionManagerConfig::default());
    let session = id("same");

    sessions.start(&session, &LanguageTag::new("en")).await.unwrap();
    sessions.feed(&session, &pcm_chunk(1, 100)).await.unwrap();
    let restarted = sessions.start(&session, &LanguageTag::new("de")).await.unwrap();
    let result = sessions.stop(&session).await.unwrap();

    assert_eq!(restarted.lang.as_str(), "en");
    assert_eq!(plugins.constructions(), 1);
    assert!(result.transcript.starts_with("en 100 samples"));
}

#[tokio::test]
async fn given_concurrent_starts_for_one_session_when_racing_then_single_engine() {
    let plugins = FakePlugins::with_construction_delay(Duration::from_millis(30));
    let sessions = manager(&plugins, FAKE_ENGINE, SessionManagerConfig::default());
    let session = id("race");
    let lang = LanguageTag::new("en");

    let results = join_all((0..6).map(|_| sessions.start(&session, &lang))).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(plugins.constructions(), 1);
    assert_eq!(sessions.session_count(), 1);
}

#[tokio::test]
async fn given_two_sessions_when_interleaving_feeds_then_buffers_stay_separate() {
    let plugins = FakePlugins::new();
    let sessions = manager(&plugins, FAKE_ENGINE, SessionManagerConfig::default());
    let lang = LanguageTag::new("en");
    let (a, b) = (id("a"), id("b"));

    sessions.start(&a, &lang).await.unwrap();
    sessions.start(&b, &lang).await.unwrap();
    sessions.feed(&a, &pcm_chunk(1, 100)).await.unwrap();
    sessions.feed(&b, &pcm_chunk(2, 300)).await.unwrap();
    sessions.feed(&a, &pcm_chunk(3, 100)).await.unwrap();

    let result_a = sessions.stop(&a).await.unwrap();
    let result_b = sessions.stop(&b).await.unwrap();

    assert!(result_a.transcript.starts_with("en 200 samples"));
    assert!(result_b.transcript.starts_with("en 300 samples"));
    assert_eq!(plugins.constructions(), 2);
}

#[tokio::test]
async fn given_failing_constructor_when_starting_then_engine_init_and_no_session_left() {
    let plugins = FakePlugins::new();
    let sessions = manager(&plugins, FAILING_ENGINE, SessionManagerConfig::default());

    let result = sessions.start(&id("x"), &LanguageTag::new("en")).await;

    assert!(matches!(result, Err(SessionError::EngineInit(_))));
    assert_eq!(sessions.session_count(), 0);
}

#[tokio::test]
async fn given_idle_sessions_when_cleanup_runs_then_expired_removed_and_streams_closed() {
    let plugins = FakePlugins::new();
    let config = SessionManagerConfig {
        idle_timeout: Duration::from_millis(20),
        ..SessionManagerConfig::default()
    };
    let sessions = manager(&plugins, FAKE_STREAMING_ENGINE, config);

    sessions.start(&id("stale"), &LanguageTag::new("en")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    sessions.start(&id("fresh"), &LanguageTag::new("en")).await.unwrap();

    let removed = sessions.cleanup_expired().await;

    assert_eq!(removed, 1);
    assert!(!sessions.contains(&id("stale")));
    assert_eq!(sessions.active_sessions(), vec![id("fresh")]);
    assert_eq!(plugins.log.stream_stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn given_cleanup_task_when_session_idles_then_reaped_in_background() {
    let plugins = FakePlugins::new();
    let config = SessionManagerConfig {
        idle_timeout: Duration::from_millis(20),
        cleanup_interval: Duration::from_millis(10),
        ..SessionManagerConfig::default()
    };
    let sessions = Arc::new(manager(&plugins, FAKE_ENGINE, config));

    sessions.start(&id("idle"), &LanguageTag::new("en")).await.unwrap();
    let shutdown = sessions.start_cleanup_task();
    tokio::time::sleep(Duration::from_millis(120)).await;
    shutdown.send(true).ok();

    assert_eq!(sessions.session_count(), 0);
}

#[tokio::test]
async fn given_capacity_reached_when_starting_new_session_then_limit_error() {
    let plugins = FakePlugins::new();
    let config = SessionManagerConfig {
        max_sessions: 1,
        ..SessionManagerConfig::default()
    };
    let sessions = manager(&plugins, FAKE_ENGINE, config);

    sessions.start(&id("one"), &LanguageTag::new("en")).await.unwrap();
    let result = sessions.start(&id("two"), &LanguageTag::new("en")).await;

    assert!(matches!(result, Err(SessionError::SessionLimitReached(1))));
}

#[tokio::test]
async fn given_capacity_reached_with_idle_session_when_starting_then_idle_one_evicted() {
    let plugins = FakePlugins::new();
    let config = SessionManagerConfig {
        max_sessions: 1,
        idle_timeout: Duration::from_millis(20),
        ..SessionManagerConfig::default()
    };
    let sessions = manager(&plugins, FAKE_ENGINE, config);

    sessions.start(&id("old"), &LanguageTag::new("en")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    sessions.start(&id("new"), &LanguageTag::new("en")).await.unwrap();

    assert_eq!(sessions.active_sessions(), vec![id("new")]);
}

#[tokio::test]
async fn given_auto_session_with_detector_when_stopped_then_detected_language_reported() {
    let plugins = FakePlugins::new();
    let detector = Arc::new(FakeDetector::new("es", 0.8));
    let router = Arc::new(LanguageRouter::new(
        Some(Arc::clone(&detector) as Arc<dyn LanguageDetector>),
        LanguageTag::new("en-us"),
    ));
    let sessions = manager_with_router(&plugins, FAKE_ENGINE, SessionManagerConfig::default(), router);
    let session = id("auto");

    sessions.start(&session, &LanguageTag::auto()).await.unwrap();
    sessions.feed(&session, &pcm_chunk(7, 500)).await.unwrap();
    let result = sessions.stop(&session).await.unwrap();

    assert_eq!(detector.calls(), 1);
    assert_eq!(result.lang.as_str(), "es");
    assert!(result.transcript.starts_with("es 500 samples"));
}

#[tokio::test]
async fn given_session_without_audio_when_stopped_then_empty_transcript_without_engine_call() {
    let plugins = FakePlugins::new();
    let sessions = manager(&plugins, FAKE_ENGINE, SessionManagerConfig::default());

    sessions.start(&id("silent"), &LanguageTag::new("en")).await.unwrap();
    let result = sessions.stop(&id("silent")).await.unwrap();

    assert_eq!(result.transcript, "");
    assert!(plugins.log.executions.lock().is_empty());
}

fn assert_gone(result: Result<StreamUpdate, SessionError>) {
    assert!(matches!(result, Err(SessionError::SessionNotFound(_))));
}

fn with_call_timeout(limit: Duration) -> SessionManagerConfig {
    SessionManagerConfig {
        call_timeout: Some(limit),
        ..SessionManagerConfig::default()
    }
}

#[tokio::test]
async fn given_streaming_backend_failures_when_feeding_and_stopping_then_empty_transcripts_and_session_removed() {
    let plugins = FakePlugins::new();
    let sessions = manager(&plugins, BROKEN_STREAMING_ENGINE, SessionManagerConfig::default());
    let session = id("flaky-link");

    sessions.start(&session, &LanguageTag::new("en")).await.unwrap();
    let partial = sessions.feed(&session, &pcm_chunk(1, 100)).await.unwrap();
    let last = sessions.stop(&session).await.unwrap();

    assert_eq!(partial.transcript, "");
    assert_eq!(last.transcript, "");
    assert_eq!(plugins.log.stream_stops.load(Ordering::SeqCst), 1);
    assert_gone(sessions.feed(&session, &pcm_chunk(2, 100)).await);
    assert_eq!(sessions.session_count(), 0);
}

#[tokio::test]
async fn given_buffered_recognition_failure_when_stopping_then_empty_transcript_and_session_removed() {
    let plugins = FakePlugins::new();
    let sessions = manager(&plugins, BROKEN_ENGINE, SessionManagerConfig::default());
    let session = id("lost");

    sessions.start(&session, &LanguageTag::new("en")).await.unwrap();
    sessions.feed(&session, &pcm_chunk(4, 200)).await.unwrap();
    let result = sessions.stop(&session).await.unwrap();

    assert_eq!(result.transcript, "");
    assert_eq!(plugins.log.executions.lock().len(), 1);
    assert_gone(sessions.feed(&session, &pcm_chunk(5, 200)).await);
    assert_gone(sessions.stop(&session).await);
}

#[tokio::test]
async fn given_call_timeout_when_streaming_engine_stalls_then_empty_transcripts_and_session_removed() {
    let plugins = FakePlugins::new();
    let sessions = manager(
        &plugins,
        SLOW_STREAMING_ENGINE,
        with_call_timeout(Duration::from_millis(20)),
    );
    let session = id("stalled");

    sessions.start(&session, &LanguageTag::new("en")).await.unwrap();
    let partial = sessions.feed(&session, &pcm_chunk(1, 100)).await.unwrap();
    let last = sessions.stop(&session).await.unwrap();

    assert_eq!(partial.transcript, "");
    assert_eq!(last.transcript, "");
    assert_gone(sessions.feed(&session, &pcm_chunk(2, 100)).await);
}

#[tokio::test]
async fn given_call_timeout_when_buffered_engine_stalls_then_empty_final_and_session_removed() {
    let plugins = FakePlugins::new();
    let sessions = manager(&plugins, SLOW_ENGINE, with_call_timeout(Duration::from_millis(20)));
    let session = id("slow-batch");

    sessions.start(&session, &LanguageTag::new("en")).await.unwrap();
    sessions.feed(&session, &pcm_chunk(3, 300)).await.unwrap();
    let result = sessions.stop(&session).await.unwrap();

    assert_eq!(result.transcript, "");
    assert_eq!(plugins.log.executions.lock().len(), 1);
    assert_eq!(sessions.session_count(), 0);
}

#[tokio::test]
async fn given_call_timeout_longer_than_stream_latency_when_feeding_then_partials_kept() {
    let plugins = FakePlugins::new();
    let sessions = manager(
        &plugins,
        FAKE_STREAMING_ENGINE,
        with_call_timeout(Duration::from_secs(5)),
    );
    let session = id("prompt");

    sessions.start(&session, &LanguageTag::new("en")).await.unwrap();
    let partial = sessions.feed(&session, &[0u8; 16]).await.unwrap();
    let last = sessions.stop(&session).await.unwrap();

    assert_eq!(partial.transcript, "partial 1");
    assert_eq!(last.transcript, "final 1 chunks 16 bytes");
}
