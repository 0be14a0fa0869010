use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use stt_gateway::application::ports::{
    AudioNormalizer, Engine, EngineConfig, LanguageDetector,
};
use stt_gateway::application::services::{LanguageRouter, ModelContainer, ModelContainerError};
use stt_gateway::domain::{LanguageTag, PcmAudio, RawPcmFormat};

use crate::helpers::{
    EngineLog, FAILING_ENGINE, FAKE_ENGINE, FLAKY_ENGINE, FakeDetector, FakeEngine, FakeNormalizer,
    FakePlugins, STALL, expected_transcript, pcm_chunk,
};

fn normalizer() -> Arc<dyn AudioNormalizer> {
    Arc::new(FakeNormalizer)
}

fn plain_router() -> Arc<LanguageRouter> {
    Arc::new(LanguageRouter::new(None, LanguageTag::new("en-us")))
}

fn multi_container(plugins: &FakePlugins, plugin_id: &str) -> ModelContainer {
    ModelContainer::multi(
        plugins.plugin(plugin_id),
        EngineConfig::new(LanguageTag::new("en-us")),
        normalizer(),
        plain_router(),
    )
}

#[tokio::test]
async fn given_concurrent_first_requests_for_one_language_when_getting_engine_then_constructed_once() {
    let plugins = FakePlugins::with_construction_delay(Duration::from_millis(50));
    let container = multi_container(&plugins, FAKE_ENGINE);
    let lang = LanguageTag::new("en-us");

    let engines = join_all((0..8).map(|_| container.get_engine(&lang))).await;

    assert_eq!(plugins.constructions(), 1);
    let first = engines[0].as_ref().unwrap();
    assert!(engines.iter().all(|e| Arc::ptr_eq(e.as_ref().unwrap(), first)));
}

#[tokio::test]
async fn given_primary_language_loaded_when_regional_variant_requested_then_reused() {
    let plugins = FakePlugins::new();
    let container = multi_container(&plugins, FAKE_ENGINE);

    let base = container.get_engine(&LanguageTag::new("en")).await.unwrap();
    let regional = container.get_engine(&LanguageTag::new("en-US")).await.unwrap();

    assert!(Arc::ptr_eq(&base, &regional));
    assert_eq!(plugins.constructions(), 1);
    assert_eq!(container.loaded_languages(), vec![LanguageTag::new("en")]);
}

#[tokio::test]
async fn given_regional_language_loaded_when_other_region_requested_then_new_engine() {
    let plugins = FakePlugins::new();
    let container = multi_container(&plugins, FAKE_ENGINE);

    container.get_engine(&LanguageTag::new("en-us")).await.unwrap();
    container.get_engine(&LanguageTag::new("en-gb")).await.unwrap();

    assert_eq!(plugins.constructions(), 2);
    assert_eq!(
        container.loaded_languages(),
        vec![LanguageTag::new("en-gb"), LanguageTag::new("en-us")]
    );
}

#[tokio::test]
async fn given_loaded_engine_when_unloaded_then_next_request_rebuilds() {
    let plugins = FakePlugins::new();
    let container = multi_container(&plugins, FAKE_ENGINE);
    let lang = LanguageTag::new("de");

    container.get_engine(&lang).await.unwrap();
    assert!(container.unload_engine(&lang));
    assert!(!container.unload_engine(&lang));
    container.get_engine(&lang).await.unwrap();

    assert_eq!(plugins.constructions(), 2);
}

#[tokio::test]
async fn given_failing_constructor_when_processing_audio_then_engine_init_error_and_retry_allowed() {
    let plugins = FakePlugins::new();
    let container = multi_container(&plugins, FAILING_ENGINE);
    let audio = pcm_chunk(1, 320);

    let first = container.process_audio(&audio, &LanguageTag::new("fr")).await;
    let second = container.process_audio(&audio, &LanguageTag::new("fr")).await;

    assert!(matches!(first, Err(ModelContainerError::EngineInit(_))));
    assert!(matches!(second, Err(ModelContainerError::EngineInit(_))));
    assert_eq!(plugins.constructions(), 2);
    assert!(container.loaded_languages().is_empty());
}

#[tokio::test]
async fn given_construction_failure_while_another_caller_waits_when_retried_then_one_engine_kept() {
    let plugins = FakePlugins::new();
    let container = multi_container(&plugins, FLAKY_ENGINE);
    let lang = LanguageTag::new("en");

    let (failed, recovered) = tokio::join!(container.get_engine(&lang), container.get_engine(&lang));

    assert!(matches!(failed, Err(ModelContainerError::EngineInit(_))));
    let recovered = recovered.unwrap();
    assert_eq!(container.loaded_languages(), vec![lang.clone()]);

    let later = container.get_engine(&lang).await.unwrap();

    assert!(Arc::ptr_eq(&recovered, &later));
    assert_eq!(plugins.constructions(), 2);
}

#[tokio::test]
async fn given_call_timeout_when_engine_stalls_then_empty_transcript() {
    let log = Arc::new(EngineLog::default());
    let engine = Engine::BatchOnly(Box::new(FakeEngine::new(Arc::clone(&log)).slow(STALL)));
    let container = ModelContainer::from_engine(engine, normalizer(), plain_router())
        .with_call_timeout(Some(Duration::from_millis(20)));

    let result = container
        .process_audio(&pcm_chunk(6, 160), &LanguageTag::new("en"))
        .await
        .unwrap();

    assert_eq!(result.text, "");
    assert_eq!(log.executions.lock().len(), 1);
}

#[tokio::test]
async fn given_call_timeout_longer_than_engine_latency_when_processing_then_transcript_kept() {
    let log = Arc::new(EngineLog::default());
    let engine = Engine::BatchOnly(Box::new(FakeEngine::new(Arc::clone(&log))));
    let container = ModelContainer::from_engine(engine, normalizer(), plain_router())
        .with_call_timeout(Some(Duration::from_secs(5)));
    let lang = LanguageTag::new("en");

    let result = container.process_audio(&pcm_chunk(6, 160), &lang).await.unwrap();

    assert!(result.text.starts_with("en 160 samples"));
}

#[tokio::test]
async fn given_undecodable_payload_when_processing_audio_then_empty_transcript() {
    let log = Arc::new(EngineLog::default());
    let engine = Engine::BatchOnly(Box::new(FakeEngine::new(Arc::clone(&log))));
    let container = ModelContainer::from_engine(engine, normalizer(), plain_router());

    let result = container
        .process_audio(b"junk that is not audio", &LanguageTag::new("en"))
        .await
        .unwrap();

    assert_eq!(result.text, "");
    assert!(log.executions.lock().is_empty());
}

#[tokio::test]
async fn given_recognition_failure_when_processing_audio_then_empty_transcript() {
    let log = Arc::new(EngineLog::default());
    let engine = Engine::BatchOnly(Box::new(FakeEngine::new(Arc::clone(&log)).failing()));
    let container = ModelContainer::from_engine(engine, normalizer(), plain_router());

    let result = container
        .process_audio(&pcm_chunk(3, 160), &LanguageTag::new("en"))
        .await
        .unwrap();

    assert_eq!(result.text, "");
    assert_eq!(log.executions.lock().len(), 1);
}

#[tokio::test]
async fn given_valid_audio_when_processing_then_engine_transcript_returned() {
    let log = Arc::new(EngineLog::default());
    let engine = Engine::BatchOnly(Box::new(FakeEngine::new(Arc::clone(&log))));
    let container = ModelContainer::from_engine(engine, normalizer(), plain_router());
    let bytes = pcm_chunk(5, 480);
    let lang = LanguageTag::new("en-us");

    let result = container.process_audio(&bytes, &lang).await.unwrap();

    let expected = expected_transcript(&PcmAudio::from_pcm16_le(&bytes, RawPcmFormat::default()), &lang);
    assert_eq!(result.text, expected);
    assert_eq!(result.lang, lang);
}

#[tokio::test]
async fn given_auto_language_with_detector_when_processing_then_detected_language_used_once() {
    let log = Arc::new(EngineLog::default());
    let engine = Engine::BatchOnly(Box::new(FakeEngine::new(Arc::clone(&log))));
    let detector = Arc::new(FakeDetector::new("es", 0.93));
    let router = Arc::new(LanguageRouter::new(
        Some(Arc::clone(&detector) as Arc<dyn LanguageDetector>),
        LanguageTag::new("en-us"),
    ));
    let container = ModelContainer::from_engine(engine, normalizer(), router);

    let result = container
        .process_audio(&pcm_chunk(9, 800), &LanguageTag::auto())
        .await
        .unwrap();

    assert_eq!(detector.calls(), 1);
    assert_eq!(result.lang.as_str(), "es");
    assert!(result.text.starts_with("es "));
    assert_eq!(log.executed_langs(), vec![LanguageTag::new("es")]);
}

#[tokio::test]
async fn given_auto_in_multi_mode_without_detector_when_processing_then_default_language_engine() {
    let plugins = FakePlugins::new();
    let container = multi_container(&plugins, FAKE_ENGINE);

    let result = container
        .process_audio(&pcm_chunk(2, 160), &LanguageTag::auto())
        .await
        .unwrap();

    assert_eq!(result.lang.as_str(), "en-us");
    assert_eq!(container.loaded_languages(), vec![LanguageTag::new("en-us")]);
}

#[tokio::test]
async fn given_auto_in_single_mode_without_any_detection_when_processing_then_auto_reaches_engine() {
    let log = Arc::new(EngineLog::default());
    let engine = Engine::BatchOnly(Box::new(FakeEngine::new(Arc::clone(&log))));
    let container = ModelContainer::from_engine(engine, normalizer(), plain_router());

    container
        .process_audio(&pcm_chunk(2, 160), &LanguageTag::auto())
        .await
        .unwrap();

    assert_eq!(log.executed_langs(), vec![LanguageTag::auto()]);
}

#[tokio::test]
async fn given_allow_list_when_detecting_payload_then_restricted_answer() {
    let engine = Engine::BatchOnly(Box::new(FakeEngine::new(Arc::new(EngineLog::default()))));
    let detector = Arc::new(FakeDetector::new("pt-br", 0.55));
    let router = Arc::new(LanguageRouter::new(
        Some(Arc::clone(&detector) as Arc<dyn LanguageDetector>),
        LanguageTag::new("en-us"),
    ));
    let container = ModelContainer::from_engine(engine, normalizer(), router);

    let detection = container
        .detect(&pcm_chunk(4, 800), &LanguageTag::parse_list("en,pt"))
        .await;

    assert_eq!(detection.lang.as_str(), "pt");
    assert!((detection.confidence - 0.55).abs() < 1e-6);
}

#[tokio::test]
async fn given_single_mode_when_unloading_then_refused() {
    let engine = Engine::BatchOnly(Box::new(FakeEngine::new(Arc::new(EngineLog::default()))));
    let container = ModelContainer::from_engine(engine, normalizer(), plain_router());

    assert!(!container.unload_engine(&LanguageTag::new("en")));
    assert!(!container.is_multi());
}
