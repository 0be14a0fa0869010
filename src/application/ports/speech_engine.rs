use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{LanguageDetection, LanguageTag, PcmAudio, RawPcmFormat};

/// Whole-utterance recognition. Every engine supports this.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    async fn execute(&self, audio: &PcmAudio, lang: &LanguageTag) -> Result<String, EngineError>;

    /// Engines with an embedded language identifier override this.
    async fn detect_language(
        &self,
        _audio: &PcmAudio,
        _allow_list: &[LanguageTag],
    ) -> Result<LanguageDetection, EngineError> {
        Err(EngineError::DetectionUnsupported)
    }
}

/// Incremental recognition over raw PCM chunks in the configured stream format.
#[async_trait]
pub trait StreamingSpeechEngine: SpeechEngine {
    async fn stream_start(&mut self) -> Result<(), EngineError>;

    /// Returns the partial transcript produced by this chunk, possibly empty.
    async fn stream_data(&mut self, chunk: &[u8]) -> Result<String, EngineError>;

    async fn stream_stop(&mut self) -> Result<String, EngineError>;
}

/// An engine instance, tagged once at construction with its streaming capability.
pub enum Engine {
    Streaming(Box<dyn StreamingSpeechEngine>),
    BatchOnly(Box<dyn SpeechEngine>),
}

impl Engine {
    pub fn can_stream(&self) -> bool {
        matches!(self, Engine::Streaming(_))
    }

    pub async fn execute(
        &self,
        audio: &PcmAudio,
        lang: &LanguageTag,
    ) -> Result<String, EngineError> {
        match self {
            Engine::Streaming(engine) => engine.execute(audio, lang).await,
            Engine::BatchOnly(engine) => engine.execute(audio, lang).await,
        }
    }

    pub async fn detect_language(
        &self,
        audio: &PcmAudio,
        allow_list: &[LanguageTag],
    ) -> Result<LanguageDetection, EngineError> {
        match self {
            Engine::Streaming(engine) => engine.detect_language(audio, allow_list).await,
            Engine::BatchOnly(engine) => engine.detect_language(audio, allow_list).await,
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Engine::Streaming(_) => f.write_str("Engine::Streaming"),
            Engine::BatchOnly(_) => f.write_str("Engine::BatchOnly"),
        }
    }
}

/// Per-instance configuration handed to an engine constructor.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub lang: LanguageTag,
    pub stream_format: RawPcmFormat,
    pub options: HashMap<String, String>,
}

impl EngineConfig {
    pub fn new(lang: LanguageTag) -> Self {
        Self {
            lang,
            stream_format: RawPcmFormat::default(),
            options: HashMap::new(),
        }
    }

    pub fn with_stream_format(mut self, format: RawPcmFormat) -> Self {
        self.stream_format = format;
        self
    }

    pub fn with_options(mut self, options: HashMap<String, String>) -> Self {
        self.options = options;
        self
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Looks up `key` in the options, then in the environment variable `env_var`.
    pub fn option_or_env(&self, key: &str, env_var: &str) -> Option<String> {
        self.option(key)
            .map(str::to_string)
            .or_else(|| std::env::var(env_var).ok())
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine initialization failed: {0}")]
    InitFailed(String),
    #[error("recognition failed: {0}")]
    RecognitionFailed(String),
    #[error("language detection is not supported by this engine")]
    DetectionUnsupported,
    #[error("language detection failed: {0}")]
    DetectionFailed(String),
    #[error("engine call timed out after {0:?}")]
    Timeout(Duration),
}
