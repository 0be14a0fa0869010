use std::sync::Arc;

use crate::application::ports::{Engine, EngineConfig, EngineError, LanguageDetector};
use crate::application::services::PluginRegistry;
use crate::domain::LanguageTag;

use super::azure_whisper_engine::AzureWhisperEngine;
use super::candle_whisper_engine::{
    CandleWhisperEngine, CandleWhisperStreamingEngine, WhisperLanguageDetector,
};
use super::openai_whisper_engine::OpenAiWhisperEngine;

/// Engines compiled into the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinEngine {
    WhisperLocal,
    WhisperLocalStreaming,
    OpenAi,
    Azure,
}

impl BuiltinEngine {
    pub const ALL: [BuiltinEngine; 4] = [
        BuiltinEngine::WhisperLocal,
        BuiltinEngine::WhisperLocalStreaming,
        BuiltinEngine::OpenAi,
        BuiltinEngine::Azure,
    ];

    pub fn id(self) -> &'static str {
        match self {
            BuiltinEngine::WhisperLocal => "whisper-local",
            BuiltinEngine::WhisperLocalStreaming => "whisper-local-streaming",
            BuiltinEngine::OpenAi => "openai-whisper",
            BuiltinEngine::Azure => "azure-whisper",
        }
    }

    pub fn create(self, config: &EngineConfig) -> Result<Engine, EngineError> {
        match self {
            BuiltinEngine::WhisperLocal => {
                let engine = CandleWhisperEngine::new(config)?;
                Ok(Engine::BatchOnly(Box::new(engine)))
            }
            BuiltinEngine::WhisperLocalStreaming => {
                let engine = CandleWhisperStreamingEngine::new(config)?;
                Ok(Engine::Streaming(Box::new(engine)))
            }
            BuiltinEngine::OpenAi => {
                let engine = OpenAiWhisperEngine::from_config(config)?;
                Ok(Engine::BatchOnly(Box::new(engine)))
            }
            BuiltinEngine::Azure => {
                let engine = AzureWhisperEngine::from_config(config)?;
                Ok(Engine::BatchOnly(Box::new(engine)))
            }
        }
    }
}

pub const WHISPER_DETECTOR_ID: &str = "whisper-local";

/// Registers every built-in engine and detector.
pub fn register_builtin_plugins(registry: &mut PluginRegistry) -> &mut PluginRegistry {
    for builtin in BuiltinEngine::ALL {
        registry.register_engine(builtin.id(), move |config| builtin.create(&config));
    }

    registry.register_detector(WHISPER_DETECTOR_ID, |options| {
        let config = EngineConfig::new(LanguageTag::auto()).with_options(options);
        let detector: Arc<dyn LanguageDetector> = Arc::new(WhisperLanguageDetector::new(&config)?);
        Ok(detector)
    })
}
