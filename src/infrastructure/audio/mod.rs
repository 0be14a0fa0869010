mod audio_decoder;
mod azure_whisper_engine;
mod builtin_plugins;
mod candle_whisper_engine;
mod openai_whisper_engine;
mod wav_encoder;

pub use audio_decoder::{SymphoniaNormalizer, resample};
pub use azure_whisper_engine::AzureWhisperEngine;
pub use builtin_plugins::{BuiltinEngine, WHISPER_DETECTOR_ID, register_builtin_plugins};
pub use candle_whisper_engine::{
    CandleWhisperEngine, CandleWhisperStreamingEngine, DEFAULT_WHISPER_MODEL,
    WhisperLanguageDetector, WhisperModel,
};
pub use openai_whisper_engine::OpenAiWhisperEngine;
pub use wav_encoder::encode_wav;
