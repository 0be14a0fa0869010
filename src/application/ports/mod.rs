mod audio_normalizer;
mod language_detector;
mod speech_engine;

pub use audio_normalizer::{AudioDecodeError, AudioNormalizer};
pub use language_detector::LanguageDetector;
pub use speech_engine::{Engine, EngineConfig, EngineError, SpeechEngine, StreamingSpeechEngine};
