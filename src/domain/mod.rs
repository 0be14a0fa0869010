mod language_detection;
mod language_tag;
mod pcm_audio;
mod session_id;
mod session_state;

pub use language_detection::LanguageDetection;
pub use language_tag::LanguageTag;
pub use pcm_audio::{CANONICAL_SAMPLE_RATE, PcmAudio, RawPcmFormat};
pub use session_id::SessionId;
pub use session_state::SessionState;
