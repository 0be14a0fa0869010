mod error_response;
mod lang_detect;
mod status;
mod stream;
mod stt;

pub use error_response::ErrorResponse;
pub use lang_detect::{LangDetectQuery, LangDetectResponse, lang_detect_handler};
pub use status::{StatusResponse, status_handler};
pub use stream::{
    StreamQuery, StreamStartResponse, StreamTranscriptResponse, stream_audio_handler,
    stream_end_handler, stream_start_handler,
};
pub use stt::{SttQuery, stt_handler};
