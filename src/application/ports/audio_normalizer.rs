use crate::domain::PcmAudio;

/// Turns an encoded audio payload into canonical mono PCM.
pub trait AudioNormalizer: Send + Sync {
    fn normalize(&self, data: &[u8]) -> Result<PcmAudio, AudioDecodeError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AudioDecodeError {
    #[error("empty audio payload")]
    EmptyPayload,
    #[error("audio decoding failed: {0}")]
    DecodingFailed(String),
}
