use async_trait::async_trait;

use crate::domain::{LanguageDetection, LanguageTag, PcmAudio};

use super::EngineError;

/// A dedicated spoken-language identifier.
///
/// A non-empty `allow_list` restricts the answer to one of its members.
#[async_trait]
pub trait LanguageDetector: Send + Sync {
    async fn detect(
        &self,
        audio: &PcmAudio,
        allow_list: &[LanguageTag],
    ) -> Result<LanguageDetection, EngineError>;
}
