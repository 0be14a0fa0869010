use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::{Engine, EngineError, LanguageDetector};
use crate::domain::{LanguageDetection, LanguageTag, PcmAudio};

use super::engine_call::bounded;

/// Resolves the `auto` language either through a dedicated detector or the engine itself.
pub struct LanguageRouter {
    detector: Option<Arc<dyn LanguageDetector>>,
    default_lang: LanguageTag,
    call_timeout: Option<Duration>,
}

impl LanguageRouter {
    pub fn new(detector: Option<Arc<dyn LanguageDetector>>, default_lang: LanguageTag) -> Self {
        Self {
            detector,
            default_lang,
            call_timeout: None,
        }
    }

    pub fn with_call_timeout(mut self, limit: Option<Duration>) -> Self {
        self.call_timeout = limit;
        self
    }

    pub fn default_lang(&self) -> &LanguageTag {
        &self.default_lang
    }

    /// Detects the spoken language.
    ///
    /// A single-member `allow_list` is answered directly with full confidence.
    /// Without a dedicated detector, `engine` is asked to self-detect.
    pub async fn detect(
        &self,
        audio: &PcmAudio,
        allow_list: &[LanguageTag],
        engine: Option<&Engine>,
    ) -> Result<LanguageDetection, EngineError> {
        if let [only] = allow_list {
            tracing::debug!(lang = %only, "Single candidate language, skipping detection");
            return Ok(LanguageDetection::certain(only.clone()));
        }

        if audio.is_empty() {
            return Err(EngineError::DetectionFailed("no audio to analyse".to_string()));
        }

        let detection = match (&self.detector, engine) {
            (Some(detector), _) => {
                bounded(self.call_timeout, detector.detect(audio, allow_list)).await?
            }
            (None, Some(engine)) => {
                bounded(self.call_timeout, engine.detect_language(audio, allow_list)).await?
            }
            (None, None) => return Err(EngineError::DetectionUnsupported),
        };

        let detection = restrict_to(detection, allow_list)?;

        tracing::info!(
            lang = %detection.lang,
            confidence = detection.confidence,
            "Language detected"
        );

        Ok(detection)
    }

    /// Like [`detect`](Self::detect) but degrades to the default language with zero confidence.
    pub async fn detect_or_default(
        &self,
        audio: &PcmAudio,
        allow_list: &[LanguageTag],
        engine: Option<&Engine>,
    ) -> LanguageDetection {
        match self.detect(audio, allow_list, engine).await {
            Ok(detection) => detection,
            Err(e) => {
                let fallback = self.fallback_lang(allow_list);
                tracing::warn!(
                    error = %e,
                    fallback = %fallback,
                    "Language detection failed, using fallback language"
                );
                LanguageDetection::new(fallback, 0.0)
            }
        }
    }

    /// Picks the language for an `auto` request.
    ///
    /// When neither a detector nor a self-detecting engine is available but an
    /// engine is present, `auto` is kept so the backend decides. Other failures
    /// fall back to the default language.
    pub async fn resolve_auto(&self, audio: &PcmAudio, engine: Option<&Engine>) -> LanguageTag {
        match self.detect(audio, &[], engine).await {
            Ok(detection) => detection.lang,
            Err(EngineError::DetectionUnsupported) if engine.is_some() => {
                tracing::debug!("No language detector available, leaving detection to the engine");
                LanguageTag::auto()
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    fallback = %self.default_lang,
                    "Language detection failed"
                );
                self.default_lang.clone()
            }
        }
    }

    fn fallback_lang(&self, allow_list: &[LanguageTag]) -> LanguageTag {
        if allow_list.is_empty() {
            return self.default_lang.clone();
        }
        match_allowed(&self.default_lang, allow_list)
            .unwrap_or_else(|| allow_list[0].clone())
    }
}

fn restrict_to(
    detection: LanguageDetection,
    allow_list: &[LanguageTag],
) -> Result<LanguageDetection, EngineError> {
    if allow_list.is_empty() {
        return Ok(detection);
    }

    match match_allowed(&detection.lang, allow_list) {
        Some(lang) => Ok(LanguageDetection::new(lang, detection.confidence)),
        None => Err(EngineError::DetectionFailed(format!(
            "detected language {} is not among the allowed languages",
            detection.lang
        ))),
    }
}

fn match_allowed(lang: &LanguageTag, allow_list: &[LanguageTag]) -> Option<LanguageTag> {
    allow_list
        .iter()
        .find(|allowed| *allowed == lang)
        .or_else(|| {
            allow_list
                .iter()
                .find(|allowed| allowed.primary_subtag() == lang.primary_subtag())
        })
        .cloned()
}
