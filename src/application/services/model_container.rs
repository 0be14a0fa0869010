use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::application::ports::{AudioNormalizer, Engine, EngineConfig, EngineError};
use crate::domain::{CANONICAL_SAMPLE_RATE, LanguageDetection, LanguageTag, PcmAudio};

use super::engine_call::bounded;
use super::{EnginePlugin, LanguageRouter};

type EngineSlot = Arc<OnceCell<Arc<Engine>>>;

enum Engines {
    Single(Arc<Engine>),
    Multi {
        plugin: EnginePlugin,
        base_config: EngineConfig,
        slots: Mutex<HashMap<LanguageTag, EngineSlot>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transcription {
    pub text: String,
    pub lang: LanguageTag,
}

impl Transcription {
    fn empty(lang: LanguageTag) -> Self {
        Self {
            text: String::new(),
            lang,
        }
    }
}

/// Batch recognition front: owns one engine, or one engine per language key.
pub struct ModelContainer {
    engines: Engines,
    normalizer: Arc<dyn AudioNormalizer>,
    router: Arc<LanguageRouter>,
    call_timeout: Option<Duration>,
}

impl ModelContainer {
    /// Builds the process-wide engine up front; a construction failure is returned to the caller.
    pub async fn single(
        plugin: &EnginePlugin,
        config: EngineConfig,
        normalizer: Arc<dyn AudioNormalizer>,
        router: Arc<LanguageRouter>,
    ) -> Result<Self, EngineError> {
        let engine = plugin.instantiate(config).await?;
        Ok(Self::from_engine(engine, normalizer, router))
    }

    /// Wraps an already constructed engine in single-instance mode.
    pub fn from_engine(
        engine: Engine,
        normalizer: Arc<dyn AudioNormalizer>,
        router: Arc<LanguageRouter>,
    ) -> Self {
        Self {
            engines: Engines::Single(Arc::new(engine)),
            normalizer,
            router,
            call_timeout: None,
        }
    }

    /// Engines are created lazily per language from `base_config` with the language swapped in.
    pub fn multi(
        plugin: EnginePlugin,
        base_config: EngineConfig,
        normalizer: Arc<dyn AudioNormalizer>,
        router: Arc<LanguageRouter>,
    ) -> Self {
        Self {
            engines: Engines::Multi {
                plugin,
                base_config,
                slots: Mutex::new(HashMap::new()),
            },
            normalizer,
            router,
            call_timeout: None,
        }
    }

    pub fn with_call_timeout(mut self, limit: Option<Duration>) -> Self {
        self.call_timeout = limit;
        self
    }

    pub fn is_multi(&self) -> bool {
        matches!(self.engines, Engines::Multi { .. })
    }

    /// Returns the engine serving `lang`.
    ///
    /// Multi mode looks up the exact tag, then the primary subtag, and otherwise
    /// constructs an engine for the exact tag. Concurrent first requests for a key
    /// share one construction.
    pub async fn get_engine(&self, lang: &LanguageTag) -> Result<Arc<Engine>, ModelContainerError> {
        let (plugin, base_config, slots) = match &self.engines {
            Engines::Single(engine) => return Ok(Arc::clone(engine)),
            Engines::Multi {
                plugin,
                base_config,
                slots,
            } => (plugin, base_config, slots),
        };

        let (key, slot) = {
            let mut slots = slots.lock();
            let existing = lang
                .lookup_keys()
                .into_iter()
                .find_map(|key| slots.get(&key).map(|slot| (key, Arc::clone(slot))));

            match existing {
                Some(found) => found,
                None => {
                    let slot: EngineSlot = Arc::new(OnceCell::new());
                    slots.insert(lang.clone(), Arc::clone(&slot));
                    (lang.clone(), slot)
                }
            }
        };

        // A failed init leaves the cell empty in place; the next caller retries in the same slot.
        slot.get_or_try_init(|| async {
            let mut config = base_config.clone();
            config.lang = key.clone();
            plugin.instantiate(config).await.map(Arc::new)
        })
        .await
        .map(Arc::clone)
        .map_err(|e| {
            tracing::error!(lang = %key, error = %e, "Engine construction failed");
            ModelContainerError::EngineInit(e)
        })
    }

    /// Drops the engine registered under exactly `lang`. The next request rebuilds it.
    pub fn unload_engine(&self, lang: &LanguageTag) -> bool {
        match &self.engines {
            Engines::Single(_) => {
                tracing::warn!(lang = %lang, "Single-instance engine cannot be unloaded");
                false
            }
            Engines::Multi { slots, .. } => {
                let removed = slots.lock().remove(lang).is_some();
                if removed {
                    tracing::info!(lang = %lang, "Engine unloaded");
                }
                removed
            }
        }
    }

    pub fn loaded_languages(&self) -> Vec<LanguageTag> {
        match &self.engines {
            Engines::Single(_) => Vec::new(),
            Engines::Multi { slots, .. } => {
                let mut langs: Vec<LanguageTag> = slots
                    .lock()
                    .iter()
                    .filter(|(_, slot)| slot.initialized())
                    .map(|(lang, _)| lang.clone())
                    .collect();
                langs.sort();
                langs
            }
        }
    }

    /// Decodes and transcribes an encoded payload.
    ///
    /// Undecodable audio and engine failures yield an empty transcript; only
    /// engine construction failures are returned as errors.
    pub async fn process_audio(
        &self,
        data: &[u8],
        lang: &LanguageTag,
    ) -> Result<Transcription, ModelContainerError> {
        let audio = match self.normalizer.normalize(data) {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(error = %e, bytes = data.len(), "Audio normalization failed");
                return Ok(Transcription::empty(lang.clone()));
            }
        };

        self.transcribe(&audio, lang).await
    }

    pub async fn transcribe(
        &self,
        audio: &PcmAudio,
        lang: &LanguageTag,
    ) -> Result<Transcription, ModelContainerError> {
        let lang = if lang.is_auto() {
            let engine = self.single_engine();
            self.router.resolve_auto(audio, engine.as_deref()).await
        } else {
            lang.clone()
        };

        let engine = self.get_engine(&lang).await?;

        let text = match bounded(self.call_timeout, engine.execute(audio, &lang)).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(lang = %lang, error = %e, "Recognition failed");
                String::new()
            }
        };

        tracing::info!(
            lang = %lang,
            duration_secs = audio.duration_secs(),
            chars = text.len(),
            "Batch transcription completed"
        );

        Ok(Transcription { text, lang })
    }

    /// Language identification for an encoded payload, degrading to the default language.
    pub async fn detect(&self, data: &[u8], allow_list: &[LanguageTag]) -> LanguageDetection {
        let audio = self.normalizer.normalize(data).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Audio normalization failed before detection");
            PcmAudio::new(Vec::new(), CANONICAL_SAMPLE_RATE)
        });

        let engine = self.single_engine();
        self.router
            .detect_or_default(&audio, allow_list, engine.as_deref())
            .await
    }

    fn single_engine(&self) -> Option<Arc<Engine>> {
        match &self.engines {
            Engines::Single(engine) => Some(Arc::clone(engine)),
            Engines::Multi { .. } => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelContainerError {
    #[error("engine unavailable: {0}")]
    EngineInit(EngineError),
}
