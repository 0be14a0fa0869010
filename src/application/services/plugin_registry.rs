use std::collections::HashMap;
use std::sync::Arc;

use crate::application::ports::{Engine, EngineConfig, EngineError, LanguageDetector};

pub type EngineConstructor =
    Arc<dyn Fn(EngineConfig) -> Result<Engine, EngineError> + Send + Sync>;

pub type DetectorConstructor = Arc<
    dyn Fn(HashMap<String, String>) -> Result<Arc<dyn LanguageDetector>, EngineError>
        + Send
        + Sync,
>;

/// Identifier to constructor table, filled once at startup and read-only afterwards.
#[derive(Default)]
pub struct PluginRegistry {
    engines: HashMap<String, EngineConstructor>,
    detectors: HashMap<String, DetectorConstructor>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_engine<F>(&mut self, id: &str, constructor: F) -> &mut Self
    where
        F: Fn(EngineConfig) -> Result<Engine, EngineError> + Send + Sync + 'static,
    {
        if self
            .engines
            .insert(id.to_string(), Arc::new(constructor))
            .is_some()
        {
            tracing::warn!(plugin = id, "Engine plugin registered twice, keeping the latest");
        }
        self
    }

    pub fn register_detector<F>(&mut self, id: &str, constructor: F) -> &mut Self
    where
        F: Fn(HashMap<String, String>) -> Result<Arc<dyn LanguageDetector>, EngineError>
            + Send
            + Sync
            + 'static,
    {
        if self
            .detectors
            .insert(id.to_string(), Arc::new(constructor))
            .is_some()
        {
            tracing::warn!(plugin = id, "Detector plugin registered twice, keeping the latest");
        }
        self
    }

    pub fn load_engine(&self, id: &str) -> Result<EnginePlugin, PluginError> {
        self.engines
            .get(id)
            .map(|constructor| EnginePlugin {
                id: id.to_string(),
                constructor: Arc::clone(constructor),
            })
            .ok_or_else(|| PluginError::PluginNotFound {
                kind: PluginKind::Engine,
                id: id.to_string(),
                available: self.registered_engines(),
            })
    }

    pub fn load_detector(&self, id: &str) -> Result<DetectorPlugin, PluginError> {
        self.detectors
            .get(id)
            .map(|constructor| DetectorPlugin {
                id: id.to_string(),
                constructor: Arc::clone(constructor),
            })
            .ok_or_else(|| PluginError::PluginNotFound {
                kind: PluginKind::Detector,
                id: id.to_string(),
                available: self.registered_detectors(),
            })
    }

    pub fn registered_engines(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.engines.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn registered_detectors(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.detectors.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// A resolved engine constructor.
#[derive(Clone)]
pub struct EnginePlugin {
    id: String,
    constructor: EngineConstructor,
}

impl EnginePlugin {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Runs the constructor on the blocking pool; weight loading may take seconds.
    pub async fn instantiate(&self, config: EngineConfig) -> Result<Engine, EngineError> {
        let constructor = Arc::clone(&self.constructor);
        tracing::info!(plugin = %self.id, lang = %config.lang, "Instantiating engine");

        tokio::task::spawn_blocking(move || constructor(config))
            .await
            .map_err(|e| {
                EngineError::InitFailed(format!("{} constructor aborted: {}", self.id, e))
            })?
    }
}

/// A resolved detector constructor.
#[derive(Clone)]
pub struct DetectorPlugin {
    id: String,
    constructor: DetectorConstructor,
}

impl DetectorPlugin {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn instantiate(
        &self,
        options: HashMap<String, String>,
    ) -> Result<Arc<dyn LanguageDetector>, EngineError> {
        let constructor = Arc::clone(&self.constructor);
        tracing::info!(plugin = %self.id, "Instantiating language detector");

        tokio::task::spawn_blocking(move || constructor(options))
            .await
            .map_err(|e| {
                EngineError::InitFailed(format!("{} constructor aborted: {}", self.id, e))
            })?
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    Engine,
    Detector,
}

impl std::fmt::Display for PluginKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginKind::Engine => f.write_str("engine"),
            PluginKind::Detector => f.write_str("language detector"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("{kind} plugin not found: {id} (available: {})", .available.join(", "))]
    PluginNotFound {
        kind: PluginKind,
        id: String,
        available: Vec<String>,
    },
}
