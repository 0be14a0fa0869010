use std::sync::Arc;

use crate::application::services::{ModelContainer, SessionManager};
use crate::domain::LanguageTag;
use crate::presentation::config::Settings;

/// Everything the handlers need, built once in `main` and cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub models: Arc<ModelContainer>,
    pub sessions: Arc<SessionManager>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(models: Arc<ModelContainer>, sessions: Arc<SessionManager>, settings: Settings) -> Self {
        Self {
            models,
            sessions,
            settings: Arc::new(settings),
        }
    }

    pub fn default_lang(&self) -> LanguageTag {
        self.settings.engine.default_lang()
    }

    /// The requested language, or the configured default when absent or blank.
    pub fn lang_or_default(&self, lang: Option<&str>) -> LanguageTag {
        match lang.map(str::trim).filter(|l| !l.is_empty()) {
            Some(lang) => LanguageTag::new(lang),
            None => self.default_lang(),
        }
    }
}
