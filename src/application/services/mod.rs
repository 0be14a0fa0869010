mod engine_call;
mod language_router;
mod model_container;
mod plugin_registry;
mod session_manager;

pub use language_router::LanguageRouter;
pub use model_container::{ModelContainer, ModelContainerError, Transcription};
pub use plugin_registry::{
    DetectorConstructor, DetectorPlugin, EngineConstructor, EnginePlugin, PluginError, PluginKind,
    PluginRegistry,
};
pub use session_manager::{SessionError, SessionManager, SessionManagerConfig, StreamUpdate};
