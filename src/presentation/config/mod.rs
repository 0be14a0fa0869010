mod cli;
mod environment;
mod settings;

pub use cli::CliArgs;
pub use environment::Environment;
pub use settings::{
    EngineSettings, LoggingSettings, RecognitionSettings, ServerSettings, Settings,
    StreamingSettings, load_settings, load_settings_from,
};
