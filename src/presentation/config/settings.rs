use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment as EnvironmentSource, File};
use serde::Deserialize;

use crate::domain::{LanguageTag, RawPcmFormat};

use super::Environment;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub detector_options: HashMap<String, String>,
    #[serde(default)]
    pub streaming: StreamingSettings,
    #[serde(default)]
    pub recognition: RecognitionSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub ui_enabled: bool,
    pub max_body_mb: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            ui_enabled: false,
            max_body_mb: 50,
        }
    }
}

impl ServerSettings {
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_mb.saturating_mul(1024 * 1024)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub plugin: String,
    pub detector: Option<String>,
    pub default_lang: String,
    pub multi: bool,
    pub options: HashMap<String, String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            plugin: "whisper-local".to_string(),
            detector: None,
            default_lang: "en-us".to_string(),
            multi: false,
            options: HashMap::new(),
        }
    }
}

impl EngineSettings {
    pub fn default_lang(&self) -> LanguageTag {
        LanguageTag::new(&self.default_lang)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    pub sample_rate: u32,
    pub channels: u16,
    pub idle_timeout_secs: u64,
    pub cleanup_interval_secs: u64,
    pub max_sessions: usize,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            idle_timeout_secs: 300,
            cleanup_interval_secs: 30,
            max_sessions: 64,
        }
    }
}

impl StreamingSettings {
    pub fn format(&self) -> RawPcmFormat {
        RawPcmFormat::new(self.sample_rate, self.channels)
    }
}

/// Engine calls run unbounded unless `engine_timeout_secs` is set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RecognitionSettings {
    pub engine_timeout_secs: Option<u64>,
}

impl RecognitionSettings {
    pub fn engine_timeout(&self) -> Option<Duration> {
        self.engine_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Loads settings from the working directory.
///
/// Priority (highest to lowest):
/// 1. `APP__SECTION__KEY` environment variables
/// 2. `appsettings.{environment}.toml`
/// 3. built-in defaults
pub fn load_settings(environment: Environment) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("."), environment)
}

pub fn load_settings_from(dir: &Path, environment: Environment) -> Result<Settings, ConfigError> {
    let file = dir.join(format!("appsettings.{}", environment.file_suffix()));

    let configuration = Config::builder()
        .add_source(File::with_name(&file.to_string_lossy()).required(false))
        .add_source(EnvironmentSource::with_prefix("APP").separator("__"))
        .build()?;

    configuration.try_deserialize()
}
