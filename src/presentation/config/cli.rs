use clap::Parser;

use super::Settings;

/// Command line overrides applied on top of the loaded settings.
#[derive(Debug, Default, Parser)]
#[command(name = "stt-gateway", version, about = "HTTP gateway for speech-to-text engines")]
pub struct CliArgs {
    /// Speech engine plugin to serve
    #[arg(long)]
    pub engine: Option<String>,

    /// Language detection plugin
    #[arg(long = "lang-engine")]
    pub lang_engine: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long)]
    pub host: Option<String>,

    /// Default language when requests omit one
    #[arg(long)]
    pub lang: Option<String>,

    /// Load an engine instance per language
    #[arg(long)]
    pub multi: bool,

    /// Report the web UI as enabled in /status
    #[arg(long)]
    pub gradio: bool,
}

impl CliArgs {
    pub fn apply(self, settings: &mut Settings) {
        if let Some(engine) = self.engine {
            settings.engine.plugin = engine;
        }
        if let Some(detector) = self.lang_engine {
            settings.engine.detector = Some(detector);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(host) = self.host {
            settings.server.host = host;
        }
        if let Some(lang) = self.lang {
            settings.engine.default_lang = lang;
        }
        if self.multi {
            settings.engine.multi = true;
        }
        if self.gradio {
            settings.server.ui_enabled = true;
        }
    }
}
