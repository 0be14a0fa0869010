use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;

use stt_gateway::application::ports::{AudioNormalizer, EngineConfig};
use stt_gateway::application::services::{
    LanguageRouter, ModelContainer, PluginRegistry, SessionManager, SessionManagerConfig,
};
use stt_gateway::infrastructure::audio::{SymphoniaNormalizer, register_builtin_plugins};
use stt_gateway::infrastructure::observability::{TracingConfig, init_tracing};
use stt_gateway::presentation::{AppState, CliArgs, Environment, create_router, load_settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = CliArgs::parse();

    let environment = Environment::from_env().map_err(anyhow::Error::msg)?;
    let mut settings = load_settings(environment).context("Failed to load settings")?;
    cli.apply(&mut settings);

    init_tracing(
        TracingConfig {
            environment: environment.to_string(),
            level: settings.logging.level.clone(),
            json_format: settings.logging.json,
        },
        settings.server.port,
    );

    let mut registry = PluginRegistry::new();
    register_builtin_plugins(&mut registry);

    let engine_plugin = registry.load_engine(&settings.engine.plugin)?;
    let detector = match settings.engine.detector.as_deref() {
        Some(id) => {
            let plugin = registry.load_detector(id)?;
            let detector = plugin
                .instantiate(settings.detector_options.clone())
                .await
                .with_context(|| format!("Failed to load language detector {}", id))?;
            Some(detector)
        }
        None => None,
    };

    let default_lang = settings.engine.default_lang();
    let call_timeout = settings.recognition.engine_timeout();
    let router = Arc::new(
        LanguageRouter::new(detector, default_lang.clone()).with_call_timeout(call_timeout),
    );

    let base_config = EngineConfig::new(default_lang.clone())
        .with_stream_format(settings.streaming.format())
        .with_options(settings.engine.options.clone());
    let normalizer: Arc<dyn AudioNormalizer> = Arc::new(SymphoniaNormalizer);

    let models = if settings.engine.multi {
        ModelContainer::multi(
            engine_plugin.clone(),
            base_config.clone(),
            Arc::clone(&normalizer),
            Arc::clone(&router),
        )
    } else {
        ModelContainer::single(
            &engine_plugin,
            base_config.clone(),
            Arc::clone(&normalizer),
            Arc::clone(&router),
        )
        .await
        .with_context(|| format!("Failed to load engine {}", engine_plugin.id()))?
    };
    let models = Arc::new(models.with_call_timeout(call_timeout));

    let sessions = Arc::new(SessionManager::new(
        engine_plugin,
        base_config,
        Arc::clone(&router),
        SessionManagerConfig {
            max_sessions: settings.streaming.max_sessions,
            idle_timeout: std::time::Duration::from_secs(settings.streaming.idle_timeout_secs),
            cleanup_interval: std::time::Duration::from_secs(
                settings.streaming.cleanup_interval_secs.max(1),
            ),
            call_timeout,
        },
    ));
    let reaper_shutdown = sessions.start_cleanup_task();

    tracing::info!(
        plugin = %settings.engine.plugin,
        detector = ?settings.engine.detector,
        default_lang = %default_lang,
        multi = settings.engine.multi,
        "Engines ready"
    );

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("Invalid listen address")?;

    let state = AppState::new(models, sessions, settings);
    let router = create_router(state);

    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reaper_shutdown.send(true).ok();
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
