use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use crate::presentation::state::AppState;

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub plugin: String,
    pub lang_plugin: Option<String>,
    pub gradio: bool,
}

pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let engine = &state.settings.engine;
    (
        StatusCode::OK,
        Json(StatusResponse {
            status: "ok".to_string(),
            plugin: engine.plugin.clone(),
            lang_plugin: engine.detector.clone(),
            gradio: state.settings.server.ui_enabled,
        }),
    )
}
