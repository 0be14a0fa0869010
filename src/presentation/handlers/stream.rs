use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use crate::application::services::StreamUpdate;
use crate::domain::SessionId;
use crate::infrastructure::observability::preview_transcript;
use crate::presentation::state::AppState;

use super::error_response::session_error_response;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub uuid: Option<String>,
    pub lang: Option<String>,
}

impl StreamQuery {
    /// Sessions opened without a `uuid` are keyed by their language.
    fn session_id(&self, state: &AppState) -> SessionId {
        match self.uuid.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => SessionId::new(id),
            None => SessionId::from_language(&state.lang_or_default(self.lang.as_deref())),
        }
    }
}

#[derive(Serialize)]
pub struct StreamStartResponse {
    pub status: String,
    pub uuid: String,
    pub lang: String,
}

#[derive(Serialize)]
pub struct StreamTranscriptResponse {
    pub status: String,
    pub uuid: String,
    pub lang: String,
    pub transcript: String,
}

impl From<StreamUpdate> for StreamTranscriptResponse {
    fn from(update: StreamUpdate) -> Self {
        Self {
            status: "ok".to_string(),
            uuid: update.id.as_str().to_string(),
            lang: update.lang.as_str().to_string(),
            transcript: update.transcript,
        }
    }
}

#[tracing::instrument(skip(state))]
pub async fn stream_start_handler(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> impl IntoResponse {
    let id = query.session_id(&state);
    let lang = state.lang_or_default(query.lang.as_deref());

    match state.sessions.start(&id, &lang).await {
        Ok(update) => (
            StatusCode::OK,
            Json(StreamStartResponse {
                status: "ok".to_string(),
                uuid: update.id.as_str().to_string(),
                lang: update.lang.as_str().to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(session = %id, error = %e, "Failed to start stream");
            session_error_response(&id, &e)
        }
    }
}

#[tracing::instrument(skip(state, body), fields(bytes = body.len()))]
pub async fn stream_audio_handler(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    body: Bytes,
) -> impl IntoResponse {
    let id = query.session_id(&state);

    match state.sessions.feed(&id, &body).await {
        Ok(update) => (
            StatusCode::OK,
            Json(StreamTranscriptResponse::from(update)),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(session = %id, error = %e, "Rejected stream chunk");
            session_error_response(&id, &e)
        }
    }
}

#[tracing::instrument(skip(state))]
pub async fn stream_end_handler(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> impl IntoResponse {
    let id = query.session_id(&state);

    match state.sessions.stop(&id).await {
        Ok(update) => {
            tracing::info!(
                session = %id,
                transcript = %preview_transcript(&update.transcript),
                "Stream finished"
            );
            (
                StatusCode::OK,
                Json(StreamTranscriptResponse::from(update)),
            )
                .into_response()
        }
        Err(e) => {
            tracing::warn!(session = %id, error = %e, "Failed to end stream");
            session_error_response(&id, &e)
        }
    }
}
