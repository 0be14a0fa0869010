use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use serde::Deserialize;

use crate::infrastructure::observability::preview_transcript;
use crate::presentation::state::AppState;

use super::error_response::model_error_response;

#[derive(Debug, Deserialize)]
pub struct SttQuery {
    pub lang: Option<String>,
}

#[tracing::instrument(skip(state, body), fields(bytes = body.len()))]
pub async fn stt_handler(
    State(state): State<AppState>,
    Query(query): Query<SttQuery>,
    body: Bytes,
) -> impl IntoResponse {
    let lang = state.lang_or_default(query.lang.as_deref());

    match state.models.process_audio(&body, &lang).await {
        Ok(transcription) => {
            tracing::info!(
                lang = %transcription.lang,
                transcript = %preview_transcript(&transcription.text),
                "Transcription completed"
            );
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                transcription.text,
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(lang = %lang, error = %e, "Engine unavailable");
            model_error_response(&e)
        }
    }
}
