use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use crate::domain::LanguageTag;
use crate::presentation::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LangDetectQuery {
    /// Comma separated allow-list.
    pub valid_langs: Option<String>,
}

#[derive(Serialize)]
pub struct LangDetectResponse {
    pub lang: String,
    pub conf: f32,
}

#[tracing::instrument(skip(state, body), fields(bytes = body.len()))]
pub async fn lang_detect_handler(
    State(state): State<AppState>,
    Query(query): Query<LangDetectQuery>,
    body: Bytes,
) -> impl IntoResponse {
    let allow_list = query
        .valid_langs
        .as_deref()
        .map(LanguageTag::parse_list)
        .unwrap_or_default();

    let detection = state.models.detect(&body, &allow_list).await;

    tracing::info!(
        lang = %detection.lang,
        confidence = detection.confidence,
        "Language detected"
    );

    (
        StatusCode::OK,
        Json(LangDetectResponse {
            lang: detection.lang.as_str().to_string(),
            conf: detection.confidence,
        }),
    )
}
