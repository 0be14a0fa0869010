use async_trait::async_trait;
use reqwest::multipart;

use crate::application::ports::{EngineConfig, EngineError, SpeechEngine};
use crate::domain::{LanguageTag, PcmAudio};

use super::wav_encoder::encode_wav;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "whisper-1";

/// Any OpenAI-compatible `/audio/transcriptions` endpoint.
pub struct OpenAiWhisperEngine {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    lang: LanguageTag,
}

impl OpenAiWhisperEngine {
    pub fn new(api_key: String, base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            lang: LanguageTag::auto(),
        }
    }

    /// Options: `api_key` (or `OPENAI_API_KEY`), `base_url`, `model`.
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let api_key = config
            .option_or_env("api_key", "OPENAI_API_KEY")
            .ok_or_else(|| {
                EngineError::InitFailed("API key required for OpenAI Whisper".to_string())
            })?;

        let mut engine = Self::new(
            api_key,
            config.option("base_url").map(str::to_string),
            config.option("model").map(str::to_string),
        );
        engine.lang = config.lang.clone();
        Ok(engine)
    }
}

#[async_trait]
impl SpeechEngine for OpenAiWhisperEngine {
    async fn execute(&self, audio: &PcmAudio, lang: &LanguageTag) -> Result<String, EngineError> {
        let url = format!("{}/audio/transcriptions", self.base_url);
        let lang = if lang.is_auto() { &self.lang } else { lang };

        let file_part = multipart::Part::bytes(encode_wav(audio)?)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| EngineError::RecognitionFailed(format!("mime: {}", e)))?;

        let mut form = multipart::Form::new()
            .text("model", self.model.clone())
            .text("response_format", "text")
            .part("file", file_part);

        // The API detects the language itself when none is given.
        if !lang.is_auto() {
            form = form.text("language", lang.primary_subtag().to_string());
        }

        tracing::debug!(model = %self.model, lang = %lang, "Sending audio to OpenAI Whisper API");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| EngineError::RecognitionFailed(format!("request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(EngineError::RecognitionFailed(format!(
                "status {}: {}",
                status, body
            )));
        }

        let transcript = response
            .text()
            .await
            .map_err(|e| EngineError::RecognitionFailed(format!("body: {}", e)))?;

        tracing::info!(
            chars = transcript.len(),
            "OpenAI Whisper transcription completed"
        );

        Ok(transcript.trim().to_string())
    }
}
