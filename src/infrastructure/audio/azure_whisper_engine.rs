use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;

use crate::application::ports::{EngineConfig, EngineError, SpeechEngine};
use crate::domain::{LanguageTag, PcmAudio};

use super::wav_encoder::encode_wav;

const DEFAULT_API_VERSION: &str = "2024-06-01";

/// A whisper deployment on Azure OpenAI.
pub struct AzureWhisperEngine {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    lang: LanguageTag,
}

impl AzureWhisperEngine {
    pub fn new(base_url: &str, deployment: &str, api_key: &str, api_version: &str) -> Self {
        let endpoint = format!(
            "{}/openai/deployments/{}/audio/transcriptions?api-version={}",
            base_url.trim_end_matches('/'),
            deployment,
            api_version,
        );
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key: api_key.to_string(),
            lang: LanguageTag::auto(),
        }
    }

    /// Options: `base_url`, `deployment`, `api_key` (or `AZURE_OPENAI_API_KEY`), `api_version`.
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let required = |key: &str| {
            config
                .option(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| EngineError::InitFailed(format!("Azure Whisper requires `{}`", key)))
        };

        let base_url = required("base_url")?;
        let deployment = required("deployment")?;
        let api_key = config
            .option_or_env("api_key", "AZURE_OPENAI_API_KEY")
            .ok_or_else(|| EngineError::InitFailed("Azure Whisper requires `api_key`".to_string()))?;
        let api_version = config.option("api_version").unwrap_or(DEFAULT_API_VERSION);

        let mut engine = Self::new(base_url, deployment, &api_key, api_version);
        engine.lang = config.lang.clone();
        Ok(engine)
    }
}

#[derive(Deserialize)]
struct AzureTranscriptionResponse {
    text: String,
}

#[async_trait]
impl SpeechEngine for AzureWhisperEngine {
    async fn execute(&self, audio: &PcmAudio, lang: &LanguageTag) -> Result<String, EngineError> {
        let lang = if lang.is_auto() { &self.lang } else { lang };

        let file_part = multipart::Part::bytes(encode_wav(audio)?)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| EngineError::RecognitionFailed(format!("mime: {}", e)))?;

        let mut form = multipart::Form::new().part("file", file_part);
        if !lang.is_auto() {
            form = form.text("language", lang.primary_subtag().to_string());
        }

        tracing::debug!(endpoint = %self.endpoint, lang = %lang, "Sending audio to Azure OpenAI Whisper");

        let response = self
            .client
            .post(&self.endpoint)
            .header("api-key", &self.api_key)
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

        let result: AzureTranscriptionResponse = response
            .json()
            .await
            .map_err(|e| EngineError::RecognitionFailed(format!("parse response: {}", e)))?;

        tracing::info!(
            chars = result.text.len(),
            "Azure OpenAI Whisper transcription completed"
        );

        Ok(result.text.trim().to_string())
    }
}
