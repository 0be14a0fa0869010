use std::sync::Arc;

use async_trait::async_trait;
use candle_core::{D, Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, Config};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use tokenizers::Tokenizer;
use tokio::sync::Mutex;

use crate::application::ports::{
    EngineConfig, EngineError, LanguageDetector, SpeechEngine, StreamingSpeechEngine,
};
use crate::domain::{CANONICAL_SAMPLE_RATE, LanguageDetection, LanguageTag, PcmAudio, RawPcmFormat};

use super::audio_decoder::resample;

pub const DEFAULT_WHISPER_MODEL: &str = "openai/whisper-tiny";
const MEL_FILTERS_REPO: &str = "FL33TW00D-HF/whisper-base";
const MAX_DECODE_TOKENS: usize = 224;

/// Language codes with a dedicated token in multilingual whisper vocabularies.
const WHISPER_LANGUAGES: &[&str] = &[
    "en", "zh", "de", "es", "ru", "ko", "fr", "ja", "pt", "tr", "pl", "ca", "nl", "ar", "sv", "it",
    "id", "hi", "fi", "vi", "he", "uk", "el", "ms", "cs", "ro", "da", "hu", "ta", "no", "th", "ur",
    "hr", "bg", "lt", "la", "mi", "ml", "cy", "sk", "te", "fa", "lv", "bn", "sr", "az", "sl", "kn",
    "et", "mk", "br", "eu", "is", "hy", "ne", "mn", "bs", "kk", "sq", "sw", "gl", "mr", "pa", "si",
    "km", "sn", "yo", "so", "af", "oc", "ka", "be", "tg", "sd", "gu", "am", "yi", "lo", "uz", "fo",
    "ht", "ps", "tk", "nn", "mt", "sa", "lb", "my", "bo", "tl", "mg", "as", "tt", "haw", "ln", "ha",
    "ba", "jw", "su", "yue",
];

/// Maps a language tag onto whisper's code for it.
fn whisper_code(lang: &LanguageTag) -> &str {
    match lang.primary_subtag() {
        "jv" => "jw",
        "nb" => "no",
        "iw" => "he",
        other => other,
    }
}

/// Whisper weights, tokenizer and special tokens loaded from the Hugging Face hub.
pub struct WhisperModel {
    model: m::model::Whisper,
    tokenizer: Tokenizer,
    config: Config,
    device: Device,
    mel_filters: Vec<f32>,
    sot_token: u32,
    transcribe_token: u32,
    no_timestamps_token: u32,
    eot_token: u32,
}

impl WhisperModel {
    pub fn load(model_id: &str) -> Result<Self, EngineError> {
        let device = Device::Cpu;

        tracing::info!(
            device = ?device,
            model = model_id,
            "Loading whisper weights"
        );

        let api = Api::new().map_err(|e| EngineError::InitFailed(e.to_string()))?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        let config_path = repo
            .get("config.json")
            .map_err(|e| EngineError::InitFailed(format!("config.json: {}", e)))?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| EngineError::InitFailed(format!("tokenizer.json: {}", e)))?;
        let weights_path = repo
            .get("model.safetensors")
            .map_err(|e| EngineError::InitFailed(format!("model.safetensors: {}", e)))?;

        let config_contents = std::fs::read_to_string(&config_path)
            .map_err(|e| EngineError::InitFailed(format!("read config: {}", e)))?;
        let config: Config = serde_json::from_str(&config_contents)
            .map_err(|e| EngineError::InitFailed(format!("parse config: {}", e)))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EngineError::InitFailed(format!("tokenizer: {}", e)))?;

        let mel_file = match config.num_mel_bins {
            128 => "melfilters128.bytes",
            _ => "melfilters.bytes",
        };
        let mel_bytes_path = api
            .repo(Repo::new(MEL_FILTERS_REPO.to_string(), RepoType::Model))
            .get(mel_file)
            .map_err(|e| EngineError::InitFailed(format!("{}: {}", mel_file, e)))?;
        let mel_bytes = std::fs::read(&mel_bytes_path)
            .map_err(|e| EngineError::InitFailed(format!("mel filters: {}", e)))?;
        let mel_filters = read_mel_filters(&mel_bytes, &config)?;

        // SAFETY: safetensors files are memory-mapped read-only
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], m::DTYPE, &device)
                .map_err(|e| EngineError::InitFailed(format!("weights: {}", e)))?
        };

        let model = m::model::Whisper::load(&vb, config.clone())
            .map_err(|e| EngineError::InitFailed(format!("model: {}", e)))?;

        let special = |token: &str| {
            tokenizer
                .token_to_id(token)
                .ok_or_else(|| EngineError::InitFailed(format!("token not found: {}", token)))
        };
        let sot_token = special(m::SOT_TOKEN)?;
        let transcribe_token = special(m::TRANSCRIBE_TOKEN)?;
        let no_timestamps_token = special(m::NO_TIMESTAMPS_TOKEN)?;
        let eot_token = special(m::EOT_TOKEN)?;

        tracing::info!(model = model_id, "Whisper model loaded");

        Ok(Self {
            model,
            tokenizer,
            config,
            device,
            mel_filters,
            sot_token,
            transcribe_token,
            no_timestamps_token,
            eot_token,
        })
    }

    fn language_token(&self, code: &str) -> Option<u32> {
        self.tokenizer.token_to_id(&format!("<|{}|>", code))
    }

    /// Transcribes 16 kHz mono samples in 30 second windows.
    pub fn transcribe(&mut self, pcm: &[f32], code: Option<&str>) -> Result<String, EngineError> {
        let language_token = code.and_then(|c| self.language_token(c));
        let mut segments: Vec<String> = Vec::new();

        for (i, chunk) in pcm.chunks(m::N_SAMPLES).enumerate() {
            let mel = self.mel(chunk).map_err(recognition_failed)?;
            tracing::debug!(segment = i, "Decoding whisper window");
            let text = self.decode_window(&mel, language_token)?;
            if !text.is_empty() {
                segments.push(text);
            }
        }

        Ok(segments.join(" "))
    }

    /// Scores the language tokens of `codes`, or of every known language when empty.
    pub fn detect(&mut self, pcm: &[f32], codes: &[&str]) -> Result<(String, f32), EngineError> {
        let candidates: Vec<&str> = if codes.is_empty() {
            WHISPER_LANGUAGES.to_vec()
        } else {
            codes.to_vec()
        };

        let (known, token_ids): (Vec<&str>, Vec<u32>) = candidates
            .into_iter()
            .filter_map(|code| self.language_token(code).map(|id| (code, id)))
            .unzip();

        if token_ids.is_empty() {
            return Err(EngineError::DetectionFailed(
                "model has no language tokens for the candidates".to_string(),
            ));
        }

        let window = &pcm[..pcm.len().min(m::N_SAMPLES)];
        let probs = self
            .language_probabilities(window, &token_ids)
            .map_err(|e| EngineError::DetectionFailed(e.to_string()))?;
        self.model.reset_kv_cache();

        probs
            .iter()
            .zip(known)
            .max_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(prob, code)| (code.to_string(), *prob))
            .ok_or_else(|| EngineError::DetectionFailed("no language scored".to_string()))
    }

    fn language_probabilities(
        &mut self,
        window: &[f32],
        token_ids: &[u32],
    ) -> candle_core::Result<Vec<f32>> {
        let mel = self.mel(window)?;
        let audio_features = self.model.encoder.forward(&mel, true)?;
        let tokens = Tensor::new(&[[self.sot_token]], &self.device)?;
        let ys = self.model.decoder.forward(&tokens, &audio_features, true)?;
        let logits = self.model.decoder.final_linear(&ys.i(..1)?)?.i(0)?.i(0)?;
        let ids = Tensor::new(token_ids, &self.device)?;
        let logits = logits.index_select(&ids, 0)?;
        candle_nn::ops::softmax(&logits, D::Minus1)?.to_vec1::<f32>()
    }

    fn mel(&self, samples: &[f32]) -> candle_core::Result<Tensor> {
        let mut padded = samples.to_vec();
        padded.resize(m::N_SAMPLES, 0.0);

        let mel_data = m::audio::pcm_to_mel(&self.config, &padded, &self.mel_filters);
        let n_mel = self.config.num_mel_bins;
        let n_frames = mel_data.len() / n_mel;

        Tensor::from_vec(mel_data, (1, n_mel, n_frames), &self.device)
    }

    fn decode_window(
        &mut self,
        mel: &Tensor,
        language_token: Option<u32>,
    ) -> Result<String, EngineError> {
        let audio_features = self
            .model
            .encoder
            .forward(mel, true)
            .map_err(recognition_failed)?;

        let mut tokens = vec![self.sot_token];
        tokens.extend(language_token);
        tokens.push(self.transcribe_token);
        tokens.push(self.no_timestamps_token);
        let prompt_len = tokens.len();

        for step in 0..MAX_DECODE_TOKENS {
            let token_tensor = Tensor::new(tokens.as_slice(), &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(recognition_failed)?;

            let decoder_output = self
                .model
                .decoder
                .forward(&token_tensor, &audio_features, step == 0)
                .map_err(recognition_failed)?;

            let logits = decoder_output
                .squeeze(0)
                .and_then(|o| self.model.decoder.final_linear(&o))
                .map_err(recognition_failed)?;

            let seq_len = logits.dim(0).map_err(recognition_failed)?;
            let next_token = logits
                .get(seq_len - 1)
                .and_then(|l| l.argmax(0))
                .and_then(|t| t.to_scalar::<u32>())
                .map_err(recognition_failed)?;

            if next_token == self.eot_token {
                break;
            }
            tokens.push(next_token);
        }

        self.model.reset_kv_cache();

        let text = self
            .tokenizer
            .decode(&tokens[prompt_len..], true)
            .map_err(|e| EngineError::RecognitionFailed(format!("detokenize: {}", e)))?;

        Ok(text.trim().to_string())
    }
}

fn recognition_failed(e: candle_core::Error) -> EngineError {
    EngineError::RecognitionFailed(e.to_string())
}

fn read_mel_filters(bytes: &[u8], config: &Config) -> Result<Vec<f32>, EngineError> {
    let expected_len = config.num_mel_bins * (m::N_FFT / 2 + 1);
    if bytes.len() < expected_len * 4 {
        return Err(EngineError::InitFailed(format!(
            "mel filters file too small: {} bytes, expected at least {}",
            bytes.len(),
            expected_len * 4
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .take(expected_len)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

fn to_canonical(audio: &PcmAudio) -> Result<Vec<f32>, EngineError> {
    resample(audio.samples(), audio.sample_rate(), CANONICAL_SAMPLE_RATE)
        .map_err(|e| EngineError::RecognitionFailed(e.to_string()))
}

/// Local whisper inference on the CPU.
pub struct CandleWhisperEngine {
    model: Arc<Mutex<WhisperModel>>,
    lang: LanguageTag,
}

impl CandleWhisperEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let model_id = config.option("model").unwrap_or(DEFAULT_WHISPER_MODEL);
        let model = WhisperModel::load(model_id)?;
        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            lang: config.lang.clone(),
        })
    }

    async fn run_blocking<T, F>(&self, job: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&mut WhisperModel) -> Result<T, EngineError> + Send + 'static,
    {
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || {
            let mut model = model.blocking_lock();
            job(&mut model)
        })
        .await
        .map_err(|e| EngineError::RecognitionFailed(format!("whisper worker: {}", e)))?
    }

    /// Transcribes canonical samples, detecting the language first when none is pinned.
    async fn transcribe_samples(
        &self,
        samples: Vec<f32>,
        lang: &LanguageTag,
    ) -> Result<String, EngineError> {
        let lang = if lang.is_auto() { &self.lang } else { lang };
        let code = (!lang.is_auto()).then(|| whisper_code(lang).to_string());

        let transcript = self
            .run_blocking(move |model| {
                let code = match code {
                    Some(code) => Some(code),
                    None => model.detect(&samples, &[]).ok().map(|(code, _)| code),
                };
                model.transcribe(&samples, code.as_deref())
            })
            .await?;

        tracing::info!(
            lang = %lang,
            chars = transcript.len(),
            "Whisper transcription completed"
        );

        Ok(transcript)
    }

    async fn detect_samples(
        &self,
        samples: Vec<f32>,
        allow_list: &[LanguageTag],
    ) -> Result<LanguageDetection, EngineError> {
        let codes: Vec<String> = allow_list
            .iter()
            .map(|lang| whisper_code(lang).to_string())
            .collect();

        let (code, prob) = self
            .run_blocking(move |model| {
                let codes: Vec<&str> = codes.iter().map(String::as_str).collect();
                model.detect(&samples, &codes)
            })
            .await?;

        Ok(LanguageDetection::new(LanguageTag::new(code), prob))
    }
}

#[async_trait]
impl SpeechEngine for CandleWhisperEngine {
    async fn execute(&self, audio: &PcmAudio, lang: &LanguageTag) -> Result<String, EngineError> {
        let samples = to_canonical(audio)?;
        self.transcribe_samples(samples, lang).await
    }

    async fn detect_language(
        &self,
        audio: &PcmAudio,
        allow_list: &[LanguageTag],
    ) -> Result<LanguageDetection, EngineError> {
        let samples = to_canonical(audio)?;
        self.detect_samples(samples, allow_list).await
    }
}

/// Whisper fed incrementally: every full 30 second window is decoded as it arrives.
pub struct CandleWhisperStreamingEngine {
    engine: CandleWhisperEngine,
    format: RawPcmFormat,
    carry: Vec<u8>,
    pending: Vec<f32>,
    segments: Vec<String>,
}

impl CandleWhisperStreamingEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        Ok(Self {
            engine: CandleWhisperEngine::new(config)?,
            format: config.stream_format,
            carry: Vec::new(),
            pending: Vec::new(),
            segments: Vec::new(),
        })
    }

    fn reset(&mut self) {
        self.carry.clear();
        self.pending.clear();
        self.segments.clear();
    }
}

#[async_trait]
impl SpeechEngine for CandleWhisperStreamingEngine {
    async fn execute(&self, audio: &PcmAudio, lang: &LanguageTag) -> Result<String, EngineError> {
        self.engine.execute(audio, lang).await
    }

    async fn detect_language(
        &self,
        audio: &PcmAudio,
        allow_list: &[LanguageTag],
    ) -> Result<LanguageDetection, EngineError> {
        self.engine.detect_language(audio, allow_list).await
    }
}

#[async_trait]
impl StreamingSpeechEngine for CandleWhisperStreamingEngine {
    async fn stream_start(&mut self) -> Result<(), EngineError> {
        self.reset();
        Ok(())
    }

    async fn stream_data(&mut self, chunk: &[u8]) -> Result<String, EngineError> {
        self.carry.extend_from_slice(chunk);
        let whole = self.carry.len() - self.carry.len() % self.format.bytes_per_frame();
        let frames: Vec<u8> = self.carry.drain(..whole).collect();

        let audio = PcmAudio::from_pcm16_le(&frames, self.format);
        self.pending.extend(to_canonical(&audio)?);

        let mut partials: Vec<String> = Vec::new();
        while self.pending.len() >= m::N_SAMPLES {
            let window: Vec<f32> = self.pending.drain(..m::N_SAMPLES).collect();
            let lang = self.engine.lang.clone();
            let text = self.engine.transcribe_samples(window, &lang).await?;
            if !text.is_empty() {
                self.segments.push(text.clone());
                partials.push(text);
            }
        }

        Ok(partials.join(" "))
    }

    async fn stream_stop(&mut self) -> Result<String, EngineError> {
        let remainder = std::mem::take(&mut self.pending);
        if !remainder.is_empty() {
            let lang = self.engine.lang.clone();
            let text = self.engine.transcribe_samples(remainder, &lang).await?;
            if !text.is_empty() {
                self.segments.push(text);
            }
        }

        let transcript = self.segments.join(" ");
        self.reset();
        Ok(transcript)
    }
}

/// Dedicated spoken-language identifier backed by a whisper model.
pub struct WhisperLanguageDetector {
    engine: CandleWhisperEngine,
}

impl WhisperLanguageDetector {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        Ok(Self {
            engine: CandleWhisperEngine::new(config)?,
        })
    }
}

#[async_trait]
impl LanguageDetector for WhisperLanguageDetector {
    async fn detect(
        &self,
        audio: &PcmAudio,
        allow_list: &[LanguageTag],
    ) -> Result<LanguageDetection, EngineError> {
        self.engine.detect_language(audio, allow_list).await
    }
}
