//! Client for a self-hosted speech model server.
//!
//! The server exposes an OpenAI-style transcription endpoint backed by a
//! Whisper model, plus a synthesis endpoint that returns raw float samples
//! so the caller decides how the waveform is stored.

use super::{
    ensure_success, AdapterError, RecognitionRequest, RecognizedSpeech, SpeechRecognizer, SpeechSegment,
    SpeechSynthesizer, SynthesisRequest, Waveform,
};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

const STT_ENDPOINT: &str = "v1/audio/transcriptions";
const TTS_ENDPOINT: &str = "v1/text-to-speech";

/// Reported when the model does not say which language it heard.
const UNKNOWN_LANGUAGE: &str = "unknown";

#[derive(Debug, Clone)]
pub struct SpeechServiceClient {
    client: Client,
    base_url: String,
    stt_model: String,
    timeout: Duration,
}

impl SpeechServiceClient {
    pub fn new(base_url: &str, stt_model: &str, timeout: Duration) -> Result<Self, AdapterError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            stt_model: stt_model.to_string(),
            timeout,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }
}

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    segments: Vec<SpeechSegment>,
}

#[derive(Debug, Serialize)]
struct SynthesisBody<'a> {
    text: &'a str,
    speaker_embedding: &'a [f32],
    vocoder: &'a str,
}

#[derive(Debug, Deserialize)]
struct SynthesisResponse {
    samples: Vec<f32>,
    sample_rate: u32,
}

#[async_trait]
impl SpeechRecognizer for SpeechServiceClient {
    #[instrument(skip(self, request), fields(path = %request.audio_path.display(), language = ?request.language))]
    async fn recognize(&self, request: RecognitionRequest<'_>) -> Result<RecognizedSpeech, AdapterError> {
        let data = tokio::fs::read(request.audio_path).await.map_err(|e| AdapterError::Request {
            endpoint: STT_ENDPOINT.to_string(),
            message: format!("failed to read {}: {}", request.audio_path.display(), e),
        })?;

        let filename = request
            .audio_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_string());

        let file_part = Part::bytes(data)
            .file_name(filename)
            .mime_str("application/octet-stream")
            .map_err(|e| AdapterError::Configuration(format!("Invalid MIME type: {}", e)))?;

        let mut form = Form::new()
            .part("file", file_part)
            .text("model", self.stt_model.clone())
            .text("response_format", "verbose_json")
            .text("beam_size", request.beam_size.to_string())
            .text("vad_filter", request.vad_filter.to_string())
            .text("min_silence_duration_ms", request.min_silence_ms.to_string());
        if let Some(language) = request.language {
            form = form.text("language", language.to_string());
        }

        let response = self
            .client
            .post(self.url(STT_ENDPOINT))
            .multipart(form)
            .send()
            .await
            .map_err(|e| AdapterError::from_reqwest(STT_ENDPOINT, self.timeout, e))?;

        let parsed: VerboseTranscription = ensure_success(STT_ENDPOINT, response)
            .await?
            .json()
            .await
            .map_err(|e| AdapterError::invalid(STT_ENDPOINT, e.to_string()))?;

        // The caller's hint is not a detection result.
        let language = parsed
            .language
            .filter(|language| !language.is_empty())
            .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string());

        debug!(segments = parsed.segments.len(), language = %language, "Speech recognized");
        Ok(RecognizedSpeech { language, segments: parsed.segments })
    }
}

#[async_trait]
impl SpeechSynthesizer for SpeechServiceClient {
    #[instrument(skip(self, request), fields(text_len = request.text.len(), vocoder = %request.vocoder))]
    async fn synthesize(&self, request: SynthesisRequest<'_>) -> Result<Waveform, AdapterError> {
        let body = SynthesisBody {
            text: request.text,
            speaker_embedding: request.speaker_embedding,
            vocoder: request.vocoder,
        };

        let response = self
            .client
            .post(self.url(TTS_ENDPOINT))
            .json(&body)
            .send()
            .await
            .map_err(|e| AdapterError::from_reqwest(TTS_ENDPOINT, self.timeout, e))?;

        let parsed: SynthesisResponse = ensure_success(TTS_ENDPOINT, response)
            .await?
            .json()
            .await
            .map_err(|e| AdapterError::invalid(TTS_ENDPOINT, e.to_string()))?;

        if parsed.samples.is_empty() {
            return Err(AdapterError::invalid(TTS_ENDPOINT, "synthesized waveform is empty"));
        }

        debug!(samples = parsed.samples.len(), sample_rate = parsed.sample_rate, "Speech synthesized");
        Ok(Waveform { samples: parsed.samples, sample_rate: parsed.sample_rate })
    }
}
