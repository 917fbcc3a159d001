//! # Model Endpoint Adapters
//!
//! Uniform call interfaces to the external models this service depends on.
//! The orchestration components only ever see the traits below, so tests can
//! swap in scripted fakes and deployments can point at any compatible server.
//!
//! ## Adapters:
//! - **TextGenerator**: chat-completion style text generation (quiz, dialog)
//! - **SpeechRecognizer**: speech-to-text with segment timestamps
//! - **SpeechSynthesizer**: text-to-speech returning raw waveform samples
//! - **SentenceSimilarity**: semantic similarity between two sentences
//!
//! Adapters own the timeout boundary (every HTTP client is built with one)
//! and never retry.

pub mod openai_chat;
pub mod similarity;
pub mod speech_service;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub use openai_chat::OpenAiChatClient;
pub use similarity::HfSimilarityClient;
pub use speech_service::SpeechServiceClient;

/// Errors raised by any external model call.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("request to {endpoint} failed: {message}")]
    Request { endpoint: String, message: String },

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status { endpoint: String, status: u16, body: String },

    #[error("invalid response from {endpoint}: {message}")]
    InvalidResponse { endpoint: String, message: String },

    #[error("call to {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    #[error("adapter configuration error: {0}")]
    Configuration(String),
}

impl AdapterError {
    /// Classify a reqwest error for the given endpoint.
    pub(crate) fn from_reqwest(endpoint: &str, timeout: Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout { endpoint: endpoint.to_string(), timeout }
        } else {
            Self::Request { endpoint: endpoint.to_string(), message: err.to_string() }
        }
    }

    pub(crate) fn invalid(endpoint: &str, message: impl Into<String>) -> Self {
        Self::InvalidResponse { endpoint: endpoint.to_string(), message: message.into() }
    }
}

/// Pass successful responses through, turn everything else into `AdapterError::Status`.
pub(crate) async fn ensure_success(
    endpoint: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, AdapterError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AdapterError::Status {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        body,
    })
}

/// A single text-generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            prompt: prompt.into(),
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the generated text, trimmed.
    async fn generate(&self, request: GenerationRequest) -> Result<String, AdapterError>;
}

/// Decoding options for one speech-to-text call.
#[derive(Debug, Clone)]
pub struct RecognitionRequest<'a> {
    pub audio_path: &'a Path,
    /// `None` lets the model auto-detect the language
    pub language: Option<&'a str>,
    pub beam_size: u32,
    pub vad_filter: bool,
    pub min_silence_ms: u32,
}

/// One timed piece of recognized speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct RecognizedSpeech {
    pub language: String,
    pub segments: Vec<SpeechSegment>,
}

#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn recognize(&self, request: RecognitionRequest<'_>) -> Result<RecognizedSpeech, AdapterError>;
}

/// Input for one text-to-speech call.
#[derive(Debug, Clone)]
pub struct SynthesisRequest<'a> {
    pub text: &'a str,
    pub speaker_embedding: &'a [f32],
    pub vocoder: &'a str,
}

/// Mono waveform produced by the speech model.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, request: SynthesisRequest<'_>) -> Result<Waveform, AdapterError>;
}

#[async_trait]
pub trait SentenceSimilarity: Send + Sync {
    /// Similarity score, higher means closer in meaning.
    async fn similarity(&self, sentence: &str, other: &str) -> Result<f32, AdapterError>;
}
