//! # Application State Management
//!
//! Shared state handed to every HTTP handler through `web::Data<AppState>`.
//!
//! ## What lives here:
//! - **Configuration**: the effective config, read by handlers and health output
//! - **Metrics**: request counters updated by the metrics middleware
//! - **Services**: the orchestration components, each behind an `Arc`
//!
//! ## Key Rust Concepts:
//!
//! ### Arc<T> for services
//! - The services hold their own internal locks (route cache, session
//!   registry), so the state only needs shared ownership, not a lock
//! - Cloning `AppState` is cheap: it clones a handful of `Arc` pointers
//!
//! ### Arc<RwLock<T>> for metrics
//! - Every request writes to the metrics, health checks read them
//! - Lock poisoning is recovered from instead of panicking; a counter left
//!   half-updated by a panicked thread is still a usable counter

use crate::adapters::{
    HfSimilarityClient, OpenAiChatClient, SentenceSimilarity, SpeechServiceClient, SpeechRecognizer,
    SpeechSynthesizer, TextGenerator,
};
use crate::audio::{AudioArtifactStore, AudioNormalizer};
use crate::config::AppConfig;
use crate::device::create_device_from_string;
use crate::dialog::{DialogManager, DialogSettings};
use crate::quiz::QuizGenerator;
use crate::transcription::{TranscriptionPipeline, TranscriptionSettings};
use crate::translation::{HubMarianLoader, LanguageTag, ResolverSettings, TranslationModelLoader, TranslationResolver};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tracing::info;

/// The orchestration components the handlers call into.
#[derive(Clone)]
pub struct Services {
    pub translation: Arc<TranslationResolver>,
    pub transcription: Arc<TranscriptionPipeline>,
    pub artifacts: Arc<AudioArtifactStore>,
    pub dialog: Arc<DialogManager>,
    pub quiz: Arc<QuizGenerator>,
    pub similarity: Arc<dyn SentenceSimilarity>,
}

/// The external model endpoints the services are built on.
pub struct Adapters {
    pub text: Arc<dyn TextGenerator>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub similarity: Arc<dyn SentenceSimilarity>,
    pub translation_loader: Arc<dyn TranslationModelLoader>,
}

impl Adapters {
    /// Build the real HTTP and hub-backed adapters from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let timeout = config.model_timeout();
        let models = &config.models;

        let text = OpenAiChatClient::new(&models.text_base_url, models.text_api_key.clone(), timeout)
            .context("creating text-generation client")?;
        let speech = Arc::new(
            SpeechServiceClient::new(&models.speech_base_url, &models.stt_model, timeout)
                .context("creating speech service client")?,
        );
        let similarity = HfSimilarityClient::new(
            &models.similarity_base_url,
            &models.similarity_model,
            models.hf_api_key.clone(),
            timeout,
        )
        .context("creating similarity client")?;

        let device = create_device_from_string(&models.device);
        let loader = HubMarianLoader::new(models.hf_api_key.clone(), device, config.translation.max_output_tokens)
            .context("creating translation model loader")?;

        Ok(Self {
            text: Arc::new(text),
            recognizer: speech.clone(),
            synthesizer: speech,
            similarity: Arc::new(similarity),
            translation_loader: Arc::new(loader),
        })
    }
}

impl Services {
    /// Wire the orchestration components on top of a set of adapters.
    pub fn build(config: &AppConfig, adapters: Adapters) -> Result<Self> {
        let pivot = LanguageTag::parse(&config.translation.pivot_language)
            .context("translation.pivot_language is not a language code")?;
        let translation = TranslationResolver::new(
            adapters.translation_loader,
            ResolverSettings {
                model_template: config.translation.model_template.clone(),
                multilingual_code: config.translation.multilingual_code.clone(),
                pivot,
                allow_reverse_model: config.translation.allow_reverse_model,
                call_timeout: config.translation_timeout(),
                load_timeout: config.translation_load_timeout(),
                miss_ttl: config.translation_miss_ttl(),
            },
        );

        let normalizer = Arc::new(AudioNormalizer::new(&config.audio).context("creating audio normalizer")?);
        let transcription = TranscriptionPipeline::new(
            adapters.recognizer,
            normalizer,
            TranscriptionSettings {
                beam_size: config.audio.beam_size,
                min_silence_ms: config.audio.min_silence_ms,
            },
        );

        let artifacts = Arc::new(
            AudioArtifactStore::new(
                adapters.synthesizer,
                config.audio.artifact_dir.clone(),
                config.models.tts_vocoder.clone(),
                config.audio.sample_rate,
            )
            .with_context(|| format!("creating artifact dir {}", config.audio.artifact_dir.display()))?,
        );

        let dialog = DialogManager::new(
            adapters.text.clone(),
            artifacts.clone(),
            DialogSettings {
                model: config.models.dialog_model.clone(),
                max_turns: config.dialog.max_turns,
                max_tokens: config.dialog.max_tokens,
                temperature: config.dialog.temperature,
                idle_timeout: Duration::from_secs(config.dialog.session_idle_secs),
            },
        );

        let quiz = QuizGenerator::new(adapters.text, config.models.quiz_model.clone());

        info!("Services initialized (artifacts in {})", config.audio.artifact_dir.display());

        Ok(Self {
            translation: Arc::new(translation),
            transcription: Arc::new(transcription),
            artifacts,
            dialog: Arc::new(dialog),
            quiz: Arc::new(quiz),
            similarity: adapters.similarity,
        })
    }
}

/// The main application state that's shared across all HTTP request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Effective configuration (read-only after startup)
    pub config: Arc<AppConfig>,

    /// Request metrics, written by the metrics middleware
    pub metrics: Arc<RwLock<AppMetrics>>,

    pub services: Services,

    /// When the server started
    pub start_time: Instant,
}

/// Request metrics collected across all HTTP requests.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of failed requests (4xx and 5xx) since server start
    pub error_count: u64,

    /// Requests currently being processed
    pub in_flight: u32,

    /// Per-endpoint statistics, keyed by "METHOD /path"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Performance metrics for a single endpoint.
///
/// ## Derived values:
/// - **Average response time**: total_duration_ms / request_count
/// - **Error rate**: error_count / request_count
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig, services: Services) -> Self {
        Self {
            config: Arc::new(config),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            services,
            start_time: Instant::now(),
        }
    }

    /// Build the state with the real adapters.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let adapters = Adapters::from_config(&config)?;
        let services = Services::build(&config, adapters)?;
        Ok(Self::new(config, services))
    }

    fn metrics_read(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.metrics.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn metrics_write(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Called by the metrics middleware when a request starts.
    pub fn request_started(&self) {
        let mut metrics = self.metrics_write();
        metrics.request_count += 1;
        metrics.in_flight += 1;
    }

    /// Called by the metrics middleware when a request finishes, successfully or not.
    pub fn request_finished(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics_write();
        metrics.in_flight = metrics.in_flight.saturating_sub(1);
        if is_error {
            metrics.error_count += 1;
        }

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Copy of the current metrics, so no lock is held while serializing.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics_read().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl AppMetrics {
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
