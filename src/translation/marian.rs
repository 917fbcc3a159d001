//! # MarianMT Models via Candle
//!
//! Loads `opus-mt` style translation models from the Hugging Face hub and
//! runs them on the selected compute device.
//!
//! ## Loading Process:
//! 1. Fetch `config.json` (a failure here means the model does not exist)
//! 2. Fetch the tokenizer files: `source.spm`, `target.spm` and `vocab.json`
//!    as published by `opus-mt`, or a converted `tokenizer.json`
//! 3. Fetch the weights (`model.safetensors`, falling back to `pytorch_model.bin`)
//! 4. Build the candle model on a blocking thread
//!
//! ## Inference:
//! Greedy decoding with a bounded output length. Multilingual models get
//! the `>>lang<<` token of the requested target in front of the source. The
//! candle model keeps a KV cache internally, so each model sits behind a
//! `std::sync::Mutex` and decoding runs in `spawn_blocking`.

use super::language::LanguageTag;
use super::resolver::{TranslationModel, TranslationModelLoader};
use super::tokenizer::{MarianTokenizers, TokenizerError};
use super::TranslationError;
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::marian::{self, MTModel};
use hf_hub::api::tokio::{Api, ApiBuilder};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Fixed seed; with no temperature the processor is plain argmax anyway.
const SAMPLING_SEED: u64 = 299792458;

/// Loads Marian models from the hub, memoizing handles by model id.
pub struct HubMarianLoader {
    api: Api,
    device: Device,
    max_output_tokens: usize,
    models: RwLock<HashMap<String, Arc<dyn TranslationModel>>>,
}

impl HubMarianLoader {
    pub fn new(token: Option<String>, device: Device, max_output_tokens: usize) -> Result<Self, TranslationError> {
        let mut builder = ApiBuilder::new().with_token(token).with_progress(false);

        if let Ok(cache_dir) = std::env::var("HF_HUB_CACHE") {
            debug!("Using hub cache dir: {}", cache_dir);
            builder = builder.with_cache_dir(cache_dir.into());
        } else if let Ok(hf_home) = std::env::var("HF_HOME") {
            builder = builder.with_cache_dir(PathBuf::from(hf_home).join("hub"));
        }

        let api = builder.build().map_err(|e| TranslationError::ModelLoad {
            model_id: "<hub>".to_string(),
            message: format!("failed to create Hugging Face API client: {}", e),
        })?;

        Ok(Self {
            api,
            device,
            max_output_tokens,
            models: RwLock::new(HashMap::new()),
        })
    }
}

struct ModelFiles {
    config: PathBuf,
    tokenizer: TokenizerFiles,
    weights: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
enum TokenizerFiles {
    SentencePiece { source: PathBuf, target: PathBuf, vocab: PathBuf },
    Converted(PathBuf),
}

impl TokenizerFiles {
    /// Prefer the `opus-mt` SentencePiece layout, fall back to `tokenizer.json`.
    async fn fetch<F, Fut, E>(get: F) -> Result<Self, String>
    where
        F: Fn(&'static str) -> Fut,
        Fut: Future<Output = Result<PathBuf, E>>,
        E: std::fmt::Display,
    {
        let spm_error = match get("source.spm").await {
            Ok(source) => {
                let target = get("target.spm").await.map_err(|e| format!("target.spm: {}", e))?;
                let vocab = get("vocab.json").await.map_err(|e| format!("vocab.json: {}", e))?;
                return Ok(Self::SentencePiece { source, target, vocab });
            }
            Err(e) => e.to_string(),
        };

        match get("tokenizer.json").await {
            Ok(path) => Ok(Self::Converted(path)),
            Err(e) => Err(format!("no tokenizer (source.spm: {}; tokenizer.json: {})", spm_error, e)),
        }
    }

    fn load(&self) -> Result<MarianTokenizers, TokenizerError> {
        match self {
            Self::SentencePiece { source, target, vocab } => MarianTokenizers::from_files(source, target, vocab),
            Self::Converted(path) => MarianTokenizers::from_tokenizer_json(path),
        }
    }
}

#[async_trait]
impl TranslationModelLoader for HubMarianLoader {
    async fn load(&self, model_id: &str) -> Result<Option<Arc<dyn TranslationModel>>, TranslationError> {
        if let Some(model) = self.models.read().await.get(model_id) {
            return Ok(Some(model.clone()));
        }

        let repo = self.api.model(model_id.to_string());

        let config = match repo.get("config.json").await {
            Ok(path) => path,
            Err(e) => {
                debug!(model = %model_id, error = %e, "Model not available on the hub");
                return Ok(None);
            }
        };

        let load_err = |message: String| TranslationError::ModelLoad {
            model_id: model_id.to_string(),
            message,
        };

        let tokenizer = TokenizerFiles::fetch(|file| repo.get(file)).await.map_err(load_err)?;
        let weights = match repo.get("model.safetensors").await {
            Ok(path) => path,
            Err(_) => repo
                .get("pytorch_model.bin")
                .await
                .map_err(|e| load_err(format!("model weights: {}", e)))?,
        };

        info!(model = %model_id, "Loading translation model");
        let start = std::time::Instant::now();

        let files = ModelFiles { config, tokenizer, weights };
        let device = self.device.clone();
        let max_output_tokens = self.max_output_tokens;
        let id = model_id.to_string();

        let model = tokio::task::spawn_blocking(move || MarianModel::load(id, files, device, max_output_tokens))
            .await
            .map_err(|e| load_err(format!("loader task failed: {}", e)))??;

        info!(model = %model_id, "Translation model loaded in {:.2}s", start.elapsed().as_secs_f64());

        let model: Arc<dyn TranslationModel> = Arc::new(model);
        let mut models = self.models.write().await;
        Ok(Some(models.entry(model_id.to_string()).or_insert(model).clone()))
    }
}

/// A loaded Marian model.
pub struct MarianModel {
    id: String,
    tokenizers: Arc<MarianTokenizers>,
    inner: Arc<Mutex<MarianInner>>,
}

struct MarianInner {
    model: MTModel,
    config: marian::Config,
    device: Device,
    max_output_tokens: usize,
}

impl MarianModel {
    fn load(
        id: String,
        files: ModelFiles,
        device: Device,
        max_output_tokens: usize,
    ) -> Result<Self, TranslationError> {
        let err = |message: String| TranslationError::ModelLoad { model_id: id.clone(), message };

        let config_file = std::fs::File::open(&files.config).map_err(|e| err(format!("config.json: {}", e)))?;
        let config: marian::Config =
            serde_json::from_reader(config_file).map_err(|e| err(format!("config.json: {}", e)))?;

        let tokenizers = files.tokenizer.load().map_err(|e| err(format!("tokenizer: {}", e)))?;

        let vb = if files.weights.to_string_lossy().ends_with(".safetensors") {
            // SAFETY: the hub cache file is not modified while mapped.
            unsafe { VarBuilder::from_mmaped_safetensors(&[&files.weights], DType::F32, &device) }
        } else {
            VarBuilder::from_pth(&files.weights, DType::F32, &device)
        };
        let vb = vb.map_err(|e| err(format!("weights: {}", e)))?;

        let model = MTModel::new(&config, vb).map_err(|e| err(format!("model init: {}", e)))?;

        Ok(Self {
            id: id.clone(),
            tokenizers: Arc::new(tokenizers),
            inner: Arc::new(Mutex::new(MarianInner {
                model,
                config,
                device,
                max_output_tokens,
            })),
        })
    }
}

impl MarianInner {
    fn translate(
        &mut self,
        tokenizers: &MarianTokenizers,
        text: &str,
        target_token: Option<u32>,
    ) -> candle_core::Result<String> {
        self.model.reset_kv_cache();

        let mut source: Vec<u32> = target_token.into_iter().collect();
        source.extend(tokenizers.encode(text).map_err(candle_core::Error::msg)?);
        source.push(self.config.eos_token_id);

        let source = Tensor::new(source.as_slice(), &self.device)?.unsqueeze(0)?;
        let encoder_xs = self.model.encoder().forward(&source, 0)?;

        let mut logits_processor = LogitsProcessor::new(SAMPLING_SEED, None, None);
        let mut token_ids = vec![self.config.decoder_start_token_id];

        for index in 0..self.max_output_tokens {
            let context_size = if index >= 1 { 1 } else { token_ids.len() };
            let start_pos = token_ids.len().saturating_sub(context_size);
            let input_ids = Tensor::new(&token_ids[start_pos..], &self.device)?.unsqueeze(0)?;

            let logits = self.model.decode(&input_ids, &encoder_xs, start_pos)?;
            let logits = logits.squeeze(0)?;
            let logits = logits.get(logits.dim(0)? - 1)?;

            let token = logits_processor.sample(&logits)?;
            if token == self.config.eos_token_id || token == self.config.forced_eos_token_id {
                break;
            }
            token_ids.push(token);
        }

        tokenizers.decode(&token_ids[1..]).map_err(candle_core::Error::msg)
    }
}

#[async_trait]
impl TranslationModel for MarianModel {
    fn model_id(&self) -> &str {
        &self.id
    }

    fn supports_target(&self, target: &LanguageTag) -> bool {
        !self.tokenizers.is_multilingual_target() || self.tokenizers.target_token(target).is_some()
    }

    async fn translate(&self, text: &str, target: &LanguageTag) -> Result<String, TranslationError> {
        let model_id = self.id.clone();
        let err = move |message: String| TranslationError::Inference { model_id: model_id.clone(), message };

        let target_token = if self.tokenizers.is_multilingual_target() {
            let token = self
                .tokenizers
                .target_token(target)
                .ok_or_else(|| err(format!("no >>{}<< token in the vocabulary", target)))?;
            Some(token)
        } else {
            None
        };

        let inner = self.inner.clone();
        let tokenizers = self.tokenizers.clone();
        let text = text.to_string();

        tokio::task::spawn_blocking(move || {
            let mut inner = inner.lock().map_err(|_| "model lock poisoned".to_string())?;
            inner.translate(&tokenizers, &text, target_token).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| err(format!("inference task failed: {}", e)))?
        .map_err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::tokenizer::fixtures::write_opus_repo;
    use std::path::Path;

    fn local_repo(dir: &Path) -> impl Fn(&'static str) -> std::future::Ready<Result<PathBuf, String>> + '_ {
        move |file| {
            let path = dir.join(file);
            std::future::ready(if path.exists() { Ok(path) } else { Err(format!("{} not found", file)) })
        }
    }

    #[tokio::test]
    async fn opus_layout_uses_sentencepiece_files() {
        let dir = tempfile::tempdir().unwrap();
        write_opus_repo(dir.path(), true);

        let files = TokenizerFiles::fetch(local_repo(dir.path())).await.unwrap();
        assert_eq!(
            files,
            TokenizerFiles::SentencePiece {
                source: dir.path().join("source.spm"),
                target: dir.path().join("target.spm"),
                vocab: dir.path().join("vocab.json"),
            }
        );

        let tokenizers = files.load().unwrap();
        assert_eq!(tokenizers.encode("the dog").unwrap(), vec![2, 3]);
        assert_eq!(tokenizers.target_token(&LanguageTag::parse("vi").unwrap()), Some(11));
    }

    #[tokio::test]
    async fn converted_tokenizer_is_the_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tokenizer.json"), "{}").unwrap();

        let files = TokenizerFiles::fetch(local_repo(dir.path())).await.unwrap();
        assert_eq!(files, TokenizerFiles::Converted(dir.path().join("tokenizer.json")));
    }

    #[tokio::test]
    async fn repo_without_tokenizer_files_is_an_error() {
        let dir = tempfile::tempdir().unwrap();

        let err = TokenizerFiles::fetch(local_repo(dir.path())).await.unwrap_err();
        assert!(err.contains("source.spm"));
        assert!(err.contains("tokenizer.json"));
    }

    #[tokio::test]
    async fn half_published_sentencepiece_layout_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_opus_repo(dir.path(), false);
        std::fs::remove_file(dir.path().join("vocab.json")).unwrap();

        let err = TokenizerFiles::fetch(local_repo(dir.path())).await.unwrap_err();
        assert!(err.starts_with("vocab.json"));
    }
}
