//! # Translation Module
//!
//! Text translation between arbitrary language pairs using locally executed
//! MarianMT models.
//!
//! ## Key Components:
//! - **Language tags**: normalization of display names and codes
//! - **Resolver**: fallback chain that finds a usable model route per pair
//! - **Marian loader**: fetches models from the Hugging Face hub and runs them with candle
//! - **Tokenizers**: rebuilt from the SentencePiece files `opus-mt` repositories ship
//!
//! ## Key Rust Concepts:
//! - **Trait objects**: the resolver only sees `dyn TranslationModelLoader`,
//!   which lets tests script the model catalogue
//! - **`tokio::sync::RwLock`**: the route cache is read on every request but
//!   written once per pair

pub mod language;
pub mod marian;
pub mod resolver;
pub mod tokenizer;

pub use language::{InvalidLanguage, LanguagePair, LanguageTag};
pub use marian::HubMarianLoader;
pub use resolver::{ResolverSettings, TranslationModelLoader, TranslationResolver};

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum TranslationError {
    #[error(transparent)]
    InvalidLanguage(#[from] InvalidLanguage),

    #[error("no translation route available for {0}")]
    NoRouteAvailable(LanguagePair),

    #[error("failed to load model {model_id}: {message}")]
    ModelLoad { model_id: String, message: String },

    #[error("model {model_id} failed: {message}")]
    Inference { model_id: String, message: String },

    #[error("model {model_id} timed out after {timeout:?}")]
    Timeout { model_id: String, timeout: Duration },
}
