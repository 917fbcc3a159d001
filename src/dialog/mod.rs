//! # Dialog Module
//!
//! Conversation practice with a text-generation model.
//!
//! ## Key Components:
//! - **ConversationContext**: topic, language and a sliding window of turns
//! - **DialogManager**: per-session registry that advances conversations and
//!   vocalizes replies

pub mod context;
pub mod manager;

pub use manager::{DialogManager, DialogSettings};

use crate::adapters::AdapterError;
use crate::audio::ArtifactError;

#[derive(Debug, thiserror::Error)]
pub enum DialogError {
    #[error("message must not be empty")]
    EmptyMessage,

    #[error("reply generation failed: {0}")]
    Generation(#[from] AdapterError),

    #[error(transparent)]
    Audio(#[from] ArtifactError),
}
