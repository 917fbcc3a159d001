//! # Transcription Module
//!
//! Speech-to-text for learner recordings. Audio arrives in whatever shape the
//! client had at hand, goes through the audio normalizer, and is handed to
//! the speech model as a local file.
//!
//! ## Decoding Settings:
//! - **Voice activity filter**: always on, to drop silence-only segments
//! - **Beam size**: 5
//! - **Minimum silence**: 500 ms between segments
//!
//! Language hints are optional. A hint the model does not know is logged and
//! replaced by auto-detection rather than failing the request.

pub mod pipeline;

pub use pipeline::{TranscriptionPipeline, TranscriptionSettings};

use crate::adapters::AdapterError;
use crate::audio::AudioError;

#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error("transcription failed: {0}")]
    TranscriptionFailed(AdapterError),
}
