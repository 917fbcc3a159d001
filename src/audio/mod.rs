//! # Audio Module
//!
//! Everything that touches audio files on disk.
//!
//! ## Key Components:
//! - **Normalizer**: turns uploads, base64 payloads, URLs and local paths into
//!   one readable local file with a scoped lifetime
//! - **Artifact Store**: writes synthesized speech as `{uuid}.wav` and serves
//!   it back without letting identifiers escape the artifact directory
//!
//! ## Output Audio Format:
//! - **Sample Rate**: 16kHz (16,000 Hz)
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)

pub mod artifacts;
pub mod normalizer;

pub use artifacts::{ArtifactError, AudioArtifact, AudioArtifactStore};
pub use normalizer::{AudioError, AudioInput, AudioNormalizer, AudioResource};
