//! # Audio Artifact Store
//!
//! Generates speech files from text and serves them back by identifier.
//!
//! ## Naming:
//! Every artifact is `{uuid-v4}.wav` in the artifact directory. Names are
//! random, so two requests never write the same file and no existence check
//! happens before writing.
//!
//! ## Output Rate:
//! Files are always written at the store's sample rate. Waveforms that come
//! back from the speech model at any other rate are resampled first.
//!
//! ## Serving:
//! Identifiers come straight from the URL, so `resolve` only accepts a bare
//! UUID (optionally with `.wav`), and double checks containment after
//! canonicalizing the joined path.

use crate::adapters::{AdapterError, SpeechSynthesizer, SynthesisRequest};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Length of the neutral speaker embedding sent with every synthesis call.
pub const SPEAKER_EMBEDDING_DIM: usize = 512;

const ARTIFACT_EXTENSION: &str = "wav";

/// Frames fed to the resampler per call.
const RESAMPLE_CHUNK: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("text to synthesize must not be empty")]
    EmptyText,

    #[error("invalid artifact identifier: {0}")]
    InvalidIdentifier(String),

    #[error("audio artifact not found: {0}")]
    NotFound(String),

    #[error("speech synthesis failed: {0}")]
    Synthesis(#[from] AdapterError),

    #[error("resampling {from} Hz audio to {to} Hz failed: {message}")]
    Resample { from: u32, to: u32, message: String },

    #[error("artifact I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A generated audio file.
#[derive(Debug, Clone, Serialize)]
pub struct AudioArtifact {
    pub id: Uuid,
    /// File name relative to the artifact directory
    pub file_name: String,
}

pub struct AudioArtifactStore {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    dir: PathBuf,
    vocoder: String,
    sample_rate: u32,
    speaker_embedding: Vec<f32>,
}

impl AudioArtifactStore {
    /// Create the store, making sure the artifact directory exists.
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        dir: impl Into<PathBuf>,
        vocoder: impl Into<String>,
        sample_rate: u32,
    ) -> Result<Self, ArtifactError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        Ok(Self {
            synthesizer,
            dir,
            vocoder: vocoder.into(),
            sample_rate,
            speaker_embedding: vec![0.0; SPEAKER_EMBEDDING_DIM],
        })
    }

    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub async fn synthesize(&self, text: &str) -> Result<AudioArtifact, ArtifactError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ArtifactError::EmptyText);
        }

        let waveform = self
            .synthesizer
            .synthesize(SynthesisRequest {
                text,
                speaker_embedding: &self.speaker_embedding,
                vocoder: &self.vocoder,
            })
            .await?;

        let id = Uuid::new_v4();
        let file_name = format!("{}.{}", id, ARTIFACT_EXTENSION);
        let path = self.dir.join(&file_name);
        let sample_rate = self.sample_rate;

        tokio::task::spawn_blocking(move || {
            let samples = if waveform.sample_rate == sample_rate {
                waveform.samples
            } else {
                debug!(from = waveform.sample_rate, to = sample_rate, "Resampling synthesized audio");
                resample(&waveform.samples, waveform.sample_rate, sample_rate)?
            };
            write_wav(&path, &samples, sample_rate)
        })
        .await
        .map_err(|e| ArtifactError::Io(std::io::Error::other(e)))??;

        info!(artifact = %file_name, "Audio artifact written");
        Ok(AudioArtifact { id, file_name })
    }

    /// Map an identifier from a URL to a file inside the artifact directory.
    pub async fn resolve(&self, identifier: &str) -> Result<PathBuf, ArtifactError> {
        let invalid = || ArtifactError::InvalidIdentifier(identifier.to_string());

        if identifier.is_empty()
            || identifier.contains(['/', '\\', ':', '\0'])
            || identifier.contains("..")
            || Path::new(identifier).is_absolute()
        {
            return Err(invalid());
        }

        let stem = identifier
            .strip_suffix(".wav")
            .unwrap_or(identifier);
        Uuid::parse_str(stem).map_err(|_| invalid())?;

        let candidate = self.dir.join(format!("{}.{}", stem, ARTIFACT_EXTENSION));
        let root = tokio::fs::canonicalize(&self.dir).await?;

        let resolved = match tokio::fs::canonicalize(&candidate).await {
            Ok(path) => path,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArtifactError::NotFound(identifier.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        if !resolved.starts_with(&root) {
            warn!(identifier = %identifier, "Artifact path escaped the artifact directory");
            return Err(invalid());
        }
        if !tokio::fs::metadata(&resolved).await?.is_file() {
            return Err(ArtifactError::NotFound(identifier.to_string()));
        }

        debug!(path = %resolved.display(), "Resolved audio artifact");
        Ok(resolved)
    }
}

/// Band-limited sinc resampling of a mono waveform.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, ArtifactError> {
    use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

    let err = |message: String| ArtifactError::Resample { from: from_rate, to: to_rate, message };
    if from_rate == 0 {
        return Err(err("source sample rate is zero".to_string()));
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = to_rate as f64 / from_rate as f64;

    let mut resampler =
        SincFixedIn::<f32>::new(ratio, 2.0, params, RESAMPLE_CHUNK, 1).map_err(|e| err(e.to_string()))?;

    let expected_len = (samples.len() as f64 * ratio).round() as usize;
    let mut output = Vec::with_capacity(expected_len + RESAMPLE_CHUNK);

    for chunk in samples.chunks(RESAMPLE_CHUNK) {
        let mut input = chunk.to_vec();
        input.resize(RESAMPLE_CHUNK, 0.0);

        let frames = resampler.process(&[input], None).map_err(|e| err(e.to_string()))?;
        if let Some(channel) = frames.first() {
            output.extend_from_slice(channel);
        }
    }

    // Zero padding of the last chunk leaves a tail past the real end.
    output.resize(expected_len, 0.0);
    Ok(output)
}

/// Scale float samples in [-1.0, 1.0] to 16-bit PCM.
fn float_to_pcm(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| (sample * 32768.0).clamp(-32768.0, 32767.0) as i16)
        .collect()
}

fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), ArtifactError> {
    let header = wav::Header::new(wav::header::WAV_FORMAT_PCM, 1, sample_rate, 16);
    let track = wav::BitDepth::Sixteen(float_to_pcm(samples));
    let mut file = std::fs::File::create(path)?;
    wav::write(header, &track, &mut file)?;
    Ok(())
}
