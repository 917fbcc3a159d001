//! # Audio Input Normalization
//!
//! Turns every supported kind of audio input into one local file the speech
//! model can read.
//!
//! ## Accepted Inputs:
//! - **Upload**: raw bytes from a multipart form
//! - **Base64**: `data:<mime>;base64,<payload>` strings
//! - **Url**: plain `http`/`https` links (never `blob:` handles, which only
//!   exist inside the browser that created them)
//! - **LocalPath**: a file already on this machine
//!
//! ## Resource Lifetime:
//! Anything materialized here lives in a `tempfile::TempPath`, which deletes
//! the file when the `AudioResource` is dropped. Callers take the resource by
//! value, so the file is gone on every exit path, including `?` returns.

use crate::config::AudioConfig;
use base64::Engine;
use reqwest::{redirect, Client, Url};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempPath;
use tracing::{debug, instrument, warn};

const DEFAULT_SUFFIX: &str = ".wav";

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("audio source not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("unsupported audio source: {0}")]
    UnsupportedSource(String),

    #[error("invalid audio payload: {0}")]
    InvalidPayload(String),

    #[error("audio payload is {size} bytes, limit is {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("failed to download {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("audio I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio as it arrives at the boundary.
#[derive(Debug, Clone)]
pub enum AudioInput {
    Upload { bytes: Vec<u8>, filename: Option<String> },
    Base64(String),
    Url(String),
    LocalPath(PathBuf),
}

impl AudioInput {
    /// Classify a string reference sent in a JSON body.
    pub fn from_reference(reference: &str) -> Self {
        let reference = reference.trim();
        if reference.starts_with("data:") {
            AudioInput::Base64(reference.to_string())
        } else {
            AudioInput::Url(reference.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Upload,
    Base64,
    RemoteUrl,
    LocalPath,
}

/// A readable local audio file, owned by exactly one request.
#[derive(Debug)]
pub struct AudioResource {
    path: PathBuf,
    temp: Option<TempPath>,
    kind: SourceKind,
}

impl AudioResource {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }

    pub fn source_kind(&self) -> SourceKind {
        self.kind
    }

    fn temporary(temp: TempPath, kind: SourceKind) -> Self {
        Self { path: temp.to_path_buf(), temp: Some(temp), kind }
    }
}

pub struct AudioNormalizer {
    client: Client,
    temp_dir: Option<PathBuf>,
    max_bytes: usize,
    timeout: Duration,
}

impl AudioNormalizer {
    pub fn new(config: &AudioConfig) -> Result<Self, AudioError> {
        let timeout = Duration::from_secs(config.download_timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(config.user_agent.clone())
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| AudioError::Io(std::io::Error::other(format!("failed to create HTTP client: {}", e))))?;

        Ok(Self {
            client,
            temp_dir: config.temp_dir.clone(),
            max_bytes: config.max_download_bytes,
            timeout,
        })
    }

    #[instrument(skip(self, input))]
    pub async fn normalize(&self, input: AudioInput) -> Result<AudioResource, AudioError> {
        match input {
            AudioInput::Upload { bytes, filename } => {
                self.check_size(bytes.len())?;
                let suffix = filename.as_deref().map(suffix_from_path).unwrap_or_else(|| DEFAULT_SUFFIX.to_string());
                debug!(bytes = bytes.len(), suffix = %suffix, "Materializing upload");
                self.materialize(bytes, suffix, SourceKind::Upload).await
            }
            AudioInput::Base64(data_uri) => {
                let (bytes, suffix) = decode_data_uri(&data_uri)?;
                self.check_size(bytes.len())?;
                debug!(bytes = bytes.len(), suffix = %suffix, "Materializing base64 payload");
                self.materialize(bytes, suffix, SourceKind::Base64).await
            }
            AudioInput::Url(url) => {
                let url = check_remote_url(&url)?;
                let suffix = suffix_from_path(url.path());
                let bytes = self.download(&url).await?;
                self.materialize(bytes, suffix, SourceKind::RemoteUrl).await
            }
            AudioInput::LocalPath(path) => match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => Ok(AudioResource { path, temp: None, kind: SourceKind::LocalPath }),
                _ => Err(AudioError::SourceNotFound(path)),
            },
        }
    }

    fn check_size(&self, size: usize) -> Result<(), AudioError> {
        if size > self.max_bytes {
            return Err(AudioError::PayloadTooLarge { size, limit: self.max_bytes });
        }
        Ok(())
    }

    async fn download(&self, url: &Url) -> Result<Vec<u8>, AudioError> {
        let failed = |reason: String| AudioError::DownloadFailed { url: url.to_string(), reason };

        debug!(url = %url, "Downloading audio");
        let mut response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                failed(format!("timed out after {:?}", self.timeout))
            } else {
                failed(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_redirection() {
            return Err(failed(format!("redirect ({}) not followed", status.as_u16())));
        }
        if !status.is_success() {
            return Err(failed(format!("HTTP {}", status.as_u16())));
        }

        if let Some(length) = response.content_length() {
            self.check_size(length as usize)?;
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| failed(e.to_string()))? {
            bytes.extend_from_slice(&chunk);
            self.check_size(bytes.len())?;
        }

        if bytes.is_empty() {
            return Err(failed("empty response body".to_string()));
        }
        Ok(bytes)
    }

    async fn materialize(&self, bytes: Vec<u8>, suffix: String, kind: SourceKind) -> Result<AudioResource, AudioError> {
        let temp_dir = self.temp_dir.clone();

        let temp = tokio::task::spawn_blocking(move || -> std::io::Result<TempPath> {
            let mut builder = tempfile::Builder::new();
            builder.prefix("audio-").suffix(&suffix);
            let mut file = match temp_dir {
                Some(dir) => builder.tempfile_in(dir)?,
                None => builder.tempfile()?,
            };
            file.write_all(&bytes)?;
            file.flush()?;
            Ok(file.into_temp_path())
        })
        .await
        .map_err(|e| AudioError::Io(std::io::Error::other(e)))??;

        Ok(AudioResource::temporary(temp, kind))
    }
}

/// Reject anything that is not a fetchable http(s) link.
fn check_remote_url(raw: &str) -> Result<Url, AudioError> {
    let trimmed = raw.trim();
    if trimmed.to_ascii_lowercase().starts_with("blob:") {
        warn!("Rejected blob: audio reference");
        return Err(AudioError::UnsupportedSource(
            "blob: URLs only exist inside the client and cannot be fetched".to_string(),
        ));
    }

    let url = Url::parse(trimmed).map_err(|e| AudioError::UnsupportedSource(format!("invalid URL: {}", e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(AudioError::UnsupportedSource(format!("scheme '{}' is not supported", other))),
    }
}

fn decode_data_uri(data_uri: &str) -> Result<(Vec<u8>, String), AudioError> {
    let rest = data_uri
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| AudioError::UnsupportedSource("expected a data: URI".to_string()))?;

    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| AudioError::InvalidPayload("data URI has no ',' separator".to_string()))?;

    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| AudioError::UnsupportedSource("only base64 data URIs are supported".to_string()))?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| AudioError::InvalidPayload(format!("malformed base64: {}", e)))?;

    if bytes.is_empty() {
        return Err(AudioError::InvalidPayload("empty audio payload".to_string()));
    }

    Ok((bytes, suffix_from_mime(mime).to_string()))
}

fn suffix_from_mime(mime: &str) -> &'static str {
    match mime.trim().to_ascii_lowercase().as_str() {
        "audio/mpeg" | "audio/mp3" => ".mp3",
        "audio/ogg" | "audio/opus" => ".ogg",
        "audio/webm" => ".webm",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => ".m4a",
        "audio/flac" | "audio/x-flac" => ".flac",
        "audio/aac" => ".aac",
        _ => DEFAULT_SUFFIX,
    }
}

/// Keep a short alphanumeric extension from a filename or URL path.
fn suffix_from_path(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_else(|| DEFAULT_SUFFIX.to_string())
}
