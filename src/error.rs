//! # Error Handling
//!
//! This module defines the HTTP-facing error type and how every component
//! error is converted into it.
//!
//! ## Key Rust Concepts for Error Handling:
//!
//! ### Two Layers of Errors
//! - **Component errors**: each module (translation, audio, dialog, ...) has
//!   its own `thiserror` enum describing what went wrong in its own terms
//! - **AppError**: the boundary type handlers return; it only knows which
//!   HTTP status and error category a failure belongs to
//!
//! ### From Conversions
//! - **`?` operator**: calls `From::from` on the error automatically
//! - **Result**: handlers can write `state.services.translation.resolve(&pair).await?`
//!   and still return `Result<HttpResponse, AppError>`
//!
//! ## Status Mapping:
//! - **ValidationError / BadRequest** → 400
//! - **NotFound** → 404
//! - **UnsupportedSource** → 415
//! - **NoRoute** → 422
//! - **Upstream** → 502 (the upstream message is kept)
//! - **Internal** → 500

use crate::adapters::AdapterError;
use crate::audio::{ArtifactError, AudioError};
use crate::dialog::DialogError;
use crate::quiz::QuizError;
use crate::transcription::TranscriptionError;
use crate::translation::TranslationError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Error categories returned to API clients.
///
/// ## Usage Example:
/// ```rust,ignore
/// return Err(AppError::ValidationError("Missing 'text'".to_string()));
/// ```
#[derive(Debug)]
pub enum AppError {
    /// Server-side problems (I/O failures, poisoned state, etc.)
    Internal(String),

    /// Malformed request (bad multipart form, bad identifier, etc.)
    BadRequest(String),

    /// Requested resource was not found
    NotFound(String),

    /// User input failed validation rules
    ValidationError(String),

    /// Audio source kind the server refuses to read (e.g. `blob:` URLs)
    UnsupportedSource(String),

    /// An external model or download failed
    Upstream(String),

    /// No translation model route exists for the language pair
    NoRoute(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::UnsupportedSource(msg) => write!(f, "Unsupported source: {}", msg),
            AppError::Upstream(msg) => write!(f, "Upstream failure: {}", msg),
            AppError::NoRoute(msg) => write!(f, "No route: {}", msg),
        }
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg),
            AppError::UnsupportedSource(msg) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_source", msg),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, "upstream_failure", msg),
            AppError::NoRoute(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "no_route_available", msg),
        }
    }
}

/// Converts errors into JSON HTTP responses.
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "no_route_available",
///     "message": "no translation route available for xx->vi",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.parts().0
    }

    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = self.parts();

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<AdapterError> for AppError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Configuration(msg) => AppError::Internal(msg),
            other => AppError::Upstream(other.to_string()),
        }
    }
}

impl From<TranslationError> for AppError {
    fn from(err: TranslationError) -> Self {
        match err {
            TranslationError::InvalidLanguage(e) => AppError::ValidationError(e.to_string()),
            TranslationError::NoRouteAvailable(_) => AppError::NoRoute(err.to_string()),
            other => AppError::Upstream(other.to_string()),
        }
    }
}

impl From<AudioError> for AppError {
    fn from(err: AudioError) -> Self {
        let message = err.to_string();
        match err {
            AudioError::SourceNotFound(_) => AppError::NotFound(message),
            AudioError::UnsupportedSource(_) => AppError::UnsupportedSource(message),
            AudioError::InvalidPayload(_) | AudioError::PayloadTooLarge { .. } => AppError::ValidationError(message),
            AudioError::DownloadFailed { .. } => AppError::Upstream(message),
            AudioError::Io(_) => AppError::Internal(message),
        }
    }
}

impl From<ArtifactError> for AppError {
    fn from(err: ArtifactError) -> Self {
        let message = err.to_string();
        match err {
            ArtifactError::EmptyText => AppError::ValidationError(message),
            ArtifactError::InvalidIdentifier(_) => AppError::BadRequest(message),
            ArtifactError::NotFound(_) => AppError::NotFound(message),
            ArtifactError::Synthesis(e) => e.into(),
            ArtifactError::Resample { .. } | ArtifactError::Io(_) => AppError::Internal(message),
        }
    }
}

impl From<TranscriptionError> for AppError {
    fn from(err: TranscriptionError) -> Self {
        match err {
            TranscriptionError::Audio(e) => e.into(),
            TranscriptionError::TranscriptionFailed(_) => AppError::Upstream(err.to_string()),
        }
    }
}

impl From<DialogError> for AppError {
    fn from(err: DialogError) -> Self {
        match err {
            DialogError::EmptyMessage => AppError::ValidationError("Missing 'message'".to_string()),
            DialogError::Generation(e) => e.into(),
            DialogError::Audio(e) => e.into(),
        }
    }
}

impl From<QuizError> for AppError {
    fn from(err: QuizError) -> Self {
        match err {
            QuizError::Generation(e) => e.into(),
            other => AppError::ValidationError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::{LanguagePair, LanguageTag};

    #[test]
    fn component_errors_map_to_statuses() {
        let pair = LanguagePair::parse("xx", "vi").unwrap();
        let cases: Vec<(AppError, StatusCode)> = vec![
            (TranslationError::NoRouteAvailable(pair).into(), StatusCode::UNPROCESSABLE_ENTITY),
            (
                TranslationError::InvalidLanguage(LanguageTag::parse("!!").unwrap_err()).into(),
                StatusCode::BAD_REQUEST,
            ),
            (AudioError::UnsupportedSource("blob".into()).into(), StatusCode::UNSUPPORTED_MEDIA_TYPE),
            (AudioError::SourceNotFound("/x.wav".into()).into(), StatusCode::NOT_FOUND),
            (ArtifactError::InvalidIdentifier("../x".into()).into(), StatusCode::BAD_REQUEST),
            (ArtifactError::NotFound("x".into()).into(), StatusCode::NOT_FOUND),
            (
                DialogError::Generation(AdapterError::Status {
                    endpoint: "chat/completions".into(),
                    status: 500,
                    body: "boom".into(),
                })
                .into(),
                StatusCode::BAD_GATEWAY,
            ),
            (QuizError::MissingSubject.into(), StatusCode::BAD_REQUEST),
            (
                serde_json::from_str::<serde_json::Value>("{").unwrap_err().into(),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.status_code(), expected, "{error}");
        }
    }

    #[test]
    fn upstream_message_is_kept() {
        let err: AppError = AdapterError::Status {
            endpoint: "chat/completions".into(),
            status: 429,
            body: "rate limited".into(),
        }
        .into();
        assert!(err.to_string().contains("rate limited"));
    }

    #[actix_web::test]
    async fn error_body_shape() {
        let response = AppError::NoRoute("no translation route available for xx->vi".into()).error_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = actix_web::body::to_bytes(response.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"]["type"], "no_route_available");
        assert!(value["error"]["timestamp"].is_string());
    }
}
