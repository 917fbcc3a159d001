//! # HTTP Handlers
//!
//! Thin request/response adapters over the services in `AppState`. Each
//! handler validates its body, calls one service and shapes the JSON reply;
//! all failures go through `AppError`.
//!
//! ## Routes:
//! - `POST /generate` - quiz generation
//! - `POST /compare` - sentence similarity
//! - `POST /translate` - text translation
//! - `POST /text-to-speech`, `GET /audio/{filename}` - speech synthesis and serving
//! - `POST /speech-to-text` - transcription (multipart upload or JSON reference)
//! - `POST /talking-service` - conversation practice
//! - `GET /api/v1/config` - effective configuration

pub mod compare;
pub mod config;
pub mod quiz;
pub mod speech;
pub mod talk;
pub mod translate;

use crate::audio::AudioArtifact;
use crate::health;
use actix_web::{web, HttpRequest};

/// Register every route on an app or scope.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/generate", web::post().to(quiz::generate_quiz))
        .route("/compare", web::post().to(compare::compare_sentences))
        .route("/translate", web::post().to(translate::translate))
        .route("/text-to-speech", web::post().to(speech::text_to_speech))
        .route("/audio/{filename}", web::get().to(speech::serve_audio))
        .route("/speech-to-text", web::post().to(speech::speech_to_text))
        .route("/talking-service", web::post().to(talk::talking_service))
        .route("/health", web::get().to(health::health_check))
        .service(
            web::scope("/api/v1")
                .route("/health", web::get().to(health::health_check))
                .route("/metrics", web::get().to(health::detailed_metrics))
                .route("/config", web::get().to(config::get_config)),
        );
}

/// Absolute URL a client can fetch the artifact from, based on how it reached us.
pub fn audio_url(req: &HttpRequest, artifact: &AudioArtifact) -> String {
    let connection = req.connection_info();
    format!("{}://{}/audio/{}", connection.scheme(), connection.host(), artifact.file_name)
}

/// Trimmed, non-empty string field.
pub(crate) fn required(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
