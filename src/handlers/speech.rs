//! Speech endpoints: synthesis, artifact serving and transcription.
//!
//! `POST /speech-to-text` accepts either a `multipart/form-data` upload
//! (`file` part plus an optional `language` part) or a JSON body
//! `{"audio": "<data URI or http(s) URL>", "language": "en"}`.

use super::{audio_url, required};
use crate::audio::{AudioError, AudioInput};
use crate::{error::AppError, state::AppState};
use actix_multipart::{Field, Multipart};
use actix_web::http::header::CONTENT_TYPE;
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// Longest accepted value for a text form field.
const MAX_FIELD_BYTES: usize = 1024;

#[derive(Debug, Deserialize)]
pub struct TextToSpeechRequest {
    pub text: Option<String>,
}

/// ## Endpoint: `POST /text-to-speech`
///
/// Returns `{"audio": "http://host/audio/<uuid>.wav"}`.
pub async fn text_to_speech(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<TextToSpeechRequest>,
) -> Result<HttpResponse, AppError> {
    let text = required(&body.text).ok_or_else(|| AppError::ValidationError("Missing 'text'".to_string()))?;

    let artifact = state.services.artifacts.synthesize(text).await?;
    Ok(HttpResponse::Ok().json(json!({ "audio": audio_url(&req, &artifact) })))
}

/// ## Endpoint: `GET /audio/{filename}`
///
/// Serves a generated artifact as `audio/wav`. Only artifact names produced
/// by this server resolve; anything else is a 400 or 404.
pub async fn serve_audio(
    state: web::Data<AppState>,
    filename: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let path = state.services.artifacts.resolve(&filename).await?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| AppError::Internal(format!("failed to read {}: {}", path.display(), e)))?;

    Ok(HttpResponse::Ok().content_type("audio/wav").body(bytes))
}

#[derive(Debug, Deserialize)]
pub struct SpeechToTextRequest {
    pub audio: Option<String>,
    pub language: Option<String>,
}

/// ## Endpoint: `POST /speech-to-text`
///
/// ## Response:
/// ```json
/// {
///   "language": "en",
///   "segments": [{"start": 0.0, "end": 1.2, "text": "hello there"}],
///   "text": "hello there"
/// }
/// ```
pub async fn speech_to_text(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Payload,
) -> Result<HttpResponse, AppError> {
    let is_multipart = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    let (input, language) = if is_multipart {
        read_multipart(Multipart::new(req.headers(), payload), state.config.audio.max_download_bytes).await?
    } else {
        read_json(payload, state.config.performance.max_json_bytes).await?
    };

    let result = state
        .services
        .transcription
        .transcribe_input(input, language.as_deref())
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "language": result.detected_language,
        "text": result.text(),
        "segments": result.segments
    })))
}

async fn read_multipart(
    mut multipart: Multipart,
    max_audio_bytes: usize,
) -> Result<(AudioInput, Option<String>), AppError> {
    let mut upload = None;
    let mut language = None;

    while let Some(field) = multipart.next().await {
        let mut field = field.map_err(|e| AppError::BadRequest(format!("invalid multipart body: {}", e)))?;
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "file" | "audio" => {
                let filename = field
                    .content_disposition()
                    .and_then(|disposition| disposition.get_filename())
                    .map(str::to_string);
                let bytes = read_field(&mut field, max_audio_bytes).await?;
                debug!(bytes = bytes.len(), filename = ?filename, "Received audio upload");
                upload = Some(AudioInput::Upload { bytes, filename });
            }
            "language" => {
                let bytes = read_field(&mut field, MAX_FIELD_BYTES).await?;
                language = Some(String::from_utf8_lossy(&bytes).trim().to_string()).filter(|l| !l.is_empty());
            }
            _ => {
                read_field(&mut field, max_audio_bytes).await?;
            }
        }
    }

    let upload = upload.ok_or_else(|| AppError::ValidationError("Missing 'file'".to_string()))?;
    Ok((upload, language))
}

async fn read_field(field: &mut Field, limit: usize) -> Result<Vec<u8>, AppError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| AppError::BadRequest(format!("invalid multipart body: {}", e)))?;
        bytes.extend_from_slice(&chunk);
        if bytes.len() > limit {
            return Err(AudioError::PayloadTooLarge { size: bytes.len(), limit }.into());
        }
    }
    Ok(bytes)
}

async fn read_json(mut payload: web::Payload, limit: usize) -> Result<(AudioInput, Option<String>), AppError> {
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| AppError::BadRequest(format!("failed to read request body: {}", e)))?;
        if body.len() + chunk.len() > limit {
            return Err(AppError::ValidationError(format!("request body exceeds {} bytes", limit)));
        }
        body.extend_from_slice(&chunk);
    }

    let request: SpeechToTextRequest = serde_json::from_slice(&body)?;
    let audio = required(&request.audio).ok_or_else(|| AppError::ValidationError("Missing 'audio'".to_string()))?;
    let language = required(&request.language).map(str::to_string);

    Ok((AudioInput::from_reference(audio), language))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing;
    use actix_web::{http::StatusCode, test, App};
    use uuid::Uuid;

    macro_rules! speech_app {
        ($dir:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(testing::state($dir)))
                    .route("/text-to-speech", web::post().to(text_to_speech))
                    .route("/audio/{filename}", web::get().to(serve_audio))
                    .route("/speech-to-text", web::post().to(speech_to_text)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn synthesized_audio_can_be_fetched() {
        let dir = tempfile::tempdir().unwrap();
        let app = speech_app!(dir.path());

        let request = test::TestRequest::post()
            .uri("/text-to-speech")
            .insert_header(("host", "localhost:5000"))
            .set_json(json!({"text": "Xin chào"}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, request).await;

        let url = body["audio"].as_str().unwrap();
        let file_name = url.strip_prefix("http://localhost:5000/audio/").unwrap();
        assert!(Uuid::parse_str(file_name.trim_end_matches(".wav")).is_ok());

        let response = test::call_service(
            &app,
            test::TestRequest::get().uri(&format!("/audio/{}", file_name)).to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "audio/wav");
        let bytes = test::read_body(response).await;
        assert_eq!(&bytes[..4], b"RIFF");
    }

    #[actix_web::test]
    async fn unknown_or_traversing_names_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let app = speech_app!(dir.path());

        let missing = format!("/audio/{}.wav", Uuid::new_v4());
        let response = test::call_service(&app, test::TestRequest::get().uri(&missing).to_request()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response =
            test::call_service(&app, test::TestRequest::get().uri("/audio/..%2Fconfig.toml").to_request()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn empty_text_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = speech_app!(dir.path());

        let request = test::TestRequest::post()
            .uri("/text-to-speech")
            .set_json(json!({"text": "   "}))
            .to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn transcribes_json_data_uri() {
        let dir = tempfile::tempdir().unwrap();
        let app = speech_app!(dir.path());

        let request = test::TestRequest::post()
            .uri("/speech-to-text")
            .set_json(json!({"audio": "data:audio/wav;base64,UklGRiQAAABXQVZF", "language": "vi"}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, request).await;

        assert_eq!(body["language"], "vi");
        assert_eq!(body["text"], "hello there");
        assert_eq!(body["segments"][0]["end"], 1.0);
    }

    #[actix_web::test]
    async fn transcribes_multipart_upload() {
        let dir = tempfile::tempdir().unwrap();
        let app = speech_app!(dir.path());

        let boundary = "XBOUNDARYX";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"language\"\r\n\r\nen\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"clip.wav\"\r\n\
             Content-Type: audio/wav\r\n\r\nRIFF0000WAVE\r\n--{b}--\r\n",
            b = boundary
        );
        let request = test::TestRequest::post()
            .uri("/speech-to-text")
            .insert_header((CONTENT_TYPE, format!("multipart/form-data; boundary={}", boundary)))
            .set_payload(body)
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, request).await;

        assert_eq!(body["language"], "en");
        assert_eq!(body["text"], "hello there");
    }

    #[actix_web::test]
    async fn blob_reference_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let app = speech_app!(dir.path());

        let request = test::TestRequest::post()
            .uri("/speech-to-text")
            .set_json(json!({"audio": "blob:http://localhost/0f3c"}))
            .to_request();
        assert_eq!(
            test::call_service(&app, request).await.status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
    }
}
