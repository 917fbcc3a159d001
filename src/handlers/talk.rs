use super::{audio_url, required};
use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;

const DEFAULT_LANGUAGE: &str = "English";
const DEFAULT_TOPIC: &str = "daily conversation";

#[derive(Debug, Deserialize)]
pub struct TalkRequest {
    pub message: Option<String>,
    pub language: Option<String>,
    pub topic: Option<String>,
    /// Omit to start a new conversation; the reply carries the id to reuse
    pub session_id: Option<String>,
}

/// One conversation-practice turn.
///
/// ## Endpoint: `POST /talking-service`
///
/// ## Response:
/// ```json
/// {"message": "Chào bạn!", "audio": "http://host/audio/<uuid>.wav", "session_id": "..."}
/// ```
pub async fn talking_service(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<TalkRequest>,
) -> Result<HttpResponse, AppError> {
    let message = required(&body.message).ok_or_else(|| AppError::ValidationError("Missing 'message'".to_string()))?;
    let language = required(&body.language).unwrap_or(DEFAULT_LANGUAGE);
    let topic = required(&body.topic).unwrap_or(DEFAULT_TOPIC);

    let reply = state
        .services
        .dialog
        .talk(body.session_id.as_deref(), message, language, topic)
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": reply.message,
        "audio": audio_url(&req, &reply.audio),
        "session_id": reply.session_id
    })))
}
