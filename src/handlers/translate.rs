use super::required;
use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

/// Languages may be codes (`en`, `pt-br`) or English names (`Vietnamese`).
#[derive(Debug, Deserialize)]
pub struct TranslateRequest {
    pub text: Option<String>,
    pub source: Option<String>,
    pub target: Option<String>,
}

/// Translate text through the resolved model route.
///
/// ## Endpoint: `POST /translate`
///
/// ## Response:
/// ```json
/// {
///   "translated_text": "con chó",
///   "source": "en",
///   "target": "vi",
///   "strategy": {"kind": "direct"},
///   "models": ["Helsinki-NLP/opus-mt-en-vi"]
/// }
/// ```
pub async fn translate(
    state: web::Data<AppState>,
    body: web::Json<TranslateRequest>,
) -> Result<HttpResponse, AppError> {
    let text = required(&body.text).ok_or_else(|| AppError::ValidationError("Missing 'text'".to_string()))?;
    let (Some(source), Some(target)) = (required(&body.source), required(&body.target)) else {
        return Err(AppError::ValidationError("Missing 'source' or 'target'".to_string()));
    };

    let (translated_text, route) = state.services.translation.translate_text(text, source, target).await?;

    Ok(HttpResponse::Ok().json(json!({
        "translated_text": translated_text,
        "source": route.pair.source,
        "target": route.pair.target,
        "strategy": route.strategy,
        "models": route.model_ids()
    })))
}
