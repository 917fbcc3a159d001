use crate::quiz::QuizRequest;
use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde::Deserialize;

/// Request body for `POST /generate`.
#[derive(Debug, Deserialize)]
pub struct GenerateQuizRequest {
    pub word: Option<String>,
    pub topic: Option<String>,
    pub question_type: Option<String>,
    pub previous_question: Option<String>,
    /// Language the question is written in (default English)
    pub language_in: Option<String>,
    /// Language of answers and options (default Vietnamese)
    pub language_out: Option<String>,
}

/// Generate one vocabulary quiz.
///
/// ## Endpoint: `POST /generate`
///
/// ## Response:
/// The quiz object (`topic`, `word`, `question_type`, `question`, `answer`,
/// `options`), or `{raw, error}` when the model reply could not be decoded.
pub async fn generate_quiz(
    state: web::Data<AppState>,
    body: web::Json<GenerateQuizRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let request = QuizRequest::new(body.word, body.topic, body.question_type.as_deref())?
        .with_previous_question(body.previous_question)
        .with_languages(body.language_in, body.language_out);

    let outcome = state.services.quiz.generate(&request).await?;
    Ok(HttpResponse::Ok().json(outcome))
}
