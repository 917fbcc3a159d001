use super::required;
use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    pub sentence1: Option<String>,
    pub sentence2: Option<String>,
}

/// ## Endpoint: `POST /compare`
///
/// Returns `{"similarity_score": <f32>}`.
pub async fn compare_sentences(
    state: web::Data<AppState>,
    body: web::Json<CompareRequest>,
) -> Result<HttpResponse, AppError> {
    let (Some(sentence1), Some(sentence2)) = (required(&body.sentence1), required(&body.sentence2)) else {
        return Err(AppError::ValidationError("Missing 'sentence1' or 'sentence2'".to_string()));
    };

    let score = state.services.similarity.similarity(sentence1, sentence2).await?;
    Ok(HttpResponse::Ok().json(json!({ "similarity_score": score })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing;
    use actix_web::{http::StatusCode, test, App};

    #[actix_web::test]
    async fn compares_two_sentences() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(testing::state(dir.path())))
                .route("/compare", web::post().to(compare_sentences)),
        )
        .await;

        let request = test::TestRequest::post()
            .uri("/compare")
            .set_json(json!({"sentence1": "I like dogs", "sentence2": "Tôi thích chó"}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(body["similarity_score"], 0.5);

        let request = test::TestRequest::post()
            .uri("/compare")
            .set_json(json!({"sentence1": "I like dogs"}))
            .to_request();
        assert_eq!(test::call_service(&app, request).await.status(), StatusCode::BAD_REQUEST);
    }
}
