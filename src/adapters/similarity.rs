//! Hugging Face inference client for the sentence-similarity task.

use super::{ensure_success, AdapterError, SentenceSimilarity};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument};

const ENDPOINT: &str = "sentence_similarity";

#[derive(Debug, Clone)]
pub struct HfSimilarityClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HfSimilarityClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AdapterError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            timeout,
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}", self.base_url, self.model)
    }
}

#[derive(Debug, Serialize)]
struct SimilarityBody<'a> {
    inputs: SimilarityInputs<'a>,
}

#[derive(Debug, Serialize)]
struct SimilarityInputs<'a> {
    source_sentence: &'a str,
    sentences: [&'a str; 1],
}

#[async_trait]
impl SentenceSimilarity for HfSimilarityClient {
    #[instrument(skip(self, sentence, other), fields(model = %self.model))]
    async fn similarity(&self, sentence: &str, other: &str) -> Result<f32, AdapterError> {
        let body = SimilarityBody {
            inputs: SimilarityInputs { source_sentence: sentence, sentences: [other] },
        };

        let mut builder = self.client.post(self.url()).json(&body);
        if let Some(key) = self.api_key.as_deref() {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AdapterError::from_reqwest(ENDPOINT, self.timeout, e))?;

        let scores: Vec<f32> = ensure_success(ENDPOINT, response)
            .await?
            .json()
            .await
            .map_err(|e| AdapterError::invalid(ENDPOINT, e.to_string()))?;

        let score = scores
            .first()
            .copied()
            .ok_or_else(|| AdapterError::invalid(ENDPOINT, "no similarity score returned"))?;

        debug!(score, "Sentence similarity computed");
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL: &str = "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2";

    #[tokio::test]
    async fn returns_first_score() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/models/{}", MODEL)))
            .and(header("Authorization", "Bearer hf-key"))
            .and(body_json(serde_json::json!({
                "inputs": {"source_sentence": "I like dogs", "sentences": ["Tôi thích chó"]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([0.87])))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            HfSimilarityClient::new(&server.uri(), MODEL, Some("hf-key".to_string()), Duration::from_secs(5))
                .unwrap();
        let score = client.similarity("I like dogs", "Tôi thích chó").await.unwrap();
        assert!((score - 0.87).abs() < 1e-6);
    }

    #[tokio::test]
    async fn empty_scores_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let client = HfSimilarityClient::new(&server.uri(), MODEL, None, Duration::from_secs(5)).unwrap();
        let err = client.similarity("a", "b").await.unwrap_err();
        assert!(matches!(err, AdapterError::InvalidResponse { .. }));
    }
}
