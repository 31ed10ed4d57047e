//! Client for the Lindorm AI model inference endpoint.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Turns query text into a vector for knn search.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[derive(Debug, Serialize)]
struct InferRequest<'a> {
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct InferResponse {
    data: Vec<Vec<f32>>,
}

/// `POST /v1/ai/models/{model}/infer` with access-key headers.
pub struct EmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    access_key: String,
    secret_key: String,
    model: String,
}

impl EmbeddingClient {
    /// Build a client with explicit connect and read timeouts.
    pub fn new(
        base_url: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        model: impl Into<String>,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .build()
            .map_err(|e| AppError::EmbeddingError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            model: model.into(),
        })
    }

    fn infer_url(&self) -> String {
        format!("{}/v1/ai/models/{}/infer", self.base_url, self.model)
    }

    /// One embedding per input, in input order.
    pub async fn infer(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let start = std::time::Instant::now();

        let response = self
            .http
            .post(self.infer_url())
            .header("x-ld-ak", &self.access_key)
            .header("x-ld-sk", &self.secret_key)
            .json(&InferRequest {
                input: inputs.to_vec(),
            })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(describe_request_error)?;

        let body: InferResponse = response.json().await.map_err(|e| {
            AppError::EmbeddingError(format!("unexpected inference response: {}", e))
        })?;

        tracing::debug!(
            model = %self.model,
            inputs = inputs.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Embedding inference completed"
        );

        Ok(body.data)
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.infer(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::EmbeddingError("inference returned no embedding".to_string()))
    }
}

fn describe_request_error(err: reqwest::Error) -> AppError {
    let message = if err.is_timeout() {
        format!("request out of time: {}", err)
    } else if err.is_status() {
        format!("HTTP error: {}", err)
    } else {
        format!("request error happened: {}", err)
    };
    AppError::EmbeddingError(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn client(url: &str) -> EmbeddingClient {
        EmbeddingClient::new(
            url,
            "root",
            "secret",
            "bge_m3_model",
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_embed_sends_credentials_and_parses_data() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/ai/models/bge_m3_model/infer")
            .match_header("x-ld-ak", "root")
            .match_header("x-ld-sk", "secret")
            .match_body(Matcher::Json(json!({"input": ["what is lindorm"]})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data": [[0.25, -0.5, 1.0]]}"#)
            .create_async()
            .await;

        let vector = client(&server.url()).embed("what is lindorm").await.unwrap();

        assert_eq!(vector, vec![0.25, -0.5, 1.0]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_is_described() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/ai/models/bge_m3_model/infer")
            .with_status(500)
            .create_async()
            .await;

        let err = client(&server.url()).embed("q").await.unwrap_err();

        match err {
            AppError::EmbeddingError(msg) => assert!(msg.starts_with("HTTP error"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_data_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/ai/models/bge_m3_model/infer")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data": []}"#)
            .create_async()
            .await;

        let err = client(&server.url()).embed("q").await.unwrap_err();

        assert!(matches!(err, AppError::EmbeddingError(_)));
    }
}
