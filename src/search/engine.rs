//! HTTP access to the OpenSearch-compatible Lindorm search endpoint.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;

/// Raw search engine operations. Implementations return errors; turning them
/// into agent-readable text is the job of [`super::VectorSearchClient`].
#[async_trait]
pub trait SearchEngine: Send + Sync {
    async fn index_exists(&self, index: &str) -> Result<bool>;

    async fn list_indexes(&self) -> Result<Vec<String>>;

    /// `GET /{index}/_mapping`, keyed by index name.
    async fn get_mapping(&self, index: &str) -> Result<Value>;

    /// `POST /{index}/_search`; returns the raw response body.
    async fn search(&self, index: &str, body: &Value) -> Result<Value>;
}

#[derive(Debug, Deserialize)]
struct CatIndex {
    index: String,
}

pub struct OpenSearchHttp {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    password: String,
}

impl OpenSearchHttp {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::SearchError(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = base_url.into();
        let base_url = Url::parse(&base_url).map_err(|e| {
            AppError::SearchError(format!("Invalid search URL {}: {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::SearchError(format!(
                "Invalid search URL {}: not a base URL",
                base_url
            )));
        }

        Ok(Self {
            http,
            base_url,
            username: username.into(),
            password: password.into(),
        })
    }

    /// Append path segments to the base URL, each percent-encoded.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
    }
}

fn require_index(index: &str) -> Result<()> {
    if index.trim().is_empty() {
        return Err(AppError::SearchError("index name is empty".to_string()));
    }
    Ok(())
}

#[async_trait]
impl SearchEngine for OpenSearchHttp {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        // `HEAD /` is the cluster root and always answers 200.
        if index.trim().is_empty() {
            return Ok(false);
        }

        let response = self
            .request(reqwest::Method::HEAD, self.url(&[index]))
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(AppError::SearchError(format!(
                "index existence check for {} returned {}",
                index, status
            ))),
        }
    }

    async fn list_indexes(&self) -> Result<Vec<String>> {
        let mut url = self.url(&["_cat", "indices"]);
        url.set_query(Some("format=json"));

        let indices: Vec<CatIndex> = self
            .request(reqwest::Method::GET, url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(indices.into_iter().map(|i| i.index).collect())
    }

    async fn get_mapping(&self, index: &str) -> Result<Value> {
        require_index(index)?;

        let mapping = self
            .request(reqwest::Method::GET, self.url(&[index, "_mapping"]))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(mapping)
    }

    async fn search(&self, index: &str, body: &Value) -> Result<Value> {
        require_index(index)?;
        let start = std::time::Instant::now();

        let response: Value = self
            .request(reqwest::Method::POST, self.url(&[index, "_search"]))
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        tracing::debug!(
            index,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Search request completed"
        );

        Ok(response)
    }
}
