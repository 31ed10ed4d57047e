use super::engine::SearchEngine;
use crate::embedding::Embedder;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Rank constant passed to the lvector hybrid search extension.
const RRF_RANK_CONSTANT: &str = "60";

/// Search operations as the tools see them.
///
/// Every failure is logged and degraded into content (an empty list, a
/// `"<index> not exist"` marker or an explanatory string) so a tool call always
/// has something to render.
pub struct VectorSearchClient {
    engine: Arc<dyn SearchEngine>,
    embedder: Arc<dyn Embedder>,
}

impl VectorSearchClient {
    pub fn new(engine: Arc<dyn SearchEngine>, embedder: Arc<dyn Embedder>) -> Self {
        Self { engine, embedder }
    }

    async fn check_index_exist(&self, index: &str) -> bool {
        match self.engine.index_exists(index).await {
            Ok(exists) => exists,
            Err(e) => {
                tracing::error!(index, error = %e, "Index existence check failed");
                false
            }
        }
    }

    pub async fn list_indexes(&self) -> Vec<String> {
        self.engine.list_indexes().await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Error listing indexes");
            Vec::new()
        })
    }

    pub async fn get_index_mappings(&self, index: &str) -> Option<Value> {
        match self.engine.get_mapping(index).await {
            Ok(mapping) => Some(mapping),
            Err(e) => {
                tracing::error!(index, error = %e, "Error getting index mappings");
                None
            }
        }
    }

    /// Field name to type for an index, or `None` when the mapping is missing.
    pub async fn get_index_fields(&self, index: &str) -> Option<Map<String, Value>> {
        let mapping = self.get_index_mappings(index).await?;
        simplify_mappings(&mapping, index)
    }

    pub async fn full_text_search(
        &self,
        index: &str,
        query_text: &str,
        size: usize,
        content_field: &str,
    ) -> Vec<String> {
        if !self.check_index_exist(index).await {
            return vec![format!("{} not exist", index)];
        }

        let body = json!({
            "size": size,
            "_source": [content_field],
            "query": {
                "match": { content_field: query_text }
            }
        });
        self.run_search(index, &body, content_field, "full text search")
            .await
    }

    pub async fn vector_search(
        &self,
        index: &str,
        query_text: &str,
        top_k: usize,
        content_field: &str,
        vector_field: &str,
    ) -> Vec<String> {
        if !self.check_index_exist(index).await {
            return vec![format!("{} not exist", index)];
        }
        let vector = match self.embedder.embed(query_text).await {
            Ok(v) => v,
            Err(e) => return vec![embedding_failure(index, &e)],
        };

        let body = json!({
            "size": top_k,
            "_source": [content_field],
            "query": {
                "knn": {
                    vector_field: { "vector": vector, "k": top_k }
                }
            }
        });
        self.run_search(index, &body, content_field, "vector search")
            .await
    }

    /// Hybrid search: knn filtered by a text match, fused with reciprocal rank
    /// fusion by the lvector extension.
    pub async fn rrf_search(
        &self,
        index: &str,
        query_text: &str,
        top_k: usize,
        content_field: &str,
        vector_field: &str,
    ) -> Vec<String> {
        if !self.check_index_exist(index).await {
            return vec![format!("{} not exist", index)];
        }
        let vector = match self.embedder.embed(query_text).await {
            Ok(v) => v,
            Err(e) => return vec![embedding_failure(index, &e)],
        };

        let body = json!({
            "size": top_k,
            "_source": [content_field],
            "query": {
                "knn": {
                    vector_field: {
                        "vector": vector,
                        "filter": {
                            "match": { content_field: query_text }
                        },
                        "k": top_k
                    }
                }
            },
            "ext": {
                "lvector": {
                    "hybrid_search_type": "filter_rrf",
                    "rrf_rank_constant": RRF_RANK_CONSTANT
                }
            }
        });
        self.run_search(index, &body, content_field, "RRF search")
            .await
    }

    async fn run_search(
        &self,
        index: &str,
        body: &Value,
        content_field: &str,
        kind: &str,
    ) -> Vec<String> {
        match self.engine.search(index, body).await {
            Ok(response) => extract_contents(&response, content_field),
            Err(e) => {
                tracing::error!(index, kind, error = %e, "Error performing search");
                Vec::new()
            }
        }
    }
}

fn embedding_failure(index: &str, err: &crate::error::AppError) -> String {
    tracing::error!(index, error = %err, "Failed to embed query");
    format!("failed to get embedding, cause: {}", err)
}

/// `hits.hits[*]._source[content_field]`, rendering non-string values as JSON.
/// Hits without the field are skipped.
fn extract_contents(response: &Value, content_field: &str) -> Vec<String> {
    response
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| hit.get("_source")?.get(content_field))
                .map(|content| match content {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Reduce a `_mapping` response to field name -> type.
///
/// Fields with a declared `type` keep it; nested objects become `"object"`;
/// anything else is `"unknown"`.
pub fn simplify_mappings(mappings: &Value, index: &str) -> Option<Map<String, Value>> {
    let properties = mappings
        .get(index)?
        .get("mappings")?
        .get("properties")
        .and_then(Value::as_object);

    let Some(properties) = properties else {
        return Some(Map::new());
    };

    Some(
        properties
            .iter()
            .map(|(field, details)| {
                let kind = if let Some(kind) = details.get("type") {
                    kind.clone()
                } else if details.get("properties").is_some() {
                    Value::String("object".to_string())
                } else {
                    Value::String("unknown".to_string())
                };
                (field.clone(), kind)
            })
            .collect(),
    )
}
