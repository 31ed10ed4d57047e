//! The agent-facing operations.
//!
//! Each operation makes one backend call, writes the full output to the cache
//! and returns only a bounded preview:
//!
//! ```text
//! backend call -> full output -> CacheStore::save -> summary::* -> String
//! ```
//!
//! Backend clients already degrade failures into content, so every operation
//! returns a renderable string.

use crate::cache::CacheStore;
use crate::error::AppError;
use crate::search::VectorSearchClient;
use crate::summary::{self, CachePointer};
use crate::table::WideTableClient;
use serde_json::{json, Map, Value};
use std::path::Path;

pub const RETRIEVE_FROM_INDEX: &str = "lindorm_retrieve_from_index";
pub const FULL_TEXT_SEARCH: &str = "lindorm_full_text_search";
pub const VECTOR_SEARCH: &str = "lindorm_vector_search";
pub const LIST_ALL_INDEX: &str = "lindorm_list_all_index";
pub const GET_INDEX_FIELDS: &str = "lindorm_get_index_fields";
pub const EXECUTE_SQL: &str = "lindorm_execute_sql";
pub const SHOW_TABLES: &str = "lindorm_show_tables";
pub const DESCRIBE_TABLE: &str = "lindorm_describe_table";

pub struct LindormTools {
    search: VectorSearchClient,
    table: WideTableClient,
    cache: CacheStore,
}

impl LindormTools {
    pub fn new(search: VectorSearchClient, table: WideTableClient, cache: CacheStore) -> Self {
        Self {
            search,
            table,
            cache,
        }
    }

    /// Database the SQL tools run against.
    pub fn database(&self) -> &str {
        self.table.database()
    }

    pub fn cache_dir(&self) -> &Path {
        self.cache.dir()
    }

    /// Hybrid (knn + text match, RRF-fused) retrieval from a knowledgebase.
    pub async fn retrieve_hybrid(
        &self,
        index_name: &str,
        query: &str,
        content_field: &str,
        vector_field: &str,
        top_k: usize,
    ) -> String {
        let contents = self
            .search
            .rrf_search(index_name, query, top_k, content_field, vector_field)
            .await;

        let full_output = format!(
            "The retrieving results for query {} in knowledgebase {} is\n{}",
            query,
            index_name,
            summary::numbered(&contents)
        );
        let pointer = self
            .cache(
                RETRIEVE_FROM_INDEX,
                params(json!({
                    "index_name": index_name,
                    "query": query,
                    "content_field": content_field,
                    "vector_field": vector_field,
                    "top_k": top_k,
                })),
                &full_output,
            )
            .await;

        summary::summarize_list(
            &retrieved_headline(contents.len(), index_name, query),
            "results",
            &contents,
            &pointer,
        )
    }

    pub async fn full_text_search(
        &self,
        index_name: &str,
        query: &str,
        content_field: &str,
        size: usize,
    ) -> String {
        let contents = self
            .search
            .full_text_search(index_name, query, size, content_field)
            .await;

        let full_output = format!(
            "The full text search results for query {} in knowledgebase {} is\n{}",
            query,
            index_name,
            summary::numbered(&contents)
        );
        let pointer = self
            .cache(
                FULL_TEXT_SEARCH,
                params(json!({
                    "index_name": index_name,
                    "query": query,
                    "content_field": content_field,
                    "size": size,
                })),
                &full_output,
            )
            .await;

        summary::summarize_list(
            &retrieved_headline(contents.len(), index_name, query),
            "results",
            &contents,
            &pointer,
        )
    }

    pub async fn vector_search(
        &self,
        index_name: &str,
        query: &str,
        content_field: &str,
        vector_field: &str,
        top_k: usize,
    ) -> String {
        let contents = self
            .search
            .vector_search(index_name, query, top_k, content_field, vector_field)
            .await;

        let full_output = format!(
            "The vector search results for query {} in knowledgebase {} is\n{}",
            query,
            index_name,
            summary::numbered(&contents)
        );
        let pointer = self
            .cache(
                VECTOR_SEARCH,
                params(json!({
                    "index_name": index_name,
                    "query": query,
                    "content_field": content_field,
                    "vector_field": vector_field,
                    "top_k": top_k,
                })),
                &full_output,
            )
            .await;

        summary::summarize_list(
            &retrieved_headline(contents.len(), index_name, query),
            "results",
            &contents,
            &pointer,
        )
    }

    pub async fn list_indexes(&self) -> String {
        let indexes = self.search.list_indexes().await;

        let full_output = format!(
            "All the knowledgebase you have are\n{}",
            summary::numbered(&indexes)
        );
        let pointer = self.cache(LIST_ALL_INDEX, Map::new(), &full_output).await;

        summary::summarize_list(
            &format!("Found {} indexes/knowledgebases", indexes.len()),
            "indexes",
            &indexes,
            &pointer,
        )
    }

    pub async fn get_index_fields(&self, index_name: &str) -> String {
        let fields = self.search.get_index_fields(index_name).await;

        let rendered = match &fields {
            Some(map) => summary::pretty_json(&Value::Object(map.clone())),
            None => "null".to_string(),
        };
        let full_output = format!(
            "The structure(mapping) of index {} is\n{}",
            index_name, rendered
        );
        let pointer = self
            .cache(
                GET_INDEX_FIELDS,
                params(json!({ "index_name": index_name })),
                &full_output,
            )
            .await;

        let fields = fields.unwrap_or_default();
        summary::summarize_mapping(
            &format!("Index '{}' has {} fields", index_name, fields.len()),
            "fields",
            &fields,
            &pointer,
        )
    }

    pub async fn execute_sql(&self, query: &str) -> String {
        let result = self.table.execute_query(query).await;

        let full_output = format!("The results of executing sql {} is\n{}", query, result);
        let pointer = self
            .cache(EXECUTE_SQL, params(json!({ "query": query })), &full_output)
            .await;

        summary::summarize_table(
            &result,
            "rows",
            |n| format!("SQL query returned {} rows", n),
            &pointer,
        )
    }

    pub async fn show_tables(&self) -> String {
        let full_output = self.table.show_tables().await;
        let pointer = self.cache(SHOW_TABLES, Map::new(), &full_output).await;

        summary::summarize_table(
            &full_output,
            "tables",
            |n| format!("Found {} tables in database", n),
            &pointer,
        )
    }

    pub async fn describe_table(&self, table_name: &str) -> String {
        let full_output = self.table.describe_table(table_name).await;
        let pointer = self
            .cache(
                DESCRIBE_TABLE,
                params(json!({ "table_name": table_name })),
                &full_output,
            )
            .await;

        summary::summarize_table(
            &full_output,
            "columns",
            |n| format!("Table '{}' has {} columns", table_name, n),
            &pointer,
        )
    }

    /// Release backend connections.
    pub async fn close(&self) {
        self.table.close().await;
    }

    /// Write the full output on the blocking pool; results can be large.
    async fn cache(
        &self,
        tool: &str,
        params: Map<String, Value>,
        full_output: &str,
    ) -> CachePointer {
        let store = self.cache.clone();
        let tool_name = tool.to_string();
        let full_output = full_output.to_string();

        let result =
            tokio::task::spawn_blocking(move || store.save(&tool_name, &params, &full_output))
                .await
                .unwrap_or_else(|e| {
                    Err(AppError::CacheError(format!("Cache write task failed: {}", e)))
                });
        if let Err(e) = &result {
            tracing::warn!(tool, error = %e, "Returning result without cache pointer");
            metrics::counter!("cache_write_failures_total").increment(1);
        }
        result.into()
    }
}

fn retrieved_headline(count: usize, index_name: &str, query: &str) -> String {
    format!(
        "Retrieved {} results from knowledgebase '{}' for query '{}'",
        count, index_name, query
    )
}

fn params(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
