//! Tool definitions advertised over `tools/list` and argument decoding for
//! `tools/call`.

use crate::error::{AppError, Result};
use crate::tools::{self, LindormTools};
use serde::Deserialize;
use serde_json::{json, Value};

/// Default number of hits for the search tools
fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize)]
pub struct RetrieveArgs {
    pub index_name: String,
    pub query: String,
    pub content_field: String,
    pub vector_field: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Deserialize)]
pub struct FullTextArgs {
    pub index_name: String,
    pub query: String,
    pub content_field: String,
    #[serde(default = "default_top_k")]
    pub size: usize,
}

#[derive(Debug, Deserialize)]
pub struct IndexArgs {
    pub index_name: String,
}

#[derive(Debug, Deserialize)]
pub struct SqlArgs {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct TableArgs {
    pub table_name: String,
}

fn parse<T: serde::de::DeserializeOwned>(arguments: Value) -> Result<T> {
    // Parameterless tools may be called without an arguments object.
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    Ok(serde_json::from_value(arguments)?)
}

fn require_positive(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(AppError::ValidationError(format!(
            "{} must be at least 1",
            name
        )));
    }
    Ok(())
}

/// Run a tool by name. `Ok(None)` when no such tool exists.
pub async fn call_tool(
    facade: &LindormTools,
    name: &str,
    arguments: Value,
) -> Result<Option<String>> {
    let text = match name {
        tools::RETRIEVE_FROM_INDEX => {
            let args: RetrieveArgs = parse(arguments)?;
            require_positive("top_k", args.top_k)?;
            facade
                .retrieve_hybrid(
                    &args.index_name,
                    &args.query,
                    &args.content_field,
                    &args.vector_field,
                    args.top_k,
                )
                .await
        }
        tools::FULL_TEXT_SEARCH => {
            let args: FullTextArgs = parse(arguments)?;
            require_positive("size", args.size)?;
            facade
                .full_text_search(&args.index_name, &args.query, &args.content_field, args.size)
                .await
        }
        tools::VECTOR_SEARCH => {
            let args: RetrieveArgs = parse(arguments)?;
            require_positive("top_k", args.top_k)?;
            facade
                .vector_search(
                    &args.index_name,
                    &args.query,
                    &args.content_field,
                    &args.vector_field,
                    args.top_k,
                )
                .await
        }
        tools::LIST_ALL_INDEX => facade.list_indexes().await,
        tools::GET_INDEX_FIELDS => {
            let args: IndexArgs = parse(arguments)?;
            facade.get_index_fields(&args.index_name).await
        }
        tools::EXECUTE_SQL => {
            let args: SqlArgs = parse(arguments)?;
            facade.execute_sql(&args.query).await
        }
        tools::SHOW_TABLES => facade.show_tables().await,
        tools::DESCRIBE_TABLE => {
            let args: TableArgs = parse(arguments)?;
            facade.describe_table(&args.table_name).await
        }
        _ => return Ok(None),
    };

    Ok(Some(text))
}

fn string_prop(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

fn count_prop(description: &str) -> Value {
    json!({
        "type": "integer",
        "description": description,
        "minimum": 1,
        "default": default_top_k()
    })
}

fn tool(name: &str, description: &str, properties: Value, required: &[&str]) -> Value {
    json!({
        "name": name,
        "description": description,
        "inputSchema": {
            "type": "object",
            "properties": properties,
            "required": required
        }
    })
}

/// Definitions for `tools/list`.
pub fn tool_definitions() -> Vec<Value> {
    let index_name = string_prop("The index name, also known as the knowledgebase name");
    let query = string_prop("The query to search for in the knowledgebase");
    let content_field = string_prop(
        "The text field that stores the content. Get it from the index structure with lindorm_get_index_fields",
    );
    let vector_field = string_prop(
        "The vector field that stores the embeddings. Get it from the index structure with lindorm_get_index_fields",
    );

    vec![
        tool(
            tools::RETRIEVE_FROM_INDEX,
            "Retrieve from an existing index (knowledgebase) using both full-text search and \
             vector search, and return the rank-fused results.",
            json!({
                "index_name": index_name,
                "query": query,
                "content_field": content_field,
                "vector_field": vector_field,
                "top_k": count_prop("The number of results to return"),
            }),
            &["index_name", "query", "content_field", "vector_field"],
        ),
        tool(
            tools::FULL_TEXT_SEARCH,
            "Full-text (match) search in an existing index (knowledgebase).",
            json!({
                "index_name": index_name,
                "query": query,
                "content_field": content_field,
                "size": count_prop("The number of results to return"),
            }),
            &["index_name", "query", "content_field"],
        ),
        tool(
            tools::VECTOR_SEARCH,
            "Vector (k-nearest-neighbor) search in an existing index (knowledgebase).",
            json!({
                "index_name": index_name,
                "query": query,
                "content_field": content_field,
                "vector_field": vector_field,
                "top_k": count_prop("The number of results to return"),
            }),
            &["index_name", "query", "content_field", "vector_field"],
        ),
        tool(
            tools::LIST_ALL_INDEX,
            "List all the indexes (knowledgebases) you have.",
            json!({}),
            &[],
        ),
        tool(
            tools::GET_INDEX_FIELDS,
            "Get the fields of an index (knowledgebase), especially the vector field and the \
             content field.",
            json!({ "index_name": index_name }),
            &["index_name"],
        ),
        tool(
            tools::EXECUTE_SQL,
            "Execute a SQL query on the Lindorm wide-table database. Only SELECT statements \
             are executed.",
            json!({ "query": string_prop("The SQL query to execute, starting with SELECT") }),
            &["query"],
        ),
        tool(
            tools::SHOW_TABLES,
            "Get all tables in the Lindorm database.",
            json!({}),
            &[],
        ),
        tool(
            tools::DESCRIBE_TABLE,
            "Get the schema of a table in the Lindorm database.",
            json!({ "table_name": string_prop("The table name") }),
            &["table_name"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definitions_cover_every_tool() {
        let names: Vec<String> = tool_definitions()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect();

        assert_eq!(
            names,
            vec![
                tools::RETRIEVE_FROM_INDEX,
                tools::FULL_TEXT_SEARCH,
                tools::VECTOR_SEARCH,
                tools::LIST_ALL_INDEX,
                tools::GET_INDEX_FIELDS,
                tools::EXECUTE_SQL,
                tools::SHOW_TABLES,
                tools::DESCRIBE_TABLE,
            ]
        );
    }

    #[test]
    fn test_required_fields_match_args() {
        let defs = tool_definitions();
        let retrieve = &defs[0];

        assert_eq!(
            retrieve["inputSchema"]["required"],
            json!(["index_name", "query", "content_field", "vector_field"])
        );
        assert_eq!(retrieve["inputSchema"]["properties"]["top_k"]["default"], 5);
    }

    #[test]
    fn test_top_k_defaults_to_five() {
        let args: RetrieveArgs = parse(json!({
            "index_name": "kb",
            "query": "q",
            "content_field": "c",
            "vector_field": "v"
        }))
        .unwrap();

        assert_eq!(args.top_k, 5);
    }

    #[test]
    fn test_missing_argument_is_validation_error() {
        let err = parse::<SqlArgs>(json!({})).unwrap_err();

        match err {
            AppError::ValidationError(msg) => assert!(msg.contains("query"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_zero_top_k_rejected() {
        assert!(require_positive("top_k", 0).is_err());
        assert!(require_positive("top_k", 1).is_ok());
    }
}
