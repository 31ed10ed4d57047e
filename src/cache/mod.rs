//! Flat-file cache for full tool results.
//!
//! Every tool call writes its complete, untruncated output to one JSON file so
//! the caller can fetch it out of band while the protocol response only carries
//! a short preview. Files are never read back, expired or deduplicated here.

use crate::error::{AppError, Result};
use chrono::{DateTime, Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Number of hex characters kept from the digest.
const CACHE_KEY_LEN: usize = 8;

/// Upper bound on `_N` suffixes tried for same-second duplicates.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// One persisted tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    pub tool_name: String,
    /// Parameters as the caller supplied them (insertion order kept).
    pub params: Map<String, Value>,
    pub result: String,
    /// ISO-8601 local timestamp.
    pub cached_at: String,
}

/// Writes full tool results under a single directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `result` and return the absolute path of the written file.
    ///
    /// File name: `{tool_name}_{YYYYMMDD_HHMMSS}_{key}.json`. A second write of
    /// the same call within the same second gets a `_1`, `_2`, ... suffix
    /// instead of replacing the first file.
    pub fn save(
        &self,
        tool_name: &str,
        params: &Map<String, Value>,
        result: &str,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            AppError::CacheError(format!(
                "Failed to create cache directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;
        let dir = fs::canonicalize(&self.dir).map_err(|e| {
            AppError::CacheError(format!(
                "Failed to resolve cache directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let now = Local::now();
        let key = cache_key(tool_name, params);
        let stem = format!("{}_{}_{}", tool_name, now.format("%Y%m%d_%H%M%S"), key);
        let (path, file) = create_unique(&dir, &stem)?;

        let record = CacheRecord {
            tool_name: tool_name.to_string(),
            params: params.clone(),
            result: result.to_string(),
            cached_at: iso_timestamp(&now),
        };

        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &record).map_err(|e| {
            AppError::CacheError(format!("Failed to write cache record: {}", e))
        })?;
        writer.flush().map_err(|e| {
            AppError::CacheError(format!("Failed to flush cache file: {}", e))
        })?;

        tracing::debug!(
            tool = tool_name,
            path = %path.display(),
            size_bytes = record.result.len(),
            "Full result cached"
        );
        metrics::counter!("cache_writes_total").increment(1);

        Ok(path)
    }
}

/// Derive the short cache key for a call.
///
/// The parameters are hashed in canonical form, so two mappings that differ
/// only in key order produce the same key. 32 bits of SHA-256; not a security
/// boundary.
pub fn cache_key(tool_name: &str, params: &Map<String, Value>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tool_name.as_bytes());
    hasher.update(b"|");
    hasher.update(canonical_json(&Value::Object(params.clone())).as_bytes());

    hasher
        .finalize()
        .iter()
        .take(CACHE_KEY_LEN / 2)
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Compact JSON with object keys sorted at every depth. Non-ASCII text is
/// emitted as-is.
pub fn canonical_json(value: &Value) -> String {
    sorted(value).to_string()
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sorted(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

fn iso_timestamp(now: &DateTime<Local>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Micros, false)
}

fn create_unique(dir: &Path, stem: &str) -> Result<(PathBuf, File)> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = if attempt == 0 {
            format!("{}.json", stem)
        } else {
            format!("{}_{}.json", stem, attempt)
        };
        let path = dir.join(name);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(AppError::CacheError(format!(
                    "Failed to create cache file {}: {}",
                    path.display(),
                    e
                )))
            }
        }
    }

    Err(AppError::CacheError(format!(
        "No free cache file name for {} after {} attempts",
        stem, MAX_NAME_ATTEMPTS
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("params must be an object"),
        }
    }

    #[test]
    fn test_key_ignores_insertion_order() {
        let a = params(json!({"a": 1, "b": 2}));
        let b = params(json!({"b": 2, "a": 1}));

        assert_eq!(cache_key("tool", &a), cache_key("tool", &b));
    }

    #[test]
    fn test_key_ignores_nested_insertion_order() {
        let a = params(json!({"outer": {"x": [1, {"p": 1, "q": 2}], "y": "z"}}));
        let b = params(json!({"outer": {"y": "z", "x": [1, {"q": 2, "p": 1}]}}));

        assert_eq!(cache_key("tool", &a), cache_key("tool", &b));
    }

    #[test]
    fn test_key_changes_with_tool_and_values() {
        let base = params(json!({"query": "select 1", "top_k": 5}));
        let other_value = params(json!({"query": "select 1", "top_k": 6}));

        assert_ne!(cache_key("tool_a", &base), cache_key("tool_b", &base));
        assert_ne!(cache_key("tool_a", &base), cache_key("tool_a", &other_value));
    }

    #[test]
    fn test_key_is_eight_lowercase_hex() {
        let key = cache_key("lindorm_list_all_index", &Map::new());

        assert_eq!(key.len(), 8);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_canonical_json_keeps_unicode_unescaped() {
        let value = json!({"b": "知识库", "a": 1});

        assert_eq!(canonical_json(&value), r#"{"a":1,"b":"知识库"}"#);
    }

    #[test]
    fn test_save_writes_record() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("cache"));
        let p = params(json!({"query": "select * from t", "limit": 3}));

        let path = store.save("lindorm_execute_sql", &p, "a,b\n1,2").unwrap();

        assert!(path.is_absolute());
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("lindorm_execute_sql_"));
        assert!(name.ends_with(&format!("_{}.json", cache_key("lindorm_execute_sql", &p))));

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  \"tool_name\""), "record should be pretty-printed");
        let record: CacheRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(record.tool_name, "lindorm_execute_sql");
        assert_eq!(record.result, "a,b\n1,2");
        // Original key order survives in the stored params.
        let keys: Vec<&String> = record.params.keys().collect();
        assert_eq!(keys, vec!["query", "limit"]);
        assert!(DateTime::parse_from_rfc3339(&record.cached_at).is_ok());
    }

    #[test]
    fn test_same_second_duplicates_do_not_overwrite() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let p = Map::new();

        let first = store.save("lindorm_show_tables", &p, "first").unwrap();
        let second = store.save("lindorm_show_tables", &p, "second").unwrap();

        assert_ne!(first, second);
        assert!(fs::read_to_string(&first).unwrap().contains("first"));
        assert!(fs::read_to_string(&second).unwrap().contains("second"));
    }

    #[test]
    fn test_unicode_result_written_unescaped() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path());

        let path = store
            .save("lindorm_list_all_index", &Map::new(), "1. 知识库")
            .unwrap();

        assert!(fs::read_to_string(path).unwrap().contains("1. 知识库"));
    }

    #[test]
    fn test_save_fails_when_dir_is_a_file() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, b"x").unwrap();
        let store = CacheStore::new(&blocker);

        let err = store.save("tool", &Map::new(), "result").unwrap_err();

        assert!(matches!(err, AppError::CacheError(_)));
    }
}
