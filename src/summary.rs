//! Bounded previews of full tool results.
//!
//! Agents only see the first few entries of any result plus a count and a
//! pointer to the cached full output. Three shapes are handled: lists (search
//! hits, index names), mappings (index fields) and tabular text whose first
//! line is a header (SQL output).

use crate::error::Result;
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;

/// Entries shown before truncating.
pub const PREVIEW_LIMIT: usize = 3;

/// Where the full result ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachePointer {
    Cached(PathBuf),
    /// The cache write failed; carries the reason.
    Unavailable(String),
}

impl From<Result<PathBuf>> for CachePointer {
    fn from(result: Result<PathBuf>) -> Self {
        match result {
            Ok(path) => CachePointer::Cached(path),
            Err(e) => CachePointer::Unavailable(e.to_string()),
        }
    }
}

impl fmt::Display for CachePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CachePointer::Cached(path) => {
                write!(f, "[Full results cached at] {}", path.display())
            }
            CachePointer::Unavailable(reason) => {
                write!(f, "[Full results not cached] {}", reason)
            }
        }
    }
}

/// Tabular text split into its header line and data rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tabular<'a> {
    pub header: &'a str,
    pub rows: Vec<&'a str>,
}

impl<'a> Tabular<'a> {
    /// Split newline-joined text. Surrounding whitespace is trimmed first, so
    /// empty or blank text yields an empty header and no rows.
    pub fn parse(text: &'a str) -> Self {
        let mut lines = text.trim().split('\n');
        let header = lines.next().unwrap_or("");
        Self {
            header,
            rows: lines.collect(),
        }
    }
}

/// `1. first\n2. second...`
pub fn numbered<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Preview of a list-shaped result.
pub fn summarize_list<T: fmt::Display>(
    headline: &str,
    noun: &str,
    items: &[T],
    pointer: &CachePointer,
) -> String {
    let shown = &items[..items.len().min(PREVIEW_LIMIT)];
    render(headline, noun, items.len(), &numbered(shown), pointer)
}

/// Preview of a mapping-shaped result: the first entries in the map's own
/// order, rendered as pretty JSON.
pub fn summarize_mapping(
    headline: &str,
    noun: &str,
    entries: &Map<String, Value>,
    pointer: &CachePointer,
) -> String {
    let shown: Map<String, Value> = entries
        .iter()
        .take(PREVIEW_LIMIT)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let preview = pretty_json(&Value::Object(shown));
    render(headline, noun, entries.len(), &preview, pointer)
}

/// Preview of tabular text. `headline` receives the data-row count.
pub fn summarize_table(
    text: &str,
    noun: &str,
    headline: impl FnOnce(usize) -> String,
    pointer: &CachePointer,
) -> String {
    let table = Tabular::parse(text);
    let total = table.rows.len();
    let shown = &table.rows[..total.min(PREVIEW_LIMIT)];
    let preview = format!("{}\n{}", table.header, shown.join("\n"));
    render(&headline(total), noun, total, &preview, pointer)
}

/// Two-space indented JSON, as written to the cache.
pub fn pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn render(
    headline: &str,
    noun: &str,
    total: usize,
    preview: &str,
    pointer: &CachePointer,
) -> String {
    let mut response = format!(
        "[Summary] {}\n\n[Preview - First {} {}]\n{}",
        headline, PREVIEW_LIMIT, noun, preview
    );
    if total > PREVIEW_LIMIT {
        response.push_str(&format!(
            "\n\n... and {} more {}",
            total - PREVIEW_LIMIT,
            noun
        ));
    }
    response.push_str(&format!("\n\n{}", pointer));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use serde_json::json;

    fn pointer() -> CachePointer {
        CachePointer::Cached(PathBuf::from("/tmp/cache/x.json"))
    }

    #[test]
    fn test_list_preview_truncates_to_three() {
        let items: Vec<String> = (1..=5).map(|i| format!("hit {}", i)).collect();

        let out = summarize_list("Retrieved 5 results", "results", &items, &pointer());

        assert_eq!(
            out,
            "[Summary] Retrieved 5 results\n\n\
             [Preview - First 3 results]\n1. hit 1\n2. hit 2\n3. hit 3\n\n\
             ... and 2 more results\n\n\
             [Full results cached at] /tmp/cache/x.json"
        );
    }

    #[test]
    fn test_list_preview_without_suffix_up_to_three() {
        for n in 0..=3 {
            let items: Vec<String> = (1..=n).map(|i| format!("idx{}", i)).collect();

            let out = summarize_list("Found", "indexes", &items, &pointer());

            assert!(!out.contains("more indexes"), "n={n} should not truncate");
            for i in 1..=n {
                assert!(out.contains(&format!("{}. idx{}", i, i)));
            }
        }
    }

    #[test]
    fn test_list_suffix_counts_remaining() {
        let items: Vec<String> = (1..=10).map(|i| i.to_string()).collect();

        let out = summarize_list("Found", "indexes", &items, &pointer());

        assert!(out.contains("... and 7 more indexes"));
        assert!(!out.contains("4. 4"));
    }

    #[test]
    fn test_table_preview() {
        let text = "a,b\n1,1\n2,2\n3,3\n4,4\n5,5";

        let out = summarize_table(
            text,
            "rows",
            |n| format!("SQL query returned {} rows", n),
            &pointer(),
        );

        assert!(out.starts_with("[Summary] SQL query returned 5 rows\n\n"));
        assert!(out.contains("[Preview - First 3 rows]\na,b\n1,1\n2,2\n3,3\n\n"));
        assert!(!out.contains("4,4"));
        assert!(out.contains("... and 2 more rows"));
    }

    #[test]
    fn test_table_blank_text_has_no_rows() {
        for text in ["", "   \n  "] {
            let table = Tabular::parse(text);
            assert_eq!(table.header, "");
            assert!(table.rows.is_empty());
        }

        let out = summarize_table("", "tables", |n| format!("Found {} tables", n), &pointer());
        assert!(out.starts_with("[Summary] Found 0 tables"));
        assert!(out.contains("[Preview - First 3 tables]\n\n\n\n[Full results cached at]"));
    }

    #[test]
    fn test_table_header_only() {
        let table = Tabular::parse("Tables_in_default\n");

        assert_eq!(table.header, "Tables_in_default");
        assert!(table.rows.is_empty());
    }

    #[test]
    fn test_mapping_preview_keeps_natural_order() {
        let fields = match json!({
            "title": "text",
            "embedding": "knn_vector",
            "meta": "object",
            "author": "keyword",
            "year": "integer"
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        let out = summarize_mapping("Index 'kb' has 5 fields", "fields", &fields, &pointer());

        assert!(out.starts_with("[Summary] Index 'kb' has 5 fields"));
        assert!(out.contains(
            "[Preview - First 3 fields]\n{\n  \"title\": \"text\",\n  \"embedding\": \"knn_vector\",\n  \"meta\": \"object\"\n}"
        ));
        assert!(!out.contains("author"));
        assert!(out.contains("... and 2 more fields"));
    }

    #[test]
    fn test_unavailable_pointer() {
        let pointer = CachePointer::from(Err::<PathBuf, _>(AppError::CacheError(
            "disk full".to_string(),
        )));

        let out = summarize_list::<String>("Found 0", "indexes", &[], &pointer);

        assert!(out.ends_with("[Full results not cached] Cache write failed: disk full"));
    }
}
