//! Lindorm search engine access: raw HTTP operations and the degraded-content
//! client the tools are built on.

pub mod client;
pub mod engine;

pub use client::{simplify_mappings, VectorSearchClient};
pub use engine::{OpenSearchHttp, SearchEngine};
