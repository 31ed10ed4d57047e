//! Lindorm MCP server
//!
//! Exposes Lindorm search indexes and wide tables to AI agents as MCP tools.
//! Every tool writes its full output to a local cache file and answers with a
//! short preview plus the cache path.

pub mod cache;
pub mod config;
pub mod embedding;
pub mod error;
pub mod handlers;
pub mod mcp;
pub mod search;
pub mod state;
pub mod summary;
pub mod table;
pub mod tools;

// Re-export key types for convenience
pub use cache::CacheStore;
pub use config::Config;
pub use error::{AppError, Result};
pub use handlers::{health_handler, mcp_handler, ready_handler};
pub use mcp::McpServer;
pub use state::AppState;
pub use tools::LindormTools;
