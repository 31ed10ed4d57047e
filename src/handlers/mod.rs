pub mod health;
pub mod mcp;

pub use health::{health_handler, ready_handler};
pub use mcp::mcp_handler;
