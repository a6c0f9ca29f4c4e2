//! MCP Server implementation for TribeCRM
//!
//! Exposes entity tools and entity-type resources over JSON-RPC

pub mod protocol;
pub mod resources;
mod server;
mod transport;

pub use protocol::*;
pub use server::TribeCrmMcpServer;
pub use transport::{serve, MAX_LINE_LENGTH};
