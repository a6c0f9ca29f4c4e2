//! TribeCRM MCP Library
//!
//! Model Context Protocol server for the TribeCRM entity API.
//! Supports both the OData and the REST dialect.

pub mod auth;
pub mod config;
pub mod gateway;
pub mod mcp;

pub use auth::{Credentials, Token, TokenEndpoint, TokenManager};
pub use config::{Config, Dialect, RuntimeConfig};
pub use gateway::{EntityGateway, ErrorKind, GatewayError, QueryResult, QuerySpec};
