//! mcp-docs-fetch: download documentation from an MCP server over stdio
//!
//! This library spawns a document-serving MCP server, performs the
//! `initialize` handshake, calls one tool and stores the text it returns.
//!
//! # Architecture
//!
//! The hard part is turning the server's unframed stdout into messages and
//! pairing them with the requests that caused them:
//!
//! - **Framing**: newline-delimited JSON, reassembled across pipe reads,
//!   with banners and other noise skipped
//! - **Correlation**: integer request ids resolved exactly once
//! - **Sequencing**: an explicit state machine for initialize → tool call →
//!   deliver
//!
//! # Modules
//!
//! - [`config`] — Configuration loading and validation
//! - [`error`] — Error types
//! - [`mcp`] — MCP client implementation
//! - [`sink`] — Where fetched payloads go

pub mod config;
pub mod error;
pub mod mcp;
pub mod sink;
