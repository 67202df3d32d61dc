//! Model Context Protocol (MCP) client implementation.
//!
//! This module drives an MCP server subprocess over the stdio transport using
//! JSON-RPC 2.0 messages: one `initialize` handshake followed by one
//! `tools/call` whose text result is handed to a [`PayloadSink`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          DocsClient                          │
//! │                                                              │
//! │   ┌─────────────┐    ┌─────────────┐    ┌──────────────┐     │
//! │   │  Transport  │───▶│ FrameReader │───▶│  Sequencer   │     │
//! │   │   (stdio)   │    │ (framing)   │    │ + Correlator │     │
//! │   └─────────────┘    └─────────────┘    └──────────────┘     │
//! │          ▲                                     │             │
//! │          └──────────── Send / Notify ──────────┤             │
//! │                                                ▼             │
//! │                                         ┌─────────────┐      │
//! │                                         │ PayloadSink │      │
//! │                                         └─────────────┘      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.
//!
//! [`PayloadSink`]: crate::sink::PayloadSink

pub mod client;
pub mod correlator;
pub mod framing;
pub mod protocol;
pub mod sequencer;
pub mod transport;

pub use client::{ClientOptions, DocsClient};
pub use correlator::Correlator;
pub use framing::FrameReader;
pub use protocol::{JsonRpcRequest, Message, RequestId, MCP_PROTOCOL_VERSION};
pub use sequencer::{Action, SequenceState, Sequencer, Step, ToolRequest};
pub use transport::{Transport, TransportEvent};
