//! Error types for mcp-docs-fetch.
//!
//! Decode and correlation errors are absorbed where they occur (logged and
//! skipped). Protocol, persistence and transport errors end the run and are
//! surfaced through [`ClientError`].

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// A line of server output that is not a JSON-RPC 2.0 message.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The line is not valid UTF-8.
    #[error("line is not valid UTF-8")]
    NotUtf8,

    /// The line is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// The line is JSON but not an object.
    #[error("expected a JSON object")]
    NotAnObject,

    /// The object lacks `"jsonrpc": "2.0"`.
    #[error("missing or unsupported jsonrpc version")]
    UnsupportedVersion,

    /// The object has a field of the wrong shape.
    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),

    /// An unterminated line grew past the reader's limit.
    #[error("line exceeds {limit} bytes")]
    LineTooLong {
        /// Maximum accepted line length in bytes.
        limit: usize,
    },
}

/// A response could not be matched to an outstanding request.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CorrelationError {
    /// No request with this id is outstanding (never sent, or already resolved).
    #[error("no outstanding request with id {0}")]
    Unknown(String),

    /// A request with this id is already outstanding.
    #[error("request id {0} is already outstanding")]
    Duplicate(String),

    /// A request with this id was already answered; ids are not reused.
    #[error("request id {0} was already used")]
    Reused(String),
}

/// The server answered, but not with something usable.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The server returned a JSON-RPC error object.
    #[error("{method} failed with code {code}: {message}")]
    ErrorResponse {
        /// The method whose request was rejected.
        method: &'static str,
        /// JSON-RPC error code.
        code: i64,
        /// Error message from the server.
        message: String,
    },

    /// The response carries neither `result` nor `error`.
    #[error("{method} response has no result")]
    MissingResult {
        /// The method whose response was empty.
        method: &'static str,
    },

    /// The tool result has no text content.
    #[error("tool result contains no text content")]
    EmptyPayload,

    /// The tool reported `isError: true`.
    #[error("tool reported an error: {0}")]
    ToolError(String),
}

/// Writing the fetched payload failed.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// The destination could not be written.
    #[error("failed to write {path}")]
    Write {
        /// Destination path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Standard output could not be written.
    #[error("failed to write to stdout")]
    Stdout(#[source] std::io::Error),
}

/// The connection to the server process broke down.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The server process could not be started.
    #[error("failed to spawn `{command}`")]
    Spawn {
        /// Program that was launched.
        command: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A stdio pipe was not captured after spawning.
    #[error("failed to capture server {0}")]
    MissingPipe(&'static str),

    /// The server closed its output stream.
    #[error("server closed its output stream")]
    Closed,

    /// Reading from or writing to the server failed.
    #[error("server stream I/O failed")]
    Io(#[source] std::io::Error),

    /// An outgoing message could not be serialised.
    #[error("failed to serialise outgoing message")]
    Serialise(#[source] serde_json::Error),

    /// The sequence did not finish before the deadline.
    #[error("no result within {0:?}")]
    Timeout(Duration),
}

/// Top-level error of a client run.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The server's response could not be used.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The payload could not be persisted.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// The server connection failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The run was interrupted by a signal.
    #[error("interrupted")]
    Interrupted,
}
