//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// MCP server process settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Which document to fetch and where to put it.
    #[serde(default)]
    pub docs: DocsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("server.command", self.server.command.as_str()),
            ("docs.tool_name", self.docs.tool_name.as_str()),
            ("docs.argument_key", self.docs.argument_key.as_str()),
            ("docs.doc_identifier", self.docs.doc_identifier.as_str()),
            ("docs.list_tool_name", self.docs.list_tool_name.as_str()),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError {
                    message: format!("{field} must not be empty"),
                });
            }
        }

        if self.server.response_timeout_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "server.response_timeout_secs must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// MCP server process configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Program to launch.
    #[serde(default = "default_command")]
    pub command: String,

    /// Arguments passed to the program.
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Delay between spawning the server and sending `initialize`, in ms.
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,

    /// Time allowed for the whole exchange after startup, in seconds.
    #[serde(default = "default_response_timeout_secs")]
    pub response_timeout_secs: u64,

    /// Send `notifications/initialized` after the handshake.
    #[serde(default = "default_true")]
    pub send_initialized: bool,
}

impl ServerConfig {
    /// Startup delay as a [`Duration`].
    #[must_use]
    pub const fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    /// Response timeout as a [`Duration`].
    #[must_use]
    pub const fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
            startup_delay_ms: default_startup_delay_ms(),
            response_timeout_secs: default_response_timeout_secs(),
            send_initialized: default_true(),
        }
    }
}

fn default_command() -> String {
    "npx".to_string()
}

fn default_args() -> Vec<String> {
    vec!["-y".to_string(), "@cartographai/atlas-docs-mcp".to_string()]
}

const fn default_startup_delay_ms() -> u64 {
    1000
}

const fn default_response_timeout_secs() -> u64 {
    120
}

const fn default_true() -> bool {
    true
}

/// Document selection and output configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocsConfig {
    /// Where the fetched document is written.
    #[serde(default = "default_docs_path", alias = "docsPath")]
    pub docs_path: PathBuf,

    /// Tool returning a full document.
    #[serde(default = "default_tool_name", alias = "toolName")]
    pub tool_name: String,

    /// Argument key carrying the document identifier.
    ///
    /// Older servers expect `docName`, newer ones `name`.
    #[serde(default = "default_argument_key", alias = "argumentKey")]
    pub argument_key: String,

    /// Which document to fetch.
    #[serde(default = "default_doc_identifier", alias = "docIdentifier")]
    pub doc_identifier: String,

    /// Tool listing available documents.
    #[serde(default = "default_list_tool_name", alias = "listToolName")]
    pub list_tool_name: String,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            docs_path: default_docs_path(),
            tool_name: default_tool_name(),
            argument_key: default_argument_key(),
            doc_identifier: default_doc_identifier(),
            list_tool_name: default_list_tool_name(),
        }
    }
}

fn default_docs_path() -> PathBuf {
    PathBuf::from("ModelContextProtocol.md")
}

fn default_tool_name() -> String {
    "get_docs_full".to_string()
}

fn default_argument_key() -> String {
    "docName".to_string()
}

fn default_doc_identifier() -> String {
    "ModelContextProtocol".to_string()
}

fn default_list_tool_name() -> String {
    "list_docs".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
