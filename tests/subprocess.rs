//! Tests driving a real child process.
//!
//! A small `sh` script stands in for the MCP server: it reads requests from
//! stdin and echoes canned responses on stdout.

#![cfg(unix)]

use std::time::Duration;

use mcp_docs_fetch::config::ServerConfig;
use mcp_docs_fetch::error::{ClientError, TransportError};
use mcp_docs_fetch::mcp::{
    ClientOptions, DocsClient, SequenceState, Sequencer, ToolRequest, Transport,
};
use mcp_docs_fetch::sink::FileSink;
use tempfile::tempdir;

fn sh(script: &str) -> ServerConfig {
    ServerConfig {
        command: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        startup_delay_ms: 50,
        response_timeout_secs: 10,
        send_initialized: true,
    }
}

const SERVER_SCRIPT: &str = r##"
echo "docs server starting" >&2
read -r init
echo '{"jsonrpc":"2.0","id":1,"result":{"serverInfo":{"name":"fake"}}}'
read -r initialized
read -r call
echo '{"jsonrpc":"2.0","id":2,"result":{"content":[{"type":"text","text":"# Model Context Protocol"}]}}'
sleep 30
"##;

#[tokio::test]
async fn test_fetch_from_child_process_writes_file() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("ModelContextProtocol.md");

    let config = sh(SERVER_SCRIPT);
    let transport = Transport::spawn(&config).expect("Failed to spawn sh");
    let tool = ToolRequest::document("get_docs_full", "docName", "ModelContextProtocol");
    let mut client = DocsClient::new(
        transport,
        Sequencer::new(tool, config.send_initialized),
        FileSink::new(&path),
        ClientOptions::from_config(&config),
    );

    // The script sleeps after answering; returning promptly shows the child
    // was killed rather than waited for.
    let result = tokio::time::timeout(
        Duration::from_secs(10),
        client.run_until(std::future::pending()),
    )
    .await
    .expect("client hung");

    assert!(result.is_ok(), "run failed: {result:?}");
    assert_eq!(client.state(), SequenceState::Done);
    let written = std::fs::read_to_string(&path).expect("Failed to read output");
    assert_eq!(written, "# Model Context Protocol");
}

#[tokio::test]
async fn test_child_exit_before_handshake_fails() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("never.md");

    let config = sh("echo 'fatal: missing package' >&2; exit 3");
    let transport = Transport::spawn(&config).expect("Failed to spawn sh");
    let tool = ToolRequest::document("get_docs_full", "docName", "ModelContextProtocol");
    let mut client = DocsClient::new(
        transport,
        Sequencer::new(tool, true),
        FileSink::new(&path),
        ClientOptions::from_config(&config),
    );

    let result = client.run_until(std::future::pending()).await;

    assert!(matches!(
        result,
        Err(ClientError::Transport(TransportError::Closed))
    ));
    assert!(!path.exists());
}

#[tokio::test]
async fn test_interrupt_kills_child_process() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("never.md");
    let pid_file = dir.path().join("server.pid");

    // `exec` makes the sleeping process the one whose pid was recorded.
    let script = format!(
        "echo $$ > '{}'; read -r init; exec sleep 30",
        pid_file.display()
    );
    let config = sh(&script);
    let transport = Transport::spawn(&config).expect("Failed to spawn sh");
    let tool = ToolRequest::document("get_docs_full", "docName", "ModelContextProtocol");
    let mut client = DocsClient::new(
        transport,
        Sequencer::new(tool, true),
        FileSink::new(&path),
        ClientOptions::from_config(&config),
    );

    let interrupt = tokio::time::sleep(Duration::from_millis(500));
    let result = tokio::time::timeout(Duration::from_secs(10), client.run_until(interrupt))
        .await
        .expect("client did not stop after interrupt");

    assert!(matches!(result, Err(ClientError::Interrupted)));
    assert_eq!(client.state(), SequenceState::Initializing);
    assert!(!path.exists());

    let pid = std::fs::read_to_string(&pid_file).expect("Failed to read pid file");
    let alive = std::process::Command::new("sh")
        .args(["-c", &format!("kill -0 {}", pid.trim())])
        .status()
        .expect("Failed to run kill");
    assert!(!alive.success(), "server process {} still running", pid.trim());
}

#[tokio::test]
async fn test_spawn_missing_program_fails() {
    let config = ServerConfig {
        command: "definitely-not-an-mcp-server-binary".to_string(),
        ..ServerConfig::default()
    };
    let result = Transport::spawn(&config);

    assert!(matches!(result, Err(TransportError::Spawn { .. })));
}
