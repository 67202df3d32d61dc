//! stdio transport to an MCP server subprocess.
//!
//! This module implements the client side of the MCP stdio transport:
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines
//! - Messages must not contain embedded newlines
//! - server stdin: receives messages from the client
//! - server stdout: sends messages to the client
//! - server stderr: may be used for logging (not MCP messages)
//!
//! # Event model
//!
//! [`Transport::next_event`] waits on stdout and stderr at once and returns
//! whichever produced data first. It only uses `read` and `read_buf`, which
//! are cancel-safe, so the caller may race it against timers and signals in
//! `tokio::select!`. Output chunks are raw bytes: framing is the reader's
//! job. Diagnostics are buffered here and reported one whole line at a time.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use bytes::BytesMut;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio_util::codec::{Decoder, LinesCodec};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::TransportError;

/// Size of a single read from the server's pipes.
const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Longest stderr line reported as a diagnostic.
const MAX_DIAGNOSTIC_LINE_BYTES: usize = 64 * 1024;

/// How long [`Transport::terminate`] waits for the child to exit.
const EXIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Something that happened on the server's output streams.
#[derive(Debug)]
pub enum TransportEvent {
    /// Bytes read from stdout.
    Output(Vec<u8>),
    /// One line read from stderr, without its newline.
    Diagnostic(String),
    /// stdout reached end of file.
    Closed,
    /// Reading stdout failed.
    Failed(io::Error),
}

/// Handles to a running MCP server's stdio.
pub struct Transport<W, R, E> {
    /// Server stdin.
    writer: W,
    /// Server stdout.
    output: R,
    /// Server stderr; `None` once it reached end of file.
    diagnostics: Option<E>,
    /// The server process, if this transport owns one.
    child: Option<Child>,
    output_buf: Box<[u8]>,
    /// stderr bytes not yet split into lines.
    diagnostic_buf: BytesMut,
    diagnostic_lines: LinesCodec,
}

impl Transport<ChildStdin, ChildStdout, ChildStderr> {
    /// Spawns the configured server with piped stdio.
    ///
    /// The child is killed if the transport is dropped without calling
    /// [`terminate`](Self::terminate).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Spawn`] if the program cannot be started.
    pub fn spawn(config: &ServerConfig) -> Result<Self, TransportError> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| TransportError::Spawn {
            command: config.command.clone(),
            source,
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or(TransportError::MissingPipe("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(TransportError::MissingPipe("stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(TransportError::MissingPipe("stderr"))?;

        info!(
            command = %config.command,
            args = ?config.args,
            pid = child.id(),
            "Started MCP server"
        );

        let mut transport = Self::from_streams(stdin, stdout, stderr);
        transport.child = Some(child);
        Ok(transport)
    }
}

impl<W, R, E> Transport<W, R, E>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    /// Wraps already-connected streams. No process is owned.
    pub fn from_streams(writer: W, output: R, diagnostics: E) -> Self {
        Self {
            writer,
            output,
            diagnostics: Some(diagnostics),
            child: None,
            output_buf: vec![0; READ_CHUNK_BYTES].into_boxed_slice(),
            diagnostic_buf: BytesMut::new(),
            diagnostic_lines: LinesCodec::new_with_max_length(MAX_DIAGNOSTIC_LINE_BYTES),
        }
    }

    /// Serialises `message` as one line and writes it to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn send<T: Serialize>(&mut self, message: &T) -> Result<(), TransportError> {
        let json = serde_json::to_string(message).map_err(TransportError::Serialise)?;

        // MCP spec: messages must not contain embedded newlines
        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );
        debug!(message = %json, "Sending");

        self.writer
            .write_all(json.as_bytes())
            .await
            .map_err(TransportError::Io)?;
        self.writer.write_all(b"\n").await.map_err(TransportError::Io)?;
        self.writer.flush().await.map_err(TransportError::Io)?;

        Ok(())
    }

    /// Waits for the next chunk on stdout or line on stderr.
    ///
    /// End of file on stderr is absorbed once its last line is reported;
    /// end of file on stdout is reported as [`TransportEvent::Closed`].
    pub async fn next_event(&mut self) -> TransportEvent {
        loop {
            if let Some(line) = self.next_diagnostic(false) {
                return TransportEvent::Diagnostic(line);
            }

            let Self {
                output,
                diagnostics,
                output_buf,
                diagnostic_buf,
                ..
            } = &mut *self;

            let Some(stderr) = diagnostics.as_mut() else {
                return read_output(output, output_buf).await;
            };
            diagnostic_buf.reserve(READ_CHUNK_BYTES);

            let stderr_done = tokio::select! {
                event = read_output(output, output_buf) => return event,

                read = stderr.read_buf(diagnostic_buf) => match read {
                    Ok(0) => {
                        debug!("Server stderr closed");
                        true
                    }
                    Ok(_) => false,
                    Err(e) => {
                        warn!(error = %e, "Failed to read server stderr, ignoring it from now on");
                        true
                    }
                },
            };

            if stderr_done {
                self.diagnostics = None;
                if let Some(line) = self.next_diagnostic(true) {
                    return TransportEvent::Diagnostic(line);
                }
            }
        }
    }

    /// Takes the next complete stderr line, or the unterminated tail once
    /// stderr has ended. Lines that cannot be decoded are logged and skipped.
    fn next_diagnostic(&mut self, at_eof: bool) -> Option<String> {
        loop {
            let line = if at_eof {
                self.diagnostic_lines.decode_eof(&mut self.diagnostic_buf)
            } else {
                self.diagnostic_lines.decode(&mut self.diagnostic_buf)
            };
            match line {
                Ok(line) => return line,
                Err(e) => warn!(error = %e, "Skipping unreadable server diagnostic"),
            }
        }
    }

    /// Stops the server: closes its stdin, kills it, and waits briefly for it
    /// to exit. Safe to call more than once.
    pub async fn terminate(&mut self) {
        if let Err(e) = self.writer.shutdown().await {
            debug!(error = %e, "Server stdin already closed");
        }

        let Some(mut child) = self.child.take() else {
            return;
        };

        if let Err(e) = child.start_kill() {
            debug!(error = %e, "Server already exited");
        }

        match tokio::time::timeout(EXIT_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => info!(%status, "MCP server stopped"),
            Ok(Err(e)) => warn!(error = %e, "Failed to wait for MCP server"),
            Err(_) => warn!(timeout = ?EXIT_TIMEOUT, "MCP server did not exit in time"),
        }
    }
}

async fn read_output<R: AsyncRead + Unpin>(output: &mut R, buf: &mut [u8]) -> TransportEvent {
    match output.read(buf).await {
        Ok(0) => TransportEvent::Closed,
        Ok(n) => TransportEvent::Output(buf[..n].to_vec()),
        Err(e) => TransportEvent::Failed(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::{JsonRpcRequest, RequestId};
    use serde_json::json;

    #[tokio::test]
    async fn send_writes_one_line() {
        let writer = tokio_test::io::Builder::new()
            .write(br#"{"jsonrpc":"2.0","id":1,"method":"ping","params":{}}"#)
            .write(b"\n")
            .build();
        let mut transport =
            Transport::from_streams(writer, tokio::io::empty(), tokio::io::empty());

        let request = JsonRpcRequest::new(RequestId::Number(1), "ping", json!({}));
        transport.send(&request).await.unwrap();
    }

    #[tokio::test]
    async fn output_and_closed_events() {
        let output = tokio_test::io::Builder::new()
            .read(b"{\"jsonrpc\":\"2.0\"")
            .read(b",\"id\":1}\n")
            .build();
        let mut transport = Transport::from_streams(tokio::io::sink(), output, tokio::io::empty());

        let TransportEvent::Output(first) = transport.next_event().await else {
            panic!("expected output");
        };
        assert_eq!(first, b"{\"jsonrpc\":\"2.0\"");

        let TransportEvent::Output(second) = transport.next_event().await else {
            panic!("expected output");
        };
        assert_eq!(second, b",\"id\":1}\n");

        assert!(matches!(transport.next_event().await, TransportEvent::Closed));
    }

    #[tokio::test]
    async fn diagnostics_are_reported_and_stderr_eof_absorbed() {
        let (mut server_out, output) = tokio::io::duplex(64);
        let (mut server_err, stderr) = tokio::io::duplex(64);
        let mut transport = Transport::from_streams(tokio::io::sink(), output, stderr);

        server_err.write_all(b"Server ready\n").await.unwrap();
        let TransportEvent::Diagnostic(text) = transport.next_event().await else {
            panic!("expected diagnostic");
        };
        assert_eq!(text, "Server ready");

        drop(server_err);
        server_out.write_all(b"{}\n").await.unwrap();
        assert!(matches!(
            transport.next_event().await,
            TransportEvent::Output(_)
        ));

        drop(server_out);
        assert!(matches!(transport.next_event().await, TransportEvent::Closed));
    }

    #[tokio::test]
    async fn diagnostics_are_reassembled_into_lines() {
        let (_server_out, output) = tokio::io::duplex(64);
        let stderr = tokio_test::io::Builder::new()
            .read(b"Atlas Docs MCP ")
            .read(b"server running\nsecond line\nno newline")
            .build();
        let mut transport = Transport::from_streams(tokio::io::sink(), output, stderr);

        for expected in ["Atlas Docs MCP server running", "second line", "no newline"] {
            let TransportEvent::Diagnostic(text) = transport.next_event().await else {
                panic!("expected diagnostic {expected:?}");
            };
            assert_eq!(text, expected);
        }
        assert!(transport.diagnostics.is_none());
    }

    #[tokio::test]
    async fn terminate_without_child_is_harmless() {
        let mut transport =
            Transport::from_streams(tokio::io::sink(), tokio::io::empty(), tokio::io::empty());
        transport.terminate().await;
        transport.terminate().await;
    }
}
