//! The single-task client loop.
//!
//! [`DocsClient`] owns every piece of per-connection state: the transport,
//! the frame reader and the sequencer (which owns the correlator). One
//! `tokio::select!` loop reacts to four event sources:
//!
//! - the interrupt future → stop immediately
//! - the startup timer → send `initialize`
//! - the response deadline → fail
//! - transport events → decode, correlate, advance the sequence
//!
//! Nothing runs in parallel, so none of that state needs locking. The server
//! is terminated on every exit path of [`DocsClient::run_until`].

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{ClientError, TransportError};
use crate::mcp::framing::FrameReader;
use crate::mcp::sequencer::{Action, SequenceState, Sequencer};
use crate::mcp::transport::{Transport, TransportEvent};
use crate::sink::PayloadSink;

/// Timing of a client run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Wait between spawning the server and sending `initialize`.
    ///
    /// The stdio transport has no readiness signal, so this is a fixed delay.
    pub startup_delay: Duration,
    /// Time allowed for the exchange once the startup delay has elapsed.
    pub response_timeout: Duration,
}

impl ClientOptions {
    /// Reads the timings from the server configuration.
    #[must_use]
    pub const fn from_config(config: &ServerConfig) -> Self {
        Self {
            startup_delay: config.startup_delay(),
            response_timeout: config.response_timeout(),
        }
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

/// Drives one MCP server through initialize → tool call → deliver.
pub struct DocsClient<W, R, E, K> {
    transport: Transport<W, R, E>,
    reader: FrameReader,
    sequencer: Sequencer,
    sink: K,
    options: ClientOptions,
}

impl<W, R, E, K> DocsClient<W, R, E, K>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
    K: PayloadSink,
{
    /// Creates a client for a freshly started server.
    pub fn new(
        transport: Transport<W, R, E>,
        sequencer: Sequencer,
        sink: K,
        options: ClientOptions,
    ) -> Self {
        Self {
            transport,
            reader: FrameReader::new(),
            sequencer,
            sink,
            options,
        }
    }

    /// Current sequence state.
    #[must_use]
    pub const fn state(&self) -> SequenceState {
        self.sequencer.state()
    }

    /// The payload sink.
    #[must_use]
    pub const fn sink(&self) -> &K {
        &self.sink
    }

    /// Server output lines skipped because they were not JSON-RPC.
    #[must_use]
    pub const fn discarded_lines(&self) -> usize {
        self.reader.discarded()
    }

    /// Runs the sequence until it finishes or `shutdown` resolves, then
    /// terminates the server.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Interrupted`] if `shutdown` fired first, or the
    /// protocol, persistence or transport error that failed the sequence.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), ClientError>
    where
        F: Future<Output = ()>,
    {
        let result = self.drive(shutdown).await;
        self.transport.terminate().await;
        self.reader.reset();
        result
    }

    async fn drive<F>(&mut self, shutdown: F) -> Result<(), ClientError>
    where
        F: Future<Output = ()>,
    {
        // Saturates so an effectively unbounded timeout cannot overflow.
        let limit = self
            .options
            .startup_delay
            .saturating_add(self.options.response_timeout);
        let startup = tokio::time::sleep(self.options.startup_delay);
        let deadline = tokio::time::sleep(limit);
        tokio::pin!(shutdown, startup, deadline);
        let mut started = false;

        loop {
            let actions = tokio::select! {
                () = &mut shutdown => {
                    warn!(state = ?self.sequencer.state(), "Interrupted, abandoning sequence");
                    return Err(ClientError::Interrupted);
                }

                () = &mut startup, if !started => {
                    started = true;
                    self.sequencer.start()
                }

                () = &mut deadline => {
                    self.sequencer.on_transport_closed(TransportError::Timeout(limit))
                }

                event = self.transport.next_event() => self.on_event(event),
            };

            if let Some(result) = self.execute(actions).await {
                return result;
            }
        }
    }

    fn on_event(&mut self, event: TransportEvent) -> Vec<Action> {
        match event {
            TransportEvent::Output(chunk) => {
                let messages = self.reader.feed(&chunk);
                let mut actions = Vec::new();
                for message in &messages {
                    actions.extend(self.sequencer.on_message(message));
                }
                actions
            }
            TransportEvent::Diagnostic(line) => {
                let line = line.trim_end();
                if !line.is_empty() {
                    info!(server = line, "Server diagnostic");
                }
                Vec::new()
            }
            TransportEvent::Closed => {
                debug!(pending_bytes = self.reader.pending_bytes(), "Server stdout closed");
                let mut actions = Vec::new();
                for message in &self.reader.finish() {
                    actions.extend(self.sequencer.on_message(message));
                }
                actions.extend(self.sequencer.on_transport_closed(TransportError::Closed));
                actions
            }
            TransportEvent::Failed(e) => self.sequencer.on_transport_closed(TransportError::Io(e)),
        }
    }

    /// Carries out actions in order. Follow-up actions produced along the way
    /// run before the remaining ones. Returns the outcome once a
    /// [`Action::Finish`] is reached.
    async fn execute(&mut self, actions: Vec<Action>) -> Option<Result<(), ClientError>> {
        let mut queue = VecDeque::from(actions);

        while let Some(action) = queue.pop_front() {
            let follow_up = match action {
                Action::Send(request) => {
                    info!(method = %request.method, id = %request.id, "Sending request");
                    match self.transport.send(&request).await {
                        Ok(()) => Vec::new(),
                        Err(e) => self.sequencer.on_transport_closed(e),
                    }
                }
                Action::Notify(notification) => {
                    debug!(method = %notification.method, "Sending notification");
                    match self.transport.send(&notification).await {
                        Ok(()) => Vec::new(),
                        Err(e) => self.sequencer.on_transport_closed(e),
                    }
                }
                Action::Deliver(payload) => {
                    let result = self.sink.deliver(&payload).map_err(ClientError::from);
                    self.sequencer.on_delivered(result)
                }
                Action::Finish(result) => return Some(result),
            };

            for action in follow_up.into_iter().rev() {
                queue.push_front(action);
            }
        }

        None
    }
}

/// Resolves when the process receives SIGINT or SIGTERM.
///
/// If the handlers cannot be installed, never resolves.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigint, mut sigterm) =
        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Failed to install signal handlers");
                return std::future::pending().await;
            }
        };

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, initiating shutdown"),
        _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown"),
    }
}

/// Resolves when the process receives Ctrl+C.
///
/// If the handler cannot be installed, never resolves.
#[cfg(windows)]
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating shutdown"),
        Err(e) => {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PersistenceError, ProtocolError};
    use crate::mcp::sequencer::ToolRequest;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    #[derive(Default)]
    struct Recorded(Vec<String>);

    impl PayloadSink for Recorded {
        fn deliver(&mut self, payload: &str) -> Result<(), PersistenceError> {
            self.0.push(payload.to_string());
            Ok(())
        }
    }

    struct Broken;

    impl PayloadSink for Broken {
        fn deliver(&mut self, _payload: &str) -> Result<(), PersistenceError> {
            Err(PersistenceError::Stdout(std::io::Error::other("disk full")))
        }
    }

    const FAST: ClientOptions = ClientOptions {
        startup_delay: Duration::ZERO,
        response_timeout: Duration::from_secs(5),
    };

    struct Server {
        requests: tokio::io::Lines<BufReader<DuplexStream>>,
        output: DuplexStream,
        _stderr: DuplexStream,
    }

    impl Server {
        async fn expect(&mut self, method: &str) -> serde_json::Value {
            let line = self.requests.next_line().await.unwrap().unwrap();
            let value: serde_json::Value = serde_json::from_str(&line).unwrap();
            assert_eq!(value["method"], method);
            value
        }

        async fn reply(&mut self, line: &str) {
            self.output.write_all(line.as_bytes()).await.unwrap();
            self.output.write_all(b"\n").await.unwrap();
        }
    }

    fn connect<K: PayloadSink>(
        sink: K,
        options: ClientOptions,
    ) -> (DocsClient<DuplexStream, DuplexStream, DuplexStream, K>, Server) {
        let (client_in, server_in) = tokio::io::duplex(4096);
        let (server_out, client_out) = tokio::io::duplex(4096);
        let (server_err, client_err) = tokio::io::duplex(4096);

        let transport = Transport::from_streams(client_in, client_out, client_err);
        let tool = ToolRequest::document("get_docs_full", "docName", "ModelContextProtocol");
        let client = DocsClient::new(transport, Sequencer::new(tool, true), sink, options);

        let server = Server {
            requests: BufReader::new(server_in).lines(),
            output: server_out,
            _stderr: server_err,
        };
        (client, server)
    }

    #[tokio::test]
    async fn delivers_tool_payload() {
        let (mut client, mut server) = connect(Recorded::default(), FAST);

        let script = async move {
            server.expect("initialize").await;
            server.reply(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).await;
            server.expect("notifications/initialized").await;
            let call = server.expect("tools/call").await;
            assert_eq!(call["params"]["arguments"]["docName"], "ModelContextProtocol");
            server
                .reply(r##"{"jsonrpc":"2.0","id":2,"result":{"content":[{"text":"# Doc"}]}}"##)
                .await;
            server
        };

        let (result, _server) = tokio::join!(client.run_until(std::future::pending()), script);
        result.unwrap();
        assert_eq!(client.state(), SequenceState::Done);
        assert_eq!(client.sink().0, vec!["# Doc".to_string()]);
    }

    #[tokio::test]
    async fn sink_failure_fails_the_run() {
        let (mut client, mut server) = connect(Broken, FAST);

        let script = async move {
            server.expect("initialize").await;
            server.reply(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).await;
            server.expect("notifications/initialized").await;
            server.expect("tools/call").await;
            server
                .reply(r##"{"jsonrpc":"2.0","id":2,"result":{"content":[{"text":"# Doc"}]}}"##)
                .await;
            server
        };

        let (result, _server) = tokio::join!(client.run_until(std::future::pending()), script);
        assert!(matches!(result, Err(ClientError::Persistence(_))));
        assert_eq!(client.state(), SequenceState::Failed);
    }

    #[tokio::test]
    async fn tool_error_fails_the_run() {
        let (mut client, mut server) = connect(Recorded::default(), FAST);

        let script = async move {
            server.expect("initialize").await;
            server.reply(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).await;
            server.expect("notifications/initialized").await;
            server.expect("tools/call").await;
            server
                .reply(r#"{"jsonrpc":"2.0","id":2,"result":{"isError":true,"content":[{"text":"no such doc"}]}}"#)
                .await;
            server
        };

        let (result, _server) = tokio::join!(client.run_until(std::future::pending()), script);
        assert!(matches!(
            result,
            Err(ClientError::Protocol(ProtocolError::ToolError(_)))
        ));
        assert!(client.sink().0.is_empty());
    }

    #[tokio::test]
    async fn final_response_without_newline_is_delivered_on_close() {
        let (mut client, mut server) = connect(Recorded::default(), FAST);

        let script = async move {
            server.expect("initialize").await;
            server.reply(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).await;
            server.expect("notifications/initialized").await;
            server.expect("tools/call").await;
            server
                .output
                .write_all(br##"{"jsonrpc":"2.0","id":2,"result":{"content":[{"text":"# Doc"}]}}"##)
                .await
                .unwrap();
            // Dropping the server closes its stdout.
        };

        let (result, ()) = tokio::join!(client.run_until(std::future::pending()), script);
        result.unwrap();
        assert_eq!(client.sink().0, vec!["# Doc".to_string()]);
    }

    #[tokio::test]
    async fn unbounded_timeout_does_not_overflow() {
        let options = ClientOptions {
            startup_delay: Duration::from_secs(1),
            response_timeout: Duration::from_secs(u64::MAX),
        };
        let (mut client, mut server) = connect(Recorded::default(), options);

        let script = async move {
            server.expect("initialize").await;
            server.reply(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).await;
            server.expect("notifications/initialized").await;
            server.expect("tools/call").await;
            server
                .reply(r##"{"jsonrpc":"2.0","id":2,"result":{"content":[{"text":"# Doc"}]}}"##)
                .await;
            server
        };

        let (result, _server) = tokio::join!(client.run_until(std::future::pending()), script);
        result.unwrap();
        assert_eq!(client.sink().0, vec!["# Doc".to_string()]);
    }

    #[tokio::test]
    async fn silent_server_hits_deadline() {
        let options = ClientOptions {
            startup_delay: Duration::ZERO,
            response_timeout: Duration::from_millis(50),
        };
        let (mut client, _server) = connect(Recorded::default(), options);

        let result = client.run_until(std::future::pending()).await;
        assert!(matches!(
            result,
            Err(ClientError::Transport(TransportError::Timeout(_)))
        ));
        assert_eq!(client.state(), SequenceState::Failed);
    }
}
