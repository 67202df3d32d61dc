//! Matching responses to the requests that caused them.
//!
//! Every outgoing request gets a fresh integer id. The correlator records
//! which step of the sequence each id stands for and hands that step back
//! exactly once, when the matching response arrives. Ids start at 1 and are
//! never reused within a connection.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::CorrelationError;
use crate::mcp::protocol::{JsonRpcRequest, Message, RequestId};

/// Outstanding request table keyed by request id.
#[derive(Debug)]
pub struct Correlator<S> {
    next_id: i64,
    pending: HashMap<RequestId, S>,
    /// Ids whose response has been consumed.
    retired: HashSet<RequestId>,
}

impl<S: Copy + Debug> Correlator<S> {
    /// Creates an empty table whose first id will be 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 1,
            pending: HashMap::new(),
            retired: HashSet::new(),
        }
    }

    /// Reserves the next unused id.
    pub fn next_id(&mut self) -> RequestId {
        let id = RequestId::Number(self.next_id);
        self.next_id += 1;
        id
    }

    /// Records that a response to `id` completes `step`.
    ///
    /// Must be called before the request is written, so the response can
    /// never arrive first. A numeric id beyond the counter moves the counter
    /// past it, so [`next_id`](Self::next_id) never hands it out again.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::Duplicate`] if `id` is already outstanding,
    /// or [`CorrelationError::Reused`] if its response was already consumed.
    pub fn register(&mut self, id: RequestId, step: S) -> Result<(), CorrelationError> {
        if self.pending.contains_key(&id) {
            return Err(CorrelationError::Duplicate(id.to_string()));
        }
        if self.retired.contains(&id) {
            return Err(CorrelationError::Reused(id.to_string()));
        }
        if let RequestId::Number(n) = &id {
            self.next_id = self.next_id.max(n.saturating_add(1));
        }
        self.pending.insert(id, step);
        Ok(())
    }

    /// Builds a request with a fresh id and registers it for `step`.
    pub fn request(&mut self, method: &str, params: Value, step: S) -> JsonRpcRequest {
        let mut id = self.next_id();
        while let Err(error) = self.register(id.clone(), step) {
            debug!(error = %error, "Skipping id taken by an explicit registration");
            id = self.next_id();
        }
        JsonRpcRequest::new(id, method, params)
    }

    /// Returns the step a response completes, removing its entry.
    ///
    /// Notifications (no id), requests from the server (a `method` alongside
    /// the id) and responses to unknown or already resolved ids yield `None`;
    /// the last two are logged.
    pub fn resolve(&mut self, message: &Message) -> Option<S> {
        let Some(id) = message.id.as_ref() else {
            debug!(method = ?message.method, "Ignoring server notification");
            return None;
        };

        if !message.is_response() {
            warn!(%id, method = ?message.method, "Ignoring request from server");
            return None;
        }

        if let Some(step) = self.pending.remove(id) {
            debug!(%id, ?step, "Response matched outstanding request");
            self.retired.insert(id.clone());
            return Some(step);
        }

        let error = CorrelationError::Unknown(id.to_string());
        warn!(error = %error, "Ignoring unexpected response");
        None
    }

    /// Number of requests still awaiting a response.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }
}

impl<S: Copy + Debug> Default for Correlator<S> {
    fn default() -> Self {
        Self::new()
    }
}
