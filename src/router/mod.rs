//! Request Router
//!
//! Finds the shard owning a key and gets the request executed there: inline
//! when this core owns it, otherwise through the fabric with a pending call
//! that resolves when the response comes back or the deadline passes.
//!
//! The router also serves this core's side of the fabric: it executes
//! requests other cores send here and hands their responses back to waiting
//! callers.

mod pending;

use std::cell::{Cell, RefCell};
use std::hash::Hasher;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use rustc_hash::FxHasher;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::fabric::{Envelope, Fabric, Inbox, Payload};
use crate::models::{Request, Response};
use crate::shard::Shard;

pub use pending::{PendingCall, PendingCalls};
use pending::PendingGuard;

// == Shard Assignment ==
/// Deterministic hash of a key. Independent of process, thread and run.
pub fn stable_hash(key: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(key);
    hasher.finish()
}

/// Shard that owns `key` among `shard_count` shards.
pub fn shard_for(key: &[u8], shard_count: usize) -> usize {
    (stable_hash(key) % shard_count.max(1) as u64) as usize
}

/// Per-core routing counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    /// Requests executed on this core's own shard
    pub local: u64,
    /// Requests sent to another core
    pub remote: u64,
    /// Requests answered for other cores
    pub served: u64,
    pub timeouts: u64,
    /// Responses that arrived after their caller stopped waiting
    pub unmatched: u64,
    /// Inbound requests dropped because their deadline passed in transit
    pub expired_in_transit: u64,
}

#[derive(Debug, Default)]
struct Counters {
    local: Cell<u64>,
    remote: Cell<u64>,
    served: Cell<u64>,
    timeouts: Cell<u64>,
    expired_in_transit: Cell<u64>,
}

fn bump(counter: &Cell<u64>) {
    counter.set(counter.get() + 1);
}

#[derive(Debug)]
pub struct Router {
    core_id: usize,
    config: Arc<Config>,
    fabric: Arc<Fabric>,
    shard: Rc<RefCell<Shard>>,
    pending: PendingCalls,
    counters: Counters,
}

impl Router {
    pub fn new(
        core_id: usize,
        config: Arc<Config>,
        fabric: Arc<Fabric>,
        shard: Rc<RefCell<Shard>>,
    ) -> Self {
        Self {
            core_id,
            config,
            fabric,
            shard,
            pending: PendingCalls::new(),
            counters: Counters::default(),
        }
    }

    pub fn core_id(&self) -> usize {
        self.core_id
    }

    pub fn pending(&self) -> &PendingCalls {
        &self.pending
    }

    // == Submit ==
    /// Routes one request and resolves exactly once with its response.
    ///
    /// Every failure comes back as an ordinary response carrying the matching
    /// status and the caller's correlation id.
    pub async fn submit(&self, request: Request) -> Response {
        let correlation_id = request.correlation_id;
        match self.route(request).await {
            Ok(response) => response,
            Err(err) => {
                match &err {
                    CacheError::Timeout => debug!(core = self.core_id, "request timed out"),
                    CacheError::MalformedRequest(reason) => {
                        debug!(core = self.core_id, %reason, "rejected malformed request")
                    }
                    other => warn!(core = self.core_id, error = %other, "request failed"),
                }
                Response::from_error(&err, correlation_id)
            }
        }
    }

    async fn route(&self, mut request: Request) -> Result<Response> {
        request.validate()?;
        let deadline = *request
            .deadline
            .get_or_insert_with(|| Instant::now() + self.config.default_deadline());

        let destination = shard_for(&request.key, self.fabric.cores());
        if destination == self.core_id {
            bump(&self.counters.local);
            return Ok(self.shard.borrow_mut().execute(request));
        }

        if Instant::now() >= deadline {
            bump(&self.counters.timeouts);
            return Err(CacheError::Timeout);
        }

        bump(&self.counters.remote);
        let (call_id, reply) = self.pending.register(deadline);
        let guard = PendingGuard::new(&self.pending, call_id);

        let envelope = Envelope::request(call_id, self.core_id, deadline, request);
        self.fabric.send(self.core_id, destination, envelope).await?;

        match tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), reply).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(CacheError::RoutingUnavailable(destination)),
            Err(_) => {
                // unregister first so a late response finds nothing to match
                drop(guard);
                bump(&self.counters.timeouts);
                Err(CacheError::Timeout)
            }
        }
    }

    // == Fabric Side ==
    /// Handles one envelope delivered to this core.
    pub async fn handle_envelope(&self, envelope: Envelope) {
        let Envelope {
            correlation_id,
            origin_core,
            deadline,
            payload,
        } = envelope;

        match payload {
            Payload::Request(request) => {
                if Instant::now() >= deadline {
                    bump(&self.counters.expired_in_transit);
                    debug!(
                        core = self.core_id,
                        origin_core, "dropping request whose deadline passed in transit"
                    );
                    return;
                }

                let response = self.shard.borrow_mut().execute(request);
                bump(&self.counters.served);

                let reply = Envelope::response(correlation_id, self.core_id, deadline, response);
                if let Err(err) = self.fabric.send(self.core_id, origin_core, reply).await {
                    warn!(
                        core = self.core_id,
                        origin_core,
                        error = %err,
                        "could not return response; caller will time out"
                    );
                }
            }
            Payload::Response(response) => {
                if !self.pending.resolve(correlation_id, response) {
                    debug!(
                        core = self.core_id,
                        origin_core, correlation_id, "discarding unmatched response"
                    );
                }
            }
        }
    }

    /// Serves the fabric until the task is aborted.
    pub async fn serve_fabric(self: Rc<Self>, mut inbox: Inbox) {
        loop {
            let envelope = inbox.recv().await;
            self.handle_envelope(envelope).await;
        }
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            local: self.counters.local.get(),
            remote: self.counters.remote.get(),
            served: self.counters.served.get(),
            timeouts: self.counters.timeouts.get(),
            unmatched: self.pending.unmatched(),
            expired_in_transit: self.counters.expired_in_transit.get(),
        }
    }
}
