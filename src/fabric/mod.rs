//! Inter-core Messaging Fabric
//!
//! One bounded lock-free lane per ordered (source, destination) pair of
//! cores, plus one doorbell per destination. Only the source core pushes onto
//! a lane and only the destination core pops from it, so each lane is used
//! single-producer/single-consumer and delivery is FIFO per pair.
//!
//! ```text
//!   core 0 ──lane(0,1)──▶ core 1
//!   core 0 ◀──lane(1,0)── core 1
//! ```

mod envelope;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_queue::ArrayQueue;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::warn;

use crate::config::Config;
use crate::error::{CacheError, Result};

pub use envelope::{Envelope, EnvelopeKind, Payload};

/// Counters shared by every core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FabricStats {
    pub sent: u64,
    pub overloaded: u64,
}

pub struct Fabric {
    cores: usize,
    /// Indexed by `source * cores + destination`
    lanes: Vec<ArrayQueue<Envelope>>,
    doorbells: Vec<Notify>,
    running: Vec<AtomicBool>,
    drained: Vec<AtomicBool>,
    send_retries: usize,
    sent: AtomicU64,
    overloaded: AtomicU64,
}

impl std::fmt::Debug for Fabric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fabric")
            .field("cores", &self.cores)
            .field("send_retries", &self.send_retries)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Fabric {
    /// Builds the full mesh for `cores` cores. Every core starts out running.
    pub fn new(cores: usize, lane_capacity: usize, send_retries: usize) -> Self {
        Self {
            cores,
            lanes: (0..cores * cores)
                .map(|_| ArrayQueue::new(lane_capacity.max(1)))
                .collect(),
            doorbells: (0..cores).map(|_| Notify::new()).collect(),
            running: (0..cores).map(|_| AtomicBool::new(true)).collect(),
            drained: (0..cores).map(|_| AtomicBool::new(false)).collect(),
            send_retries,
            sent: AtomicU64::new(0),
            overloaded: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.cores, config.channel_capacity, config.send_retries)
    }

    pub fn cores(&self) -> usize {
        self.cores
    }

    fn lane(&self, source: usize, destination: usize) -> &ArrayQueue<Envelope> {
        &self.lanes[source * self.cores + destination]
    }

    fn check_route(&self, source: usize, destination: usize) -> Result<()> {
        if source >= self.cores {
            return Err(CacheError::RoutingUnavailable(source));
        }
        if !self.is_running(destination) {
            return Err(CacheError::RoutingUnavailable(destination));
        }
        Ok(())
    }

    // == Send ==
    /// Enqueues an envelope on the `source -> destination` lane.
    ///
    /// A full lane suspends the caller cooperatively and retries, up to the
    /// configured bound; after that the send fails with `Overloaded`.
    pub async fn send(&self, source: usize, destination: usize, envelope: Envelope) -> Result<()> {
        self.check_route(source, destination)?;

        let mut envelope = envelope;
        let mut attempts = 0;
        loop {
            match self.lane(source, destination).push(envelope) {
                Ok(()) => {
                    self.doorbells[destination].notify_one();
                    self.sent.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(rejected) => {
                    if attempts >= self.send_retries {
                        self.overloaded.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            source,
                            destination,
                            attempts,
                            "fabric lane saturated, giving up"
                        );
                        return Err(CacheError::Overloaded { destination });
                    }
                    attempts += 1;
                    envelope = rejected;
                    tokio::task::yield_now().await;
                    // the destination may have stopped while we were parked
                    self.check_route(source, destination)?;
                }
            }
        }
    }

    /// Receiving end for `core`. Exactly one inbox per core should exist.
    pub fn inbox(self: &Arc<Self>, core: usize) -> Inbox {
        Inbox {
            fabric: Arc::clone(self),
            core,
            cursor: 0,
        }
    }

    pub fn is_running(&self, core: usize) -> bool {
        self.running
            .get(core)
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Core has finished its own in-flight work but still serves the fabric.
    pub fn mark_drained(&self, core: usize) {
        if let Some(flag) = self.drained.get(core) {
            flag.store(true, Ordering::Release);
        }
    }

    pub fn all_drained(&self) -> bool {
        self.drained.iter().all(|flag| flag.load(Ordering::Acquire))
    }

    /// Core no longer accepts envelopes; senders get `RoutingUnavailable`.
    pub fn mark_stopped(&self, core: usize) {
        if let Some(flag) = self.running.get(core) {
            flag.store(false, Ordering::Release);
        }
        if let Some(bell) = self.doorbells.get(core) {
            bell.notify_one();
        }
    }

    /// Takes a core out of the topology entirely, e.g. when it failed to start.
    pub fn retire(&self, core: usize) {
        self.mark_drained(core);
        self.mark_stopped(core);
    }

    pub fn stats(&self) -> FabricStats {
        FabricStats {
            sent: self.sent.load(Ordering::Relaxed),
            overloaded: self.overloaded.load(Ordering::Relaxed),
        }
    }
}

// == Inbox ==
/// Per-core receiving end. Drains inbound lanes round-robin so one busy
/// source cannot starve the others.
#[derive(Debug)]
pub struct Inbox {
    fabric: Arc<Fabric>,
    core: usize,
    cursor: usize,
}

impl Inbox {
    pub fn core(&self) -> usize {
        self.core
    }

    pub fn try_recv(&mut self) -> Option<Envelope> {
        let cores = self.fabric.cores;
        for _ in 0..cores {
            let source = self.cursor;
            self.cursor = (self.cursor + 1) % cores;
            if let Some(envelope) = self.fabric.lane(source, self.core).pop() {
                return Some(envelope);
            }
        }
        None
    }

    /// Waits for the next envelope from any source.
    pub async fn recv(&mut self) -> Envelope {
        loop {
            if let Some(envelope) = self.try_recv() {
                return envelope;
            }
            // notify_one stores a permit, so a push racing this check is not lost
            self.fabric.doorbells[self.core].notified().await;
        }
    }
}
