//! Per-core Reactor
//!
//! One cooperative run loop per core: a current-thread tokio runtime driving
//! a `LocalSet`. It hosts the submission intake, the fabric dispatcher, the
//! TTL sweeper and one task per accepted submission. Nothing here is shared
//! with other cores except the fabric.
//!
//! # Shutdown
//! 1. The shutdown signal closes the intake; already-queued submissions are
//!    still accepted, nothing new is.
//! 2. In-flight submissions finish, locally or by their cross-core call
//!    resolving or timing out.
//! 3. The core marks itself drained and keeps serving the fabric until every
//!    core is drained, so no peer's pending call loses its responder.
//! 4. The core marks itself stopped and the loop exits.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::{mpsc as std_mpsc, Arc};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::task::{self, LocalSet};
use tracing::{debug, info};

use crate::cache::CacheStats;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::fabric::Fabric;
use crate::models::{Request, Response};
use crate::router::{Router, RouterStats};
use crate::shard::Shard;
use crate::tasks::spawn_sweep_task;

const DRAIN_POLL: Duration = Duration::from_millis(1);

/// A request handed to a core by the listener, with the slot for its answer.
#[derive(Debug)]
pub struct Submission {
    pub request: Request,
    pub reply: oneshot::Sender<Response>,
}

/// Final state of one core, returned when its loop exits.
#[derive(Debug, Clone, Serialize)]
pub struct ShardReport {
    pub core_id: usize,
    pub cache: CacheStats,
    pub router: RouterStats,
}

/// Counts submissions still being worked on by this core.
#[derive(Debug, Default)]
struct InFlight {
    count: Cell<usize>,
    idle: Notify,
}

struct InFlightToken(Rc<InFlight>);

impl InFlight {
    fn enter(self: &Rc<Self>) -> InFlightToken {
        self.count.set(self.count.get() + 1);
        InFlightToken(Rc::clone(self))
    }

    async fn wait_idle(&self) {
        while self.count.get() > 0 {
            self.idle.notified().await;
        }
    }
}

impl Drop for InFlightToken {
    fn drop(&mut self) {
        let remaining = self.0.count.get() - 1;
        self.0.count.set(remaining);
        if remaining == 0 {
            self.0.idle.notify_one();
        }
    }
}

pub struct Reactor {
    core_id: usize,
    config: Arc<Config>,
    fabric: Arc<Fabric>,
    intake: mpsc::UnboundedReceiver<Submission>,
    shutdown: watch::Receiver<bool>,
}

impl Reactor {
    pub fn new(
        core_id: usize,
        config: Arc<Config>,
        fabric: Arc<Fabric>,
        intake: mpsc::UnboundedReceiver<Submission>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            core_id,
            config,
            fabric,
            intake,
            shutdown,
        }
    }

    /// Runs the core on the calling thread until shutdown completes.
    ///
    /// Reports readiness (or the runtime build failure) on `ready`. A core
    /// that cannot start retires itself from the fabric so its peers never
    /// wait on it.
    pub fn run(self, ready: std_mpsc::Sender<Result<()>>) -> Result<ShardReport> {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                self.fabric.retire(self.core_id);
                let err = CacheError::Startup(format!(
                    "core {}: failed to build runtime: {}",
                    self.core_id, err
                ));
                let _ = ready.send(Err(err.clone()));
                return Err(err);
            }
        };

        let local = LocalSet::new();
        Ok(local.block_on(&runtime, self.run_local(Some(ready))))
    }

    /// The run loop proper. Must be polled inside a `LocalSet`.
    pub async fn run_local(
        mut self,
        ready: Option<std_mpsc::Sender<Result<()>>>,
    ) -> ShardReport {
        let core_id = self.core_id;
        let shard = Rc::new(RefCell::new(Shard::new(
            core_id,
            self.config.shard_budget_bytes,
        )));
        let router = Rc::new(Router::new(
            core_id,
            Arc::clone(&self.config),
            Arc::clone(&self.fabric),
            Rc::clone(&shard),
        ));

        let inbox = self.fabric.inbox(core_id);
        let dispatcher = task::spawn_local(Rc::clone(&router).serve_fabric(inbox));
        let sweeper = spawn_sweep_task(
            Rc::clone(&shard),
            self.config.sweep_interval(),
            self.config.sweep_batch,
        );
        let in_flight = Rc::new(InFlight::default());

        if let Some(ready) = ready {
            let _ = ready.send(Ok(()));
        }
        debug!(core = core_id, "core running");

        let mut closing = false;
        loop {
            tokio::select! {
                submission = self.intake.recv() => match submission {
                    Some(Submission { request, mut reply }) => {
                        let router = Rc::clone(&router);
                        let token = in_flight.enter();
                        task::spawn_local(async move {
                            tokio::select! {
                                response = router.submit(request) => {
                                    let _ = reply.send(response);
                                }
                                // submitter gave up: dropping submit cancels its pending call
                                _ = reply.closed() => {}
                            }
                            drop(token);
                        });
                    }
                    None => break,
                },
                changed = self.shutdown.changed(), if !closing => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        closing = true;
                        self.intake.close();
                        debug!(core = core_id, "intake closed");
                    }
                }
            }
        }

        in_flight.wait_idle().await;
        self.fabric.mark_drained(core_id);
        debug!(core = core_id, "core drained, serving peers until all are drained");
        while !self.fabric.all_drained() {
            tokio::time::sleep(DRAIN_POLL).await;
        }
        self.fabric.mark_stopped(core_id);

        sweeper.abort();
        dispatcher.abort();

        let report = ShardReport {
            core_id,
            cache: shard.borrow().stats(),
            router: router.stats(),
        };
        info!(
            core = core_id,
            entries = report.cache.total_entries,
            memory_used = report.cache.memory_used,
            "core stopped"
        );
        report
    }
}
