//! Engine Bootstrap
//!
//! Starts one OS thread per core, each running its own `Reactor`, and wires
//! them to a shared fabric. The `Engine` handle is what a listener talks to:
//! it hands requests to cores and collects their reports on shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info};

use crate::cache::CacheStats;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::fabric::{Fabric, FabricStats};
use crate::models::{Request, Response};
use crate::reactor::{Reactor, ShardReport, Submission};

type CoreThread = JoinHandle<Result<ShardReport>>;

pub struct Engine {
    config: Arc<Config>,
    fabric: Arc<Fabric>,
    intakes: Vec<mpsc::UnboundedSender<Submission>>,
    shutdown_tx: watch::Sender<bool>,
    threads: Mutex<Vec<CoreThread>>,
    next_core: AtomicUsize,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("cores", &self.cores())
            .field("fabric", &self.fabric)
            .finish()
    }
}

impl Engine {
    // == Start ==
    /// Validates `config`, starts every core and waits until all of them
    /// accept submissions.
    ///
    /// If any core fails to come up, the cores already running are shut
    /// down again and a `Startup` error is returned.
    pub fn start(config: Config) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let fabric = Arc::new(Fabric::from_config(&config));
        let (shutdown_tx, _) = watch::channel(false);
        let (ready_tx, ready_rx) = std_mpsc::channel();

        let mut engine = Self {
            config: Arc::clone(&config),
            fabric: Arc::clone(&fabric),
            intakes: Vec::with_capacity(config.cores),
            shutdown_tx,
            threads: Mutex::new(Vec::with_capacity(config.cores)),
            next_core: AtomicUsize::new(0),
        };

        let mut spawned = Vec::with_capacity(config.cores);
        let mut failure = None;
        for core_id in 0..config.cores {
            let (intake_tx, intake_rx) = mpsc::unbounded_channel();
            let reactor = Reactor::new(
                core_id,
                Arc::clone(&config),
                Arc::clone(&fabric),
                intake_rx,
                engine.shutdown_tx.subscribe(),
            );
            let ready = ready_tx.clone();

            let handle = thread::Builder::new()
                .name(format!("kvcache-core-{}", core_id))
                .spawn(move || reactor.run(ready));
            match handle {
                Ok(handle) => {
                    engine.intakes.push(intake_tx);
                    spawned.push(handle);
                }
                Err(err) => {
                    // cores that never started must not hold up the drain
                    for missing in core_id..config.cores {
                        fabric.retire(missing);
                    }
                    failure = Some(CacheError::Startup(format!(
                        "core {}: failed to spawn thread: {}",
                        core_id, err
                    )));
                    break;
                }
            }
        }
        drop(ready_tx);

        for _ in 0..spawned.len() {
            match ready_rx.recv() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failure.get_or_insert(err);
                }
                Err(_) => {
                    failure.get_or_insert(CacheError::Startup(
                        "a core exited before reporting readiness".to_string(),
                    ));
                    break;
                }
            }
        }

        *engine.threads_mut() = spawned;
        if let Some(err) = failure {
            error!(error = %err, "engine failed to start");
            engine.shutdown();
            return Err(err);
        }

        info!(cores = config.cores, "engine started");
        Ok(engine)
    }

    fn threads_mut(&mut self) -> &mut Vec<CoreThread> {
        self.threads
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn cores(&self) -> usize {
        self.config.cores
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn fabric_stats(&self) -> FabricStats {
        self.fabric.stats()
    }

    // == Submit ==
    /// Hands a request to the next core in round-robin order.
    pub async fn submit(&self, request: Request) -> Response {
        let core = self.next_core.fetch_add(1, Ordering::Relaxed) % self.intakes.len().max(1);
        self.submit_on(core, request).await
    }

    /// Hands a request to a specific core, which routes it to the owning
    /// shard. Fails with `RoutingUnavailable` once that core has stopped.
    pub async fn submit_on(&self, core: usize, request: Request) -> Response {
        let correlation_id = request.correlation_id;
        let unavailable =
            || Response::from_error(&CacheError::RoutingUnavailable(core), correlation_id);

        let Some(intake) = self.intakes.get(core) else {
            return unavailable();
        };
        let (reply, answer) = oneshot::channel();
        if intake.send(Submission { request, reply }).is_err() {
            return unavailable();
        }
        answer.await.unwrap_or_else(|_| unavailable())
    }

    // == Shutdown ==
    /// Stops accepting requests, lets every core drain, joins the core
    /// threads and returns their final reports ordered by core id.
    ///
    /// Blocks the calling thread. Calling it again returns no reports.
    pub fn shutdown(&self) -> Vec<ShardReport> {
        self.shutdown_tx.send_replace(true);

        let threads = {
            let mut threads = self
                .threads
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *threads)
        };
        if threads.is_empty() {
            return Vec::new();
        }

        let mut reports = Vec::with_capacity(threads.len());
        for handle in threads {
            match handle.join() {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(err)) => error!(error = %err, "core exited without a report"),
                Err(_) => error!("core thread panicked"),
            }
        }
        reports.sort_by_key(|report| report.core_id);

        info!(cores = reports.len(), "engine stopped");
        reports
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Folds per-core cache stats into one engine-wide view.
pub fn merge_reports(reports: &[ShardReport]) -> CacheStats {
    let mut total = CacheStats::new(0);
    for report in reports {
        total.merge(&report.cache);
    }
    total
}
