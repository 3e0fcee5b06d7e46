//! TTL Sweep Task
//!
//! Per-core task that periodically removes expired entries from the core's
//! shard. Each pass inspects a bounded number of slots at a time and yields
//! back to the scheduler in between, so request handling on the same core
//! never waits behind a full scan.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tokio::task::{self, JoinHandle};
use tracing::{debug, info};

use crate::shard::Shard;

/// Runs one full sweep over the shard, `batch` slots per step.
///
/// The shard is borrowed only for the duration of a step and never across
/// the yield. Returns the number of entries removed.
pub async fn sweep_expired(shard: &Rc<RefCell<Shard>>, batch: usize) -> usize {
    let mut cursor = 0;
    let mut removed = 0;

    loop {
        let step = shard.borrow_mut().sweep_step(cursor, batch);
        removed += step.removed;
        match step.next {
            Some(next) => {
                cursor = next;
                task::yield_now().await;
            }
            None => return removed,
        }
    }
}

/// Spawns the sweep loop on the current `LocalSet`.
///
/// # Arguments
/// * `shard` - The core's shard
/// * `interval` - Time between the end of one pass and the start of the next
/// * `batch` - Slots inspected per step
///
/// # Returns
/// A JoinHandle the reactor aborts on shutdown.
pub fn spawn_sweep_task(
    shard: Rc<RefCell<Shard>>,
    interval: Duration,
    batch: usize,
) -> JoinHandle<()> {
    task::spawn_local(async move {
        let shard_id = shard.borrow().id();
        info!(
            shard = shard_id,
            "Starting TTL sweep task with interval of {:?}", interval
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = sweep_expired(&shard, batch).await;
            if removed > 0 {
                info!(shard = shard_id, "TTL sweep: removed {} expired entries", removed);
            } else {
                debug!(shard = shard_id, "TTL sweep: no expired entries found");
            }
        }
    })
}
