//! Shard Module
//!
//! A shard wraps one `CacheStore` and turns requests into responses. It is
//! owned by a single core and only ever borrowed between suspension points.

use std::time::{Duration, Instant};

use tracing::warn;

use crate::cache::{CacheStats, CacheStore, SweepStep};
use crate::error::Result;
use crate::models::{Op, Request, Response, Status};

#[derive(Debug)]
pub struct Shard {
    id: usize,
    store: CacheStore,
}

impl Shard {
    pub fn new(id: usize, memory_budget: usize) -> Self {
        Self {
            id,
            store: CacheStore::new(id, memory_budget),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Returns a copy of the value and marks the key most recently used.
    pub fn handle_get(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        self.store.get(key)
    }

    /// Inserts or updates, then evicts down to the budget.
    pub fn handle_put(
        &mut self,
        key: Vec<u8>,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.store.put(key, value, ttl)
    }

    /// Removes the key; an absent key yields `NotFound` and changes nothing.
    pub fn handle_delete(&mut self, key: &[u8]) -> Result<()> {
        self.store.delete(key)
    }

    // == Execute ==
    /// Runs one request to completion against this shard.
    pub fn execute(&mut self, request: Request) -> Response {
        let Request {
            op,
            key,
            ttl,
            correlation_id,
            ..
        } = request;

        let outcome = match op {
            Op::Get => self.handle_get(&key).map(Some),
            Op::Put { value } => self.handle_put(key, value, ttl).map(|_| None),
            Op::Delete => self.handle_delete(&key).map(|_| None),
        };

        match outcome {
            Ok(Some(value)) => Response::hit(value, correlation_id),
            Ok(None) => Response::ok(correlation_id),
            Err(err) => {
                if err.status() != Status::NotFound {
                    warn!(shard = self.id, error = %err, "request rejected by shard");
                }
                Response::from_error(&err, correlation_id)
            }
        }
    }

    pub fn sweep_step(&mut self, cursor: usize, batch: usize) -> SweepStep {
        self.store.sweep_step(cursor, batch, Instant::now())
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }
}
