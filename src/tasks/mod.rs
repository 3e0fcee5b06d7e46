//! Background Tasks Module
//!
//! Contains per-core background tasks that run alongside request handling.
//!
//! # Tasks
//! - TTL Sweep: Removes expired entries in bounded steps, yielding between them

mod sweep;

pub use sweep::{spawn_sweep_task, sweep_expired};
