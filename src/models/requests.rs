//! Request model
//!
//! Defines the parsed request handed to the router by the listener.

use std::time::{Duration, Instant};

use crate::cache::MAX_KEY_LENGTH;
use crate::error::{CacheError, Result};

/// Operation carried by a request. The value travels with `Put` only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Get,
    Put { value: Vec<u8> },
    Delete,
}

impl Op {
    /// Wire opcode for this operation.
    pub fn opcode(&self) -> u8 {
        match self {
            Op::Get => 1,
            Op::Put { .. } => 2,
            Op::Delete => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Op::Get => "GET",
            Op::Put { .. } => "PUT",
            Op::Delete => "DELETE",
        }
    }
}

/// A single-key request.
///
/// # Fields
/// - `op`: The operation, with the value for PUT
/// - `key`: Opaque key bytes
/// - `ttl`: Optional time to live (PUT only, ignored otherwise)
/// - `correlation_id`: Caller token echoed in the response
/// - `deadline`: When the caller stops waiting; the router fills a default
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub op: Op,
    pub key: Vec<u8>,
    pub ttl: Option<Duration>,
    pub correlation_id: u64,
    pub deadline: Option<Instant>,
}

impl Request {
    fn new(op: Op, key: impl Into<Vec<u8>>) -> Self {
        Self {
            op,
            key: key.into(),
            ttl: None,
            correlation_id: 0,
            deadline: None,
        }
    }

    /// Creates a GET request.
    pub fn get(key: impl Into<Vec<u8>>) -> Self {
        Self::new(Op::Get, key)
    }

    /// Creates a PUT request without expiry.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self::new(
            Op::Put {
                value: value.into(),
            },
            key,
        )
    }

    /// Creates a DELETE request.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        Self::new(Op::Delete, key)
    }

    /// Sets the time to live. A zero ttl means no expiry, as on the wire.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = (!ttl.is_zero()).then_some(ttl);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: u64) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Validates the request data
    ///
    /// Returns `MalformedRequest` if the key is empty or too long.
    pub fn validate(&self) -> Result<()> {
        validate_key(&self.key)
    }
}

/// Checks key length bounds.
pub fn validate_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::MalformedRequest(
            "Key cannot be empty".to_string(),
        ));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::MalformedRequest(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}
