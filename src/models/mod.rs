//! Request and Response models for the cache engine
//!
//! This module defines the values exchanged between the external listener,
//! the router and the shards, and the binary frame format used at the
//! listener boundary.

pub mod frame;
pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use frame::{decode_request, decode_response, encode_request, encode_response};
pub use requests::{validate_key, Op, Request};
pub use responses::{Response, Status};
