//! Response model
//!
//! Defines the outcome returned by the router to the listener.

use crate::error::{CacheError, Result};

/// Outcome status carried in the first byte of a response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    Ok = 0,
    NotFound = 1,
    ValueTooLarge = 2,
    Overloaded = 3,
    Timeout = 4,
    MalformedRequest = 5,
    RoutingUnavailable = 6,
}

impl Status {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Status {
    type Error = CacheError;

    fn try_from(byte: u8) -> Result<Self> {
        let status = match byte {
            0 => Status::Ok,
            1 => Status::NotFound,
            2 => Status::ValueTooLarge,
            3 => Status::Overloaded,
            4 => Status::Timeout,
            5 => Status::MalformedRequest,
            6 => Status::RoutingUnavailable,
            other => {
                return Err(CacheError::MalformedRequest(format!(
                    "Unknown status byte {}",
                    other
                )))
            }
        };
        Ok(status)
    }
}

/// Result of one request.
///
/// `value` is populated only for a GET hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub value: Option<Vec<u8>>,
    pub correlation_id: u64,
}

impl Response {
    /// Success without a value (PUT, DELETE).
    pub fn ok(correlation_id: u64) -> Self {
        Self {
            status: Status::Ok,
            value: None,
            correlation_id,
        }
    }

    /// Successful GET.
    pub fn hit(value: Vec<u8>, correlation_id: u64) -> Self {
        Self {
            status: Status::Ok,
            value: Some(value),
            correlation_id,
        }
    }

    /// Error outcome; the error's status is carried, the detail is dropped.
    pub fn from_error(error: &CacheError, correlation_id: u64) -> Self {
        Self {
            status: error.status(),
            value: None,
            correlation_id,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}
