//! Fabric envelopes
//!
//! What travels on an inter-core lane. Payloads are owned copies; nothing in
//! an envelope aliases memory of the core that built it.

use std::time::Instant;

use crate::models::{Request, Response};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    Request,
    Response,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Request(Request),
    Response(Response),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Router-assigned id pairing a request with its response
    pub correlation_id: u64,
    /// Core that built this envelope
    pub origin_core: usize,
    /// Copied from the originating request
    pub deadline: Instant,
    pub payload: Payload,
}

impl Envelope {
    pub fn request(
        correlation_id: u64,
        origin_core: usize,
        deadline: Instant,
        request: Request,
    ) -> Self {
        Self {
            correlation_id,
            origin_core,
            deadline,
            payload: Payload::Request(request),
        }
    }

    pub fn response(
        correlation_id: u64,
        origin_core: usize,
        deadline: Instant,
        response: Response,
    ) -> Self {
        Self {
            correlation_id,
            origin_core,
            deadline,
            payload: Payload::Response(response),
        }
    }

    pub fn kind(&self) -> EnvelopeKind {
        match self.payload {
            Payload::Request(_) => EnvelopeKind::Request,
            Payload::Response(_) => EnvelopeKind::Response,
        }
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}
