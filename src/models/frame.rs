//! Binary frame codec
//!
//! Request frame (big-endian):
//! `[opcode:1][key_len:2][key][value_len:4][value (PUT only)][ttl_secs:4]`
//!
//! Response frame:
//! `[status:1][value_len:4][value (GET hit only)]`
//!
//! A ttl of 0 means the entry never expires. Decoding rejects anything that
//! does not match the layout exactly, before the key is ever hashed.

use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CacheError, Result};
use crate::models::{validate_key, Op, Request, Response, Status};

const OP_GET: u8 = 1;
const OP_PUT: u8 = 2;
const OP_DELETE: u8 = 3;

fn malformed(msg: impl Into<String>) -> CacheError {
    CacheError::MalformedRequest(msg.into())
}

fn ensure(buf: &[u8], needed: usize, field: &str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(malformed(format!(
            "Frame truncated reading {}: need {} bytes, have {}",
            field,
            needed,
            buf.remaining()
        )));
    }
    Ok(())
}

/// Whole seconds for the wire, rounding up so a short ttl never reads as "no expiry".
fn ttl_to_secs(ttl: Option<Duration>) -> u32 {
    match ttl {
        None => 0,
        Some(ttl) => {
            let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
            u32::try_from(secs).unwrap_or(u32::MAX)
        }
    }
}

// == Encode Request ==
/// Encodes a request into its wire frame.
pub fn encode_request(request: &Request) -> Result<Bytes> {
    request.validate()?;
    let value: &[u8] = match &request.op {
        Op::Put { value } => value,
        Op::Get | Op::Delete => &[],
    };
    let value_len = u32::try_from(value.len())
        .map_err(|_| malformed("Value length does not fit in 4 bytes"))?;

    let mut buf = BytesMut::with_capacity(1 + 2 + request.key.len() + 4 + value.len() + 4);
    buf.put_u8(request.op.opcode());
    // validate() bounds the key well below u16::MAX
    buf.put_u16(request.key.len() as u16);
    buf.put_slice(&request.key);
    buf.put_u32(value_len);
    buf.put_slice(value);
    buf.put_u32(ttl_to_secs(request.ttl));
    Ok(buf.freeze())
}

// == Decode Request ==
/// Parses a wire frame into a request.
///
/// The decoded request carries no deadline and a zero correlation id; the
/// listener fills those in from its own connection state.
pub fn decode_request(mut frame: &[u8]) -> Result<Request> {
    ensure(frame, 1, "opcode")?;
    let opcode = frame.get_u8();

    ensure(frame, 2, "key length")?;
    let key_len = frame.get_u16() as usize;
    ensure(frame, key_len, "key")?;
    let key = frame[..key_len].to_vec();
    frame.advance(key_len);
    validate_key(&key)?;

    ensure(frame, 4, "value length")?;
    let value_len = frame.get_u32() as usize;
    ensure(frame, value_len, "value")?;
    let value = frame[..value_len].to_vec();
    frame.advance(value_len);

    ensure(frame, 4, "ttl")?;
    let ttl_secs = frame.get_u32();

    if frame.has_remaining() {
        return Err(malformed(format!(
            "{} trailing bytes after frame",
            frame.remaining()
        )));
    }

    let op = match opcode {
        OP_GET | OP_DELETE if value_len != 0 => {
            return Err(malformed("Only PUT frames may carry a value"));
        }
        OP_GET => Op::Get,
        OP_PUT => Op::Put { value },
        OP_DELETE => Op::Delete,
        other => return Err(malformed(format!("Unknown opcode {}", other))),
    };

    Ok(Request {
        op,
        key,
        ttl: (ttl_secs > 0).then(|| Duration::from_secs(u64::from(ttl_secs))),
        correlation_id: 0,
        deadline: None,
    })
}

// == Encode Response ==
/// Encodes a response into its wire frame.
///
/// A value whose length does not fit the 4-byte length field is rejected
/// with `ValueTooLarge` instead of being truncated.
pub fn encode_response(response: &Response) -> Result<Bytes> {
    let value = response.value.as_deref().unwrap_or_default();
    let value_len = u32::try_from(value.len()).map_err(|_| CacheError::ValueTooLarge {
        size: value.len(),
        budget: u32::MAX as usize,
    })?;
    let mut buf = BytesMut::with_capacity(1 + 4 + value.len());
    buf.put_u8(response.status.as_u8());
    buf.put_u32(value_len);
    buf.put_slice(value);
    Ok(buf.freeze())
}

// == Decode Response ==
/// Parses a response frame. The correlation id is not on the wire and comes back as 0.
pub fn decode_response(mut frame: &[u8]) -> Result<Response> {
    ensure(frame, 5, "response header")?;
    let status = Status::try_from(frame.get_u8())?;
    let value_len = frame.get_u32() as usize;
    ensure(frame, value_len, "response value")?;
    let value = frame[..value_len].to_vec();
    frame.advance(value_len);
    if frame.has_remaining() {
        return Err(malformed("Trailing bytes after response frame"));
    }

    let value = (status == Status::Ok && value_len > 0).then_some(value);
    Ok(Response {
        status,
        value,
        correlation_id: 0,
    })
}
