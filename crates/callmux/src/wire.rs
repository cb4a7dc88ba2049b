//! Binary framing for the call protocol.
//!
//! Every message on the stream is a length-prefixed frame. A call frame
//! carries a function name, a sync id, and an opaque argument payload; a
//! reply frame carries the sync id it answers, a status code, and either
//! an error message or a result payload. All integers are big-endian.
//!
//! ```text
//! call:  u32 body_len | u16 name_len | name | u64 sync | args
//! reply: u32 body_len | u64 sync | i32 code | error text or result
//! ```
//!
//! The handshake reuses both shapes: the server greets with a reply frame
//! on sync id [`HANDSHAKE_SYNC`], and credentials travel as a call frame
//! with the same reserved id. Regular calls never use it.

use bytes::{Buf, BufMut, Bytes};

use crate::stream::StreamError;

/// Sync id reserved for the greeting and the credential exchange.
pub const HANDSHAKE_SYNC: u64 = 0;

/// Function name of the credential exchange during the handshake.
pub const AUTH_FUNCTION: &str = "auth";

/// Longest function name the call frame can carry.
pub const MAX_NAME_LEN: usize = u16::MAX as usize;

/// Outbound frame cap applied when the caller does not set one.
pub const DEFAULT_SEND_LIMIT: usize = 16 * 1024 * 1024;

/// Inbound frame cap applied when the caller does not set one.
pub const DEFAULT_RECV_LIMIT: usize = 16 * 1024 * 1024;

/// A decoded reply frame, before it is matched to a pending call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyFrame {
    /// Sync id of the call this frame answers.
    pub sync: u64,
    /// Zero for success, anything else for a server-reported fault.
    pub code: i32,
    /// Error text when `code != 0`, result payload otherwise.
    pub body: Bytes,
}

/// A decoded call frame, as a server sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    pub function: String,
    pub sync: u64,
    pub args: Bytes,
}

/// Encodes a call frame, enforcing the outbound size cap.
///
/// The whole frame is sized up front and rejected before any allocation
/// when it exceeds `limit`, so an oversized request never reaches the
/// stream. Allocation failure surfaces as [`StreamError::OutOfMemory`]
/// instead of aborting.
pub fn encode_call(
    function: &str,
    sync: u64,
    args: &[u8],
    limit: usize,
) -> Result<Vec<u8>, StreamError> {
    debug_assert!(function.len() <= MAX_NAME_LEN);
    let body_len = 2 + function.len() + 8 + args.len();
    let total = 4 + body_len;
    if total > limit || body_len > u32::MAX as usize {
        return Err(StreamError::TooLarge { len: total, limit });
    }
    let mut buf = Vec::new();
    buf.try_reserve_exact(total)
        .map_err(|_| StreamError::OutOfMemory(format!("cannot buffer a {total} byte call frame")))?;
    buf.put_u32(body_len as u32);
    buf.put_u16(function.len() as u16);
    buf.put_slice(function.as_bytes());
    buf.put_u64(sync);
    buf.put_slice(args);
    Ok(buf)
}

/// Decodes a call frame body. The length prefix must already be stripped.
pub fn decode_call(mut body: Bytes) -> Result<CallFrame, StreamError> {
    if body.len() < 2 {
        return Err(StreamError::Frame(format!(
            "call body of {} bytes is too short for a name length",
            body.len()
        )));
    }
    let name_len = body.get_u16() as usize;
    if body.len() < name_len + 8 {
        return Err(StreamError::Frame(format!(
            "call body truncated: need {} more bytes",
            name_len + 8 - body.len()
        )));
    }
    let name = body.split_to(name_len);
    let function = std::str::from_utf8(&name)
        .map_err(|_| StreamError::Frame("function name is not valid utf-8".into()))?
        .to_owned();
    let sync = body.get_u64();
    Ok(CallFrame { function, sync, args: body })
}

/// Encodes a complete reply frame, length prefix included.
pub fn encode_reply(sync: u64, code: i32, body: &[u8]) -> Vec<u8> {
    let body_len = 8 + 4 + body.len();
    let mut buf = Vec::with_capacity(4 + body_len);
    buf.put_u32(body_len as u32);
    buf.put_u64(sync);
    buf.put_i32(code);
    buf.put_slice(body);
    buf
}

/// Decodes a reply frame body. The length prefix must already be stripped.
pub fn decode_reply(mut body: Bytes) -> Result<ReplyFrame, StreamError> {
    if body.len() < 12 {
        return Err(StreamError::Frame(format!(
            "reply body of {} bytes is too short for a header",
            body.len()
        )));
    }
    let sync = body.get_u64();
    let code = body.get_i32();
    Ok(ReplyFrame { sync, code, body })
}

/// Encodes the credential record carried by the handshake call frame.
pub fn encode_auth_record(user: &str, password: &str) -> Result<Vec<u8>, StreamError> {
    if user.len() > MAX_NAME_LEN {
        return Err(StreamError::Frame(format!(
            "user name of {} bytes exceeds {MAX_NAME_LEN}",
            user.len()
        )));
    }
    let total = 2 + user.len() + password.len();
    let mut buf = Vec::new();
    buf.try_reserve_exact(total)
        .map_err(|_| StreamError::OutOfMemory(format!("cannot buffer a {total} byte credential record")))?;
    buf.put_u16(user.len() as u16);
    buf.put_slice(user.as_bytes());
    buf.put_slice(password.as_bytes());
    Ok(buf)
}

/// Decodes a credential record, as a server sees it.
pub fn decode_auth_record(mut record: Bytes) -> Result<(String, String), StreamError> {
    if record.len() < 2 {
        return Err(StreamError::Frame("credential record is too short".into()));
    }
    let user_len = record.get_u16() as usize;
    if record.len() < user_len {
        return Err(StreamError::Frame("credential record truncated".into()));
    }
    let user = record.split_to(user_len);
    let user = std::str::from_utf8(&user)
        .map_err(|_| StreamError::Frame("user name is not valid utf-8".into()))?
        .to_owned();
    let password = String::from_utf8_lossy(&record).into_owned();
    Ok((user, password))
}
