//! # Frame Codec
//!
//! Purpose: Convert argument lists to SSDB wire bytes and reassemble wire
//! bytes, arriving in arbitrary-sized reads, back into response blocks.
//!
//! ## Design Principles
//! 1. **Pure Functions**: No sockets here; callers own buffering and I/O.
//! 2. **Restartable Decoding**: An incomplete frame consumes nothing, so the
//!    same bytes can be re-scanned after more data arrives.
//! 3. **All-or-Nothing Blocks**: A declared block is either fully present or
//!    left untouched.
//! 4. **Buffer Reuse**: Encoding appends into a caller-provided buffer.
//!
//! ## Wire Format
//!
//! ```text
//! 3\nset\n6\ngossdb\n5\nvalue\n\n
//! | block | block    | block   |end
//! ```
//!
//! Each block is `<decimal length>\n<raw bytes>\n`; a message ends with one
//! empty line. A terminator line made of a lone `\r` is accepted as well.

use std::ops::Range;

use bytes::{Bytes, BytesMut};
use thiserror::Error;

use crate::response::Response;
use crate::value::{Value, ValueKind};

/// Errors raised while encoding a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// A list element was itself a list.
    #[error("cannot encode a list nested inside a list")]
    NestedList,
    /// A list mixed scalar kinds.
    #[error("list mixes {expected} and {found} elements")]
    MixedList {
        expected: ValueKind,
        found: ValueKind,
    },
}

/// Unrecoverable framing errors; the stream can no longer be trusted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// A length line was not a non-negative decimal integer.
    #[error("invalid block length line {line:?}")]
    InvalidLength { line: String },
    /// The byte after a block payload was not `\n`.
    #[error("block payload followed by {found:#04x} instead of newline")]
    MissingBlockTerminator { found: u8 },
}

/// A complete response decoded from a borrowed buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Response blocks in wire order.
    pub blocks: Vec<Bytes>,
    /// Bytes of the input consumed, terminator included.
    pub consumed: usize,
}

/// Encodes an argument list into `out`, terminator included.
///
/// On error `out` is truncated back to its original length.
pub fn encode(values: &[Value], out: &mut Vec<u8>) -> Result<(), EncodeError> {
    let start = out.len();
    for value in values {
        if let Err(err) = encode_value(value, out) {
            out.truncate(start);
            return Err(err);
        }
    }
    out.push(b'\n');
    Ok(())
}

/// Encodes an argument list into a fresh buffer.
pub fn encode_to_vec(values: &[Value]) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::with_capacity(64);
    encode(values, &mut out)?;
    Ok(out)
}

/// Attempts to decode one response from the front of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed; nothing is consumed in that
/// case. Blocks are copied out of `buf`.
pub fn decode(buf: &[u8]) -> Result<Option<Frame>, DecodeError> {
    Ok(scan(buf)?.map(|(spans, consumed)| Frame {
        blocks: spans
            .into_iter()
            .map(|span| Bytes::copy_from_slice(&buf[span]))
            .collect(),
        consumed,
    }))
}

/// Decodes one response from `buf` and advances it past the consumed prefix.
///
/// Blocks share the split-off allocation instead of being copied.
pub fn decode_buf(buf: &mut BytesMut) -> Result<Option<Response>, DecodeError> {
    let (spans, consumed) = match scan(&buf[..])? {
        Some(found) => found,
        None => return Ok(None),
    };
    let frame = buf.split_to(consumed).freeze();
    let blocks = spans.into_iter().map(|span| frame.slice(span)).collect();
    Ok(Some(Response::new(blocks)))
}

fn encode_value(value: &Value, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    let items = match value {
        Value::List(items) => items,
        scalar => return encode_scalar(scalar, out),
    };

    let expected = match items.first() {
        Some(first) => first.kind(),
        None => return Ok(()),
    };
    for item in items {
        let found = item.kind();
        if found != expected {
            return Err(EncodeError::MixedList { expected, found });
        }
        encode_scalar(item, out)?;
    }
    Ok(())
}

fn encode_scalar(value: &Value, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    match value {
        Value::Bytes(data) => push_block(out, data),
        Value::Int(number) => {
            let mut digits = [0u8; 20];
            let len = format_i64(*number, &mut digits);
            push_block(out, &digits[..len]);
        }
        Value::Float(number) => push_block(out, format!("{:.6}", number).as_bytes()),
        Value::Bool(true) => push_block(out, b"1"),
        Value::Bool(false) => push_block(out, b"0"),
        Value::Null => push_block(out, b""),
        Value::List(_) => return Err(EncodeError::NestedList),
    }
    Ok(())
}

fn push_block(out: &mut Vec<u8>, data: &[u8]) {
    push_usize(out, data.len());
    out.push(b'\n');
    out.extend_from_slice(data);
    out.push(b'\n');
}

/// Locates the blocks of the first complete response in `buf`.
///
/// Yields the block payload ranges and the number of bytes the response
/// occupies, or `None` if the response is not complete yet.
fn scan(buf: &[u8]) -> Result<Option<(Vec<Range<usize>>, usize)>, DecodeError> {
    let mut spans = Vec::new();
    let mut offset = 0;

    loop {
        let newline = match buf[offset..].iter().position(|&b| b == b'\n') {
            Some(idx) => offset + idx,
            None => return Ok(None),
        };
        let line = &buf[offset..newline];
        let body = newline + 1;

        if line.is_empty() || line == b"\r" {
            offset = body;
            if spans.is_empty() {
                // Stray blank lines ahead of a response are skipped.
                continue;
            }
            return Ok(Some((spans, offset)));
        }

        let size = parse_len(line)?;
        let end = body.checked_add(size).ok_or_else(|| invalid_length(line))?;
        if end >= buf.len() {
            return Ok(None);
        }
        if buf[end] != b'\n' {
            return Err(DecodeError::MissingBlockTerminator { found: buf[end] });
        }

        spans.push(body..end);
        offset = end + 1;
    }
}

fn parse_len(line: &[u8]) -> Result<usize, DecodeError> {
    let mut value: usize = 0;
    for &b in line {
        if !b.is_ascii_digit() {
            return Err(invalid_length(line));
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add((b - b'0') as usize))
            .ok_or_else(|| invalid_length(line))?;
    }
    Ok(value)
}

fn invalid_length(line: &[u8]) -> DecodeError {
    DecodeError::InvalidLength {
        line: String::from_utf8_lossy(line).into_owned(),
    }
}

fn format_i64(value: i64, buf: &mut [u8; 20]) -> usize {
    let mut magnitude = value.unsigned_abs();
    let mut len = 0;
    loop {
        buf[len] = b'0' + (magnitude % 10) as u8;
        magnitude /= 10;
        len += 1;
        if magnitude == 0 {
            break;
        }
    }
    if value < 0 {
        buf[len] = b'-';
        len += 1;
    }
    buf[..len].reverse();
    len
}

fn push_usize(out: &mut Vec<u8>, mut value: usize) {
    // Write digits into a small stack buffer to avoid heap allocations.
    let mut buf = [0u8; 20];
    let mut len = 0;
    if value == 0 {
        buf[0] = b'0';
        len = 1;
    } else {
        while value > 0 {
            buf[len] = b'0' + (value % 10) as u8;
            value /= 10;
            len += 1;
        }
    }
    for idx in (0..len).rev() {
        out.push(buf[idx]);
    }
}
