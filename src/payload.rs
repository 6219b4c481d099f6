// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Wire layout of the DBWIN shared buffer:
//
//   [0..4)  producer process id, i32 little-endian
//   [4..)   single-byte text, NUL-terminated
//
// No validation: whatever sits in the view is decoded as-is.

use crate::error::ProducerError;

/// Bytes taken by the process id header.
pub const PID_LEN: usize = std::mem::size_of::<i32>();

/// One captured debug message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugMessage {
    pub pid: i32,
    pub text: String,
}

/// Longest text (excluding the terminator) that fits a view of `view_len` bytes.
pub const fn text_capacity(view_len: usize) -> usize {
    view_len.saturating_sub(PID_LEN + 1)
}

/// Decode a snapshot of the shared view.
///
/// The text runs up to the first NUL. A view without a terminator decodes up
/// to its last byte; nothing past the view is ever read. Bytes map to the
/// code points of the same value (ISO-8859-1).
pub fn decode(view: &[u8]) -> DebugMessage {
    let mut pid = [0u8; PID_LEN];
    let head = view.len().min(PID_LEN);
    pid[..head].copy_from_slice(&view[..head]);

    let body = &view[head..];
    let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());

    DebugMessage {
        pid: i32::from_le_bytes(pid),
        text: body[..end].iter().map(|&b| b as char).collect(),
    }
}

/// Encode `pid` and `text` into `buf`, returning the number of bytes written
/// (header, text and terminator).
///
/// Characters above U+00FF have no single-byte form and are written as '?'.
pub fn encode_into(buf: &mut [u8], pid: i32, text: &str) -> Result<usize, ProducerError> {
    let max = text_capacity(buf.len());
    let len = text.chars().count();
    if len > max || buf.len() <= PID_LEN {
        return Err(ProducerError::PayloadTooLarge { len, max });
    }

    buf[..PID_LEN].copy_from_slice(&pid.to_le_bytes());
    let mut at = PID_LEN;
    for c in text.chars() {
        buf[at] = u8::try_from(u32::from(c)).unwrap_or(b'?');
        at += 1;
    }
    buf[at] = 0;
    Ok(at + 1)
}
