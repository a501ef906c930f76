// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Encode and decode cohort coordination wire messages.
// Author: Lukas Bower

//! Encode/decode helpers for cohort coordination messages.

use crate::types::*;

/// Encode the fixed header of a message into its wire representation.
///
/// The trailing payload declared by `extra_bytes` is written by the caller as
/// a second ordered operation on the same connection.
#[must_use]
pub fn encode(msg: &Message) -> [u8; HEADER_LEN] {
    let mut buf = [0u8; HEADER_LEN];
    let mut at = 0;
    put_u32(&mut buf, &mut at, msg.kind as u32);
    put_u32(&mut buf, &mut at, msg.real_pid as u32);
    put_u32(&mut buf, &mut at, msg.virtual_pid as u32);
    put_u32(&mut buf, &mut at, msg.ckpt_interval);
    put_u64(&mut buf, &mut at, msg.comp_group);
    put_u32(&mut buf, &mut at, msg.num_peers);
    put_u64(&mut buf, &mut at, msg.coord_timestamp);
    put_u32(&mut buf, &mut at, msg.ip_addr);
    put_u32(&mut buf, &mut at, msg.key_len);
    put_u32(&mut buf, &mut at, msg.val_len);
    put_u32(&mut buf, &mut at, msg.cmd_status);
    buf[at] = msg.coord_cmd;
    at += 1;
    buf[at] = msg.is_running;
    at += 1;
    buf[at..at + NSID_LEN].copy_from_slice(&msg.nsid);
    at += NSID_LEN;
    put_u32(&mut buf, &mut at, msg.extra_bytes);
    debug_assert_eq!(at, HEADER_LEN);
    buf
}

/// Decode a fixed header from the wire representation.
///
/// Accepts exactly [`HEADER_LEN`] bytes; anything shorter is a truncated
/// message. Tail accounting is the caller's responsibility (see [`decode`]).
pub fn decode_header(bytes: &[u8]) -> Result<Message, CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::Truncated);
    }
    let mut at = 0;
    let kind = MessageKind::try_from(take_u32(bytes, &mut at))?;
    let real_pid = take_u32(bytes, &mut at) as i32;
    let virtual_pid = take_u32(bytes, &mut at) as i32;
    let ckpt_interval = take_u32(bytes, &mut at);
    let comp_group = take_u64(bytes, &mut at);
    let num_peers = take_u32(bytes, &mut at);
    let coord_timestamp = take_u64(bytes, &mut at);
    let ip_addr = take_u32(bytes, &mut at);
    let key_len = take_u32(bytes, &mut at);
    let val_len = take_u32(bytes, &mut at);
    let cmd_status = take_u32(bytes, &mut at);
    let coord_cmd = bytes[at];
    at += 1;
    let is_running = bytes[at];
    at += 1;
    let mut nsid = [0u8; NSID_LEN];
    nsid.copy_from_slice(&bytes[at..at + NSID_LEN]);
    at += NSID_LEN;
    let extra_bytes = take_u32(bytes, &mut at);
    Ok(Message {
        kind,
        real_pid,
        virtual_pid,
        ckpt_interval,
        comp_group,
        num_peers,
        coord_timestamp,
        ip_addr,
        key_len,
        val_len,
        cmd_status,
        coord_cmd,
        is_running,
        nsid,
        extra_bytes,
    })
}

/// Decode a complete header-plus-tail buffer.
///
/// The declared tail length must exactly match the bytes present after the
/// header; a mismatch is a protocol violation, never a silent truncation.
pub fn decode(bytes: &[u8]) -> Result<(Message, &[u8]), CodecError> {
    let msg = decode_header(bytes)?;
    let tail = &bytes[HEADER_LEN..];
    if tail.len() != msg.extra_bytes as usize {
        return Err(CodecError::LengthMismatch {
            declared: msg.extra_bytes,
            actual: tail.len(),
        });
    }
    Ok((msg, tail))
}

/// Append a NUL-terminated string to a tail payload buffer.
pub fn push_cstr(buf: &mut Vec<u8>, value: &str) {
    buf.extend_from_slice(value.as_bytes());
    buf.push(0);
}

/// Read the first NUL-terminated string from a tail payload.
pub fn parse_cstr(bytes: &[u8]) -> Result<&str, CodecError> {
    let end = bytes
        .iter()
        .position(|&b| b == 0)
        .ok_or(CodecError::Unterminated)?;
    core::str::from_utf8(&bytes[..end]).map_err(|_| CodecError::InvalidUtf8)
}

/// Split a tail payload into its NUL-terminated string fields.
pub fn parse_cstrs(bytes: &[u8]) -> Result<Vec<String>, CodecError> {
    let mut out = Vec::new();
    let mut rest = bytes;
    while !rest.is_empty() {
        let field = parse_cstr(rest)?;
        rest = &rest[field.len() + 1..];
        out.push(field.to_owned());
    }
    Ok(out)
}

fn put_u32(buf: &mut [u8], at: &mut usize, value: u32) {
    buf[*at..*at + 4].copy_from_slice(&value.to_le_bytes());
    *at += 4;
}

fn put_u64(buf: &mut [u8], at: &mut usize, value: u64) {
    buf[*at..*at + 8].copy_from_slice(&value.to_le_bytes());
    *at += 8;
}

fn take_u32(buf: &[u8], at: &mut usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[*at..*at + 4]);
    *at += 4;
    u32::from_le_bytes(raw)
}

fn take_u64(buf: &[u8], at: &mut usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[*at..*at + 8]);
    *at += 8;
    u64::from_le_bytes(raw)
}
