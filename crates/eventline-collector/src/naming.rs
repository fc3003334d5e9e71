// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Deterministic naming shared by storage sinks.
//!
//! Warehouse sinks key their tables by `table_name(scope, name)`; file
//! sinks lay records out under `event_path`, whose components use a
//! reversible escaping scheme so an on-disk path can be mapped back to
//! the original scope and event name.

use std::time::SystemTime;

use chrono::{DateTime, Utc};

/// Table name derived from an event's scope and name: non-alphanumeric
/// runs become `_`, components are joined with `_`, runs of `_` collapse,
/// and leading/trailing `_` are trimmed.
pub fn table_name(scope: &[String], name: &str) -> String {
    let mut out = String::new();
    let mut pending_underscore = false;
    for component in scope.iter().map(String::as_str).chain(std::iter::once(name)) {
        if !out.is_empty() {
            pending_underscore = true;
        }
        for c in component.chars() {
            if c.is_ascii_alphanumeric() {
                if pending_underscore {
                    out.push('_');
                    pending_underscore = false;
                }
                out.push(c);
            } else if !out.is_empty() {
                pending_underscore = true;
            }
        }
    }
    out
}

/// Escapes one path component reversibly: ASCII alphanumerics and `-`
/// pass through, `_` doubles, every other byte becomes `_` plus two hex
/// digits.
pub fn escape_path_component(component: &str) -> String {
    let mut out = String::with_capacity(component.len());
    for &b in component.as_bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' => out.push(b as char),
            b'_' => out.push_str("__"),
            _ => {
                out.push('_');
                out.push_str(&format!("{b:02x}"));
            }
        }
    }
    out
}

/// Why a path component failed to unescape.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum UnescapeError {
    #[error("truncated escape sequence")]
    Truncated,

    #[error("invalid hex digits in escape sequence")]
    InvalidHex,

    #[error("unescaped bytes are not valid utf-8")]
    InvalidUtf8,
}

/// Inverts [`escape_path_component`].
pub fn unescape_path_component(escaped: &str) -> Result<String, UnescapeError> {
    let bytes = escaped.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'_' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        match bytes.get(i + 1) {
            None => return Err(UnescapeError::Truncated),
            Some(b'_') => {
                out.push(b'_');
                i += 2;
            }
            Some(_) => {
                let hex = bytes.get(i + 1..i + 3).ok_or(UnescapeError::Truncated)?;
                let hex = std::str::from_utf8(hex).map_err(|_| UnescapeError::InvalidHex)?;
                let byte =
                    u8::from_str_radix(hex, 16).map_err(|_| UnescapeError::InvalidHex)?;
                out.push(byte);
                i += 3;
            }
        }
    }
    String::from_utf8(out).map_err(|_| UnescapeError::InvalidUtf8)
}

/// File path for an event record: base, UTC `YYYY-MM/DD-HH/` time
/// buckets, escaped scope components joined by `_-`, then the escaped
/// event name.
pub fn event_path(base: &str, event_time: SystemTime, scope: &[String], name: &str) -> String {
    let mut out = String::from(base);
    let time: DateTime<Utc> = event_time.into();
    out.push_str(&time.format("%Y-%m/%d-%H/").to_string());
    for (i, component) in scope.iter().enumerate() {
        if i != 0 {
            out.push_str("_-");
        }
        out.push_str(&escape_path_component(component));
    }
    out.push('/');
    out.push_str(&escape_path_component(name));
    out
}
