//! Resource name and label value helpers.
//!
//! Names follow the DNS-1123 label grammar used by the orchestrator:
//! lowercase alphanumerics and dashes, starting and ending alphanumeric,
//! at most 63 characters.

use crate::error::{Error, Result};

const MAX_NAME_LEN: usize = 63;

pub fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }
    let bytes = name.as_bytes();
    let edge_ok = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    edge_ok(bytes[0])
        && edge_ok(bytes[bytes.len() - 1])
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
}

pub fn validate_name(name: &str) -> Result<()> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(Error::InvalidName(name.to_string()))
    }
}

/// Turn arbitrary text into a valid resource name.
///
/// Uppercase is lowered, runs of other characters collapse into one dash,
/// and the result is trimmed to 63 characters without a trailing dash.
pub fn clean_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_dash = true;
    for ch in raw.chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            out.push(ch);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    out.truncate(MAX_NAME_LEN);
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Clean a value so it can be used as a label value.
///
/// Label values allow `-`, `_` and `.` in the middle and may be empty.
pub fn label_value(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = mapped.trim_matches(|c: char| !c.is_ascii_alphanumeric());
    let mut value = trimmed.to_string();
    value.truncate(MAX_NAME_LEN);
    value
        .trim_end_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string()
}
