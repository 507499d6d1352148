//! Incremental decoding of engine progress logs.
//!
//! Build, push and pull responses are newline-delimited JSON records. Chunks
//! arrive at arbitrary boundaries, so the decoder buffers partial lines.

use futures::StreamExt;
use serde::Deserialize;

use crate::engine::LogStream;
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LogRecord {
    #[serde(default)]
    pub stream: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl LogRecord {
    /// Human-readable text of the record without embedded newlines.
    pub fn message(&self) -> String {
        let parts: Vec<&str> = [&self.stream, &self.status, &self.id]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .collect();
        parts.join(" ").replace('\n', "").trim().to_string()
    }
}

#[derive(Debug, Default)]
pub struct LogDecoder {
    pending: Vec<u8>,
}

impl LogDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every record completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<LogRecord> {
        self.pending.extend_from_slice(chunk);
        let mut records = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(record) = parse_line(&line) {
                records.push(record);
            }
        }
        records
    }

    /// Flush a trailing line without newline.
    pub fn finish(&mut self) -> Option<LogRecord> {
        let line = std::mem::take(&mut self.pending);
        parse_line(&line)
    }
}

fn parse_line(line: &[u8]) -> Option<LogRecord> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str(text) {
        Ok(record) => Some(record),
        Err(_) => Some(LogRecord {
            stream: Some(text.to_string()),
            ..LogRecord::default()
        }),
    }
}

/// Consume `stream`, logging each record at debug level.
///
/// Returns the first `error` field encountered, if any.
pub async fn drain(mut stream: LogStream) -> Result<Option<String>> {
    let mut decoder = LogDecoder::new();
    while let Some(chunk) = stream.next().await {
        for record in decoder.push(&chunk?) {
            if let Some(err) = check(&record) {
                return Ok(Some(err));
            }
        }
    }
    if let Some(record) = decoder.finish()
        && let Some(err) = check(&record)
    {
        return Ok(Some(err));
    }
    Ok(None)
}

fn check(record: &LogRecord) -> Option<String> {
    let message = record.message();
    if !message.is_empty() {
        tracing::debug!("{message}");
    }
    record.error.clone()
}
