//! Cheap per-message previews.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A lossy, cheap summary of one message, extracted from only the first
/// few KB of its byte range.
///
/// Previews are always present on a [`MessageBoundary`](super::MessageBoundary);
/// when the headers cannot be decoded the fields fall back to placeholder
/// values rather than being absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preview {
    /// Decoded `From:` header value.
    pub from: String,

    /// Decoded `To:` header value.
    pub to: String,

    /// Decoded subject line (RFC 2047 encoded-words resolved).
    pub subject: String,

    /// Message date as an RFC 3339 string; "now" when unparseable.
    pub date_iso: String,

    /// Total byte length of the message.
    pub size_bytes: u64,

    /// Labels from the `X-Gmail-Labels` header (comma-split, trimmed).
    pub labels: Vec<String>,
}

impl Preview {
    /// Placeholder preview used when header decoding fails.
    pub fn fallback(size_bytes: u64) -> Self {
        Self {
            from: "Unknown".to_string(),
            to: "Unknown".to_string(),
            subject: String::new(),
            date_iso: Utc::now().to_rfc3339(),
            size_bytes,
            labels: Vec::new(),
        }
    }
}
