//! Lightweight MIME helpers for the search path.
//!
//! Attachment detection is a structural scan over the raw bytes — no
//! decoding. Body text extraction goes through `mail-parser` with a raw
//! fallback, since `body:` and free-text filters match against the decoded
//! plain-text body.

use mail_parser::MessageParser;

/// Detect whether a message carries at least one attachment, without
/// decoding any MIME part.
///
/// A part counts as an attachment when a `Content-Disposition` header
/// declares `attachment` or carries a `filename=` parameter. The scan is
/// line-oriented and case-insensitive over the raw bytes.
pub fn has_attachment_marker(raw: &[u8]) -> bool {
    for line in raw.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.len() > 1024 {
            continue; // header lines are short; skip encoded body content
        }
        let Ok(text) = std::str::from_utf8(line) else {
            continue;
        };
        let lower = text.to_lowercase();
        if let Some(value) = lower.strip_prefix("content-disposition:") {
            if value.contains("attachment") || value.contains("filename=") {
                return true;
            }
        }
    }
    false
}

/// Extract the decoded plain-text body of a raw message.
///
/// Prefers the `text/plain` part; falls back to everything after the first
/// blank line when `mail-parser` cannot make sense of the message. Always
/// returns something (possibly empty), never fails.
pub fn extract_body_text(raw: &[u8]) -> String {
    let message_bytes = skip_envelope_line(raw);

    let parser = MessageParser::default();
    if let Some(msg) = parser.parse(message_bytes) {
        if let Some(text) = msg.body_text(0) {
            return text.into_owned();
        }
    }

    extract_body_fallback(message_bytes)
}

/// Skip the `From ` separator line at the start of MBOX messages.
fn skip_envelope_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF][..]).unwrap_or(data);
    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

/// Everything after the first blank line, decoded lossily.
fn extract_body_fallback(data: &[u8]) -> String {
    let text = String::from_utf8_lossy(data);
    if let Some(pos) = text.find("\n\n") {
        text[pos + 2..].to_string()
    } else if let Some(pos) = text.find("\r\n\r\n") {
        text[pos + 4..].to_string()
    } else {
        String::new()
    }
}
