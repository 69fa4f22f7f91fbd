//! Per-message query evaluation.
//!
//! Reads the minimal byte range a query needs (headers only, unless body
//! text or the attachment scan is required), extracts the filterable
//! fields, and evaluates the expression tree. Text filters are
//! case-insensitive substring containment; `body:` and free text match
//! against the decoded plain-text body.

use chrono::{DateTime, NaiveTime, Utc};
use lru::LruCache;

use crate::error::Result;
use crate::model::MessageBoundary;
use crate::parser::header::{decode_encoded_words, parse_date, ParsedHeaders};
use crate::parser::mime::{extract_body_text, has_attachment_marker};
use crate::source::ByteSource;

use super::query::{ChipKind, FieldName, FilterChip, Query};

/// Filterable fields extracted from one message.
///
/// `body` and `has_attachment` are only populated when the query needs
/// them; the read is sized accordingly.
#[derive(Debug)]
pub struct MessageFields {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub labels: Vec<String>,
    pub date: Option<DateTime<Utc>>,
    /// Decoded plain-text body, lower-cased, when loaded.
    pub body: Option<String>,
    pub has_attachment: Option<bool>,
}

impl MessageFields {
    /// Read and extract the fields a query needs for one message.
    ///
    /// `body_cache` maps boundary start offsets to lower-cased decoded
    /// bodies, so repeated searches over the same archive skip the MIME
    /// decode. Header-only queries read at most `header_read_limit` bytes.
    pub fn load(
        source: &dyn ByteSource,
        boundary: &MessageBoundary,
        needs_body: bool,
        needs_attachment: bool,
        header_read_limit: u64,
        body_cache: &mut LruCache<u64, String>,
    ) -> Result<Self> {
        let range = boundary.range;
        let cached_body = if needs_body {
            body_cache.get(&range.start).cloned()
        } else {
            None
        };

        // Full read only when we must decode the body or scan for
        // attachment structure; otherwise the header prefix suffices.
        let need_full = needs_attachment || (needs_body && cached_body.is_none());
        let read_end = if need_full {
            range.end
        } else {
            range.end.min(range.start + header_read_limit)
        };
        let raw = source.read_range_bytes(range.start, read_end)?;

        let headers = ParsedHeaders::parse(&raw);
        let decoded = |name: &str| {
            headers
                .get(name)
                .map(decode_encoded_words)
                .unwrap_or_default()
        };

        let labels = headers
            .get("x-gmail-labels")
            .map(|v| {
                decode_encoded_words(v)
                    .split(',')
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let body = if needs_body {
            let text = match cached_body {
                Some(text) => text,
                None => {
                    let text = extract_body_text(&raw).to_lowercase();
                    body_cache.put(range.start, text.clone());
                    text
                }
            };
            Some(text)
        } else {
            None
        };

        let has_attachment = needs_attachment.then(|| has_attachment_marker(&raw));

        Ok(Self {
            from: decoded("from"),
            to: decoded("to"),
            subject: decoded("subject"),
            labels,
            date: headers.get("date").and_then(parse_date),
            body,
            has_attachment,
        })
    }
}

/// Evaluate a query tree against one message's fields.
pub fn evaluate(query: &Query, fields: &MessageFields) -> bool {
    match query {
        Query::Leaf(chip) => leaf_matches(chip, fields),
        Query::And(a, b) => evaluate(a, fields) && evaluate(b, fields),
        Query::Or(a, b) => evaluate(a, fields) || evaluate(b, fields),
        Query::Not(inner) => !evaluate(inner, fields),
    }
}

fn leaf_matches(chip: &FilterChip, fields: &MessageFields) -> bool {
    let needle = chip.value.to_lowercase();
    match chip.kind {
        ChipKind::Filter(FieldName::From) => contains_ci(&fields.from, &needle),
        ChipKind::Filter(FieldName::To) => contains_ci(&fields.to, &needle),
        ChipKind::Filter(FieldName::Subject) => contains_ci(&fields.subject, &needle),
        ChipKind::Filter(FieldName::Label) => {
            fields.labels.iter().any(|l| contains_ci(l, &needle))
        }
        ChipKind::Filter(FieldName::Body) => {
            fields.body.as_deref().is_some_and(|b| b.contains(&needle))
        }
        ChipKind::Filter(FieldName::Has) => {
            matches!(needle.as_str(), "attachment" | "attachments")
                && fields.has_attachment == Some(true)
        }
        ChipKind::Filter(FieldName::Before) => match (fields.date, parse_filter_date(&chip.value))
        {
            (Some(date), Some(limit)) => date < limit,
            _ => false,
        },
        ChipKind::Filter(FieldName::After) => match (fields.date, parse_filter_date(&chip.value)) {
            (Some(date), Some(limit)) => date > limit,
            _ => false,
        },
        ChipKind::FreeText => {
            contains_ci(&fields.subject, &needle)
                || contains_ci(&fields.from, &needle)
                || contains_ci(&fields.to, &needle)
                || fields.labels.iter().any(|l| contains_ci(l, &needle))
                || fields.body.as_deref().is_some_and(|b| b.contains(&needle))
        }
        // Connectives are consumed while building the tree
        ChipKind::Connective(_) => true,
    }
}

/// Case-insensitive substring containment (needle already lower-cased).
fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

/// Parse a `before:`/`after:` value: `YYYY-MM-DD` (midnight UTC) or any
/// full date string [`parse_date`] accepts.
fn parse_filter_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(d) = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(DateTime::from_naive_utc_and_offset(
            d.and_time(NaiveTime::MIN),
            Utc,
        ));
    }
    parse_date(value)
}
