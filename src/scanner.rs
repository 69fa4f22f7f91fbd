//! Streaming boundary scanner.
//!
//! Reads an archive in fixed-size chunks, locates `From ` separator lines,
//! and emits an ordered, contiguous list of message boundaries covering the
//! whole file, each with a cheap preview. Never loads the file into memory.
//! Tolerant of malformed input.

use chrono::Utc;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::config::ScanConfig;
use crate::error::{ArchiveError, Result};
use crate::model::{ByteRange, MessageBoundary, Preview};
use crate::parser::header::{decode_encoded_words, parse_date, ParsedHeaders};
use crate::source::ByteSource;

/// Progress callback: `(messages_found, percent_of_phase)`.
///
/// During the marker scan the percentage tracks bytes consumed; during the
/// preview phase it tracks previews extracted. Throttling is the caller's
/// job — the scanner reports at every chunk / preview.
pub type ProgressFn<'a> = &'a dyn Fn(u32, u8);

/// Streaming scanner that turns a [`ByteSource`] into message boundaries.
///
/// The scan is two-phase: a byte-level marker scan first, then a preview
/// extraction pass announced through a separate phase callback (it is
/// visually much slower than the raw scan). Cancellation is polled at each
/// chunk and each preview.
#[derive(Debug, Default)]
pub struct BoundaryScanner {
    config: ScanConfig,
}

impl BoundaryScanner {
    /// Scanner with default tuning.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scanner with explicit tuning.
    pub fn with_config(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Scan the source and return its message boundaries in file order.
    ///
    /// Guarantees for non-empty sources: boundaries are strictly ordered by
    /// start, contiguous, the first starts at 0 and the last ends at the
    /// file size. A non-empty file with no separator lines yields exactly
    /// one boundary spanning the whole file. An empty file yields none.
    ///
    /// Returns [`ArchiveError::Cancelled`] when the token fires; any source
    /// read failure aborts the scan (partial boundaries past the failure
    /// point cannot be trusted).
    pub fn scan(
        &self,
        source: &dyn ByteSource,
        progress: Option<ProgressFn<'_>>,
        on_preview_phase: Option<&dyn Fn()>,
        cancel: &CancelToken,
    ) -> Result<Vec<MessageBoundary>> {
        let size = source.size();
        if size == 0 {
            return Ok(Vec::new());
        }

        let starts = self.find_marker_offsets(source, size, progress, cancel)?;
        let boundaries = self.attach_previews(source, size, starts, progress, on_preview_phase, cancel)?;

        info!(count = boundaries.len(), bytes = size, "archive scan complete");
        Ok(boundaries)
    }

    /// Phase 1: chunked byte scan for `From `-prefixed lines.
    ///
    /// Returns the list of boundary start offsets, always beginning with 0.
    fn find_marker_offsets(
        &self,
        source: &dyn ByteSource,
        size: u64,
        progress: Option<ProgressFn<'_>>,
        cancel: &CancelToken,
    ) -> Result<Vec<u64>> {
        let chunk_size = self.config.chunk_size.max(1) as u64;
        let mut markers: Vec<u64> = Vec::new();

        // Bytes of the last, not-yet-terminated line, and the absolute
        // offset of its first byte.
        let mut carry: Vec<u8> = Vec::new();
        let mut carry_start: u64 = 0;
        let mut pos: u64 = 0;

        while pos < size {
            if cancel.is_cancelled() {
                debug!(pos, "marker scan cancelled");
                return Err(ArchiveError::Cancelled);
            }

            let end = (pos + chunk_size).min(size);
            let chunk = source.read_range_bytes(pos, end)?;
            carry.extend_from_slice(&chunk);

            let mut line_start = 0usize;
            while let Some(nl) = find_newline(&carry[line_start..]) {
                let line = &carry[line_start..line_start + nl];
                let offset = carry_start + line_start as u64;
                // BOM tolerance applies to the start of the file only;
                // BOM bytes inside a body must not open a boundary.
                let line = if offset == 0 { strip_bom(line) } else { line };
                if is_marker_line(line) {
                    markers.push(offset);
                }
                line_start += nl + 1;
            }
            carry.drain(..line_start);
            carry_start += line_start as u64;
            pos = end;

            if let Some(cb) = progress {
                cb(markers.len() as u32, percent(pos, size));
            }
        }

        // A final line without a trailing newline can still be a marker.
        let tail = if carry_start == 0 { strip_bom(&carry) } else { &carry[..] };
        if is_marker_line(tail) {
            markers.push(carry_start);
        }

        // The union of boundaries must cover [0, size): bytes before the
        // first marker (or a marker-less file) form the first message.
        if markers.first() != Some(&0) {
            markers.insert(0, 0);
        }
        Ok(markers)
    }

    /// Phase 2: read the first few KB of each boundary and decode a preview.
    fn attach_previews(
        &self,
        source: &dyn ByteSource,
        size: u64,
        starts: Vec<u64>,
        progress: Option<ProgressFn<'_>>,
        on_preview_phase: Option<&dyn Fn()>,
        cancel: &CancelToken,
    ) -> Result<Vec<MessageBoundary>> {
        if let Some(cb) = on_preview_phase {
            cb();
        }

        let total = starts.len();
        let mut boundaries = Vec::with_capacity(total);

        for (i, &start) in starts.iter().enumerate() {
            if cancel.is_cancelled() {
                debug!(done = i, total, "preview extraction cancelled");
                return Err(ArchiveError::Cancelled);
            }

            let end = starts.get(i + 1).copied().unwrap_or(size);
            let range = ByteRange::new(start, end);
            let read_end = end.min(start + self.config.preview_read_limit);
            let head = source.read_range_bytes(start, read_end)?;
            let preview = extract_preview(&head, range.len());

            boundaries.push(MessageBoundary {
                index: i as u32,
                range,
                preview,
            });

            if let Some(cb) = progress {
                cb(total as u32, percent((i + 1) as u64, total as u64));
            }
        }

        Ok(boundaries)
    }
}

/// Build a preview from the raw head of a message. Decode failures fall
/// back to placeholder values; this never errors.
fn extract_preview(head: &[u8], size_bytes: u64) -> Preview {
    let headers = ParsedHeaders::parse(head);
    if headers.is_empty() {
        return Preview::fallback(size_bytes);
    }

    let decode_or = |name: &str, fallback: &str| {
        headers
            .get(name)
            .map(decode_encoded_words)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| fallback.to_string())
    };

    let date_iso = headers
        .get("date")
        .and_then(parse_date)
        .unwrap_or_else(Utc::now)
        .to_rfc3339();

    let labels = headers
        .get("x-gmail-labels")
        .map(|raw| {
            decode_encoded_words(raw)
                .split(',')
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Preview {
        from: decode_or("from", "Unknown"),
        to: decode_or("to", "Unknown"),
        subject: decode_or("subject", ""),
        date_iso,
        size_bytes,
        labels,
    }
}

/// Check whether a line begins a new message.
///
/// Byte-exact comparison against `From ` — deliberately not Unicode-aware,
/// so multi-byte encoded content cannot produce false matches.
fn is_marker_line(line: &[u8]) -> bool {
    line.starts_with(b"From ")
}

/// Strip a UTF-8 byte order mark. Applied only to the line at file offset 0.
fn strip_bom(line: &[u8]) -> &[u8] {
    line.strip_prefix(&[0xEF, 0xBB, 0xBF][..]).unwrap_or(line)
}

#[inline]
fn find_newline(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}

fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        100
    } else {
        ((done.saturating_mul(100)) / total).min(100) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    fn two_message_archive() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(
            b"From alice@example.com Mon Jan 01 10:00:00 2024\n\
              From: Alice <alice@example.com>\n\
              To: bob@example.com\n\
              Subject: First\n\
              Date: Mon, 01 Jan 2024 10:00:00 +0000\n\n\
              hello\n",
        );
        data.extend_from_slice(
            b"From bob@example.com Mon Jan 01 11:00:00 2024\n\
              From: Bob <bob@example.com>\n\
              To: alice@example.com\n\
              Subject: Second\n\
              Date: Mon, 01 Jan 2024 11:00:00 +0000\n\n\
              world\n",
        );
        data
    }

    fn scan_bytes(data: Vec<u8>) -> Vec<MessageBoundary> {
        let source = MemorySource::new(data);
        BoundaryScanner::new()
            .scan(&source, None, None, &CancelToken::new())
            .unwrap()
    }

    #[test]
    fn test_is_marker_line() {
        assert!(is_marker_line(b"From user@example.com Thu Jan 01 00:00:00 2024"));
        assert!(!is_marker_line(b"from user@example.com")); // lowercase
        assert!(!is_marker_line(b">From user@example.com")); // escaped
        assert!(!is_marker_line(b"Subject: From here"));
        assert!(!is_marker_line(b"From:not-a-separator"));
    }

    #[test]
    fn test_bom_at_file_start_tolerated() {
        let mut data = vec![0xEF, 0xBB, 0xBF];
        data.extend_from_slice(&two_message_archive());
        let boundaries = scan_bytes(data);
        assert_eq!(boundaries.len(), 2);
        assert_eq!(boundaries[0].range.start, 0);
    }

    #[test]
    fn test_bom_mid_file_does_not_open_boundary() {
        let mut data = b"From alice@example.com Mon Jan 01 10:00:00 2024\n\
                         Subject: one message\n\n\
                         body line\n"
            .to_vec();
        data.extend_from_slice(&[0xEF, 0xBB, 0xBF]);
        data.extend_from_slice(b"From here the body continues\n");
        let boundaries = scan_bytes(data);
        assert_eq!(boundaries.len(), 1);
    }

    #[test]
    fn test_empty_file_yields_no_boundaries() {
        assert!(scan_bytes(Vec::new()).is_empty());
    }

    #[test]
    fn test_two_messages() {
        let data = two_message_archive();
        let total = data.len() as u64;
        let boundaries = scan_bytes(data);
        assert_eq!(boundaries.len(), 2);
        assert_eq!(boundaries[0].range.start, 0);
        assert_eq!(boundaries[0].range.end, boundaries[1].range.start);
        assert_eq!(boundaries[1].range.end, total);
        assert_eq!(boundaries[0].preview.subject, "First");
        assert_eq!(boundaries[1].preview.subject, "Second");
        assert_eq!(boundaries[1].index, 1);
    }

    #[test]
    fn test_boundaries_cover_file() {
        let data = two_message_archive();
        let total = data.len() as u64;
        let boundaries = scan_bytes(data);
        let sum: u64 = boundaries.iter().map(|b| b.range.len()).sum();
        assert_eq!(sum, total);
    }

    #[test]
    fn test_markerless_file_is_single_message() {
        let data = b"Subject: not really mail\n\njust some text\n".to_vec();
        let total = data.len() as u64;
        let boundaries = scan_bytes(data);
        assert_eq!(boundaries.len(), 1);
        assert_eq!(boundaries[0].range.start, 0);
        assert_eq!(boundaries[0].range.end, total);
    }

    #[test]
    fn test_preamble_before_first_marker() {
        let mut data = b"some mailbox preamble\n".to_vec();
        let preamble_len = data.len() as u64;
        data.extend_from_slice(&two_message_archive());
        let boundaries = scan_bytes(data);
        assert_eq!(boundaries.len(), 3);
        assert_eq!(boundaries[0].range.start, 0);
        assert_eq!(boundaries[0].range.end, preamble_len);
        assert_eq!(boundaries[1].range.start, preamble_len);
    }

    #[test]
    fn test_marker_split_across_chunks() {
        // Chunk size of 7 forces every line across multiple reads
        let data = two_message_archive();
        let source = MemorySource::new(data);
        let scanner = BoundaryScanner::with_config(ScanConfig {
            chunk_size: 7,
            ..ScanConfig::default()
        });
        let boundaries = scanner
            .scan(&source, None, None, &CancelToken::new())
            .unwrap();
        assert_eq!(boundaries.len(), 2);
    }

    #[test]
    fn test_final_line_without_newline_is_marker() {
        let mut data = two_message_archive();
        data.extend_from_slice(b"From carol@example.com Mon Jan 01 12:00:00 2024");
        let boundaries = scan_bytes(data);
        assert_eq!(boundaries.len(), 3);
    }

    #[test]
    fn test_rescan_is_deterministic() {
        let data = two_message_archive();
        let source = MemorySource::new(data);
        let scanner = BoundaryScanner::new();
        let a = scanner
            .scan(&source, None, None, &CancelToken::new())
            .unwrap();
        let b = scanner
            .scan(&source, None, None, &CancelToken::new())
            .unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.range, y.range);
            assert_eq!(x.preview.subject, y.preview.subject);
            assert_eq!(x.preview.date_iso, y.preview.date_iso);
        }
    }

    #[test]
    fn test_read_failure_aborts_scan_with_io_error() {
        struct FailingSource {
            size: u64,
        }

        impl ByteSource for FailingSource {
            fn size(&self) -> u64 {
                self.size
            }

            fn read_range_bytes(&self, _start: u64, _end: u64) -> Result<Vec<u8>> {
                Err(ArchiveError::io(
                    "/archive.mbox",
                    std::io::Error::other("bad sector"),
                ))
            }
        }

        let source = FailingSource { size: 4096 };
        let err = BoundaryScanner::new()
            .scan(&source, None, None, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Io { .. }));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_cancellation_before_first_chunk() {
        let token = CancelToken::new();
        token.cancel();
        let source = MemorySource::new(two_message_archive());
        let err = BoundaryScanner::new()
            .scan(&source, None, None, &token)
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_preview_phase_callback_fires() {
        use std::cell::Cell;
        let phase_started = Cell::new(false);
        let source = MemorySource::new(two_message_archive());
        BoundaryScanner::new()
            .scan(
                &source,
                None,
                Some(&|| phase_started.set(true)),
                &CancelToken::new(),
            )
            .unwrap();
        assert!(phase_started.get());
    }

    #[test]
    fn test_progress_is_monotonic_during_byte_scan() {
        use std::cell::RefCell;
        let percents = RefCell::new(Vec::new());
        let source = MemorySource::new(two_message_archive());
        let scanner = BoundaryScanner::with_config(ScanConfig {
            chunk_size: 16,
            ..ScanConfig::default()
        });
        scanner
            .scan(
                &source,
                Some(&|_found, pct| percents.borrow_mut().push(pct)),
                None,
                &CancelToken::new(),
            )
            .unwrap();
        let seen = percents.borrow();
        assert!(!seen.is_empty());
        // Percent resets once between the byte-scan and preview phases,
        // but is non-decreasing within each phase.
        let reset = seen.iter().position(|&p| p == 100).map(|i| i + 1);
        let (scan_phase, preview_phase) = seen.split_at(reset.unwrap_or(seen.len()));
        assert!(scan_phase.windows(2).all(|w| w[0] <= w[1]));
        assert!(preview_phase.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_corrupt_preview_headers_fall_back() {
        let mut data = b"From x Mon Jan 01 00:00:00 2024\n".to_vec();
        data.extend_from_slice(&[0xFF, 0xFE, 0x00, 0x01]);
        data.push(b'\n');
        let boundaries = scan_bytes(data);
        assert_eq!(boundaries.len(), 1);
        assert_eq!(boundaries[0].preview.from, "Unknown");
        assert_eq!(boundaries[0].preview.subject, "");
    }

    #[test]
    fn test_encoded_subject_in_preview() {
        let data = b"From x@y.z Mon Jan 01 00:00:00 2024\n\
                     From: =?UTF-8?B?Sm9zw6k=?= <jose@example.com>\n\
                     Subject: =?UTF-8?Q?Caf=C3=A9?=\n\
                     Date: Mon, 01 Jan 2024 10:00:00 +0000\n\n\
                     body\n"
            .to_vec();
        let boundaries = scan_bytes(data);
        assert_eq!(boundaries[0].preview.subject, "Café");
        assert!(boundaries[0].preview.from.contains("José"));
        assert!(boundaries[0].preview.date_iso.starts_with("2024-01-01T10:00:00"));
    }

    #[test]
    fn test_labels_in_preview() {
        let data = b"From x@y.z Mon Jan 01 00:00:00 2024\n\
                     Subject: labelled\n\
                     X-Gmail-Labels: Inbox, Sprint Planning ,\n\n\
                     body\n"
            .to_vec();
        let boundaries = scan_bytes(data);
        assert_eq!(
            boundaries[0].preview.labels,
            vec!["Inbox".to_string(), "Sprint Planning".to_string()]
        );
    }
}
