//! Header micro-decoding: RFC 2822 folding, RFC 2047 encoded-words, and
//! date parsing.
//!
//! Everything here degrades gracefully: malformed input produces the best
//! available approximation (logged), never an error.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use tracing::warn;

use crate::source::decode_text;

/// Parsed message headers: lower-cased names mapped to their raw values,
/// in file order, duplicates preserved (e.g. multiple `Received:` lines).
#[derive(Debug, Clone, Default)]
pub struct ParsedHeaders {
    entries: Vec<(String, String)>,
}

impl ParsedHeaders {
    /// Parse raw header bytes.
    ///
    /// Splits on line breaks and unfolds continuations (lines starting with
    /// whitespace extend the previous value). Lines without a `:` are
    /// skipped — typically the file-level `From ` envelope marker, not a
    /// header. Parsing stops at the first blank line, so handing in a raw
    /// message prefix that includes body bytes is safe.
    pub fn parse(raw: &[u8]) -> Self {
        // Strip BOM if present at the very start of the file
        let raw = raw.strip_prefix(&[0xEF, 0xBB, 0xBF][..]).unwrap_or(raw);
        let text = decode_text(raw);

        let mut entries: Vec<(String, String)> = Vec::new();
        for (i, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                break; // end of headers
            }
            if i == 0 && line.starts_with("From ") {
                // File-level envelope marker, not a header (its timestamp
                // contains colons, so the colon test alone is not enough)
                continue;
            }
            if line.starts_with(' ') || line.starts_with('\t') {
                // RFC 2822 folding: continuation of the previous header
                if let Some(last) = entries.last_mut() {
                    last.1.push(' ');
                    last.1.push_str(line.trim());
                }
            } else if let Some(colon) = line.find(':') {
                let name = line[..colon].trim().to_lowercase();
                let rest = &line[colon + 1..];
                // Trim only the single separating space
                let value = rest.strip_prefix(' ').unwrap_or(rest).to_string();
                entries.push((name, value));
            }
            // No colon and not a continuation: envelope marker or junk, skip
        }

        Self { entries }
    }

    /// First value for a header name (name must be lower-case).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All values for a header name, in file order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.entries
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Number of parsed header fields.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(lower_cased_name, raw_value)` pairs in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// One parsed `=?charset?encoding?text?=` token, already B/Q-decoded to
/// bytes but not yet charset-decoded.
struct EncodedWord {
    charset: String,
    bytes: Vec<u8>,
    /// Bytes of input consumed, counted from the leading `=?`.
    consumed: usize,
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// Adjacent encoded-words that share a charset and are separated only by
/// whitespace are merged at the byte level before charset decoding, so a
/// sentence split across words gains no spurious spaces and multi-byte
/// sequences split across words decode correctly.
///
/// Never fails: an invalid token is passed through verbatim.
pub fn decode_encoded_words(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    // Decoded bytes of the preceding word(s), awaiting charset decode.
    let mut pending: Option<(String, Vec<u8>)> = None;

    while let Some(start) = rest.find("=?") {
        let before = &rest[..start];

        match parse_encoded_word(&rest[start..]) {
            Some(word) => {
                pending = match pending.take() {
                    Some((charset, mut bytes))
                        if charset.eq_ignore_ascii_case(&word.charset)
                            && !before.is_empty()
                            && before.chars().all(char::is_whitespace) =>
                    {
                        // Whitespace-only gap between same-charset words:
                        // join, dropping the gap (RFC 2047 §6.2)
                        bytes.extend_from_slice(&word.bytes);
                        Some((charset, bytes))
                    }
                    prev => {
                        if let Some((charset, bytes)) = prev {
                            out.push_str(&decode_charset(&charset, &bytes));
                        }
                        out.push_str(before);
                        Some((word.charset, word.bytes))
                    }
                };
                rest = &rest[start + word.consumed..];
            }
            None => {
                if let Some((charset, bytes)) = pending.take() {
                    out.push_str(&decode_charset(&charset, &bytes));
                }
                out.push_str(before);
                out.push_str("=?");
                rest = &rest[start + 2..];
            }
        }
    }

    if let Some((charset, bytes)) = pending {
        out.push_str(&decode_charset(&charset, &bytes));
    }
    out.push_str(rest);
    out
}

/// Parse a single encoded-word starting at `=?`. Returns `None` when the
/// token is structurally invalid.
fn parse_encoded_word(s: &str) -> Option<EncodedWord> {
    let body = s.strip_prefix("=?")?;
    let first_q = body.find('?')?;
    let charset = &body[..first_q];

    let rest = &body[first_q + 1..];
    let second_q = rest.find('?')?;
    let encoding = &rest[..second_q];

    let rest2 = &rest[second_q + 1..];
    let end = rest2.find("?=")?;
    let encoded_text = &rest2[..end];

    let bytes = match encoding {
        "B" | "b" => decode_base64(encoded_text),
        "Q" | "q" => decode_q(encoded_text),
        _ => return None,
    };

    Some(EncodedWord {
        charset: charset.to_string(),
        bytes,
        consumed: 2 + first_q + 1 + second_q + 1 + end + 2,
    })
}

/// Defensive base64 decode: whitespace skipped, `=` treated as padding per
/// 4-character block, trailing partial blocks padded out.
fn decode_base64(input: &str) -> Vec<u8> {
    fn val(c: u8) -> u8 {
        match c {
            b'A'..=b'Z' => c - b'A',
            b'a'..=b'z' => c - b'a' + 26,
            b'0'..=b'9' => c - b'0' + 52,
            b'+' => 62,
            b'/' => 63,
            _ => 0,
        }
    }
    fn emit(quad: &[u8; 4], out: &mut Vec<u8>) {
        let v = quad.map(val);
        out.push((v[0] << 2) | (v[1] >> 4));
        if quad[2] != b'=' {
            out.push((v[1] << 4) | (v[2] >> 2));
        }
        if quad[2] != b'=' && quad[3] != b'=' {
            out.push((v[2] << 6) | v[3]);
        }
    }

    let mut out = Vec::with_capacity(input.len() * 3 / 4);
    let mut quad = [0u8; 4];
    let mut qi = 0;
    for &b in input.as_bytes() {
        if b.is_ascii_whitespace() {
            continue;
        }
        quad[qi] = b;
        qi += 1;
        if qi == 4 {
            emit(&quad, &mut out);
            qi = 0;
        }
    }
    if qi > 0 {
        for slot in quad.iter_mut().skip(qi) {
            *slot = b'=';
        }
        emit(&quad, &mut out);
    }
    out
}

/// Decode Q-encoding (RFC 2047): `_` → space, `=XX` hex escapes, soft
/// line breaks (`=` before a line ending) elided.
fn decode_q(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                out.push(b' ');
                i += 1;
            }
            b'=' if i + 1 < bytes.len() && (bytes[i + 1] == b'\r' || bytes[i + 1] == b'\n') => {
                // Soft line break
                i += 2;
                if i < bytes.len() && bytes[i] == b'\n' {
                    i += 1;
                }
            }
            b'=' if i + 2 < bytes.len() => {
                match std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'=');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    out
}

/// Decode bytes using a named charset, with common aliases normalized and
/// a UTF-8 → WINDOWS-1252 fallback ladder for unknown labels.
fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    let normalized = match charset.to_lowercase().as_str() {
        "utf8" => "utf-8".to_string(),
        "latin1" => "iso-8859-1".to_string(),
        "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    };

    if normalized == "utf-8" {
        return String::from_utf8_lossy(bytes).into_owned();
    }

    if let Some(encoding) = encoding_rs::Encoding::for_label(normalized.as_bytes()) {
        let (decoded, _, _) = encoding.decode(bytes);
        return decoded.into_owned();
    }

    warn!(charset, "unknown charset in encoded-word, trying fallbacks");
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Parse an email date string.
///
/// Tries chrono's RFC 2822 and RFC 3339 parsers first, then a manual
/// `D Mon YYYY HH:MM[:SS] [±ZZZZ|ZONE]` match with a two-digit-year pivot
/// at 50 (`<50` → 2000s, otherwise 1900s). Returns `None` when nothing
/// fits; callers substitute "now" for previews.
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    match parse_date_manual(trimmed) {
        Some(dt) => Some(dt),
        None => {
            warn!(date = trimmed, "could not parse date");
            None
        }
    }
}

/// Manual RFC 2822-ish fallback for dates chrono rejects.
fn parse_date_manual(s: &str) -> Option<DateTime<Utc>> {
    let s = strip_day_of_week(s);
    let tokens: Vec<&str> = s.split_whitespace().collect();
    if tokens.len() < 4 {
        return None;
    }

    let day: u32 = tokens[0].parse().ok()?;
    let month = month_number(tokens[1])?;
    let mut year: i32 = tokens[2].parse().ok()?;
    if year < 100 {
        year += if year < 50 { 2000 } else { 1900 };
    }

    let mut time = tokens[3].split(':');
    let hour: u32 = time.next()?.parse().ok()?;
    let minute: u32 = time.next()?.parse().ok()?;
    let second: u32 = match time.next() {
        Some(sec) => sec.parse().ok()?,
        None => 0,
    };

    let offset_secs = tokens.get(4).map_or(0, |z| zone_offset_secs(z));

    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
    Some(Utc.from_utc_datetime(&(naive - Duration::seconds(offset_secs))))
}

/// Strip a leading day-of-week prefix (e.g. `"Thu, "` or `"Thu "`).
fn strip_day_of_week(s: &str) -> &str {
    let days = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    let trimmed = s.trim();
    for day in days {
        if let Some(rest) = trimmed.strip_prefix(day) {
            let rest = rest.strip_prefix(',').unwrap_or(rest);
            if rest.starts_with(' ') {
                return rest.trim_start();
            }
        }
    }
    trimmed
}

fn month_number(token: &str) -> Option<u32> {
    let months = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let lower = token.to_lowercase();
    months
        .iter()
        .position(|m| lower.starts_with(m))
        .map(|i| i as u32 + 1)
}

/// Numeric offset in seconds for `±HHMM` or a well-known zone name.
/// Unknown zones are treated as UTC.
fn zone_offset_secs(zone: &str) -> i64 {
    if let Some(rest) = zone.strip_prefix('+').or_else(|| zone.strip_prefix('-')) {
        if rest.len() == 4 {
            if let (Ok(h), Ok(m)) = (rest[..2].parse::<i64>(), rest[2..].parse::<i64>()) {
                let secs = h * 3600 + m * 60;
                return if zone.starts_with('-') { -secs } else { secs };
            }
        }
    }
    match zone {
        "EST" => -5 * 3600,
        "EDT" => -4 * 3600,
        "CST" => -6 * 3600,
        "CDT" => -5 * 3600,
        "MST" => -7 * 3600,
        "MDT" => -6 * 3600,
        "PST" => -8 * 3600,
        "PDT" => -7 * 3600,
        "CET" => 3600,
        "CEST" => 2 * 3600,
        "JST" => 9 * 3600,
        _ => 0, // GMT, UT, UTC, unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_headers_basic() {
        let raw = b"From alice@example.com Mon Jan 01 10:00:00 2024\n\
                    From: Alice <alice@example.com>\n\
                    Subject: Hello\n\n\
                    Body text\n";
        let headers = ParsedHeaders::parse(raw);
        assert_eq!(headers.get("from"), Some("Alice <alice@example.com>"));
        assert_eq!(headers.get("subject"), Some("Hello"));
        // Envelope marker skipped, body not parsed
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_parse_headers_folding() {
        let raw = b"Subject: This is a long\n\tsubject line\nFrom: user@example.com\n";
        let headers = ParsedHeaders::parse(raw);
        assert_eq!(headers.get("subject"), Some("This is a long subject line"));
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_parse_headers_duplicates_preserved() {
        let raw = b"Received: from a\nReceived: from b\nSubject: x\n";
        let headers = ParsedHeaders::parse(raw);
        let received: Vec<&str> = headers.get_all("received").collect();
        assert_eq!(received, vec!["from a", "from b"]);
    }

    #[test]
    fn test_parse_headers_stops_at_blank_line() {
        let raw = b"Subject: real\n\nNotAHeader: in body\n";
        let headers = ParsedHeaders::parse(raw);
        assert_eq!(headers.len(), 1);
        assert!(headers.get("notaheader").is_none());
    }

    #[test]
    fn test_decode_base64_encoded_word() {
        assert_eq!(
            decode_encoded_words("=?UTF-8?B?V2VsY29tZSB0byBNQk9YIFZpZXdlciDwn5iK?="),
            "Welcome to MBOX Viewer \u{1F60A}"
        );
    }

    #[test]
    fn test_decode_q_encoded_word() {
        assert_eq!(decode_encoded_words("=?ISO-8859-1?Q?caf=E9?="), "café");
        assert_eq!(
            decode_encoded_words("=?ISO-8859-1?Q?R=E9sum=E9_du_projet?="),
            "Résumé du projet"
        );
    }

    #[test]
    fn test_adjacent_words_merge_without_space() {
        let input = "=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?=";
        assert_eq!(decode_encoded_words(input), "Hola mundo");
    }

    #[test]
    fn test_multibyte_split_across_words() {
        // "😊" split into two base64 words: f0 9f / 98 8a
        let input = "=?UTF-8?B?8J8=?= =?UTF-8?B?mIo=?=";
        assert_eq!(decode_encoded_words(input), "\u{1F60A}");
    }

    #[test]
    fn test_different_charsets_not_merged() {
        let input = "=?ISO-8859-1?Q?caf=E9?= =?UTF-8?B?IG1hcw==?=";
        assert_eq!(decode_encoded_words(input), "café mas");
    }

    #[test]
    fn test_mixed_plain_and_encoded() {
        let input = "Re: =?UTF-8?B?SG9sYQ==?= there";
        assert_eq!(decode_encoded_words(input), "Re: Hola there");
    }

    #[test]
    fn test_invalid_token_passed_through() {
        assert_eq!(decode_encoded_words("=?broken"), "=?broken");
        assert_eq!(decode_encoded_words("price =? 100"), "price =? 100");
    }

    #[test]
    fn test_charset_alias_utf8() {
        assert_eq!(decode_encoded_words("=?utf8?B?SG9sYQ==?="), "Hola");
    }

    #[test]
    fn test_unknown_charset_falls_back() {
        // Valid UTF-8 payload under a bogus charset label decodes anyway
        assert_eq!(decode_encoded_words("=?x-no-such?B?SG9sYQ==?="), "Hola");
    }

    #[test]
    fn test_parse_date_rfc2822() {
        let dt = parse_date("Fri, 1 Jan 2021 09:10:00 +0000").unwrap();
        assert_eq!(dt.to_rfc3339(), "2021-01-01T09:10:00+00:00");
    }

    #[test]
    fn test_parse_date_offset_applied() {
        let dt = parse_date("Fri, 1 Jan 2021 09:10:00 +0200").unwrap();
        assert_eq!(dt.to_rfc3339(), "2021-01-01T07:10:00+00:00");
    }

    #[test]
    fn test_parse_date_manual_no_seconds() {
        let dt = parse_date("1 Jan 2021 09:10 +0000").unwrap();
        assert_eq!(dt.to_rfc3339(), "2021-01-01T09:10:00+00:00");
    }

    #[test]
    fn test_parse_date_two_digit_year_pivot() {
        let dt = parse_date("1 Jan 21 09:10:00 +0000").unwrap();
        assert_eq!(dt.format("%Y").to_string(), "2021");
        let dt = parse_date("1 Jan 99 09:10:00 +0000").unwrap();
        assert_eq!(dt.format("%Y").to_string(), "1999");
    }

    #[test]
    fn test_parse_date_named_zone() {
        let dt = parse_date("Thu, 4 Jan 2024 10:00:00 EST").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-01-04T15:00:00+00:00");
    }

    #[test]
    fn test_parse_date_iso8601() {
        assert!(parse_date("2024-01-04T10:00:00Z").is_some());
    }

    #[test]
    fn test_parse_date_garbage() {
        assert!(parse_date("not a date").is_none());
        assert!(parse_date("").is_none());
    }
}
