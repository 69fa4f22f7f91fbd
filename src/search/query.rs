//! Search query tokenizer and expression tree.
//!
//! # Supported syntax
//!
//! **Field filters**: `from:`, `to:`, `subject:`, `body:`, `label:`,
//! `has:`, `before:`, `after:` (field names case-insensitive). Values may
//! be double-quoted to include whitespace: `label:"Sprint Planning"`.
//!
//! **Connectives**: `AND`, `OR`, `NOT` (case-insensitive). Adjacent
//! non-connective tokens are joined with an implicit AND; `NOT` applies to
//! the following token.
//!
//! Everything else is free text. The tokenizer is pure and total: it never
//! fails on malformed input — an unterminated quote simply reads to the end
//! of the string.

/// A filterable message field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldName {
    From,
    To,
    Subject,
    Body,
    Label,
    Has,
    Before,
    After,
}

impl FieldName {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "from" => Some(Self::From),
            "to" => Some(Self::To),
            "subject" => Some(Self::Subject),
            "body" => Some(Self::Body),
            "label" => Some(Self::Label),
            "has" => Some(Self::Has),
            "before" => Some(Self::Before),
            "after" => Some(Self::After),
            _ => None,
        }
    }
}

/// Boolean connective token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
    Not,
}

/// What a chip is: a field filter, free text, or a connective.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChipKind {
    Filter(FieldName),
    FreeText,
    Connective(BoolOp),
}

/// One parsed token of the query string, plus its source span so the
/// caller can highlight or remove it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterChip {
    pub kind: ChipKind,
    /// The token's value: the filter's value portion, the free text, or
    /// the connective's original spelling. Surrounding quotes stripped.
    pub value: String,
    /// Byte span `(start, end)` of the raw token in the query string.
    pub span: (usize, usize),
}

/// Tokenize a query string into chips.
///
/// Whitespace separates tokens except inside double quotes. Never fails.
pub fn tokenize(query: &str) -> Vec<FilterChip> {
    let mut chips = Vec::new();
    let bytes = query.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        // Skip inter-token whitespace
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }

        let start = i;
        let mut in_quotes = false;
        while i < bytes.len() && (in_quotes || !bytes[i].is_ascii_whitespace()) {
            if bytes[i] == b'"' {
                in_quotes = !in_quotes;
            }
            i += 1;
        }

        chips.push(classify(&query[start..i], (start, i)));
    }

    chips
}

/// Turn one raw token into a chip.
fn classify(raw: &str, span: (usize, usize)) -> FilterChip {
    if raw.eq_ignore_ascii_case("AND") {
        return connective(BoolOp::And, raw, span);
    }
    if raw.eq_ignore_ascii_case("OR") {
        return connective(BoolOp::Or, raw, span);
    }
    if raw.eq_ignore_ascii_case("NOT") {
        return connective(BoolOp::Not, raw, span);
    }

    if let Some((name, value)) = raw.split_once(':') {
        if !value.is_empty() {
            if let Some(field) = FieldName::parse(name) {
                return FilterChip {
                    kind: ChipKind::Filter(field),
                    value: unquote(value).to_string(),
                    span,
                };
            }
        }
    }

    FilterChip {
        kind: ChipKind::FreeText,
        value: unquote(raw).to_string(),
        span,
    }
}

fn connective(op: BoolOp, raw: &str, span: (usize, usize)) -> FilterChip {
    FilterChip {
        kind: ChipKind::Connective(op),
        value: raw.to_string(),
        span,
    }
}

/// Strip a single pair of surrounding double quotes, if present.
fn unquote(s: &str) -> &str {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// A boolean expression tree over filter chips.
///
/// Immutable once built; constructed per search invocation.
#[derive(Debug, Clone)]
pub enum Query {
    Leaf(FilterChip),
    And(Box<Query>, Box<Query>),
    Or(Box<Query>, Box<Query>),
    Not(Box<Query>),
}

impl Query {
    /// Tokenize and build in one step. `None` when the query has no
    /// filter or free-text tokens (the engine stays idle on such input).
    pub fn parse(query: &str) -> Option<Self> {
        Self::from_chips(&tokenize(query))
    }

    /// Build an expression tree from chips, left to right.
    ///
    /// Implicit AND joins adjacent non-connective chips; `NOT` negates the
    /// next leaf; dangling connectives at the end are ignored.
    pub fn from_chips(chips: &[FilterChip]) -> Option<Self> {
        let mut expr: Option<Query> = None;
        let mut or_pending = false;
        let mut not_pending = false;

        for chip in chips {
            match chip.kind {
                ChipKind::Connective(BoolOp::And) => or_pending = false,
                ChipKind::Connective(BoolOp::Or) => or_pending = true,
                ChipKind::Connective(BoolOp::Not) => not_pending = !not_pending,
                _ => {
                    let mut leaf = Query::Leaf(chip.clone());
                    if not_pending {
                        leaf = Query::Not(Box::new(leaf));
                    }
                    expr = Some(match expr {
                        None => leaf,
                        Some(prev) if or_pending => Query::Or(Box::new(prev), Box::new(leaf)),
                        Some(prev) => Query::And(Box::new(prev), Box::new(leaf)),
                    });
                    or_pending = false;
                    not_pending = false;
                }
            }
        }

        expr
    }

    /// Whether any leaf satisfies the predicate (structural, ignores NOT).
    fn any_leaf(&self, pred: &dyn Fn(&FilterChip) -> bool) -> bool {
        match self {
            Query::Leaf(chip) => pred(chip),
            Query::And(a, b) | Query::Or(a, b) => a.any_leaf(pred) || b.any_leaf(pred),
            Query::Not(inner) => inner.any_leaf(pred),
        }
    }

    /// Whether evaluation requires the decoded message body
    /// (free text or a `body:` filter).
    pub fn needs_body(&self) -> bool {
        self.any_leaf(&|chip| {
            matches!(
                chip.kind,
                ChipKind::FreeText | ChipKind::Filter(FieldName::Body)
            )
        })
    }

    /// Whether evaluation requires the attachment structural scan.
    pub fn needs_attachment_scan(&self) -> bool {
        self.any_leaf(&|chip| matches!(chip.kind, ChipKind::Filter(FieldName::Has)))
    }
}
