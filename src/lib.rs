//! `mboxlens` — a read-only MBOX archive viewer core.
//!
//! This crate scans an archive into byte-exact message boundaries with
//! lightweight previews, decodes RFC 2047 headers, and runs a query-language
//! search on a background worker thread. The archive file is the only
//! source of truth: nothing here writes to it.

pub mod cancel;
pub mod config;
pub mod error;
pub mod model;
pub mod parser;
pub mod scanner;
pub mod search;
pub mod source;

pub use cancel::CancelToken;
pub use error::{ArchiveError, Result};
pub use model::{ByteRange, MessageBoundary, Preview};
pub use scanner::BoundaryScanner;
pub use search::{SearchEngine, SearchEvent};
pub use source::{ByteSource, FileSource, MemorySource};
