//! Byte-level parsers: header/MIME micro-decoding.

pub mod header;
pub mod mime;
