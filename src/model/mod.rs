//! Core data types shared between the scanner and the search engine.

pub mod boundary;
pub mod preview;

pub use boundary::{ByteRange, MessageBoundary};
pub use preview::Preview;
