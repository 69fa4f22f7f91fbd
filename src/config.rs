//! Tuning configuration for scanning and searching.
//!
//! The library never reads config files itself — the host deserializes
//! these structs from whatever source it likes (all fields have defaults,
//! so an empty document is valid).

use serde::{Deserialize, Serialize};

/// Boundary scanner tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Size of each chunk read from the source during the marker scan.
    pub chunk_size: usize,

    /// Maximum bytes read from the start of a message for its preview.
    pub preview_read_limit: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512 * 1024,
            preview_read_limit: 8 * 1024,
        }
    }
}

/// Search engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum bytes read per message when only header fields are filtered.
    pub header_read_limit: u64,

    /// Number of decoded message bodies kept in the worker's LRU cache.
    pub body_cache_size: usize,

    /// Emit a progress event at most once per this many evaluated messages
    /// (progress is also emitted whenever the integer percentage changes).
    pub progress_interval: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            header_read_limit: 8 * 1024,
            body_cache_size: 64,
            progress_interval: 64,
        }
    }
}
