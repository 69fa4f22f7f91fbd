//! Random-access byte sources.
//!
//! Everything in this crate reads through the [`ByteSource`] trait: an
//! immutable, randomly-addressable sequence of bytes with half-open range
//! reads. The scanner and the search worker only ever read; there are no
//! writers, so a source can be shared freely across threads.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{ArchiveError, Result};

/// An immutable, randomly-addressable byte source.
///
/// Ranges are half-open: `0 <= start < end <= size()`.
pub trait ByteSource: Send + Sync {
    /// Total size of the source in bytes.
    fn size(&self) -> u64;

    /// Read the bytes in `[start, end)`.
    fn read_range_bytes(&self, start: u64, end: u64) -> Result<Vec<u8>>;

    /// Read `[start, end)` as text, best effort.
    ///
    /// Tries UTF-8 first, then falls back to WINDOWS-1252 (which accepts
    /// every byte), so this never fails on content — only on I/O.
    fn read_range_text(&self, start: u64, end: u64) -> Result<String> {
        let bytes = self.read_range_bytes(start, end)?;
        Ok(decode_text(&bytes))
    }
}

/// Decode raw bytes to a string: UTF-8 first, WINDOWS-1252 fallback.
pub(crate) fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// A [`ByteSource`] over a local file.
///
/// The handle is opened once and reused for every read; a mutex around the
/// seek+read pair keeps the positional reads independent when the source is
/// shared with the search worker.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    size: u64,
    file: Mutex<File>,
}

impl FileSource {
    /// Open a file for random-access reading.
    ///
    /// Verifies that the file exists and is readable, but does NOT validate
    /// that it is actually an MBOX.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ArchiveError::FileNotFound(path.clone())
            } else {
                ArchiveError::io(&path, e)
            }
        })?;
        let file = File::open(&path).map_err(|e| ArchiveError::io(&path, e))?;
        Ok(Self {
            path,
            size: metadata.len(),
            file: Mutex::new(file),
        })
    }

    /// Path to the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_range_bytes(&self, start: u64, end: u64) -> Result<Vec<u8>> {
        check_range(start, end, self.size)?;
        let mut file = self
            .file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        file.seek(SeekFrom::Start(start))
            .map_err(|e| ArchiveError::io(&self.path, e))?;
        let mut buf = vec![0u8; (end - start) as usize];
        file.read_exact(&mut buf)
            .map_err(|e| ArchiveError::io(&self.path, e))?;
        Ok(buf)
    }
}

/// An in-memory [`ByteSource`] for tests and small archives.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    /// Wrap a byte buffer.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

impl ByteSource for MemorySource {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_range_bytes(&self, start: u64, end: u64) -> Result<Vec<u8>> {
        check_range(start, end, self.size())?;
        Ok(self.data[start as usize..end as usize].to_vec())
    }
}

/// Validate a half-open range against the source size.
fn check_range(start: u64, end: u64, size: u64) -> Result<()> {
    if start >= end || end > size {
        return Err(ArchiveError::InvalidRange { start, end, size });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_read() {
        let src = MemorySource::new(b"hello world".to_vec());
        assert_eq!(src.size(), 11);
        assert_eq!(src.read_range_bytes(0, 5).unwrap(), b"hello");
        assert_eq!(src.read_range_text(6, 11).unwrap(), "world");
    }

    #[test]
    fn test_invalid_range_rejected() {
        let src = MemorySource::new(b"abc".to_vec());
        assert!(matches!(
            src.read_range_bytes(0, 4),
            Err(ArchiveError::InvalidRange { .. })
        ));
        assert!(matches!(
            src.read_range_bytes(2, 2),
            Err(ArchiveError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_text_decode_falls_back_to_windows_1252() {
        // 0xE9 is 'é' in WINDOWS-1252 but invalid UTF-8 on its own
        let src = MemorySource::new(vec![b'c', b'a', b'f', 0xE9]);
        assert_eq!(src.read_range_text(0, 4).unwrap(), "café");
    }

    #[test]
    fn test_file_source_open_missing() {
        let err = FileSource::open("/nonexistent/archive.mbox").unwrap_err();
        assert!(matches!(err, ArchiveError::FileNotFound(_)));
    }

    #[test]
    fn test_file_source_read() {
        use std::io::Write;
        let tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.as_file().write_all(b"From a\nbody\n").unwrap();
        let src = FileSource::open(tmp.path()).unwrap();
        assert_eq!(src.size(), 12);
        assert_eq!(src.read_range_bytes(0, 6).unwrap(), b"From a");
    }
}
