//! Page store errors.

use crate::storage::PageNo;

/// Errors raised by a [`PageFile`](crate::storage::PageFile).
///
/// The buffer manager never swallows these; they reach its callers wrapped
/// in `BufferError::Storage`.
#[derive(Debug)]
pub enum StorageError {
    /// The page was never allocated, or has been deleted.
    PageNotFound {
        /// Name of the file that was asked.
        file: String,
        /// Requested page.
        page_no: PageNo,
    },

    /// A read or write buffer was not exactly `PAGE_SIZE` bytes.
    InvalidBufferSize {
        /// Expected buffer size (PAGE_SIZE)
        expected: usize,
        /// Actual buffer size provided
        actual: usize,
    },

    /// I/O error from the underlying file system.
    Io(std::io::Error),

    /// The store refuses to grow. Only `MemoryFile::with_max_pages` does this.
    StorageFull,

    /// The backing file is not a whole number of pages.
    Corrupted(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::PageNotFound { file, page_no } => {
                write!(f, "page {} not found in {}", page_no, file)
            }
            StorageError::InvalidBufferSize { expected, actual } => {
                write!(f, "invalid buffer size: expected {}, got {}", expected, actual)
            }
            StorageError::Io(e) => write!(f, "I/O error: {}", e),
            StorageError::StorageFull => write!(f, "storage is full"),
            StorageError::Corrupted(msg) => write!(f, "data corruption: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}
