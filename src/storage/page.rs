//! Page and file identifiers, page size constant.

pub mod data;

pub use data::PageData;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// 8KB page size. Every page the store hands out is exactly this long.
pub const PAGE_SIZE: usize = 8192;

/// Page number within one page file.
///
/// Page numbers are dense indices into the file: page `n` lives at byte
/// offset `n * PAGE_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageNo(pub u64);

impl PageNo {
    /// Creates a `PageNo` from a raw number.
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    /// Returns the raw page number.
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Byte offset of this page inside its file.
    pub const fn byte_offset(&self) -> u64 {
        self.0 * PAGE_SIZE as u64
    }
}

impl fmt::Display for PageNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-unique identity of an open page file.
///
/// The buffer manager keys its page table on `(FileId, PageNo)`, so two
/// page files must never share an id while both are open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(u64);

static NEXT_FILE_ID: AtomicU64 = AtomicU64::new(1);

impl FileId {
    /// Issues a fresh id.
    pub fn next() -> Self {
        Self(NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id.
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
