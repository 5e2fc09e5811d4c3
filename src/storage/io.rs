//! Page store backends.
//!
//! This module provides the `PageFile` trait the buffer manager reads and
//! writes through, along with the `MemoryFile` and `DiskFile` backends.

mod file;
mod memory;

pub use file::DiskFile;
pub use memory::{IoStats, MemoryFile};

use std::future::Future;

use super::page::{FileId, PAGE_SIZE, PageNo};
use crate::storage::error::StorageError;

/// One file of fixed-size pages.
///
/// The buffer manager is the only component that calls into a page file;
/// everything above it goes through the buffer pool. All buffers passed in
/// or out are exactly `PAGE_SIZE` bytes.
///
/// # Design Decisions
///
/// 1. **Async methods**: return-position `impl Future + Send`, so the
///    manager can run on a multi-threaded tokio runtime. The manager never
///    holds its state lock across one of these calls.
///
/// 2. **Caller-owned buffers**: the store copies bytes in and out of frame
///    memory owned by the buffer pool. It does no caching of its own.
///
/// 3. **Page recycling**: `delete_page` puts a page number back into a free
///    set and `allocate_page` hands out the lowest free number before
///    growing the file.
///
/// 4. **Identity**: `id()` keys the buffer manager's page table, `name()`
///    shows up in error messages.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`. Concurrent calls on different
/// pages are allowed; the buffer manager never issues two concurrent writes
/// for the same page.
pub trait PageFile: Send + Sync + 'static {
    /// Process-unique identity of this file.
    fn id(&self) -> FileId;

    /// Human-readable identity, used in error messages.
    fn name(&self) -> &str;

    /// Reads a page into `buf`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::PageNotFound` if the page is not allocated.
    /// Returns `StorageError::InvalidBufferSize` if `buf.len() != PAGE_SIZE`.
    fn read_page(
        &self,
        page_no: PageNo,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Writes `buf` as the new content of a page.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::PageNotFound` if the page is not allocated.
    /// Returns `StorageError::InvalidBufferSize` if `buf.len() != PAGE_SIZE`.
    fn write_page(
        &self,
        page_no: PageNo,
        buf: &[u8],
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Allocates a zeroed page and returns its number.
    ///
    /// The first allocation on an empty file returns `PageNo(0)`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::StorageFull` if the store cannot grow.
    fn allocate_page(&self) -> impl Future<Output = Result<PageNo, StorageError>> + Send;

    /// Deletes a page. Its content is zeroed and its number may be reused.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::PageNotFound` if the page is not allocated.
    fn delete_page(&self, page_no: PageNo)
    -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Number of page slots in the file, deleted ones included.
    fn page_count(&self) -> impl Future<Output = u64> + Send;

    /// Forces written pages to durable media.
    ///
    /// A no-op for `MemoryFile`, `File::sync_all` for `DiskFile`.
    fn sync_all(&self) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// Rejects buffers that are not exactly one page long.
pub(crate) fn check_buffer_len(len: usize) -> Result<(), StorageError> {
    if len != PAGE_SIZE {
        return Err(StorageError::InvalidBufferSize {
            expected: PAGE_SIZE,
            actual: len,
        });
    }
    Ok(())
}
