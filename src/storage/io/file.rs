//! File-backed page file.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs::{File as TokioFile, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use super::{PageFile, check_buffer_len};
use crate::storage::error::StorageError;
use crate::storage::page::{FileId, PAGE_SIZE, PageNo};

/// Page file stored as contiguous 8KB blocks in one OS file.
///
/// # File Layout
///
/// ```text
/// +------------------+------------------+------------------+
/// | Page 0 (8KB)     | Page 1 (8KB)     | Page 2 (8KB)     | ...
/// +------------------+------------------+------------------+
/// ^ offset 0         ^ offset 8192      ^ offset 16384
/// ```
///
/// # Concurrency
///
/// A `tokio::sync::Mutex` around the handle serializes seek+read and
/// seek+write pairs.
///
/// # Deleted pages
///
/// Deleted pages are zeroed on disk and remembered in memory. The free set
/// is not persisted: after a reopen every slot reads back as a live page.
pub struct DiskFile {
    id: FileId,
    /// Display form of `path`, used as the file's name.
    name: String,
    path: PathBuf,
    file: Mutex<TokioFile>,
    /// Number of page slots in the file.
    page_count: AtomicU64,
    /// Deleted page numbers waiting for reuse.
    free: parking_lot::Mutex<BTreeSet<u64>>,
}

impl DiskFile {
    /// Opens or creates a page file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Corrupted` if the file length is not a
    /// multiple of `PAGE_SIZE`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await?;

        let file_size = file.metadata().await?.len();
        if file_size % PAGE_SIZE as u64 != 0 {
            return Err(StorageError::Corrupted(format!(
                "{}: length {} is not a multiple of page size {}",
                path.display(),
                file_size,
                PAGE_SIZE
            )));
        }

        Ok(Self {
            id: FileId::next(),
            name: path.display().to_string(),
            path,
            file: Mutex::new(file),
            page_count: AtomicU64::new(file_size / PAGE_SIZE as u64),
            free: parking_lot::Mutex::new(BTreeSet::new()),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fails unless `page_no` is an allocated, non-deleted page.
    fn check_live(&self, page_no: PageNo) -> Result<(), StorageError> {
        let in_range = page_no.get() < self.page_count.load(Ordering::Acquire);
        if !in_range || self.free.lock().contains(&page_no.get()) {
            return Err(StorageError::PageNotFound {
                file: self.name.clone(),
                page_no,
            });
        }
        Ok(())
    }

    async fn write_at(
        &self,
        file: &mut TokioFile,
        page_no: PageNo,
        buf: &[u8],
    ) -> Result<(), StorageError> {
        file.seek(std::io::SeekFrom::Start(page_no.byte_offset()))
            .await?;
        file.write_all(buf).await?;
        Ok(())
    }
}

impl PageFile for DiskFile {
    fn id(&self) -> FileId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn read_page(&self, page_no: PageNo, buf: &mut [u8]) -> Result<(), StorageError> {
        check_buffer_len(buf.len())?;
        self.check_live(page_no)?;

        let mut file = self.file.lock().await;
        file.seek(std::io::SeekFrom::Start(page_no.byte_offset()))
            .await?;
        file.read_exact(buf).await?;
        Ok(())
    }

    async fn write_page(&self, page_no: PageNo, buf: &[u8]) -> Result<(), StorageError> {
        check_buffer_len(buf.len())?;
        self.check_live(page_no)?;

        let mut file = self.file.lock().await;
        self.write_at(&mut file, page_no, buf).await
    }

    async fn allocate_page(&self) -> Result<PageNo, StorageError> {
        let mut file = self.file.lock().await;

        // Deleted slots were zeroed by delete_page
        let reused = self.free.lock().pop_first();
        if let Some(n) = reused {
            return Ok(PageNo::new(n));
        }

        let page_no = PageNo::new(self.page_count.load(Ordering::Acquire));
        self.write_at(&mut file, page_no, &[0u8; PAGE_SIZE]).await?;
        self.page_count.store(page_no.get() + 1, Ordering::Release);
        Ok(page_no)
    }

    async fn delete_page(&self, page_no: PageNo) -> Result<(), StorageError> {
        self.check_live(page_no)?;

        let mut file = self.file.lock().await;
        self.write_at(&mut file, page_no, &[0u8; PAGE_SIZE]).await?;
        self.free.lock().insert(page_no.get());
        Ok(())
    }

    async fn page_count(&self) -> u64 {
        self.page_count.load(Ordering::Acquire)
    }

    async fn sync_all(&self) -> Result<(), StorageError> {
        let file = self.file.lock().await;
        file.sync_all().await?;
        Ok(())
    }
}
