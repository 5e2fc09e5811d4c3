//! In-memory page file.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::{PageFile, check_buffer_len};
use crate::storage::error::StorageError;
use crate::storage::page::{FileId, PAGE_SIZE, PageNo};

/// Snapshot of the I/O a `MemoryFile` has served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoStats {
    /// Successful `read_page` calls.
    pub reads: u64,
    /// Successful `write_page` calls.
    pub writes: u64,
    /// Successful `allocate_page` calls.
    pub allocations: u64,
    /// Successful `delete_page` calls.
    pub deletions: u64,
}

#[derive(Default)]
struct Counters {
    reads: AtomicU64,
    writes: AtomicU64,
    allocations: AtomicU64,
    deletions: AtomicU64,
}

struct Pages {
    /// Live pages only; deleted numbers are absent.
    live: HashMap<PageNo, Box<[u8; PAGE_SIZE]>>,
    /// Deleted page numbers waiting for reuse.
    free: BTreeSet<u64>,
    /// One past the highest page number ever handed out.
    high_water: u64,
}

/// Page file kept entirely in memory.
///
/// Nothing survives a drop. Every successful operation is counted, which
/// lets tests assert exactly how much I/O the buffer manager issued.
pub struct MemoryFile {
    id: FileId,
    name: String,
    pages: Mutex<Pages>,
    max_pages: Option<u64>,
    counters: Counters,
}

impl MemoryFile {
    /// Creates an empty in-memory file.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: FileId::next(),
            name: name.into(),
            pages: Mutex::new(Pages {
                live: HashMap::new(),
                free: BTreeSet::new(),
                high_water: 0,
            }),
            max_pages: None,
            counters: Counters::default(),
        }
    }

    /// Creates an in-memory file that refuses to grow past `max_pages`.
    pub fn with_max_pages(name: impl Into<String>, max_pages: u64) -> Self {
        Self {
            max_pages: Some(max_pages),
            ..Self::new(name)
        }
    }

    /// I/O served so far.
    pub fn stats(&self) -> IoStats {
        IoStats {
            reads: self.counters.reads.load(Ordering::Acquire),
            writes: self.counters.writes.load(Ordering::Acquire),
            allocations: self.counters.allocations.load(Ordering::Acquire),
            deletions: self.counters.deletions.load(Ordering::Acquire),
        }
    }

    fn not_found(&self, page_no: PageNo) -> StorageError {
        StorageError::PageNotFound {
            file: self.name.clone(),
            page_no,
        }
    }
}

impl PageFile for MemoryFile {
    fn id(&self) -> FileId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn read_page(&self, page_no: PageNo, buf: &mut [u8]) -> Result<(), StorageError> {
        check_buffer_len(buf.len())?;

        let pages = self.pages.lock();
        let page = pages
            .live
            .get(&page_no)
            .ok_or_else(|| self.not_found(page_no))?;
        buf.copy_from_slice(&page[..]);

        self.counters.reads.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn write_page(&self, page_no: PageNo, buf: &[u8]) -> Result<(), StorageError> {
        check_buffer_len(buf.len())?;

        let mut pages = self.pages.lock();
        let page = pages
            .live
            .get_mut(&page_no)
            .ok_or_else(|| self.not_found(page_no))?;
        page.copy_from_slice(buf);

        self.counters.writes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn allocate_page(&self) -> Result<PageNo, StorageError> {
        let mut pages = self.pages.lock();

        let page_no = match pages.free.pop_first() {
            Some(n) => PageNo::new(n),
            None => {
                if let Some(max) = self.max_pages
                    && pages.high_water >= max
                {
                    return Err(StorageError::StorageFull);
                }
                let n = pages.high_water;
                pages.high_water += 1;
                PageNo::new(n)
            }
        };
        pages.live.insert(page_no, Box::new([0u8; PAGE_SIZE]));

        self.counters.allocations.fetch_add(1, Ordering::AcqRel);
        Ok(page_no)
    }

    async fn delete_page(&self, page_no: PageNo) -> Result<(), StorageError> {
        let mut pages = self.pages.lock();
        if pages.live.remove(&page_no).is_none() {
            return Err(self.not_found(page_no));
        }
        pages.free.insert(page_no.get());

        self.counters.deletions.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn page_count(&self) -> u64 {
        self.pages.lock().high_water
    }

    async fn sync_all(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
