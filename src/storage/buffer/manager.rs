//! Buffer manager implementation.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::futures::Notified;

use crate::storage::{FileId, PageFile, PageNo};

use super::clock::{ClockHand, Victim, WriteBack};
use super::config::BufferPoolConfig;
use super::diagnostics::PoolDiagnostics;
use super::error::BufferError;
use super::frame::{FrameDescriptor, FrameId, FrameIo, FrameSnapshot};
use super::guard::PageHandle;
use super::page_table::{Lookup, PageKey, PageTable};
use super::pool::FramePool;

/// The buffer manager caches pages of any number of page files in a fixed
/// set of frames and replaces them with the clock algorithm.
///
/// # Architecture
///
/// ```text
/// +------------------+     +------------------+
/// | fetch_page()     |---->| Page Table       |
/// | unpin_page()     |     | (PageKey->Frame) |
/// +------------------+     +------------------+
///          |                       |
///          v                       v
/// +------------------+     +------------------+
/// | Clock Hand       |---->| Descriptor Table |
/// | (second chance)  |     | [Frame; pool_sz] |
/// +------------------+     +------------------+
///                                   |
///                                   v
///                          +------------------+
///                          | Frame Pool       |
///                          | (page buffers)   |
///                          +------------------+
///                                   |
///                                   v
///                          +------------------+
///                          | PageFile trait   |
///                          +------------------+
/// ```
///
/// # Concurrency Model
///
/// The page table, descriptor table and clock hand sit behind one
/// `parking_lot::Mutex`, held only for bookkeeping and never across page
/// file I/O. Page content sits behind one `tokio::sync::RwLock` per frame.
///
/// On a miss the frame is claimed and the page table entry published in the
/// same critical section, with the frame marked `Loading`. The read then
/// happens under the frame's write latch. Other tasks fetching the same page
/// hit the entry, pin it, and wait until the load settles.
///
/// A task that finds a frame busy with someone else's I/O waits on the
/// frame's settle notification, then looks again.
///
/// # Cancellation
///
/// Every load and write-back is settled when its future is dropped. An
/// unfinished load unmaps and empties its frame; an unfinished write-back
/// leaves the page dirty and idle.
///
/// # Thread Safety
///
/// The manager is safe to share across tasks via `Arc<BufferManager<F>>`.
pub struct BufferManager<F: PageFile> {
    /// Page buffers, index-aligned with `PoolState::frames`.
    pub(super) pool: FramePool,

    state: Mutex<PoolState<F>>,

    /// Configuration (immutable after construction).
    config: BufferPoolConfig,
}

/// Everything the state lock protects.
struct PoolState<F> {
    frames: Vec<FrameDescriptor<F>>,
    page_table: PageTable,
    clock: ClockHand,
}

/// Next move for a fetch, decided under the state lock.
enum Step<'a, F> {
    /// Hit: the page is resident and now pinned once more.
    Pinned { frame_id: FrameId, generation: u64 },
    /// Miss: the frame is reserved and mapped; its contents must be read in.
    Load { frame_id: FrameId, generation: u64 },
    /// The victim is dirty and must be written back before reuse.
    WriteBack(WriteBack<F>),
    /// Every unpinned frame is busy; sweep again once this one settles.
    Wait(Notified<'a>),
}

/// Next move for a flush of one frame.
enum Flush<'a, F> {
    Done,
    /// Someone else's I/O on the frame is in flight.
    Wait(Notified<'a>),
    WriteBack(WriteBack<F>),
}

fn empty_frame(frame_id: FrameId, key: PageKey) -> BufferError {
    BufferError::CorruptFrameState {
        frame_id,
        detail: format!(
            "page table maps page {} of file {} to an empty frame",
            key.page_no, key.file
        ),
    }
}

impl<F: PageFile> PoolState<F> {
    fn new(pool_size: usize) -> Self {
        Self {
            frames: (0..pool_size)
                .map(|i| FrameDescriptor::new(FrameId::new(i as u32)))
                .collect(),
            page_table: PageTable::with_capacity(pool_size),
            clock: ClockHand::new(pool_size),
        }
    }

    /// Pins `page_no` if it is resident, otherwise finds a frame for it.
    ///
    /// `written` names a frame this fetch just wrote back; it is taken
    /// directly if nothing has touched it since.
    fn pin_or_claim<'a>(
        &mut self,
        pool: &'a FramePool,
        file: &Arc<F>,
        page_no: PageNo,
        written: Option<(FrameId, u64)>,
    ) -> Result<Step<'a, F>, BufferError> {
        let key = PageKey::new(file.id(), page_no);

        if let Lookup::Found(frame_id) = self.page_table.lookup(key) {
            let desc = &mut self.frames[frame_id.index()];
            let generation = desc.generation();
            let resident = desc
                .resident_mut()
                .ok_or_else(|| empty_frame(frame_id, key))?;
            let pins = resident.pin();
            tracing::trace!(
                file = file.name(),
                page = %page_no,
                frame = %frame_id,
                pins,
                "page hit"
            );
            return Ok(Step::Pinned {
                frame_id,
                generation,
            });
        }

        let frame_id = match written.and_then(|(id, generation)| self.reclaim(id, generation)) {
            Some(frame_id) => frame_id,
            None => match self.clock.sweep(&mut self.frames, &mut self.page_table)? {
                Victim::Vacant(frame_id) => frame_id,
                Victim::Dirty(claim) => return Ok(Step::WriteBack(claim)),
                Victim::Busy(frame_id) => {
                    tracing::trace!(frame = %frame_id, "waiting for busy frame");
                    return Ok(Step::Wait(pool.settled(frame_id)));
                }
            },
        };

        let generation = self.frames[frame_id.index()].install(Arc::clone(file), page_no);
        self.page_table.insert(key, frame_id);
        tracing::debug!(file = file.name(), page = %page_no, frame = %frame_id, "page miss");
        Ok(Step::Load {
            frame_id,
            generation,
        })
    }

    /// Empties a frame after its write-back, unless it was pinned,
    /// referenced or dirtied again in the meantime.
    fn reclaim(&mut self, frame_id: FrameId, generation: u64) -> Option<FrameId> {
        let desc = &mut self.frames[frame_id.index()];
        let resident = desc.resident_at(generation)?;
        if !resident.is_evictable() || resident.dirty {
            return None;
        }
        let key = resident.key();
        self.page_table.remove(key);
        desc.clear();
        tracing::debug!(frame = %frame_id, page = %key.page_no, "evicted written-back page");
        Some(frame_id)
    }

    /// Decides what `flush_file` does with frame `index`.
    fn flush_step<'a>(
        &mut self,
        pool: &'a FramePool,
        index: usize,
        file: FileId,
    ) -> Result<Flush<'a, F>, BufferError> {
        let desc = &mut self.frames[index];
        let frame_id = desc.id();
        let generation = desc.generation();
        let Some(resident) = desc.resident_mut() else {
            return Ok(Flush::Done);
        };
        if resident.file.id() != file {
            return Ok(Flush::Done);
        }

        let key = resident.key();
        if self.page_table.lookup(key) != Lookup::Found(frame_id) {
            return Err(BufferError::CorruptFrameState {
                frame_id,
                detail: format!(
                    "frame holds page {} of {} but the page table does not map it here",
                    key.page_no,
                    resident.file.name()
                ),
            });
        }
        if resident.pin_count > 0 {
            return Err(BufferError::PagePinned {
                file: resident.file.name().to_string(),
                page_no: resident.page_no,
                frame_id,
            });
        }

        match (resident.io, resident.dirty) {
            (FrameIo::Idle, true) => {
                resident.dirty = false;
                resident.io = FrameIo::WritingBack;
                Ok(Flush::WriteBack(WriteBack {
                    frame_id,
                    generation,
                    file: Arc::clone(&resident.file),
                    page_no: resident.page_no,
                }))
            }
            (FrameIo::Idle, false) => {
                self.page_table.remove(key);
                desc.clear();
                Ok(Flush::Done)
            }
            _ => Ok(Flush::Wait(pool.settled(frame_id))),
        }
    }

    /// Decides what `flush_all` does with frame `index`. Never evicts.
    fn flush_all_step<'a>(&mut self, pool: &'a FramePool, index: usize) -> Flush<'a, F> {
        let desc = &mut self.frames[index];
        let frame_id = desc.id();
        let generation = desc.generation();
        let Some(resident) = desc.resident_mut() else {
            return Flush::Done;
        };
        match (resident.io, resident.dirty) {
            (FrameIo::WritingBack, _) => Flush::Wait(pool.settled(frame_id)),
            (FrameIo::Idle, true) => {
                resident.dirty = false;
                resident.io = FrameIo::WritingBack;
                Flush::WriteBack(WriteBack {
                    frame_id,
                    generation,
                    file: Arc::clone(&resident.file),
                    page_no: resident.page_no,
                })
            }
            _ => Flush::Done,
        }
    }
}

/// A load or write-back in flight on one frame.
///
/// Settling puts the frame back to rest and wakes its waiters. A guard
/// dropped unsettled settles as a failure: a load unmaps and empties the
/// frame, a write-back leaves the page dirty.
struct InFlight<'a, F: PageFile> {
    bpm: &'a BufferManager<F>,
    frame_id: FrameId,
    generation: u64,
    io: FrameIo,
    settled: bool,
}

impl<'a, F: PageFile> InFlight<'a, F> {
    fn new(bpm: &'a BufferManager<F>, frame_id: FrameId, generation: u64, io: FrameIo) -> Self {
        Self {
            bpm,
            frame_id,
            generation,
            io,
            settled: false,
        }
    }

    fn settle(&mut self, ok: bool) {
        if self.settled {
            return;
        }
        self.settled = true;

        let mut guard = self.bpm.state.lock();
        let state = &mut *guard;
        let desc = &mut state.frames[self.frame_id.index()];
        if let Some(resident) = desc.resident_at_mut(self.generation)
            && resident.io == self.io
        {
            match (self.io, ok) {
                (FrameIo::Loading, false) => {
                    let key = resident.key();
                    state.page_table.remove(key);
                    desc.clear();
                }
                (FrameIo::WritingBack, false) => {
                    resident.io = FrameIo::Idle;
                    resident.dirty = true;
                }
                _ => resident.io = FrameIo::Idle,
            }
        }
        self.bpm.pool.notify_settled(self.frame_id);
    }
}

impl<F: PageFile> Drop for InFlight<'_, F> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!(frame = %self.frame_id, io = ?self.io, "abandoned frame I/O");
            self.settle(false);
        }
    }
}

impl<F: PageFile> BufferManager<F> {
    /// Creates a buffer manager with `config.pool_size` empty frames.
    ///
    /// # Panics
    ///
    /// Panics if `pool_size` is zero or does not fit a `u32` frame index.
    pub fn new(config: BufferPoolConfig) -> Self {
        assert!(config.pool_size > 0, "pool_size must be at least 1");
        assert!(
            u32::try_from(config.pool_size).is_ok(),
            "pool_size {} exceeds the frame index range",
            config.pool_size
        );
        Self {
            pool: FramePool::new(config.pool_size),
            state: Mutex::new(PoolState::new(config.pool_size)),
            config,
        }
    }

    pub fn config(&self) -> &BufferPoolConfig {
        &self.config
    }

    /// Number of frames.
    pub fn pool_size(&self) -> usize {
        self.config.pool_size
    }

    /// Number of frames currently holding a page.
    pub fn resident_count(&self) -> usize {
        self.state.lock().page_table.len()
    }

    /// Fetches a page, reading it from `file` if it is not resident.
    ///
    /// The returned handle holds one pin, released when the handle is
    /// dropped or [`PageHandle::release`]d. If every unpinned frame is busy
    /// writing back, the fetch waits for one of them.
    ///
    /// # Errors
    ///
    /// - `CapacityExceeded` if every frame is pinned.
    /// - `Storage` if reading the page or writing back a dirty victim fails.
    ///   The requested page is then not resident.
    pub async fn fetch_page(
        &self,
        file: &Arc<F>,
        page_no: PageNo,
    ) -> Result<PageHandle<'_, F>, BufferError> {
        let mut written = None;
        loop {
            let step = self
                .state
                .lock()
                .pin_or_claim(&self.pool, file, page_no, written.take())?;
            match step {
                Step::Pinned {
                    frame_id,
                    generation,
                } => {
                    return Ok(PageHandle::new(
                        self,
                        Arc::clone(file),
                        page_no,
                        frame_id,
                        generation,
                    ));
                }
                Step::Load {
                    frame_id,
                    generation,
                } => {
                    self.load(file, page_no, frame_id, generation).await?;
                    return Ok(PageHandle::new(
                        self,
                        Arc::clone(file),
                        page_no,
                        frame_id,
                        generation,
                    ));
                }
                Step::WriteBack(claim) => {
                    let target = (claim.frame_id, claim.generation);
                    self.write_back(claim).await?;
                    written = Some(target);
                }
                Step::Wait(settled) => settled.await,
            }
        }
    }

    /// Allocates a new page in `file` and fetches it pinned.
    ///
    /// # Errors
    ///
    /// Same as [`fetch_page`](Self::fetch_page), plus the store's allocation
    /// errors. If the fetch fails the page stays allocated in the store.
    pub async fn allocate_page(
        &self,
        file: &Arc<F>,
    ) -> Result<(PageNo, PageHandle<'_, F>), BufferError> {
        let page_no = file.allocate_page().await?;
        tracing::debug!(file = file.name(), page = %page_no, "allocated page");
        let handle = self.fetch_page(file, page_no).await?;
        Ok((page_no, handle))
    }

    /// Drops one pin on a page, marking it dirty if `dirty` is set.
    ///
    /// Pairs with [`PageHandle::detach`]. Unpinning a page that is not
    /// resident is a no-op.
    ///
    /// # Errors
    ///
    /// `PageNotPinned` if the page is resident with pin count zero.
    pub fn unpin_page(&self, file: &F, page_no: PageNo, dirty: bool) -> Result<(), BufferError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let key = PageKey::new(file.id(), page_no);
        let frame_id = match state.page_table.lookup(key) {
            Lookup::Found(frame_id) => frame_id,
            Lookup::NotFound => return Ok(()),
        };
        let resident = state.frames[frame_id.index()]
            .resident_mut()
            .ok_or_else(|| empty_frame(frame_id, key))?;

        match resident.unpin(dirty) {
            Some(pins) => {
                tracing::trace!(
                    file = file.name(),
                    page = %page_no,
                    frame = %frame_id,
                    pins,
                    dirty,
                    "unpinned page"
                );
                Ok(())
            }
            None => Err(BufferError::PageNotPinned {
                file: file.name().to_string(),
                page_no,
                frame_id,
            }),
        }
    }

    /// Unpins on behalf of a handle issued under `generation`.
    pub(super) fn unpin_frame(
        &self,
        frame_id: FrameId,
        generation: u64,
        dirty: bool,
    ) -> Result<(), BufferError> {
        let mut state = self.state.lock();
        let resident = state.frames[frame_id.index()]
            .resident_at_mut(generation)
            .ok_or(BufferError::StaleHandle { frame_id })?;

        match resident.unpin(dirty) {
            Some(_) => Ok(()),
            None => Err(BufferError::PageNotPinned {
                file: resident.file.name().to_string(),
                page_no: resident.page_no,
                frame_id,
            }),
        }
    }

    /// Checks that a handle issued under `generation` still owns its frame.
    ///
    /// Returns the notification to await first while the page is still
    /// being loaded.
    ///
    /// # Errors
    ///
    /// `StaleHandle` if the frame no longer holds the handle's page.
    pub(super) fn pending_load(
        &self,
        frame_id: FrameId,
        generation: u64,
    ) -> Result<Option<Notified<'_>>, BufferError> {
        let state = self.state.lock();
        match state.frames[frame_id.index()].resident_at(generation) {
            Some(resident) if resident.pin_count > 0 => Ok((resident.io == FrameIo::Loading)
                .then(|| self.pool.settled(frame_id))),
            _ => Err(BufferError::StaleHandle { frame_id }),
        }
    }

    /// Removes a page from the pool (without writing it) and deletes it
    /// from `file`.
    ///
    /// Waits for a write-back of the page in flight to settle first.
    ///
    /// # Errors
    ///
    /// - `PagePinned` if the page is resident and pinned; nothing is deleted.
    /// - `Storage` if the store refuses the delete.
    pub async fn dispose_page(&self, file: &F, page_no: PageNo) -> Result<(), BufferError> {
        let key = PageKey::new(file.id(), page_no);
        loop {
            let pending = {
                let mut guard = self.state.lock();
                let state = &mut *guard;
                match state.page_table.lookup(key) {
                    Lookup::NotFound => None,
                    Lookup::Found(frame_id) => {
                        let desc = &mut state.frames[frame_id.index()];
                        let resident = desc
                            .resident()
                            .ok_or_else(|| empty_frame(frame_id, key))?;
                        if resident.pin_count > 0 {
                            return Err(BufferError::PagePinned {
                                file: file.name().to_string(),
                                page_no,
                                frame_id,
                            });
                        }
                        if resident.io == FrameIo::Idle {
                            state.page_table.remove(key);
                            desc.clear();
                            None
                        } else {
                            Some(self.pool.settled(frame_id))
                        }
                    }
                }
            };
            match pending {
                Some(settled) => settled.await,
                None => break,
            }
        }

        file.delete_page(page_no).await?;
        tracing::debug!(file = file.name(), page = %page_no, "disposed page");
        Ok(())
    }

    /// Writes back every dirty page of `file` and removes all of the file's
    /// pages from the pool.
    ///
    /// Frames are processed in frame order. On error, frames already
    /// handled stay flushed and removed.
    ///
    /// # Errors
    ///
    /// - `PagePinned` at the first pinned page of the file.
    /// - `CorruptFrameState` if a frame claims a page of the file that the
    ///   page table does not map to it.
    /// - `Storage` if a write-back or the final sync fails.
    pub async fn flush_file(&self, file: &F) -> Result<(), BufferError> {
        let mut wrote = 0usize;
        for index in 0..self.pool.len() {
            loop {
                let step = self.state.lock().flush_step(&self.pool, index, file.id())?;
                match step {
                    Flush::Done => break,
                    Flush::Wait(settled) => settled.await,
                    Flush::WriteBack(claim) => {
                        self.write_back(claim).await?;
                        wrote += 1;
                    }
                }
            }
        }

        if wrote > 0 {
            file.sync_all().await?;
        }
        tracing::debug!(file = file.name(), written = wrote, "flushed file");
        Ok(())
    }

    /// Writes back every dirty page of every file, pinned ones included,
    /// without evicting anything, then syncs each file written.
    ///
    /// # Errors
    ///
    /// `Storage` if a write-back or sync fails. The failed page stays dirty.
    pub async fn flush_all(&self) -> Result<(), BufferError> {
        let mut files: Vec<Arc<F>> = Vec::new();
        for index in 0..self.pool.len() {
            loop {
                let step = self.state.lock().flush_all_step(&self.pool, index);
                match step {
                    Flush::Done => break,
                    Flush::Wait(settled) => settled.await,
                    Flush::WriteBack(claim) => {
                        let file = Arc::clone(&claim.file);
                        self.write_back(claim).await?;
                        if !files.iter().any(|f| f.id() == file.id()) {
                            files.push(file);
                        }
                        break;
                    }
                }
            }
        }

        for file in &files {
            file.sync_all().await?;
        }
        tracing::debug!(files = files.len(), "flushed all dirty pages");
        Ok(())
    }

    /// Flushes everything and releases the pool.
    ///
    /// # Errors
    ///
    /// Same as [`flush_all`](Self::flush_all). The manager is dropped either
    /// way.
    pub async fn close(self) -> Result<(), BufferError> {
        self.flush_all().await
    }

    /// Checks that the page table and the descriptor table agree.
    ///
    /// Every occupied frame must be the page table's entry for its page, and
    /// every entry must point at a frame holding that page.
    ///
    /// # Errors
    ///
    /// `CorruptFrameState` naming the first disagreement found.
    pub fn verify(&self) -> Result<(), BufferError> {
        let state = self.state.lock();

        for desc in &state.frames {
            let Some(resident) = desc.resident() else {
                continue;
            };
            let key = resident.key();
            match state.page_table.lookup(key) {
                Lookup::Found(frame_id) if frame_id == desc.id() => {}
                found => {
                    return Err(BufferError::CorruptFrameState {
                        frame_id: desc.id(),
                        detail: format!(
                            "frame holds page {} of {} but the page table has {:?}",
                            key.page_no,
                            resident.file.name(),
                            found
                        ),
                    });
                }
            }
        }

        for (key, frame_id) in state.page_table.iter() {
            let held = state
                .frames
                .get(frame_id.index())
                .and_then(|desc| desc.resident())
                .map(|resident| resident.key());
            if held != Some(key) {
                return Err(BufferError::CorruptFrameState {
                    frame_id,
                    detail: format!(
                        "page table maps page {} of file {} here but the frame holds {:?}",
                        key.page_no, key.file, held
                    ),
                });
            }
        }

        Ok(())
    }

    /// Snapshot of the frame holding a page, if it is resident.
    pub fn resident(&self, file: FileId, page_no: PageNo) -> Option<FrameSnapshot> {
        let state = self.state.lock();
        match state.page_table.lookup(PageKey::new(file, page_no)) {
            Lookup::Found(frame_id) => Some(state.frames[frame_id.index()].snapshot()),
            Lookup::NotFound => None,
        }
    }

    /// Snapshot of every frame, in frame order.
    pub fn diagnostics(&self) -> PoolDiagnostics {
        let state = self.state.lock();
        PoolDiagnostics::new(
            state.frames.iter().map(|desc| desc.snapshot()).collect(),
            FrameId::new(state.clock.position() as u32),
        )
    }

    /// Reads a freshly claimed frame's page from the store.
    ///
    /// A failed read leaves the buffer zeroed.
    fn load(
        &self,
        file: &F,
        page_no: PageNo,
        frame_id: FrameId,
        generation: u64,
    ) -> impl Future<Output = Result<(), BufferError>> + Send {
        let mut io = InFlight::new(self, frame_id, generation, FrameIo::Loading);
        async move {
            let mut data = self.pool.write(frame_id).await;
            let result = file.read_page(page_no, data.as_mut_slice()).await;
            if result.is_err() {
                data.zero();
            }
            io.settle(result.is_ok());
            drop(data);

            result.map_err(|e| {
                tracing::debug!(file = file.name(), page = %page_no, error = %e, "page read failed");
                BufferError::from(e)
            })
        }
    }

    /// Writes a claimed dirty frame back to its file.
    ///
    /// The frame returns to `Idle` either way; on failure it is dirty again.
    fn write_back(
        &self,
        claim: WriteBack<F>,
    ) -> impl Future<Output = Result<(), BufferError>> + Send {
        let mut io = InFlight::new(self, claim.frame_id, claim.generation, FrameIo::WritingBack);
        async move {
            let data = self.pool.read(claim.frame_id).await;
            let result = claim.file.write_page(claim.page_no, data.as_slice()).await;
            io.settle(result.is_ok());
            drop(data);

            result?;
            tracing::debug!(
                file = claim.file.name(),
                page = %claim.page_no,
                frame = %claim.frame_id,
                "wrote back dirty page"
            );
            Ok(())
        }
    }
}

impl<F: PageFile> Drop for BufferManager<F> {
    fn drop(&mut self) {
        let dirty = self
            .state
            .get_mut()
            .frames
            .iter()
            .filter(|desc| desc.resident().is_some_and(|r| r.dirty))
            .count();
        if dirty > 0 {
            tracing::warn!(dirty, "buffer manager dropped with unflushed dirty pages");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryFile, PAGE_SIZE, StorageError};

    fn bpm(pool_size: usize) -> BufferManager<MemoryFile> {
        BufferManager::new(BufferPoolConfig::default().with_pool_size(pool_size))
    }

    /// A file with `pages` pages, page `i` filled with byte `i + 1`.
    async fn file_with_pages(name: &str, pages: u64) -> Arc<MemoryFile> {
        let file = Arc::new(MemoryFile::new(name));
        for i in 0..pages {
            let page_no = file.allocate_page().await.unwrap();
            file.write_page(page_no, &[i as u8 + 1; PAGE_SIZE]).await.unwrap();
        }
        file
    }

    fn pin_count(bpm: &BufferManager<MemoryFile>, file: &MemoryFile, page: u64) -> Option<u32> {
        bpm.resident(file.id(), PageNo::new(page))
            .and_then(|s| s.occupant)
            .map(|o| o.pin_count)
    }

    #[tokio::test]
    async fn test_new_bpm() {
        let bpm = bpm(10);
        assert_eq!(bpm.pool_size(), 10);
        assert_eq!(bpm.config().pool_size, 10);
        assert_eq!(bpm.resident_count(), 0);
        assert_eq!(bpm.diagnostics().valid_frames(), 0);
        // The hand rests on the last frame, so the first sweep starts at 0
        assert_eq!(bpm.diagnostics().clock_hand(), FrameId::new(9));
    }

    #[test]
    #[should_panic(expected = "pool_size must be at least 1")]
    fn test_zero_pool_size_panics() {
        let _ = bpm(0);
    }

    #[tokio::test]
    async fn test_fetch_page_loads_from_file() {
        let file = file_with_pages("t", 2).await;
        let bpm = bpm(4);

        let handle = bpm.fetch_page(&file, PageNo::new(1)).await.unwrap();
        assert_eq!(handle.page_no(), PageNo::new(1));
        assert_eq!(handle.read().await.unwrap().as_slice()[0], 2);
        assert_eq!(file.stats().reads, 1);
        assert_eq!(pin_count(&bpm, &file, 1), Some(1));
    }

    #[tokio::test]
    async fn test_hit_pins_again_without_io() {
        let file = file_with_pages("t", 1).await;
        let bpm = bpm(4);

        let first = bpm.fetch_page(&file, PageNo::new(0)).await.unwrap();
        let second = bpm.fetch_page(&file, PageNo::new(0)).await.unwrap();
        assert_eq!(first.frame_id(), second.frame_id());
        assert_eq!(pin_count(&bpm, &file, 0), Some(2));
        assert_eq!(file.stats().reads, 1);

        drop(first);
        assert_eq!(pin_count(&bpm, &file, 0), Some(1));
        drop(second);
        assert_eq!(pin_count(&bpm, &file, 0), Some(0));
    }

    #[tokio::test]
    async fn test_fetch_missing_page_leaves_no_trace() {
        let file = file_with_pages("t", 1).await;
        let bpm = bpm(2);

        let result = bpm.fetch_page(&file, PageNo::new(9)).await;
        assert!(matches!(
            result,
            Err(BufferError::Storage(StorageError::PageNotFound { .. }))
        ));
        assert_eq!(bpm.resident_count(), 0);
        assert_eq!(bpm.diagnostics().valid_frames(), 0);
        bpm.verify().unwrap();
    }

    #[tokio::test]
    async fn test_failed_read_zeroes_the_frame() {
        let file = file_with_pages("t", 1).await;
        let bpm = bpm(1);

        drop(bpm.fetch_page(&file, PageNo::new(0)).await.unwrap());
        assert!(bpm.fetch_page(&file, PageNo::new(9)).await.is_err());

        // Page 0's bytes do not linger in the recycled frame
        let data = bpm.pool.read(FrameId::new(0)).await;
        assert!(data.as_slice().iter().all(|&b| b == 0));
        assert_eq!(bpm.resident_count(), 0);
    }

    #[tokio::test]
    async fn test_capacity_exceeded_when_all_pinned() {
        let file = file_with_pages("t", 3).await;
        let bpm = bpm(2);

        let _a = bpm.fetch_page(&file, PageNo::new(0)).await.unwrap();
        let _b = bpm.fetch_page(&file, PageNo::new(1)).await.unwrap();
        let result = bpm.fetch_page(&file, PageNo::new(2)).await;
        assert!(matches!(
            result,
            Err(BufferError::CapacityExceeded { pool_size: 2 })
        ));
        assert_eq!(file.stats().reads, 2);
        assert!(bpm.resident(file.id(), PageNo::new(0)).is_some());
        assert!(bpm.resident(file.id(), PageNo::new(1)).is_some());
    }

    #[tokio::test]
    async fn test_dirty_victim_written_back_once() {
        let file = file_with_pages("t", 2).await;
        let bpm = bpm(1);

        let mut handle = bpm.fetch_page(&file, PageNo::new(0)).await.unwrap();
        handle.write().await.unwrap().as_mut_slice()[0] = 0xAA;
        handle.release().unwrap();

        let handle = bpm.fetch_page(&file, PageNo::new(1)).await.unwrap();
        assert_eq!(handle.read().await.unwrap().as_slice()[0], 2);
        drop(handle);
        assert_eq!(file.stats().writes, 3); // two fixture writes + one write-back

        let mut buf = vec![0u8; PAGE_SIZE];
        file.read_page(PageNo::new(0), &mut buf).await.unwrap();
        assert_eq!(buf[0], 0xAA);
    }

    #[tokio::test]
    async fn test_clean_victim_not_written() {
        let file = file_with_pages("t", 2).await;
        let bpm = bpm(1);

        drop(bpm.fetch_page(&file, PageNo::new(0)).await.unwrap());
        drop(bpm.fetch_page(&file, PageNo::new(1)).await.unwrap());
        assert_eq!(file.stats().writes, 2);
        assert!(bpm.resident(file.id(), PageNo::new(0)).is_none());
    }

    #[tokio::test]
    async fn test_unpin_page_errors() {
        let file = file_with_pages("t", 1).await;
        let bpm = bpm(2);

        // Not resident: no-op
        bpm.unpin_page(&file, PageNo::new(0), true).unwrap();

        let page_no = bpm.fetch_page(&file, PageNo::new(0)).await.unwrap().detach();
        bpm.unpin_page(&file, page_no, false).unwrap();
        let result = bpm.unpin_page(&file, page_no, false);
        assert!(matches!(result, Err(BufferError::PageNotPinned { .. })));
        assert_eq!(pin_count(&bpm, &file, 0), Some(0));
    }

    #[tokio::test]
    async fn test_dirty_flag_is_sticky() {
        let file = file_with_pages("t", 1).await;
        let bpm = bpm(2);

        let a = bpm.fetch_page(&file, PageNo::new(0)).await.unwrap().detach();
        let b = bpm.fetch_page(&file, PageNo::new(0)).await.unwrap().detach();
        bpm.unpin_page(&file, a, true).unwrap();
        bpm.unpin_page(&file, b, false).unwrap();

        let snapshot = bpm.resident(file.id(), PageNo::new(0)).unwrap();
        assert!(snapshot.occupant.unwrap().dirty);
    }

    #[tokio::test]
    async fn test_allocate_page_is_zeroed_and_pinned() {
        let file = Arc::new(MemoryFile::new("t"));
        let bpm = bpm(2);

        let (page_no, handle) = bpm.allocate_page(&file).await.unwrap();
        assert_eq!(page_no, PageNo::new(0));
        assert_eq!(handle.page_no(), page_no);
        assert!(handle.read().await.unwrap().as_slice().iter().all(|&b| b == 0));
        assert_eq!(pin_count(&bpm, &file, 0), Some(1));
    }

    #[tokio::test]
    async fn test_dispose_page() {
        let file = file_with_pages("t", 2).await;
        let bpm = bpm(2);

        let mut handle = bpm.fetch_page(&file, PageNo::new(0)).await.unwrap();
        handle.mark_dirty();
        let result = bpm.dispose_page(&file, PageNo::new(0)).await;
        assert!(matches!(result, Err(BufferError::PagePinned { .. })));
        assert_eq!(file.stats().deletions, 0);
        handle.release().unwrap();

        bpm.dispose_page(&file, PageNo::new(0)).await.unwrap();
        assert!(bpm.resident(file.id(), PageNo::new(0)).is_none());
        assert_eq!(file.stats().deletions, 1);
        // Discarded, not written back
        assert_eq!(file.stats().writes, 2);

        // Not resident: goes straight to the store
        bpm.dispose_page(&file, PageNo::new(1)).await.unwrap();
        assert_eq!(file.stats().deletions, 2);
    }

    #[tokio::test]
    async fn test_flush_file_writes_and_empties() {
        let a = file_with_pages("a", 2).await;
        let b = file_with_pages("b", 1).await;
        let bpm = bpm(4);

        let mut handle = bpm.fetch_page(&a, PageNo::new(0)).await.unwrap();
        handle.write().await.unwrap().as_mut_slice()[0] = 0x11;
        drop(handle);
        drop(bpm.fetch_page(&a, PageNo::new(1)).await.unwrap());
        drop(bpm.fetch_page(&b, PageNo::new(0)).await.unwrap());

        bpm.flush_file(&a).await.unwrap();
        assert_eq!(a.stats().writes, 3);
        assert!(bpm.resident(a.id(), PageNo::new(0)).is_none());
        assert!(bpm.resident(a.id(), PageNo::new(1)).is_none());
        assert!(bpm.resident(b.id(), PageNo::new(0)).is_some());
        bpm.verify().unwrap();
    }

    #[tokio::test]
    async fn test_flush_file_stops_at_pinned_page() {
        let file = file_with_pages("t", 1).await;
        let bpm = bpm(2);

        let _handle = bpm.fetch_page(&file, PageNo::new(0)).await.unwrap();
        let result = bpm.flush_file(&file).await;
        assert!(matches!(result, Err(BufferError::PagePinned { .. })));
        assert!(bpm.resident(file.id(), PageNo::new(0)).is_some());
    }

    #[tokio::test]
    async fn test_flush_all_keeps_pages_resident() {
        let file = file_with_pages("t", 2).await;
        let bpm = bpm(4);

        let mut pinned = bpm.fetch_page(&file, PageNo::new(0)).await.unwrap();
        pinned.write().await.unwrap().as_mut_slice()[0] = 0x22;
        let mut other = bpm.fetch_page(&file, PageNo::new(1)).await.unwrap();
        other.write().await.unwrap().as_mut_slice()[0] = 0x33;
        drop(other);
        // A handle's dirty flag reaches the frame on unpin
        pinned.release().unwrap();
        let _pinned = bpm.fetch_page(&file, PageNo::new(0)).await.unwrap();

        bpm.flush_all().await.unwrap();
        assert_eq!(file.stats().writes, 4);
        assert_eq!(bpm.resident_count(), 2);
        let snapshot = bpm.resident(file.id(), PageNo::new(0)).unwrap();
        let occupant = snapshot.occupant.unwrap();
        assert!(!occupant.dirty);
        assert_eq!(occupant.pin_count, 1);
    }

    #[tokio::test]
    async fn test_stale_handle_after_forced_unpin() {
        let file = file_with_pages("t", 2).await;
        let bpm = bpm(1);

        let handle = bpm.fetch_page(&file, PageNo::new(0)).await.unwrap();
        // Unpin behind the handle's back, then let the frame be reused
        bpm.unpin_page(&file, PageNo::new(0), false).unwrap();
        let other = bpm.fetch_page(&file, PageNo::new(1)).await.unwrap();

        assert!(matches!(
            handle.read().await,
            Err(BufferError::StaleHandle { .. })
        ));
        drop(handle);
        assert_eq!(pin_count(&bpm, &file, 1), Some(1));
        drop(other);
    }

    #[tokio::test]
    async fn test_concurrent_fetch_of_same_page_reads_once() {
        let file = file_with_pages("t", 1).await;
        let bpm = Arc::new(bpm(4));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let bpm = Arc::clone(&bpm);
            let file = Arc::clone(&file);
            tasks.push(tokio::spawn(async move {
                let handle = bpm.fetch_page(&file, PageNo::new(0)).await.unwrap();
                handle.read().await.unwrap().as_slice()[0]
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap(), 1);
        }
        assert_eq!(file.stats().reads, 1);
        assert_eq!(pin_count(&bpm, &file, 0), Some(0));
    }

    #[tokio::test]
    async fn test_verify_on_busy_pool() {
        let file = file_with_pages("t", 6).await;
        let bpm = bpm(3);
        for page in 0..6 {
            let mut handle = bpm.fetch_page(&file, PageNo::new(page)).await.unwrap();
            if page % 2 == 0 {
                handle.mark_dirty();
            }
        }
        bpm.verify().unwrap();
        assert_eq!(bpm.resident_count(), 3);
        bpm.close().await.unwrap();
    }
}
