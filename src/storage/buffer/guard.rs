//! Pin-guarded page handles.
//!
//! A handle owns one pin and gives it back when dropped, preventing pin
//! leaks.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{RwLockReadGuard, RwLockWriteGuard};

use crate::storage::{PageData, PageFile, PageNo};

use super::error::BufferError;
use super::frame::FrameId;
use super::manager::BufferManager;

/// One pin on a resident page.
///
/// The page cannot be evicted while the handle lives. Content is reached
/// through the frame's data latch with [`read`](Self::read) and
/// [`write`](Self::write). Holding a write latch and then awaiting another
/// latch on the same page from the same task deadlocks.
///
/// # Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # use clockpool::storage::{BufferManager, BufferPoolConfig, MemoryFile, PageNo};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let bpm = BufferManager::new(BufferPoolConfig::default());
/// # let file = Arc::new(MemoryFile::new("example"));
/// let mut handle = bpm.fetch_page(&file, PageNo::new(0)).await?;
/// handle.write().await?.as_mut_slice()[0] = 42;
/// // Unpinned as dirty when the handle is dropped
/// # Ok(())
/// # }
/// ```
pub struct PageHandle<'a, F: PageFile> {
    bpm: &'a BufferManager<F>,
    file: Arc<F>,
    page_no: PageNo,
    frame_id: FrameId,
    generation: u64,
    dirty: bool,
    /// Set once the pin has been given back (or handed to the caller).
    released: bool,
}

impl<'a, F: PageFile> PageHandle<'a, F> {
    pub(super) fn new(
        bpm: &'a BufferManager<F>,
        file: Arc<F>,
        page_no: PageNo,
        frame_id: FrameId,
        generation: u64,
    ) -> Self {
        Self {
            bpm,
            file,
            page_no,
            frame_id,
            generation,
            dirty: false,
            released: false,
        }
    }

    pub fn page_no(&self) -> PageNo {
        self.page_no
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn file(&self) -> &Arc<F> {
        &self.file
    }

    /// Whether the page will be unpinned as dirty.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Shared latch on the page content.
    ///
    /// Waits for a load in progress to finish first.
    ///
    /// # Errors
    ///
    /// `StaleHandle` if the frame no longer holds this handle's page.
    pub async fn read(&self) -> Result<RwLockReadGuard<'_, PageData>, BufferError> {
        loop {
            let data = self.bpm.pool.read(self.frame_id).await;
            match self.bpm.pending_load(self.frame_id, self.generation)? {
                Some(loaded) => {
                    drop(data);
                    loaded.await;
                }
                None => return Ok(data),
            }
        }
    }

    /// Exclusive latch on the page content. Marks the handle dirty.
    ///
    /// # Errors
    ///
    /// `StaleHandle` if the frame no longer holds this handle's page.
    pub async fn write(&mut self) -> Result<RwLockWriteGuard<'_, PageData>, BufferError> {
        loop {
            let data = self.bpm.pool.write(self.frame_id).await;
            match self.bpm.pending_load(self.frame_id, self.generation)? {
                Some(loaded) => {
                    drop(data);
                    loaded.await;
                }
                None => {
                    self.dirty = true;
                    return Ok(data);
                }
            }
        }
    }

    /// Gives the pin back now, reporting any error instead of logging it.
    pub fn release(mut self) -> Result<(), BufferError> {
        self.released = true;
        self.bpm
            .unpin_frame(self.frame_id, self.generation, self.dirty)
    }

    /// Keeps the pin without a handle.
    ///
    /// The caller takes over the pin and must give it back with
    /// [`BufferManager::unpin_page`].
    pub fn detach(mut self) -> PageNo {
        self.released = true;
        self.page_no
    }
}

impl<F: PageFile> fmt::Debug for PageHandle<'_, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageHandle")
            .field("file", &self.file.name())
            .field("page_no", &self.page_no)
            .field("frame_id", &self.frame_id)
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl<F: PageFile> Drop for PageHandle<'_, F> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self
            .bpm
            .unpin_frame(self.frame_id, self.generation, self.dirty)
        {
            tracing::warn!(
                file = self.file.name(),
                page = %self.page_no,
                frame = %self.frame_id,
                error = %e,
                "failed to unpin page on drop"
            );
        }
    }
}
