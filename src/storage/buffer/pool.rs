//! The buffer pool: one page buffer per frame.

use tokio::sync::futures::Notified;
use tokio::sync::{Notify, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::storage::PageData;

use super::frame::FrameId;

/// Fixed array of page buffers, index-aligned with the descriptor table.
///
/// Frame `i`'s buffer always holds the page frame `i`'s descriptor names.
/// Each buffer has its own data latch; the descriptor table decides who
/// may take it.
///
/// # Latch Hierarchy
///
/// A task may take a buffer latch while holding nothing, and may take the
/// manager's state lock while holding a buffer latch. It must never await a
/// buffer latch while holding the state lock.
///
/// # I/O Completion
///
/// Each frame also has a [`Notify`] fired whenever the frame's load or
/// write-back settles. A waiter creates its [`Notified`] future while
/// holding the state lock that showed the I/O in flight; the settling task
/// notifies under the same lock, so the wakeup cannot be missed.
pub(crate) struct FramePool {
    buffers: Vec<RwLock<PageData>>,
    settled: Vec<Notify>,
}

impl FramePool {
    /// Allocates `pool_size` zeroed buffers.
    pub fn new(pool_size: usize) -> Self {
        Self {
            buffers: (0..pool_size).map(|_| RwLock::new(PageData::new())).collect(),
            settled: (0..pool_size).map(|_| Notify::new()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Shared latch on a frame's buffer.
    pub async fn read(&self, frame_id: FrameId) -> RwLockReadGuard<'_, PageData> {
        self.buffers[frame_id.index()].read().await
    }

    /// Exclusive latch on a frame's buffer.
    pub async fn write(&self, frame_id: FrameId) -> RwLockWriteGuard<'_, PageData> {
        self.buffers[frame_id.index()].write().await
    }

    /// Completes at the next [`notify_settled`](Self::notify_settled) for
    /// the frame, counting from this call.
    pub fn settled(&self, frame_id: FrameId) -> Notified<'_> {
        self.settled[frame_id.index()].notified()
    }

    /// Wakes every task waiting for the frame's I/O.
    pub fn notify_settled(&self, frame_id: FrameId) {
        self.settled[frame_id.index()].notify_waiters();
    }
}
