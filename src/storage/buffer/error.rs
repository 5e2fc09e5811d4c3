//! Buffer manager errors.

use crate::storage::{PageNo, StorageError};

use super::frame::FrameId;

/// Buffer manager errors.
///
/// Every variant is fatal to the call that returned it; nothing is retried
/// internally. Page store failures pass through unchanged as `Storage`.
#[derive(Debug)]
pub enum BufferError {
    /// No frame can be freed: every frame is pinned. Frames that are only
    /// busy with a write-back are waited for instead.
    ///
    /// Either increase the pool size or make sure pages are unpinned after
    /// use.
    CapacityExceeded {
        /// Number of frames in the pool.
        pool_size: usize,
    },

    /// `unpin_page` on a resident page whose pin count is already zero.
    PageNotPinned {
        file: String,
        page_no: PageNo,
        frame_id: FrameId,
    },

    /// The operation needs an unpinned page: `flush_file` found a pinned
    /// page of the file, or `dispose_page` was asked to drop a pinned page.
    PagePinned {
        file: String,
        page_no: PageNo,
        frame_id: FrameId,
    },

    /// The frame descriptor table and the page table disagree.
    CorruptFrameState {
        frame_id: FrameId,
        /// What exactly disagreed.
        detail: String,
    },

    /// A page handle outlived its pin and the frame has moved on.
    StaleHandle { frame_id: FrameId },

    /// Underlying page store error.
    Storage(StorageError),
}

impl std::fmt::Display for BufferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferError::CapacityExceeded { pool_size } => {
                write!(
                    f,
                    "buffer pool exhausted: all {} frames are pinned",
                    pool_size
                )
            }
            BufferError::PageNotPinned {
                file,
                page_no,
                frame_id,
            } => write!(
                f,
                "page {} of {} (frame {}) is not pinned",
                page_no, file, frame_id
            ),
            BufferError::PagePinned {
                file,
                page_no,
                frame_id,
            } => write!(
                f,
                "page {} of {} (frame {}) is still pinned",
                page_no, file, frame_id
            ),
            BufferError::CorruptFrameState { frame_id, detail } => {
                write!(f, "corrupt state in frame {}: {}", frame_id, detail)
            }
            BufferError::StaleHandle { frame_id } => {
                write!(f, "stale page handle for frame {}", frame_id)
            }
            BufferError::Storage(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl std::error::Error for BufferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BufferError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for BufferError {
    fn from(e: StorageError) -> Self {
        BufferError::Storage(e)
    }
}
