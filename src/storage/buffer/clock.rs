//! Clock (second-chance) victim selection.

use std::sync::Arc;

use crate::storage::{PageFile, PageNo};

use super::error::BufferError;
use super::frame::{FrameDescriptor, FrameId, FrameIo};
use super::page_table::PageTable;

/// A dirty frame claimed for write-back.
///
/// While the claim is out the frame is `WritingBack` with its dirty bit
/// already cleared, and it keeps its page table entry so readers still hit it.
pub(crate) struct WriteBack<F> {
    pub frame_id: FrameId,
    pub generation: u64,
    pub file: Arc<F>,
    pub page_no: PageNo,
}

/// Outcome of one clock sweep.
pub(crate) enum Victim<F> {
    /// The frame is empty and ready to take a page.
    Vacant(FrameId),
    /// The chosen frame must be written back before it can be reused.
    Dirty(WriteBack<F>),
    /// Every unpinned frame has I/O in flight; this one is worth waiting for.
    Busy(FrameId),
}

/// The clock hand: next frame index the sweep examines.
///
/// Owned by the buffer manager and persisted between sweeps, so every frame
/// gets its turn instead of the scan always restarting at frame 0.
pub(crate) struct ClockHand {
    hand: usize,
    pool_size: usize,
}

impl ClockHand {
    /// Creates a hand whose first step lands on frame 0.
    pub fn new(pool_size: usize) -> Self {
        debug_assert!(pool_size > 0);
        Self {
            hand: pool_size - 1,
            pool_size,
        }
    }

    /// Frame the hand currently points at.
    pub fn position(&self) -> usize {
        self.hand
    }

    fn advance(&mut self) -> usize {
        self.hand = (self.hand + 1) % self.pool_size;
        self.hand
    }

    /// Picks a frame for reuse.
    ///
    /// At each visited frame: an empty frame is taken at once; a set
    /// reference bit is cleared (second chance); a pinned or busy frame is
    /// skipped; otherwise the frame is the victim. A clean victim is
    /// unmapped and emptied here. A dirty one is claimed for write-back and
    /// returned untouched otherwise.
    ///
    /// A full revolution that found unpinned frames, all of them busy with
    /// I/O, returns [`Victim::Busy`] so the caller can wait and sweep again.
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` once a full revolution has seen only pinned frames.
    pub fn sweep<F: PageFile>(
        &mut self,
        frames: &mut [FrameDescriptor<F>],
        page_table: &mut PageTable,
    ) -> Result<Victim<F>, BufferError> {
        debug_assert_eq!(frames.len(), self.pool_size);

        loop {
            // Any available frame seen now has its reference bit cleared,
            // so the next revolution is guaranteed to take one.
            let mut saw_available = false;
            let mut busy = None;

            for _ in 0..self.pool_size {
                let desc = &mut frames[self.advance()];
                let frame_id = desc.id();
                let generation = desc.generation();

                let Some(resident) = desc.resident_mut() else {
                    return Ok(Victim::Vacant(frame_id));
                };

                if resident.is_available() {
                    saw_available = true;
                } else if resident.pin_count == 0 {
                    busy.get_or_insert(frame_id);
                }
                if resident.ref_bit {
                    resident.ref_bit = false;
                    continue;
                }
                if !resident.is_evictable() {
                    continue;
                }

                if resident.dirty {
                    resident.dirty = false;
                    resident.io = FrameIo::WritingBack;
                    return Ok(Victim::Dirty(WriteBack {
                        frame_id,
                        generation,
                        file: Arc::clone(&resident.file),
                        page_no: resident.page_no,
                    }));
                }

                let key = resident.key();
                page_table.remove(key);
                desc.clear();
                tracing::debug!(frame = %frame_id, page = %key.page_no, "evicted clean page");
                return Ok(Victim::Vacant(frame_id));
            }

            if !saw_available {
                return match busy {
                    Some(frame_id) => Ok(Victim::Busy(frame_id)),
                    None => Err(BufferError::CapacityExceeded {
                        pool_size: self.pool_size,
                    }),
                };
            }
        }
    }
}
