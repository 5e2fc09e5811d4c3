//! Frame descriptor table entries.

use std::fmt;
use std::sync::Arc;

use crate::storage::{FileId, PageFile, PageNo};

use super::page_table::PageKey;

/// Identifier for a frame within the buffer pool.
///
/// FrameId is an index into both the descriptor table and the buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub(crate) u32);

impl FrameId {
    /// Creates a new FrameId.
    pub(crate) const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the frame index.
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// I/O in flight on a resident frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameIo {
    /// No I/O; the frame content is the page.
    Idle,
    /// The page is being read into the frame.
    Loading,
    /// A dirty copy is being written back to the page file.
    WritingBack,
}

/// Bookkeeping for a frame that holds a page.
pub(crate) struct Resident<F> {
    pub file: Arc<F>,
    pub page_no: PageNo,
    pub pin_count: u32,
    pub ref_bit: bool,
    pub dirty: bool,
    pub io: FrameIo,
}

impl<F: PageFile> Resident<F> {
    pub fn key(&self) -> PageKey {
        PageKey::new(self.file.id(), self.page_no)
    }

    /// Takes one more pin and marks the frame recently used.
    pub fn pin(&mut self) -> u32 {
        self.pin_count += 1;
        self.ref_bit = true;
        self.pin_count
    }

    /// Drops one pin, making the frame dirty if `dirty` is set.
    ///
    /// Returns the remaining pin count, or `None` (and changes nothing) if
    /// the frame was not pinned.
    pub fn unpin(&mut self, dirty: bool) -> Option<u32> {
        if self.pin_count == 0 {
            return None;
        }
        self.pin_count -= 1;
        // Sticky: a clean unpin never clears another borrower's dirty mark
        if dirty {
            self.dirty = true;
        }
        Some(self.pin_count)
    }

    /// Clean eviction is allowed: unpinned, not recently used, no I/O.
    pub fn is_evictable(&self) -> bool {
        self.pin_count == 0 && !self.ref_bit && self.io == FrameIo::Idle
    }

    /// Unpinned and free of I/O, whatever the reference bit says.
    pub fn is_available(&self) -> bool {
        self.pin_count == 0 && self.io == FrameIo::Idle
    }
}

/// What a frame holds.
///
/// Occupant fields only exist on `Occupied`, so an empty frame can never
/// carry a pin count or a dirty mark.
pub(crate) enum FrameState<F> {
    Empty,
    Occupied(Resident<F>),
}

/// One entry of the frame descriptor table.
pub(crate) struct FrameDescriptor<F> {
    id: FrameId,
    state: FrameState<F>,
    /// Bumped every time a page is installed. Handles remember the value
    /// they were issued under and are stale once it moves on.
    generation: u64,
}

impl<F: PageFile> FrameDescriptor<F> {
    pub fn new(id: FrameId) -> Self {
        Self {
            id,
            state: FrameState::Empty,
            generation: 0,
        }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_valid(&self) -> bool {
        matches!(self.state, FrameState::Occupied(_))
    }

    pub fn resident(&self) -> Option<&Resident<F>> {
        match &self.state {
            FrameState::Occupied(r) => Some(r),
            FrameState::Empty => None,
        }
    }

    pub fn resident_mut(&mut self) -> Option<&mut Resident<F>> {
        match &mut self.state {
            FrameState::Occupied(r) => Some(r),
            FrameState::Empty => None,
        }
    }

    /// The occupant, provided it is still the one issued under `generation`.
    pub fn resident_at(&self, generation: u64) -> Option<&Resident<F>> {
        if self.generation != generation {
            return None;
        }
        self.resident()
    }

    pub fn resident_at_mut(&mut self, generation: u64) -> Option<&mut Resident<F>> {
        if self.generation != generation {
            return None;
        }
        self.resident_mut()
    }

    /// Installs a page that is about to be read in.
    ///
    /// The frame starts pinned once by the loader, recently used, clean and
    /// `Loading`. Returns the new generation.
    pub fn install(&mut self, file: Arc<F>, page_no: PageNo) -> u64 {
        debug_assert!(!self.is_valid(), "install over an occupied frame");
        self.generation += 1;
        self.state = FrameState::Occupied(Resident {
            file,
            page_no,
            pin_count: 1,
            ref_bit: true,
            dirty: false,
            io: FrameIo::Loading,
        });
        self.generation
    }

    /// Forgets the occupant.
    pub fn clear(&mut self) {
        self.state = FrameState::Empty;
    }

    pub fn snapshot(&self) -> FrameSnapshot {
        FrameSnapshot {
            frame_id: self.id,
            occupant: self.resident().map(|r| Occupant {
                file_id: r.file.id(),
                file_name: r.file.name().to_string(),
                page_no: r.page_no,
                pin_count: r.pin_count,
                ref_bit: r.ref_bit,
                dirty: r.dirty,
                io: r.io,
            }),
        }
    }
}

/// Point-in-time copy of one frame descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSnapshot {
    pub frame_id: FrameId,
    /// `None` for an empty frame.
    pub occupant: Option<Occupant>,
}

/// Page held by a frame, as seen in a [`FrameSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occupant {
    pub file_id: FileId,
    pub file_name: String,
    pub page_no: PageNo,
    pub pin_count: u32,
    pub ref_bit: bool,
    pub dirty: bool,
    pub io: FrameIo,
}
