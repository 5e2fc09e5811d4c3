//! Page-aligned buffer backing one buffer frame.

use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::fmt;
use std::ptr::NonNull;

use super::PAGE_SIZE;

/// Alignment of every page buffer (typical OS page).
const BUFFER_ALIGNMENT: usize = 4096;

/// Owned, zero-initialized `PAGE_SIZE` byte buffer aligned to 4KB.
///
/// # Safety
///
/// - `ptr` points to a live allocation made with `layout`
/// - the allocation is exactly `PAGE_SIZE` bytes
/// - it is released exactly once, in `Drop`
pub struct PageData {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl PageData {
    /// Allocates a zeroed page buffer.
    ///
    /// # Panics
    ///
    /// Panics if the allocator is out of memory.
    pub fn new() -> Self {
        let layout = Layout::from_size_align(PAGE_SIZE, BUFFER_ALIGNMENT)
            .expect("PAGE_SIZE and BUFFER_ALIGNMENT form a valid layout");

        // SAFETY: layout has non-zero size and a power-of-two alignment
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = match NonNull::new(raw) {
            Some(ptr) => ptr,
            None => std::alloc::handle_alloc_error(layout),
        };

        Self { ptr, layout }
    }

    /// Page content.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is valid for layout.size() initialized bytes
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }

    /// Mutable page content.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: ptr is valid for layout.size() bytes and &mut self is unique
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }

    /// Overwrites the whole buffer with zeros.
    pub fn zero(&mut self) {
        self.as_mut_slice().fill(0);
    }
}

impl Default for PageData {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PageData {
    fn drop(&mut self) {
        // SAFETY: ptr came from alloc_zeroed with this exact layout
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

// SAFETY: PageData uniquely owns its allocation.
unsafe impl Send for PageData {}
// SAFETY: shared access only hands out &[u8]; mutation needs &mut self.
unsafe impl Sync for PageData {}

impl AsRef<[u8]> for PageData {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsMut<[u8]> for PageData {
    fn as_mut(&mut self) -> &mut [u8] {
        self.as_mut_slice()
    }
}

impl fmt::Debug for PageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageData")
            .field("len", &self.layout.size())
            .finish_non_exhaustive()
    }
}
