//! Page location index: which frame, if any, holds a page.

use std::collections::HashMap;

use crate::storage::{FileId, PageNo};

use super::frame::FrameId;

/// Key of the page table: a page of a particular file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub file: FileId,
    pub page_no: PageNo,
}

impl PageKey {
    pub const fn new(file: FileId, page_no: PageNo) -> Self {
        Self { file, page_no }
    }
}

/// Result of a page table lookup.
///
/// A miss is ordinary control flow (it drives the load path), not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lookup {
    Found(FrameId),
    NotFound,
}

/// Maps resident pages to their frames.
pub(crate) struct PageTable {
    map: HashMap<PageKey, FrameId>,
}

impl PageTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity(capacity),
        }
    }

    pub fn lookup(&self, key: PageKey) -> Lookup {
        match self.map.get(&key) {
            Some(&frame_id) => Lookup::Found(frame_id),
            None => Lookup::NotFound,
        }
    }

    /// Records that `key` now lives in `frame_id`.
    pub fn insert(&mut self, key: PageKey, frame_id: FrameId) {
        let previous = self.map.insert(key, frame_id);
        debug_assert!(previous.is_none(), "page {:?} mapped twice", key);
    }

    /// Drops the entry for `key`, returning the frame it pointed at.
    pub fn remove(&mut self, key: PageKey) -> Option<FrameId> {
        self.map.remove(&key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PageKey, FrameId)> + '_ {
        self.map.iter().map(|(&key, &frame_id)| (key, frame_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(file: FileId, page: u64) -> PageKey {
        PageKey::new(file, PageNo::new(page))
    }

    #[test]
    fn test_lookup_miss() {
        let table = PageTable::with_capacity(4);
        assert_eq!(table.lookup(key(FileId::next(), 0)), Lookup::NotFound);
    }

    #[test]
    fn test_insert_lookup_remove() {
        let file = FileId::next();
        let mut table = PageTable::with_capacity(4);

        table.insert(key(file, 3), FrameId::new(1));
        assert_eq!(table.lookup(key(file, 3)), Lookup::Found(FrameId::new(1)));
        assert_eq!(table.len(), 1);

        assert_eq!(table.remove(key(file, 3)), Some(FrameId::new(1)));
        assert_eq!(table.lookup(key(file, 3)), Lookup::NotFound);
        assert_eq!(table.remove(key(file, 3)), None);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_same_page_number_in_two_files() {
        let a = FileId::next();
        let b = FileId::next();
        let mut table = PageTable::with_capacity(4);

        table.insert(key(a, 1), FrameId::new(0));
        table.insert(key(b, 1), FrameId::new(1));

        assert_eq!(table.lookup(key(a, 1)), Lookup::Found(FrameId::new(0)));
        assert_eq!(table.lookup(key(b, 1)), Lookup::Found(FrameId::new(1)));
        assert_eq!(table.iter().count(), 2);
    }
}
