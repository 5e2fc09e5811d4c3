//! Storage layer for page-based I/O.
//!
//! All data lives in 8KB pages of page files. The buffer manager caches
//! those pages in memory; page files only ever move whole pages.
//!
//! # Architecture
//!
//! ```text
//! +-------------------+
//! | Buffer Manager    |  <- buffer
//! +-------------------+
//!          |
//!          v
//! +-------------------+
//! | PageFile Trait    |  <- io
//! +-------------------+
//!       /      \
//!      v        v
//! +-----------+ +-----------+
//! | MemoryFile| | DiskFile  |
//! +-----------+ +-----------+
//! ```

pub mod buffer;
pub mod error;
pub mod io;
pub mod page;

pub use buffer::{
    BufferError, BufferManager, BufferPoolConfig, FrameId, FrameIo, FrameSnapshot, Occupant,
    PageHandle, PageKey, PoolDiagnostics,
};
pub use error::StorageError;
pub use io::{DiskFile, IoStats, MemoryFile, PageFile};
pub use page::{FileId, PAGE_SIZE, PageData, PageNo};
