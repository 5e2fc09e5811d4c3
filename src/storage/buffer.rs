//! Buffer pool for caching pages in memory.
//!
//! The buffer manager sits between page files and their users, keeping a
//! bounded set of pages resident and deciding which one to replace when a
//! new page is needed.
//!
//! # Components
//!
//! - [`BufferManager`]: Main interface for page access
//! - [`PageHandle`]: RAII pin on a resident page
//! - Clock replacement: a persistent hand sweeping the frame descriptors,
//!   giving recently used frames a second chance
//! - [`PoolDiagnostics`]: dump of every frame descriptor
//!
//! # Latch Hierarchy
//!
//! To prevent deadlocks, locks must be acquired in this order:
//! 1. Frame data RwLocks (at most one per task)
//! 2. Manager state mutex (page table, descriptors, clock hand)
//!
//! The state mutex is never held across an await.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use clockpool::storage::{BufferManager, BufferPoolConfig, MemoryFile};
//!
//! # async fn example() -> Result<(), clockpool::storage::BufferError> {
//! let file = Arc::new(MemoryFile::new("example"));
//! let bpm = BufferManager::new(BufferPoolConfig::default().with_pool_size(100));
//!
//! // Create a new page
//! let (page_no, mut handle) = bpm.allocate_page(&file).await?;
//! handle.write().await?.as_mut_slice()[0] = 42;
//! drop(handle);
//!
//! // Fetch it later
//! let handle = bpm.fetch_page(&file, page_no).await?;
//! assert_eq!(handle.read().await?.as_slice()[0], 42);
//! drop(handle);
//!
//! bpm.close().await?;
//! # Ok(())
//! # }
//! ```

mod clock;
mod config;
mod diagnostics;
mod error;
mod frame;
mod guard;
mod manager;
mod page_table;
mod pool;

pub use config::BufferPoolConfig;
pub use diagnostics::PoolDiagnostics;
pub use error::BufferError;
pub use frame::{FrameId, FrameIo, FrameSnapshot, Occupant};
pub use guard::PageHandle;
pub use manager::BufferManager;
pub use page_table::PageKey;
