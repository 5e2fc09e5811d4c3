//! Buffer manager configuration.

use crate::storage::PAGE_SIZE;

/// Configuration for the buffer manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferPoolConfig {
    /// Number of frames in the buffer pool.
    ///
    /// This bounds how many pages are cached at once. Common values:
    /// - 16 frames = 128KB (tests)
    /// - 1024 frames = 8MB (small database)
    /// - 131072 frames = 1GB (production)
    pub pool_size: usize,
}

impl BufferPoolConfig {
    /// Replaces the frame count.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Bytes of page memory the pool will allocate.
    pub fn memory_bytes(&self) -> usize {
        self.pool_size * PAGE_SIZE
    }
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 1024, // 1024 * 8KB = 8MB
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_eight_megabytes() {
        let config = BufferPoolConfig::default();
        assert_eq!(config.pool_size, 1024);
        assert_eq!(config.memory_bytes(), 8 * 1024 * 1024);
    }

    #[test]
    fn test_with_pool_size() {
        let config = BufferPoolConfig::default().with_pool_size(3);
        assert_eq!(config.pool_size, 3);
    }
}
