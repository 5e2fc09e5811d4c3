//! Integration tests for the page file backends.

use std::sync::Arc;

use clockpool::storage::{DiskFile, MemoryFile, PAGE_SIZE, PageFile, PageNo, StorageError};
use tempfile::tempdir;

/// Generic test runner for any PageFile implementation.
async fn test_page_file_basic_operations<F: PageFile>(file: F) {
    // Initially empty
    assert_eq!(file.page_count().await, 0);

    let p0 = file.allocate_page().await.unwrap();
    let p1 = file.allocate_page().await.unwrap();
    let p2 = file.allocate_page().await.unwrap();

    assert_eq!(p0, PageNo::new(0));
    assert_eq!(p1, PageNo::new(1));
    assert_eq!(p2, PageNo::new(2));
    assert_eq!(file.page_count().await, 3);

    for (page_no, value) in [(p0, 10u8), (p1, 20u8), (p2, 30u8)] {
        let mut buf = [0u8; PAGE_SIZE];
        buf[0] = value;
        file.write_page(page_no, &buf).await.unwrap();
    }

    let mut buf = [0u8; PAGE_SIZE];
    file.read_page(p0, &mut buf).await.unwrap();
    assert_eq!(buf[0], 10);
    file.read_page(p1, &mut buf).await.unwrap();
    assert_eq!(buf[0], 20);
    file.read_page(p2, &mut buf).await.unwrap();
    assert_eq!(buf[0], 30);

    file.sync_all().await.unwrap();
}

/// Deleted pages read as missing and their numbers come back first.
async fn test_page_file_delete_and_reuse<F: PageFile>(file: F) {
    for _ in 0..4 {
        file.allocate_page().await.unwrap();
    }
    file.write_page(PageNo::new(2), &[7u8; PAGE_SIZE]).await.unwrap();

    file.delete_page(PageNo::new(2)).await.unwrap();
    file.delete_page(PageNo::new(1)).await.unwrap();

    let mut buf = [0u8; PAGE_SIZE];
    assert!(matches!(
        file.read_page(PageNo::new(2), &mut buf).await,
        Err(StorageError::PageNotFound { .. })
    ));
    assert!(matches!(
        file.delete_page(PageNo::new(2)).await,
        Err(StorageError::PageNotFound { .. })
    ));

    // Lowest free number first, then growth
    assert_eq!(file.allocate_page().await.unwrap(), PageNo::new(1));
    assert_eq!(file.allocate_page().await.unwrap(), PageNo::new(2));
    assert_eq!(file.allocate_page().await.unwrap(), PageNo::new(4));

    // A recycled page starts zeroed
    file.read_page(PageNo::new(2), &mut buf).await.unwrap();
    assert!(buf.iter().all(|&b| b == 0));
}

async fn open_disk(dir: &tempfile::TempDir) -> DiskFile {
    DiskFile::open(dir.path().join("test.db")).await.unwrap()
}

#[tokio::test]
async fn test_memory_file_basic() {
    test_page_file_basic_operations(MemoryFile::new("mem")).await;
}

#[tokio::test]
async fn test_disk_file_basic() {
    let dir = tempdir().unwrap();
    test_page_file_basic_operations(open_disk(&dir).await).await;
}

#[tokio::test]
async fn test_memory_file_delete_and_reuse() {
    test_page_file_delete_and_reuse(MemoryFile::new("mem")).await;
}

#[tokio::test]
async fn test_disk_file_delete_and_reuse() {
    let dir = tempdir().unwrap();
    test_page_file_delete_and_reuse(open_disk(&dir).await).await;
}

/// Test concurrent access (the buffer manager issues I/O from many tasks).
#[tokio::test]
async fn test_concurrent_access() {
    let dir = tempdir().unwrap();
    let file = Arc::new(open_disk(&dir).await);

    for _ in 0..10 {
        file.allocate_page().await.unwrap();
    }

    let mut handles = vec![];
    for i in 0..10 {
        let file = file.clone();
        handles.push(tokio::spawn(async move {
            let mut buf = [0u8; PAGE_SIZE];
            buf[0] = i as u8;
            file.write_page(PageNo::new(i), &buf).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    file.sync_all().await.unwrap();

    for i in 0..10 {
        let mut buf = [0u8; PAGE_SIZE];
        file.read_page(PageNo::new(i), &mut buf).await.unwrap();
        assert_eq!(buf[0], i as u8);
    }
}

#[tokio::test]
async fn test_buffer_size_validation() {
    let file = MemoryFile::new("mem");
    let page_no = file.allocate_page().await.unwrap();

    let mut small_buf = [0u8; 100];
    let result = file.read_page(page_no, &mut small_buf).await;
    assert!(matches!(
        result,
        Err(StorageError::InvalidBufferSize {
            expected: PAGE_SIZE,
            actual: 100
        })
    ));

    let result = file.write_page(page_no, &small_buf).await;
    assert!(matches!(
        result,
        Err(StorageError::InvalidBufferSize {
            expected: PAGE_SIZE,
            actual: 100
        })
    ));
}

#[tokio::test]
async fn test_memory_file_page_limit() {
    let file = MemoryFile::with_max_pages("small", 2);
    file.allocate_page().await.unwrap();
    file.allocate_page().await.unwrap();
    assert!(matches!(
        file.allocate_page().await,
        Err(StorageError::StorageFull)
    ));
}

/// Test persistence across DiskFile instances.
#[tokio::test]
async fn test_disk_file_persistence_across_instances() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");

    {
        let file = DiskFile::open(&path).await.unwrap();
        for i in 0..5 {
            let page_no = file.allocate_page().await.unwrap();
            let mut buf = [0u8; PAGE_SIZE];
            buf[0] = (i * 10) as u8;
            file.write_page(page_no, &buf).await.unwrap();
        }
        file.sync_all().await.unwrap();
    }

    {
        let file = DiskFile::open(&path).await.unwrap();
        assert_eq!(file.page_count().await, 5);
        for i in 0..5 {
            let mut buf = [0u8; PAGE_SIZE];
            file.read_page(PageNo::new(i), &mut buf).await.unwrap();
            assert_eq!(buf[0], (i * 10) as u8);
        }
    }
}

#[tokio::test]
async fn test_disk_file_rejects_torn_length() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("torn.db");
    std::fs::write(&path, vec![0u8; PAGE_SIZE + 1]).unwrap();

    assert!(matches!(
        DiskFile::open(&path).await,
        Err(StorageError::Corrupted(_))
    ));
}
