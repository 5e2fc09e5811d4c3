use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use clockpool::storage::{BufferManager, BufferPoolConfig, DiskFile, PageFile, PageNo};
use tracing_subscriber::EnvFilter;

/// Runs a sequential-scan workload through a clock buffer pool and prints
/// the frame table afterwards.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Page file to scan (created if missing)
    #[arg(long, default_value = "clockpool.db")]
    path: PathBuf,

    /// Number of buffer frames
    #[arg(long, default_value_t = 16)]
    pool_size: usize,

    /// Number of pages the file should hold
    #[arg(long, default_value_t = 64)]
    pages: u64,

    /// Number of full scans; each scan bumps a counter on every page
    #[arg(long, default_value_t = 3)]
    passes: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    anyhow::ensure!(args.pool_size > 0, "--pool-size must be at least 1");

    let file = Arc::new(
        DiskFile::open(&args.path)
            .await
            .with_context(|| format!("failed to open {}", args.path.display()))?,
    );
    let config = BufferPoolConfig::default().with_pool_size(args.pool_size);
    let memory_bytes = config.memory_bytes();
    let bpm = BufferManager::new(config);

    while file.page_count().await < args.pages {
        let (_, handle) = bpm.allocate_page(&file).await?;
        handle.release()?;
    }
    tracing::info!(
        path = %args.path.display(),
        pages = args.pages,
        pool_size = args.pool_size,
        memory_bytes,
        "starting scan"
    );

    let start = Instant::now();
    for _ in 0..args.passes {
        for page in 0..args.pages {
            let mut handle = bpm.fetch_page(&file, PageNo::new(page)).await?;
            {
                let mut data = handle.write().await?;
                let counter = u64::from_le_bytes(data.as_slice()[..8].try_into()?);
                data.as_mut_slice()[..8].copy_from_slice(&(counter + 1).to_le_bytes());
            }
            handle.release()?;
        }
    }
    let elapsed = start.elapsed();

    println!("{}", bpm.diagnostics());
    println!(
        "{} passes over {} pages with {} frames in {:?}",
        args.passes, args.pages, args.pool_size, elapsed
    );

    bpm.close().await.context("failed to flush buffer pool")?;
    Ok(())
}
