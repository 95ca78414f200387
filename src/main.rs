//! extentdb - block cache and extent allocator command line tool

use anyhow::{Context, Result};
use clap::{Parser as ClapParser, Subcommand, ValueEnum};
use extentdb::config::{MemoryConfig, MAX_CACHE_MEMORY};
use extentdb::memory::MemoryManager;
use extentdb::storage::ExtentKind;
use std::path::{Path, PathBuf};

/// extentdb - block cache and extent allocator for a block-structured store
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Number of cache slots
    #[arg(short = 'c', long, global = true, default_value_t = MAX_CACHE_MEMORY)]
    cache_capacity: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a store file and format its system catalog
    Init {
        path: PathBuf,

        /// Number of blocks in the store
        #[arg(short, long, default_value = "1024")]
        blocks: usize,
    },
    /// Add an extent to a segment
    Grow {
        path: PathBuf,
        segment: String,

        #[arg(short, long, value_enum, default_value = "table")]
        kind: KindArg,
    },
    /// Print the extents of a segment
    Resolve {
        path: PathBuf,
        segment: String,

        /// Look the segment up in the index catalog
        #[arg(short, long)]
        index: bool,
    },
    /// Print cache statistics after opening a store
    Stats { path: PathBuf },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Table,
    Index,
}

impl From<KindArg> for ExtentKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Table => ExtentKind::Table,
            KindArg::Index => ExtentKind::Index,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = MemoryConfig::default().with_cache_capacity(args.cache_capacity);

    match args.command {
        Command::Init { path, blocks } => {
            MemoryManager::create(&path, blocks, config)
                .with_context(|| format!("Failed to create store at {}", path.display()))?;
            println!("Created store at {} with {} blocks", path.display(), blocks);
        }
        Command::Grow {
            path,
            segment,
            kind,
        } => {
            let mut manager = open(&path, config)?;
            let start = manager
                .grow_segment(&segment, kind.into())
                .with_context(|| format!("Failed to grow segment '{}'", segment))?;
            manager.flush_all();
            println!("Segment '{}' grew by an extent starting at block {}", segment, start);
        }
        Command::Resolve {
            path,
            segment,
            index,
        } => {
            let mut manager = open(&path, config)?;
            let extents = if index {
                manager.resolve_index_addresses(&segment)?
            } else {
                manager.resolve_table_addresses(&segment)?
            };
            if extents.is_empty() {
                println!("Segment '{}' has no extents", segment);
            }
            for extent in &extents {
                println!("{} - {} ({} blocks)", extent.from, extent.to, extent.len());
            }
        }
        Command::Stats { path } => {
            let manager = open(&path, config)?;
            let stats = manager.cache_stats();
            println!("Store blocks:   {}", manager.cache().store_capacity());
            println!("Cache slots:    {}", stats.capacity);
            println!("Resident:       {}", stats.resident);
            println!("Dirty:          {}", stats.dirty);
        }
    }

    Ok(())
}

fn open(path: &Path, config: MemoryConfig) -> Result<MemoryManager> {
    MemoryManager::open(path, config)
        .with_context(|| format!("Failed to open store at {}", path.display()))
}
