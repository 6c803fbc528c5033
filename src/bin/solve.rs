use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::{Parser, ValueEnum};

use kalahari::{
    solve, Compression, MemoryStore, PositionStore, SnapshotHeader, SnapshotStore, SolveConfig,
    Variant, DEFAULT_ZOBRIST_SEED,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompressionOpt {
    None,
    Lz4,
    Zstd,
}

impl From<CompressionOpt> for Compression {
    fn from(opt: CompressionOpt) -> Self {
        match opt {
            CompressionOpt::None => Compression::None,
            CompressionOpt::Lz4 => Compression::Lz4,
            CompressionOpt::Zstd => Compression::Zstd,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "solve", about = "Strong-solve a Kalah(p,s) variant into a position database")]
struct Args {
    /// Pits per side
    #[arg(long, default_value_t = 6)]
    pits: u8,

    /// Initial seeds per pit
    #[arg(long, default_value_t = 4)]
    seeds: u8,

    /// Database snapshot path. Omitted: the solve runs purely in memory.
    /// An existing snapshot for the same variant is resumed.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Worker threads (default: all cores)
    #[arg(long)]
    workers: Option<usize>,

    /// Parent positions per BFS dispatch
    #[arg(long, default_value_t = 100_000)]
    chunk_size: usize,

    /// Unsolved positions per retrograde fetch
    #[arg(long, default_value_t = 100_000)]
    batch_size: usize,

    /// Worker-side fingerprint dedup cap
    #[arg(long, default_value_t = 10_000_000)]
    dedup_max: usize,

    /// Write-queue depth in batches
    #[arg(long, default_value_t = 1_000)]
    queue_capacity: usize,

    /// Free-memory warning threshold in GiB
    #[arg(long, default_value_t = 4.0)]
    mem_warn: f64,

    /// Free-memory critical threshold in GiB
    #[arg(long, default_value_t = 2.0)]
    mem_crit: f64,

    /// Relax per-barrier durability; snapshot is written once at the end
    #[arg(long)]
    fast: bool,

    /// Skip the physical reorganization by seed level between phases
    #[arg(long)]
    no_cluster: bool,

    /// Snapshot frame compression
    #[arg(long, value_enum, default_value_t = CompressionOpt::Zstd)]
    compression: CompressionOpt,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let variant = Variant::new(args.pits, args.seeds);
    let mut config = SolveConfig::for_variant(variant);
    if let Some(workers) = args.workers {
        config.worker_count = workers.max(1);
    }
    config.chunk_size = args.chunk_size;
    config.batch_size = args.batch_size;
    config.dedup_set_max = args.dedup_max;
    config.queue_capacity = args.queue_capacity;
    config.mem_warn_gb = args.mem_warn;
    config.mem_crit_gb = args.mem_crit;
    config.fast_mode = args.fast;
    config.cluster_by_level = !args.no_cluster;

    eprintln!(
        "[solve] Kalah({},{}): {} cells, {} seeds in play, {} workers",
        variant.pits,
        variant.seeds,
        variant.cell_count(),
        variant.total_seeds(),
        config.worker_count
    );

    let snapshot: Option<Arc<SnapshotStore>> = match &args.db {
        Some(path) => {
            let header = SnapshotHeader {
                variant,
                zobrist_seed: DEFAULT_ZOBRIST_SEED,
            };
            let store = SnapshotStore::open_or_create(
                path,
                header,
                args.compression.into(),
                args.fast,
            )?;
            if !store.is_empty() {
                eprintln!(
                    "[solve] resuming from {} ({} stored positions)",
                    path.display(),
                    store.len()
                );
            }
            Some(Arc::new(store))
        }
        None => None,
    };
    let store: Arc<dyn PositionStore> = match &snapshot {
        Some(s) => Arc::clone(s) as Arc<dyn PositionStore>,
        None => Arc::new(MemoryStore::new()),
    };

    let cancel = AtomicBool::new(false);
    let report = solve(store, &config, &cancel)?;

    if let Some(snapshot) = &snapshot {
        snapshot.persist()?;
        eprintln!(
            "[solve] snapshot written to {}",
            args.db.as_ref().map(|p| p.display().to_string()).unwrap_or_default()
        );
    }

    for (depth, count) in report.depth_counts.iter().enumerate() {
        eprintln!("[solve] depth {}: {}", depth, count);
    }
    println!(
        "[solve] {} positions enumerated to depth {}, {} scored",
        report.total_positions, report.max_depth, report.solved
    );
    match (report.opening_score, report.opening_best_move) {
        (Some(score), Some(best)) => {
            println!("[solve] opening value {score:+}, best opening move: pit {best}");
        }
        (Some(score), None) => {
            println!("[solve] opening value {score:+} (opening is terminal)");
        }
        _ => println!("[solve] cancelled before the opening was scored"),
    }

    Ok(())
}
