use std::path::PathBuf;

use clap::Parser;

use kalahari::{apply_move, Compression, PositionStore, SnapshotStore, ZobristTable};

#[derive(Debug, Parser)]
#[command(name = "inspect", about = "Summarize a solved Kalah position database")]
struct Args {
    /// Snapshot path produced by `solve --db`
    #[arg(long)]
    db: PathBuf,

    /// Replay the perfect-play line from the opening, printing each board
    #[arg(long)]
    line: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let store = SnapshotStore::open(&args.db, Compression::Zstd, false)
        .map_err(|e| format!("failed to open {}: {e}", args.db.display()))?;
    let header = store.header();
    let variant = header.variant;
    let zobrist = ZobristTable::with_seed(variant, header.zobrist_seed);

    println!(
        "[inspect] Kalah({},{}): {} stored positions",
        variant.pits,
        variant.seeds,
        store.len()
    );

    if let Some(max_depth) = store.max_depth()? {
        println!("[inspect] positions by depth:");
        for depth in 0..=max_depth {
            let count = store.count_by_depth(depth)?;
            if count > 0 {
                println!("  depth {:>3}: {:>12}", depth, count);
            }
        }
    }

    println!("[inspect] positions by seed level:");
    let mut unsolved_total = 0u64;
    for level in 0..=variant.total_seeds() {
        let count = store.count_by_level(level)?;
        if count == 0 {
            continue;
        }
        let unsolved = store.count_unsolved_by_level(level)?;
        unsolved_total += unsolved;
        println!("  level {:>3}: {:>12}  ({} unsolved)", level, count, unsolved);
    }
    if unsolved_total > 0 {
        println!("[inspect] database is partially solved: {unsolved_total} positions open");
    }

    let opening = variant.opening();
    let opening_rec = store.get(zobrist.fingerprint(&opening))?;
    match &opening_rec {
        None => println!("[inspect] opening position not present"),
        Some(rec) => match (rec.score, rec.best_move) {
            (Some(score), Some(best)) => {
                println!("[inspect] opening value {score:+}, best opening move: pit {best}");
            }
            (Some(score), None) => println!("[inspect] opening value {score:+} (terminal)"),
            _ => println!("[inspect] opening not yet scored"),
        },
    }

    if args.line {
        println!("[inspect] perfect-play line:");
        let mut state = opening;
        // Extra-turn chains make lines long but finite; the cap catches a
        // corrupt best_move cycle.
        for ply in 0.. {
            let rec = store
                .get(zobrist.fingerprint(&state))?
                .ok_or("line walked off the stored graph")?;
            match rec.score {
                Some(score) => println!("-- ply {ply}, value {score:+}"),
                None => {
                    println!("-- ply {ply}, unscored; stopping");
                    break;
                }
            }
            println!("{state}");
            let Some(best) = rec.best_move else { break };
            state = apply_move(&state, best)?;
            if ply >= 1_000 {
                return Err("perfect-play line exceeded 1000 plies".into());
            }
        }
    }

    Ok(())
}
