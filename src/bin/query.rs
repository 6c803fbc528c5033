use std::path::PathBuf;

use clap::Parser;

use kalahari::{
    Compression, GameState, Player, PositionStore, SnapshotStore, ZobristTable,
};

#[derive(Debug, Parser)]
#[command(name = "query", about = "Query a solved Kalah position database")]
struct Args {
    /// Snapshot path produced by `solve --db`
    #[arg(long)]
    db: PathBuf,

    /// Position cells as a comma-separated list in board order, e.g.
    /// "4,4,4,4,4,4,0,4,4,4,4,4,4,0". Defaults to the opening position.
    #[arg(long)]
    cells: Option<String>,

    /// Side to move: A or B
    #[arg(long, default_value = "A")]
    to_move: String,
}

fn parse_cells(spec: &str) -> Result<Vec<u8>, String> {
    spec.split(',')
        .map(|tok| {
            tok.trim()
                .parse::<u8>()
                .map_err(|e| format!("invalid cell value '{}': {e}", tok.trim()))
        })
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let store = SnapshotStore::open(&args.db, Compression::Zstd, false)
        .map_err(|e| format!("failed to open {}: {e}", args.db.display()))?;
    let header = store.header();
    let variant = header.variant;
    let zobrist = ZobristTable::with_seed(variant, header.zobrist_seed);

    let to_move = match args.to_move.trim() {
        "A" | "a" => Player::A,
        "B" | "b" => Player::B,
        other => return Err(format!("unknown side '{other}', expected A or B").into()),
    };

    let state = match &args.cells {
        None => variant.opening(),
        Some(spec) => {
            let cells = parse_cells(spec)?;
            if cells.len() != variant.cell_count() {
                return Err(format!(
                    "expected {} cells for Kalah({},{}), got {}",
                    variant.cell_count(),
                    variant.pits,
                    variant.seeds,
                    cells.len()
                )
                .into());
            }
            GameState::new(variant, cells, to_move)
        }
    };

    let fingerprint = zobrist.fingerprint(&state);
    println!(
        "[query] Kalah({},{}) fingerprint {fingerprint:#018x}",
        variant.pits, variant.seeds
    );
    println!("{state}");

    match store.get(fingerprint)? {
        None => println!("[query] position not present in the database"),
        Some(rec) => {
            println!("[query] depth {}, seed level {}", rec.depth, rec.seed_level);
            match rec.score {
                None => println!("[query] not yet scored"),
                Some(score) => match rec.best_move {
                    Some(best) => println!("[query] value {score:+}, best move: pit {best}"),
                    None => println!("[query] value {score:+} (terminal)"),
                },
            }
        }
    }

    Ok(())
}
