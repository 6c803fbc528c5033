use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::SolveConfig;
use crate::engine::apply::RulesError;
use crate::governor::MemoryMonitor;
use crate::hash::ZobristTable;
use crate::store::{PositionStore, StoreError};

pub mod bfs;
pub mod retrograde;
pub mod writer;

pub use bfs::{BfsDriver, BfsOutcome};
pub use retrograde::{RetroDriver, RetroOutcome};
pub use writer::AsyncWriter;

#[derive(Debug, Error)]
pub enum SolveError {
    #[error(transparent)]
    Rules(#[from] RulesError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("writer failure: {0}")]
    Writer(String),
    #[error("no progress at seed level {level}: {unsolved} positions remain unsolvable")]
    FixpointStalled { level: u16, unsolved: u64 },
    #[error("child {child:#018x} of {parent:#018x} is missing from the store")]
    MissingChild { parent: u64, child: u64 },
    #[error("opening position missing or unsolved after retrograde")]
    OpeningUnsolved,
}

/// Result of a completed (or cancelled) solve.
#[derive(Debug, Clone)]
pub struct SolveReport {
    /// Game value of the opening under perfect play, A store minus B store.
    /// Absent only when the solve was cancelled before retrograde finished.
    pub opening_score: Option<i8>,
    /// Optimal opening pit, absent if cancelled (or the opening is terminal).
    pub opening_best_move: Option<u8>,
    pub total_positions: u64,
    pub max_depth: u16,
    pub depth_counts: Vec<u64>,
    pub solved: u64,
    pub cancelled: bool,
}

/// Retry a store operation on transient failures: three attempts with a
/// short doubling backoff, then escalate.
pub(crate) fn with_retries<T>(
    mut op: impl FnMut() -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    let mut backoff = Duration::from_millis(10);
    let mut attempt = 0u32;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < 2 => {
                attempt += 1;
                std::thread::sleep(backoff);
                backoff *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Run the full two-phase solve: BFS enumeration, optional physical
/// reorganization by seed level, then retrograde scoring. The store is the
/// only shared mutable state; `cancel` is observed at chunk boundaries and
/// phase barriers.
pub fn solve(
    store: Arc<dyn PositionStore>,
    config: &SolveConfig,
    cancel: &AtomicBool,
) -> Result<SolveReport, SolveError> {
    let zobrist = Arc::new(ZobristTable::new(config.variant));
    let governor = MemoryMonitor::new(config.mem_warn_gb, config.mem_crit_gb);

    let bfs = BfsDriver {
        store: Arc::clone(&store),
        zobrist: Arc::clone(&zobrist),
        config,
        governor: &governor,
        cancel,
    };
    let enumeration = bfs.run()?;

    if enumeration.cancelled {
        return Ok(SolveReport {
            opening_score: None,
            opening_best_move: None,
            total_positions: enumeration.total_positions,
            max_depth: enumeration.max_depth,
            depth_counts: enumeration.depth_counts,
            solved: 0,
            cancelled: true,
        });
    }

    if config.cluster_by_level {
        with_retries(|| store.cluster_by_level())?;
    }

    let retro = RetroDriver {
        store: Arc::clone(&store),
        zobrist: Arc::clone(&zobrist),
        config,
        governor: &governor,
        cancel,
    };
    let scoring = retro.run()?;

    let opening_fp = zobrist.fingerprint(&config.variant.opening());
    let opening = with_retries(|| store.get(opening_fp))?.ok_or(SolveError::OpeningUnsolved)?;
    if !scoring.cancelled && opening.score.is_none() {
        return Err(SolveError::OpeningUnsolved);
    }

    Ok(SolveReport {
        opening_score: opening.score,
        opening_best_move: opening.best_move,
        total_positions: enumeration.total_positions,
        max_depth: enumeration.max_depth,
        depth_counts: enumeration.depth_counts,
        solved: scoring.solved,
        cancelled: scoring.cancelled,
    })
}
