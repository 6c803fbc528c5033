use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use super::{with_retries, SolveError};
use crate::config::SolveConfig;
use crate::engine::apply::{apply_move, RulesError};
use crate::engine::score::payoff;
use crate::governor::MemoryMonitor;
use crate::hash::ZobristTable;
use crate::state::unpack;
use crate::store::{PositionRecord, PositionStore};
use crate::types::Player;

#[derive(Debug, Clone)]
pub struct RetroOutcome {
    pub solved: u64,
    /// Most fixpoint passes any single level needed.
    pub max_passes: u32,
    pub cancelled: bool,
}

enum Eval {
    /// Some child is not scored yet; retry on a later pass.
    Pending,
    Solved {
        fingerprint: u64,
        score: i8,
        best_move: Option<u8>,
    },
}

/// Retrograde minimax by seed level.
///
/// Levels run 0..=2ps ascending: a move never increases the seed level, so a
/// position's children live at the same level or below. Each level iterates
/// to a fixpoint; a pass that solves nothing while unsolved positions remain
/// means a missing child or a rules bug, and aborts.
pub struct RetroDriver<'a> {
    pub store: Arc<dyn PositionStore>,
    pub zobrist: Arc<ZobristTable>,
    pub config: &'a SolveConfig,
    pub governor: &'a MemoryMonitor,
    pub cancel: &'a AtomicBool,
}

impl RetroDriver<'_> {
    pub fn run(&self) -> Result<RetroOutcome, SolveError> {
        let mut solved_total = 0u64;
        let mut max_passes = 0u32;

        for level in 0..=self.config.variant.total_seeds() {
            let level_total = with_retries(|| self.store.count_by_level(level))?;
            if level_total == 0 {
                continue;
            }
            let mut unsolved = with_retries(|| self.store.count_unsolved_by_level(level))?;
            if unsolved == 0 {
                continue;
            }

            let pb = ProgressBar::new(unsolved);
            pb.set_style(
                ProgressStyle::with_template(&format!(
                    "[{{elapsed_precise}}] retro L={level} {{bar:40.cyan/blue}} {{pos}}/{{len}}"
                ))
                .unwrap()
                .progress_chars("=>-"),
            );

            let mut passes = 0u32;
            while unsolved > 0 {
                if self.cancel.load(Ordering::Acquire) {
                    pb.finish_and_clear();
                    with_retries(|| self.store.flush())?;
                    return Ok(RetroOutcome {
                        solved: solved_total,
                        max_passes,
                        cancelled: true,
                    });
                }
                passes += 1;
                solved_total += self.run_pass(level, level_total, &pb)?;

                let remaining = with_retries(|| self.store.count_unsolved_by_level(level))?;
                if remaining == unsolved {
                    pb.finish_and_clear();
                    return Err(SolveError::FixpointStalled {
                        level,
                        unsolved: remaining,
                    });
                }
                unsolved = remaining;
            }
            pb.finish_and_clear();

            // Barrier: level L is fully durable before L+1 starts.
            with_retries(|| self.store.flush())?;
            max_passes = max_passes.max(passes);
            eprintln!(
                "[retro] level {}: {} positions solved in {} pass(es)",
                level, level_total, passes
            );
        }

        Ok(RetroOutcome {
            solved: solved_total,
            max_passes,
            cancelled: false,
        })
    }

    /// One pass over the unsolved records at `level`. Workers evaluate in
    /// parallel and never write; the driver is the single drain point that
    /// applies score updates.
    fn run_pass(&self, level: u16, level_total: u64, pb: &ProgressBar) -> Result<u64, SolveError> {
        // The governor halves the fetch window under memory pressure.
        let limit = self.governor.scaled(self.config.batch_size);
        let workers = self.config.worker_count.max(1);
        let mut solved = 0u64;
        let mut offset = 0u64;

        while offset < level_total {
            let batch = with_retries(|| self.store.scan_unsolved_by_level(level, offset, limit))?;
            offset += limit as u64;
            if batch.is_empty() {
                continue;
            }

            let sub = batch.len().div_ceil(workers).max(1);
            let evals: Vec<Vec<Eval>> = batch
                .par_chunks(sub)
                .map(|chunk| {
                    chunk
                        .iter()
                        .map(|rec| self.evaluate(rec))
                        .collect::<Result<Vec<_>, SolveError>>()
                })
                .collect::<Result<Vec<_>, SolveError>>()?;

            for eval in evals.into_iter().flatten() {
                if let Eval::Solved {
                    fingerprint,
                    score,
                    best_move,
                } = eval
                {
                    with_retries(|| self.store.update_score(fingerprint, score, best_move))?;
                    solved += 1;
                    pb.inc(1);
                }
            }
        }

        Ok(solved)
    }

    /// Minimax one position against its children's stored scores.
    /// Scores are A-relative: A maximizes, B minimizes. Ties keep the lowest
    /// pit index by iterating moves in ascending order and replacing only on
    /// strict improvement.
    fn evaluate(&self, rec: &PositionRecord) -> Result<Eval, SolveError> {
        let state = unpack(&rec.packed, self.config.variant)?;
        if state.is_terminal() {
            return Ok(Eval::Solved {
                fingerprint: rec.fingerprint,
                score: payoff(&state),
                best_move: None,
            });
        }

        let maximizing = state.to_move == Player::A;
        let mut best: Option<(i8, u8)> = None;
        for mv in state.legal_moves() {
            let child = apply_move(&state, mv)?;
            let child_fp = self.zobrist.fingerprint(&child);
            let child_rec = with_retries(|| self.store.get(child_fp))?.ok_or(
                SolveError::MissingChild {
                    parent: rec.fingerprint,
                    child: child_fp,
                },
            )?;
            debug_assert_eq!(
                child_rec.packed,
                child.pack(),
                "fingerprint collision between distinct states"
            );
            let Some(child_score) = child_rec.score else {
                return Ok(Eval::Pending);
            };
            best = match best {
                None => Some((child_score, mv)),
                Some((current, _))
                    if (maximizing && child_score > current)
                        || (!maximizing && child_score < current) =>
                {
                    Some((child_score, mv))
                }
                keep => keep,
            };
        }

        let (score, best_move) = best.ok_or_else(|| {
            SolveError::Rules(RulesError::MalformedState(
                "non-terminal position with no legal moves".into(),
            ))
        })?;
        Ok(Eval::Solved {
            fingerprint: rec.fingerprint,
            score,
            best_move: Some(best_move),
        })
    }
}
