use std::hash::BuildHasherDefault;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hashbrown::HashSet as HbHashSet;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use super::writer::AsyncWriter;
use super::{with_retries, SolveError};
use crate::config::SolveConfig;
use crate::engine::apply::apply_move;
use crate::governor::{MemoryMonitor, Pressure};
use crate::hash::ZobristTable;
use crate::state::unpack;
use crate::store::{PositionRecord, PositionStore};

type FastHasher = BuildHasherDefault<ahash::AHasher>;
type FastSet = HbHashSet<u64, FastHasher>;

/// Sharded concurrent fingerprint set for worker-side deduplication.
/// `try_insert` returns true only the first time a key is observed.
/// Cleared between depths; bounded by the governor's dedup cap.
pub(crate) struct SharedSeen {
    shards: Vec<Mutex<FastSet>>,
    mask: u64,
}

impl SharedSeen {
    pub(crate) fn new(shard_count: usize) -> Self {
        let sc = shard_count.next_power_of_two().max(1);
        let mut shards = Vec::with_capacity(sc);
        for _ in 0..sc {
            shards.push(Mutex::new(HbHashSet::with_hasher(FastHasher::default())));
        }
        Self {
            shards,
            mask: (sc - 1) as u64,
        }
    }

    #[inline]
    pub(crate) fn try_insert(&self, key: u64) -> bool {
        let mut guard = self.shards[(key & self.mask) as usize].lock().unwrap();
        guard.insert(key)
    }

    /// Rough count across shards (not a consistent snapshot).
    pub(crate) fn len_approx(&self) -> usize {
        self.shards.iter().map(|s| s.lock().unwrap().len()).sum()
    }

    pub(crate) fn clear(&self) {
        for shard in &self.shards {
            shard.lock().unwrap().clear();
        }
    }
}

#[derive(Debug, Clone)]
pub struct BfsOutcome {
    /// Positions stored at each depth, index = depth.
    pub depth_counts: Vec<u64>,
    pub max_depth: u16,
    pub total_positions: u64,
    pub cancelled: bool,
}

/// Depth-by-depth forward enumeration.
///
/// For each depth the frontier is streamed from the store in chunks, expanded
/// in parallel, and the children funneled through one bounded-queue writer.
/// Duplicates die either in the shared worker-side set or on the store's
/// fingerprint-uniqueness constraint, depending on the governor.
pub struct BfsDriver<'a> {
    pub store: Arc<dyn PositionStore>,
    pub zobrist: Arc<ZobristTable>,
    pub config: &'a SolveConfig,
    pub governor: &'a MemoryMonitor,
    pub cancel: &'a AtomicBool,
}

impl BfsDriver<'_> {
    pub fn run(&self) -> Result<BfsOutcome, SolveError> {
        let variant = self.config.variant;
        let opening = PositionRecord::from_state(&variant.opening(), &self.zobrist, 0);
        with_retries(|| self.store.insert_batch(std::slice::from_ref(&opening)))?;
        with_retries(|| self.store.flush())?;

        let mut depth_counts: Vec<u64> = Vec::new();
        let mut cancelled = false;

        for depth in 0u16.. {
            let frontier = with_retries(|| self.store.count_by_depth(depth))?;
            if frontier == 0 {
                break;
            }
            depth_counts.push(frontier);
            if self.cancel.load(Ordering::Acquire) {
                cancelled = true;
                break;
            }

            let new_children = self.process_depth(depth, frontier)?;
            // Barrier: depth d+1 is not consulted until all writes landed.
            with_retries(|| self.store.flush())?;
            eprintln!(
                "[bfs] depth {}: {} parents, {} new positions",
                depth, frontier, new_children
            );

            if self.cancel.load(Ordering::Acquire) {
                cancelled = true;
                break;
            }
        }

        let total_positions = depth_counts.iter().sum();
        let max_depth = depth_counts.len().saturating_sub(1) as u16;
        Ok(BfsOutcome {
            depth_counts,
            max_depth,
            total_positions,
            cancelled,
        })
    }

    /// Expand every parent at `depth`; returns the number of newly stored
    /// children.
    fn process_depth(&self, depth: u16, frontier: u64) -> Result<u64, SolveError> {
        let variant = self.config.variant;
        let writer = AsyncWriter::spawn(Arc::clone(&self.store), self.config.queue_capacity);
        let seen = SharedSeen::new(256);
        // Worker-side dedup saves store traffic while memory allows; the
        // store's uniqueness constraint stays authoritative either way.
        let mut use_worker_dedup = self.governor.pressure() != Pressure::Critical;

        let pb = ProgressBar::new(frontier);
        pb.set_style(
            ProgressStyle::with_template(&format!(
                "[{{elapsed_precise}}] bfs d={depth} {{bar:40.cyan/blue}} {{pos}}/{{len}}"
            ))
            .unwrap()
            .progress_chars("=>-"),
        );

        let workers = self.config.worker_count.max(1);
        let mut offset = 0u64;
        let mut worker_error: Option<SolveError> = None;

        while offset < frontier {
            if self.cancel.load(Ordering::Acquire) {
                break;
            }

            let dedup_cap = match self.governor.pressure() {
                Pressure::Normal => self.config.dedup_set_max,
                Pressure::Throttled => (self.config.dedup_set_max / 2).max(1),
                Pressure::Critical => 0,
            };
            if use_worker_dedup && dedup_cap == 0 {
                // Critical pressure: shed the dedup set and let the writer
                // catch up before dispatching more work.
                seen.clear();
                use_worker_dedup = false;
                std::thread::sleep(Duration::from_millis(100));
            }

            let chunk_limit = self.governor.scaled(self.config.chunk_size);
            let parents =
                with_retries(|| self.store.scan_by_depth(depth, offset, chunk_limit))?;
            if parents.is_empty() {
                break;
            }
            offset += parents.len() as u64;

            let handle = writer.handle();
            let seen_ref = use_worker_dedup.then_some(&seen);
            let zobrist = &self.zobrist;
            let sub = parents.len().div_ceil(workers).max(1);

            let result: Result<(), SolveError> = parents
                .par_chunks(sub)
                .try_for_each(|chunk| {
                    let mut out: Vec<PositionRecord> = Vec::with_capacity(chunk.len());
                    for parent in chunk {
                        let parent_state = unpack(&parent.packed, variant)?;
                        for mv in parent_state.legal_moves() {
                            let child = apply_move(&parent_state, mv)?;
                            let fingerprint = zobrist.fingerprint(&child);
                            if let Some(seen) = seen_ref {
                                if !seen.try_insert(fingerprint) {
                                    continue;
                                }
                            }
                            out.push(PositionRecord {
                                fingerprint,
                                packed: child.pack(),
                                depth: depth + 1,
                                seed_level: child.seed_level(),
                                score: None,
                                best_move: None,
                            });
                        }
                    }
                    if !out.is_empty() {
                        handle.put(out)?;
                    }
                    Ok(())
                });

            pb.inc(parents.len() as u64);

            if let Err(e) = result {
                worker_error = Some(e);
                break;
            }

            if use_worker_dedup && seen.len_approx() > dedup_cap {
                // Set overflowed its budget; fall back to store-side dedup
                // for the rest of this depth.
                seen.clear();
                use_worker_dedup = false;
            }
        }

        pb.finish_and_clear();
        let finish_result = writer.finish();
        if let Some(e) = worker_error {
            return Err(e);
        }
        finish_result
    }
}
