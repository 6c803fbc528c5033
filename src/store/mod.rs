use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hash::ZobristTable;
use crate::state::GameState;

pub mod memory;
pub mod snapshot;

pub use memory::MemoryStore;
pub use snapshot::{Compression, SnapshotHeader, SnapshotStore};

/// One stored position. `depth` and `seed_level` are fixed at insertion;
/// `score` and `best_move` transition from absent to present exactly once,
/// during the retrograde phase. Records are never deleted during a solve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRecord {
    /// Zobrist fingerprint; the store's primary key.
    pub fingerprint: u64,
    /// Compact byte encoding of (cells, side-to-move); see `GameState::pack`.
    pub packed: Vec<u8>,
    /// BFS ply distance from the opening.
    pub depth: u16,
    /// Seeds in pits (stores excluded) at insertion time.
    pub seed_level: u16,
    /// Perfect-play value, A's store minus B's store. Absent until solved.
    pub score: Option<i8>,
    /// Board index of the pit the side to move should play; absent until
    /// solved, and absent on terminal positions.
    pub best_move: Option<u8>,
}

impl PositionRecord {
    pub fn from_state(state: &GameState, zobrist: &ZobristTable, depth: u16) -> Self {
        Self {
            fingerprint: zobrist.fingerprint(state),
            packed: state.pack(),
            depth,
            seed_level: state.seed_level(),
            score: None,
            best_move: None,
        }
    }

    #[inline]
    pub fn is_solved(&self) -> bool {
        self.score.is_some()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt database: {0}")]
    Corrupt(String),
    #[error("transient store failure: {0}")]
    Retryable(String),
    #[error("database mismatch: {0}")]
    Mismatch(String),
}

impl StoreError {
    /// Whether the driver should retry the operation (short backoff, bounded
    /// attempts) before escalating.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Retryable(_))
    }
}

/// Capability set of a position store backend.
///
/// Concurrency contract: any number of reader tasks plus a single writer task.
/// Keeping writers unique is the driver's job, not the store's.
///
/// Scan offsets index the store's per-depth (resp. per-level) insertion
/// order, which only ever grows during a solve, so pagination by
/// `offset += limit` is stable while the writer appends elsewhere.
/// `scan_unsolved_by_level` filters its window, so a short (even empty)
/// result does not mean the level is exhausted; paginate up to
/// `count_by_level`.
pub trait PositionStore: Send + Sync {
    /// Insert every record whose fingerprint is not already present; silently
    /// skip the rest. Returns the number of newly inserted records. Atomic
    /// per record, not across the batch.
    fn insert_batch(&self, records: &[PositionRecord]) -> Result<u64, StoreError>;

    fn exists(&self, fingerprint: u64) -> Result<bool, StoreError>;

    fn get(&self, fingerprint: u64) -> Result<Option<PositionRecord>, StoreError>;

    fn scan_by_depth(
        &self,
        depth: u16,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<PositionRecord>, StoreError>;

    fn scan_unsolved_by_level(
        &self,
        level: u16,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<PositionRecord>, StoreError>;

    fn count_by_depth(&self, depth: u16) -> Result<u64, StoreError>;

    fn count_by_level(&self, level: u16) -> Result<u64, StoreError>;

    fn count_unsolved_by_level(&self, level: u16) -> Result<u64, StoreError>;

    /// Set the score fields of an existing record. Idempotent when called
    /// again with equal values; a conflicting second write is corruption.
    fn update_score(
        &self,
        fingerprint: u64,
        score: i8,
        best_move: Option<u8>,
    ) -> Result<(), StoreError>;

    fn max_depth(&self) -> Result<Option<u16>, StoreError>;

    /// Advisory: reorganize physical layout by seed level to speed up the
    /// retrograde scans. Affects performance only, never correctness.
    fn cluster_by_level(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Durably persist all prior writes.
    fn flush(&self) -> Result<(), StoreError>;
}
