use serde::{Deserialize, Serialize};

use crate::rules::Variant;

/// Tunables for a full solve. The engine takes this struct as-is; mapping it
/// from flags or a config file is the CLI's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveConfig {
    /// Variant dimensions (p pits per side, s seeds per pit).
    pub variant: Variant,
    /// Parallelism upper bound for BFS expansion and retrograde evaluation.
    #[serde(default = "default_workers")]
    pub worker_count: usize,
    /// Parent positions fetched per BFS dispatch.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Unsolved positions fetched per retrograde pass window.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Cap on the shared worker-side fingerprint dedup set.
    #[serde(default = "default_dedup_set_max")]
    pub dedup_set_max: usize,
    /// Write-queue depth, in batches.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Free-memory warning threshold, GiB.
    #[serde(default = "default_mem_warn_gb")]
    pub mem_warn_gb: f64,
    /// Free-memory critical threshold, GiB.
    #[serde(default = "default_mem_crit_gb")]
    pub mem_crit_gb: f64,
    /// Relax per-barrier durability; the store is rebuilt from scratch after
    /// a crash in this mode.
    #[serde(default)]
    pub fast_mode: bool,
    /// Ask the store to cluster its physical layout by seed level between the
    /// two phases.
    #[serde(default = "default_true")]
    pub cluster_by_level: bool,
}

impl SolveConfig {
    pub fn for_variant(variant: Variant) -> Self {
        Self {
            variant,
            worker_count: default_workers(),
            chunk_size: default_chunk_size(),
            batch_size: default_batch_size(),
            dedup_set_max: default_dedup_set_max(),
            queue_capacity: default_queue_capacity(),
            mem_warn_gb: default_mem_warn_gb(),
            mem_crit_gb: default_mem_crit_gb(),
            fast_mode: false,
            cluster_by_level: true,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(4, usize::from)
}

fn default_chunk_size() -> usize {
    100_000
}

fn default_batch_size() -> usize {
    100_000
}

fn default_dedup_set_max() -> usize {
    10_000_000
}

fn default_queue_capacity() -> usize {
    1_000
}

fn default_mem_warn_gb() -> f64 {
    4.0
}

fn default_mem_crit_gb() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}
