use std::hash::BuildHasherDefault;
use std::sync::Mutex;

use hashbrown::HashMap as HbHashMap;

use super::{PositionRecord, PositionStore, StoreError};

type FastHasher = BuildHasherDefault<ahash::AHasher>;
type FastMap = HbHashMap<u64, PositionRecord, FastHasher>;

/// Iteration order for full-store walks (snapshot writing).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrder {
    Depth,
    Level,
}

/// Sharded in-memory backend.
///
/// Records live in `shard_count` mutex-guarded hash maps keyed by
/// fingerprint; two append-only secondary indexes record insertion order per
/// depth and per seed level. Shard count is rounded up to a power of two.
#[derive(Debug)]
pub struct MemoryStore {
    shards: Vec<Mutex<FastMap>>,
    mask: u64,
    by_depth: Mutex<Vec<Vec<u64>>>,
    by_level: Mutex<Vec<Vec<u64>>>,
    unsolved: Mutex<Vec<u64>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_shards(64)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shards(shard_count: usize) -> Self {
        let sc = shard_count.next_power_of_two().max(1);
        let mut shards = Vec::with_capacity(sc);
        for _ in 0..sc {
            shards.push(Mutex::new(HbHashMap::with_hasher(FastHasher::default())));
        }
        Self {
            shards,
            mask: (sc - 1) as u64,
            by_depth: Mutex::new(Vec::new()),
            by_level: Mutex::new(Vec::new()),
            unsolved: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    fn shard(&self, fingerprint: u64) -> &Mutex<FastMap> {
        &self.shards[(fingerprint & self.mask) as usize]
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().unwrap().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn window(index: &[Vec<u64>], key: usize, offset: u64, limit: usize) -> Vec<u64> {
        match index.get(key) {
            None => Vec::new(),
            Some(list) => {
                let start = (offset as usize).min(list.len());
                let end = start.saturating_add(limit).min(list.len());
                list[start..end].to_vec()
            }
        }
    }

    fn fetch(&self, fingerprints: &[u64]) -> Vec<PositionRecord> {
        let mut out = Vec::with_capacity(fingerprints.len());
        for &fp in fingerprints {
            if let Some(rec) = self.shard(fp).lock().unwrap().get(&fp) {
                out.push(rec.clone());
            }
        }
        out
    }

    /// Visit every record in depth or level order. Used by the snapshot layer
    /// to stream records out without materializing the whole store at once.
    pub(crate) fn for_each_ordered(
        &self,
        order: ScanOrder,
        f: &mut dyn FnMut(&PositionRecord) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let groups: Vec<Vec<u64>> = match order {
            ScanOrder::Depth => self.by_depth.lock().unwrap().clone(),
            ScanOrder::Level => self.by_level.lock().unwrap().clone(),
        };
        for group in groups {
            for fp in group {
                if let Some(rec) = self.shard(fp).lock().unwrap().get(&fp) {
                    f(rec)?;
                }
            }
        }
        Ok(())
    }
}

impl PositionStore for MemoryStore {
    fn insert_batch(&self, records: &[PositionRecord]) -> Result<u64, StoreError> {
        let mut inserted = 0u64;
        for rec in records {
            {
                let mut shard = self.shard(rec.fingerprint).lock().unwrap();
                if shard.contains_key(&rec.fingerprint) {
                    continue;
                }
                shard.insert(rec.fingerprint, rec.clone());
            }
            inserted += 1;
            let depth = rec.depth as usize;
            let level = rec.seed_level as usize;
            {
                let mut by_depth = self.by_depth.lock().unwrap();
                if by_depth.len() <= depth {
                    by_depth.resize_with(depth + 1, Vec::new);
                }
                by_depth[depth].push(rec.fingerprint);
            }
            {
                let mut by_level = self.by_level.lock().unwrap();
                if by_level.len() <= level {
                    by_level.resize_with(level + 1, Vec::new);
                }
                by_level[level].push(rec.fingerprint);
            }
            if !rec.is_solved() {
                let mut unsolved = self.unsolved.lock().unwrap();
                if unsolved.len() <= level {
                    unsolved.resize(level + 1, 0);
                }
                unsolved[level] += 1;
            }
        }
        Ok(inserted)
    }

    fn exists(&self, fingerprint: u64) -> Result<bool, StoreError> {
        Ok(self.shard(fingerprint).lock().unwrap().contains_key(&fingerprint))
    }

    fn get(&self, fingerprint: u64) -> Result<Option<PositionRecord>, StoreError> {
        Ok(self.shard(fingerprint).lock().unwrap().get(&fingerprint).cloned())
    }

    fn scan_by_depth(
        &self,
        depth: u16,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<PositionRecord>, StoreError> {
        let fps = Self::window(&self.by_depth.lock().unwrap(), depth as usize, offset, limit);
        Ok(self.fetch(&fps))
    }

    fn scan_unsolved_by_level(
        &self,
        level: u16,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<PositionRecord>, StoreError> {
        let fps = Self::window(&self.by_level.lock().unwrap(), level as usize, offset, limit);
        let mut out = self.fetch(&fps);
        out.retain(|rec| !rec.is_solved());
        Ok(out)
    }

    fn count_by_depth(&self, depth: u16) -> Result<u64, StoreError> {
        let by_depth = self.by_depth.lock().unwrap();
        Ok(by_depth.get(depth as usize).map_or(0, |l| l.len() as u64))
    }

    fn count_by_level(&self, level: u16) -> Result<u64, StoreError> {
        let by_level = self.by_level.lock().unwrap();
        Ok(by_level.get(level as usize).map_or(0, |l| l.len() as u64))
    }

    fn count_unsolved_by_level(&self, level: u16) -> Result<u64, StoreError> {
        let unsolved = self.unsolved.lock().unwrap();
        Ok(unsolved.get(level as usize).copied().unwrap_or(0))
    }

    fn update_score(
        &self,
        fingerprint: u64,
        score: i8,
        best_move: Option<u8>,
    ) -> Result<(), StoreError> {
        let level;
        {
            let mut shard = self.shard(fingerprint).lock().unwrap();
            let Some(rec) = shard.get_mut(&fingerprint) else {
                return Err(StoreError::Corrupt(format!(
                    "update_score for unknown fingerprint {fingerprint:#018x}"
                )));
            };
            match rec.score {
                Some(existing) => {
                    // Idempotent when the values match.
                    if existing == score && rec.best_move == best_move {
                        return Ok(());
                    }
                    return Err(StoreError::Corrupt(format!(
                        "conflicting re-score of {fingerprint:#018x}: {existing} vs {score}"
                    )));
                }
                None => {
                    rec.score = Some(score);
                    rec.best_move = best_move;
                    level = rec.seed_level as usize;
                }
            }
        }
        let mut unsolved = self.unsolved.lock().unwrap();
        debug_assert!(unsolved.get(level).copied().unwrap_or(0) > 0);
        unsolved[level] -= 1;
        Ok(())
    }

    fn max_depth(&self) -> Result<Option<u16>, StoreError> {
        let by_depth = self.by_depth.lock().unwrap();
        Ok(by_depth
            .iter()
            .enumerate()
            .rev()
            .find(|(_, l)| !l.is_empty())
            .map(|(d, _)| d as u16))
    }

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
