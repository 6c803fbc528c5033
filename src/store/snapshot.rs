use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crc32fast::Hasher as Crc32;
use serde::{Deserialize, Serialize};

use super::memory::{MemoryStore, ScanOrder};
use super::{PositionRecord, PositionStore, StoreError};
use crate::rules::Variant;

const SNAPSHOT_MAGIC: [u8; 8] = *b"KALADB01";
pub const FORMAT_VERSION: u32 = 1;

/// Records per frame before the writer cuts a new one.
const FRAME_RECORDS: usize = 65_536;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compression {
    None,
    Lz4,
    Zstd,
}

impl Compression {
    #[inline]
    fn tag(self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Lz4 => 1,
            Compression::Zstd => 2,
        }
    }

    #[inline]
    fn from_tag(tag: u8) -> Result<Self, StoreError> {
        match tag {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Lz4),
            2 => Ok(Compression::Zstd),
            _ => Err(StoreError::Corrupt(format!("unknown compression tag {tag}"))),
        }
    }
}

/// Snapshot header: enough to reject a database built for a different game or
/// hashed with a different table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub variant: Variant,
    pub zobrist_seed: u64,
}

/// Streaming frame writer for the snapshot format:
/// magic, version, compression tag, header blob, then sequenced frames of
/// `seq:u64, comp:u8, ulen:u64, clen:u64, crc:u32, body` where the CRC covers
/// the uncompressed payload (bincode `Vec<PositionRecord>`).
struct FrameWriter {
    out: BufWriter<File>,
    compression: Compression,
    buf: Vec<PositionRecord>,
    next_seq: u64,
}

impl FrameWriter {
    fn create(path: &Path, header: &SnapshotHeader, compression: Compression) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(path)?;
        let mut out = BufWriter::new(file);

        out.write_all(&SNAPSHOT_MAGIC)?;
        out.write_all(&FORMAT_VERSION.to_le_bytes())?;
        out.write_all(&[compression.tag()])?;
        let header_bytes = bincode::serialize(header)
            .map_err(|e| StoreError::Corrupt(format!("header serialize: {e}")))?;
        out.write_all(&(header_bytes.len() as u32).to_le_bytes())?;
        out.write_all(&header_bytes)?;

        Ok(Self {
            out,
            compression,
            buf: Vec::with_capacity(FRAME_RECORDS),
            next_seq: 0,
        })
    }

    fn push(&mut self, record: &PositionRecord) -> Result<(), StoreError> {
        self.buf.push(record.clone());
        if self.buf.len() >= FRAME_RECORDS {
            self.flush_frame()?;
        }
        Ok(())
    }

    fn flush_frame(&mut self) -> Result<(), StoreError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let payload = bincode::serialize(&self.buf)
            .map_err(|e| StoreError::Corrupt(format!("frame serialize: {e}")))?;

        let mut hasher = Crc32::new();
        hasher.update(&payload);
        let crc = hasher.finalize();
        let ulen = payload.len() as u64;

        let body = match self.compression {
            Compression::None => payload,
            Compression::Lz4 => lz4_flex::block::compress(&payload),
            Compression::Zstd => zstd::encode_all(std::io::Cursor::new(&payload), 3)
                .map_err(|e| StoreError::Corrupt(format!("zstd encode: {e}")))?,
        };

        self.out.write_all(&self.next_seq.to_le_bytes())?;
        self.out.write_all(&[self.compression.tag()])?;
        self.out.write_all(&ulen.to_le_bytes())?;
        self.out.write_all(&(body.len() as u64).to_le_bytes())?;
        self.out.write_all(&crc.to_le_bytes())?;
        self.out.write_all(&body)?;

        self.next_seq = self.next_seq.saturating_add(1);
        self.buf.clear();
        Ok(())
    }

    fn finish(mut self, sync: bool) -> Result<(), StoreError> {
        self.flush_frame()?;
        self.out.flush()?;
        if sync {
            self.out.get_ref().sync_all()?;
        }
        Ok(())
    }
}

struct FrameReader {
    input: BufReader<File>,
    header: SnapshotHeader,
    next_seq_expected: u64,
}

impl FrameReader {
    fn open(path: &Path) -> Result<Self, StoreError> {
        let file = OpenOptions::new().read(true).open(path)?;
        let mut input = BufReader::new(file);

        let mut magic = [0u8; 8];
        input.read_exact(&mut magic)?;
        if magic != SNAPSHOT_MAGIC {
            return Err(StoreError::Corrupt("invalid snapshot magic".into()));
        }

        let mut version = [0u8; 4];
        input.read_exact(&mut version)?;
        let version = u32::from_le_bytes(version);
        if version != FORMAT_VERSION {
            return Err(StoreError::Mismatch(format!(
                "snapshot format version {version}, expected {FORMAT_VERSION}"
            )));
        }

        // Default compression tag; frames carry their own.
        let mut comp = [0u8; 1];
        input.read_exact(&mut comp)?;
        Compression::from_tag(comp[0])?;

        let mut header_len = [0u8; 4];
        input.read_exact(&mut header_len)?;
        let mut header_bytes = vec![0u8; u32::from_le_bytes(header_len) as usize];
        input.read_exact(&mut header_bytes)?;
        let header: SnapshotHeader = bincode::deserialize(&header_bytes)
            .map_err(|e| StoreError::Corrupt(format!("header deserialize: {e}")))?;

        Ok(Self {
            input,
            header,
            next_seq_expected: 0,
        })
    }

    /// Reads the next frame; `Ok(None)` at end of file.
    fn read_next_frame(&mut self) -> Result<Option<Vec<PositionRecord>>, StoreError> {
        let mut seq_bytes = [0u8; 8];
        match self.input.read_exact(&mut seq_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let seq = u64::from_le_bytes(seq_bytes);
        if seq != self.next_seq_expected {
            return Err(StoreError::Corrupt(format!(
                "frame sequence mismatch: got {seq}, expected {}",
                self.next_seq_expected
            )));
        }

        let mut comp = [0u8; 1];
        self.input.read_exact(&mut comp)?;
        let compression = Compression::from_tag(comp[0])?;

        let mut ulen = [0u8; 8];
        self.input.read_exact(&mut ulen)?;
        let ulen = u64::from_le_bytes(ulen) as usize;

        let mut clen = [0u8; 8];
        self.input.read_exact(&mut clen)?;
        let clen = u64::from_le_bytes(clen) as usize;

        let mut crc_bytes = [0u8; 4];
        self.input.read_exact(&mut crc_bytes)?;
        let crc_expected = u32::from_le_bytes(crc_bytes);

        let mut body = vec![0u8; clen];
        self.input.read_exact(&mut body)?;

        let payload = match compression {
            Compression::None => body,
            Compression::Lz4 => lz4_flex::block::decompress(&body, ulen)
                .map_err(|e| StoreError::Corrupt(format!("lz4 decompress: {e}")))?,
            Compression::Zstd => zstd::decode_all(std::io::Cursor::new(&body))
                .map_err(|e| StoreError::Corrupt(format!("zstd decode: {e}")))?,
        };
        if payload.len() != ulen {
            return Err(StoreError::Corrupt(format!(
                "frame payload length {} differs from recorded {ulen}",
                payload.len()
            )));
        }

        let mut hasher = Crc32::new();
        hasher.update(&payload);
        if hasher.finalize() != crc_expected {
            return Err(StoreError::Corrupt("crc mismatch on frame payload".into()));
        }

        let records: Vec<PositionRecord> = bincode::deserialize(&payload)
            .map_err(|e| StoreError::Corrupt(format!("frame deserialize: {e}")))?;
        self.next_seq_expected = self.next_seq_expected.saturating_add(1);
        Ok(Some(records))
    }
}

/// Durable backend: a [`MemoryStore`] whose contents are persisted to a
/// framed snapshot file.
///
/// `flush()` rewrites the snapshot (temp file + rename) and fsyncs, unless
/// `fast_mode` is set, in which case intermediate flushes are skipped and the
/// database is only written by an explicit [`SnapshotStore::persist`]; a
/// crash then costs the whole run, which is re-derived from scratch.
#[derive(Debug)]
pub struct SnapshotStore {
    inner: MemoryStore,
    path: PathBuf,
    header: SnapshotHeader,
    compression: Compression,
    fast_mode: bool,
    dirty: AtomicBool,
    clustered: AtomicBool,
}

impl SnapshotStore {
    pub fn create(
        path: impl Into<PathBuf>,
        header: SnapshotHeader,
        compression: Compression,
        fast_mode: bool,
    ) -> Self {
        Self {
            inner: MemoryStore::new(),
            path: path.into(),
            header,
            compression,
            fast_mode,
            dirty: AtomicBool::new(false),
            clustered: AtomicBool::new(false),
        }
    }

    /// Load an existing snapshot, verifying format, CRCs, and header.
    pub fn open(
        path: impl Into<PathBuf>,
        compression: Compression,
        fast_mode: bool,
    ) -> Result<Self, StoreError> {
        let path = path.into();
        let mut reader = FrameReader::open(&path)?;
        let header = reader.header;
        let inner = MemoryStore::new();
        while let Some(records) = reader.read_next_frame()? {
            inner.insert_batch(&records)?;
        }
        Ok(Self {
            inner,
            path,
            header,
            compression,
            fast_mode,
            dirty: AtomicBool::new(false),
            clustered: AtomicBool::new(false),
        })
    }

    /// Open the snapshot at `path` if it exists (refusing a header that does
    /// not match), otherwise start empty.
    pub fn open_or_create(
        path: impl Into<PathBuf>,
        header: SnapshotHeader,
        compression: Compression,
        fast_mode: bool,
    ) -> Result<Self, StoreError> {
        let path = path.into();
        if path.exists() {
            let store = Self::open(path, compression, fast_mode)?;
            if store.header != header {
                return Err(StoreError::Mismatch(format!(
                    "snapshot was built for Kalah({},{}) with zobrist seed {:#x}",
                    store.header.variant.pits, store.header.variant.seeds, store.header.zobrist_seed
                )));
            }
            Ok(store)
        } else {
            Ok(Self::create(path, header, compression, fast_mode))
        }
    }

    #[inline]
    pub fn header(&self) -> SnapshotHeader {
        self.header
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Write the snapshot unconditionally: temp file in the same directory,
    /// then an atomic rename over the target. fsync unless fast_mode.
    pub fn persist(&self) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("tmp");
        let mut writer = FrameWriter::create(&tmp, &self.header, self.compression)?;
        let order = if self.clustered.load(Ordering::Acquire) {
            ScanOrder::Level
        } else {
            ScanOrder::Depth
        };
        self.inner
            .for_each_ordered(order, &mut |rec| writer.push(rec))?;
        writer.finish(!self.fast_mode)?;
        fs::rename(&tmp, &self.path)?;
        self.dirty.store(false, Ordering::Release);
        Ok(())
    }
}

impl PositionStore for SnapshotStore {
    fn insert_batch(&self, records: &[PositionRecord]) -> Result<u64, StoreError> {
        let inserted = self.inner.insert_batch(records)?;
        if inserted > 0 {
            self.dirty.store(true, Ordering::Release);
        }
        Ok(inserted)
    }

    fn exists(&self, fingerprint: u64) -> Result<bool, StoreError> {
        self.inner.exists(fingerprint)
    }

    fn get(&self, fingerprint: u64) -> Result<Option<PositionRecord>, StoreError> {
        self.inner.get(fingerprint)
    }

    fn scan_by_depth(
        &self,
        depth: u16,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<PositionRecord>, StoreError> {
        self.inner.scan_by_depth(depth, offset, limit)
    }

    fn scan_unsolved_by_level(
        &self,
        level: u16,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<PositionRecord>, StoreError> {
        self.inner.scan_unsolved_by_level(level, offset, limit)
    }

    fn count_by_depth(&self, depth: u16) -> Result<u64, StoreError> {
        self.inner.count_by_depth(depth)
    }

    fn count_by_level(&self, level: u16) -> Result<u64, StoreError> {
        self.inner.count_by_level(level)
    }

    fn count_unsolved_by_level(&self, level: u16) -> Result<u64, StoreError> {
        self.inner.count_unsolved_by_level(level)
    }

    fn update_score(
        &self,
        fingerprint: u64,
        score: i8,
        best_move: Option<u8>,
    ) -> Result<(), StoreError> {
        self.inner.update_score(fingerprint, score, best_move)?;
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    fn max_depth(&self) -> Result<Option<u16>, StoreError> {
        self.inner.max_depth()
    }

    fn cluster_by_level(&self) -> Result<(), StoreError> {
        // Takes effect at the next persist: frames are emitted level-ordered.
        self.clustered.store(true, Ordering::Release);
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        if self.fast_mode || !self.dirty.load(Ordering::Acquire) {
            return Ok(());
        }
        self.persist()
    }
}
