use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{bounded, Sender};

use super::{with_retries, SolveError};
use crate::store::{PositionRecord, PositionStore, StoreError};

enum WriteMsg {
    Batch(Vec<PositionRecord>),
    End,
}

/// Cloneable producer side of the write queue. `put` blocks when the queue is
/// full, which is how workers self-throttle to the writer's throughput.
#[derive(Clone)]
pub struct WriterHandle {
    tx: Sender<WriteMsg>,
    failed: Arc<AtomicBool>,
    error: Arc<Mutex<Option<StoreError>>>,
}

impl WriterHandle {
    pub fn put(&self, batch: Vec<PositionRecord>) -> Result<(), SolveError> {
        // A captured writer error is re-raised at the next enqueue.
        if self.failed.load(Ordering::Acquire) {
            return Err(self.take_error());
        }
        self.tx
            .send(WriteMsg::Batch(batch))
            .map_err(|_| SolveError::Writer("write queue closed".into()))?;
        Ok(())
    }

    fn take_error(&self) -> SolveError {
        match self.error.lock().unwrap().take() {
            Some(e) => SolveError::Store(e),
            None => SolveError::Writer("store writer failed".into()),
        }
    }
}

/// Dedicated store-writer thread fed by a bounded channel.
///
/// On a store error the thread records it and keeps draining (discarding)
/// messages so blocked producers wake up; the error surfaces on the next
/// `put` or at `finish`.
pub struct AsyncWriter {
    handle: WriterHandle,
    join: thread::JoinHandle<u64>,
}

impl AsyncWriter {
    pub fn spawn(store: Arc<dyn PositionStore>, queue_capacity: usize) -> Self {
        let (tx, rx) = bounded::<WriteMsg>(queue_capacity.max(1));
        let failed = Arc::new(AtomicBool::new(false));
        let error = Arc::new(Mutex::new(None));
        let failed_w = Arc::clone(&failed);
        let error_w = Arc::clone(&error);

        let join = thread::spawn(move || {
            let mut inserted = 0u64;
            while let Ok(msg) = rx.recv() {
                match msg {
                    WriteMsg::Batch(batch) => {
                        if failed_w.load(Ordering::Acquire) {
                            continue;
                        }
                        match with_retries(|| store.insert_batch(&batch)) {
                            Ok(n) => inserted += n,
                            Err(e) => {
                                *error_w.lock().unwrap() = Some(e);
                                failed_w.store(true, Ordering::Release);
                            }
                        }
                    }
                    WriteMsg::End => break,
                }
            }
            inserted
        });

        Self {
            handle: WriterHandle { tx, failed, error },
            join,
        }
    }

    pub fn handle(&self) -> WriterHandle {
        self.handle.clone()
    }

    /// Drain the queue, stop the thread, and return the number of records the
    /// store accepted. Any captured write error is re-raised here.
    pub fn finish(self) -> Result<u64, SolveError> {
        let _ = self.handle.tx.send(WriteMsg::End);
        let inserted = self
            .join
            .join()
            .map_err(|_| SolveError::Writer("store writer thread panicked".into()))?;
        if self.handle.failed.load(Ordering::Acquire) {
            return Err(self.handle.take_error());
        }
        Ok(inserted)
    }
}
