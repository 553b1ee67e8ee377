// rust/tsad-data/src/dataloader.rs

//! Batch iteration over record sources.
//!
//! A [`DataLoader`] groups the records of a [`RecordSource`] into batches.
//! Every call to [`DataLoader::iter`] starts a new pass over the source; when
//! shuffling is enabled each pass draws a fresh permutation.
//!
//! With `num_workers > 0` batches are assembled by a pool of background
//! threads that may run ahead of the consumer by a bounded number of batches.
//! Batches are always yielded in the same order as with `num_workers == 0`,
//! so the worker count only affects throughput.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{DataError, Result};
use crate::window::RecordSource;

/// Configuration for one batch iterator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Records per batch. The last batch of a pass may be smaller.
    pub batch_size: usize,
    /// Draw a new record order for every pass.
    pub shuffle: bool,
    /// Background threads assembling batches; zero uses the calling thread.
    pub num_workers: usize,
    /// Batches each worker may have ready ahead of the consumer.
    pub prefetch_batches: usize,
    /// Seed for the shuffling RNG. Unseeded loaders draw from OS entropy.
    pub seed: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            shuffle: false,
            num_workers: 0,
            prefetch_batches: 2,
            seed: None,
        }
    }
}

/// Groups the records of a source into batches.
pub struct DataLoader<S: RecordSource> {
    source: Arc<S>,
    config: BatchConfig,
    rng: StdRng,
    epoch: u64,
}

impl<S> DataLoader<S>
where
    S: RecordSource + 'static,
{
    /// Creates a loader over `source`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `batch_size` or `prefetch_batches`
    /// is zero.
    pub fn new(source: S, config: BatchConfig) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(DataError::config("batch_size must be greater than 0"));
        }
        if config.prefetch_batches == 0 {
            return Err(DataError::config("prefetch_batches must be greater than 0"));
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            source: Arc::new(source),
            config,
            rng,
            epoch: 0,
        })
    }

    /// Number of batches in one pass: `ceil(records / batch_size)`.
    pub fn len(&self) -> usize {
        self.source.len().div_ceil(self.config.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Number of records in one pass.
    pub fn num_records(&self) -> usize {
        self.source.len()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Number of passes started so far.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Starts a new pass over the source.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker thread cannot be spawned.
    pub fn iter(&mut self) -> Result<BatchIter<S>> {
        let mut order: Vec<usize> = (0..self.source.len()).collect();
        if self.config.shuffle {
            order.shuffle(&mut self.rng);
        }
        self.epoch += 1;

        let batches: Vec<Vec<usize>> = order
            .chunks(self.config.batch_size)
            .map(<[usize]>::to_vec)
            .collect();

        tracing::trace!(
            "Starting pass {} over {} source: {} records, {} batches",
            self.epoch,
            self.source.name(),
            self.source.len(),
            batches.len()
        );

        let total = batches.len();
        let inner = if self.config.num_workers == 0 || total <= 1 {
            IterState::Inline {
                source: self.source.clone(),
                batches: batches.into_iter(),
            }
        } else {
            IterState::Pooled(WorkerPool::spawn(
                self.source.clone(),
                batches,
                self.config.num_workers,
                self.config.prefetch_batches,
            )?)
        };

        Ok(BatchIter {
            state: inner,
            total,
            yielded: 0,
            finished: false,
        })
    }
}

impl<S: RecordSource> std::fmt::Debug for DataLoader<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLoader")
            .field("source", &self.source.name())
            .field("records", &self.source.len())
            .field("config", &self.config)
            .field("epoch", &self.epoch)
            .finish()
    }
}

/// One pass over a [`DataLoader`]'s source.
///
/// Yields `Ok(batch)` for every batch in order. If assembling a batch fails,
/// the error is yielded and the pass ends.
pub struct BatchIter<S: RecordSource> {
    state: IterState<S>,
    total: usize,
    yielded: usize,
    finished: bool,
}

enum IterState<S: RecordSource> {
    Inline {
        source: Arc<S>,
        batches: std::vec::IntoIter<Vec<usize>>,
    },
    Pooled(WorkerPool<S::Batch>),
}

impl<S: RecordSource> BatchIter<S> {
    /// Total number of batches in this pass.
    pub fn total_batches(&self) -> usize {
        self.total
    }

    /// Returns the next batch, `Ok(None)` once the pass is complete.
    pub fn next_batch(&mut self) -> Result<Option<S::Batch>> {
        if self.finished {
            return Ok(None);
        }

        let result = match &mut self.state {
            IterState::Inline { source, batches } => match batches.next() {
                Some(indices) => source.batch(&indices).map(Some),
                None => Ok(None),
            },
            IterState::Pooled(pool) => pool.next_batch(),
        };

        match &result {
            Ok(Some(_)) => self.yielded += 1,
            Ok(None) | Err(_) => {
                self.finished = true;
                if let IterState::Pooled(pool) = &mut self.state {
                    pool.stop();
                }
            }
        }

        result
    }
}

impl<S: RecordSource> Iterator for BatchIter<S> {
    type Item = Result<S::Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_batch() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            return (0, Some(0));
        }
        let remaining = self.total - self.yielded;
        (0, Some(remaining))
    }
}

type WorkerItem<B> = (usize, Result<B>);
type Job = (usize, Vec<usize>);

/// Background threads assembling batches, with in-order delivery.
///
/// Jobs are handed out only as the consumer advances, so at most
/// `num_workers * prefetch_batches` batches past the last yielded one are
/// ever queued, in flight or buffered.
struct WorkerPool<B> {
    jobs: Option<Sender<Job>>,
    queued: std::iter::Enumerate<std::vec::IntoIter<Vec<usize>>>,
    results: Option<Receiver<WorkerItem<B>>>,
    stop_flag: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    /// Batches that arrived ahead of their turn.
    pending: BTreeMap<usize, Result<B>>,
    next_index: usize,
    total: usize,
}

impl<B: Send + 'static> WorkerPool<B> {
    fn spawn<S>(
        source: Arc<S>,
        batches: Vec<Vec<usize>>,
        num_workers: usize,
        prefetch_batches: usize,
    ) -> Result<Self>
    where
        S: RecordSource<Batch = B> + 'static,
    {
        let total = batches.len();
        let num_workers = num_workers.min(total);
        let window = num_workers * prefetch_batches;

        let (job_tx, job_rx) = channel::unbounded::<Job>();
        let (result_tx, result_rx) = channel::bounded(window);
        let stop_flag = Arc::new(AtomicBool::new(false));

        let mut pool = Self {
            jobs: Some(job_tx),
            queued: batches.into_iter().enumerate(),
            results: Some(result_rx),
            stop_flag: stop_flag.clone(),
            workers: Vec::with_capacity(num_workers),
            pending: BTreeMap::new(),
            next_index: 0,
            total,
        };

        for worker_id in 0..num_workers {
            let source = source.clone();
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let stop_flag = stop_flag.clone();

            let handle = thread::Builder::new()
                .name(format!("tsad-loader-{worker_id}"))
                .spawn(move || {
                    while let Ok((batch_index, indices)) = job_rx.recv() {
                        if stop_flag.load(Ordering::Relaxed) {
                            return;
                        }
                        let result = panic::catch_unwind(AssertUnwindSafe(|| source.batch(&indices)))
                            .unwrap_or_else(|_| {
                                Err(DataError::worker(format!(
                                    "worker panicked while assembling batch {batch_index}"
                                )))
                            });
                        if result_tx.send((batch_index, result)).is_err() {
                            return; // Consumer dropped
                        }
                    }
                })
                .map_err(|e| DataError::worker(format!("failed to spawn worker thread: {e}")))?;

            pool.workers.push(handle);
        }

        for _ in 0..window {
            pool.submit_next();
        }

        Ok(pool)
    }
}

impl<B> WorkerPool<B> {
    /// Hands the next unassigned batch to the workers, if any remain.
    fn submit_next(&mut self) {
        if let (Some(jobs), Some(job)) = (self.jobs.as_ref(), self.queued.next()) {
            // Workers hold the receiver until stopped.
            let _ = jobs.send(job);
        }
    }

    fn next_batch(&mut self) -> Result<Option<B>> {
        if self.next_index >= self.total {
            return Ok(None);
        }

        let wanted = self.next_index;
        let item = match self.pending.remove(&wanted) {
            Some(item) => item,
            None => self.receive(wanted)?,
        };

        self.next_index += 1;
        self.submit_next();
        item.map(Some)
    }

    fn receive(&mut self, wanted: usize) -> Result<Result<B>> {
        let results = self
            .results
            .as_ref()
            .ok_or_else(|| DataError::worker("batch iterator already stopped"))?;

        loop {
            match results.recv() {
                Ok((index, item)) if index == wanted => return Ok(item),
                Ok((index, item)) => {
                    self.pending.insert(index, item);
                }
                Err(_) => {
                    return Err(DataError::worker(format!(
                        "workers exited before producing batch {wanted}"
                    )));
                }
            }
        }
    }

    /// Stops the workers and waits for them to exit.
    fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);

        // Closing the job queue wakes idle workers; dropping the receiver
        // unblocks workers waiting to send.
        self.jobs.take();
        self.results.take();
        self.pending.clear();

        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl<B> Drop for WorkerPool<B> {
    fn drop(&mut self) {
        self.stop();
    }
}
