use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::data::batch::Batch;
use crate::data::dataset::{BatchSource, Dataset};
use crate::error::DataError;

/// Batches each worker may have in flight ahead of the consumer.
pub const PREFETCH_FACTOR: usize = 2;

type Job = (usize, Vec<usize>);
type Loaded = (usize, Result<Batch, DataError>);

/// Splits a dataset into batches, optionally shuffled, optionally prepared by
/// a pool of worker threads.
///
/// Workers prefetch through a bounded channel and batches are always yielded
/// in epoch order, so the consumer sees the same sequence whatever the worker
/// count. The last batch of an epoch may be smaller than `batch_size`.
pub struct DataLoader {
    dataset: Arc<dyn Dataset>,
    batch_size: usize,
    n_workers: usize,
    rng: Option<StdRng>,
}

impl DataLoader {
    /// Sequential, unshuffled loader.
    ///
    /// # Panics
    /// Panics if `batch_size == 0`.
    pub fn new(dataset: Arc<dyn Dataset>, batch_size: usize) -> DataLoader {
        assert!(batch_size > 0, "batch_size must be at least 1");
        DataLoader {
            dataset,
            batch_size,
            n_workers: 0,
            rng: None,
        }
    }

    /// Prepares batches on `n_workers` background threads (0 = inline).
    pub fn with_workers(mut self, n_workers: usize) -> DataLoader {
        self.n_workers = n_workers;
        self
    }

    /// Reshuffles the sample order at the start of every epoch.
    pub fn shuffled(mut self, seed: u64) -> DataLoader {
        self.rng = Some(StdRng::seed_from_u64(seed));
        self
    }

    pub fn dataset(&self) -> &Arc<dyn Dataset> {
        &self.dataset
    }

    pub fn n_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    fn epoch_jobs(&mut self) -> Vec<Vec<usize>> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if let Some(rng) = self.rng.as_mut() {
            indices.shuffle(rng);
        }
        indices.chunks(self.batch_size).map(<[usize]>::to_vec).collect()
    }
}

impl BatchSource for DataLoader {
    fn batches(&mut self) -> Box<dyn Iterator<Item = Result<Batch, DataError>> + '_> {
        let jobs = self.epoch_jobs();
        if self.n_workers == 0 || jobs.len() <= 1 {
            let dataset = Arc::clone(&self.dataset);
            return Box::new(
                jobs.into_iter()
                    .map(move |job| load_batch(dataset.as_ref(), &job)),
            );
        }
        Box::new(Prefetch::spawn(Arc::clone(&self.dataset), jobs, self.n_workers))
    }
}

fn load_batch(dataset: &dyn Dataset, indices: &[usize]) -> Result<Batch, DataError> {
    let samples = indices
        .iter()
        .map(|&index| dataset.get(index))
        .collect::<Result<Vec<_>, _>>()?;
    Batch::collate(samples)
}

// ---------------------------------------------------------------------------
// Worker pool
// ---------------------------------------------------------------------------

/// One epoch of batches being prepared by worker threads.
///
/// Jobs are handed out by the consumer, never more than `capacity` ahead of
/// the next batch it will yield. Everything queued, being loaded, sitting in
/// the result channel or waiting in `pending` counts against that window, so
/// one slow batch cannot let the other workers load the rest of the epoch.
struct Prefetch {
    jobs: Option<Sender<Job>>,
    results: Option<Receiver<Loaded>>,
    remaining_jobs: std::vec::IntoIter<Vec<usize>>,
    pending: BTreeMap<usize, Result<Batch, DataError>>,
    next_job: usize,
    next: usize,
    total: usize,
    capacity: usize,
    workers: Vec<JoinHandle<()>>,
}

impl Prefetch {
    /// Starts `n_workers` threads over `jobs` and queues the first window.
    ///
    /// # Arguments
    /// - `dataset`   : shared with every worker
    /// - `jobs`      : sample indices of each batch, in epoch order
    /// - `n_workers` : thread count, capped at the number of batches
    fn spawn(dataset: Arc<dyn Dataset>, jobs: Vec<Vec<usize>>, n_workers: usize) -> Prefetch {
        let total = jobs.len();
        let n_workers = n_workers.min(total);
        let capacity = n_workers * PREFETCH_FACTOR;
        let (job_tx, job_rx) = bounded::<Job>(capacity);
        let (result_tx, result_rx) = bounded::<Loaded>(capacity);

        let workers = (0..n_workers)
            .map(|_| {
                let dataset = Arc::clone(&dataset);
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                thread::spawn(move || worker_loop(dataset.as_ref(), &job_rx, &result_tx))
            })
            .collect::<Vec<_>>();

        debug!(workers = workers.len(), batches = total, capacity, "data loader epoch started");

        let mut prefetch = Prefetch {
            jobs: Some(job_tx),
            results: Some(result_rx),
            remaining_jobs: jobs.into_iter(),
            pending: BTreeMap::new(),
            next_job: 0,
            next: 0,
            total,
            capacity,
            workers,
        };
        prefetch.refill();
        prefetch
    }

    /// Queues jobs until the window `[next, next + capacity)` is covered.
    fn refill(&mut self) {
        while self.next_job < self.next + self.capacity {
            let Some(job) = self.remaining_jobs.next() else {
                // Workers exit once the queue is drained and closed.
                self.jobs.take();
                return;
            };
            let Some(tx) = self.jobs.as_ref() else {
                return;
            };
            if tx.send((self.next_job, job)).is_err() {
                self.jobs.take();
                return;
            }
            self.next_job += 1;
        }
    }

    fn in_flight(&self) -> usize {
        self.next_job - self.next
    }
}

fn worker_loop(dataset: &dyn Dataset, jobs: &Receiver<Job>, results: &Sender<Loaded>) {
    for (index, indices) in jobs.iter() {
        // The receiver is gone once the consumer stops early.
        if results.send((index, load_batch(dataset, &indices))).is_err() {
            return;
        }
    }
}

impl Iterator for Prefetch {
    type Item = Result<Batch, DataError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total {
            return None;
        }

        // ── Wait for the batch at `next`, parking early arrivals ─────────────
        let result = loop {
            if let Some(result) = self.pending.remove(&self.next) {
                break result;
            }
            let rx = self.results.as_ref()?;
            match rx.recv() {
                Ok((index, result)) => {
                    self.pending.insert(index, result);
                }
                Err(_) => {
                    let batch = self.next;
                    self.next = self.total;
                    return Some(Err(DataError::WorkerDisconnected { batch }));
                }
            }
        };

        // ── Slide the window by one and hand out the next job ────────────────
        self.next += 1;
        self.refill();
        debug_assert!(self.in_flight() <= self.capacity);
        Some(result)
    }
}

impl Drop for Prefetch {
    fn drop(&mut self) {
        self.jobs.take();
        self.results.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
