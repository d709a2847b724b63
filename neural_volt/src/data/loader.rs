//! Multi-threaded sample loading.
//!
//! Worker threads load and adapt files concurrently and push them into a
//! bounded queue of depth `num_workers * prefetch_factor`. The consuming
//! iterator reorders samples by permutation position before collating, so a
//! given seed always yields the same batches no matter which worker finishes
//! first.
//!
//! Workers claim positions through a [`Window`] that never runs more than the
//! queue depth ahead of the consumer, so at most that many samples are held
//! in memory (queued plus waiting in the reorder buffer) even when one file is
//! slow to load.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use volt_core::{collate_graphs, AdaptedSample, Backend, GraphBatch, SampleAdapter, VoltCoreError};

use crate::config::LoaderConfig;
use crate::error::{NeuralVoltError, Result};

type Delivery<G> = (usize, volt_core::Result<AdaptedSample<G>>);

/// How often a waiting worker rechecks the external stop flag.
const STOP_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Default)]
struct WindowState {
    claimed: usize,
    consumed: usize,
    closed: bool,
}

/// Hands out epoch positions in order, at most `depth` past the last
/// position the consumer has taken.
#[derive(Debug)]
struct Window {
    state: Mutex<WindowState>,
    moved: Condvar,
    depth: usize,
    len: usize,
}

impl Window {
    fn new(len: usize, depth: usize) -> Self {
        Self {
            state: Mutex::new(WindowState::default()),
            moved: Condvar::new(),
            depth,
            len,
        }
    }

    fn lock(&self) -> MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Next position to load, or `None` once the epoch is exhausted, closed
    /// or stopped. Blocks while the window is full.
    fn claim(&self, stop: &AtomicBool) -> Option<usize> {
        let mut state = self.lock();
        loop {
            if state.closed || stop.load(Ordering::Relaxed) || state.claimed >= self.len {
                return None;
            }
            if state.claimed < state.consumed + self.depth {
                let position = state.claimed;
                state.claimed += 1;
                return Some(position);
            }
            state = match self.moved.wait_timeout(state, STOP_POLL) {
                Ok((state, _)) => state,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    fn consume(&self, position: usize) {
        let mut state = self.lock();
        state.consumed = state.consumed.max(position + 1);
        drop(state);
        self.moved.notify_all();
    }

    fn close(&self) {
        self.lock().closed = true;
        self.moved.notify_all();
    }
}

/// Batches of adapted samples drawn from a fixed file list.
pub struct DataLoader<Bk: Backend> {
    adapter: Arc<SampleAdapter<Bk>>,
    files: Arc<Vec<PathBuf>>,
    config: LoaderConfig,
    seed: u64,
    stop: Arc<AtomicBool>,
}

impl<Bk> DataLoader<Bk>
where
    Bk: Backend + 'static,
    Bk::Graph: 'static,
{
    /// Create a loader over `files`. An empty file list is an error.
    pub fn new(
        adapter: Arc<SampleAdapter<Bk>>,
        files: Vec<PathBuf>,
        config: LoaderConfig,
        seed: u64,
    ) -> Result<Self> {
        config.validate().map_err(NeuralVoltError::config)?;
        if files.is_empty() {
            return Err(VoltCoreError::EmptySampleSet.into());
        }
        Ok(Self {
            adapter,
            files: Arc::new(files),
            config,
            seed,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Share an external stop flag. Raising it ends the current epoch.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// The stop flag observed by every epoch iterator.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Loader configuration.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Shared adapter.
    pub fn adapter(&self) -> &Arc<SampleAdapter<Bk>> {
        &self.adapter
    }

    /// Files of the loader, unshuffled.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the loader has no file (never true for a constructed loader).
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Number of samples consumed per epoch.
    pub fn samples_per_epoch(&self) -> usize {
        let n = self.files.len();
        if self.config.drop_last {
            n - n % self.config.batch_size
        } else {
            n
        }
    }

    /// Number of batches per epoch.
    pub fn num_batches(&self) -> usize {
        self.samples_per_epoch().div_ceil(self.config.batch_size)
    }

    /// File order of an epoch, seeded with `seed + epoch`.
    pub fn permutation(&self, epoch: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.files.len()).collect();
        if self.config.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(epoch as u64));
            order.shuffle(&mut rng);
        }
        order
    }

    /// Start the workers of one epoch and iterate over its batches.
    pub fn epoch(&self, epoch: usize) -> EpochBatches<Bk::Graph> {
        let order = Arc::new(self.permutation(epoch));
        let len = self.samples_per_epoch();
        let depth = self.config.queue_depth();
        let (tx, rx) = sync_channel::<Delivery<Bk::Graph>>(depth);
        let window = Arc::new(Window::new(len, depth));

        if len == 0 {
            log::warn!(
                "Epoch {} is empty: {} files with batch_size {} and drop_last",
                epoch,
                self.files.len(),
                self.config.batch_size
            );
        }

        let num_workers = self.config.num_workers.min(len);
        let workers = (0..num_workers)
            .map(|_| {
                let tx = tx.clone();
                let adapter = Arc::clone(&self.adapter);
                let files = Arc::clone(&self.files);
                let order = Arc::clone(&order);
                let window = Arc::clone(&window);
                let stop = Arc::clone(&self.stop);
                thread::spawn(move || {
                    while let Some(position) = window.claim(&stop) {
                        let result = adapter.adapt(&files[order[position]]);
                        if tx.send((position, result)).is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();
        drop(tx);

        log::debug!("Epoch {} started with {} workers over {} samples", epoch, num_workers, len);

        EpochBatches {
            rx: Some(rx),
            workers,
            window,
            stop: Arc::clone(&self.stop),
            pending: BTreeMap::new(),
            next: 0,
            len,
            batch_size: self.config.batch_size,
        }
    }
}

/// Iterator over the batches of one epoch.
///
/// Dropping it disconnects the queue and joins the workers.
pub struct EpochBatches<G> {
    rx: Option<Receiver<Delivery<G>>>,
    workers: Vec<JoinHandle<()>>,
    window: Arc<Window>,
    stop: Arc<AtomicBool>,
    pending: BTreeMap<usize, volt_core::Result<AdaptedSample<G>>>,
    next: usize,
    len: usize,
    batch_size: usize,
}

impl<G> EpochBatches<G> {
    /// Samples not yet handed out in this epoch.
    pub fn remaining(&self) -> usize {
        self.len - self.next
    }

    fn take_position(&mut self, position: usize) -> Option<Result<AdaptedSample<G>>> {
        loop {
            if let Some(result) = self.pending.remove(&position) {
                self.window.consume(position);
                return Some(result.map_err(Into::into));
            }
            if self.stop.load(Ordering::Relaxed) {
                return None;
            }
            let rx = self.rx.as_ref()?;
            match rx.recv() {
                Ok((p, result)) => {
                    self.pending.insert(p, result);
                }
                Err(_) if self.stop.load(Ordering::Relaxed) => return None,
                Err(_) => {
                    return Some(Err(NeuralVoltError::LoaderError {
                        message: format!("workers exited before delivering sample {position}"),
                    }))
                }
            }
        }
    }

    fn shutdown(&mut self) {
        self.window.close();
        self.rx.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::warn!("A loader worker panicked");
            }
        }
        self.pending.clear();
    }
}

impl<G> Iterator for EpochBatches<G> {
    type Item = Result<GraphBatch<G>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.len || self.stop.load(Ordering::Relaxed) {
            return None;
        }
        let end = (self.next + self.batch_size).min(self.len);
        let mut samples = Vec::with_capacity(end - self.next);
        while self.next < end {
            match self.take_position(self.next) {
                Some(Ok(sample)) => samples.push(sample),
                Some(Err(e)) => {
                    self.next = self.len;
                    self.shutdown();
                    return Some(Err(e));
                }
                None => {
                    self.shutdown();
                    return None;
                }
            }
            self.next += 1;
        }
        Some(collate_graphs(samples).map_err(Into::into))
    }
}

impl<G> Drop for EpochBatches<G> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
