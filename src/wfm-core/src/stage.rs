// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Pipeline stage: a bounded FIFO queue drained by dedicated worker threads.
//!
//! Producers hand items to [`StageSender::submit`]; each worker pops the
//! oldest item, releases the lock and runs the processing closure on it.
//! With a single worker, items are processed in submission order.
//!
//! Closing is a drain protocol: the stage stops accepting items, workers
//! finish everything already queued and then exit. Workers wait on
//! "queue non-empty or closed", so closing an idle stage always completes.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use crate::error::DemodError;

pub const DEFAULT_QUEUE_CAPACITY: usize = 25;

/// What `submit` does when the queue is at capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Discard the oldest queued item. Producers never wait.
    #[default]
    DropOldest,
    /// Wait until a worker makes room or the stage closes.
    Block,
}

#[derive(Debug, Clone)]
pub struct StageConfig {
    pub name: String,
    pub workers: usize,
    pub capacity: usize,
    pub overflow: OverflowPolicy,
}

impl StageConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            workers: 1,
            capacity: DEFAULT_QUEUE_CAPACITY,
            overflow: OverflowPolicy::default(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageStats {
    pub submitted: u64,
    pub processed: u64,
    /// Discarded by `OverflowPolicy::DropOldest`.
    pub dropped: u64,
    /// Discarded by `clear`/`abort`.
    pub cleared: u64,
}

struct Queue<T> {
    items: VecDeque<T>,
    closed: bool,
}

struct Shared<T> {
    name: String,
    capacity: usize,
    overflow: OverflowPolicy,
    queue: Mutex<Queue<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    submitted: AtomicU64,
    processed: AtomicU64,
    dropped: AtomicU64,
    cleared: AtomicU64,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Queue<T>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn closed_error(&self) -> DemodError {
        DemodError::Closed(self.name.clone())
    }

    fn submit(&self, item: T) -> Result<(), DemodError> {
        let mut queue = self.lock();
        if queue.closed {
            return Err(self.closed_error());
        }

        if queue.items.len() >= self.capacity {
            match self.overflow {
                OverflowPolicy::DropOldest => {
                    let mut dropped = 0;
                    while queue.items.len() >= self.capacity {
                        queue.items.pop_front();
                        dropped += 1;
                    }
                    self.dropped.fetch_add(dropped, Ordering::Relaxed);
                    tracing::debug!(
                        "stage '{}' queue full ({}); dropped {} oldest item(s)",
                        self.name,
                        self.capacity,
                        dropped
                    );
                }
                OverflowPolicy::Block => {
                    queue = self
                        .not_full
                        .wait_while(queue, |q| !q.closed && q.items.len() >= self.capacity)
                        .unwrap_or_else(PoisonError::into_inner);
                    if queue.closed {
                        return Err(self.closed_error());
                    }
                }
            }
        }

        queue.items.push_back(item);
        self.submitted.fetch_add(1, Ordering::Relaxed);
        drop(queue);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Next item to process, or `None` once closed and drained.
    fn next(&self) -> Option<T> {
        let guard = self.lock();
        let mut queue = self
            .not_empty
            .wait_while(guard, |q| q.items.is_empty() && !q.closed)
            .unwrap_or_else(PoisonError::into_inner);
        let item = queue.items.pop_front();
        drop(queue);
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    fn clear(&self) -> usize {
        let mut queue = self.lock();
        let count = queue.items.len();
        queue.items.clear();
        drop(queue);
        self.cleared.fetch_add(count as u64, Ordering::Relaxed);
        self.not_full.notify_all();
        count
    }

    fn close(&self) {
        self.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    fn stats(&self) -> StageStats {
        StageStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            cleared: self.cleared.load(Ordering::Relaxed),
        }
    }
}

fn worker_loop<T, F: Fn(T)>(shared: &Shared<T>, process: &F) {
    while let Some(item) = shared.next() {
        if panic::catch_unwind(AssertUnwindSafe(|| process(item))).is_err() {
            tracing::error!("stage '{}': processing panicked; item lost", shared.name);
        }
        shared.processed.fetch_add(1, Ordering::Relaxed);
    }
    tracing::debug!("stage '{}' worker exiting", shared.name);
}

/// Cloneable submission handle for a [`Stage`].
pub struct StageSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for StageSender<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> StageSender<T> {
    pub fn submit(&self, item: T) -> Result<(), DemodError> {
        self.shared.submit(item)
    }

    pub fn clear(&self) -> usize {
        self.shared.clear()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

pub struct Stage<T> {
    shared: Arc<Shared<T>>,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> Stage<T> {
    /// Start `config.workers` threads (at least one) running `process`.
    pub fn spawn<F>(config: StageConfig, process: F) -> Result<Self, DemodError>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let worker_count = config.workers.max(1);
        let shared = Arc::new(Shared {
            name: config.name,
            capacity: config.capacity.max(1),
            overflow: config.overflow,
            queue: Mutex::new(Queue {
                items: VecDeque::with_capacity(config.capacity.max(1)),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            submitted: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            cleared: AtomicU64::new(0),
        });
        let process = Arc::new(process);

        let mut stage = Self {
            shared,
            workers: Vec::with_capacity(worker_count),
        };
        for idx in 0..worker_count {
            let shared = Arc::clone(&stage.shared);
            let process = Arc::clone(&process);
            let spawned = std::thread::Builder::new()
                .name(format!("wfm-{}-{}", stage.shared.name, idx))
                .spawn(move || worker_loop(&shared, &*process));
            match spawned {
                Ok(handle) => stage.workers.push(handle),
                Err(source) => {
                    let name = stage.shared.name.clone();
                    stage.close();
                    return Err(DemodError::Spawn { name, source });
                }
            }
        }

        tracing::debug!(
            "stage '{}' started ({} worker(s), capacity {}, {:?})",
            stage.shared.name,
            worker_count,
            stage.shared.capacity,
            stage.shared.overflow
        );
        Ok(stage)
    }
}

impl<T> Stage<T> {
    pub fn sender(&self) -> StageSender<T> {
        StageSender {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn submit(&self, item: T) -> Result<(), DemodError> {
        self.shared.submit(item)
    }

    /// Discard queued items; items already handed to a worker still finish.
    pub fn clear(&self) -> usize {
        self.shared.clear()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn stats(&self) -> StageStats {
        self.shared.stats()
    }

    /// Stop accepting items, drain the queue and join the workers.
    pub fn close(&mut self) {
        self.shared.close();
        self.join();
    }

    /// Discard queued items, then close.
    pub fn abort(&mut self) {
        let discarded = self.shared.clear();
        if discarded > 0 {
            tracing::debug!(
                "stage '{}' aborted with {} queued item(s)",
                self.shared.name,
                discarded
            );
        }
        self.close();
    }

    fn join(&mut self) {
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("stage '{}' worker terminated abnormally", self.shared.name);
            }
        }
    }
}

impl<T> Drop for Stage<T> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::mpsc;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// A stage whose worker reports each item it starts and then waits on a
    /// gate before recording it.
    struct Gated {
        stage: Stage<u32>,
        started: mpsc::Receiver<u32>,
        gate: Option<mpsc::Sender<()>>,
        seen: Arc<Mutex<Vec<u32>>>,
    }

    fn gated(config: StageConfig) -> Gated {
        let (started_tx, started) = mpsc::channel();
        let (gate, gate_rx) = mpsc::channel::<()>();
        let gate_rx = Mutex::new(gate_rx);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_worker = Arc::clone(&seen);
        let stage = Stage::spawn(config, move |item: u32| {
            let _ = started_tx.send(item);
            let _ = gate_rx.lock().unwrap().recv();
            seen_worker.lock().unwrap().push(item);
        })
        .unwrap();
        Gated {
            stage,
            started,
            gate: Some(gate),
            seen,
        }
    }

    impl Gated {
        fn open_gate(&mut self) {
            self.gate.take();
        }

        fn seen(&self) -> Vec<u32> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[test]
    fn single_worker_preserves_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_worker = Arc::clone(&seen);
        let mut stage = Stage::spawn(StageConfig::new("order").with_capacity(256), move |item| {
            seen_worker.lock().unwrap().push(item);
        })
        .unwrap();
        for i in 0..100_u32 {
            stage.submit(i).unwrap();
        }
        stage.close();
        assert_eq!(*seen.lock().unwrap(), (0..100).collect::<Vec<_>>());
        assert_eq!(stage.stats().processed, 100);
    }

    #[test]
    fn close_drains_queued_items() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_worker = Arc::clone(&count);
        let mut stage = Stage::spawn(StageConfig::new("drain").with_capacity(64), move |_: u32| {
            std::thread::sleep(Duration::from_millis(1));
            count_worker.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        for i in 0..20 {
            stage.submit(i).unwrap();
        }
        stage.close();
        assert_eq!(count.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn close_on_idle_stage_terminates() {
        let mut stage = Stage::spawn(StageConfig::new("idle"), |_: u32| {}).unwrap();
        // Let the worker park on the empty queue first.
        std::thread::sleep(Duration::from_millis(20));
        stage.close();
        assert_eq!(stage.stats(), StageStats::default());
    }

    #[test]
    fn submit_after_close_is_rejected() {
        let mut stage = Stage::spawn(StageConfig::new("closed"), |_: u32| {}).unwrap();
        let sender = stage.sender();
        assert_eq!(sender.name(), "closed");
        stage.close();
        assert!(matches!(sender.submit(1), Err(DemodError::Closed(name)) if name == "closed"));
    }

    #[test]
    fn clear_discards_only_queued_items() {
        let mut g = gated(StageConfig::new("clear"));
        g.stage.submit(0).unwrap();
        assert_eq!(g.started.recv_timeout(TIMEOUT).unwrap(), 0);
        for i in 1..=5 {
            g.stage.submit(i).unwrap();
        }
        assert_eq!(g.stage.len(), 5);
        assert_eq!(g.stage.clear(), 5);
        assert!(g.stage.is_empty());
        g.open_gate();
        g.stage.close();
        assert_eq!(g.seen(), [0]);
        assert_eq!(g.stage.stats().cleared, 5);
    }

    #[test]
    fn drop_oldest_keeps_newest() {
        let mut g = gated(StageConfig::new("overflow").with_capacity(3));
        g.stage.submit(0).unwrap();
        assert_eq!(g.started.recv_timeout(TIMEOUT).unwrap(), 0);
        for i in 1..=6 {
            g.stage.submit(i).unwrap();
        }
        assert_eq!(g.stage.len(), 3);
        g.open_gate();
        g.stage.close();
        assert_eq!(g.seen(), [0, 4, 5, 6]);
        let stats = g.stage.stats();
        assert_eq!(stats.dropped, 3);
        assert_eq!(stats.submitted, 7);
    }

    #[test]
    fn block_policy_waits_for_room() {
        let mut g = gated(
            StageConfig::new("block")
                .with_capacity(1)
                .with_overflow(OverflowPolicy::Block),
        );
        g.stage.submit(0).unwrap();
        assert_eq!(g.started.recv_timeout(TIMEOUT).unwrap(), 0);
        g.stage.submit(1).unwrap();

        let sender = g.stage.sender();
        let done = Arc::new(AtomicBool::new(false));
        let done_producer = Arc::clone(&done);
        let producer = std::thread::spawn(move || {
            sender.submit(2).unwrap();
            done_producer.store(true, Ordering::SeqCst);
        });
        std::thread::sleep(Duration::from_millis(50));
        assert!(!done.load(Ordering::SeqCst), "submit should wait while full");

        g.open_gate();
        producer.join().unwrap();
        g.stage.close();
        assert_eq!(g.seen(), [0, 1, 2]);
        assert_eq!(g.stage.stats().dropped, 0);
    }

    #[test]
    fn blocked_producer_released_on_close() {
        let mut g = gated(
            StageConfig::new("block-close")
                .with_capacity(1)
                .with_overflow(OverflowPolicy::Block),
        );
        g.stage.submit(0).unwrap();
        assert_eq!(g.started.recv_timeout(TIMEOUT).unwrap(), 0);
        g.stage.submit(1).unwrap();

        let sender = g.stage.sender();
        let producer = std::thread::spawn(move || sender.submit(2));
        std::thread::sleep(Duration::from_millis(20));
        g.stage.shared.close();
        assert!(matches!(producer.join().unwrap(), Err(DemodError::Closed(_))));
        g.open_gate();
        g.stage.close();
        assert_eq!(g.seen(), [0, 1]);
    }

    #[test]
    fn abort_discards_queue() {
        let mut g = gated(StageConfig::new("abort"));
        g.stage.submit(0).unwrap();
        assert_eq!(g.started.recv_timeout(TIMEOUT).unwrap(), 0);
        for i in 1..=3 {
            g.stage.submit(i).unwrap();
        }
        let gate = g.gate.take();
        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            drop(gate);
        });
        g.stage.abort();
        releaser.join().unwrap();
        assert_eq!(g.seen(), [0]);
        assert_eq!(g.stage.stats().cleared, 3);
    }

    #[test]
    fn worker_survives_panicking_item() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_worker = Arc::clone(&seen);
        let mut stage = Stage::spawn(StageConfig::new("panic").with_capacity(8), move |item: u32| {
            if item == 1 {
                panic!("bad item");
            }
            seen_worker.lock().unwrap().push(item);
        })
        .unwrap();
        for i in 0..3 {
            stage.submit(i).unwrap();
        }
        stage.close();
        assert_eq!(*seen.lock().unwrap(), [0, 2]);
        assert_eq!(stage.stats().processed, 3);
    }

    #[test]
    fn multiple_workers_process_everything() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_worker = Arc::clone(&count);
        let config = StageConfig::new("pool")
            .with_workers(4)
            .with_capacity(8)
            .with_overflow(OverflowPolicy::Block);
        let mut stage = Stage::spawn(config, move |_: u32| {
            count_worker.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        for i in 0..100 {
            stage.submit(i).unwrap();
        }
        stage.close();
        assert_eq!(count.load(Ordering::SeqCst), 100);
    }
}
