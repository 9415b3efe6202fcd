// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! A fixed-size pool of worker threads draining a FIFO request queue.
//!
//! Each worker loops `while queue is empty { wait }`, so enqueuing one job only ever needs to
//! wake one worker — `notify_one` is correct here, not `notify_all`. Using `notify_all` would
//! just wake every idle worker to have all but one immediately re-check the predicate and go back
//! to sleep, which is wasted thundering-herd work under load.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, info};

/// Lower/upper bound on the configurable worker count (§6).
pub const MIN_WORKERS: usize = 4;
pub const MAX_WORKERS: usize = 50;
pub const DEFAULT_WORKERS: usize = 8;

/// Clamps a requested worker count into `[MIN_WORKERS, MAX_WORKERS]`.
pub fn clamp_worker_count(requested: usize) -> usize {
    requested.clamp(MIN_WORKERS, MAX_WORKERS)
}

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Job(Job),
    Shutdown,
}

struct Queue {
    jobs: Mutex<VecDeque<Message>>,
    not_empty: Condvar,
}

impl Queue {
    fn new() -> Self {
        Self { jobs: Mutex::new(VecDeque::new()), not_empty: Condvar::new() }
    }

    fn push(&self, msg: Message) {
        let mut jobs = self.jobs.lock().unwrap();
        jobs.push_back(msg);
        drop(jobs);
        self.not_empty.notify_one();
    }

    fn pop(&self) -> Message {
        let mut jobs = self.jobs.lock().unwrap();
        loop {
            if let Some(msg) = jobs.pop_front() {
                return msg;
            }
            jobs = self.not_empty.wait(jobs).unwrap();
        }
    }

    fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }
}

/// A pool of OS threads servicing an FIFO job queue.
pub struct WorkerPool {
    queue: Arc<Queue>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `worker_count` threads, clamped to `[MIN_WORKERS, MAX_WORKERS]`.
    pub fn new(worker_count: usize) -> Self {
        let worker_count = clamp_worker_count(worker_count);
        let queue = Arc::new(Queue::new());
        let mut handles = Vec::with_capacity(worker_count);

        for id in 0..worker_count {
            let queue = queue.clone();
            let handle = thread::Builder::new()
                .name(format!("rpc-worker-{id}"))
                .spawn(move || worker_loop(id, queue))
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }

        info!("started worker pool with {worker_count} threads");
        Self { queue, handles }
    }

    /// Enqueues `job` to be run by the next available worker.
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue.push(Message::Job(Box::new(job)));
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Pushes one shutdown message per worker and joins every thread. Jobs already queued ahead
    /// of the shutdown messages still run first, since the queue is strict FIFO.
    pub fn shutdown(mut self) {
        for _ in 0..self.handles.len() {
            self.queue.push(Message::Shutdown);
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        info!("worker pool shut down");
    }
}

fn worker_loop(id: usize, queue: Arc<Queue>) {
    loop {
        match queue.pop() {
            Message::Job(job) => job(),
            Message::Shutdown => {
                debug!("worker {id} received shutdown");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn worker_count_is_clamped() {
        assert_eq!(clamp_worker_count(0), MIN_WORKERS);
        assert_eq!(clamp_worker_count(1000), MAX_WORKERS);
        assert_eq!(clamp_worker_count(8), 8);
    }

    #[test]
    fn jobs_run_in_fifo_order() {
        let pool = WorkerPool::new(MIN_WORKERS);
        let (tx, rx) = mpsc::channel();
        for i in 0..20 {
            let tx = tx.clone();
            pool.submit(move || tx.send(i).unwrap());
        }
        drop(tx);

        let mut seen = 0;
        for _ in 0..20 {
            rx.recv_timeout(Duration::from_secs(2)).unwrap();
            seen += 1;
        }
        assert_eq!(seen, 20);
        pool.shutdown();
    }

    #[test]
    fn shutdown_drains_queued_work_first() {
        let pool = WorkerPool::new(MIN_WORKERS);
        let completed = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let completed = completed.clone();
            pool.submit(move || {
                completed.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.shutdown();
        assert_eq!(completed.load(Ordering::SeqCst), 100);
    }
}
