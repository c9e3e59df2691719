//! Fixed-size worker pool for asynchronous lifecycle work
//!
//! Jobs are fed through a bounded channel. Submission never blocks: a full
//! queue is reported to the caller. Shutting down closes the channel, lets the
//! workers drain what is already queued and joins them.

use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use crate::error::{SlError, SlResult};

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct ThreadPool {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    pub fn new(name: &str, threads: usize, capacity: usize) -> io::Result<Self> {
        let (sender, receiver) = bounded::<Job>(capacity.max(1));
        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads.max(1) {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-{}", name, i))
                .spawn(move || worker_loop(receiver))?;
            workers.push(handle);
        }
        tracing::debug!("Started {} worker(s) '{}'", workers.len(), name);

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        })
    }

    pub fn submit(&self, job: Job) -> SlResult<()> {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return Err(SlError::InvalidState);
        };
        sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => {
                tracing::warn!("Work queue full, refusing job");
                SlError::ResourceExhausted
            }
            TrySendError::Disconnected(_) => SlError::InvalidState,
        })
    }

    /// Stop accepting work, drain the queue and join the workers. A worker
    /// calling this does not join itself.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        let workers = std::mem::take(&mut *self.workers.lock());
        let current = thread::current().id();
        for handle in workers {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::error!("Worker thread terminated abnormally");
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.sender.lock().is_none()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(receiver: Receiver<Job>) {
    for job in receiver.iter() {
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            tracing::error!("Worker job panicked");
        }
    }
}
