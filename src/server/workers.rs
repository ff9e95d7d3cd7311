//! Fixed-size worker pool.
//!
//! Workers execute per-connection turns handed over by the event loop. The
//! pool itself does nothing to serialize turns for a given connection; the
//! one-shot readiness registration already guarantees at most one
//! outstanding turn per socket.

use std::io;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> io::Result<Self> {
        assert!(size > 0);
        let (sender, receiver) = channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let receiver = Arc::clone(&receiver);
            let handle = std::thread::Builder::new()
                .name(format!("worker-{id}"))
                .spawn(move || run_worker(id, receiver))?;
            workers.push(handle);
        }

        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Queues one job for whichever worker frees up first.
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(sender) = &self.sender {
            let _ = sender.send(Box::new(job));
        }
    }
}

impl Drop for WorkerPool {
    /// Closes the channel and waits for the workers to finish what is
    /// already queued.
    fn drop(&mut self) {
        drop(self.sender.take());
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn run_worker(id: usize, receiver: Arc<Mutex<Receiver<Job>>>) {
    loop {
        let job = {
            let Ok(guard) = receiver.lock() else {
                break;
            };
            guard.recv()
        };
        match job {
            Ok(job) => job(),
            Err(_) => break,
        }
    }
    debug!("worker {} stopped", id);
}
