//! Background persistence of freshly synthesized variants
//!
//! Jobs run on their own thread. If the thread cannot be spawned the job is
//! taken back and run on the caller's thread, so an artifact is never lost.

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Tracks in-flight persistence threads
#[derive(Debug, Default)]
pub struct PersistenceWorker {
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl PersistenceWorker {
    /// A worker with nothing in flight
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `job` on a new thread, or synchronously if spawning fails
    ///
    /// Returns `true` when the job was handed to a thread.
    pub fn spawn<F>(&self, label: &str, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let slot = Arc::new(Mutex::new(Some(job)));
        let thread_slot = Arc::clone(&slot);
        let spawned = thread::Builder::new()
            .name(format!("parsanol-persist-{}", label))
            .spawn(move || {
                if let Some(job) = thread_slot.lock().take() {
                    job();
                }
            });

        match spawned {
            Ok(handle) => {
                let mut in_flight = self.in_flight.lock();
                in_flight.retain(|h| !h.is_finished());
                in_flight.push(handle);
                true
            }
            Err(e) => {
                log_warn!("cannot spawn persistence thread ({}); writing synchronously", e);
                if let Some(job) = slot.lock().take() {
                    job();
                }
                false
            }
        }
    }

    /// Number of threads that have not finished yet
    pub fn pending(&self) -> usize {
        self.in_flight
            .lock()
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    /// Block until every outstanding job has completed
    pub fn drain(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.in_flight.lock());
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if handle.join().is_err() {
                    log_warn!("persistence thread panicked");
                }
            }
        }
    }
}

impl Drop for PersistenceWorker {
    fn drop(&mut self) {
        self.drain();
    }
}
