use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use core_affinity::{set_for_current, CoreId};
use log::{error, trace};
use tokio::runtime::{Builder, Runtime};

use crate::IoContext;

/// Owns the event-loop threads the I/O handlers run on.
///
/// A started worker holds a tokio runtime whose existence is the work
/// guard: the reactor threads stay alive while the worker is started even
/// when no I/O is pending. Supervisors are bound to the worker through
/// the [`IoContext`] returned by [`context`](Worker::context).
///
/// `start` and `stop` are idempotent. `stop` must be called from outside
/// the reactor (dropping a runtime from one of its own threads is not
/// supported); it releases the guard without waiting for spawned tasks,
/// so supervisors should be stopped first.
pub struct Worker {
    name: String,
    threads: usize,
    core_ids: Vec<CoreId>,
    runtime: Option<Runtime>,
}

impl Default for Worker {
    fn default() -> Self {
        Self::new("netmux-worker")
    }
}

impl Worker {
    /// A worker with one reactor thread and the given thread-name prefix.
    pub fn new(name: &str) -> Self {
        Self {
            name: String::from(name),
            threads: 1,
            core_ids: Vec::new(),
            runtime: None,
        }
    }

    /// Number of reactor threads (default 1; with one thread, supervisor
    /// callbacks across all handlers are serialized).
    pub fn worker_threads(mut self, threads: usize) -> Self {
        assert!(threads > 0, "worker needs at least one thread");
        self.threads = threads;
        self
    }

    /// Pin reactor threads to the given CPU cores, round-robin.
    pub fn pin_to(mut self, core_ids: Vec<CoreId>) -> Self {
        self.core_ids = core_ids;
        self
    }

    /// Start the reactor threads. Returns `false` if already started or
    /// if the runtime could not be built.
    pub fn start(&mut self) -> bool {
        if self.runtime.is_some() {
            return false;
        }
        let name = self.name.clone();
        let core_ids = self.core_ids.clone();
        let next_core = Arc::new(AtomicUsize::new(0));
        let builder_result = Builder::new_multi_thread()
            .worker_threads(self.threads)
            .enable_all()
            .thread_name(name)
            .on_thread_start(move || {
                if core_ids.is_empty() {
                    return;
                }
                let n = next_core.fetch_add(1, Ordering::Relaxed);
                let core_id = core_ids[n % core_ids.len()];
                if !set_for_current(core_id) {
                    trace!("could not pin reactor thread to core {:?}", core_id);
                }
            })
            .build();
        match builder_result {
            Ok(runtime) => {
                self.runtime = Some(runtime);
                true
            }
            Err(err) => {
                error!("failed to build worker runtime: {}", err);
                false
            }
        }
    }

    /// Whether the reactor is currently running.
    pub fn is_started(&self) -> bool {
        self.runtime.is_some()
    }

    /// Handle for binding supervisors and spawning onto the reactor.
    pub fn context(&self) -> Option<IoContext> {
        self.runtime.as_ref().map(|rt| rt.handle().clone())
    }

    /// Release the work guard and shut the reactor down. Returns `false`
    /// if not started.
    pub fn stop(&mut self) -> bool {
        match self.runtime.take() {
            Some(runtime) => {
                runtime.shutdown_background();
                true
            }
            None => false,
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_and_stop_are_idempotent() {
        let mut worker = Worker::new("test-worker");
        assert!(!worker.is_started());
        assert!(worker.context().is_none());
        assert!(!worker.stop());

        assert!(worker.start());
        assert!(worker.is_started());
        assert!(!worker.start());
        assert!(worker.context().is_some());

        assert!(worker.stop());
        assert!(!worker.is_started());
        assert!(!worker.stop());
    }

    #[test]
    fn context_runs_tasks() {
        let mut worker = Worker::default().worker_threads(2);
        assert!(worker.start());
        let ctx = worker.context().unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        ctx.spawn(async move {
            let _ = tx.send(1 + 1);
        });
        assert_eq!(rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap(), 2);
        worker.stop();
    }
}
