//! Bounded worker pool running protocol tasks.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::error::RouterError;

type Job = (String, BoxFuture<'static, ()>);

/// A fixed number of tasks draining one bounded queue.
///
/// A full queue rejects new work instead of growing. A panicking job is
/// logged and the worker moves on to the next one.
pub struct WorkerPool {
    sender: parking_lot::Mutex<Option<mpsc::Sender<Job>>>,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    capacity: usize,
}

impl WorkerPool {
    pub fn start(threads: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>(capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = (0..threads)
            .map(|id| tokio::spawn(Self::worker(id, receiver.clone())))
            .collect();
        debug!(threads, capacity, "Worker pool started");

        Self {
            sender: parking_lot::Mutex::new(Some(sender)),
            workers: parking_lot::Mutex::new(workers),
            capacity,
        }
    }

    /// Queue `job` under `name`, for logging.
    pub fn submit<F>(&self, name: impl Into<String>, job: F) -> Result<(), RouterError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let Some(sender) = self.sender.lock().clone() else {
            return Err(RouterError::Disabled);
        };

        match sender.try_send((name, job.boxed())) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full((name, _))) => {
                warn!(task = %name, capacity = self.capacity, "Worker queue full, discarding task");
                Err(RouterError::QueueFull(name))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(RouterError::Disabled),
        }
    }

    /// Jobs waiting for a worker.
    pub fn queued(&self) -> usize {
        self.sender
            .lock()
            .as_ref()
            .map_or(0, |sender| self.capacity - sender.capacity())
    }

    /// Stop accepting work, let queued jobs finish within `grace`, then
    /// abort whatever is still running.
    pub async fn shutdown(&self, grace: Duration) {
        self.sender.lock().take();
        let workers = std::mem::take(&mut *self.workers.lock());
        if workers.is_empty() {
            return;
        }

        let aborts: Vec<_> = workers.iter().map(JoinHandle::abort_handle).collect();
        let joined = tokio::time::timeout(grace, futures::future::join_all(workers)).await;
        if joined.is_err() {
            warn!(?grace, "Worker pool did not drain in time, aborting remaining tasks");
            for abort in aborts {
                abort.abort();
            }
        }
        debug!("Worker pool stopped");
    }

    async fn worker(id: usize, receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>) {
        loop {
            let next = receiver.lock().await.recv().await;
            let Some((name, job)) = next else {
                break;
            };

            trace!(worker = id, task = %name, "Running task");
            if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                error!(worker = id, task = %name, "Task panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for worker in self.workers.get_mut().drain(..) {
            worker.abort();
        }
    }
}
