//! Periodic registry maintenance.
//!
//! The [`MaintenanceLoop`] runs a background task that ticks every
//! `maintenance_interval` and lets the router sweep the registry: expired
//! devices and subscriptions are removed, ALIVE announcements, renewals and
//! pending state change events are queued on the worker pool.
//!
//! Shutdown waits up to 5 seconds for the task before giving up on it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, trace};

use crate::error::{EngineError, Result};
use crate::router::Router;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct MaintenanceLoop {
    background_task: Option<JoinHandle<()>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl MaintenanceLoop {
    /// Spawn the maintenance task for `router`.
    pub fn start(router: Arc<Router>, period: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let background_task = tokio::spawn(Self::maintenance_task(router, period, shutdown_rx));

        Self {
            background_task: Some(background_task),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Stop the task, waiting for a sweep in progress to finish.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(()).await;
        }

        let Some(task) = self.background_task.take() else {
            return Ok(());
        };
        match timeout(SHUTDOWN_TIMEOUT, task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(EngineError::Shutdown(format!(
                "Maintenance task panicked: {e}"
            ))),
            Err(_) => Err(EngineError::Shutdown(
                "Maintenance task shutdown timed out after 5 seconds".to_string(),
            )),
        }
    }

    async fn maintenance_task(
        router: Arc<Router>,
        period: Duration,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let mut ticks = interval(period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        ticks.tick().await;
        debug!(?period, "Registry maintenance started");

        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    trace!("Registry maintenance tick");
                    router.maintain();
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }
        debug!("Registry maintenance stopped");
    }
}

impl Drop for MaintenanceLoop {
    fn drop(&mut self) {
        if let Some(task) = self.background_task.take() {
            task.abort();
        }
    }
}
