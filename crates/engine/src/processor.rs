//! The background task driving periodic sync and retention.
//!
//! One long-lived tokio task per engine. It wakes on a manual trigger or
//! on the periodic tick, runs a sync batch, and once a day sweeps expired
//! records. Shutdown drains: the in-flight record finishes, the rest of
//! the batch is cancelled at the next record boundary.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{
    sync::{Notify, mpsc},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{error, info, warn};

use crate::{
    Engine,
    dispatch::{Dispatcher, SyncRun},
};

#[derive(Clone, Debug)]
pub struct ProcessorConfig {
    pub sync_interval: Duration,
    pub retention_interval: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(300),
            retention_interval: Duration::from_secs(24 * 60 * 60),
        }
    }
}

pub struct BillProcessor {
    trigger_tx: mpsc::Sender<bool>,
    cancel: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

/// Cheap cloneable handle for queuing manual sync runs, handed to the
/// server so it does not need the processor itself.
#[derive(Clone)]
pub struct SyncTrigger {
    tx: mpsc::Sender<bool>,
}

impl SyncTrigger {
    /// Same semantics as [`BillProcessor::trigger`].
    pub fn trigger(&self, force: bool) -> bool {
        self.tx.try_send(force).is_ok()
    }
}

impl BillProcessor {
    pub fn spawn(engine: Arc<Engine>, dispatcher: Arc<Dispatcher>, config: ProcessorConfig) -> Self {
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<bool>(1);
        let cancel = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(Notify::new());

        let task_cancel = cancel.clone();
        let task_shutdown = shutdown.clone();
        let handle = tokio::spawn(async move {
            let mut sync_tick = time::interval(config.sync_interval);
            sync_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut sweep_tick = time::interval(config.retention_interval);
            sweep_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = task_shutdown.notified() => break,
                    received = trigger_rx.recv() => match received {
                        Some(force) => run_batch(&engine, &dispatcher, force, &task_cancel).await,
                        None => break,
                    },
                    _ = sync_tick.tick() => run_batch(&engine, &dispatcher, false, &task_cancel).await,
                    _ = sweep_tick.tick() => run_sweep(&engine).await,
                }
            }
            info!("bill processor stopped");
        });

        Self {
            trigger_tx,
            cancel,
            shutdown,
            handle,
        }
    }

    pub fn trigger_handle(&self) -> SyncTrigger {
        SyncTrigger {
            tx: self.trigger_tx.clone(),
        }
    }

    /// Queues a manual sync run.
    ///
    /// Returns `false` when a trigger is already queued; the pending run
    /// will pick up the same records.
    pub fn trigger(&self, force: bool) -> bool {
        self.trigger_tx.try_send(force).is_ok()
    }

    /// Signals the task and waits for it to drain.
    pub async fn shutdown(self) {
        self.cancel.store(true, Ordering::Relaxed);
        self.shutdown.notify_one();
        if let Err(err) = self.handle.await {
            warn!("bill processor task aborted: {err}");
        }
    }
}

async fn run_batch(engine: &Engine, dispatcher: &Dispatcher, force: bool, cancel: &AtomicBool) {
    match dispatcher.sync_batch(engine, force, cancel).await {
        Ok(SyncRun::Completed(_)) => {}
        Ok(SyncRun::AlreadyRunning) => info!("sync batch already running, trigger dropped"),
        Err(err) => error!("sync batch failed: {err}"),
    }
}

async fn run_sweep(engine: &Engine) {
    match engine.sweep_retention().await {
        Ok(0) => {}
        Ok(deleted) => info!(deleted, "retention sweep"),
        Err(err) => error!("retention sweep failed: {err}"),
    }
}
