//! Bounded ingestion queue.
//!
//! Capture callbacks must never block: `submit` is `try_send`, and a full
//! queue drops the event with a warning. Classification runs on a small
//! worker pool that shares the receiving end.

use std::sync::Arc;

use tokio::{
    sync::{Mutex, mpsc},
    task::JoinSet,
};
use tracing::{debug, error, warn};

use crate::{Engine, EngineError, events::RawEvent};

pub fn channel(queue_size: usize) -> (IngestHandle, IngestQueue) {
    let (tx, rx) = mpsc::channel(queue_size.max(1));
    (
        IngestHandle { tx },
        IngestQueue {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Cheap cloneable producer side.
#[derive(Clone)]
pub struct IngestHandle {
    tx: mpsc::Sender<RawEvent>,
}

impl IngestHandle {
    /// Non-blocking enqueue. A full queue drops the event: degradation,
    /// not fault.
    pub fn submit(&self, event: RawEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(source_app = %event.source_app, "ingest queue full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("ingest queue closed, dropping event");
                false
            }
        }
    }
}

/// Consumer side; hand it to `spawn_workers` once at startup.
pub struct IngestQueue {
    rx: Arc<Mutex<mpsc::Receiver<RawEvent>>>,
}

impl IngestQueue {
    /// Spawns `workers` classification workers into `tasks`.
    ///
    /// Workers pull from the shared receiver and run classify + merge;
    /// no error escapes the loop.
    pub fn spawn_workers(self, workers: usize, engine: Arc<Engine>, tasks: &mut JoinSet<()>) {
        for worker in 0..workers.max(1) {
            let rx = self.rx.clone();
            let engine = engine.clone();
            tasks.spawn(async move {
                loop {
                    let received = { rx.lock().await.recv().await };
                    let Some(event) = received else { break };
                    match engine.ingest(event).await {
                        Ok(_) => {}
                        Err(EngineError::Parse(reason)) => {
                            warn!(worker, "event dropped: {reason}");
                        }
                        Err(err) => {
                            error!(worker, "ingest failed: {err}");
                        }
                    }
                }
                debug!(worker, "ingest worker stopped");
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::events::EventKind;

    fn event() -> RawEvent {
        RawEvent::new(
            EventKind::Sms,
            "com.android.mms",
            r#"{"sender":"95588","body":"x"}"#,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let (handle, _queue) = channel(1);
        assert!(handle.submit(event()));
        assert!(!handle.submit(event()));
    }

    #[tokio::test]
    async fn closed_queue_drops_instead_of_panicking() {
        let (handle, queue) = channel(1);
        drop(queue);
        assert!(!handle.submit(event()));
    }
}
