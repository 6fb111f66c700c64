use safar_shared::PersistedRecord;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::persistence::PersistenceLayer;

enum WriteOp {
    Save { key: String, payload: serde_json::Value },
    Clear { key: String },
    Flush(oneshot::Sender<()>),
}

/// Handle the engines use to schedule writes without waiting for them.
///
/// A single background task drains the queue, so writes are applied in the
/// order they were scheduled. The value is snapshotted when the write is
/// scheduled, not when it is applied.
#[derive(Clone)]
pub struct PersistenceHandle {
    tx: mpsc::UnboundedSender<WriteOp>,
    layer: Arc<PersistenceLayer>,
}

impl PersistenceHandle {
    /// Starts the writer task on the current tokio runtime. The task exits
    /// once every handle has been dropped and the queue is drained.
    pub fn spawn(layer: Arc<PersistenceLayer>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<WriteOp>();
        let worker_layer = layer.clone();

        tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                match op {
                    WriteOp::Save { key, payload } => {
                        worker_layer.save(&key, &payload).await;
                    }
                    WriteOp::Clear { key } => {
                        worker_layer.clear(&key).await;
                    }
                    WriteOp::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("Persistence writer stopped");
        });

        Self { tx, layer }
    }

    pub fn layer(&self) -> &Arc<PersistenceLayer> {
        &self.layer
    }

    pub fn schedule_save<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let payload = match serde_json::to_value(value) {
            Ok(payload) => payload,
            Err(e) => {
                error!(key, "Dropping write, record did not serialize: {}", e);
                return;
            }
        };
        self.send(WriteOp::Save {
            key: key.to_string(),
            payload,
        });
    }

    pub fn schedule_clear(&self, key: &str) {
        self.send(WriteOp::Clear { key: key.to_string() });
    }

    /// Resolves once every write scheduled before this call has been applied
    /// (or dropped after failing on every tier).
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(WriteOp::Flush(done_tx));
        let _ = done_rx.await;
    }

    pub async fn load<T: PersistedRecord>(&self, key: &str) -> Option<T> {
        self.layer.load(key).await
    }

    fn send(&self, op: WriteOp) {
        if self.tx.send(op).is_err() {
            warn!("Persistence writer is gone; write dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use chrono::Utc;
    use safar_core::ManualClock;

    #[tokio::test]
    async fn test_writes_apply_in_issue_order() {
        let clock = ManualClock::new(Utc::now());
        let layer = Arc::new(PersistenceLayer::new(
            "test",
            vec![Arc::new(MemoryStore::new())],
            Arc::new(clock),
        ));
        let handle = PersistenceHandle::spawn(layer);

        for n in 0..50u32 {
            handle.schedule_save("counter", &n.to_string());
        }
        handle.flush().await;

        assert_eq!(handle.load::<String>("counter").await.as_deref(), Some("49"));

        handle.schedule_clear("counter");
        handle.flush().await;
        assert_eq!(handle.load::<String>("counter").await, None);
    }
}
