//! Asynchronous persistence queue
//!
//! The engine enqueues store operations and moves on; a writer task applies
//! them in order and reports failures on a separate channel.

use pomo_api::SessionRecord;
use pomo_store::{SessionStore, StoreError};
use pomo_util::{SessionId, UserId};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One queued store operation
#[derive(Debug)]
pub enum StoreOp {
    Upsert(SessionRecord),
    Delete(SessionId),
    /// Acknowledged once every earlier operation has been applied
    Flush(oneshot::Sender<()>),
}

/// Kind of write that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOperation {
    Upsert,
    Delete,
}

impl PersistOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersistOperation::Upsert => "upsert",
            PersistOperation::Delete => "delete",
        }
    }
}

impl fmt::Display for PersistOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A background write that did not make it to the store
#[derive(Debug, Error)]
#[error("{operation} of session {session_id} failed: {error}")]
pub struct PersistFailure {
    pub operation: PersistOperation,
    pub session_id: SessionId,
    pub error: StoreError,
}

/// Sending half of the persistence queue
#[derive(Debug, Clone)]
pub struct PersistQueue {
    tx: mpsc::UnboundedSender<StoreOp>,
}

impl PersistQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StoreOp>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue an upsert. Returns false if the writer has gone away.
    pub fn upsert(&self, record: SessionRecord) -> bool {
        self.tx.send(StoreOp::Upsert(record)).is_ok()
    }

    /// Queue a delete. Returns false if the writer has gone away.
    pub fn delete(&self, id: SessionId) -> bool {
        self.tx.send(StoreOp::Delete(id)).is_ok()
    }

    /// Wait until everything queued so far has been applied (or has failed).
    /// Returns false if the writer has gone away.
    pub async fn flush(&self) -> bool {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(StoreOp::Flush(ack_tx)).is_err() {
            return false;
        }
        ack_rx.await.is_ok()
    }
}

/// Spawn the writer task. It runs until every `PersistQueue` clone is dropped.
pub fn spawn_writer(
    store: Arc<dyn SessionStore>,
    user: UserId,
    mut rx: mpsc::UnboundedReceiver<StoreOp>,
    failures: mpsc::UnboundedSender<PersistFailure>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(op) = rx.recv().await {
            let (operation, session_id, result) = match op {
                StoreOp::Upsert(record) => {
                    let result = store.upsert(&user, &record).await;
                    (PersistOperation::Upsert, record.id, result)
                }
                StoreOp::Delete(id) => {
                    let result = store.delete(&user, &id).await;
                    (PersistOperation::Delete, id, result)
                }
                StoreOp::Flush(ack) => {
                    let _ = ack.send(());
                    continue;
                }
            };

            match result {
                Ok(()) => debug!(%session_id, op = %operation, "Store write applied"),
                Err(error) => {
                    warn!(%session_id, op = %operation, error = %error, "Store write failed");
                    let _ = failures.send(PersistFailure {
                        operation,
                        session_id,
                        error,
                    });
                }
            }
        }
        debug!("Persistence writer stopped");
    })
}
