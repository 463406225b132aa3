//! Durable offline request queue.
//!
//! Requests made while the register is offline are stored in the local
//! key-value store and replayed in FIFO order once connectivity returns.
//! Being offline is not an error: callers get a queued outcome instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tillwise_core::QueuedRequestId;
use tracing::{error, info, instrument, warn};

use crate::backend::ReplayTransport;
use crate::store::{KeyValueStore, KeyValueStoreExt, StoreError};

/// Store key holding the queue.
const QUEUE_KEY: &str = "offline:queue";

/// Default number of failed sends before a record is abandoned.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Errors that can occur when using the queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("offline queue storage error: {0}")]
    Store(#[from] StoreError),
}

/// A request waiting to be replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedRequest {
    pub id: QueuedRequestId,
    /// Path relative to the backend base URL.
    pub endpoint: String,
    /// HTTP method, upper-case.
    pub method: String,
    /// JSON body.
    pub payload: serde_json::Value,
    /// Failed replay attempts so far.
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    /// Error from the latest failed attempt.
    #[serde(default)]
    pub last_error: Option<String>,
}

impl QueuedRequest {
    /// A fresh record with no attempts.
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        method: impl Into<String>,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: QueuedRequestId::generate(),
            endpoint: endpoint.into(),
            method: method.into().to_ascii_uppercase(),
            payload,
            retry_count: 0,
            created_at: now,
            last_error: None,
        }
    }
}

/// Outcome of a replay pass.
#[derive(Debug, Default)]
pub struct ReplayReport {
    /// Sent and accepted.
    pub delivered: Vec<QueuedRequestId>,
    /// Sent but refused by the backend (`"success": false`); not retried.
    pub rejected: Vec<(QueuedRequestId, String)>,
    /// Failed and kept for the next pass.
    pub retrying: Vec<QueuedRequestId>,
    /// Failed too often and dropped.
    pub abandoned: Vec<QueuedRequest>,
}

impl ReplayReport {
    /// Whether the pass did nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.delivered.is_empty()
            && self.rejected.is_empty()
            && self.retrying.is_empty()
            && self.abandoned.is_empty()
    }
}

/// FIFO queue persisted in a [`KeyValueStore`].
#[derive(Debug)]
pub struct OfflineQueue<S> {
    store: S,
    max_retries: u32,
}

impl<S: KeyValueStore> OfflineQueue<S> {
    /// Create a queue dropping records after `max_retries` failed sends.
    #[must_use]
    pub const fn new(store: S, max_retries: u32) -> Self {
        Self { store, max_retries }
    }

    fn load(&self) -> Result<Vec<QueuedRequest>, QueueError> {
        Ok(self.store.get_json(QUEUE_KEY)?.unwrap_or_default())
    }

    fn save(&self, records: &[QueuedRequest]) -> Result<(), QueueError> {
        if records.is_empty() {
            self.store.remove(QUEUE_KEY)?;
        } else {
            self.store.set_json(QUEUE_KEY, &records)?;
        }
        Ok(())
    }

    /// Append `record`.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be persisted.
    pub fn enqueue(&self, record: QueuedRequest) -> Result<QueuedRequestId, QueueError> {
        let mut records = self.load()?;
        let id = record.id;
        info!(%id, endpoint = %record.endpoint, "Request queued for replay");
        records.push(record);
        self.save(&records)?;
        Ok(id)
    }

    /// All records, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read.
    pub fn pending(&self) -> Result<Vec<QueuedRequest>, QueueError> {
        self.load()
    }

    /// Number of queued records.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read.
    pub fn len(&self) -> Result<usize, QueueError> {
        Ok(self.load()?.len())
    }

    /// Remove a record. Returns whether it was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read or written.
    pub fn remove(&self, id: QueuedRequestId) -> Result<bool, QueueError> {
        let mut records = self.load()?;
        let before = records.len();
        records.retain(|r| r.id != id);
        let removed = records.len() != before;
        if removed {
            self.save(&records)?;
        }
        Ok(removed)
    }

    /// Count a failed attempt. Returns the new retry count, or `None` if
    /// the record is gone.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read or written.
    pub fn record_failure(
        &self,
        id: QueuedRequestId,
        error: &str,
    ) -> Result<Option<u32>, QueueError> {
        let mut records = self.load()?;
        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        record.retry_count = record.retry_count.saturating_add(1);
        record.last_error = Some(error.to_string());
        let count = record.retry_count;
        self.save(&records)?;
        Ok(Some(count))
    }

    /// Send every queued record through `transport`, oldest first.
    ///
    /// A retryable failure (network down, rate limit, 5xx) stops the pass so
    /// later records are not sent ahead of it. Records reaching the retry
    /// limit are dropped and reported as abandoned.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read or written.
    #[instrument(skip(self, transport))]
    pub async fn replay<T: ReplayTransport>(&self, transport: &T) -> Result<ReplayReport, QueueError> {
        let mut report = ReplayReport::default();

        for record in self.load()? {
            match transport.send(&record).await {
                Ok(response) => {
                    self.remove(record.id)?;
                    if response.get("success") == Some(&serde_json::Value::Bool(false)) {
                        let reason = response
                            .get("error_code")
                            .or_else(|| response.get("errorCode"))
                            .and_then(|v| v.as_str())
                            .unwrap_or("rejected")
                            .to_string();
                        warn!(id = %record.id, %reason, "Replayed request rejected by backend");
                        report.rejected.push((record.id, reason));
                    } else {
                        info!(id = %record.id, "Replayed request delivered");
                        report.delivered.push(record.id);
                    }
                }
                Err(e) => {
                    let retries = self
                        .record_failure(record.id, &e.to_string())?
                        .unwrap_or(record.retry_count + 1);

                    if retries >= self.max_retries {
                        self.remove(record.id)?;
                        error!(
                            id = %record.id,
                            endpoint = %record.endpoint,
                            retries,
                            error = %e,
                            "Abandoning queued request after repeated failures"
                        );
                        report.abandoned.push(QueuedRequest {
                            retry_count: retries,
                            last_error: Some(e.to_string()),
                            ..record
                        });
                        if e.is_retryable() {
                            break;
                        }
                        continue;
                    }

                    warn!(id = %record.id, retries, error = %e, "Replay failed, will retry");
                    report.retrying.push(record.id);
                    if e.is_retryable() {
                        break;
                    }
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::backend::BackendError;
    use crate::store::MemoryStore;

    /// Answers each send with the next scripted response.
    struct ScriptedTransport {
        responses: Mutex<Vec<Result<serde_json::Value, BackendError>>>,
        sent: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(mut responses: Vec<Result<serde_json::Value, BackendError>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    impl ReplayTransport for ScriptedTransport {
        async fn send(&self, record: &QueuedRequest) -> Result<serde_json::Value, BackendError> {
            self.sent
                .lock()
                .unwrap()
                .push(record.payload["n"].to_string());
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(json!({ "success": true })))
        }
    }

    fn record(n: u32) -> QueuedRequest {
        QueuedRequest::new("rest/v1/rpc/create_pos_transaction_atomic", "post", json!({ "n": n }), Utc::now())
    }

    #[test]
    fn test_enqueue_is_fifo() {
        let queue = OfflineQueue::new(MemoryStore::new(), DEFAULT_MAX_RETRIES);
        queue.enqueue(record(1)).unwrap();
        queue.enqueue(record(2)).unwrap();

        let pending = queue.pending().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].payload["n"], 1);
        assert_eq!(pending[0].method, "POST");
    }

    #[test]
    fn test_record_failure() {
        let queue = OfflineQueue::new(MemoryStore::new(), DEFAULT_MAX_RETRIES);
        let id = queue.enqueue(record(1)).unwrap();

        assert_eq!(queue.record_failure(id, "timeout").unwrap(), Some(1));
        let pending = queue.pending().unwrap();
        assert_eq!(pending[0].last_error.as_deref(), Some("timeout"));
        assert_eq!(queue.record_failure(QueuedRequestId::generate(), "x").unwrap(), None);
    }

    #[tokio::test]
    async fn test_replay_delivers_in_order() {
        let queue = OfflineQueue::new(MemoryStore::new(), DEFAULT_MAX_RETRIES);
        queue.enqueue(record(1)).unwrap();
        queue.enqueue(record(2)).unwrap();
        let transport = ScriptedTransport::new(vec![]);

        let report = queue.replay(&transport).await.unwrap();

        assert_eq!(report.delivered.len(), 2);
        assert_eq!(*transport.sent.lock().unwrap(), vec!["1", "2"]);
        assert_eq!(queue.len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_retryable_failure_stops_pass() {
        let queue = OfflineQueue::new(MemoryStore::new(), DEFAULT_MAX_RETRIES);
        queue.enqueue(record(1)).unwrap();
        queue.enqueue(record(2)).unwrap();
        let transport = ScriptedTransport::new(vec![Err(BackendError::Unavailable("offline".to_string()))]);

        let report = queue.replay(&transport).await.unwrap();

        assert_eq!(report.retrying.len(), 1);
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
        assert_eq!(queue.pending().unwrap()[0].retry_count, 1);
        assert_eq!(queue.len().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_abandon_after_max_retries() {
        let queue = OfflineQueue::new(MemoryStore::new(), 2);
        queue.enqueue(record(1)).unwrap();
        let failing = || {
            ScriptedTransport::new(vec![Err(BackendError::Status {
                status: 500,
                body: "boom".to_string(),
            })])
        };

        let first = queue.replay(&failing()).await.unwrap();
        assert!(first.abandoned.is_empty());

        let second = queue.replay(&failing()).await.unwrap();
        assert_eq!(second.abandoned.len(), 1);
        assert_eq!(second.abandoned[0].retry_count, 2);
        assert_eq!(queue.len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_abandon_on_retryable_failure_stops_pass() {
        let queue = OfflineQueue::new(MemoryStore::new(), 1);
        queue.enqueue(record(1)).unwrap();
        queue.enqueue(record(2)).unwrap();
        let transport = ScriptedTransport::new(vec![Err(BackendError::Unavailable("offline".to_string()))]);

        let report = queue.replay(&transport).await.unwrap();

        assert_eq!(report.abandoned.len(), 1);
        assert_eq!(*transport.sent.lock().unwrap(), vec!["1"]);
        let pending = queue.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].payload["n"], 2);
        assert_eq!(pending[0].retry_count, 0);
    }

    #[tokio::test]
    async fn test_business_rejection_is_not_retried() {
        let queue = OfflineQueue::new(MemoryStore::new(), DEFAULT_MAX_RETRIES);
        queue.enqueue(record(1)).unwrap();
        let transport = ScriptedTransport::new(vec![Ok(json!({
            "success": false,
            "error_code": "INSUFFICIENT_STOCK"
        }))]);

        let report = queue.replay(&transport).await.unwrap();

        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].1, "INSUFFICIENT_STOCK");
        assert_eq!(queue.len().unwrap(), 0);
    }
}
