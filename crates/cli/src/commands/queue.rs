//! Offline queue commands.
//!
//! Sales rung up while the register was offline wait in the local state
//! file until they are replayed against the backend.
//!
//! # Usage
//!
//! ```bash
//! tw-cli queue list
//! tw-cli queue replay
//! tw-cli queue drop 6f1c...   # discard one request
//! tw-cli queue clear
//! ```

use std::fmt::Write as _;
use std::sync::Arc;

use tillwise_admin::ConsoleError;
use tillwise_admin::offline::{OfflineQueue, QueuedRequest, ReplayReport};
use tillwise_admin::store::{FileStore, KeyValueStore};
use tillwise_core::QueuedRequestId;

use super::Context;

/// The queue backed by the local state file.
pub fn open(ctx: &Context) -> OfflineQueue<Arc<FileStore>> {
    OfflineQueue::new(ctx.store.clone(), ctx.config.offline_max_retries)
}

/// List queued requests, oldest first.
///
/// # Errors
///
/// Returns an error if the queue cannot be read.
pub fn list(ctx: &Context) -> Result<String, ConsoleError> {
    Ok(render_pending(&open(ctx).pending()?))
}

fn render_pending(pending: &[QueuedRequest]) -> String {
    if pending.is_empty() {
        return "Offline queue is empty".to_string();
    }
    let mut out = String::new();
    for record in pending {
        let _ = write!(
            out,
            "{}  {} {:<6} {}  retries={}",
            record.id,
            record.created_at.format("%Y-%m-%d %H:%M"),
            record.method,
            record.endpoint,
            record.retry_count
        );
        if let Some(error) = &record.last_error {
            let _ = write!(out, "  last error: {error}");
        }
        out.push('\n');
    }
    out
}

/// Replay queued requests against the backend.
///
/// # Errors
///
/// Returns an error if the queue cannot be read or written.
pub async fn replay(ctx: &Context) -> Result<String, ConsoleError> {
    let report = open(ctx).replay(&ctx.client).await?;
    Ok(render_report(&report))
}

fn render_report(report: &ReplayReport) -> String {
    if report.is_empty() {
        return "Nothing to replay".to_string();
    }
    let mut out = format!(
        "Delivered {}, rejected {}, retrying {}, abandoned {}\n",
        report.delivered.len(),
        report.rejected.len(),
        report.retrying.len(),
        report.abandoned.len()
    );
    for (id, reason) in &report.rejected {
        let _ = writeln!(out, "  rejected {id}: {reason}");
    }
    for record in &report.abandoned {
        let _ = writeln!(
            out,
            "  abandoned {} after {} attempts: {}",
            record.id,
            record.retry_count,
            record.last_error.as_deref().unwrap_or("unknown error")
        );
    }
    out
}

/// Discard one queued request.
///
/// # Errors
///
/// Returns `BadRequest` if no request has that id.
pub fn drop_request(ctx: &Context, id: QueuedRequestId) -> Result<String, ConsoleError> {
    if open(ctx).remove(id)? {
        tracing::warn!(%id, "Queued request discarded by operator");
        Ok(format!("Discarded {id}"))
    } else {
        Err(ConsoleError::BadRequest(format!("no queued request {id}")))
    }
}

/// Remove every queued request. Returns how many were dropped.
///
/// # Errors
///
/// Returns an error if the queue cannot be read or written.
pub fn clear<S: KeyValueStore>(queue: &OfflineQueue<S>) -> Result<usize, ConsoleError> {
    let pending = queue.pending()?;
    for record in &pending {
        queue.remove(record.id)?;
    }
    Ok(pending.len())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use serde_json::json;
    use tillwise_admin::store::MemoryStore;

    use super::*;

    #[test]
    fn test_render_pending_empty() {
        assert_eq!(render_pending(&[]), "Offline queue is empty");
    }

    #[test]
    fn test_render_pending_shows_last_error() {
        let mut record = QueuedRequest::new(
            "rest/v1/rpc/create_pos_transaction_atomic",
            "post",
            json!({}),
            Utc::now(),
        );
        record.retry_count = 2;
        record.last_error = Some("backend unavailable".to_string());

        let text = render_pending(&[record]);
        assert!(text.contains("POST"));
        assert!(text.contains("retries=2"));
        assert!(text.contains("backend unavailable"));
    }

    #[test]
    fn test_render_report_counts() {
        let report = ReplayReport {
            delivered: vec![QueuedRequestId::generate()],
            rejected: vec![(QueuedRequestId::generate(), "INSUFFICIENT_STOCK".to_string())],
            ..ReplayReport::default()
        };
        let text = render_report(&report);
        assert!(text.starts_with("Delivered 1, rejected 1, retrying 0, abandoned 0"));
        assert!(text.contains("INSUFFICIENT_STOCK"));
    }

    #[test]
    fn test_clear_empties_queue() {
        let queue = OfflineQueue::new(MemoryStore::new(), 5);
        queue.enqueue(QueuedRequest::new("a", "POST", json!({}), Utc::now())).unwrap();
        queue.enqueue(QueuedRequest::new("b", "POST", json!({}), Utc::now())).unwrap();

        assert_eq!(clear(&queue).unwrap(), 2);
        assert_eq!(queue.len().unwrap(), 0);
    }
}
