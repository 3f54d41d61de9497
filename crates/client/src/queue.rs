//! Retry queue for mutations that failed at the network layer.
//!
//! Rows live in the durable store and are replayed on `drain`, oldest first.
//! Replays go straight to the transport, never back through the router, so a
//! failing replay stays one row instead of being queued again.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use offgrid_core::{AppConfig, CacheDb, Error, NewMutation, QueuedMutation};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::fetch::{Request, Transport};

/// How long a queued mutation stays replayable.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retention: chrono::Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { retention: chrono::Duration::hours(24) }
    }
}

impl From<&AppConfig> for RetryPolicy {
    fn from(config: &AppConfig) -> Self {
        Self { retention: config.retention() }
    }
}

/// One row's outcome in a drain pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayRecord {
    pub id: i64,
    pub queue: String,
    pub method: String,
    pub url: String,
    pub attempt_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReplayRecord {
    fn new(row: &QueuedMutation, attempt_count: u32, error: Option<String>) -> Self {
        Self {
            id: row.id,
            queue: row.queue.clone(),
            method: row.method.clone(),
            url: row.url.clone(),
            attempt_count,
            error,
        }
    }
}

/// Outcome of a drain. Drains never fail; problems land here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Replayed and removed.
    pub succeeded: Vec<ReplayRecord>,
    /// Replay failed; still queued with a bumped attempt count.
    pub failed: Vec<ReplayRecord>,
    /// Aged out of the retention window and removed without a replay.
    pub dropped_expired: Vec<ReplayRecord>,
    /// Held back because an earlier mutation to the same resource failed in this pass.
    pub deferred: Vec<ReplayRecord>,
}

impl DrainReport {
    pub fn is_empty(&self) -> bool {
        self.succeeded.is_empty() && self.failed.is_empty() && self.dropped_expired.is_empty() && self.deferred.is_empty()
    }

    fn merge(&mut self, other: DrainReport) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
        self.dropped_expired.extend(other.dropped_expired);
        self.deferred.extend(other.deferred);
    }
}

pub struct RetryQueue {
    db: CacheDb,
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    drain_lock: Mutex<()>,
}

impl std::fmt::Debug for RetryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryQueue").field("policy", &self.policy).finish_non_exhaustive()
    }
}

impl RetryQueue {
    pub fn new(db: CacheDb, transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { db, transport, policy, drain_lock: Mutex::new(()) }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Persist `request` under `queue`. Returns the row id.
    pub async fn enqueue(&self, queue: &str, request: &Request) -> Result<i64, Error> {
        let mutation = NewMutation {
            queue: queue.to_string(),
            resource_key: request.resource_key(),
            method: request.method.as_str().to_string(),
            url: request.url.to_string(),
            headers: request.headers.clone(),
            body: request.body.as_ref().map(|b| b.to_vec()),
        };
        let id = self.db.enqueue_mutation(&mutation).await?;
        tracing::info!(queue, id, method = %request.method, url = %request.url, "mutation queued for replay");
        Ok(id)
    }

    /// Rows waiting in `queue`, oldest first.
    pub async fn pending(&self, queue: &str) -> Result<Vec<QueuedMutation>, Error> {
        self.db.queued_mutations(queue).await
    }

    /// Replay every queue, one queue at a time in name order.
    pub async fn drain(&self) -> DrainReport {
        let _guard = self.drain_lock.lock().await;
        let mut report = DrainReport::default();

        let queues = match self.db.queue_names().await {
            Ok(queues) => queues,
            Err(e) => {
                tracing::warn!(error = %e, "could not list retry queues");
                return report;
            }
        };

        for queue in queues {
            report.merge(self.drain_locked(&queue).await);
        }
        log_report(&report);
        report
    }

    /// Replay a single queue.
    pub async fn drain_queue(&self, queue: &str) -> DrainReport {
        let _guard = self.drain_lock.lock().await;
        let report = self.drain_locked(queue).await;
        log_report(&report);
        report
    }

    async fn drain_locked(&self, queue: &str) -> DrainReport {
        let mut report = DrainReport::default();
        let rows = match self.db.queued_mutations(queue).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(queue, error = %e, "could not load retry queue");
                return report;
            }
        };

        let now = Utc::now();
        let mut blocked: HashSet<String> = HashSet::new();

        for row in rows {
            if row.age(now) > self.policy.retention {
                self.forget(&row).await;
                let reason = Error::RetentionExpired(format!("{} {} queued at {}", row.method, row.url, row.enqueued_at));
                tracing::warn!(queue, id = row.id, error = %reason, "dropping expired mutation");
                report.dropped_expired.push(ReplayRecord::new(&row, row.attempt_count, Some(reason.to_string())));
                continue;
            }

            if blocked.contains(&row.resource_key) {
                report.deferred.push(ReplayRecord::new(&row, row.attempt_count, None));
                continue;
            }

            let outcome = match Request::from_mutation(&row) {
                Ok(request) => self.transport.fetch(&request).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(response) => {
                    self.forget(&row).await;
                    tracing::info!(queue, id = row.id, status = response.status, url = %row.url, "mutation replayed");
                    report.succeeded.push(ReplayRecord::new(&row, row.attempt_count + 1, None));
                }
                Err(e) => {
                    let attempts = match self.db.record_attempt(row.id).await {
                        Ok(n) => n,
                        Err(db_err) => {
                            tracing::warn!(queue, id = row.id, error = %db_err, "could not record replay attempt");
                            row.attempt_count + 1
                        }
                    };
                    tracing::debug!(queue, id = row.id, attempts, error = %e, "replay failed, keeping mutation");
                    blocked.insert(row.resource_key.clone());
                    report.failed.push(ReplayRecord::new(&row, attempts, Some(e.to_string())));
                }
            }
        }

        report
    }

    async fn forget(&self, row: &QueuedMutation) {
        if let Err(e) = self.db.remove_mutation(row.id).await {
            tracing::warn!(queue = %row.queue, id = row.id, error = %e, "could not remove queued mutation");
        }
    }
}

fn log_report(report: &DrainReport) {
    if report.is_empty() {
        tracing::debug!("drain found nothing to replay");
        return;
    }
    tracing::info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        dropped_expired = report.dropped_expired.len(),
        deferred = report.deferred.len(),
        "retry queue drained"
    );
}
