//! SQLite-backed [`WorkQueue`].
//!
//! Messages live in `queue_messages`, so any process sharing the
//! database file can produce and consume. Claims run in an immediate
//! transaction; an in-flight message whose visibility timeout expires is
//! claimable again.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::{
    Claim, Delivery, EnqueueOutcome, NackOutcome, QueueError, QueueMessage, QueueStats,
    RetryPolicy, WorkQueue,
};
use crate::db::{format_timestamp, Database};

/// Visibility and retry settings.
#[derive(Debug, Clone, Copy)]
pub struct QueueSettings {
    /// How long a claimed message stays invisible to other consumers.
    pub visibility_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(3600),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Clone)]
pub struct SqliteQueue {
    db: Database,
    name: String,
    settings: QueueSettings,
    notify: Arc<Notify>,
}

fn offset(now: chrono::DateTime<Utc>, delay: Duration) -> chrono::DateTime<Utc> {
    now + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::days(3650))
}

impl SqliteQueue {
    pub fn new(db: Database, name: impl Into<String>, settings: QueueSettings) -> Self {
        Self {
            db,
            name: name.into(),
            settings,
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }
}

#[async_trait]
impl WorkQueue for SqliteQueue {
    async fn enqueue(&self, message: &QueueMessage) -> Result<EnqueueOutcome, QueueError> {
        let inserted = self.db.with_conn(|conn| {
            let now = format_timestamp(Utc::now());
            Ok(conn.execute(
                "INSERT OR IGNORE INTO queue_messages
                 (queue, job_id, report_id, state, deliveries, visible_at, enqueued_at, updated_at)
                 VALUES (?1, ?2, ?3, 'ready', 0, ?4, ?4, ?4)",
                params![self.name, message.job_id, message.report_id, now],
            )?)
        })?;

        if inserted == 0 {
            debug!(job_id = %message.job_id, "Duplicate enqueue ignored");
            return Ok(EnqueueOutcome::Duplicate);
        }

        info!(job_id = %message.job_id, queue = %self.name, "Enqueued job");
        self.notify.notify_one();
        Ok(EnqueueOutcome::Enqueued)
    }

    async fn claim(&self) -> Result<Claim, QueueError> {
        let max_deliveries = self.settings.retry.max_deliveries;
        let visibility = self.settings.visibility_timeout;

        let claim = self.db.with_transaction(|tx| {
            let mut abandoned = Vec::new();
            loop {
                let now = Utc::now();
                let ts = format_timestamp(now);
                let candidate = tx
                    .query_row(
                        "SELECT id, job_id, report_id, deliveries FROM queue_messages
                         WHERE queue = ?1 AND state IN ('ready', 'inflight') AND visible_at <= ?2
                         ORDER BY visible_at, id LIMIT 1",
                        params![self.name, ts],
                        |r| {
                            Ok((
                                r.get::<_, i64>(0)?,
                                r.get::<_, String>(1)?,
                                r.get::<_, String>(2)?,
                                r.get::<_, u32>(3)?,
                            ))
                        },
                    )
                    .optional()?;

                let Some((id, job_id, report_id, deliveries)) = candidate else {
                    return Ok(Claim {
                        delivery: None,
                        abandoned,
                    });
                };

                if deliveries >= max_deliveries {
                    warn!(%job_id, deliveries, "Delivery budget exhausted, dead-lettering");
                    tx.execute(
                        "UPDATE queue_messages SET state = 'dead', updated_at = ?2,
                         last_error = COALESCE(last_error, 'delivery budget exhausted')
                         WHERE id = ?1",
                        params![id, ts],
                    )?;
                    abandoned.push(Delivery {
                        id,
                        message: QueueMessage { report_id, job_id },
                        deliveries,
                    });
                    continue;
                }

                tx.execute(
                    "UPDATE queue_messages SET state = 'inflight', deliveries = deliveries + 1,
                     visible_at = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id, format_timestamp(offset(now, visibility)), ts],
                )?;

                return Ok(Claim {
                    delivery: Some(Delivery {
                        id,
                        message: QueueMessage { report_id, job_id },
                        deliveries: deliveries + 1,
                    }),
                    abandoned,
                });
            }
        })?;

        if let Some(delivery) = &claim.delivery {
            debug!(
                job_id = %delivery.message.job_id,
                deliveries = delivery.deliveries,
                "Claimed message"
            );
        }
        Ok(claim)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE queue_messages SET state = 'done', updated_at = ?2
                 WHERE id = ?1 AND state = 'inflight'",
                params![delivery.id, format_timestamp(Utc::now())],
            )?)
        })?;
        if changed == 0 {
            return Err(QueueError::UnknownDelivery(delivery.id));
        }
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, error: &str) -> Result<NackOutcome, QueueError> {
        let now = Utc::now();
        let retry = self.settings.retry;

        let outcome = if retry.allows_redelivery(delivery.deliveries) {
            let at = offset(now, retry.backoff(delivery.deliveries));
            let changed = self.db.with_conn(|conn| {
                Ok(conn.execute(
                    "UPDATE queue_messages SET state = 'ready', visible_at = ?2, last_error = ?3,
                     updated_at = ?4 WHERE id = ?1 AND state = 'inflight'",
                    params![delivery.id, format_timestamp(at), error, format_timestamp(now)],
                )?)
            })?;
            if changed == 0 {
                return Err(QueueError::UnknownDelivery(delivery.id));
            }
            NackOutcome::Redeliver { at }
        } else {
            let changed = self.db.with_conn(|conn| {
                Ok(conn.execute(
                    "UPDATE queue_messages SET state = 'dead', last_error = ?2, updated_at = ?3
                     WHERE id = ?1 AND state = 'inflight'",
                    params![delivery.id, error, format_timestamp(now)],
                )?)
            })?;
            if changed == 0 {
                return Err(QueueError::UnknownDelivery(delivery.id));
            }
            NackOutcome::DeadLettered
        };

        warn!(
            job_id = %delivery.message.job_id,
            deliveries = delivery.deliveries,
            ?outcome,
            "Delivery failed: {}",
            error
        );
        Ok(outcome)
    }

    async fn stats(&self) -> Result<QueueStats, QueueError> {
        let stats = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT state, COUNT(*) FROM queue_messages WHERE queue = ?1 GROUP BY state",
            )?;
            let rows = stmt
                .query_map(params![self.name], |r| {
                    Ok((r.get::<_, String>(0)?, r.get::<_, u64>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut stats = QueueStats::default();
            for (state, count) in rows {
                match state.as_str() {
                    "ready" => stats.ready = count,
                    "inflight" => stats.inflight = count,
                    "done" => stats.done = count,
                    "dead" => stats.dead = count,
                    _ => {}
                }
            }
            Ok(stats)
        })?;
        Ok(stats)
    }

    async fn wait_for_message(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(max_deliveries: u32) -> SqliteQueue {
        let db = Database::open_in_memory().unwrap();
        SqliteQueue::new(
            db,
            crate::queue::REPORT_QUEUE,
            QueueSettings {
                visibility_timeout: Duration::from_secs(60),
                retry: RetryPolicy {
                    max_deliveries,
                    backoff_base: Duration::ZERO,
                },
            },
        )
    }

    #[tokio::test]
    async fn test_enqueue_dedups_by_job_id() {
        let q = queue(1);
        let msg = QueueMessage::new("r1", "j1");
        assert_eq!(q.enqueue(&msg).await.unwrap(), EnqueueOutcome::Enqueued);
        assert_eq!(q.enqueue(&msg).await.unwrap(), EnqueueOutcome::Duplicate);
        assert_eq!(q.stats().await.unwrap().ready, 1);
    }

    #[tokio::test]
    async fn test_dequeue_claims_once_and_ack_completes() {
        let q = queue(1);
        q.enqueue(&QueueMessage::new("r1", "j1")).await.unwrap();

        let delivery = q.dequeue().await.unwrap().unwrap();
        assert_eq!(delivery.message.job_id, "j1");
        assert_eq!(delivery.deliveries, 1);
        assert!(q.dequeue().await.unwrap().is_none());

        q.ack(&delivery).await.unwrap();
        let stats = q.stats().await.unwrap();
        assert_eq!(stats.done, 1);
        assert_eq!(stats.inflight, 0);
        assert!(matches!(
            q.ack(&delivery).await,
            Err(QueueError::UnknownDelivery(_))
        ));
    }

    #[tokio::test]
    async fn test_messages_are_claimed_in_fifo_order() {
        let q = queue(1);
        q.enqueue(&QueueMessage::new("r1", "j1")).await.unwrap();
        q.enqueue(&QueueMessage::new("r2", "j2")).await.unwrap();
        assert_eq!(q.dequeue().await.unwrap().unwrap().message.job_id, "j1");
        assert_eq!(q.dequeue().await.unwrap().unwrap().message.job_id, "j2");
    }

    #[tokio::test]
    async fn test_nack_redelivers_then_dead_letters() {
        let q = queue(2);
        q.enqueue(&QueueMessage::new("r1", "j1")).await.unwrap();

        let first = q.dequeue().await.unwrap().unwrap();
        let outcome = q.nack(&first, "store unavailable").await.unwrap();
        assert!(matches!(outcome, NackOutcome::Redeliver { .. }));

        let second = q.dequeue().await.unwrap().unwrap();
        assert_eq!(second.deliveries, 2);
        assert_eq!(
            q.nack(&second, "store unavailable").await.unwrap(),
            NackOutcome::DeadLettered
        );

        assert!(q.dequeue().await.unwrap().is_none());
        assert_eq!(q.stats().await.unwrap().dead, 1);
    }

    #[tokio::test]
    async fn test_expired_claim_is_redelivered_within_budget() {
        let db = Database::open_in_memory().unwrap();
        let q = SqliteQueue::new(
            db,
            "test",
            QueueSettings {
                visibility_timeout: Duration::ZERO,
                retry: RetryPolicy {
                    max_deliveries: 2,
                    backoff_base: Duration::ZERO,
                },
            },
        );
        q.enqueue(&QueueMessage::new("r1", "j1")).await.unwrap();

        let first = q.dequeue().await.unwrap().unwrap();
        let second = q.dequeue().await.unwrap().unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.deliveries, 2);

        // Budget spent: the next expiry dead-letters instead of delivering
        // and reports the message as abandoned.
        let claim = q.claim().await.unwrap();
        assert!(claim.delivery.is_none());
        assert_eq!(claim.abandoned.len(), 1);
        assert_eq!(claim.abandoned[0].message.job_id, "j1");
        assert_eq!(claim.abandoned[0].deliveries, 2);
        assert_eq!(q.stats().await.unwrap().dead, 1);

        assert!(q.claim().await.unwrap().abandoned.is_empty());
    }

    #[tokio::test]
    async fn test_queues_are_isolated_by_name() {
        let db = Database::open_in_memory().unwrap();
        let a = SqliteQueue::new(db.clone(), "a", QueueSettings::default());
        let b = SqliteQueue::new(db, "b", QueueSettings::default());
        a.enqueue(&QueueMessage::new("r1", "j1")).await.unwrap();
        assert!(b.dequeue().await.unwrap().is_none());
        assert_eq!(
            b.enqueue(&QueueMessage::new("r1", "j1")).await.unwrap(),
            EnqueueOutcome::Enqueued
        );
    }
}
