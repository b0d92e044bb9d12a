//! libSQL-backed queue with visibility timeouts and a dead-letter state.
//!
//! All queues share the `queue_messages` table and are partitioned by
//! name. Receiving is a single `UPDATE ... RETURNING`, so two consumers
//! never get the same visible message.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Delivery, MessageQueue};
use crate::error::{DatabaseError, QueueError};
use crate::store::migrations;

/// Message counts for one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Visible and waiting.
    pub visible: u32,
    /// Received, not yet acknowledged, still hidden.
    pub in_flight: u32,
    /// Parked in the dead-letter state.
    pub dead_lettered: u32,
}

/// Durable queue stored in libSQL.
pub struct LibSqlQueue {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    name: String,
    visibility_timeout: Duration,
}

impl LibSqlQueue {
    /// Open (or create) a local database file holding the queue.
    pub async fn new_local(
        path: &Path,
        name: &str,
        visibility_timeout: Duration,
    ) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let queue = Self::from_database(Arc::new(db), name, visibility_timeout)?;
        migrations::migrate_queue(&queue.conn).await?;
        info!(path = %path.display(), queue = name, "Queue opened");
        Ok(queue)
    }

    /// Open the queue on a database already held by another component.
    pub async fn shared(
        db: Arc<LibSqlDatabase>,
        name: &str,
        visibility_timeout: Duration,
    ) -> Result<Self, DatabaseError> {
        let queue = Self::from_database(db, name, visibility_timeout)?;
        migrations::migrate_queue(&queue.conn).await?;
        info!(queue = name, "Queue opened on shared database");
        Ok(queue)
    }

    /// Create an in-memory queue (for tests).
    pub async fn new_memory(name: &str, visibility_timeout: Duration) -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let queue = Self::from_database(Arc::new(db), name, visibility_timeout)?;
        migrations::migrate_queue(&queue.conn).await?;
        Ok(queue)
    }

    fn from_database(
        db: Arc<LibSqlDatabase>,
        name: &str,
        visibility_timeout: Duration,
    ) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db,
            conn,
            name: name.to_string(),
            visibility_timeout,
        })
    }

    /// The configured queue name, checked at call time.
    fn name(&self) -> Result<&str, QueueError> {
        if self.name.is_empty() {
            Err(QueueError::NotConfigured)
        } else {
            Ok(&self.name)
        }
    }

    /// Count messages by state.
    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        let name = self.name()?;
        let now = Utc::now().timestamp_millis();
        let mut rows = self
            .conn
            .query(
                "SELECT
                    COALESCE(SUM(CASE WHEN dead_lettered = 0 AND visible_at <= ?2 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN dead_lettered = 0 AND visible_at > ?2 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN dead_lettered = 1 THEN 1 ELSE 0 END), 0)
                 FROM queue_messages WHERE queue = ?1",
                params![name, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("queue stats: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("queue stats: {e}")))?
            .ok_or_else(|| DatabaseError::Query("queue stats: no row returned".into()))?;
        let count = |index: i32| {
            row.get::<i64>(index)
                .map(|n| n as u32)
                .map_err(|e| DatabaseError::Query(format!("queue stats column {index}: {e}")))
        };

        Ok(QueueStats {
            visible: count(0)?,
            in_flight: count(1)?,
            dead_lettered: count(2)?,
        })
    }
}

#[async_trait]
impl MessageQueue for LibSqlQueue {
    async fn send(&self, body: &str) -> Result<(), QueueError> {
        let name = self.name()?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp_millis();
        self.conn
            .execute(
                "INSERT INTO queue_messages (id, queue, body, receive_count, visible_at, sent_at) VALUES (?1, ?2, ?3, 0, ?4, ?4)",
                params![id.as_str(), name, body, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("queue send: {e}")))?;

        debug!(queue = name, message_id = %id, "Message sent");
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Delivery>, QueueError> {
        let name = self.name()?;
        let now = Utc::now().timestamp_millis();
        let hidden_until = now + self.visibility_timeout.as_millis() as i64;
        let receipt = Uuid::new_v4().to_string();

        let mut rows = self
            .conn
            .query(
                "UPDATE queue_messages
                 SET receive_count = receive_count + 1, visible_at = ?3, receipt = ?4
                 WHERE id = (
                     SELECT id FROM queue_messages
                     WHERE queue = ?1 AND dead_lettered = 0 AND visible_at <= ?2
                     ORDER BY visible_at ASC, sent_at ASC, rowid ASC
                     LIMIT 1
                 )
                 RETURNING body, receive_count",
                params![name, now, hidden_until, receipt.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("queue receive: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let body: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("queue receive row parse: {e}")))?;
                let receive_count: i64 = row
                    .get(1)
                    .map_err(|e| DatabaseError::Query(format!("queue receive row parse: {e}")))?;
                debug!(queue = name, receive_count, "Message received");
                Ok(Some(Delivery {
                    receipt,
                    body,
                    receive_count: receive_count as u32,
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("queue receive: {e}")).into()),
        }
    }

    async fn ack(&self, receipt: &str) -> Result<bool, QueueError> {
        let name = self.name()?;
        let deleted = self
            .conn
            .execute(
                "DELETE FROM queue_messages WHERE queue = ?1 AND receipt = ?2 AND dead_lettered = 0",
                params![name, receipt],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("queue ack: {e}")))?;

        if deleted == 0 {
            debug!(queue = name, "Ack with stale receipt ignored");
        }
        Ok(deleted > 0)
    }

    async fn dead_letter(&self, receipt: &str, reason: &str) -> Result<bool, QueueError> {
        let name = self.name()?;
        let updated = self
            .conn
            .execute(
                "UPDATE queue_messages SET dead_lettered = 1, dead_letter_reason = ?3, receipt = NULL
                 WHERE queue = ?1 AND receipt = ?2 AND dead_lettered = 0",
                params![name, receipt, reason],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("queue dead_letter: {e}")))?;

        if updated > 0 {
            warn!(queue = name, reason, "Message dead-lettered");
        }
        Ok(updated > 0)
    }
}
