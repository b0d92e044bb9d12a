//! libSQL backend: async `MessageStore` implementation.
//!
//! Supports local file and in-memory databases. The table name comes from
//! configuration; an empty name is accepted at construction and makes every
//! call fail with `DatabaseError::NotConfigured`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::pipeline::types::{ConversationId, Message, QueueEnvelope, Sentiment};
use crate::store::migrations;
use crate::store::traits::MessageStore;

/// libSQL database backend.
///
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    table: String,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and prepare `table`.
    pub async fn new_local(path: &Path, table: &str) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db, table)?;
        backend.init_schema().await?;
        info!(path = %path.display(), table, "Message store opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory(table: &str) -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db, table)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase, table: &str) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            table: table.to_string(),
        })
    }

    /// Create the message table when a usable name is configured.
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        match self.table() {
            Ok(table) => migrations::migrate_message_table(&self.conn, table).await,
            Err(e) => {
                warn!(error = %e, "Skipping message table migration");
                Ok(())
            }
        }
    }

    /// Shared handle to the underlying database, for the queue.
    pub fn database(&self) -> Arc<LibSqlDatabase> {
        Arc::clone(&self.db)
    }

    /// The configured table name, checked at call time.
    fn table(&self) -> Result<&str, DatabaseError> {
        validate_identifier(&self.table)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Only plain identifiers are interpolated into SQL.
fn validate_identifier(name: &str) -> Result<&str, DatabaseError> {
    if name.is_empty() {
        return Err(DatabaseError::NotConfigured);
    }
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(DatabaseError::Query(format!(
            "invalid table identifier: {name:?}"
        )))
    }
}

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text.
fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

const MESSAGE_COLUMNS: &str =
    "conversation_id, ord, author, text, sentiment, created_at, classified_at, enqueued_at";

/// Map a libsql Row to a Message.
///
/// Column order matches MESSAGE_COLUMNS.
fn row_to_message(row: &libsql::Row) -> Result<Message, libsql::Error> {
    let conversation_id: String = row.get(0)?;
    let order: i64 = row.get(1)?;
    let sentiment_str: Option<String> = row.get::<String>(4).ok();
    let created_str: String = row.get(5)?;
    let classified_str: Option<String> = row.get::<String>(6).ok();
    let enqueued_str: Option<String> = row.get::<String>(7).ok();

    Ok(Message {
        conversation_id: ConversationId::from(conversation_id),
        order: order as u32,
        author: row.get(2)?,
        text: row.get(3)?,
        sentiment: sentiment_str.and_then(|s| s.parse().ok()),
        created_at: parse_datetime(&created_str),
        classified_at: classified_str.as_deref().map(parse_datetime),
        enqueued_at: enqueued_str.as_deref().map(parse_datetime),
    })
}

async fn collect_messages(mut rows: libsql::Rows) -> Vec<Message> {
    let mut messages = Vec::new();
    while let Ok(Some(row)) = rows.next().await {
        match row_to_message(&row) {
            Ok(message) => messages.push(message),
            Err(e) => warn!("Skipping message row: {e}"),
        }
    }
    messages
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl MessageStore for LibSqlBackend {
    async fn insert_message(&self, message: &Message) -> Result<(), DatabaseError> {
        let table = self.table()?;
        self.conn
            .execute(
                &format!(
                    "INSERT INTO {table} (conversation_id, ord, author, text, sentiment, created_at, classified_at) VALUES (?1, ?2, ?3, ?4, NULL, ?5, NULL)"
                ),
                params![
                    message.conversation_id.as_str(),
                    message.order as i64,
                    message.author.as_str(),
                    message.text.as_str(),
                    format_datetime(message.created_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_message: {e}")))?;

        debug!(
            conversation_id = %message.conversation_id,
            order = message.order,
            author = %message.author,
            "Message inserted into DB"
        );
        Ok(())
    }

    async fn set_sentiment(
        &self,
        envelope: &QueueEnvelope,
        sentiment: Sentiment,
    ) -> Result<(), DatabaseError> {
        let table = self.table()?;
        let now = format_datetime(Utc::now());
        self.conn
            .execute(
                &format!(
                    "INSERT INTO {table} (conversation_id, ord, author, text, sentiment, created_at, classified_at, enqueued_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?6)
                     ON CONFLICT(conversation_id, ord) DO UPDATE SET sentiment = excluded.sentiment, classified_at = excluded.classified_at"
                ),
                params![
                    envelope.conversation_id.as_str(),
                    envelope.order as i64,
                    envelope.author.as_str(),
                    envelope.text.as_str(),
                    sentiment.as_str(),
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_sentiment: {e}")))?;

        debug!(
            conversation_id = %envelope.conversation_id,
            order = envelope.order,
            sentiment = %sentiment,
            "Sentiment stored"
        );
        Ok(())
    }

    async fn get_message(
        &self,
        conversation_id: &ConversationId,
        order: u32,
    ) -> Result<Option<Message>, DatabaseError> {
        let table = self.table()?;
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM {table} WHERE conversation_id = ?1 AND ord = ?2"
                ),
                params![conversation_id.as_str(), order as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_message: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let message = row_to_message(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_message row parse: {e}")))?;
                Ok(Some(message))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_message: {e}"))),
        }
    }

    async fn list_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, DatabaseError> {
        let table = self.table()?;
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM {table} WHERE conversation_id = ?1 ORDER BY ord ASC"
                ),
                params![conversation_id.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_conversation: {e}")))?;

        Ok(collect_messages(rows).await)
    }

    async fn mark_enqueued(
        &self,
        conversation_id: &ConversationId,
        order: u32,
    ) -> Result<(), DatabaseError> {
        let table = self.table()?;
        self.conn
            .execute(
                &format!(
                    "UPDATE {table} SET enqueued_at = ?3 WHERE conversation_id = ?1 AND ord = ?2 AND enqueued_at IS NULL"
                ),
                params![
                    conversation_id.as_str(),
                    order as i64,
                    format_datetime(Utc::now()),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_enqueued: {e}")))?;
        Ok(())
    }

    async fn list_orphaned(
        &self,
        created_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Message>, DatabaseError> {
        let table = self.table()?;
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM {table} WHERE enqueued_at IS NULL AND sentiment IS NULL AND created_at < ?1 ORDER BY created_at ASC, conversation_id ASC, ord ASC LIMIT ?2"
                ),
                params![format_datetime(created_before), limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_orphaned: {e}")))?;

        Ok(collect_messages(rows).await)
    }
}
