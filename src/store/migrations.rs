//! Version-tracked schema migrations for the libSQL backends.
//!
//! Migrations are grouped by scope: the message table (whose name comes from
//! configuration, substituted for `{table}`, scope `messages:{table}`) and the
//! queue (scope `queue`). `_migrations` records the applied versions per scope
//! so each group is applied once.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
pub(crate) struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Message table migrations. Add new versions to the end.
static MESSAGE_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "dialogue_messages",
        sql: r#"
            CREATE TABLE IF NOT EXISTS {table} (
                conversation_id TEXT NOT NULL,
                ord INTEGER NOT NULL,
                author TEXT NOT NULL,
                text TEXT NOT NULL,
                sentiment TEXT,
                created_at TEXT NOT NULL,
                classified_at TEXT,
                PRIMARY KEY (conversation_id, ord)
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_unclassified
                ON {table}(sentiment, created_at);
        "#,
    },
    Migration {
        version: 2,
        name: "message_enqueued_at",
        sql: r#"
            ALTER TABLE {table} ADD COLUMN enqueued_at TEXT;
            CREATE INDEX IF NOT EXISTS idx_{table}_orphaned
                ON {table}(enqueued_at, sentiment, created_at);
        "#,
    },
];

/// Queue migrations. Add new versions to the end.
static QUEUE_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "queue_messages",
    sql: r#"
        CREATE TABLE IF NOT EXISTS queue_messages (
            id TEXT PRIMARY KEY,
            queue TEXT NOT NULL,
            body TEXT NOT NULL,
            receive_count INTEGER NOT NULL DEFAULT 0,
            visible_at INTEGER NOT NULL,
            receipt TEXT,
            dead_lettered INTEGER NOT NULL DEFAULT 0,
            dead_letter_reason TEXT,
            sent_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_queue_messages_visible
            ON queue_messages(queue, dead_lettered, visible_at);
        CREATE INDEX IF NOT EXISTS idx_queue_messages_receipt
            ON queue_messages(receipt);
    "#,
}];

/// Apply the message table schema for `table`.
pub async fn migrate_message_table(conn: &Connection, table: &str) -> Result<(), DatabaseError> {
    let scope = message_scope(table);
    run_migrations(conn, &scope, MESSAGE_MIGRATIONS, Some(table)).await
}

/// Message scopes are prefixed so no table name can shadow the queue's scope.
fn message_scope(table: &str) -> String {
    format!("messages:{table}")
}

/// Apply the queue schema.
pub async fn migrate_queue(conn: &Connection) -> Result<(), DatabaseError> {
    run_migrations(conn, "queue", QUEUE_MIGRATIONS, None).await
}

async fn run_migrations(
    conn: &Connection,
    scope: &str,
    migrations: &[Migration],
    table: Option<&str>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            scope TEXT NOT NULL,
            version INTEGER NOT NULL,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope, version)
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn, scope).await?;

    for migration in migrations {
        if migration.version > current_version {
            tracing::info!(
                scope,
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            let sql = match table {
                Some(table) => migration.sql.replace("{table}", table),
                None => migration.sql.to_string(),
            };
            conn.execute_batch(&sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration {scope} V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, scope, migration.version, migration.name).await?;
        }
    }

    Ok(())
}

/// Highest applied version for `scope`, or 0 if none.
async fn get_current_version(conn: &Connection, scope: &str) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations WHERE scope = ?1",
            libsql::params![scope],
        )
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => row.get::<i64>(0).map_err(|e| {
            DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
        }),
        None => Ok(0),
    }
}

async fn seed_version(
    conn: &Connection,
    scope: &str,
    version: i64,
    name: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (scope, version, name) VALUES (?1, ?2, ?3)",
        libsql::params![scope, version, name],
    )
    .await
    .map_err(|e| {
        DatabaseError::Migration(format!("Failed to record migration {scope} V{version}: {e}"))
    })?;
    Ok(())
}
