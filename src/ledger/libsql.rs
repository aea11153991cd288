//! libSQL ledger backend.
//!
//! Local file or in-memory database. The single connection is reused for
//! all operations; `libsql::Connection` is `Send + Sync` and safe for
//! concurrent async use, and there is only one writer task anyway.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::ledger::{ApiCallRecord, AuditSink, Ledger, LedgerEntry, MonitoredProduct, ReplyStatus};

const ENTRY_COLUMNS: &str = "review_id, sku, review_text, review_rating, review_published_at, \
     comment_id, response_text, outcome, processed_at";

/// libSQL-backed ledger.
pub struct LibSqlLedger {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlLedger {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Open(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Open(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Open(format!("Failed to create connection: {e}")))?;

        let ledger = Self {
            db: Arc::new(db),
            conn,
        };
        ledger.init_schema().await?;
        info!(path = %path.display(), "Ledger database opened");
        Ok(ledger)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| DatabaseError::Open(format!("Failed to create in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Open(format!("Failed to create connection: {e}")))?;

        let ledger = Self {
            db: Arc::new(db),
            conn,
        };
        ledger.init_schema().await?;
        Ok(ledger)
    }

    /// Create tables and indexes. Idempotent — safe to run on every open.
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS processed_reviews (
                    review_id TEXT PRIMARY KEY,
                    sku INTEGER NOT NULL,
                    review_text TEXT NOT NULL,
                    review_rating INTEGER NOT NULL,
                    review_published_at TEXT NOT NULL,
                    comment_id TEXT,
                    response_text TEXT NOT NULL,
                    outcome TEXT NOT NULL,
                    processed_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_processed_reviews_outcome
                    ON processed_reviews(outcome);

                CREATE TABLE IF NOT EXISTS monitored_products (
                    sku INTEGER PRIMARY KEY,
                    name TEXT NOT NULL DEFAULT '',
                    is_active INTEGER NOT NULL DEFAULT 1
                );

                CREATE TABLE IF NOT EXISTS api_calls (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    endpoint TEXT NOT NULL,
                    method TEXT NOT NULL,
                    status_code INTEGER,
                    response_time_ms INTEGER NOT NULL,
                    error_message TEXT,
                    timestamp TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_api_calls_endpoint ON api_calls(endpoint);
                "#,
            )
            .await
            .map_err(|e| DatabaseError::Schema(e.to_string()))?;

        debug!("Ledger schema initialized");
        Ok(())
    }

    /// Fetch a single entry by review id.
    pub async fn get_entry(&self, review_id: &str) -> Result<Option<LedgerEntry>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {ENTRY_COLUMNS} FROM processed_reviews WHERE review_id = ?1"),
                params![review_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_entry: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_entry(&row).map_err(|e| {
                DatabaseError::Query(format!("get_entry row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_entry: {e}"))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 string (our canonical write format).
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn str_to_status(s: &str) -> ReplyStatus {
    match s {
        "posted" => ReplyStatus::Posted,
        _ => ReplyStatus::Failed,
    }
}

/// Map a row to a LedgerEntry. Column order matches ENTRY_COLUMNS.
fn row_to_entry(row: &libsql::Row) -> Result<LedgerEntry, libsql::Error> {
    let review_id: String = row.get(0)?;
    let sku: i64 = row.get(1)?;
    let review_text: String = row.get(2)?;
    let rating: i64 = row.get(3)?;
    let published_str: String = row.get(4)?;
    let comment_id: Option<String> = row.get(5).ok();
    let reply_text: String = row.get(6)?;
    let outcome_str: String = row.get(7)?;
    let processed_str: String = row.get(8)?;

    Ok(LedgerEntry {
        review_id,
        sku,
        review_text,
        rating: rating.clamp(0, 5) as u8,
        published_at: parse_datetime(&published_str),
        comment_id,
        reply_text,
        outcome: str_to_status(&outcome_str),
        processed_at: parse_datetime(&processed_str),
    })
}

// ── Trait implementations ───────────────────────────────────────────

#[async_trait]
impl Ledger for LibSqlLedger {
    async fn has_entry(&self, review_id: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM processed_reviews WHERE review_id = ?1",
                params![review_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("has_entry: {e}")))?;

        match rows.next().await {
            Ok(row) => Ok(row.is_some()),
            Err(e) => Err(DatabaseError::Query(format!("has_entry: {e}"))),
        }
    }

    async fn upsert(&self, entry: &LedgerEntry) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO processed_reviews \
                 (review_id, sku, review_text, review_rating, review_published_at, \
                  comment_id, response_text, outcome, processed_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    entry.review_id.clone(),
                    entry.sku,
                    entry.review_text.clone(),
                    entry.rating as i64,
                    entry.published_at.to_rfc3339(),
                    opt_text_owned(entry.comment_id.clone()),
                    entry.reply_text.clone(),
                    entry.outcome.as_str(),
                    entry.processed_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert: {e}")))?;

        debug!(review_id = %entry.review_id, outcome = entry.outcome.as_str(), "Ledger entry written");
        Ok(())
    }

    async fn list_active_products(&self) -> Result<Vec<MonitoredProduct>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT sku, name, is_active FROM monitored_products WHERE is_active = 1",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_active_products: {e}")))?;

        let mut products = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let sku: i64 = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("list_active_products row: {e}")))?;
            let name: String = row.get(1).unwrap_or_default();
            let is_active: i64 = row.get(2).unwrap_or(1);
            products.push(MonitoredProduct {
                sku,
                name,
                is_active: is_active != 0,
            });
        }
        Ok(products)
    }
}

#[async_trait]
impl AuditSink for LibSqlLedger {
    async fn record(&self, call: ApiCallRecord) {
        let result = self
            .conn
            .execute(
                "INSERT INTO api_calls \
                 (endpoint, method, status_code, response_time_ms, error_message, timestamp) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    call.endpoint.clone(),
                    call.method.clone(),
                    match call.status_code {
                        Some(code) => libsql::Value::Integer(code as i64),
                        None => libsql::Value::Null,
                    },
                    call.latency_ms as i64,
                    opt_text_owned(call.error.clone()),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await;

        // Audit is informational; a failed write must not surface.
        if let Err(e) = result {
            warn!(endpoint = %call.endpoint, error = %e, "Failed to record API call audit row");
        }
    }
}
