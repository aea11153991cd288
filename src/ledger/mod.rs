//! Durable at-most-once processing ledger.
//!
//! One row per review id. The pipeline consults [`Ledger::has_entry`]
//! before doing any work on a review and writes exactly one entry per
//! attempt, so replies are posted at most once even across restarts.

pub mod libsql;

pub use libsql::LibSqlLedger;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::marketplace::Review;

/// Final outcome of a processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    /// Reply was posted; the entry carries the provider comment id.
    Posted,
    /// The attempt failed; comment id is null.
    Failed,
}

impl ReplyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Posted => "posted",
            Self::Failed => "failed",
        }
    }
}

/// One ledger row — a snapshot of the review plus the attempt outcome.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub review_id: String,
    pub sku: i64,
    pub review_text: String,
    pub rating: u8,
    pub published_at: DateTime<Utc>,
    /// Provider comment id; present only on successful posts.
    pub comment_id: Option<String>,
    /// Posted reply text. Empty string when the attempt failed before
    /// generation completed.
    pub reply_text: String,
    pub outcome: ReplyStatus,
    pub processed_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Snapshot a successful post.
    pub fn posted(review: &Review, reply_text: &str, comment_id: &str) -> Self {
        Self {
            review_id: review.id.clone(),
            sku: review.sku,
            review_text: review.text.clone(),
            rating: review.rating,
            published_at: review.published_at,
            comment_id: Some(comment_id.to_string()),
            reply_text: reply_text.to_string(),
            outcome: ReplyStatus::Posted,
            processed_at: Utc::now(),
        }
    }

    /// Snapshot a failed attempt.
    pub fn failed(review: &Review, reply_text: &str) -> Self {
        Self {
            review_id: review.id.clone(),
            sku: review.sku,
            review_text: review.text.clone(),
            rating: review.rating,
            published_at: review.published_at,
            comment_id: None,
            reply_text: reply_text.to_string(),
            outcome: ReplyStatus::Failed,
            processed_at: Utc::now(),
        }
    }
}

/// Row from the monitored-products table. Informational for now.
#[derive(Debug, Clone)]
pub struct MonitoredProduct {
    pub sku: i64,
    pub name: String,
    pub is_active: bool,
}

/// One API call, for the informational audit trail.
#[derive(Debug, Clone)]
pub struct ApiCallRecord {
    pub endpoint: String,
    pub method: String,
    /// None when the request never produced a response.
    pub status_code: Option<u16>,
    pub latency_ms: u64,
    pub error: Option<String>,
}

/// Backend-agnostic ledger trait.
///
/// Storage errors propagate to the caller uncaught — a persistence failure
/// is fatal to that review's attempt, never silently swallowed.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// True iff an entry exists for the id. The dedup gate — checked
    /// before any generation or posting work.
    async fn has_entry(&self, review_id: &str) -> Result<bool, DatabaseError>;

    /// Persist an entry, replacing any prior entry for the same id.
    async fn upsert(&self, entry: &LedgerEntry) -> Result<(), DatabaseError>;

    /// Active rows from the monitored-products table.
    async fn list_active_products(&self) -> Result<Vec<MonitoredProduct>, DatabaseError>;
}

/// Informational API-call audit.
///
/// Implementations log and swallow their own storage errors — this path
/// never affects pipeline correctness.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, call: ApiCallRecord);
}
