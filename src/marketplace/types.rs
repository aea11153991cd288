//! Wire types for the seller review API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Smallest page size the listing endpoint accepts.
pub const MIN_PAGE_LIMIT: u32 = 20;
/// Largest page size the listing endpoint accepts.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Clamp a requested page size into the provider's accepted range.
pub fn clamp_page_limit(limit: u32) -> u32 {
    limit.clamp(MIN_PAGE_LIMIT, MAX_PAGE_LIMIT)
}

/// Provider-side processing status of a review.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    #[default]
    Unprocessed,
    Processed,
    Failed,
}

/// A customer review as returned by the listing and detail endpoints.
///
/// Both endpoints produce the same shape; the detail record is simply the
/// freshest snapshot. Immutable once fetched — only the ledger advances a
/// review's processing state on our side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    /// Provider-assigned review id.
    pub id: String,
    /// Product the review is attached to.
    #[serde(default)]
    pub sku: i64,
    /// Free-text review body. May be empty (rating-only reviews).
    #[serde(default)]
    pub text: String,
    /// Star rating, 1-5.
    #[serde(default)]
    pub rating: u8,
    /// When the customer published the review.
    pub published_at: DateTime<Utc>,
    /// Provider-side processing status.
    #[serde(default)]
    pub status: ReviewStatus,
}

/// One page of the unprocessed-review listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewListPage {
    #[serde(default)]
    pub reviews: Vec<Review>,
    /// Whether the provider has a further page.
    #[serde(default)]
    pub has_next: bool,
    /// Pagination cursor for the next page.
    #[serde(default)]
    pub last_id: Option<String>,
}

/// Response of the comment-create endpoint.
#[derive(Debug, Deserialize)]
pub struct CommentCreated {
    pub comment_id: String,
}
