//! Marketplace seller API — review listing, detail, and comment posting.

pub mod client;
pub mod types;

pub use client::SellerApiClient;
pub use types::{Review, ReviewListPage, ReviewStatus};

use std::time::Duration;

use async_trait::async_trait;

use crate::error::MarketplaceError;

/// Pause between page requests during a full sweep.
const PAGE_FETCH_DELAY: Duration = Duration::from_millis(500);

/// Read/write access to the provider's review surface — pure I/O, no
/// business logic. Request failures propagate to the caller; retry policy
/// belongs to the pipeline.
#[async_trait]
pub trait ReviewSource: Send + Sync {
    /// Fetch one page of the unprocessed-review listing.
    async fn list_page(
        &self,
        limit: u32,
        last_id: Option<String>,
    ) -> Result<ReviewListPage, MarketplaceError>;

    /// Fetch the freshest snapshot of one review.
    async fn get_detail(&self, review_id: &str) -> Result<Review, MarketplaceError>;

    /// Post a reply comment. Returns the provider-assigned comment id.
    async fn post_comment(
        &self,
        review_id: &str,
        text: &str,
        mark_processed: bool,
    ) -> Result<String, MarketplaceError>;

    /// Polite pause between page requests during [`Self::list_unprocessed`].
    fn page_delay(&self) -> Duration {
        PAGE_FETCH_DELAY
    }

    /// Page through the entire unprocessed listing, concatenating pages in
    /// provider-returned order.
    async fn list_unprocessed(&self) -> Result<Vec<Review>, MarketplaceError> {
        let mut all = Vec::new();
        let mut last_id: Option<String> = None;

        loop {
            let page = self.list_page(types::MAX_PAGE_LIMIT, last_id.clone()).await?;
            all.extend(page.reviews);

            if !page.has_next {
                break;
            }
            match page.last_id {
                Some(cursor) => last_id = Some(cursor),
                None => {
                    // Provider claimed a further page without a cursor.
                    tracing::warn!("Listing reported has_next without last_id; stopping sweep");
                    break;
                }
            }

            tokio::time::sleep(self.page_delay()).await;
        }

        Ok(all)
    }
}
