//! Integration tests for the review pipeline.
//!
//! Each test wires the real pipeline against stub marketplace and LLM
//! seams plus an in-memory libSQL ledger, then drives cycles directly
//! with a pinned clock and zeroed delays.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, watch};
use tokio::time::timeout;

use review_assist::error::{LlmError, MarketplaceError, PipelineError};
use review_assist::ledger::{Ledger, LibSqlLedger, ReplyStatus};
use review_assist::llm::{CompletionRequest, TextGenerator};
use review_assist::marketplace::{Review, ReviewListPage, ReviewSource, ReviewStatus};
use review_assist::pipeline::{Clock, PipelineConfig, QuotaWindow, ReviewPipeline};
use review_assist::responder::{RatingTier, Responder};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

// ── Stubs ───────────────────────────────────────────────────────────

/// Stub marketplace: serves fixed pages and records posted comments.
struct StubSource {
    pages: Vec<Vec<Review>>,
    fail_listing: bool,
    fail_posts: HashSet<String>,
    fail_details: HashSet<String>,
    posted: Mutex<Vec<(String, String)>>,
}

impl StubSource {
    fn single_page(reviews: Vec<Review>) -> Self {
        Self::paged(vec![reviews])
    }

    fn paged(pages: Vec<Vec<Review>>) -> Self {
        Self {
            pages,
            fail_listing: false,
            fail_posts: HashSet::new(),
            fail_details: HashSet::new(),
            posted: Mutex::new(Vec::new()),
        }
    }

    fn fail_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    fn fail_post_for(mut self, id: &str) -> Self {
        self.fail_posts.insert(id.to_string());
        self
    }

    fn fail_detail_for(mut self, id: &str) -> Self {
        self.fail_details.insert(id.to_string());
        self
    }

    async fn posted_log(&self) -> Vec<(String, String)> {
        self.posted.lock().await.clone()
    }
}

#[async_trait]
impl ReviewSource for StubSource {
    async fn list_page(
        &self,
        _limit: u32,
        last_id: Option<String>,
    ) -> Result<ReviewListPage, MarketplaceError> {
        if self.fail_listing {
            return Err(MarketplaceError::Status {
                endpoint: "/v1/review/list".to_string(),
                status: 503,
                body: "service unavailable".to_string(),
            });
        }
        let index: usize = last_id.and_then(|s| s.parse().ok()).unwrap_or(0);
        let reviews = self.pages.get(index).cloned().unwrap_or_default();
        let has_next = index + 1 < self.pages.len();
        Ok(ReviewListPage {
            reviews,
            has_next,
            last_id: has_next.then(|| (index + 1).to_string()),
        })
    }

    async fn get_detail(&self, review_id: &str) -> Result<Review, MarketplaceError> {
        if self.fail_details.contains(review_id) {
            return Err(MarketplaceError::Status {
                endpoint: "/v1/review/info".to_string(),
                status: 500,
                body: "internal error".to_string(),
            });
        }
        self.pages
            .iter()
            .flatten()
            .find(|r| r.id == review_id)
            .cloned()
            .ok_or_else(|| MarketplaceError::InvalidResponse {
                endpoint: "/v1/review/info".to_string(),
                reason: format!("unknown review {review_id}"),
            })
    }

    async fn post_comment(
        &self,
        review_id: &str,
        text: &str,
        _mark_processed: bool,
    ) -> Result<String, MarketplaceError> {
        if self.fail_posts.contains(review_id) {
            return Err(MarketplaceError::Status {
                endpoint: "/v1/review/comment/create".to_string(),
                status: 500,
                body: "internal error".to_string(),
            });
        }
        let mut posted = self.posted.lock().await;
        posted.push((review_id.to_string(), text.to_string()));
        Ok(format!("cmt-{}", posted.len()))
    }

    fn page_delay(&self) -> Duration {
        Duration::ZERO
    }
}

/// Stub generator returning a fixed reply.
struct FixedGenerator;

#[async_trait]
impl TextGenerator for FixedGenerator {
    async fn generate(&self, _request: CompletionRequest) -> Result<String, LlmError> {
        Ok("Thank you for sharing your experience with us!".to_string())
    }
}

/// Stub generator that always fails, forcing the fallback path.
struct FailingGenerator;

#[async_trait]
impl TextGenerator for FailingGenerator {
    async fn generate(&self, _request: CompletionRequest) -> Result<String, LlmError> {
        Err(LlmError::RequestFailed {
            provider: "stub".to_string(),
            reason: "backend unavailable".to_string(),
        })
    }
}

/// Clock pinned to a settable hour.
struct FixedClock(AtomicU32);

impl FixedClock {
    fn at(hour: u32) -> Arc<Self> {
        Arc::new(Self(AtomicU32::new(hour)))
    }

    fn set(&self, hour: u32) {
        self.0.store(hour, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn hour(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn review(id: &str, rating: u8) -> Review {
    Review {
        id: id.to_string(),
        sku: 500,
        text: format!("Review body for {id}"),
        rating,
        published_at: Utc::now(),
        status: ReviewStatus::Unprocessed,
    }
}

fn pipeline_with(
    source: Arc<StubSource>,
    ledger: Arc<LibSqlLedger>,
    generator: Arc<dyn TextGenerator>,
    max_per_hour: u32,
    clock: Arc<dyn Clock>,
) -> ReviewPipeline {
    let config = PipelineConfig {
        run_interval: Duration::ZERO,
        max_responses_per_hour: max_per_hour,
        inter_review_delay: Duration::ZERO,
        mark_as_processed: true,
    };
    ReviewPipeline::new(source, Responder::new(generator), ledger, config).with_clock(clock)
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn pagination_concatenates_pages_in_order() {
    let source = StubSource::paged(vec![
        vec![review("a", 5), review("b", 4)],
        vec![review("c", 3), review("d", 2)],
        vec![review("e", 1), review("f", 5)],
    ]);

    let all = source.list_unprocessed().await.unwrap();
    let ids: Vec<&str> = all.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c", "d", "e", "f"]);

    let unique: HashSet<&str> = ids.iter().copied().collect();
    assert_eq!(unique.len(), ids.len());
}

#[tokio::test]
async fn posts_each_review_once_across_cycles() {
    let source = Arc::new(StubSource::single_page(vec![
        review("r1", 5),
        review("r2", 2),
    ]));
    let ledger = Arc::new(LibSqlLedger::new_memory().await.unwrap());
    let clock = FixedClock::at(10);
    let pipeline = pipeline_with(
        source.clone(),
        ledger.clone(),
        Arc::new(FixedGenerator),
        10,
        clock,
    );

    let (_tx, shutdown) = watch::channel(false);
    let mut quota = QuotaWindow::new(10);

    let first = pipeline.run_cycle(&mut quota, &shutdown).await.unwrap();
    assert_eq!(first.posted, 2);
    assert_eq!(first.skipped, 0);

    // Second cycle over the same listing: the ledger gates everything out.
    let second = pipeline.run_cycle(&mut quota, &shutdown).await.unwrap();
    assert_eq!(second.posted, 0);
    assert_eq!(second.skipped, 2);

    assert_eq!(source.posted_log().await.len(), 2);
    for id in ["r1", "r2"] {
        let entry = ledger.get_entry(id).await.unwrap().unwrap();
        assert_eq!(entry.outcome, ReplyStatus::Posted);
        assert!(entry.comment_id.is_some());
    }
}

#[tokio::test]
async fn quota_stops_batch_and_defers_remaining_reviews() {
    let source = Arc::new(StubSource::single_page(vec![
        review("r1", 5),
        review("r2", 4),
        review("r3", 3),
    ]));
    let ledger = Arc::new(LibSqlLedger::new_memory().await.unwrap());
    let clock = FixedClock::at(10);
    let pipeline = pipeline_with(
        source.clone(),
        ledger.clone(),
        Arc::new(FixedGenerator),
        2,
        clock.clone(),
    );

    let (_tx, shutdown) = watch::channel(false);
    let mut quota = QuotaWindow::new(10);

    let report = pipeline.run_cycle(&mut quota, &shutdown).await.unwrap();
    assert_eq!(report.fetched, 3);
    assert_eq!(report.posted, 2);
    assert_eq!(report.failed, 0);

    // The third review was never ledgered — it stays unprocessed for the
    // next cycle.
    assert!(!ledger.has_entry("r3").await.unwrap());
    assert_eq!(source.posted_log().await.len(), 2);

    // Same hour: the quota is still exhausted, so the cycle short-circuits.
    let report = pipeline.run_cycle(&mut quota, &shutdown).await.unwrap();
    assert_eq!(report.fetched, 0);
    assert_eq!(source.posted_log().await.len(), 2);

    // Next hour: the window rolls and the deferred review goes out.
    clock.set(11);
    let report = pipeline.run_cycle(&mut quota, &shutdown).await.unwrap();
    assert_eq!(report.skipped, 2);
    assert_eq!(report.posted, 1);
    assert!(ledger.has_entry("r3").await.unwrap());
}

#[tokio::test]
async fn failed_post_is_isolated_from_neighbors() {
    let source = Arc::new(
        StubSource::single_page(vec![review("a", 5), review("b", 4), review("c", 3)])
            .fail_post_for("b"),
    );
    let ledger = Arc::new(LibSqlLedger::new_memory().await.unwrap());
    let pipeline = pipeline_with(
        source.clone(),
        ledger.clone(),
        Arc::new(FixedGenerator),
        10,
        FixedClock::at(10),
    );

    let (_tx, shutdown) = watch::channel(false);
    let mut quota = QuotaWindow::new(10);

    let report = pipeline.run_cycle(&mut quota, &shutdown).await.unwrap();
    assert_eq!(report.posted, 2);
    assert_eq!(report.failed, 1);

    let a = ledger.get_entry("a").await.unwrap().unwrap();
    assert_eq!(a.outcome, ReplyStatus::Posted);

    // b's attempt completed generation, so the failed entry keeps the
    // reply text but has no comment id.
    let b = ledger.get_entry("b").await.unwrap().unwrap();
    assert_eq!(b.outcome, ReplyStatus::Failed);
    assert!(b.comment_id.is_none());
    assert!(!b.reply_text.is_empty());

    let c = ledger.get_entry("c").await.unwrap().unwrap();
    assert_eq!(c.outcome, ReplyStatus::Posted);
}

#[tokio::test]
async fn fallback_reply_is_posted_when_generator_fails() {
    let source = Arc::new(StubSource::single_page(vec![review("r1", 5)]));
    let ledger = Arc::new(LibSqlLedger::new_memory().await.unwrap());
    let pipeline = pipeline_with(
        source.clone(),
        ledger.clone(),
        Arc::new(FailingGenerator),
        10,
        FixedClock::at(10),
    );

    let (_tx, shutdown) = watch::channel(false);
    let mut quota = QuotaWindow::new(10);

    let report = pipeline.run_cycle(&mut quota, &shutdown).await.unwrap();
    assert_eq!(report.posted, 1);

    let posted = source.posted_log().await;
    assert_eq!(posted[0].1, RatingTier::Positive.fallback_text());

    let entry = ledger.get_entry("r1").await.unwrap().unwrap();
    assert_eq!(entry.outcome, ReplyStatus::Posted);
    assert_eq!(entry.reply_text, RatingTier::Positive.fallback_text());
}

#[tokio::test]
async fn detail_failure_records_listing_snapshot() {
    let source = Arc::new(
        StubSource::single_page(vec![review("r1", 2), review("r2", 4)]).fail_detail_for("r1"),
    );
    let ledger = Arc::new(LibSqlLedger::new_memory().await.unwrap());
    let pipeline = pipeline_with(
        source.clone(),
        ledger.clone(),
        Arc::new(FixedGenerator),
        10,
        FixedClock::at(10),
    );

    let (_tx, shutdown) = watch::channel(false);
    let mut quota = QuotaWindow::new(10);

    let report = pipeline.run_cycle(&mut quota, &shutdown).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.posted, 1);

    // The failed entry snapshots the shallow listing payload; the reply
    // text is the empty-string sentinel since generation never ran.
    let entry = ledger.get_entry("r1").await.unwrap().unwrap();
    assert_eq!(entry.outcome, ReplyStatus::Failed);
    assert_eq!(entry.rating, 2);
    assert_eq!(entry.review_text, "Review body for r1");
    assert!(entry.comment_id.is_none());
    assert!(entry.reply_text.is_empty());

    // Nothing was posted for r1.
    let posted = source.posted_log().await;
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].0, "r2");
}

#[tokio::test]
async fn shutdown_defers_remaining_reviews() {
    let source = Arc::new(StubSource::single_page(vec![
        review("r1", 5),
        review("r2", 4),
    ]));
    let ledger = Arc::new(LibSqlLedger::new_memory().await.unwrap());
    let pipeline = pipeline_with(
        source.clone(),
        ledger.clone(),
        Arc::new(FixedGenerator),
        10,
        FixedClock::at(10),
    );

    let (tx, shutdown) = watch::channel(false);
    tx.send(true).unwrap();

    let mut quota = QuotaWindow::new(10);
    let report = pipeline.run_cycle(&mut quota, &shutdown).await.unwrap();

    // The sweep ran, but no review attempt started after the signal.
    assert_eq!(report.fetched, 2);
    assert_eq!(report.posted, 0);
    assert!(!ledger.has_entry("r1").await.unwrap());
    assert!(source.posted_log().await.is_empty());
}

#[tokio::test]
async fn ledger_survives_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("ledger.db");
    let source = Arc::new(StubSource::single_page(vec![
        review("r1", 5),
        review("r2", 3),
    ]));
    let (_tx, shutdown) = watch::channel(false);

    // First process run posts both reviews.
    {
        let ledger = Arc::new(LibSqlLedger::new_local(&db_path).await.unwrap());
        let pipeline = pipeline_with(
            source.clone(),
            ledger,
            Arc::new(FixedGenerator),
            10,
            FixedClock::at(10),
        );
        let mut quota = QuotaWindow::new(10);
        let report = pipeline.run_cycle(&mut quota, &shutdown).await.unwrap();
        assert_eq!(report.posted, 2);
    }

    // A fresh process over the same database file skips everything, even
    // though the restart reset the in-memory quota window.
    let ledger = Arc::new(LibSqlLedger::new_local(&db_path).await.unwrap());
    let pipeline = pipeline_with(
        source.clone(),
        ledger,
        Arc::new(FixedGenerator),
        10,
        FixedClock::at(10),
    );
    let mut quota = QuotaWindow::new(10);
    let report = pipeline.run_cycle(&mut quota, &shutdown).await.unwrap();
    assert_eq!(report.skipped, 2);
    assert_eq!(report.posted, 0);
    assert_eq!(source.posted_log().await.len(), 2);
}

#[tokio::test]
async fn fetch_failure_surfaces_as_cycle_error() {
    let source = Arc::new(StubSource::single_page(vec![review("r1", 5)]).fail_listing());
    let ledger = Arc::new(LibSqlLedger::new_memory().await.unwrap());
    let pipeline = pipeline_with(
        source,
        ledger.clone(),
        Arc::new(FixedGenerator),
        10,
        FixedClock::at(10),
    );

    let (_tx, shutdown) = watch::channel(false);
    let mut quota = QuotaWindow::new(10);

    // The outer loop turns this into a recovery cooldown; at the cycle
    // level the listing failure must propagate, not vanish.
    let err = pipeline.run_cycle(&mut quota, &shutdown).await.unwrap_err();
    assert!(matches!(err, PipelineError::Fetch(_)));
    assert!(!ledger.has_entry("r1").await.unwrap());
}

#[tokio::test]
async fn run_loop_exits_on_shutdown_signal() {
    let source = Arc::new(StubSource::single_page(vec![]));
    let ledger = Arc::new(LibSqlLedger::new_memory().await.unwrap());
    let config = PipelineConfig {
        // Short but real, so the loop parks in its end-of-cycle sleep and
        // the shutdown signal is observed there.
        run_interval: Duration::from_millis(10),
        max_responses_per_hour: 10,
        inter_review_delay: Duration::ZERO,
        mark_as_processed: true,
    };
    let pipeline = ReviewPipeline::new(source, Responder::new(Arc::new(FixedGenerator)), ledger, config)
        .with_clock(FixedClock::at(10));

    let (tx, shutdown) = watch::channel(false);
    let handle = tokio::spawn(async move { pipeline.run(shutdown).await });

    tx.send(true).unwrap();
    timeout(TEST_TIMEOUT, handle)
        .await
        .expect("pipeline did not stop after shutdown signal")
        .unwrap();
}
