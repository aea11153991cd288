//! The orchestrator — outer polling loop and per-cycle processing.
//!
//! Flow per cycle: roll quota → fetch unprocessed reviews → for each, in
//! provider order: ledger dedup check, detail fetch, reply generation,
//! comment post, ledger write. One review's failure never aborts the
//! batch; an unhandled cycle error puts the loop into a recovery cooldown
//! instead of terminating the process.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::PipelineError;
use crate::ledger::{Ledger, LedgerEntry};
use crate::marketplace::{Review, ReviewSource};
use crate::pipeline::{Clock, CycleReport, CycleState, QuotaWindow, SystemClock};
use crate::responder::Responder;

/// Cooldown after an unhandled cycle error before returning to idle.
const RECOVERY_COOLDOWN: Duration = Duration::from_secs(60);

/// Pipeline tuning knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Sleep between cycles.
    pub run_interval: Duration,
    /// Max successful posts per wall-clock hour.
    pub max_responses_per_hour: u32,
    /// Pause between review attempts within a batch. Keeps comment posts
    /// under the provider's rate ceiling, independent of the page delay.
    pub inter_review_delay: Duration,
    /// Whether posted comments mark the review processed upstream.
    pub mark_as_processed: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            run_interval: Duration::from_secs(3600),
            max_responses_per_hour: 10,
            inter_review_delay: Duration::from_secs(2),
            mark_as_processed: true,
        }
    }
}

/// What happened to one review attempt that ran to completion.
enum AttemptOutcome {
    Posted,
    Failed,
}

/// Drives fetch → dedupe → generate → post → record.
pub struct ReviewPipeline {
    source: Arc<dyn ReviewSource>,
    responder: Responder,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
}

impl ReviewPipeline {
    pub fn new(
        source: Arc<dyn ReviewSource>,
        responder: Responder,
        ledger: Arc<dyn Ledger>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source,
            responder,
            ledger,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Replace the wall clock (tests pin the hour).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Outer loop. Runs until `shutdown` flips to true; cycle errors move
    /// the loop into a recovery cooldown, never terminate it. Shutdown is
    /// observed between review attempts and during sleeps, so an in-flight
    /// attempt always completes its ledger write.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut quota = QuotaWindow::new(self.clock.hour());
        info!("Review pipeline started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let next_state = match self.run_cycle(&mut quota, &shutdown).await {
                Ok(report) => {
                    info!(
                        fetched = report.fetched,
                        skipped = report.skipped,
                        posted = report.posted,
                        failed = report.failed,
                        "Cycle complete"
                    );
                    CycleState::Sleeping
                }
                Err(e) => {
                    error!(error = %e, "Cycle failed");
                    CycleState::Recovering
                }
            };

            let sleep_for = match next_state {
                CycleState::Recovering => RECOVERY_COOLDOWN,
                _ => self.config.run_interval,
            };
            debug!(state = %next_state, secs = sleep_for.as_secs(), "Pipeline sleeping");

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        warn!("Shutdown channel closed, stopping pipeline");
                        break;
                    }
                }
            }
        }

        info!("Review pipeline stopped");
    }

    /// One fetch → process pass. Public so tests can drive cycles directly
    /// with a pinned clock and an owned [`QuotaWindow`].
    pub async fn run_cycle(
        &self,
        quota: &mut QuotaWindow,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<CycleReport, PipelineError> {
        quota.roll(self.clock.hour());

        let mut report = CycleReport::default();
        if quota.is_exhausted(self.config.max_responses_per_hour) {
            info!(
                posted_this_hour = quota.posted(),
                "Hourly response quota exhausted, skipping cycle"
            );
            return Ok(report);
        }

        debug!(state = %CycleState::Fetching, "Cycle started");
        let reviews = self.source.list_unprocessed().await?;
        report.fetched = reviews.len();
        info!(count = reviews.len(), "Fetched unprocessed reviews");

        debug!(state = %CycleState::ProcessingBatch, "Processing batch");
        for review in &reviews {
            if quota.is_exhausted(self.config.max_responses_per_hour) {
                info!("Hourly quota reached mid-batch, deferring remaining reviews");
                break;
            }
            if *shutdown.borrow() {
                info!("Shutdown requested, deferring remaining reviews");
                break;
            }

            // Dedup gate: anything already ledgered was handled before.
            let already_handled = match self.ledger.has_entry(&review.id).await {
                Ok(found) => found,
                Err(e) => {
                    error!(review_id = %review.id, error = %e, "Ledger lookup failed");
                    report.failed += 1;
                    continue;
                }
            };
            if already_handled {
                report.skipped += 1;
                continue;
            }

            match self.process_review(review).await {
                Ok(AttemptOutcome::Posted) => {
                    report.posted += 1;
                    quota.record_post();
                }
                Ok(AttemptOutcome::Failed) => {
                    report.failed += 1;
                }
                Err(e) => {
                    error!(review_id = %review.id, error = %e, "Review attempt failed");
                    report.failed += 1;
                }
            }

            tokio::time::sleep(self.config.inter_review_delay).await;
        }

        Ok(report)
    }

    /// Process one review end to end, writing exactly one ledger entry.
    ///
    /// Marketplace failures are handled here: the entry records the failure
    /// and the batch continues. Only a ledger write failure escapes.
    async fn process_review(&self, review: &Review) -> Result<AttemptOutcome, PipelineError> {
        // Re-fetch so the responder sees the freshest text and rating.
        let detailed = match self.source.get_detail(&review.id).await {
            Ok(detailed) => detailed,
            Err(e) => {
                warn!(
                    review_id = %review.id,
                    error = %e,
                    "Detail fetch failed, recording failure from the listing snapshot"
                );
                self.ledger.upsert(&LedgerEntry::failed(review, "")).await?;
                return Ok(AttemptOutcome::Failed);
            }
        };

        let reply = self.responder.generate_reply(&detailed).await;

        match self
            .source
            .post_comment(&review.id, reply.text(), self.config.mark_as_processed)
            .await
        {
            Ok(comment_id) => {
                self.ledger
                    .upsert(&LedgerEntry::posted(&detailed, reply.text(), &comment_id))
                    .await?;
                info!(
                    review_id = %review.id,
                    comment_id = %comment_id,
                    rating = detailed.rating,
                    fallback = reply.is_fallback(),
                    "Posted reply"
                );
                Ok(AttemptOutcome::Posted)
            }
            Err(e) => {
                warn!(review_id = %review.id, error = %e, "Comment post failed");
                self.ledger
                    .upsert(&LedgerEntry::failed(&detailed, reply.text()))
                    .await?;
                Ok(AttemptOutcome::Failed)
            }
        }
    }
}
