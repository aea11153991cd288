//! HTTP client for the seller review API.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::MarketplaceError;
use crate::ledger::{ApiCallRecord, AuditSink};
use crate::marketplace::ReviewSource;
use crate::marketplace::types::{
    CommentCreated, MIN_PAGE_LIMIT, Review, ReviewListPage, clamp_page_limit,
};

/// Production seller API base URL.
const SELLER_API_BASE: &str = "https://api-seller.ozon.ru";

/// Seller API client.
///
/// One instance per process; `reqwest::Client` pools connections
/// internally. Every request carries the `Client-Id`/`Api-Key` auth
/// headers. No retries here — the pipeline owns retry policy.
pub struct SellerApiClient {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    api_key: SecretString,
    audit: Option<Arc<dyn AuditSink>>,
}

impl SellerApiClient {
    pub fn new(client_id: String, api_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: SELLER_API_BASE.to_string(),
            client_id,
            api_key,
            audit: None,
        }
    }

    /// Override the API base URL (tests point this at a local stub).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Record every request into an audit sink.
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Probe API connectivity with a single one-page listing request.
    pub async fn health_check(&self) -> bool {
        self.list_page(MIN_PAGE_LIMIT, None).await.is_ok()
    }

    /// POST a JSON body to `endpoint` and deserialize the JSON response.
    ///
    /// Non-2xx statuses are errors carrying the response body text.
    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<T, MarketplaceError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let started = Instant::now();

        let resp = match self
            .client
            .post(&url)
            .header("Client-Id", &self.client_id)
            .header("Api-Key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                let reason = e.to_string();
                self.audit_call(endpoint, None, started.elapsed(), Some(&reason))
                    .await;
                return Err(MarketplaceError::RequestFailed {
                    endpoint: endpoint.to_string(),
                    reason,
                });
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            self.audit_call(endpoint, Some(status.as_u16()), started.elapsed(), Some(&body_text))
                .await;
            return Err(MarketplaceError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: body_text,
            });
        }

        self.audit_call(endpoint, Some(status.as_u16()), started.elapsed(), None)
            .await;

        resp.json::<T>()
            .await
            .map_err(|e| MarketplaceError::InvalidResponse {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })
    }

    async fn audit_call(
        &self,
        endpoint: &str,
        status: Option<u16>,
        latency: Duration,
        error: Option<&str>,
    ) {
        if let Some(ref audit) = self.audit {
            audit
                .record(ApiCallRecord {
                    endpoint: endpoint.to_string(),
                    method: "POST".to_string(),
                    status_code: status,
                    latency_ms: latency.as_millis() as u64,
                    error: error.map(str::to_string),
                })
                .await;
        }
    }
}

#[async_trait]
impl ReviewSource for SellerApiClient {
    async fn list_page(
        &self,
        limit: u32,
        last_id: Option<String>,
    ) -> Result<ReviewListPage, MarketplaceError> {
        let mut body = serde_json::json!({
            "limit": clamp_page_limit(limit),
            "sort_dir": "DESC",
            "status": "UNPROCESSED",
        });
        if let Some(cursor) = last_id {
            body["last_id"] = serde_json::Value::String(cursor);
        }

        self.post_json("/v1/review/list", body).await
    }

    async fn get_detail(&self, review_id: &str) -> Result<Review, MarketplaceError> {
        let body = serde_json::json!({ "review_id": review_id });
        self.post_json("/v1/review/info", body).await
    }

    async fn post_comment(
        &self,
        review_id: &str,
        text: &str,
        mark_processed: bool,
    ) -> Result<String, MarketplaceError> {
        let body = serde_json::json!({
            "review_id": review_id,
            "text": text,
            "mark_review_as_processed": mark_processed,
        });

        let created: CommentCreated = self.post_json("/v1/review/comment/create", body).await?;
        tracing::debug!(review_id, comment_id = %created.comment_id, "Comment posted");
        Ok(created.comment_id)
    }
}
