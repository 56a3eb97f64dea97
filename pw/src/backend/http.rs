//! HTTP client for the research service
//!
//! Implements the ResearchBackend trait over the service's JSON API. Only
//! idempotent reads are retried; chat and plan updates are sent once because
//! the service records them on receipt.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use super::{BackendError, ChatRequest, ChatResponse, HistoryResponse, ResearchBackend, UpdatePlanResponse};
use crate::config::BackendConfig;
use crate::domain::{AccountPlan, AttachedFile};

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// reqwest-backed research service client
pub struct HttpBackend {
    base_url: String,
    http: Client,
    timeout: Duration,
    max_retries: u32,
    initial_backoff_ms: u64,
}

impl HttpBackend {
    /// Create a new client from configuration
    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        debug!(?config, "from_config: called");
        let timeout = config.timeout();
        let http = Client::builder().timeout(timeout).build().map_err(BackendError::Network)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            timeout,
            max_retries: config.max_retries,
            initial_backoff_ms: config.retry_backoff_ms,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn transport_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout(self.timeout)
        } else {
            BackendError::Network(e)
        }
    }

    /// Turn a response into a typed body or an API error
    async fn read_json<T: DeserializeOwned>(&self, response: Response) -> Result<T, BackendError> {
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;
        if !(200..300).contains(&status) {
            debug!(%status, "read_json: API error");
            return Err(BackendError::Api { status, message: text });
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// GET with exponential backoff on transient failures
    async fn get_with_retry<T: DeserializeOwned>(&self, url: &str) -> Result<T, BackendError> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.initial_backoff_ms, attempt);
                warn!(attempt, backoff_ms = backoff, %url, "get_with_retry: retrying after transient error");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            let response = match self.http.get(url).send().await {
                Ok(r) => r,
                Err(e) => {
                    debug!(attempt, error = %e, "get_with_retry: network error");
                    last_error = Some(self.transport_error(e));
                    continue;
                }
            };

            let status = response.status().as_u16();
            if is_retryable_status(status) && attempt < self.max_retries {
                let text = response.text().await.unwrap_or_default();
                debug!(attempt, status, "get_with_retry: retryable error");
                last_error = Some(BackendError::Api { status, message: text });
                continue;
            }

            return self.read_json(response).await;
        }

        Err(last_error.unwrap_or_else(|| BackendError::InvalidResponse("Max retries exceeded".to_string())))
    }
}

/// Delay before retry `attempt` (1-based), doubling and saturating
fn backoff_ms(initial_ms: u64, attempt: u32) -> u64 {
    let factor = 2u64.checked_pow(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    initial_ms.saturating_mul(factor)
}

#[async_trait]
impl ResearchBackend for HttpBackend {
    async fn send_message(&self, request: ChatRequest) -> Result<ChatResponse, BackendError> {
        debug!(plan_id = ?request.plan_id, conversation_id = ?request.conversation_id, files = request.file_ids.len(), "send_message: called");
        let response = self
            .http
            .post(self.url("/api/chat"))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.read_json(response).await
    }

    async fn fetch_history(&self, session_key: &str) -> Result<HistoryResponse, BackendError> {
        debug!(%session_key, "fetch_history: called");
        self.get_with_retry(&self.url(&format!("/api/history/{}", session_key)))
            .await
    }

    async fn update_plan(&self, plan_id: &str, plan: &AccountPlan) -> Result<AccountPlan, BackendError> {
        debug!(%plan_id, version = plan.version, "update_plan: called");
        let response = self
            .http
            .put(self.url(&format!("/api/plans/{}", plan_id)))
            .json(plan)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let body: UpdatePlanResponse = self.read_json(response).await?;
        debug!(status = %body.status, version = body.plan.version, "update_plan: saved");
        Ok(body.plan)
    }

    async fn upload_file(&self, filename: &str, bytes: Vec<u8>) -> Result<AttachedFile, BackendError> {
        debug!(%filename, size = bytes.len(), "upload_file: called");
        let form = Form::new().part("file", Part::bytes(bytes).file_name(filename.to_string()));
        let response = self
            .http
            .post(self.url("/api/upload"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.read_json(response).await
    }

    async fn rag_status(&self) -> Result<serde_json::Value, BackendError> {
        debug!("rag_status: called");
        self.get_with_retry(&self.url("/api/rag/status")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_status() {
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(429));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(200));
    }

    #[test]
    fn test_backoff_doubles_and_saturates() {
        assert_eq!(backoff_ms(250, 1), 250);
        assert_eq!(backoff_ms(250, 3), 1000);
        assert_eq!(backoff_ms(1000, 64), u64::MAX);
        assert_eq!(backoff_ms(1000, 200), u64::MAX);
    }

    #[test]
    fn test_url_trims_trailing_slash() {
        let config = BackendConfig {
            base_url: "http://localhost:8000/".to_string(),
            ..Default::default()
        };
        let backend = HttpBackend::from_config(&config).unwrap();
        assert_eq!(backend.url("/api/chat"), "http://localhost:8000/api/chat");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_network_error() {
        let config = BackendConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_ms: 2000,
            max_retries: 0,
            retry_backoff_ms: 1,
        };
        let backend = HttpBackend::from_config(&config).unwrap();
        let err = backend.fetch_history("plan-1").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
