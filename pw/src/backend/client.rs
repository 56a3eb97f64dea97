//! ResearchBackend trait definition

use async_trait::async_trait;

use super::{BackendError, ChatRequest, ChatResponse, HistoryResponse};
use crate::domain::{AccountPlan, AttachedFile};

/// Request/response operations offered by the research service
///
/// Every call is independent. The service owns the durable transcript and
/// document; the client only orchestrates.
#[async_trait]
pub trait ResearchBackend: Send + Sync {
    /// Send a user turn (or hidden continuation); never retried
    async fn send_message(&self, request: ChatRequest) -> Result<ChatResponse, BackendError>;

    /// Transcript and files for a plan id or conversation id
    async fn fetch_history(&self, session_key: &str) -> Result<HistoryResponse, BackendError>;

    /// Persist an edited document; returns the service's copy
    async fn update_plan(&self, plan_id: &str, plan: &AccountPlan) -> Result<AccountPlan, BackendError>;

    /// Upload raw bytes for later attachment
    async fn upload_file(&self, filename: &str, bytes: Vec<u8>) -> Result<AttachedFile, BackendError>;

    /// Retrieval-index status as raw JSON
    async fn rag_status(&self) -> Result<serde_json::Value, BackendError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tracing::debug;

    /// Scripted backend for unit tests
    #[derive(Default)]
    pub struct MockBackend {
        chat: Mutex<VecDeque<Result<ChatResponse, BackendError>>>,
        history: Mutex<HashMap<String, HistoryResponse>>,
        requests: Mutex<Vec<ChatRequest>>,
        fail_updates: AtomicBool,
        update_count: AtomicUsize,
    }

    impl MockBackend {
        pub fn new(responses: Vec<ChatResponse>) -> Self {
            debug!(response_count = %responses.len(), "MockBackend::new: called");
            let backend = Self::default();
            backend.push_chat(responses.into_iter().map(Ok));
            backend
        }

        pub fn push_chat(&self, responses: impl IntoIterator<Item = Result<ChatResponse, BackendError>>) {
            self.chat.lock().unwrap().extend(responses);
        }

        pub fn set_history(&self, key: &str, history: HistoryResponse) {
            self.history.lock().unwrap().insert(key.to_string(), history);
        }

        pub fn fail_updates(&self, fail: bool) {
            self.fail_updates.store(fail, Ordering::SeqCst);
        }

        pub fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn update_count(&self) -> usize {
            self.update_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ResearchBackend for MockBackend {
        async fn send_message(&self, request: ChatRequest) -> Result<ChatResponse, BackendError> {
            debug!(message = %request.message, "MockBackend::send_message: called");
            self.requests.lock().unwrap().push(request);
            self.chat
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(BackendError::InvalidResponse("No more mock responses".to_string())))
        }

        async fn fetch_history(&self, session_key: &str) -> Result<HistoryResponse, BackendError> {
            debug!(%session_key, "MockBackend::fetch_history: called");
            Ok(self.history.lock().unwrap().get(session_key).cloned().unwrap_or_default())
        }

        async fn update_plan(&self, plan_id: &str, plan: &AccountPlan) -> Result<AccountPlan, BackendError> {
            debug!(%plan_id, "MockBackend::update_plan: called");
            self.update_count.fetch_add(1, Ordering::SeqCst);
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(BackendError::Api {
                    status: 500,
                    message: "update failed".to_string(),
                });
            }
            let mut saved = plan.clone();
            saved.history.push(plan.snapshot());
            saved.version = plan.version + 1;
            Ok(saved)
        }

        async fn upload_file(&self, filename: &str, _bytes: Vec<u8>) -> Result<AttachedFile, BackendError> {
            Ok(AttachedFile::new(format!("file-{}", filename), filename))
        }

        async fn rag_status(&self) -> Result<serde_json::Value, BackendError> {
            Ok(serde_json::json!({"status": "ready"}))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::domain::ResearchStatus;

        fn request(message: &str) -> ChatRequest {
            ChatRequest {
                user_id: "u1".into(),
                plan_id: None,
                message: message.into(),
                conversation_id: Some("new-1".into()),
                file_ids: vec![],
            }
        }

        #[tokio::test]
        async fn test_mock_backend_returns_responses_in_order() {
            let backend = MockBackend::new(vec![
                ChatResponse {
                    research_status: ResearchStatus::Researching,
                    ..Default::default()
                },
                ChatResponse {
                    research_status: ResearchStatus::Done,
                    ..Default::default()
                },
            ]);

            let first = backend.send_message(request("hi")).await.unwrap();
            assert_eq!(first.research_status, ResearchStatus::Researching);
            let second = backend.send_message(request("continue")).await.unwrap();
            assert_eq!(second.research_status, ResearchStatus::Done);
            assert!(backend.send_message(request("again")).await.is_err());
            assert_eq!(backend.requests().len(), 3);
        }

        #[tokio::test]
        async fn test_mock_update_bumps_version() {
            let backend = MockBackend::default();
            let plan = AccountPlan::new("p1", "u1", "Acme");
            let saved = backend.update_plan("p1", &plan).await.unwrap();
            assert_eq!(saved.version, 2);
            assert_eq!(saved.history.len(), 1);

            backend.fail_updates(true);
            assert!(backend.update_plan("p1", &plan).await.is_err());
            assert_eq!(backend.update_count(), 2);
        }
    }
}
