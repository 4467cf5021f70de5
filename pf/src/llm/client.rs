//! LlmClient trait definition

use async_trait::async_trait;

use super::{CompletionRequest, CompletionResponse, LlmError};

/// Stateless LLM client - each call is independent
///
/// This is the pipeline's only route to the generative model. Implementations
/// own their transport, credentials and quota bookkeeping; they must be safe
/// to share between concurrently running pipelines.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a single completion request and wait for the full response
    ///
    /// Returns `LlmError::Exhausted` when no usable credential or model remains.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::llm::TokenUsage;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::debug;

    type Handler = Box<dyn Fn(&CompletionRequest, usize) -> Result<CompletionResponse, LlmError> + Send + Sync>;

    /// Mock LLM client for unit tests
    ///
    /// Either replays a fixed list of responses in order, or delegates to a
    /// handler that sees each request and its zero-based call index.
    pub struct MockLlmClient {
        handler: Handler,
        call_count: AtomicUsize,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl MockLlmClient {
        pub fn new(responses: Vec<CompletionResponse>) -> Self {
            debug!(response_count = %responses.len(), "MockLlmClient::new: called");
            Self::with_handler(move |_req, idx| {
                responses
                    .get(idx)
                    .cloned()
                    .ok_or_else(|| LlmError::InvalidResponse("No more mock responses".to_string()))
            })
        }

        pub fn with_handler(
            handler: impl Fn(&CompletionRequest, usize) -> Result<CompletionResponse, LlmError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                handler: Box::new(handler),
                call_count: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        /// A client whose every call fails with a timeout
        pub fn failing() -> Self {
            Self::with_handler(|_, _| Err(LlmError::Timeout(std::time::Duration::from_secs(30))))
        }

        /// Build a plain text response
        pub fn text(content: impl Into<String>) -> CompletionResponse {
            CompletionResponse {
                content: content.into(),
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 20,
                },
                model: "mock-model".to_string(),
            }
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        /// Requests received so far, in call order
        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().map(|r| r.clone()).unwrap_or_default()
        }

        /// Number of calls issued with the given label
        pub fn calls_with_label(&self, label: &str) -> usize {
            self.requests().iter().filter(|r| r.label == label).count()
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            debug!(%idx, label = %request.label, "MockLlmClient::complete: called");
            let result = (self.handler)(&request, idx);
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request);
            }
            result
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_client_returns_responses() {
            let client = MockLlmClient::new(vec![MockLlmClient::text("Response 1"), MockLlmClient::text("Response 2")]);
            let req = CompletionRequest::new("test", "sys", "hi");

            let resp1 = client.complete(req.clone()).await.unwrap();
            assert_eq!(resp1.content, "Response 1");

            let resp2 = client.complete(req).await.unwrap();
            assert_eq!(resp2.content, "Response 2");

            assert_eq!(client.call_count(), 2);
        }

        #[tokio::test]
        async fn test_mock_client_errors_when_exhausted() {
            let client = MockLlmClient::new(vec![]);
            let result = client.complete(CompletionRequest::new("test", "sys", "hi")).await;
            assert!(result.is_err());
        }

        #[tokio::test]
        async fn test_mock_client_records_labels() {
            let client = MockLlmClient::with_handler(|req, _| Ok(MockLlmClient::text(req.label.clone())));
            client.complete(CompletionRequest::new("a", "sys", "1")).await.unwrap();
            client.complete(CompletionRequest::new("b", "sys", "2")).await.unwrap();
            client.complete(CompletionRequest::new("a", "sys", "3")).await.unwrap();
            assert_eq!(client.calls_with_label("a"), 2);
            assert_eq!(client.calls_with_label("b"), 1);
        }
    }
}
