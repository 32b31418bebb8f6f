//! Deterministic completion client for tests and offline runs.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use super::client::{CompletionClient, CompletionRequest, LlmError, LlmResult, TokenStream};

/// Scripted reply for one completion call
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Plain reply text; streamed word by word
    Text(String),
    /// Explicit stream fragments
    Chunks(Vec<String>),
    /// Stream the fragments, then fail
    ChunksThenError(Vec<String>, String),
    /// Fail the call
    Error(String),
}

impl MockReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }
}

type Responder = Box<dyn Fn(&CompletionRequest) -> MockReply + Send + Sync>;

/// Completion client that replays a script, or answers through a responder
/// closure once the script is exhausted.
///
/// Every request is recorded so tests can inspect the assembled prompts.
#[derive(Clone)]
pub struct MockCompletionClient {
    inner: Arc<MockInner>,
}

struct MockInner {
    script: Mutex<VecDeque<MockReply>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockCompletionClient {
    /// Replay `replies` in order; further calls fail
    pub fn scripted(replies: impl IntoIterator<Item = MockReply>) -> Self {
        Self {
            inner: Arc::new(MockInner {
                script: Mutex::new(replies.into_iter().collect()),
                responder: None,
                requests: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Answer every call with `responder`
    pub fn responding<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> MockReply + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(MockInner {
                script: Mutex::new(VecDeque::new()),
                responder: Some(Box::new(responder)),
                requests: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Requests received so far, oldest first
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.inner.requests.lock().clone()
    }

    fn next_reply(&self, request: &CompletionRequest) -> MockReply {
        self.inner.requests.lock().push(request.clone());

        if let Some(reply) = self.inner.script.lock().pop_front() {
            return reply;
        }

        match &self.inner.responder {
            Some(responder) => responder(request),
            None => MockReply::error("mock script exhausted"),
        }
    }
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    fn model(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: CompletionRequest) -> LlmResult<String> {
        match self.next_reply(&request) {
            MockReply::Text(text) => Ok(text),
            MockReply::Chunks(chunks) => Ok(chunks.concat()),
            MockReply::ChunksThenError(_, message) | MockReply::Error(message) => {
                Err(LlmError::Api(message))
            },
        }
    }

    fn stream(&self, request: CompletionRequest) -> TokenStream {
        let reply = self.next_reply(&request);

        Box::pin(async_stream::stream! {
            match reply {
                MockReply::Text(text) => {
                    for (i, word) in text.split(' ').enumerate() {
                        if i == 0 {
                            yield Ok(word.to_string());
                        } else {
                            yield Ok(format!(" {word}"));
                        }
                    }
                }
                MockReply::Chunks(chunks) => {
                    for chunk in chunks {
                        yield Ok(chunk);
                    }
                }
                MockReply::ChunksThenError(chunks, message) => {
                    for chunk in chunks {
                        yield Ok(chunk);
                    }
                    yield Err(LlmError::Api(message));
                }
                MockReply::Error(message) => yield Err(LlmError::Api(message)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_scripted_replies_in_order() {
        let client = MockCompletionClient::scripted([
            MockReply::text("first"),
            MockReply::error("boom"),
        ]);

        let first = client
            .complete(CompletionRequest::from_prompt("a"))
            .await
            .unwrap();
        assert_eq!(first, "first");

        let second = client.complete(CompletionRequest::from_prompt("b")).await;
        assert!(second.is_err());

        let third = client.complete(CompletionRequest::from_prompt("c")).await;
        assert!(third.is_err());
        assert_eq!(client.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_stream_reassembles_text() {
        let client = MockCompletionClient::scripted([MockReply::text("hello big world")]);
        let tokens: Vec<String> = client
            .stream(CompletionRequest::from_prompt("x"))
            .map(|t| t.unwrap())
            .collect()
            .await;

        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens.concat(), "hello big world");
    }

    #[tokio::test]
    async fn test_responder_sees_request() {
        let client = MockCompletionClient::responding(|request| {
            MockReply::text(format!("echo: {}", request.user_content().unwrap_or("")))
        });
        let reply = client
            .complete(CompletionRequest::from_prompt("ping"))
            .await
            .unwrap();
        assert_eq!(reply, "echo: ping");
    }
}
