//! Completion client trait and request types

use async_trait::async_trait;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;

/// Errors raised by a completion backend
#[derive(Error, Debug)]
pub enum LlmError {
    /// The HTTP request could not be sent or the body could not be read
    #[error("Completion request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("Completion API returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The API reported a failure inside the stream or response body
    #[error("Completion failed: {0}")]
    Api(String),

    /// The response body did not have the expected shape
    #[error("Failed to decode completion response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The stream closed before a completion event was seen
    #[error("Completion stream ended unexpectedly")]
    StreamEnded,

    /// No API key was configured
    #[error("Completion API key is not configured")]
    MissingApiKey,
}

pub type LlmResult<T> = Result<T, LlmError>;

/// Stream of incremental text fragments
pub type TokenStream = Pin<Box<dyn Stream<Item = LlmResult<String>> + Send>>;

/// Prompt message role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A completion request: the ordered prompt messages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionRequest {
    pub messages: Vec<PromptMessage>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<PromptMessage>) -> Self {
        Self { messages }
    }

    /// Single user-message request, used by the classification prompts
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![PromptMessage::user(prompt)],
        }
    }

    /// System + user pair
    pub fn with_system(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            messages: vec![PromptMessage::system(system), PromptMessage::user(user)],
        }
    }

    /// Content of the last user message, if any
    pub fn user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Trait for text completion backends
///
/// Implementations must be shareable across tasks: the orchestrator and
/// every background job hold the same client.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Model identifier used for requests
    fn model(&self) -> &str;

    /// Run a request to completion and return the full text
    async fn complete(&self, request: CompletionRequest) -> LlmResult<String>;

    /// Run a request and yield text deltas as they arrive
    fn stream(&self, request: CompletionRequest) -> TokenStream;
}
