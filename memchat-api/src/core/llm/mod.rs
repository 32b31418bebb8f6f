//! Completion backends
//!
//! - `client`: the `CompletionClient` trait and prompt types
//! - `openai`: OpenAI Responses API over HTTP
//! - `mock`: scripted client for tests and offline runs

mod client;
pub mod mock;
pub mod openai;

pub use client::*;
pub use mock::{MockCompletionClient, MockReply};
pub use openai::ResponsesClient;
