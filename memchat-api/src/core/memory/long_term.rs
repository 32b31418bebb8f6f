//! Long-term memory: per-user facts in the external store
//!
//! Reads are similarity searches keyed by the current message; writes come
//! from the extraction step that runs after each completed turn.

use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::llm::{CompletionClient, CompletionRequest, LlmResult};
use crate::core::prompts::{
    EMPTY_CONTEXT, NO_MEMORY_SENTINEL, extraction_prompt, memory_gate_prompt,
};
use crate::core::storage::MemoryStore;

use super::short_term::Turn;

/// Outcome of a memory search, as consumed by the prompt builder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retrieval {
    /// Facts found, best match first
    Found(Vec<String>),
    /// The store answered with nothing
    Empty,
    /// The store failed; the chat proceeds without memories
    Degraded(String),
}

impl Retrieval {
    pub fn facts(&self) -> &[String] {
        match self {
            Retrieval::Found(facts) => facts,
            Retrieval::Empty | Retrieval::Degraded(_) => &[],
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Retrieval::Degraded(_))
    }

    /// Facts as `- fact` lines, or the empty-context placeholder
    pub fn render_context(&self) -> String {
        let facts = self.facts();
        if facts.is_empty() {
            return EMPTY_CONTEXT.to_string();
        }
        facts
            .iter()
            .map(|f| format!("- {f}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// What the extraction step did with a turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    /// The memory gate judged the turn not worth remembering
    Gated,
    /// The model answered with the sentinel
    NothingToStore,
    /// This fact was written to the store
    Stored(String),
}

/// Interpret an extraction reply; `None` for the sentinel or blank output
pub fn parse_extraction(reply: &str) -> Option<String> {
    let fact = reply.trim();
    let bare = fact.trim_end_matches('.').trim();
    if bare.is_empty() || bare.eq_ignore_ascii_case(NO_MEMORY_SENTINEL) {
        None
    } else {
        Some(fact.to_string())
    }
}

/// Interpret a memory-gate reply
pub fn parse_gate(reply: &str) -> bool {
    reply.trim().to_uppercase().contains("YES")
}

/// Long-term memory backed by a MemoryStore
#[derive(Clone)]
pub struct LongTermMemory {
    store: Arc<dyn MemoryStore>,
    client: Arc<dyn CompletionClient>,
    search_limit: usize,
    gate_enabled: bool,
}

impl LongTermMemory {
    pub fn new(store: Arc<dyn MemoryStore>, client: Arc<dyn CompletionClient>) -> Self {
        Self {
            store,
            client,
            search_limit: 5,
            gate_enabled: false,
        }
    }

    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit;
        self
    }

    pub fn with_gate(mut self, enabled: bool) -> Self {
        self.gate_enabled = enabled;
        self
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    /// Facts related to `message` for `user_id`; never fails
    pub async fn retrieve(&self, message: &str, user_id: &str) -> Retrieval {
        match self.store.search(message, user_id, self.search_limit).await {
            Ok(hits) if hits.is_empty() => Retrieval::Empty,
            Ok(hits) => {
                debug!("Retrieved {} memories for user {}", hits.len(), user_id);
                Retrieval::Found(hits.into_iter().map(|h| h.memory).collect())
            },
            Err(e) => {
                warn!("Memory search failed for user {}: {}", user_id, e);
                Retrieval::Degraded(e.to_string())
            },
        }
    }

    /// Run `retrieve` on its own task so a slow store does not hold up the caller
    pub fn spawn_retrieve(&self, message: String, user_id: String) -> JoinHandle<Retrieval> {
        let memory = self.clone();
        tokio::spawn(async move { memory.retrieve(&message, &user_id).await })
    }

    /// Whether the user message reveals durable user information
    pub async fn gate(&self, user_message: &str) -> LlmResult<bool> {
        let reply = self
            .client
            .complete(CompletionRequest::from_prompt(memory_gate_prompt(user_message)))
            .await?;
        let decision = parse_gate(&reply);
        debug!("Memory gate decision: {} ({})", decision, reply.trim());
        Ok(decision)
    }

    /// At most one durable fact from `turn`, or `None`
    pub async fn extract(&self, turn: &Turn) -> LlmResult<Option<String>> {
        let reply = self
            .client
            .complete(CompletionRequest::from_prompt(extraction_prompt(
                &turn.user,
                &turn.assistant,
            )))
            .await?;
        Ok(parse_extraction(&reply))
    }

    /// Gate, extract, and persist whatever `turn` teaches about `user_id`
    pub async fn remember(&self, turn: &Turn, user_id: &str) -> Result<ExtractionOutcome> {
        if self.gate_enabled && !self.gate(&turn.user).await? {
            return Ok(ExtractionOutcome::Gated);
        }

        let Some(fact) = self.extract(turn).await? else {
            debug!("Nothing worth storing for user {}", user_id);
            return Ok(ExtractionOutcome::NothingToStore);
        };

        self.store.add(&fact, user_id).await?;
        info!("Stored long-term memory for user {}", user_id);
        Ok(ExtractionOutcome::Stored(fact))
    }
}
