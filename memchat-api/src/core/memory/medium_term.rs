//! Medium-term memory: the rolling summary
//!
//! Once a session's short-term buffer reaches its threshold, the buffered
//! turns are compacted by the completion model into a single digest that
//! replaces the previous one. The compaction is lossy and one-way.

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::llm::{CompletionClient, CompletionRequest, LlmError, LlmResult};
use crate::core::prompts::{SUMMARIZER_SYSTEM_PROMPT, summary_input};
use crate::core::session_manager::SessionHandle;

use super::short_term::{Turn, render_transcript};

/// What a regeneration pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryOutcome {
    /// Buffer below threshold, or a summary already in flight
    Skipped,
    /// Summary replaced; this many turns were flushed
    Summarized(usize),
}

/// Regenerates rolling summaries through the completion client
#[derive(Clone)]
pub struct MediumTermMemory {
    client: Arc<dyn CompletionClient>,
}

impl MediumTermMemory {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    /// Ask the model for a digest of `turns`, extending `previous`
    pub async fn summarize(&self, previous: &str, turns: &[Turn]) -> LlmResult<String> {
        let transcript = render_transcript(turns);
        let request = CompletionRequest::with_system(
            SUMMARIZER_SYSTEM_PROMPT,
            summary_input(previous, &transcript),
        );

        let summary = self.client.complete(request).await?.trim().to_string();
        if summary.is_empty() {
            return Err(LlmError::Api("summarizer returned an empty summary".to_string()));
        }
        Ok(summary)
    }

    /// Summarize and flush the session buffer if it reached its threshold.
    ///
    /// The session lock is only held to claim the turns and to swap the
    /// result in; the completion call runs unlocked.
    pub async fn regenerate(&self, session: &SessionHandle) -> Result<SummaryOutcome> {
        let Some(job) = session.lock().begin_summary() else {
            debug!("Rolling summary not due");
            return Ok(SummaryOutcome::Skipped);
        };

        match self.summarize(&job.previous, &job.turns).await {
            Ok(summary) => {
                let mut session = session.lock();
                session.finish_summary(job.turns.len(), summary);
                info!(
                    "Rolling summary updated for session {} ({} turns flushed, {} remaining)",
                    session.key(),
                    job.turns.len(),
                    session.buffer().len()
                );
                Ok(SummaryOutcome::Summarized(job.turns.len()))
            },
            Err(e) => {
                session.lock().abort_summary();
                Err(e.into())
            },
        }
    }
}
