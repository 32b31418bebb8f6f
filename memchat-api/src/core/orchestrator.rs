//! Chat orchestration: context assembly, completion, and turn bookkeeping
//!
//! For every message the orchestrator
//! 1. starts the long-term memory search on its own task,
//! 2. snapshots the session's rolling summary and short-term transcript,
//! 3. waits for the search and builds the prompt,
//! 4. runs the completion (blocking or streamed),
//! 5. records the turn and schedules summary regeneration and memory
//!    extraction as background work.
//!
//! Search failures degrade to an empty context. Completion failures go back
//! to the caller. Background failures never do.

use anyhow::Result;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::core::config::Settings;
use crate::core::llm::{CompletionClient, CompletionRequest, LlmResult, ResponsesClient, TokenStream};
use crate::core::memory::{LongTermMemory, MediumTermMemory, Retrieval, Turn};
use crate::core::prompts::{ASSISTANT_SYSTEM_PROMPT, chat_user_prompt};
use crate::core::session_manager::{SessionHandle, SessionManager};
use crate::core::storage::{MemoryStore, build_memory_store};
use crate::core::tasks::{BackgroundTasks, TaskKind};

#[derive(Clone)]
pub struct ChatOrchestrator {
    client: Arc<dyn CompletionClient>,
    long_term: LongTermMemory,
    medium_term: MediumTermMemory,
    sessions: Arc<SessionManager>,
    tasks: BackgroundTasks,
}

impl ChatOrchestrator {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        store: Arc<dyn MemoryStore>,
        settings: &Settings,
    ) -> Self {
        let long_term = LongTermMemory::new(store, client.clone())
            .with_search_limit(settings.memory_store.search_limit)
            .with_gate(settings.memory.gate_enabled);

        Self {
            medium_term: MediumTermMemory::new(client.clone()),
            client,
            long_term,
            sessions: Arc::new(SessionManager::new(&settings.memory)),
            tasks: BackgroundTasks::new(&settings.background),
        }
    }

    /// Wire the configured completion client and memory store
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let client = Arc::new(ResponsesClient::new(settings.llm.clone())?);
        let store = build_memory_store(&settings.memory_store).await?;

        info!(
            "Chat orchestrator ready (model: {}, store: {}, scope: {:?})",
            client.model(),
            store.backend(),
            settings.memory.session_scope
        );

        Ok(Self::new(client, store, settings))
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    pub fn store_backend(&self) -> &'static str {
        self.long_term.store().backend()
    }

    /// Assemble the prompt for `message` from all three memory tiers
    async fn assemble(&self, message: &str, user_id: &str) -> (SessionHandle, CompletionRequest) {
        // Search runs while the rest of the prompt is put together
        let search = self
            .long_term
            .spawn_retrieve(message.to_string(), user_id.to_string());

        let session = self.sessions.session_for(user_id);
        let (summary, transcript) = {
            let session = session.lock();
            (
                session.summary().to_string(),
                session.buffer().render_transcript(),
            )
        };

        let retrieval = match search.await {
            Ok(retrieval) => retrieval,
            Err(e) => Retrieval::Degraded(format!("memory search task failed: {e}")),
        };
        if let Retrieval::Degraded(reason) = &retrieval {
            warn!("Continuing without long-term memories: {}", reason);
        }

        let prompt = chat_user_prompt(
            message,
            &summary,
            &transcript,
            &retrieval.render_context(),
        );
        debug!(
            "Assembled prompt for user {} ({} memories)",
            user_id,
            retrieval.facts().len()
        );

        (
            session,
            CompletionRequest::with_system(ASSISTANT_SYSTEM_PROMPT, prompt),
        )
    }

    /// Answer `message` with the full reply text
    pub async fn chat(&self, message: &str, user_id: &str) -> LlmResult<String> {
        let (session, request) = self.assemble(message, user_id).await;
        let reply = self.client.complete(request).await?;
        self.finish_turn(&session, user_id, Turn::new(message, reply.clone()));
        Ok(reply)
    }

    /// Answer `message` as a stream of text fragments.
    ///
    /// The turn is recorded once the stream has been fully consumed. A
    /// stream that fails or is dropped early records nothing.
    pub fn chat_stream(&self, message: String, user_id: String) -> TokenStream {
        let orchestrator = self.clone();

        Box::pin(async_stream::stream! {
            let (session, request) = orchestrator.assemble(&message, &user_id).await;
            let mut tokens = orchestrator.client.stream(request);
            let mut reply = String::new();

            while let Some(token) = tokens.next().await {
                match token {
                    Ok(token) => {
                        reply.push_str(&token);
                        yield Ok(token);
                    }
                    Err(e) => {
                        error!("Completion stream failed for user {}: {}", user_id, e);
                        yield Err(e);
                        return;
                    }
                }
            }

            orchestrator.finish_turn(&session, &user_id, Turn::new(message, reply));
        })
    }

    /// Record the turn and schedule maintenance; returns immediately
    fn finish_turn(&self, session: &SessionHandle, user_id: &str, turn: Turn) {
        let buffered = session.lock().record_turn(turn.clone());
        info!("[STM] session updated, {} buffered turns", buffered);

        let medium_term = self.medium_term.clone();
        let summary_session = session.clone();
        self.tasks.spawn(TaskKind::RollingSummary, async move {
            medium_term.regenerate(&summary_session).await.map(|_| ())
        });

        let long_term = self.long_term.clone();
        let user_id = user_id.to_string();
        self.tasks.spawn(TaskKind::MemoryExtraction, async move {
            long_term.remember(&turn, &user_id).await.map(|_| ())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SessionScope;
    use crate::core::llm::{MockCompletionClient, MockReply};
    use crate::core::prompts::SUMMARIZER_SYSTEM_PROMPT;
    use crate::core::session_manager::GLOBAL_SESSION_KEY;
    use crate::core::storage::{InMemoryMemoryStore, MockMemoryStore};

    /// Answers each kind of call the pipeline makes
    fn pipeline_client(fact: &'static str) -> MockCompletionClient {
        MockCompletionClient::responding(move |request| {
            let system = request
                .messages
                .first()
                .map(|m| m.content.as_str())
                .unwrap_or("");
            let user = request.user_content().unwrap_or("");

            if system == SUMMARIZER_SYSTEM_PROMPT {
                MockReply::text("User is exploring Rust memory design.")
            } else if user.starts_with("Extract ONLY") {
                MockReply::text(fact)
            } else if user.starts_with("Decide if") {
                MockReply::text("YES")
            } else {
                MockReply::text("Here is a helpful answer")
            }
        })
    }

    fn settings(scope: SessionScope) -> Settings {
        let mut settings = Settings::defaults();
        settings.memory.session_scope = scope;
        settings
    }

    fn orchestrator_with(
        client: MockCompletionClient,
        store: Arc<dyn MemoryStore>,
        scope: SessionScope,
    ) -> ChatOrchestrator {
        ChatOrchestrator::new(Arc::new(client), store, &settings(scope))
    }

    fn chat_requests(client: &MockCompletionClient) -> Vec<CompletionRequest> {
        client
            .requests()
            .into_iter()
            .filter(|r| {
                r.messages
                    .first()
                    .is_some_and(|m| m.content == ASSISTANT_SYSTEM_PROMPT)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_search_failure_still_replies() {
        let mut store = MockMemoryStore::new();
        store
            .expect_search()
            .returning(|_, _, _| Err(anyhow::anyhow!("qdrant unreachable")));
        store.expect_add().returning(|_, _| Ok(()));

        let client = pipeline_client("NONE");
        let orchestrator =
            orchestrator_with(client.clone(), Arc::new(store), SessionScope::Global);

        let reply = orchestrator.chat("hello", "P101").await.unwrap();
        assert!(!reply.is_empty());

        let prompt = chat_requests(&client)[0].user_content().unwrap().to_string();
        assert!(prompt.starts_with("Query: hello\n"));
        assert!(prompt.ends_with("Context: None"));

        orchestrator.tasks().wait_idle().await;
    }

    #[tokio::test]
    async fn test_fifth_turn_triggers_summary() {
        let client = pipeline_client("NONE");
        let orchestrator = orchestrator_with(
            client.clone(),
            Arc::new(InMemoryMemoryStore::new()),
            SessionScope::Global,
        );

        for i in 0..4 {
            orchestrator.chat(&format!("question {i}"), "P101").await.unwrap();
            orchestrator.tasks().wait_idle().await;
        }

        let session = orchestrator.sessions().get(GLOBAL_SESSION_KEY).unwrap();
        assert_eq!(session.lock().buffer().len(), 4);
        assert!(session.lock().summary().is_empty());

        orchestrator.chat("question 4", "P101").await.unwrap();
        orchestrator.tasks().wait_idle().await;

        assert_eq!(session.lock().buffer().len(), 0);
        assert_eq!(
            session.lock().summary(),
            "User is exploring Rust memory design."
        );

        // The next prompt carries the summary and an empty transcript
        orchestrator.chat("question 5", "P101").await.unwrap();
        let last = chat_requests(&client).pop().unwrap();
        let prompt = last.user_content().unwrap();
        assert!(prompt.contains("Rolling Summary: User is exploring Rust memory design.\n"));
        assert!(prompt.contains("Recent chats: \n"));

        orchestrator.tasks().wait_idle().await;
    }

    #[tokio::test]
    async fn test_recent_turns_reach_the_prompt() {
        let client = pipeline_client("NONE");
        let orchestrator = orchestrator_with(
            client.clone(),
            Arc::new(InMemoryMemoryStore::new()),
            SessionScope::Global,
        );

        orchestrator.chat("my first question", "P101").await.unwrap();
        orchestrator.tasks().wait_idle().await;
        orchestrator.chat("follow-up", "P101").await.unwrap();

        let prompts = chat_requests(&client);
        let prompt = prompts[1].user_content().unwrap();
        assert!(prompt.contains(
            "Recent chats: User: my first question\nAssistant: Here is a helpful answer\n"
        ));

        orchestrator.tasks().wait_idle().await;
    }

    #[tokio::test]
    async fn test_extracted_fact_is_retrieved_for_same_user_only() {
        let client = pipeline_client("The user's name is Ada.");
        let store = Arc::new(InMemoryMemoryStore::new());
        let orchestrator = orchestrator_with(client.clone(), store.clone(), SessionScope::PerUser);

        orchestrator.chat("Hi, my name is Ada", "P101").await.unwrap();
        orchestrator.tasks().wait_idle().await;
        assert_eq!(store.count("P101"), 1);

        orchestrator.chat("What is my name?", "P101").await.unwrap();
        orchestrator.chat("What is my name?", "P999").await.unwrap();

        let prompts = chat_requests(&client);
        assert!(
            prompts[1]
                .user_content()
                .unwrap()
                .ends_with("Context: - The user's name is Ada.")
        );
        assert!(prompts[2].user_content().unwrap().ends_with("Context: None"));

        orchestrator.tasks().wait_idle().await;
    }

    #[tokio::test]
    async fn test_sentinel_extraction_never_writes() {
        let mut store = MockMemoryStore::new();
        store.expect_search().returning(|_, _, _| Ok(vec![]));
        store.expect_add().never();

        let orchestrator = orchestrator_with(
            pipeline_client("NONE"),
            Arc::new(store),
            SessionScope::Global,
        );
        orchestrator.chat("what's the weather?", "P101").await.unwrap();
        orchestrator.tasks().wait_idle().await;

        let stats = orchestrator.tasks().stats();
        assert_eq!(stats.scheduled, 2);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn test_background_failures_do_not_reach_caller() {
        let mut store = MockMemoryStore::new();
        store.expect_search().returning(|_, _, _| Ok(vec![]));
        store
            .expect_add()
            .returning(|_, _| Err(anyhow::anyhow!("write rejected")));

        let orchestrator = orchestrator_with(
            pipeline_client("User likes chess."),
            Arc::new(store),
            SessionScope::Global,
        );

        let reply = orchestrator.chat("I like chess", "P101").await.unwrap();
        assert_eq!(reply, "Here is a helpful answer");

        orchestrator.tasks().wait_idle().await;
        assert_eq!(orchestrator.tasks().stats().failed, 1);
    }

    #[tokio::test]
    async fn test_completion_failure_propagates_and_records_nothing() {
        let client = MockCompletionClient::scripted([MockReply::error("rate limited")]);
        let orchestrator = orchestrator_with(
            client,
            Arc::new(InMemoryMemoryStore::new()),
            SessionScope::Global,
        );

        assert!(orchestrator.chat("hello", "P101").await.is_err());

        let session = orchestrator.sessions().get(GLOBAL_SESSION_KEY).unwrap();
        assert!(session.lock().buffer().is_empty());
        assert_eq!(orchestrator.tasks().stats().scheduled, 0);
    }

    #[tokio::test]
    async fn test_stream_yields_tokens_then_records_turn() {
        let client = pipeline_client("NONE");
        let orchestrator = orchestrator_with(
            client,
            Arc::new(InMemoryMemoryStore::new()),
            SessionScope::Global,
        );

        let tokens: Vec<String> = orchestrator
            .chat_stream("hello".to_string(), "P101".to_string())
            .map(|t| t.unwrap())
            .collect()
            .await;
        assert!(tokens.len() > 1);
        assert_eq!(tokens.concat(), "Here is a helpful answer");

        let session = orchestrator.sessions().get(GLOBAL_SESSION_KEY).unwrap();
        assert_eq!(
            session.lock().buffer().turns(),
            &[Turn::new("hello", "Here is a helpful answer")]
        );

        orchestrator.tasks().wait_idle().await;
    }

    #[tokio::test]
    async fn test_failed_stream_records_nothing() {
        let client = MockCompletionClient::scripted([MockReply::ChunksThenError(
            vec!["partial".to_string()],
            "connection reset".to_string(),
        )]);
        let orchestrator = orchestrator_with(
            client,
            Arc::new(InMemoryMemoryStore::new()),
            SessionScope::Global,
        );

        let items: Vec<LlmResult<String>> = orchestrator
            .chat_stream("hello".to_string(), "P101".to_string())
            .collect()
            .await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());

        let session = orchestrator.sessions().get(GLOBAL_SESSION_KEY).unwrap();
        assert!(session.lock().buffer().is_empty());
        assert_eq!(orchestrator.tasks().stats().scheduled, 0);
    }

    #[tokio::test]
    async fn test_per_user_sessions_are_independent() {
        let orchestrator = orchestrator_with(
            pipeline_client("NONE"),
            Arc::new(InMemoryMemoryStore::new()),
            SessionScope::PerUser,
        );

        orchestrator.chat("hi", "alice").await.unwrap();
        orchestrator.chat("hi", "alice").await.unwrap();
        orchestrator.chat("hi", "bob").await.unwrap();
        orchestrator.tasks().wait_idle().await;

        let alice = orchestrator.sessions().get("alice").unwrap();
        let bob = orchestrator.sessions().get("bob").unwrap();
        assert_eq!(alice.lock().buffer().len(), 2);
        assert_eq!(bob.lock().buffer().len(), 1);
    }
}
