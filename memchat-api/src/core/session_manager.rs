//! Session registry: owns each scope's short-term buffer and rolling summary

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::core::config::{MemoryConfig, SessionScope};
use crate::core::memory::{ShortTermBuffer, Turn};

/// Key of the single session used with `SessionScope::Global`
pub const GLOBAL_SESSION_KEY: &str = "global";

/// Turns handed to the summarizer, plus the digest they extend
#[derive(Debug, Clone)]
pub struct SummaryJob {
    pub previous: String,
    pub turns: Vec<Turn>,
}

/// Short-term buffer and rolling summary of one scope
#[derive(Debug)]
pub struct SessionMemory {
    key: String,
    buffer: ShortTermBuffer,
    summary: String,
    summarizing: bool,
    created_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
}

impl SessionMemory {
    pub fn new(key: impl Into<String>, threshold: usize) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            buffer: ShortTermBuffer::new(threshold),
            summary: String::new(),
            summarizing: false,
            created_at: now,
            last_active: now,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn buffer(&self) -> &ShortTermBuffer {
        &self.buffer
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    /// Append a completed turn, returning the buffer length
    pub fn record_turn(&mut self, turn: Turn) -> usize {
        self.touch();
        self.buffer.push(turn)
    }

    /// Claim the buffered turns for summarization.
    ///
    /// Returns `None` below the threshold or while another summary of this
    /// session is in flight.
    pub fn begin_summary(&mut self) -> Option<SummaryJob> {
        if self.summarizing || !self.buffer.is_full() {
            return None;
        }

        self.summarizing = true;
        Some(SummaryJob {
            previous: self.summary.clone(),
            turns: self.buffer.turns().to_vec(),
        })
    }

    /// Replace the summary and drop the `summarized` oldest turns
    pub fn finish_summary(&mut self, summarized: usize, summary: String) {
        self.summary = summary;
        self.buffer.drain_oldest(summarized);
        self.summarizing = false;
    }

    /// Release the claim after a failed summary; the buffer is kept
    pub fn abort_summary(&mut self) {
        self.summarizing = false;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            key: self.key.clone(),
            summary: self.summary.clone(),
            turns: self.buffer.turns().to_vec(),
            buffer_threshold: self.buffer.threshold(),
            summarizing: self.summarizing,
            created_at: self.created_at,
            last_active: self.last_active,
        }
    }

    pub fn overview(&self) -> SessionOverview {
        SessionOverview {
            key: self.key.clone(),
            turn_count: self.buffer.len(),
            summary_chars: self.summary.chars().count(),
            last_active: self.last_active,
        }
    }
}

/// Full copy of a session's state
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub key: String,
    pub summary: String,
    pub turns: Vec<Turn>,
    pub buffer_threshold: usize,
    pub summarizing: bool,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// Listing entry for a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionOverview {
    pub key: String,
    pub turn_count: usize,
    pub summary_chars: usize,
    pub last_active: DateTime<Utc>,
}

pub type SessionHandle = Arc<Mutex<SessionMemory>>;

/// Owns the sessions, keyed according to the configured scope
pub struct SessionManager {
    sessions: DashMap<String, SessionHandle>,
    scope: SessionScope,
    threshold: usize,
    idle_timeout: chrono::Duration,
}

impl SessionManager {
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            scope: config.session_scope,
            threshold: config.buffer_threshold,
            idle_timeout: chrono::Duration::minutes(config.idle_timeout_minutes),
        }
    }

    pub fn scope(&self) -> SessionScope {
        self.scope
    }

    /// Session key a user identifier maps to
    pub fn scope_key<'a>(&self, user_id: &'a str) -> &'a str {
        match self.scope {
            SessionScope::Global => GLOBAL_SESSION_KEY,
            SessionScope::PerUser => user_id,
        }
    }

    /// Session for `user_id`, created on first use
    pub fn session_for(&self, user_id: &str) -> SessionHandle {
        let key = self.scope_key(user_id);
        let handle = self
            .sessions
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!("Creating session {}", key);
                Arc::new(Mutex::new(SessionMemory::new(key, self.threshold)))
            })
            .clone();

        handle.lock().touch();
        handle
    }

    pub fn get(&self, key: &str) -> Option<SessionHandle> {
        self.sessions.get(key).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, key: &str) -> bool {
        self.sessions.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn list(&self) -> Vec<SessionOverview> {
        let mut sessions: Vec<SessionOverview> = self
            .sessions
            .iter()
            .map(|entry| entry.value().lock().overview())
            .collect();
        sessions.sort_by(|a, b| b.last_active.cmp(&a.last_active));
        sessions
    }

    /// Drop sessions idle for longer than the configured timeout
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| now - session.lock().last_active() <= self.idle_timeout);
        before - self.sessions.len()
    }

    /// Periodic eviction of idle sessions
    pub fn start_cleanup_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(60)).await;

                let count = manager.cleanup_expired();
                if count > 0 {
                    info!("Evicted {} idle sessions", count);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(scope: SessionScope) -> MemoryConfig {
        MemoryConfig {
            buffer_threshold: 2,
            session_scope: scope,
            ..MemoryConfig::default()
        }
    }

    #[test]
    fn test_global_scope_shares_one_session() {
        let manager = SessionManager::new(&config(SessionScope::Global));
        let a = manager.session_for("alice");
        let b = manager.session_for("bob");

        a.lock().record_turn(Turn::new("hi", "hello"));
        assert_eq!(b.lock().buffer().len(), 1);
        assert_eq!(manager.len(), 1);
        assert!(manager.get(GLOBAL_SESSION_KEY).is_some());
    }

    #[test]
    fn test_per_user_scope_isolates_sessions() {
        let manager = SessionManager::new(&config(SessionScope::PerUser));
        let a = manager.session_for("alice");
        let b = manager.session_for("bob");

        a.lock().record_turn(Turn::new("hi", "hello"));
        assert_eq!(a.lock().buffer().len(), 1);
        assert!(b.lock().buffer().is_empty());
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_summary_claim_lifecycle() {
        let mut session = SessionMemory::new("k", 2);
        session.record_turn(Turn::new("a", "1"));
        assert!(session.begin_summary().is_none());

        session.record_turn(Turn::new("b", "2"));
        let job = session.begin_summary().unwrap();
        assert_eq!(job.turns.len(), 2);
        assert!(job.previous.is_empty());

        // Claimed: a second summary cannot start
        assert!(session.begin_summary().is_none());

        // A turn landing mid-summary survives the flush
        session.record_turn(Turn::new("c", "3"));
        session.finish_summary(job.turns.len(), "digest".to_string());
        assert_eq!(session.summary(), "digest");
        assert_eq!(session.buffer().turns(), &[Turn::new("c", "3")]);
    }

    #[test]
    fn test_abort_summary_keeps_buffer() {
        let mut session = SessionMemory::new("k", 1);
        session.record_turn(Turn::new("a", "1"));
        assert!(session.begin_summary().is_some());
        session.abort_summary();
        assert_eq!(session.buffer().len(), 1);
        assert!(session.begin_summary().is_some());
    }

    #[test]
    fn test_cleanup_expired_and_remove() {
        let manager = SessionManager::new(&MemoryConfig {
            idle_timeout_minutes: 0,
            session_scope: SessionScope::PerUser,
            ..MemoryConfig::default()
        });
        manager.session_for("alice");
        manager.session_for("bob");
        assert!(manager.remove("bob"));
        assert!(!manager.remove("bob"));

        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(manager.cleanup_expired(), 1);
        assert!(manager.is_empty());
    }
}
