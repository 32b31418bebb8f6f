//! Storage trait definitions
//!
//! The long-term memory store is an external collaborator. This trait is the
//! only surface the chat pipeline sees; implementations can be in-process,
//! Meilisearch-backed, or anything else that can search text by user.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored long-term fact as returned by a search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryHit {
    pub id: String,
    pub memory: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// Trait for long-term memory backends
///
/// Implementations must be thread-safe (Send + Sync): searches run on a
/// spawned task and writes run from detached background jobs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Short backend name for logs and stats
    fn backend(&self) -> &'static str;

    /// Facts related to `query`, visible to `user_id` only, best match first
    async fn search(&self, query: &str, user_id: &str, limit: usize) -> Result<Vec<MemoryHit>>;

    /// Persist `fact` for `user_id`
    async fn add(&self, fact: &str, user_id: &str) -> Result<()>;
}
