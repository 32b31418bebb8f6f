//! In-memory storage implementation
//!
//! Facts are kept in a map keyed by user identifier and ranked with a
//! keyword overlap score. Data is lost when the process exits.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use super::traits::{MemoryHit, MemoryStore};

/// Words shorter than this do not take part in matching
const MIN_TERM_LEN: usize = 3;

/// In-memory implementation of MemoryStore
///
/// Uses a HashMap protected by a RwLock for thread-safe access.
/// Suitable for development, tests and single-instance deployments.
#[derive(Default)]
pub struct InMemoryMemoryStore {
    facts: RwLock<HashMap<String, Vec<MemoryHit>>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of facts stored for `user_id`
    pub fn count(&self, user_id: &str) -> usize {
        self.facts.read().get(user_id).map_or(0, Vec::len)
    }

    fn terms(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() >= MIN_TERM_LEN)
            .map(str::to_lowercase)
            .collect()
    }

    /// Share of query terms found in the fact (0.0 - 1.0)
    fn keyword_match_score(query_terms: &[String], fact: &str) -> f64 {
        if query_terms.is_empty() {
            return 0.0;
        }

        let fact_terms = Self::terms(fact);
        let matches = query_terms
            .iter()
            .filter(|term| fact_terms.iter().any(|f| f == *term))
            .count();

        matches as f64 / query_terms.len() as f64
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    fn backend(&self) -> &'static str {
        "in_memory"
    }

    async fn search(&self, query: &str, user_id: &str, limit: usize) -> Result<Vec<MemoryHit>> {
        let facts = self.facts.read();
        let Some(user_facts) = facts.get(user_id) else {
            return Ok(vec![]);
        };

        let query_terms = Self::terms(query);
        let mut scored: Vec<(f64, &MemoryHit)> = user_facts
            .iter()
            .map(|hit| (Self::keyword_match_score(&query_terms, &hit.memory), hit))
            .filter(|(score, _)| *score > 0.0)
            .collect();

        // Best score first, newer facts win ties
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.created_at.cmp(&a.1.created_at))
        });

        let results: Vec<MemoryHit> = scored
            .into_iter()
            .take(limit)
            .map(|(_, hit)| hit.clone())
            .collect();

        debug!(
            "InMemoryMemoryStore: {} results for user {}",
            results.len(),
            user_id
        );
        Ok(results)
    }

    async fn add(&self, fact: &str, user_id: &str) -> Result<()> {
        let fact = fact.trim();
        if fact.is_empty() {
            return Err(anyhow::anyhow!("Refusing to store an empty fact"));
        }

        let mut facts = self.facts.write();
        let user_facts = facts.entry(user_id.to_string()).or_default();

        if user_facts
            .iter()
            .any(|existing| existing.memory.eq_ignore_ascii_case(fact))
        {
            debug!("Fact already stored for user {}, skipping", user_id);
            return Ok(());
        }

        user_facts.push(MemoryHit {
            id: Uuid::new_v4().to_string(),
            memory: fact.to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now(),
        });
        info!("Stored memory for user {}", user_id);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_search_is_scoped_by_user() {
        let store = InMemoryMemoryStore::new();
        store
            .add("The user's name is Alice and she works on Rust compilers", "P101")
            .await
            .unwrap();

        let own = store.search("What is my name?", "P101", 5).await.unwrap();
        assert_eq!(own.len(), 1);
        assert!(own[0].memory.contains("Alice"));

        let other = store.search("What is my name?", "P202", 5).await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_search_ranks_and_limits() {
        let store = InMemoryMemoryStore::new();
        store.add("User prefers dark roast coffee", "u").await.unwrap();
        store.add("User is learning Rust async", "u").await.unwrap();
        store
            .add("User writes Rust async services for work", "u")
            .await
            .unwrap();

        let results = store.search("rust async services", "u", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].memory.contains("services"));
        assert!(results.iter().all(|r| !r.memory.contains("coffee")));
    }

    #[tokio::test]
    async fn test_add_skips_duplicates_and_empty() {
        let store = InMemoryMemoryStore::new();
        store.add("User lives in Lisbon", "u").await.unwrap();
        store.add("user lives in lisbon", "u").await.unwrap();
        assert_eq!(store.count("u"), 1);

        assert!(store.add("   ", "u").await.is_err());
        assert_eq!(store.count("u"), 1);
    }

    #[test]
    fn test_keyword_match_score() {
        let terms = InMemoryMemoryStore::terms("favourite programming language");
        let score = InMemoryMemoryStore::keyword_match_score(&terms, "Favourite language is Rust");
        assert!((score - 2.0 / 3.0).abs() < 0.001);
        assert_eq!(InMemoryMemoryStore::keyword_match_score(&[], "anything"), 0.0);
    }
}
