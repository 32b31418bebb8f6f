//! Meilisearch-backed long-term memory store
//!
//! One index holds every fact. Searches are filtered on `user_id`, so a
//! user never sees another user's facts.
//!
//! ## Index settings
//!
//! - Searchable: memory
//! - Filterable: user_id, created_at
//! - Sortable: created_at

use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use meilisearch_sdk::client::Client;
use meilisearch_sdk::indexes::Index;
use meilisearch_sdk::settings::Settings;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::config::MemoryStoreConfig;

use super::traits::{MemoryHit, MemoryStore};

/// Document structure for indexed facts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryDocument {
    pub id: String,
    pub user_id: String,
    pub memory: String,
    pub created_at: i64, // Unix timestamp for sorting
}

impl From<MemoryDocument> for MemoryHit {
    fn from(doc: MemoryDocument) -> Self {
        let created_at = Utc
            .timestamp_opt(doc.created_at, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self {
            id: doc.id,
            memory: doc.memory,
            user_id: doc.user_id,
            created_at,
        }
    }
}

/// Meilisearch client wrapper for the fact index
#[derive(Clone)]
pub struct MeilisearchMemoryStore {
    client: Client,
    index_name: String,
}

impl MeilisearchMemoryStore {
    /// Connect and make sure the index exists with the right settings
    pub async fn new(config: &MemoryStoreConfig) -> Result<Self> {
        info!("Connecting to Meilisearch at {}", config.url);

        let client = Client::new(&config.url, config.api_key.as_deref())?;
        let store = Self {
            client,
            index_name: config.index.clone(),
        };

        store.init_index().await?;

        info!("Connected to Meilisearch successfully");
        Ok(store)
    }

    async fn init_index(&self) -> Result<()> {
        self.client
            .create_index(&self.index_name, Some("id"))
            .await
            .ok(); // Ignore if exists

        let settings = Settings::new()
            .with_searchable_attributes(["memory"])
            .with_filterable_attributes(["user_id", "created_at"])
            .with_sortable_attributes(["created_at"]);

        self.index().set_settings(&settings).await?;

        info!("Meilisearch index {} initialized", self.index_name);
        Ok(())
    }

    fn index(&self) -> Index {
        self.client.index(&self.index_name)
    }

    /// Filter expression restricting a search to one user
    fn user_filter(user_id: &str) -> String {
        format!(
            "user_id = \"{}\"",
            user_id.replace('\\', "\\\\").replace('"', "\\\"")
        )
    }
}

#[async_trait]
impl MemoryStore for MeilisearchMemoryStore {
    fn backend(&self) -> &'static str {
        "meilisearch"
    }

    async fn search(&self, query: &str, user_id: &str, limit: usize) -> Result<Vec<MemoryHit>> {
        let index = self.index();
        let filter = Self::user_filter(user_id);

        let results = index
            .search()
            .with_query(query)
            .with_filter(&filter)
            .with_limit(limit)
            .execute::<MemoryDocument>()
            .await?;

        let hits: Vec<MemoryHit> = results.hits.into_iter().map(|h| h.result.into()).collect();
        debug!("Meilisearch: {} results for user {}", hits.len(), user_id);
        Ok(hits)
    }

    async fn add(&self, fact: &str, user_id: &str) -> Result<()> {
        let doc = MemoryDocument {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            memory: fact.to_string(),
            created_at: Utc::now().timestamp(),
        };

        self.index().add_documents(&[doc], Some("id")).await?;
        debug!("Indexed memory for user {}", user_id);
        Ok(())
    }
}
