//! Long-term memory storage backends
//!
//! ## Available Backends
//!
//! - `memory`: In-process keyword store (default)
//! - `meilisearch`: Meilisearch full-text index, filtered per user

pub mod meilisearch;
mod memory;
mod traits;

pub use meilisearch::{MeilisearchMemoryStore, MemoryDocument};
pub use memory::*;
pub use traits::*;

use anyhow::Result;
use std::sync::Arc;

use crate::core::config::{MemoryStoreConfig, StoreBackend};

/// Build the configured store
pub async fn build_memory_store(config: &MemoryStoreConfig) -> Result<Arc<dyn MemoryStore>> {
    match config.backend {
        StoreBackend::InMemory => Ok(Arc::new(InMemoryMemoryStore::new())),
        StoreBackend::Meilisearch => Ok(Arc::new(MeilisearchMemoryStore::new(config).await?)),
    }
}
