use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub memory_store: MemoryStoreConfig,
    #[serde(default)]
    pub background: BackgroundConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-5-mini".to_string(),
            timeout_seconds: 120,
        }
    }
}

/// How `POST /chat/` answers
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// `text/plain` body of concatenated tokens
    #[default]
    Streaming,
    /// JSON `{"response": ...}`
    Blocking,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ChatConfig {
    #[serde(default)]
    pub response_mode: ResponseMode,
}

/// Which requests share a short-term buffer and rolling summary
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionScope {
    /// One buffer and summary for the whole process
    #[default]
    Global,
    /// One buffer and summary per user identifier
    PerUser,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MemoryConfig {
    pub buffer_threshold: usize,
    pub session_scope: SessionScope,
    pub idle_timeout_minutes: i64,
    pub gate_enabled: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            buffer_threshold: 5,
            session_scope: SessionScope::Global,
            idle_timeout_minutes: 60,
            gate_enabled: false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    InMemory,
    Meilisearch,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MemoryStoreConfig {
    pub backend: StoreBackend,
    pub url: String,
    pub api_key: Option<String>,
    pub index: String,
    pub search_limit: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::InMemory,
            url: "http://localhost:7700".to_string(),
            api_key: None,
            index: "memchat_memories".to_string(),
            search_limit: 5,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BackgroundConfig {
    pub max_concurrent: usize,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self { max_concurrent: 8 }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("llm.base_url", "https://api.openai.com/v1")?
            .set_default("llm.model", "gpt-5-mini")?
            .set_default("llm.timeout_seconds", 120)?
            .set_default("chat.response_mode", "streaming")?
            .set_default("memory.buffer_threshold", 5)?
            .set_default("memory.session_scope", "global")?
            .set_default("memory.idle_timeout_minutes", 60)?
            .set_default("memory.gate_enabled", false)?
            .set_default("memory_store.backend", "in_memory")?
            .set_default("memory_store.url", "http://localhost:7700")?
            .set_default("memory_store.index", "memchat_memories")?
            .set_default("memory_store.search_limit", 5)?
            .set_default("background.max_concurrent", 8)?;

        // Conventional variable names act as defaults; files and MEMCHAT__* win
        if let Ok(key) = env::var("OPENAI_API_KEY") {
            builder = builder.set_default("llm.api_key", key)?;
        }
        if let Ok(url) = env::var("MEILISEARCH_URL") {
            builder = builder.set_default("memory_store.url", url)?;
        }
        if let Ok(key) = env::var("MEILISEARCH_KEY") {
            builder = builder.set_default("memory_store.api_key", key)?;
        }

        let s = builder
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("MEMCHAT").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Settings with every default and no external sources
    pub fn defaults() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            llm: LlmConfig::default(),
            chat: ChatConfig::default(),
            memory: MemoryConfig::default(),
            memory_store: MemoryStoreConfig::default(),
            background: BackgroundConfig::default(),
        }
    }
}
