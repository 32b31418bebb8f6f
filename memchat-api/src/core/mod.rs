pub mod config;
pub mod llm;
pub mod memory;
pub mod orchestrator;
pub mod prompts;
pub mod session_manager;
pub mod storage;
pub mod tasks;
