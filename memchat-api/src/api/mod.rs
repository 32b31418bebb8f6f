pub mod chat;
pub mod sessions;
pub mod stats;
