//! Tiered conversational memory
//!
//! This module provides the three tiers merged into every prompt:
//! - **Short-term**: recent turns kept verbatim in the session buffer
//! - **Medium-term**: the rolling summary regenerated from a full buffer
//! - **Long-term**: per-user facts in the external memory store
//!
//! ## Usage
//!
//! ```rust,ignore
//! let long_term = LongTermMemory::new(store, client.clone());
//! let retrieval = long_term.retrieve("What is my name?", "P101").await;
//! let context = retrieval.render_context();
//! ```

mod long_term;
mod medium_term;
mod short_term;

pub use long_term::{ExtractionOutcome, LongTermMemory, Retrieval, parse_extraction, parse_gate};
pub use medium_term::{MediumTermMemory, SummaryOutcome};
pub use short_term::{ShortTermBuffer, Turn, render_transcript};
