//! Short-term memory: recent turns kept verbatim
//!
//! The buffer grows by one turn per completed chat round and is flushed
//! into the rolling summary once it reaches its threshold.

use serde::{Deserialize, Serialize};

/// One completed chat round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub user: String,
    pub assistant: String,
}

impl Turn {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
        }
    }
}

/// Ordered buffer of recent turns with a summarization threshold
#[derive(Debug, Clone, Serialize)]
pub struct ShortTermBuffer {
    turns: Vec<Turn>,
    threshold: usize,
}

impl ShortTermBuffer {
    pub fn new(threshold: usize) -> Self {
        Self {
            turns: Vec::new(),
            threshold: threshold.max(1),
        }
    }

    /// Append a turn, returning the new length
    pub fn push(&mut self, turn: Turn) -> usize {
        self.turns.push(turn);
        self.turns.len()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Whether the buffer is due for summarization
    pub fn is_full(&self) -> bool {
        self.turns.len() >= self.threshold
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Remove the `count` oldest turns
    pub fn drain_oldest(&mut self, count: usize) {
        let count = count.min(self.turns.len());
        self.turns.drain(..count);
    }

    /// Transcript of the buffered turns, oldest first
    pub fn render_transcript(&self) -> String {
        render_transcript(&self.turns)
    }
}

/// `User: ...\nAssistant: ...` blocks separated by a blank line
pub fn render_transcript(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("User: {}\nAssistant: {}", t.user, t.assistant))
        .collect::<Vec<_>>()
        .join("\n\n")
}
