//! Prompt templates for the chat, summary, gate and extraction calls

/// System prompt for the user-facing reply
pub const ASSISTANT_SYSTEM_PROMPT: &str = "You are an AI assistant that provides accurate and concise information.
Use provided memories if they are helpful.";

/// System prompt for rolling-summary regeneration
pub const SUMMARIZER_SYSTEM_PROMPT: &str = "You are a chat summarizer.
Summarize the conversation between user and assistant so far for future interactions.

Rules:
- Preserve user goals and intent
- Preserve decisions and constraints
- Preserve unresolved questions
- Remove examples and repetition
- Be concise and factual";

/// Reply the extraction call gives when a turn holds nothing durable
pub const NO_MEMORY_SENTINEL: &str = "NONE";

/// Placeholder used in the prompt when retrieval found nothing
pub const EMPTY_CONTEXT: &str = "None";

/// User message for the reply call
pub fn chat_user_prompt(message: &str, summary: &str, transcript: &str, context: &str) -> String {
    format!(
        "Query: {message}\nRolling Summary: {summary}\nRecent chats: {transcript}\nContext: {context}"
    )
}

/// Input for the summarizer: previous digest (if any) followed by the new turns
pub fn summary_input(previous_summary: &str, transcript: &str) -> String {
    if previous_summary.trim().is_empty() {
        transcript.to_string()
    } else {
        format!("Previous summary:\n{previous_summary}\n\nNew conversation:\n{transcript}")
    }
}

/// Classification prompt deciding whether a user message is worth remembering
pub fn memory_gate_prompt(user: &str) -> String {
    format!(
        "Decide if this conversation contains long-term user info.
Reply YES if the user reveals:
- name
- role
- preference
- project
- goal
- background
Reply only YES or NO.

User: {user}"
    )
}

/// Prompt extracting at most one durable fact from a turn
pub fn extraction_prompt(user: &str, assistant: &str) -> String {
    format!(
        "Extract ONLY long-term factual memory worth storing.
Rules:
- No explanations or opinions
- No duplication
- Max 1 sentence
- If nothing worth storing, return {NO_MEMORY_SENTINEL}

Conversation:
User: {user}
Assistant: {assistant}"
    )
}
