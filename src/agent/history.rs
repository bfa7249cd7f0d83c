//! Context budgeting for the transcript sent to the model.

use crate::llm::{Message, Role};

/// Context budget when the provider/model pair is unknown.
pub const DEFAULT_CONTEXT_LEN: usize = 8192;

/// Tokens reserved for the system prompt and the response.
pub const TOKEN_OFFSET: usize = 2000;

/// `(provider, model, budget)`. `"default"` applies to any model of the provider.
const CONTEXT_WINDOWS: &[(&str, &str, usize)] = &[
    ("openai", "default", DEFAULT_CONTEXT_LEN * 4),
    ("ollama", "default", DEFAULT_CONTEXT_LEN),
    ("groq", "default", DEFAULT_CONTEXT_LEN),
    ("anthropic", "default", DEFAULT_CONTEXT_LEN * 4),
    ("google", "default", DEFAULT_CONTEXT_LEN * 4),
    ("aws", "default", DEFAULT_CONTEXT_LEN * 4),
];

/// Token budget for a provider/model pair.
pub fn context_budget(provider: &str, model: &str) -> usize {
    let entries = || CONTEXT_WINDOWS.iter().filter(|(p, _, _)| *p == provider);
    entries()
        .find(|(_, m, _)| *m == model)
        .or_else(|| entries().find(|(_, m, _)| *m == "default"))
        .map(|(_, _, budget)| *budget)
        .unwrap_or(DEFAULT_CONTEXT_LEN)
}

/// Approximate token count of the newline-joined message texts, plus
/// [`TOKEN_OFFSET`]. Four characters per token.
pub fn count_tokens<'a>(messages: impl IntoIterator<Item = &'a Message>) -> usize {
    let mut chars = 0usize;
    for (i, message) in messages.into_iter().enumerate() {
        if i > 0 {
            chars += 1;
        }
        chars += message.text().chars().count();
    }
    chars.div_ceil(4) + TOKEN_OFFSET
}

/// Drop the oldest history entries, two at a time, until `history` and
/// `turn` together fit in `budget`.
///
/// After a drop the kept slice always starts at a human message, so a tool
/// result is never separated from the call that produced it. `turn` (the
/// current task and its tool exchanges) is never trimmed; when it alone
/// exceeds the budget the result is an empty history.
pub fn compress_history<'a>(
    history: &'a [Message],
    turn: &[Message],
    budget: usize,
) -> &'a [Message] {
    let mut kept = history;
    while !kept.is_empty() && count_tokens(kept.iter().chain(turn)) > budget {
        kept = &kept[kept.len().min(2)..];
        while kept.first().is_some_and(|m| m.role != Role::Human) {
            kept = &kept[1..];
        }
    }
    if kept.len() < history.len() {
        tracing::debug!(
            dropped = history.len() - kept.len(),
            budget,
            "Compressed history to fit context"
        );
    }
    kept
}
