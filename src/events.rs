//! Events emitted while a turn runs.
//!
//! The agent never prints. Everything user-facing goes through an
//! [`EventSink`]; the console renders it, tests record it.

use tokio::sync::mpsc;

use crate::tools::ToolMeta;

/// Agent-side execution events.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Text content being streamed by the model.
    TextDelta { content: String },
    /// A tool is about to be dispatched.
    ToolCall {
        id: String,
        name: String,
        arg: String,
        thoughts: Option<String>,
    },
    /// A script generated by an expert tool, shown before confirmation.
    Script { language: String, code: String },
    /// The model's explanation of a command or script awaiting confirmation.
    Explanation { content: String },
    /// Tool execution completed (successfully or not).
    ToolResult {
        id: String,
        name: String,
        content: String,
        meta: ToolMeta,
    },
    /// A tool failed; the failure was folded into its result.
    ToolError { name: String, message: String },
    /// Informational message (truncation, clipboard, ...).
    Notice { content: String },
    /// The turn finished with this answer.
    Answer { content: String, skip_print: bool },
    /// The turn was aborted by a gateway failure.
    TurnFailed { message: String },
}

/// Receiver of [`AgentEvent`]s.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: AgentEvent);
}

impl EventSink for mpsc::UnboundedSender<AgentEvent> {
    fn emit(&self, event: AgentEvent) {
        // Nobody listening is fine.
        let _ = self.send(event);
    }
}

/// Discards every event.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: AgentEvent) {}
}
