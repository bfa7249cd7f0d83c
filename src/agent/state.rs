//! Per-session agent state.

use crate::llm::{Message, Role};

/// Envelope for tool results sent as plain text (react mode).
pub const TOOL_RESPONSE_PREFIX: &str = "Tool response:\n";

/// Mutable session aggregate, owned by one [`super::Agent`].
///
/// `history` only grows when a turn finalizes; everything produced during a
/// turn lives in `task` and `tool_history` until then.
#[derive(Debug, Clone, Default)]
pub struct AgentState {
    /// Finalized turns, user-visible.
    pub history: Vec<Message>,
    /// Model/tool exchanges of the running turn.
    pub tool_history: Vec<Message>,
    /// Fixed priming exchanges, never shown to the user.
    pub few_shot_examples: Vec<Message>,
    /// Task of the running turn.
    pub task: Option<Message>,
    pub max_iterations: usize,
    pub ask_before_execute: bool,
    /// Local time the running turn started, as shown to the model.
    pub timestamp: String,
    /// Answer language (empty = unspecified).
    pub language: String,
}

impl AgentState {
    pub fn new(max_iterations: usize, ask_before_execute: bool, language: String) -> Self {
        Self {
            max_iterations,
            ask_before_execute,
            language,
            ..Self::default()
        }
    }

    pub(crate) fn begin_turn(&mut self, task: &str) {
        self.task = Some(Message::human(task));
        self.tool_history.clear();
        self.timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M %Z").to_string();
    }

    /// Task message followed by the tool exchanges of the running turn.
    pub fn turn_messages(&self) -> Vec<Message> {
        self.task
            .iter()
            .chain(self.tool_history.iter())
            .cloned()
            .collect()
    }

    /// Move the running turn into `history`.
    pub(crate) fn finalize_turn(&mut self, answer: Option<Message>) {
        self.history.extend(self.task.take());
        self.history.append(&mut self.tool_history);
        self.history.extend(answer);
    }

    /// Drop the running turn without touching `history`.
    pub(crate) fn abort_turn(&mut self) {
        self.task = None;
        self.tool_history.clear();
    }

    /// The running turn's task text, or the last human message of `history`.
    pub fn current_task(&self) -> Option<String> {
        self.task
            .as_ref()
            .or_else(|| self.history.iter().rev().find(|m| m.role == Role::Human))
            .map(Message::text)
    }

    /// History plus the running turn, reduced to plain human/AI text.
    ///
    /// Used by helpers that talk to the model without tool support: tool
    /// results become human messages and tool calls are rendered as JSON.
    pub fn flattened_transcript(&self) -> Vec<Message> {
        self.history
            .iter()
            .chain(self.task.iter())
            .chain(self.tool_history.iter())
            .map(|m| match m.role {
                Role::Tool => {
                    let text = m.text();
                    if text.starts_with(TOOL_RESPONSE_PREFIX) {
                        Message::human(text)
                    } else {
                        Message::human(format!("{}{}", TOOL_RESPONSE_PREFIX, text))
                    }
                }
                Role::Ai if !m.tool_calls.is_empty() => {
                    let calls = m
                        .tool_calls
                        .iter()
                        .map(|tc| format!("{{\"tool\": {:?}, \"args\": {}}}", tc.name, tc.args))
                        .collect::<Vec<_>>()
                        .join("\n");
                    let text = m.text();
                    if text.is_empty() {
                        Message::ai(calls)
                    } else {
                        Message::ai(format!("{}\n{}", text, calls))
                    }
                }
                _ => Message {
                    role: m.role,
                    content: m.content.clone(),
                    tool_calls: Vec::new(),
                    tool_call_id: None,
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolCall;

    #[test]
    fn finalize_orders_task_tools_answer() {
        let mut state = AgentState::new(4, true, String::new());
        state.begin_turn("list files");
        state.tool_history.push(Message::ai("{\"tool\":\"shell\",\"arg\":\"ls\"}"));
        state
            .tool_history
            .push(Message::tool("Tool response:\na.txt", None));
        state.finalize_turn(Some(Message::ai("a.txt")));

        let texts: Vec<String> = state.history.iter().map(Message::text).collect();
        assert_eq!(
            texts,
            vec![
                "list files",
                "{\"tool\":\"shell\",\"arg\":\"ls\"}",
                "Tool response:\na.txt",
                "a.txt"
            ]
        );
        assert!(state.tool_history.is_empty());
        assert!(state.task.is_none());
    }

    #[test]
    fn abort_leaves_history_untouched() {
        let mut state = AgentState::default();
        state.history.push(Message::human("earlier"));
        state.begin_turn("now");
        state.tool_history.push(Message::ai("partial"));
        state.abort_turn();
        assert_eq!(state.history.len(), 1);
        assert!(state.turn_messages().is_empty());
    }

    #[test]
    fn flattened_transcript_has_no_tool_roles() {
        let mut state = AgentState::default();
        state.begin_turn("branch?");
        state.tool_history.push(Message::ai_with_tool_calls(
            "",
            vec![ToolCall {
                id: "c1".to_string(),
                name: "shell".to_string(),
                args: "{\"arg\":\"git branch\"}".to_string(),
            }],
        ));
        state
            .tool_history
            .push(Message::tool("main", Some("c1".to_string())));

        let flat = state.flattened_transcript();
        assert!(flat.iter().all(|m| m.role != Role::Tool));
        assert!(flat.iter().all(|m| m.tool_calls.is_empty()));
        assert_eq!(flat[2].text(), "Tool response:\nmain");
        assert!(flat[1].text().contains("git branch"));
        assert_eq!(state.current_task().as_deref(), Some("branch?"));
    }
}
