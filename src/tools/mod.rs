//! Tool registry and dispatcher.
//!
//! A tool receives a single string argument and an immutable [`ToolContext`]
//! and returns a [`ToolResult`]. Dispatch never fails: unknown tools and tool
//! errors are folded into the result so the model can react to them.

mod assist;
mod confirm;
mod experts;
mod shell_history;
mod terminal;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agent::{AgentState, ToolCallRequest};
use crate::events::{AgentEvent, EventSink};
use crate::llm::{LlmClient, ToolSchema};

pub use confirm::{
    Confirmation, Prompter, COMMAND_CHOICES, EXPLAINED_COMMAND_CHOICES,
    EXPLAINED_SCRIPT_CHOICES, SCRIPT_CHOICES,
};
pub use experts::{PythonExpert, ShellExpert};
pub use shell_history::ShellHistory;
pub use terminal::{detect_os, detect_shell, run_shell, Shell};

/// Flags attached to a tool result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToolMeta {
    /// End the turn now, using this result as the answer.
    pub stop_execution: bool,
    /// Do not echo the answer to the user.
    pub skip_print: bool,
}

/// Output of a tool, returned to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub content: String,
    pub meta: ToolMeta,
}

impl ToolResult {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            meta: ToolMeta::default(),
        }
    }

    /// Ends the turn with `content` as the answer.
    pub fn stop(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            meta: ToolMeta {
                stop_execution: true,
                skip_print: false,
            },
        }
    }

    /// The user declined to run the action. Ends the turn silently.
    pub fn interrupted(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            meta: ToolMeta {
                stop_execution: true,
                skip_print: true,
            },
        }
    }
}

/// What a tool may see and use while it runs.
pub struct ToolContext<'a> {
    pub state: &'a AgentState,
    pub llm: &'a dyn LlmClient,
    pub prompter: &'a dyn Prompter,
    pub events: &'a dyn EventSink,
}

impl ToolContext<'_> {
    /// Ask before a side effect, unless the session runs without confirmation.
    pub async fn confirm(&self, question: &str, choices: &[Confirmation]) -> Confirmation {
        if self.state.ask_before_execute {
            self.prompter.confirm(question, choices).await
        } else {
            Confirmation::Execute
        }
    }

    pub fn emit(&self, event: AgentEvent) {
        self.events.emit(event);
    }
}

/// A named capability the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments in function-call mode.
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "arg": {
                    "type": "string",
                    "description": "The argument for the tool"
                }
            },
            "required": ["arg"]
        })
    }

    /// Run the tool. Errors are reported to the model, not propagated.
    async fn execute(&self, arg: &str, ctx: &ToolContext<'_>) -> anyhow::Result<ToolResult>;
}

/// Name and description of a registered tool.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// Ordered set of tools.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Registry with the built-in tools.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(Shell));
        registry.register(Arc::new(ShellExpert));
        registry.register(Arc::new(PythonExpert));
        registry.register(Arc::new(ShellHistory));
        registry
    }

    pub fn empty() -> Self {
        Self { tools: Vec::new() }
    }

    /// Add a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect()
    }

    pub fn get_tool_schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .iter()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    /// Run the requested tool. Never fails.
    pub async fn dispatch(&self, request: &ToolCallRequest, ctx: &ToolContext<'_>) -> ToolResult {
        let Some(tool) = self.get(&request.tool) else {
            tracing::warn!("Model requested unknown tool: {}", request.tool);
            return ToolResult::new(format!("Tool {} not found", request.tool));
        };

        tracing::info!(tool = %request.tool, "Executing tool");
        match tool.execute(&request.arg, ctx).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(tool = %request.tool, "Tool failed: {:#}", e);
                ctx.emit(AgentEvent::ToolError {
                    name: request.tool.clone(),
                    message: format!("{:#}", e),
                });
                ToolResult::new(format!("Tool error: {:#}", e))
            }
        }
    }
}

/// Keep the first and last `keep` chars of an output longer than `limit`.
pub(crate) fn truncate_middle(output: String, limit: usize, keep: usize) -> String {
    let total = output.chars().count();
    if total <= limit {
        return output;
    }
    let head: String = output.chars().take(keep).collect();
    let tail: String = output.chars().skip(total - keep).collect();
    format!("{}\n...(OUTPUT TOO LONG TRUNCATED!)...\n{}", head, tail)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Test doubles shared by tool and agent tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{Confirmation, Prompter};
    use crate::llm::{ChatChunk, ChatRequest, ChunkStream, LlmClient, LlmError};

    /// Answers confirmations and selections from a script; cancels once
    /// exhausted.
    pub struct ScriptedPrompter {
        answers: Mutex<VecDeque<Confirmation>>,
        selections: Mutex<VecDeque<Option<usize>>>,
        pub asked: Mutex<Vec<String>>,
        /// Choices offered with each confirmation.
        pub choices: Mutex<Vec<Vec<Confirmation>>>,
        /// Options offered with each selection.
        pub offered: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedPrompter {
        pub fn new(answers: impl IntoIterator<Item = Confirmation>) -> Self {
            Self {
                answers: Mutex::new(answers.into_iter().collect()),
                selections: Mutex::new(VecDeque::new()),
                asked: Mutex::new(Vec::new()),
                choices: Mutex::new(Vec::new()),
                offered: Mutex::new(Vec::new()),
            }
        }

        pub fn with_selections(self, selections: impl IntoIterator<Item = Option<usize>>) -> Self {
            *self.selections.lock().unwrap() = selections.into_iter().collect();
            self
        }
    }

    #[async_trait]
    impl Prompter for ScriptedPrompter {
        async fn confirm(&self, question: &str, choices: &[Confirmation]) -> Confirmation {
            self.asked.lock().unwrap().push(question.to_string());
            self.choices.lock().unwrap().push(choices.to_vec());
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Confirmation::Cancel)
        }

        async fn select(&self, _question: &str, options: &[String]) -> Option<usize> {
            self.offered.lock().unwrap().push(options.to_vec());
            self.selections.lock().unwrap().pop_front().flatten()
        }
    }

    /// Replies with canned texts, one per request.
    pub struct CannedLlm {
        replies: Mutex<VecDeque<String>>,
        pub requests: Mutex<Vec<ChatRequest>>,
    }

    impl CannedLlm {
        pub fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for CannedLlm {
        async fn stream(&self, request: &ChatRequest) -> Result<ChunkStream, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| LlmError::Stream("no canned reply left".to_string()))?;
            Ok(Box::pin(futures::stream::iter(vec![Ok(ChatChunk::text(reply))])))
        }
    }
}
