//! Turn state machine.
//!
//! A turn alternates between streaming a model response and dispatching the
//! tool it asked for, until the model answers without a tool call, a tool ends
//! the turn, or the iteration cap is reached:
//!
//! ```text
//! Streaming --tool call--> ToolDispatch --continue--> Streaming
//! Streaming --no tool call--> Finalized
//! ToolDispatch --stop_execution | cap reached--> Finalized
//! ```

use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use super::history::compress_history;
use super::parser::{self, Detection, ToolCallAccumulator, ToolCallRequest};
use super::prompt::build_system_prompt;
use super::screen::{self, ScreenCapture, SystemScreen};
use super::state::{AgentState, TOOL_RESPONSE_PREFIX};
use crate::config::{AgentPattern, Config};
use crate::events::{AgentEvent, EventSink};
use crate::llm::{collect_text, ChatRequest, LlmClient, LlmError, Message, ToolCall};
use crate::tools::{Prompter, ToolContext, ToolRegistry};

/// Errors that abort a turn.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Model gateway failed: {0}")]
    Gateway(#[from] LlmError),

    #[error("Screenshot failed: {0}")]
    Screenshot(String),
}

/// Why a turn finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The model answered without requesting a tool.
    Answered,
    /// A tool ended the turn (user interrupt, clipboard copy).
    Stopped,
    /// `max_iterations` tool dispatches happened without a final answer.
    IterationLimit,
}

/// Result of a finalized turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub answer: String,
    pub reason: FinishReason,
    /// The answer was already shown (or must not be).
    pub skip_print: bool,
    /// Tool dispatches performed during the turn.
    pub dispatches: usize,
}

enum TurnState {
    Streaming,
    ToolDispatch {
        message: Message,
        request: ToolCallRequest,
    },
    Finalized {
        answer: String,
        reason: FinishReason,
        skip_print: bool,
        final_message: Option<Message>,
    },
}

/// The shell assistant. Owns the session state; one turn at a time.
pub struct Agent {
    config: Config,
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    prompter: Arc<dyn Prompter>,
    events: Arc<dyn EventSink>,
    screen: Arc<dyn ScreenCapture>,
    state: AgentState,
}

impl Agent {
    pub fn new(
        config: Config,
        llm: Arc<dyn LlmClient>,
        tools: ToolRegistry,
        prompter: Arc<dyn Prompter>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let state = AgentState::new(
            config.max_iterations,
            config.ask_before_execute,
            config.language.clone(),
        );
        Self {
            config,
            llm,
            tools,
            prompter,
            events,
            screen: Arc::new(SystemScreen),
            state,
        }
    }

    /// Prime every request with these exchanges.
    pub fn with_examples(mut self, examples: Vec<Message>) -> Self {
        self.state.few_shot_examples = examples;
        self
    }

    /// Take screenshots for `/screen` tasks from `screen`.
    pub fn with_screen(mut self, screen: Arc<dyn ScreenCapture>) -> Self {
        self.screen = screen;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn history(&self) -> &[Message] {
        &self.state.history
    }

    pub fn events(&self) -> &dyn EventSink {
        self.events.as_ref()
    }

    /// Run one task to completion.
    ///
    /// On success the task, every tool exchange and the final answer are
    /// appended to the history. On a gateway failure nothing is.
    pub async fn run_turn(&mut self, task: &str) -> Result<TurnOutcome, AgentError> {
        self.state.begin_turn(task);

        match self.drive().await {
            Ok((outcome, final_message)) => {
                self.state.finalize_turn(final_message);
                self.events.emit(AgentEvent::Answer {
                    content: outcome.answer.clone(),
                    skip_print: outcome.skip_print,
                });
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!("Turn aborted: {}", e);
                self.state.abort_turn();
                Err(e)
            }
        }
    }

    /// Describe the screen with `task` in mind and return the task with that
    /// description as context. Nothing is added to the history.
    pub async fn add_screen_context(&self, task: &str) -> Result<String, AgentError> {
        self.events.emit(AgentEvent::Notice {
            content: "📸 Taking a screenshot...".to_string(),
        });
        let image = self
            .screen
            .capture()
            .await
            .map_err(|e| AgentError::Screenshot(format!("{:#}", e)))?;

        let transcript = self.state.flattened_transcript();
        let history = compress_history(&transcript, &[], self.config.llm.context_window);
        let request = screen::describe_request(history.to_vec(), task, image, &self.state.language);
        let description = collect_text(self.llm.as_ref(), &request, |_| {}).await?;
        self.events.emit(AgentEvent::Notice {
            content: format!("👀 {}", description.trim()),
        });
        Ok(screen::screen_task(&description, task))
    }

    async fn drive(&mut self) -> Result<(TurnOutcome, Option<Message>), AgentError> {
        let mut dispatches = 0;
        let mut turn = TurnState::Streaming;

        loop {
            turn = match turn {
                TurnState::Streaming => {
                    tracing::debug!("Agent iteration {}", dispatches + 1);
                    self.stream_response().await?
                }
                TurnState::ToolDispatch { message, request } => {
                    dispatches += 1;
                    self.dispatch(message, request, dispatches).await
                }
                TurnState::Finalized {
                    answer,
                    reason,
                    skip_print,
                    final_message,
                } => {
                    let outcome = TurnOutcome {
                        answer,
                        reason,
                        skip_print,
                        dispatches,
                    };
                    return Ok((outcome, final_message));
                }
            };
        }
    }

    /// Stream one model response, stopping as soon as it holds a tool call.
    async fn stream_response(&self) -> Result<TurnState, AgentError> {
        let pattern = self.config.agent_pattern;
        let request = self.build_request();
        let mut stream = self.llm.stream(&request).await?;

        let mut text = String::new();
        let mut calls = ToolCallAccumulator::default();
        let mut detection = Detection::Absent;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if !chunk.text.is_empty() {
                text.push_str(&chunk.text);
                self.events.emit(AgentEvent::TextDelta {
                    content: chunk.text,
                });
            }
            calls.push(&chunk.tool_calls);

            detection = parser::detect(pattern, &text, &calls);
            if detection.is_complete() {
                break;
            }
        }
        // Whatever the model still has to say after the call is discarded.
        drop(stream);

        if pattern == AgentPattern::FunctionCall && !detection.is_complete() {
            detection = calls.finish();
        }

        match detection.into_request() {
            Some(request) => Ok(self.tool_call(pattern, text, request)),
            None => Ok(TurnState::Finalized {
                answer: text.clone(),
                reason: FinishReason::Answered,
                skip_print: false,
                final_message: Some(Message::ai(text)),
            }),
        }
    }

    /// Pair a detected request with the AI message that carries it.
    fn tool_call(&self, pattern: AgentPattern, text: String, mut request: ToolCallRequest) -> TurnState {
        let id = request
            .id
            .take()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        request.id = Some(id.clone());

        let message = match pattern {
            AgentPattern::React => Message::ai(text),
            AgentPattern::FunctionCall => Message::ai_with_tool_calls(
                text,
                vec![ToolCall {
                    id,
                    name: request.tool.clone(),
                    args: json!({ "arg": request.arg }).to_string(),
                }],
            ),
        };
        TurnState::ToolDispatch { message, request }
    }

    async fn dispatch(
        &mut self,
        message: Message,
        request: ToolCallRequest,
        dispatches: usize,
    ) -> TurnState {
        let id = request.id.clone().unwrap_or_default();
        self.state.tool_history.push(message);
        self.events.emit(AgentEvent::ToolCall {
            id: id.clone(),
            name: request.tool.clone(),
            arg: request.arg.clone(),
            thoughts: request.thoughts.clone(),
        });

        let result = {
            let ctx = ToolContext {
                state: &self.state,
                llm: self.llm.as_ref(),
                prompter: self.prompter.as_ref(),
                events: self.events.as_ref(),
            };
            self.tools.dispatch(&request, &ctx).await
        };

        self.events.emit(AgentEvent::ToolResult {
            id: id.clone(),
            name: request.tool.clone(),
            content: result.content.clone(),
            meta: result.meta,
        });

        let tool_message = match self.config.agent_pattern {
            AgentPattern::React => {
                Message::tool(format!("{}{}", TOOL_RESPONSE_PREFIX, result.content), None)
            }
            AgentPattern::FunctionCall => Message::tool(result.content.clone(), Some(id)),
        };
        self.state.tool_history.push(tool_message);

        if result.meta.stop_execution {
            return TurnState::Finalized {
                answer: result.content,
                reason: FinishReason::Stopped,
                skip_print: result.meta.skip_print,
                final_message: None,
            };
        }

        if dispatches >= self.state.max_iterations {
            tracing::warn!(
                max_iterations = self.state.max_iterations,
                "Iteration limit reached"
            );
            self.events.emit(AgentEvent::Notice {
                content: format!(
                    "Reached the limit of {} tool calls for this task",
                    self.state.max_iterations
                ),
            });
            return TurnState::Finalized {
                answer: result.content,
                reason: FinishReason::IterationLimit,
                skip_print: false,
                final_message: None,
            };
        }

        TurnState::Streaming
    }

    fn build_request(&self) -> ChatRequest {
        let pattern = self.config.agent_pattern;
        let turn = self.state.turn_messages();
        let history = compress_history(&self.state.history, &turn, self.config.llm.context_window);

        let mut messages = self.state.few_shot_examples.clone();
        messages.extend_from_slice(history);
        messages.extend(turn);

        let tools = match pattern {
            AgentPattern::FunctionCall => Some(self.tools.get_tool_schemas()),
            AgentPattern::React => None,
        };

        ChatRequest {
            system: build_system_prompt(
                pattern,
                &self.state.timestamp,
                &self.tools.list_tools(),
                &self.state.language,
            ),
            messages,
            tools,
        }
    }
}
