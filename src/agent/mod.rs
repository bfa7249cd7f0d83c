//! Agent module - the orchestration loop of the shell assistant.
//!
//! The agent follows a "tools in a loop" pattern:
//! 1. Build context from the system prompt, few-shot examples, history and task
//! 2. Stream the model response, watching for a tool call
//! 3. If the model requests a tool, run it and feed the result back
//! 4. Repeat until the model answers, a tool stops the turn, or the cap is hit

mod agent_loop;
mod history;
mod parser;
mod prompt;
mod screen;
mod session;
mod state;

pub use agent_loop::{Agent, AgentError, FinishReason, TurnOutcome};
pub use history::{compress_history, context_budget, count_tokens, DEFAULT_CONTEXT_LEN, TOKEN_OFFSET};
pub use parser::{
    detect, parse_react, Detection, ToolCallAccumulator, ToolCallRequest, MAX_TOOL_CALLS,
};
pub use prompt::{build_system_prompt, run_few_shot_examples};
pub use screen::{
    image_data_url, strip_screen_command, ScreenCapture, SystemScreen, SCREEN_COMMAND,
};
pub use session::{read_task, run_session, LineReader};
pub use state::{AgentState, TOOL_RESPONSE_PREFIX};
