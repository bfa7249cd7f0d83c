//! System prompt templates and few-shot priming.

use serde_json::json;
use uuid::Uuid;

use super::state::TOOL_RESPONSE_PREFIX;
use crate::config::AgentPattern;
use crate::llm::{Message, ToolCall};
use crate::tools::{detect_os, detect_shell, run_shell, ToolInfo};

/// Build the system prompt for `pattern`.
///
/// The tool list is only spelled out in react mode; in function-call mode the
/// provider receives the tool schemas instead.
pub fn build_system_prompt(
    pattern: AgentPattern,
    timestamp: &str,
    tools: &[ToolInfo],
    language: &str,
) -> String {
    let mut prompt = format!(
        "You are a helpful shell assistant. The current date and time is {}.\n\
         Solve the tasks that I request you to do.\n",
        timestamp
    );

    match pattern {
        AgentPattern::FunctionCall => {
            prompt.push_str("\nAnswer truthfully with the information you have.");
            if !language.is_empty() {
                prompt.push_str(&format!(" Output your answer in {} language.", language));
            }
            prompt.push('\n');
        }
        AgentPattern::React => {
            prompt.push_str("\nYou can use the following tools to accomplish the tasks:\n");
            for tool in tools {
                prompt.push_str(&format!("- \"{}\": {}\n", tool.name, tool.description));
            }
            prompt.push_str(
                "\nRules:\n\
                 You can use only the tools provided in this prompt to accomplish the tasks\n\
                 If you need to use tools your response must be in JSON format with this structure: { \"tool\": \"...\", \"arg\": \"...\", \"thoughts\": \"...\" }\n\
                 Use the shell and your other tools to gather all the information that you need before starting the actual task and also to double check the results if needed before giving the final answer\n",
            );
            if language.is_empty() {
                prompt.push_str(
                    "After you completed the task output your final answer to the task without including any json\n",
                );
            } else {
                prompt.push_str(&format!(
                    "After you completed the task output your final answer to the task in {} language without including any json\n",
                    language
                ));
            }
            prompt.push_str(
                "Answer truthfully with the information you have\n\
                 You cannot use tools and complete the task with your final answer in the same message so remember to use the tools that you need first\n",
            );
        }
    }

    prompt
}

/// Prime the model with two real shell exchanges: the working directory and
/// the current git branch.
pub async fn run_few_shot_examples(pattern: AgentPattern) -> Vec<Message> {
    let shell = detect_shell();
    let pwd = if shell == "powershell" || shell == "cmd" {
        "echo %cd%"
    } else {
        "pwd"
    };
    let actions = [
        (pwd, "I'm checking the current working directory"),
        (
            "git rev-parse --abbrev-ref HEAD",
            "I'm checking if it's a git repository",
        ),
    ];

    let mut examples = vec![Message::human(format!(
        "You are on {} system using {} as shell. Check your tools",
        detect_os(),
        shell
    ))];

    for (command, thoughts) in actions {
        let output = match run_shell(command).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("Few-shot command {} failed: {}", command, e);
                format!("{}", e)
            }
        };
        examples.extend(example_exchange(pattern, command, thoughts, output));
    }

    examples.push(Message::ai("All set! 👍"));
    examples
}

fn example_exchange(
    pattern: AgentPattern,
    command: &str,
    thoughts: &str,
    output: String,
) -> [Message; 2] {
    match pattern {
        AgentPattern::React => {
            let call = json!({ "tool": "shell", "arg": command, "thoughts": thoughts });
            [
                Message::ai(call.to_string()),
                Message::tool(format!("{}{}", TOOL_RESPONSE_PREFIX, output), None),
            ]
        }
        AgentPattern::FunctionCall => {
            let id = Uuid::new_v4().simple().to_string();
            let call = ToolCall {
                id: id.clone(),
                name: "shell".to_string(),
                args: json!({ "arg": command }).to_string(),
            };
            [
                Message::ai_with_tool_calls("", vec![call]),
                Message::tool(output, Some(id)),
            ]
        }
    }
}
