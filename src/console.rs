//! Terminal front end: renders agent events and reads user input.

use std::io::{self, BufRead, Write};

use async_trait::async_trait;

use crate::agent::LineReader;
use crate::events::{AgentEvent, EventSink};
use crate::tools::{Confirmation, Prompter};

/// Prints agent events to the terminal.
pub struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn emit(&self, event: AgentEvent) {
        let failed = matches!(event, AgentEvent::TurnFailed { .. } | AgentEvent::ToolError { .. });
        if let Some(line) = render(&event) {
            if failed {
                eprintln!("{}", line);
            } else {
                println!("{}", line);
            }
        }
    }
}

/// Text shown for `event`, if any. Streamed deltas are not shown: in react
/// mode they contain the raw tool-call JSON.
pub fn render(event: &AgentEvent) -> Option<String> {
    match event {
        AgentEvent::TextDelta { .. } => None,
        AgentEvent::ToolCall { name, arg, .. } => Some(match name.as_str() {
            "shell" => format!("🛠️  {}", arg),
            "shell_expert" => "💻 Generating shell script...".to_string(),
            "python_expert" => "🐍 Generating python script...".to_string(),
            "shell_history" => "📜 Let me check...".to_string(),
            other => format!("🔧 {}: {}", other, arg),
        }),
        AgentEvent::Script { language, code } => Some(format!("```{}\n{}\n```", language, code)),
        AgentEvent::Explanation { content } => Some(format!("🤖: {}\n", content.trim_end())),
        AgentEvent::ToolResult { name, content, meta, .. } => {
            if name == "shell" && !meta.stop_execution && !content.is_empty() {
                Some(content.trim_end().to_string())
            } else {
                None
            }
        }
        AgentEvent::ToolError { name, message } => {
            Some(format!("🚨 Tool error ({}): {}", name, message))
        }
        AgentEvent::Notice { content } => Some(content.clone()),
        AgentEvent::Answer {
            content,
            skip_print,
        } => (!skip_print).then(|| format!("\n🤖: {}\n", content)),
        AgentEvent::TurnFailed { message } => Some(format!("🚨 {}", message)),
    }
}

/// Asks confirmations on the terminal.
pub struct TerminalPrompter;

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn confirm(&self, question: &str, choices: &[Confirmation]) -> Confirmation {
        let prompt = format!("❓ {} [{}]: ", question, choice_keys(choices));
        loop {
            let Some(answer) = read_stdin_line(prompt.clone()).await else {
                return Confirmation::Cancel;
            };
            match Confirmation::parse(&answer).filter(|c| choices.contains(c)) {
                Some(confirmation) => return confirmation,
                None => println!("Please answer {}", choice_help(choices)),
            }
        }
    }

    async fn select(&self, question: &str, options: &[String]) -> Option<usize> {
        println!("❓ {}", question);
        for (i, option) in options.iter().enumerate() {
            println!("  {}) {}", i, option);
        }
        loop {
            let answer = read_stdin_line("► ".to_string()).await?;
            match answer.trim().parse::<usize>() {
                Ok(i) if i < options.len() => return Some(i),
                _ => println!(
                    "Please pick a number between 0 and {}",
                    options.len().saturating_sub(1)
                ),
            }
        }
    }
}

/// `Y/n/c/e/a`: the first choice is the default and shown upper case.
fn choice_keys(choices: &[Confirmation]) -> String {
    choices
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if i == 0 {
                c.key().to_uppercase()
            } else {
                c.key().to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn choice_help(choices: &[Confirmation]) -> String {
    choices
        .iter()
        .map(|c| format!("{} ({})", c.key(), c.label()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Reads tasks from standard input.
pub struct StdinReader;

#[async_trait]
impl LineReader for StdinReader {
    async fn read_line(&mut self, prompt: &str) -> Option<String> {
        read_stdin_line(prompt.to_string()).await
    }
}

/// Print `prompt` and read one line on a blocking thread. `None` on EOF or
/// read failure.
async fn read_stdin_line(prompt: String) -> Option<String> {
    let read = tokio::task::spawn_blocking(move || -> io::Result<Option<String>> {
        let mut stdout = io::stdout();
        write!(stdout, "{}", prompt)?;
        stdout.flush()?;

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    })
    .await;

    match read {
        Ok(Ok(line)) => line,
        Ok(Err(e)) => {
            tracing::warn!("Failed to read from stdin: {}", e);
            None
        }
        Err(e) => {
            tracing::warn!("Stdin reader task failed: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ToolMeta, COMMAND_CHOICES, EXPLAINED_SCRIPT_CHOICES};

    #[test]
    fn banners_per_tool() {
        let call = |name: &str| AgentEvent::ToolCall {
            id: "1".to_string(),
            name: name.to_string(),
            arg: "ls".to_string(),
            thoughts: None,
        };
        assert_eq!(render(&call("shell")).as_deref(), Some("🛠️  ls"));
        assert_eq!(
            render(&call("shell_history")).as_deref(),
            Some("📜 Let me check...")
        );
    }

    #[test]
    fn skipped_answers_are_not_printed() {
        let answer = |skip_print| AgentEvent::Answer {
            content: "Command interrupted by the user".to_string(),
            skip_print,
        };
        assert_eq!(render(&answer(true)), None);
        assert!(render(&answer(false)).unwrap().contains("🤖: Command interrupted"));
    }

    #[test]
    fn prompt_lists_only_offered_choices() {
        assert_eq!(choice_keys(COMMAND_CHOICES), "Y/n/c/e/a");
        assert_eq!(choice_keys(EXPLAINED_SCRIPT_CHOICES), "Y/n/c");
        assert_eq!(
            choice_help(EXPLAINED_SCRIPT_CHOICES),
            "y (yes), n (no), c (copy)"
        );
    }

    #[test]
    fn explanations_are_shown_as_the_assistant() {
        let event = AgentEvent::Explanation {
            content: "It lists files.\n".to_string(),
        };
        assert_eq!(render(&event).as_deref(), Some("🤖: It lists files.\n"));
    }

    #[test]
    fn only_shell_output_is_echoed() {
        let result = |name: &str| AgentEvent::ToolResult {
            id: "1".to_string(),
            name: name.to_string(),
            content: "out\n".to_string(),
            meta: ToolMeta::default(),
        };
        assert_eq!(render(&result("shell")).as_deref(), Some("out"));
        assert_eq!(render(&result("shell_history")), None);
    }
}
