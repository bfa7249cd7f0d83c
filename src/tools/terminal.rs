//! Terminal/shell command execution tool.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::assist::{explain, select_alternative};
use super::{
    truncate_middle, Confirmation, Tool, ToolContext, ToolResult, COMMAND_CHOICES,
    EXPLAINED_COMMAND_CHOICES,
};
use crate::events::AgentEvent;

const MAX_OUTPUT_CHARS: usize = 20000;
const KEPT_OUTPUT_CHARS: usize = 9000;
const COMMAND_INTERRUPTED: &str = "Command interrupted by the user";

/// Run a shell command.
pub struct Shell;

#[async_trait]
impl Tool for Shell {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "to execute a shell command in the terminal, useful for every task that requires to interact with the current system or local files, do not pass multiple lines commands, avoid to install new packages if not explicitly requested"
    }

    async fn execute(&self, arg: &str, ctx: &ToolContext<'_>) -> anyhow::Result<ToolResult> {
        let mut command = arg.to_string();
        let mut preface = String::new();
        let mut choices = COMMAND_CHOICES;
        loop {
            match ctx.confirm("Do you want to execute this command?", choices).await {
                Confirmation::Execute => break,
                Confirmation::Cancel => return Ok(ToolResult::interrupted(COMMAND_INTERRUPTED)),
                Confirmation::Copy => {
                    return Ok(copy_to_clipboard(&command, "Command copied to the clipboard!"))
                }
                Confirmation::Explain => {
                    let task = ctx.state.current_task().unwrap_or_default();
                    explain(ctx, &task, "shell command", &command).await?;
                    choices = EXPLAINED_COMMAND_CHOICES;
                }
                Confirmation::Alternatives => {
                    let Some(picked) = select_alternative(ctx, &command).await? else {
                        return Ok(ToolResult::interrupted(COMMAND_INTERRUPTED));
                    };
                    preface = format!(
                        "The user decided to execute this alternative command `{}`\n\n",
                        picked
                    );
                    command = picked;
                    break;
                }
            }
        }

        let output = format!("{}{}", preface, run_shell(&command).await?);
        if output.chars().count() > MAX_OUTPUT_CHARS {
            ctx.emit(AgentEvent::Notice {
                content: "Output too long! It will be truncated".to_string(),
            });
        }
        Ok(ToolResult::new(truncate_middle(
            output,
            MAX_OUTPUT_CHARS,
            KEPT_OUTPUT_CHARS,
        )))
    }
}

/// Run `command` with the platform shell and return stdout, or stderr when
/// stdout is empty. Runs to completion.
pub async fn run_shell(command: &str) -> anyhow::Result<String> {
    tracing::info!("Executing command: {}", command);

    let (shell, shell_arg) = if cfg!(target_os = "windows") {
        ("cmd", "/C")
    } else {
        ("sh", "-c")
    };

    let mut cmd = Command::new(shell);
    cmd.arg(shell_arg).arg(command);
    collect_output(cmd).await
}

/// Run `program` with `args` and return its output like [`run_shell`].
pub(crate) async fn run_program(program: &str, args: &[&Path]) -> anyhow::Result<String> {
    tracing::info!("Executing {} {:?}", program, args);
    let mut cmd = Command::new(program);
    cmd.args(args);
    collect_output(cmd).await
}

async fn collect_output(mut cmd: Command) -> anyhow::Result<String> {
    let output = cmd
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to execute command: {}", e))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.is_empty() {
        return Ok(stdout.into_owned());
    }
    Ok(String::from_utf8_lossy(&output.stderr).into_owned())
}

/// Name of the user's shell: `powershell`, `cmd`, or the executable name
/// from `$SHELL` (e.g. `zsh`).
pub fn detect_shell() -> String {
    let shell = std::env::var("SHELL")
        .or_else(|_| std::env::var("COMSPEC"))
        .unwrap_or_default()
        .to_lowercase();

    if shell.contains("powershell") {
        return "powershell".to_string();
    }
    if shell.contains("cmd") {
        return "cmd".to_string();
    }
    Path::new(&shell)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "sh".to_string())
}

/// Operating system name as shown to the model.
pub fn detect_os() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "Darwin",
        "windows" => "Windows",
        other => other,
    }
}

/// Put `text` on the clipboard and end the turn with `done`.
pub(crate) fn copy_to_clipboard(text: &str, done: &str) -> ToolResult {
    let copied = arboard::Clipboard::new().and_then(|mut clipboard| clipboard.set_text(text));
    match copied {
        Ok(()) => ToolResult::stop(done),
        Err(e) => {
            tracing::warn!("Clipboard unavailable: {}", e);
            ToolResult::stop(format!("Could not copy to the clipboard: {}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentState;
    use crate::events::NullSink;
    use crate::tools::testing::{CannedLlm, ScriptedPrompter};

    #[cfg(unix)]
    #[tokio::test]
    async fn falls_back_to_stderr_when_stdout_is_empty() {
        assert_eq!(run_shell("echo out").await.unwrap(), "out\n");
        assert_eq!(run_shell("echo err 1>&2").await.unwrap(), "err\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn declined_command_never_runs() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let command = format!("touch {}", marker.display());

        let state = AgentState::new(4, true, String::new());
        let llm = CannedLlm::new(&[]);
        let prompter = ScriptedPrompter::new([Confirmation::Cancel]);
        let ctx = ToolContext {
            state: &state,
            llm: &llm,
            prompter: &prompter,
            events: &NullSink,
        };

        let result = Shell.execute(&command, &ctx).await.unwrap();
        assert_eq!(result, ToolResult::interrupted("Command interrupted by the user"));
        assert!(!marker.exists());
        assert_eq!(prompter.asked.lock().unwrap().len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn explanation_then_run_without_explain_choice() {
        let mut state = AgentState::new(4, true, String::new());
        state.begin_turn("greet me");
        let llm = CannedLlm::new(&["It prints a greeting."]);
        let prompter = ScriptedPrompter::new([Confirmation::Explain, Confirmation::Execute]);
        let ctx = ToolContext {
            state: &state,
            llm: &llm,
            prompter: &prompter,
            events: &NullSink,
        };

        let result = Shell.execute("echo hello", &ctx).await.unwrap();
        assert_eq!(result, ToolResult::new("hello\n"));
        let choices = prompter.choices.lock().unwrap();
        assert_eq!(choices[0], COMMAND_CHOICES);
        assert_eq!(choices[1], EXPLAINED_COMMAND_CHOICES);
        let requests = llm.requests.lock().unwrap();
        assert!(requests[0].messages[0]
            .text()
            .starts_with("The given task was greet me."));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn picked_alternative_runs_instead_and_is_announced() {
        let state = AgentState::new(4, true, String::new());
        let llm = CannedLlm::new(&["# Print with printf\n```\nprintf 'alt\\n'\n```"]);
        let prompter =
            ScriptedPrompter::new([Confirmation::Alternatives]).with_selections([Some(2)]);
        let ctx = ToolContext {
            state: &state,
            llm: &llm,
            prompter: &prompter,
            events: &NullSink,
        };

        let result = Shell.execute("echo original", &ctx).await.unwrap();
        assert_eq!(
            result.content,
            "The user decided to execute this alternative command `printf 'alt\\n'`\n\nalt\n"
        );
        assert!(!result.meta.stop_execution);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancelled_alternatives_interrupt_the_command() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let command = format!("touch {}", marker.display());

        let state = AgentState::new(4, true, String::new());
        let llm = CannedLlm::new(&["# Same\n```\ntrue\n```"]);
        let prompter = ScriptedPrompter::new([Confirmation::Alternatives]).with_selections([None]);
        let ctx = ToolContext {
            state: &state,
            llm: &llm,
            prompter: &prompter,
            events: &NullSink,
        };

        let result = Shell.execute(&command, &ctx).await.unwrap();
        assert_eq!(result, ToolResult::interrupted("Command interrupted by the user"));
        assert!(!marker.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn confirmation_is_skipped_when_disabled() {
        let state = AgentState::new(4, false, String::new());
        let llm = CannedLlm::new(&[]);
        let prompter = ScriptedPrompter::new([]);
        let ctx = ToolContext {
            state: &state,
            llm: &llm,
            prompter: &prompter,
            events: &NullSink,
        };

        let result = Shell.execute("echo hi", &ctx).await.unwrap();
        assert_eq!(result.content, "hi\n");
        assert!(prompter.asked.lock().unwrap().is_empty());
    }
}
