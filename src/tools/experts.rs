//! Expert tools: the model writes a whole script, the user confirms, we run it.

use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use super::assist::confirm_script;
use super::terminal::{detect_os, detect_shell, run_program, run_shell};
use super::{truncate_middle, Tool, ToolContext, ToolResult};
use crate::events::AgentEvent;
use crate::llm::{collect_text, ChatRequest, Message};

const SHELL_MAX_OUTPUT: usize = 20000;
const SHELL_KEPT_OUTPUT: usize = 9000;
const PYTHON_MAX_OUTPUT: usize = 12000;
const PYTHON_KEPT_OUTPUT: usize = 10000;

/// Writes and runs a shell script for the task in its argument.
pub struct ShellExpert;

#[async_trait]
impl Tool for ShellExpert {
    fn name(&self) -> &str {
        "shell_expert"
    }

    fn description(&self) -> &str {
        "to delegate the task to a shell expert that can write and execute long and complex shell scripts, use only if you cant resolve the task with a simple shell command, just explain what do you want to achieve in a short sentence in the arg without including any shell code"
    }

    async fn execute(&self, arg: &str, ctx: &ToolContext<'_>) -> anyhow::Result<ToolResult> {
        let shell = detect_shell();
        let system = shell_expert_prompt(&shell, detect_os(), &ctx.state.timestamp);
        let raw = generate(ctx, system, arg).await?;
        let code = strip_fences(&raw);
        ctx.emit(AgentEvent::Script {
            language: shell.clone(),
            code: code.clone(),
        });

        if let Some(stopped) = confirm_script(ctx, arg, "shell script", &code).await? {
            return Ok(stopped);
        }

        let script = write_script(&code, script_extension(&shell))?;
        let path: &Path = &script;
        let output = if shell == "powershell" {
            run_program("powershell", &[Path::new("-File"), path]).await?
        } else {
            run_shell(&path.to_string_lossy()).await?
        };
        let output = truncate_middle(output, SHELL_MAX_OUTPUT, SHELL_KEPT_OUTPUT);

        let content = format!("Script executed:\n{}\n\nOutput:\n{}", code, output);
        if content.chars().count() > SHELL_MAX_OUTPUT {
            return Ok(ToolResult::new(format!("Output:\n{}", output)));
        }
        Ok(ToolResult::new(content))
    }
}

/// Writes and runs a python script for the task in its argument.
pub struct PythonExpert;

#[async_trait]
impl Tool for PythonExpert {
    fn name(&self) -> &str {
        "python_expert"
    }

    fn description(&self) -> &str {
        "to delegate the task to a python expert that can write and execute python code, use only if you cant resolve the task with shell, just explain what do you want to achieve in a short sentence in the arg without including any python code"
    }

    async fn execute(&self, arg: &str, ctx: &ToolContext<'_>) -> anyhow::Result<ToolResult> {
        let system = python_expert_prompt(&ctx.state.timestamp);
        let raw = generate(ctx, system, arg).await?;
        let code = strip_fences(&raw);
        ctx.emit(AgentEvent::Script {
            language: "python".to_string(),
            code: code.clone(),
        });

        if let Some(stopped) = confirm_script(ctx, arg, "python script", &code).await? {
            return Ok(stopped);
        }

        let script = write_script(&code, ".py")?;
        let interpreter = if cfg!(target_os = "windows") {
            "python"
        } else {
            "python3"
        };
        let path: &Path = &script;
        let mut output = run_program(interpreter, &[path]).await?;
        let total = output.chars().count();
        if total > PYTHON_MAX_OUTPUT {
            ctx.emit(AgentEvent::Notice {
                content: "Output too long! It will be truncated".to_string(),
            });
            let tail: String = output.chars().skip(total - PYTHON_KEPT_OUTPUT).collect();
            output = format!("...(Truncated)\n{}", tail);
        }

        let content = format!(
            "\nScript executed:\n```python\n{}\n```\n\nOutput:\n{}",
            code, output
        );
        if content.chars().count() > PYTHON_MAX_OUTPUT {
            return Ok(ToolResult::new(format!("Output:\n{}", output)));
        }
        Ok(ToolResult::new(content))
    }
}

/// Stream a script from the model, with the conversation so far as context.
async fn generate(ctx: &ToolContext<'_>, system: String, task: &str) -> anyhow::Result<String> {
    let mut messages = ctx.state.flattened_transcript();
    messages.push(Message::human(task));
    let request = ChatRequest {
        system,
        messages,
        tools: None,
    };
    Ok(collect_text(ctx.llm, &request, |_| {}).await?)
}

static OPENING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```\S*\n").expect("valid fence regex"));

/// Remove markdown code fences around a generated script.
fn strip_fences(raw: &str) -> String {
    let code = OPENING_FENCE.replace_all(raw, "");
    let code = match code.rfind("```") {
        Some(end) => &code[..end],
        None => &code[..],
    };
    code.trim().to_string()
}

fn script_extension(shell: &str) -> &'static str {
    match shell {
        "cmd" => ".bat",
        "powershell" => ".ps1",
        _ => ".sh",
    }
}

/// Write `code` to an executable temporary file, removed when the returned
/// path is dropped.
fn write_script(code: &str, extension: &str) -> anyhow::Result<tempfile::TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix("shy-")
        .suffix(extension)
        .tempfile()?;
    file.write_all(code.as_bytes())?;
    file.flush()?;
    // Close the handle before executing to avoid ETXTBSY.
    let path = file.into_temp_path();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    }

    Ok(path)
}

fn shell_expert_prompt(shell: &str, os: &str, timestamp: &str) -> String {
    format!(
        r#"You are a shell expert. The current date and time is {timestamp}.
You are on {os} using {shell} as shell.
Write a single {shell} script that accomplishes the task the user describes.

Rules:
- Output only the script inside one markdown code block, without explanations
- The script must run without user interaction
- Do not install new packages unless explicitly requested
- Print the information the user needs to see to standard output"#,
        timestamp = timestamp,
        os = os,
        shell = shell
    )
}

fn python_expert_prompt(timestamp: &str) -> String {
    format!(
        r#"You are a python expert. The current date and time is {timestamp}.
Write a single python 3 script that accomplishes the task the user describes.

Rules:
- Output only the script inside one ```python markdown code block, without explanations
- Use only the standard library unless explicitly requested otherwise
- The script must run without user interaction
- Print the information the user needs to see to standard output"#,
        timestamp = timestamp
    )
}
