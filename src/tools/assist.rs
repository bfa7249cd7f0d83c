//! Model-backed help offered while the user confirms an action: explaining a
//! command or script, and proposing alternative commands.

use std::sync::LazyLock;

use regex::Regex;

use super::terminal::{copy_to_clipboard, detect_os, detect_shell};
use super::{
    Confirmation, ToolContext, ToolResult, EXPLAINED_SCRIPT_CHOICES, SCRIPT_CHOICES,
};
use crate::events::AgentEvent;
use crate::llm::{collect_text, ChatRequest, Message};

/// `# description` line followed by a one-line fenced command.
static ALTERNATIVE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([^\n]+)\n```[^\n]*\n([^\n]+)\n```").expect("valid alternative regex")
});

/// A command proposed instead of the one the model chose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alternative {
    pub description: String,
    pub command: String,
}

/// Ask the model why `script` solves `task` and show the answer.
pub(crate) async fn explain(
    ctx: &ToolContext<'_>,
    task: &str,
    script_type: &str,
    script: &str,
) -> anyhow::Result<String> {
    let request = ChatRequest {
        system: format!(
            "You are a shell expert. The current date and time is {}.",
            ctx.state.timestamp
        ),
        messages: vec![Message::human(explain_prompt(
            task,
            script_type,
            script,
            &ctx.state.language,
        ))],
        tools: None,
    };
    let explanation = collect_text(ctx.llm, &request, |_| {}).await?;
    ctx.emit(AgentEvent::Explanation {
        content: explanation.clone(),
    });
    Ok(explanation)
}

/// Confirm a generated script, offering one explanation first.
///
/// `None` means the user wants it run; otherwise the returned result ends the
/// tool call.
pub(crate) async fn confirm_script(
    ctx: &ToolContext<'_>,
    task: &str,
    script_type: &str,
    code: &str,
) -> anyhow::Result<Option<ToolResult>> {
    let mut choices = SCRIPT_CHOICES;
    loop {
        match ctx.confirm("Do you want to execute this script?", choices).await {
            Confirmation::Execute => return Ok(None),
            Confirmation::Cancel => {
                return Ok(Some(ToolResult::interrupted("Script interrupted by the user")))
            }
            Confirmation::Copy => {
                return Ok(Some(copy_to_clipboard(code, "Script copied to the clipboard!")))
            }
            // Alternatives are only offered for single commands.
            Confirmation::Explain | Confirmation::Alternatives => {
                explain(ctx, task, script_type, code).await?;
                choices = EXPLAINED_SCRIPT_CHOICES;
            }
        }
    }
}

/// Ask the model for commands that do the same job as `command`.
pub(crate) async fn alternative_commands(
    ctx: &ToolContext<'_>,
    command: &str,
) -> anyhow::Result<Vec<Alternative>> {
    ctx.emit(AgentEvent::Notice {
        content: "⏱️ Finding alternative solutions...".to_string(),
    });

    let shell = detect_shell();
    let mut messages = vec![
        Message::human(alternatives_prompt("ls", "")),
        Message::ai(alternatives_example(&shell)),
    ];
    messages.extend(ctx.state.flattened_transcript());
    messages.push(Message::human(alternatives_prompt(
        command,
        &language_clause(&ctx.state.language),
    )));

    let request = ChatRequest {
        system: format!(
            "You are a helpful shell assistant. The current date and time is {}.\nYou are running on {} using {} as shell",
            ctx.state.timestamp,
            detect_os(),
            shell
        ),
        messages,
        tools: None,
    };
    let response = collect_text(ctx.llm, &request, |_| {}).await?;
    Ok(parse_alternatives(&response))
}

/// Let the user pick between `command` and the model's alternatives.
/// `None` when the user cancels.
pub(crate) async fn select_alternative(
    ctx: &ToolContext<'_>,
    command: &str,
) -> anyhow::Result<Option<String>> {
    let alternatives = alternative_commands(ctx, command).await?;

    let mut options = vec![
        "Cancel".to_string(),
        format!("{}  # Original command", command),
    ];
    options.extend(
        alternatives
            .iter()
            .map(|a| format!("{}  # {}", a.command, a.description)),
    );

    let picked = ctx
        .prompter
        .select("Pick the command to execute", &options)
        .await;
    Ok(match picked {
        None | Some(0) => None,
        Some(1) => Some(command.to_string()),
        Some(i) => alternatives.get(i - 2).map(|a| a.command.clone()),
    })
}

pub(crate) fn parse_alternatives(text: &str) -> Vec<Alternative> {
    ALTERNATIVE_BLOCK
        .captures_iter(text)
        .map(|caps| Alternative {
            description: caps[1].trim_start_matches('#').trim().to_string(),
            command: caps[2].trim().to_string(),
        })
        .collect()
}

fn language_clause(language: &str) -> String {
    if language.trim().is_empty() {
        String::new()
    } else {
        format!(" in {} language", language.trim())
    }
}

fn explain_prompt(task: &str, script_type: &str, script: &str, language: &str) -> String {
    format!(
        r#"The given task was {task}.
Explain this {script_type} and why it should solve the task{lang}.
Be concise and please limit your explanation to the provided {script_type} and avoid suggesting alternative solutions or directly referencing the given task.

```
{script}
```"#,
        task = task,
        script_type = script_type,
        lang = language_clause(language),
        script = script
    )
}

fn alternatives_prompt(command: &str, lang: &str) -> String {
    format!(
        r#"Find some alternative commands or variation of the original that can be used to accomplish the same task as the given command.

Generate only one line of code for each alternative command.
Do not suggest alternatives that are not compatible with the current shell or operating system.
Sort the commands by relevance and usefulness, the most relevant and useful commands should be at the top.
Output each command in a separate block of code respecting the following format:

# Max 1 line description of the command before each command block{lang}
```
command
```

Given command:
```
{command}
```"#,
        lang = lang,
        command = command
    )
}

fn alternatives_example(shell: &str) -> &'static str {
    match shell {
        "powershell" => {
            r#"# List all files in the current directory including hidden files
```
Get-ChildItem -Force
```

# Find all files in the current directory and its subdirectories
```
Get-ChildItem -Recurse
```

# List all file names in the current directory and its subdirectories, including hidden files
```
Get-ChildItem -Recurse -Force -Name
```

# List all directories in the current directory
```
Get-ChildItem -Directory
```"#
        }
        "cmd" => {
            r#"# List all files in the current directory in long format including hidden files
```
dir /A /B
```

# Find all files in the current directory and its subdirectories
```
dir /S
```

# Find all files in the current directory and its subdirectories using tree
```
tree /F
```

# Find all files in the current directory and its subdirectories in plain ASCII
```
tree /F /A
```"#
        }
        _ => {
            r#"# List all files in the current directory in long format
```
ls -l
```

# List all files in the current directory in long format including hidden files
```
ls -la
```

# Find all files in the current directory and its subdirectories including hidden files
```
find . -type f
```

# Find all files in the current directory and print the full path
```
find . -type f -print
```"#
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentState;
    use crate::events::EventSink;
    use crate::tools::testing::{CannedLlm, ScriptedPrompter};
    use tokio::sync::mpsc;

    #[test]
    fn parses_every_example_block() {
        let parsed = parse_alternatives(alternatives_example("bash"));
        assert_eq!(parsed.len(), 4);
        assert_eq!(
            parsed[1],
            Alternative {
                description: "List all files in the current directory in long format including hidden files"
                    .to_string(),
                command: "ls -la".to_string(),
            }
        );
        assert_eq!(parse_alternatives(alternatives_example("cmd")).len(), 4);
        assert_eq!(parse_alternatives(alternatives_example("powershell")).len(), 4);
    }

    #[test]
    fn multi_line_blocks_are_skipped() {
        let text = "# two lines\n```\necho a\necho b\n```\n\n# one line\n```sh\necho c\n```";
        let parsed = parse_alternatives(text);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].command, "echo c");
    }

    #[test]
    fn prompts_carry_the_language_only_when_set() {
        assert!(explain_prompt("t", "shell command", "ls", "")
            .contains("should solve the task.\n"));
        assert!(explain_prompt("t", "shell command", "ls", "Italian")
            .contains("should solve the task in Italian language."));
        assert!(alternatives_prompt("ls", "").contains("Given command:\n```\nls\n```"));
    }

    #[tokio::test]
    async fn explanation_is_shown_and_asks_only_the_task_and_script() {
        let mut state = AgentState::new(4, true, String::new());
        state.begin_turn("free some disk space");
        let llm = CannedLlm::new(&["It removes the cache."]);
        let prompter = ScriptedPrompter::new([]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = ToolContext {
            state: &state,
            llm: &llm,
            prompter: &prompter,
            events: &tx as &dyn EventSink,
        };

        let text = explain(&ctx, "free some disk space", "shell command", "rm -rf ~/.cache")
            .await
            .unwrap();
        assert_eq!(text, "It removes the cache.");
        assert_eq!(
            rx.try_recv().unwrap(),
            AgentEvent::Explanation {
                content: "It removes the cache.".to_string()
            }
        );

        let requests = llm.requests.lock().unwrap();
        assert!(requests[0].system.starts_with("You are a shell expert."));
        assert_eq!(requests[0].messages.len(), 1);
        let asked = requests[0].messages[0].text();
        assert!(asked.starts_with("The given task was free some disk space."));
        assert!(asked.contains("```\nrm -rf ~/.cache\n```"));
    }

    #[tokio::test]
    async fn picking_an_alternative_returns_its_command() {
        let mut state = AgentState::new(4, true, String::new());
        state.begin_turn("list files");
        let llm = CannedLlm::new(&["# Long listing\n```\nls -l\n```\n\n# Everything\n```\nls -la\n```"]);
        let prompter = ScriptedPrompter::new([]).with_selections([Some(3)]);
        let ctx = ToolContext {
            state: &state,
            llm: &llm,
            prompter: &prompter,
            events: &crate::events::NullSink,
        };

        let picked = select_alternative(&ctx, "ls").await.unwrap();
        assert_eq!(picked.as_deref(), Some("ls -la"));

        let offered = prompter.offered.lock().unwrap();
        assert_eq!(
            offered[0],
            vec![
                "Cancel".to_string(),
                "ls  # Original command".to_string(),
                "ls -l  # Long listing".to_string(),
                "ls -la  # Everything".to_string(),
            ]
        );

        let requests = llm.requests.lock().unwrap();
        let messages = &requests[0].messages;
        // Few-shot pair, the running task, then the question.
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2].text(), "list files");
        assert!(messages[3].text().ends_with("Given command:\n```\nls\n```"));
    }

    #[tokio::test]
    async fn cancelled_selection_returns_none() {
        let state = AgentState::new(4, true, String::new());
        let llm = CannedLlm::new(&["# Long listing\n```\nls -l\n```"]);
        let prompter = ScriptedPrompter::new([]).with_selections([Some(0)]);
        let ctx = ToolContext {
            state: &state,
            llm: &llm,
            prompter: &prompter,
            events: &crate::events::NullSink,
        };
        assert_eq!(select_alternative(&ctx, "ls").await.unwrap(), None);
    }
}
