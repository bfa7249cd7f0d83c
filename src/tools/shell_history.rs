//! Read-only access to the user's recent shell commands.

use std::path::PathBuf;

use async_trait::async_trait;

use super::terminal::detect_shell;
use super::{Tool, ToolContext, ToolResult};

const HISTORY_LEN: usize = 20;
const PREFIX: &str = "These are the last commands executed by the user:\n";

/// Last commands from the user's shell history file.
pub struct ShellHistory;

#[async_trait]
impl Tool for ShellHistory {
    fn name(&self) -> &str {
        "shell_history"
    }

    fn description(&self) -> &str {
        "to get the history of the last commands executed by the user in the shell, useful to understand what the user is doing or to repeat something already done, the arg is ignored"
    }

    async fn execute(&self, _arg: &str, _ctx: &ToolContext<'_>) -> anyhow::Result<ToolResult> {
        let Some(path) = history_file() else {
            return Ok(ToolResult::new("No shell history available"));
        };
        tracing::debug!("Reading shell history from {}", path.display());

        let raw = tokio::fs::read(&path).await?;
        let text = String::from_utf8_lossy(&raw);
        let commands = last_commands(&text, HISTORY_LEN);
        if commands.is_empty() {
            return Ok(ToolResult::new("No shell history available"));
        }
        Ok(ToolResult::new(format!("{}{}", PREFIX, commands.join("\n"))))
    }
}

/// `$HISTFILE`, else the default history file of the detected shell.
fn history_file() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os("HISTFILE").map(PathBuf::from) {
        if path.is_file() {
            return Some(path);
        }
    }

    let home = dirs::home_dir()?;
    let preferred = match detect_shell().as_str() {
        "zsh" => home.join(".zsh_history"),
        "fish" => dirs::data_local_dir()
            .unwrap_or_else(|| home.join(".local/share"))
            .join("fish/fish_history"),
        _ => home.join(".bash_history"),
    };

    [
        preferred,
        home.join(".zsh_history"),
        home.join(".bash_history"),
    ]
    .into_iter()
    .find(|p| p.is_file())
}

/// Last `n` commands of a bash, zsh (extended) or fish history file.
fn last_commands(text: &str, n: usize) -> Vec<String> {
    let commands: Vec<String> = text
        .lines()
        .filter_map(parse_line)
        .filter(|c| !c.is_empty())
        .collect();
    let skip = commands.len().saturating_sub(n);
    commands.into_iter().skip(skip).collect()
}

fn parse_line(line: &str) -> Option<String> {
    // fish: "- cmd: git status" followed by "  when: ..." lines
    if let Some(cmd) = line.strip_prefix("- cmd: ") {
        return Some(cmd.trim().to_string());
    }
    if line.starts_with("  ") && line.trim_start().starts_with("when:") {
        return None;
    }
    // zsh extended: ": 1700000000:0;git status"
    if let Some(rest) = line.strip_prefix(": ") {
        if let Some((_, cmd)) = rest.split_once(';') {
            return Some(cmd.trim().to_string());
        }
    }
    // bash with HISTTIMEFORMAT: "#1700000000"
    if line.starts_with('#') && line[1..].chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_zsh_extended_history() {
        let text = ": 1700000000:0;ls -la\n: 1700000001:0;git status\n";
        assert_eq!(last_commands(text, 20), vec!["ls -la", "git status"]);
    }

    #[test]
    fn parses_fish_history() {
        let text = "- cmd: cargo fmt\n  when: 1700000000\n- cmd: echo hi\n  when: 1700000001\n";
        assert_eq!(last_commands(text, 20), vec!["cargo fmt", "echo hi"]);
    }

    #[test]
    fn keeps_only_the_last_commands() {
        let text: String = (0..30).map(|i| format!("cmd{}\n#1700000000\n", i)).collect();
        let commands = last_commands(&text, 20);
        assert_eq!(commands.len(), 20);
        assert_eq!(commands.first().map(String::as_str), Some("cmd10"));
        assert_eq!(commands.last().map(String::as_str), Some("cmd29"));
    }
}
