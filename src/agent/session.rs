//! Interactive session loop around [`Agent::run_turn`].

use async_trait::async_trait;

use super::screen::strip_screen_command;
use super::Agent;
use crate::events::AgentEvent;

/// Source of user input lines.
#[async_trait]
pub trait LineReader: Send {
    /// Show `prompt` and read one line without its newline. `None` on EOF.
    async fn read_line(&mut self, prompt: &str) -> Option<String>;
}

/// Read one task. A line ending with `\` continues on the next one.
pub async fn read_task(reader: &mut dyn LineReader) -> Option<String> {
    let mut task = String::new();
    let mut prompt = "✨: ";
    loop {
        let line = reader.read_line(prompt).await?;
        match line.strip_suffix('\\') {
            Some(partial) => {
                task.push_str(partial);
                task.push('\n');
                prompt = "  ";
            }
            None => {
                task.push_str(&line);
                return Some(task);
            }
        }
    }
}

/// Run `task` if given, then keep reading tasks while `interactive`.
///
/// Turn failures are reported and the session goes on. `exit` or EOF ends it.
pub async fn run_session(
    agent: &mut Agent,
    task: Option<String>,
    interactive: bool,
    reader: &mut dyn LineReader,
) {
    if let Some(task) = task.filter(|t| !t.trim().is_empty()) {
        run_one(agent, &task).await;
        if !interactive {
            return;
        }
    }

    loop {
        let Some(task) = read_task(reader).await else {
            break;
        };
        let task = task.trim();
        if task.is_empty() {
            continue;
        }
        if task == "exit" {
            break;
        }
        run_one(agent, task).await;
    }

    agent.events().emit(AgentEvent::Notice {
        content: "👋 Bye!".to_string(),
    });
}

async fn run_one(agent: &mut Agent, task: &str) {
    let result = match strip_screen_command(task) {
        Some(task) => match agent.add_screen_context(task).await {
            Ok(task) => agent.run_turn(&task).await,
            Err(e) => Err(e),
        },
        None => agent.run_turn(task).await,
    };
    if let Err(e) = result {
        agent.events().emit(AgentEvent::TurnFailed {
            message: e.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::*;
    use crate::agent::ScreenCapture;
    use crate::config::{AgentPattern, Config};
    use crate::llm::{Content, ContentBlock};
    use crate::tools::testing::{CannedLlm, ScriptedPrompter};
    use crate::tools::ToolRegistry;

    struct Lines(VecDeque<&'static str>);

    #[async_trait]
    impl LineReader for Lines {
        async fn read_line(&mut self, _prompt: &str) -> Option<String> {
            self.0.pop_front().map(str::to_string)
        }
    }

    #[tokio::test]
    async fn backslash_continues_the_line() {
        let mut lines = Lines(VecDeque::from(["list files\\", "in /tmp"]));
        assert_eq!(
            read_task(&mut lines).await.as_deref(),
            Some("list files\nin /tmp")
        );
        assert_eq!(read_task(&mut lines).await, None);
    }

    #[tokio::test]
    async fn session_survives_gateway_failure() {
        // No reply left for "second": the gateway fails and reading goes on.
        let llm = Arc::new(CannedLlm::new(&["one"]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut agent = Agent::new(
            Config::new(AgentPattern::React),
            llm,
            ToolRegistry::empty(),
            Arc::new(ScriptedPrompter::new([])),
            Arc::new(tx),
        );
        let mut lines = Lines(VecDeque::from(["", "second", "exit", "never read"]));

        run_session(&mut agent, Some("first".to_string()), true, &mut lines).await;

        assert_eq!(agent.history().len(), 2);
        assert_eq!(lines.0.len(), 1);

        let mut failed = 0;
        let mut bye = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                AgentEvent::TurnFailed { .. } => failed += 1,
                AgentEvent::Notice { content } => bye = content.contains("Bye"),
                _ => {}
            }
        }
        assert_eq!(failed, 1);
        assert!(bye);
    }

    struct FixedScreen(Option<&'static str>);

    #[async_trait]
    impl ScreenCapture for FixedScreen {
        async fn capture(&self) -> anyhow::Result<String> {
            match self.0 {
                Some(url) => Ok(url.to_string()),
                None => anyhow::bail!("no display"),
            }
        }
    }

    #[tokio::test]
    async fn screen_task_is_described_before_the_turn() {
        let llm = Arc::new(CannedLlm::new(&["A failing cargo build.", "Add the import."]));
        let mut agent = Agent::new(
            Config::new(AgentPattern::React),
            llm.clone(),
            ToolRegistry::empty(),
            Arc::new(ScriptedPrompter::new([])),
            Arc::new(crate::events::NullSink),
        )
        .with_screen(Arc::new(FixedScreen(Some("data:image/png;base64,AAAA"))));
        let mut lines = Lines(VecDeque::new());

        run_session(&mut agent, Some("/screen how do I fix it?".to_string()), false, &mut lines)
            .await;

        let requests = llm.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        let Content::Blocks(blocks) = &requests[0].messages.last().unwrap().content else {
            panic!("expected an image request");
        };
        assert_eq!(
            blocks[1],
            ContentBlock::ImageUrl {
                url: "data:image/png;base64,AAAA".to_string()
            }
        );
        assert!(matches!(&blocks[0], ContentBlock::Text { text } if text.ends_with("how do I fix it?")));

        let task = agent.history()[0].text();
        assert!(task.contains("my screen right now:\nA failing cargo build."));
        assert!(task.ends_with("\n\nTask: how do I fix it?"));
        assert_eq!(agent.history()[1].text(), "Add the import.");
    }

    #[tokio::test]
    async fn failed_screenshot_skips_the_turn() {
        let llm = Arc::new(CannedLlm::new(&["never used"]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut agent = Agent::new(
            Config::new(AgentPattern::React),
            llm.clone(),
            ToolRegistry::empty(),
            Arc::new(ScriptedPrompter::new([])),
            Arc::new(tx),
        )
        .with_screen(Arc::new(FixedScreen(None)));
        let mut lines = Lines(VecDeque::new());

        run_session(&mut agent, Some("/screen what is this?".to_string()), false, &mut lines)
            .await;

        assert!(llm.requests.lock().unwrap().is_empty());
        assert!(agent.history().is_empty());
        let mut failure = None;
        while let Ok(event) = rx.try_recv() {
            if let AgentEvent::TurnFailed { message } = event {
                failure = Some(message);
            }
        }
        assert_eq!(failure.as_deref(), Some("Screenshot failed: no display"));
    }

    #[tokio::test]
    async fn single_task_without_interactive_returns() {
        let llm = Arc::new(CannedLlm::new(&["done"]));
        let mut agent = Agent::new(
            Config::new(AgentPattern::React),
            llm,
            ToolRegistry::empty(),
            Arc::new(ScriptedPrompter::new([])),
            Arc::new(crate::events::NullSink),
        );
        let mut lines = Lines(VecDeque::from(["should not be read"]));

        run_session(&mut agent, Some("task".to_string()), false, &mut lines).await;
        assert_eq!(lines.0.len(), 1);
        assert_eq!(agent.history().len(), 2);
    }
}
