//! `/screen` tasks: the model first describes a screenshot, and that
//! description is prepended to the task as context.

use std::process::Stdio;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tokio::process::Command;

use crate::llm::{ChatRequest, Content, ContentBlock, Message};

/// Prefix that turns a task into a screenshot task.
pub const SCREEN_COMMAND: &str = "/screen";

/// Source of screenshots.
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    /// Capture the whole screen as a `data:` image URL.
    async fn capture(&self) -> anyhow::Result<String>;
}

/// Captures with the screenshot program of the platform.
pub struct SystemScreen;

#[async_trait]
impl ScreenCapture for SystemScreen {
    async fn capture(&self) -> anyhow::Result<String> {
        let file = tempfile::Builder::new()
            .prefix("shy-screen-")
            .suffix(".png")
            .tempfile()?
            .into_temp_path();
        let path = file.to_string_lossy().into_owned();

        let mut failures = Vec::new();
        for (program, args) in capture_commands(&path) {
            let output = Command::new(program)
                .args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .output()
                .await;
            match output {
                Ok(output) if output.status.success() => {
                    let bytes = tokio::fs::read(&file).await?;
                    if !bytes.is_empty() {
                        tracing::debug!(program, size = bytes.len(), "Captured screenshot");
                        return Ok(image_data_url("image/png", &bytes));
                    }
                    failures.push(format!("{}: empty image", program));
                }
                Ok(output) => failures.push(format!(
                    "{}: {}",
                    program,
                    String::from_utf8_lossy(&output.stderr).trim()
                )),
                Err(e) => failures.push(format!("{}: {}", program, e)),
            }
        }
        anyhow::bail!("Could not take a screenshot ({})", failures.join("; "))
    }
}

/// Programs tried in order, each writing a PNG to `path`.
fn capture_commands(path: &str) -> Vec<(&'static str, Vec<String>)> {
    let path = path.to_string();
    if cfg!(target_os = "macos") {
        vec![("screencapture", vec!["-x".into(), "-t".into(), "png".into(), path])]
    } else if cfg!(target_os = "windows") {
        let script = format!(
            "Add-Type -AssemblyName System.Windows.Forms,System.Drawing; \
             $b = [System.Windows.Forms.SystemInformation]::VirtualScreen; \
             $i = New-Object System.Drawing.Bitmap $b.Width, $b.Height; \
             $g = [System.Drawing.Graphics]::FromImage($i); \
             $g.CopyFromScreen($b.Left, $b.Top, 0, 0, $i.Size); \
             $i.Save('{}', [System.Drawing.Imaging.ImageFormat]::Png)",
            path.replace('\'', "''")
        );
        vec![(
            "powershell",
            vec!["-NoProfile".into(), "-Command".into(), script],
        )]
    } else {
        vec![
            ("grim", vec![path.clone()]),
            ("gnome-screenshot", vec!["-f".into(), path.clone()]),
            ("import", vec!["-window".into(), "root".into(), path.clone()]),
            ("scrot", vec!["-o".into(), path]),
        ]
    }
}

pub fn image_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, BASE64.encode(bytes))
}

/// Task text without the `/screen` prefix, if it has one.
pub fn strip_screen_command(task: &str) -> Option<&str> {
    task.trim_start()
        .strip_prefix(SCREEN_COMMAND)
        .map(str::trim)
}

/// Ask the model to describe `image` with `task` in mind, after `history`.
pub fn describe_request(
    history: Vec<Message>,
    task: &str,
    image: String,
    language: &str,
) -> ChatRequest {
    let language = language.trim();
    let lang_ctx = if language.is_empty() {
        String::new()
    } else {
        format!("\nAnswer in {} language.", language)
    };

    let mut messages = history;
    messages.push(Message::human(Content::Blocks(vec![
        ContentBlock::Text {
            text: format!(
                "Write a detailed description of the image.{}\nDescribe what you see but only the parts that are useful to solve this task: {}",
                lang_ctx, task
            ),
        },
        ContentBlock::ImageUrl { url: image },
    ])));

    ChatRequest {
        system: String::new(),
        messages,
        tools: None,
    }
}

/// The task as sent to the agent once the screen was described.
pub fn screen_task(description: &str, task: &str) -> String {
    format!(
        "\nContext informations - This is what I'm seeing in my screen right now:\n{}\n\nTask: {}",
        description.trim(),
        task
    )
}
