//! User confirmation before a tool touches the system.

use async_trait::async_trait;

/// Answer to "Do you want to execute this command?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Run it.
    Execute,
    /// Do not run it; the turn ends.
    Cancel,
    /// Do not run it; copy it to the clipboard and end the turn.
    Copy,
    /// Ask the model to explain it, then ask again.
    Explain,
    /// Ask the model for alternative commands and pick one.
    Alternatives,
}

/// Choices offered for a single shell command.
pub const COMMAND_CHOICES: &[Confirmation] = &[
    Confirmation::Execute,
    Confirmation::Cancel,
    Confirmation::Copy,
    Confirmation::Explain,
    Confirmation::Alternatives,
];

/// Choices offered for a shell command after it was explained.
pub const EXPLAINED_COMMAND_CHOICES: &[Confirmation] = &[
    Confirmation::Execute,
    Confirmation::Cancel,
    Confirmation::Copy,
    Confirmation::Alternatives,
];

/// Choices offered for a generated script.
pub const SCRIPT_CHOICES: &[Confirmation] = &[
    Confirmation::Execute,
    Confirmation::Cancel,
    Confirmation::Copy,
    Confirmation::Explain,
];

/// Choices offered for a generated script after it was explained.
pub const EXPLAINED_SCRIPT_CHOICES: &[Confirmation] = &[
    Confirmation::Execute,
    Confirmation::Cancel,
    Confirmation::Copy,
];

impl Confirmation {
    /// Parse a typed answer. Empty input means yes.
    pub fn parse(answer: &str) -> Option<Self> {
        match answer.trim().to_lowercase().as_str() {
            "" | "y" | "yes" => Some(Self::Execute),
            "n" | "no" => Some(Self::Cancel),
            "c" | "copy" => Some(Self::Copy),
            "e" | "explain" => Some(Self::Explain),
            "a" | "alternatives" => Some(Self::Alternatives),
            _ => None,
        }
    }

    /// Single-letter key shown in the prompt.
    pub fn key(self) -> &'static str {
        match self {
            Self::Execute => "y",
            Self::Cancel => "n",
            Self::Copy => "c",
            Self::Explain => "e",
            Self::Alternatives => "a",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Execute => "yes",
            Self::Cancel => "no",
            Self::Copy => "copy",
            Self::Explain => "explain",
            Self::Alternatives => "alternatives",
        }
    }
}

/// Interactive confirmation channel. The only suspension point besides the
/// model stream.
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Ask `question`, accepting only one of `choices`.
    async fn confirm(&self, question: &str, choices: &[Confirmation]) -> Confirmation;

    /// Pick one of `options`. `None` cancels.
    async fn select(&self, question: &str, options: &[String]) -> Option<usize>;
}
