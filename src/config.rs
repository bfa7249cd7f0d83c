//! Runtime configuration for shy.
//!
//! Configuration is resolved from the YAML settings file (see [`crate::settings`])
//! and then overridden by environment variables:
//! - `SHY_LLM_PROVIDER` - Optional. One of `ollama`, `openai`, `groq`, `anthropic`, `google`.
//! - `SHY_LLM_MODEL` - Optional. Model name understood by the provider.
//! - `SHY_LLM_API_KEY` - Optional. API key; required for every provider except `ollama`.
//! - `SHY_AGENT_PATTERN` - Optional. `react` or `function_call`.
//! - `SHY_MAX_ITERATIONS` - Optional. Tool dispatches allowed per turn. Defaults to `6`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::context_budget;
use crate::settings::{Settings, SettingsError};

/// Tool dispatches allowed in a single turn unless configured otherwise.
pub const DEFAULT_MAX_ITERATIONS: usize = 6;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown LLM provider: {0}")]
    UnknownProvider(String),

    #[error("Provider {0} is not supported by this build")]
    UnsupportedProvider(String),

    #[error("Provider {0} requires an API key (run `shy --configure` or set SHY_LLM_API_KEY)")]
    MissingApiKey(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Wire convention used to carry tool calls. Chosen by configuration,
/// never detected at runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPattern {
    /// Tool call embedded as a JSON object in the model's free text.
    #[default]
    React,
    /// Tool call carried out-of-band as provider-native structured data.
    FunctionCall,
}

impl FromStr for AgentPattern {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "react" => Ok(Self::React),
            "function_call" => Ok(Self::FunctionCall),
            other => Err(ConfigError::InvalidValue(
                "agent_pattern".to_string(),
                other.to_string(),
            )),
        }
    }
}

/// Model provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    OpenAi,
    Groq,
    Anthropic,
    Google,
    Aws,
}

impl Provider {
    pub const ALL: [Provider; 6] = [
        Provider::Ollama,
        Provider::OpenAi,
        Provider::Google,
        Provider::Anthropic,
        Provider::Groq,
        Provider::Aws,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
            Self::Groq => "groq",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Aws => "aws",
        }
    }

    /// OpenAI-compatible endpoint of the provider, if it has one.
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            Self::Ollama => Some("http://localhost:11434/v1"),
            Self::OpenAi => Some("https://api.openai.com/v1"),
            Self::Groq => Some("https://api.groq.com/openai/v1"),
            Self::Anthropic => Some("https://api.anthropic.com/v1"),
            Self::Google => Some("https://generativelanguage.googleapis.com/v1beta/openai"),
            Self::Aws => None,
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Ollama)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| ConfigError::UnknownProvider(s.to_string()))
    }
}

/// Model gateway configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: Provider,

    /// Model identifier understood by the provider
    pub model: String,

    pub api_key: Option<String>,

    pub temperature: f32,

    /// OpenAI-compatible base URL (without `/chat/completions`)
    pub base_url: String,

    /// Context budget in tokens used by the history compressor
    pub context_window: usize,
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,

    pub agent_pattern: AgentPattern,

    /// Language the final answers are written in (empty = model's choice)
    pub language: String,

    /// Maximum tool dispatches per turn
    pub max_iterations: usize,

    /// Ask the user before running any command or script
    pub ask_before_execute: bool,
}

impl Config {
    /// Load the settings file and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Settings::load()?;
        Self::from_settings(settings, |key| std::env::var(key).ok())
    }

    /// Resolve a config from parsed settings. `env` looks up override variables.
    pub fn from_settings(
        settings: Settings,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let llm = settings.llm;

        let provider: Provider = env("SHY_LLM_PROVIDER")
            .unwrap_or(llm.provider)
            .parse()?;
        let model = env("SHY_LLM_MODEL").unwrap_or(llm.name);
        let non_empty = |k: &String| !k.trim().is_empty();
        let api_key = env("SHY_LLM_API_KEY")
            .filter(non_empty)
            .or_else(|| Some(llm.api_key).filter(non_empty));

        let agent_pattern = match env("SHY_AGENT_PATTERN") {
            Some(v) => v.parse()?,
            None => llm.agent_pattern,
        };

        let max_iterations = match env("SHY_MAX_ITERATIONS") {
            Some(v) => v.parse().map_err(|e| {
                ConfigError::InvalidValue("SHY_MAX_ITERATIONS".to_string(), format!("{}", e))
            })?,
            None => settings.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS),
        };
        if max_iterations == 0 {
            return Err(ConfigError::InvalidValue(
                "max_iterations".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let base_url = match llm.base_url.filter(|u| !u.trim().is_empty()) {
            Some(url) => url,
            None => provider
                .default_base_url()
                .ok_or_else(|| ConfigError::UnsupportedProvider(provider.to_string()))?
                .to_string(),
        };

        if provider.requires_api_key() && api_key.is_none() {
            return Err(ConfigError::MissingApiKey(provider.to_string()));
        }

        let context_window = llm
            .context_window
            .unwrap_or_else(|| context_budget(provider.as_str(), &model));

        Ok(Self {
            llm: LlmConfig {
                provider,
                model,
                api_key,
                temperature: llm.temperature,
                base_url,
                context_window,
            },
            agent_pattern,
            language: settings.language,
            max_iterations,
            ask_before_execute: true,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(agent_pattern: AgentPattern) -> Self {
        Self {
            llm: LlmConfig {
                provider: Provider::Ollama,
                model: "llama3.1".to_string(),
                api_key: None,
                temperature: 0.0,
                base_url: "http://localhost:11434/v1".to_string(),
                context_window: context_budget("ollama", "llama3.1"),
            },
            agent_pattern,
            language: String::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            ask_before_execute: true,
        }
    }
}
