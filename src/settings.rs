//! Settings file storage.
//!
//! Settings live in YAML at the first existing path of [`SETTINGS_FILES`].
//! All existing files are read in order and merged key by key, so a project
//! `./shy.yml` can override the user-wide `~/.config/shy/config.yml`.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use thiserror::Error;

use crate::config::{AgentPattern, Provider};

/// Candidate settings files, lowest precedence first. `~` is the home directory.
pub const SETTINGS_FILES: [&str; 4] = [
    "~/.config/shy/config.yml",
    "~/.config/shy/config.yaml",
    "./shy.yml",
    "./shy.yaml",
];

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Failed to write {path}: {message}")]
    Write { path: PathBuf, message: String },
}

/// The `llm` section of the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    pub provider: String,
    pub name: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default)]
    pub agent_pattern: AgentPattern,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<usize>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: Provider::Ollama.to_string(),
            name: "llama3.1".to_string(),
            api_key: String::new(),
            temperature: 0.0,
            agent_pattern: AgentPattern::React,
            base_url: None,
            context_window: None,
        }
    }
}

/// Contents of the settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<usize>,
}

impl Settings {
    /// Load and merge every existing settings file. Defaults when none exist.
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from_paths(&candidate_paths())
    }

    pub fn load_from_paths(paths: &[PathBuf]) -> Result<Self, SettingsError> {
        let mut merged = Value::Mapping(Default::default());
        let mut found = false;

        for path in paths.iter().filter(|p| p.exists()) {
            let contents = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
                path: path.clone(),
                source,
            })?;
            let value: Value =
                serde_yaml::from_str(&contents).map_err(|source| SettingsError::Parse {
                    path: path.clone(),
                    source,
                })?;
            tracing::debug!("Loaded settings from {}", path.display());
            merge_yaml(&mut merged, value);
            found = true;
        }

        if !found {
            tracing::info!("No settings file found, using defaults");
            return Ok(Self::default());
        }

        serde_yaml::from_value(merged).map_err(|source| SettingsError::Parse {
            path: paths.last().cloned().unwrap_or_default(),
            source,
        })
    }

    /// Write the settings to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let write_err = |message: String| SettingsError::Write {
            path: path.to_path_buf(),
            message,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        let contents = serde_yaml::to_string(self).map_err(|e| write_err(e.to_string()))?;
        std::fs::write(path, contents).map_err(|e| write_err(e.to_string()))?;

        tracing::debug!("Saved settings to {}", path.display());
        Ok(())
    }
}

/// Settings paths with `~` expanded.
pub fn candidate_paths() -> Vec<PathBuf> {
    SETTINGS_FILES.iter().map(|p| expand_home(p)).collect()
}

/// The file `--configure` writes to: the first existing one, else the user-wide one.
pub fn settings_path() -> PathBuf {
    let candidates = candidate_paths();
    candidates
        .iter()
        .find(|p| p.exists())
        .cloned()
        .unwrap_or_else(|| candidates[0].clone())
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Recursively overlay `overlay` onto `base`. Mappings merge, everything else replaces.
fn merge_yaml(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        // An empty file parses as null.
        (_, Value::Null) => {}
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_yaml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Interactively ask for every setting and save them. Returns the written path.
pub fn configure_interactive(current: Settings) -> anyhow::Result<PathBuf> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut ask = |label: &str, default: &str, secret: bool| -> anyhow::Result<String> {
        if secret || default.is_empty() {
            print!("{}: ", label);
        } else {
            print!("{} [{}]: ", label, default);
        }
        io::stdout().flush()?;
        let mut line = String::new();
        input.read_line(&mut line)?;
        let line = line.trim();
        Ok(if line.is_empty() {
            default.to_string()
        } else {
            line.to_string()
        })
    };

    let providers = Provider::ALL
        .iter()
        .map(Provider::as_str)
        .collect::<Vec<_>>()
        .join("/");
    let provider = ask(
        &format!("Provider ({})", providers),
        &current.llm.provider,
        false,
    )?;
    provider.parse::<Provider>()?;

    let name = ask("Model", &current.llm.name, false)?;
    let api_key = ask("API Key", &current.llm.api_key, true)?;
    let temperature = ask("Temperature", &current.llm.temperature.to_string(), false)?
        .parse::<f32>()?;
    let pattern_default = match current.llm.agent_pattern {
        AgentPattern::React => "react",
        AgentPattern::FunctionCall => "function_call",
    };
    let agent_pattern = ask("Agent pattern (react/function_call)", pattern_default, false)?
        .parse::<AgentPattern>()?;
    let language = ask("Language", &current.language, false)?;

    let settings = Settings {
        llm: LlmSettings {
            provider,
            name,
            api_key,
            temperature,
            agent_pattern,
            ..current.llm
        },
        language,
        max_iterations: current.max_iterations,
    };

    let path = settings_path();
    settings.save(&path)?;
    Ok(path)
}
