//! # shy_sh
//!
//! A shell assistant that turns natural-language tasks into local shell and
//! python actions, mediated by a language model.
//!
//! This library provides:
//! - A turn state machine that streams model output and dispatches tool calls
//! - Tool-call detection for JSON-in-text (react) and structured function calls
//! - History compression against the model's context budget
//! - Built-in tools: shell, shell/python experts, shell history
//! - Explanations and alternative commands offered at confirmation time
//! - `/screen` tasks that describe a screenshot to the model first
//! - An OpenAI-compatible streaming model gateway
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use shy_sh::{agent::Agent, console, llm::OpenAiCompatibleClient, tools::ToolRegistry, Config};
//!
//! let config = Config::load()?;
//! let llm = Arc::new(OpenAiCompatibleClient::new(&config.llm));
//! let mut agent = Agent::new(
//!     config,
//!     llm,
//!     ToolRegistry::new(),
//!     Arc::new(console::TerminalPrompter),
//!     Arc::new(console::ConsoleSink),
//! );
//! let outcome = agent.run_turn("which branch am I on?").await?;
//! ```

pub mod agent;
pub mod config;
pub mod console;
pub mod events;
pub mod llm;
pub mod settings;
pub mod tools;

pub use config::Config;
