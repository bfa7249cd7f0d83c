//! shy - shell assistant entry point.

use std::sync::Arc;

use clap::Parser;
use shy_sh::agent::{run_few_shot_examples, run_session, Agent};
use shy_sh::console::{ConsoleSink, StdinReader, TerminalPrompter};
use shy_sh::llm::OpenAiCompatibleClient;
use shy_sh::settings::{self, Settings};
use shy_sh::tools::ToolRegistry;
use shy_sh::Config;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "shy", version, about = "Shell assistant powered by a language model")]
struct Cli {
    /// Task to run. Starts an interactive session when omitted.
    prompt: Vec<String>,

    /// Keep the session open after running the prompt.
    #[arg(short, long)]
    interactive: bool,

    /// Run commands and scripts without asking for confirmation.
    #[arg(short = 'x', long = "no-confirm")]
    no_confirm: bool,

    /// Maximum tool calls per task.
    #[arg(short = 'n', long)]
    max_iterations: Option<usize>,

    /// Write the settings file interactively and exit.
    #[arg(long)]
    configure: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they never mix with answers
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shy_sh=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if cli.configure {
        let current = Settings::load().unwrap_or_default();
        let path = settings::configure_interactive(current)?;
        println!("Settings saved to {}", path.display());
        return Ok(());
    }

    let mut config = Config::load()?;
    if cli.no_confirm {
        config.ask_before_execute = false;
    }
    if let Some(max_iterations) = cli.max_iterations {
        anyhow::ensure!(max_iterations > 0, "--max-iterations must be at least 1");
        config.max_iterations = max_iterations;
    }
    info!(
        "Loaded configuration: provider={} model={} pattern={:?}",
        config.llm.provider, config.llm.model, config.agent_pattern
    );

    let task = cli.prompt.join(" ");
    let task = (!task.trim().is_empty()).then_some(task);
    let interactive = cli.interactive || task.is_none();

    println!("{} - {}", config.llm.provider, config.llm.model);
    if let Some(task) = &task {
        println!("✨: {}\n", task);
    }

    let llm = Arc::new(OpenAiCompatibleClient::new(&config.llm));
    let examples = run_few_shot_examples(config.agent_pattern).await;
    let mut agent = Agent::new(
        config,
        llm,
        ToolRegistry::new(),
        Arc::new(TerminalPrompter),
        Arc::new(ConsoleSink),
    )
    .with_examples(examples);

    run_session(&mut agent, task, interactive, &mut StdinReader).await;

    Ok(())
}
