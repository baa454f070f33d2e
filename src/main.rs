//! MineAgent CLI
//!
//! A command-line interface for the MineAgent add-on assistant with REPL support.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use mine_agent::knowledge::SearchOptions;
use mine_agent::{
    event_channel, AgentEvent, Backend, Config, EventReceiver, InteractionMode, KnowledgeEngine,
    MineAgent, ProviderRegistry, RunOutcome, Telemetry, ToolHost,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Parser)]
#[command(name = "mine-agent")]
#[command(about = "MineAgent - an LLM agent for Minecraft Bedrock add-ons", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Workspace directory the agent works in
    #[arg(short = 'd', long, default_value = ".")]
    workspace: PathBuf,

    /// LLM backend (ollama, lmstudio, openai, gemini, generic)
    #[arg(long)]
    backend: Option<Backend>,

    /// LLM model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Base URL of the backend - overrides config
    #[arg(long)]
    base_url: Option<String>,

    /// API key - overrides config and env vars
    #[arg(long)]
    api_key: Option<String>,

    /// Maximum think/act cycles per message
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Interaction mode (guide, free, template)
    #[arg(long)]
    mode: Option<InteractionMode>,

    /// Approve file writes without asking
    #[arg(long)]
    auto_approve: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive REPL session
    Repl,

    /// Run a single prompt
    Prompt {
        /// The prompt to send to the agent
        message: String,
    },

    /// List models offered by the backend
    Models,

    /// Check that the backend is reachable
    Check,

    /// Knowledge base commands
    Knowledge {
        #[command(subcommand)]
        command: KnowledgeCommands,
    },
}

#[derive(Subcommand)]
enum KnowledgeCommands {
    /// Keyword search
    Search {
        query: String,

        /// Only documents of this category
        #[arg(short, long)]
        category: Option<String>,

        /// Maximum number of results
        #[arg(short = 'n', long, default_value = "5")]
        max: usize,
    },

    /// Show one document
    Show { id: String },

    /// List all documents
    List,

    /// Report stale or version-drifted documents
    Report {
        /// Target version (defaults to the configured one)
        #[arg(long)]
        target: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let workspace = if cli.workspace.is_absolute() {
        cli.workspace.clone()
    } else {
        std::env::current_dir()?.join(&cli.workspace)
    }
    .canonicalize()
    .with_context(|| format!("Workspace not found: {}", cli.workspace.display()))?;

    let mut config = Config::load(&workspace)?;
    apply_overrides(&cli, &mut config);

    let telemetry = Telemetry::init(config.log_dir(&workspace), config.logging.verbose)?;

    match cli.command {
        Some(Commands::Knowledge { command }) => run_knowledge_command(&config, &workspace, command),
        Some(Commands::Models) => list_models(&config).await,
        Some(Commands::Check) => check_connection(&config).await,
        Some(Commands::Prompt { message }) => run_single_prompt(config, workspace, &message).await,
        Some(Commands::Repl) | None => run_repl(config, workspace, telemetry.log_dir()).await,
    }
}

/// CLI flags win over every config file
fn apply_overrides(cli: &Cli, config: &mut Config) {
    if let Some(backend) = cli.backend {
        if backend != config.provider.backend {
            // The configured URL belongs to the other backend
            config.provider.base_url = None;
        }
        config.provider.backend = backend;
    }
    if let Some(model) = &cli.model {
        config.provider.model = model.clone();
    }
    if let Some(base_url) = &cli.base_url {
        config.provider.base_url = Some(base_url.clone());
    }
    if let Some(api_key) = &cli.api_key {
        config.provider.api_key = Some(api_key.clone());
    }
    if let Some(max_iterations) = cli.max_iterations {
        config.agent.max_iterations = max_iterations;
    }
    if let Some(mode) = cli.mode {
        config.agent.interaction_mode = mode;
    }
    if cli.auto_approve {
        config.agent.auto_approve = true;
    }
    if cli.verbose {
        config.logging.verbose = true;
    }
}

/// Interactive host: approvals and questions are answered on the terminal
struct ConsoleHost;

fn read_reply(prompt: &str) -> Option<String> {
    print!("{}", prompt);
    std::io::stdout().flush().ok()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line).ok()?;
    Some(line.trim().to_string())
}

#[async_trait]
impl ToolHost for ConsoleHost {
    async fn ask_user(&self, question: &str) -> String {
        let question = question.to_string();
        tokio::task::spawn_blocking(move || {
            println!("\n? {}", question);
            read_reply("> ")
        })
        .await
        .ok()
        .flatten()
        .unwrap_or_default()
    }

    fn report_progress(&self, step: usize, total: usize, description: &str) {
        println!("  [{}/{}] {}", step, total, description);
    }

    async fn request_approval(&self, description: &str, details: &str, diff: Option<&str>) -> bool {
        let message = format!("\n! {}\n  {}", description, details);
        let diff = diff.map(str::to_string);
        tokio::task::spawn_blocking(move || {
            println!("{}", message);
            if let Some(diff) = diff {
                println!("{}", diff);
            }
            read_reply("Approve? [y/N] ")
        })
        .await
        .ok()
        .flatten()
        .map(|answer| matches!(answer.to_lowercase().as_str(), "y" | "yes"))
        .unwrap_or(false)
    }
}

fn preview(output: &str) -> String {
    let first = output.lines().next().unwrap_or("");
    if first.chars().count() > 100 {
        format!("{}...", first.chars().take(100).collect::<String>())
    } else {
        first.to_string()
    }
}

/// Print the event stream until the agent is dropped
fn spawn_event_printer(mut events: EventReceiver) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                AgentEvent::StreamChunk { content } => {
                    print!("{}", content);
                    let _ = std::io::stdout().flush();
                }
                AgentEvent::StreamEnd => println!(),
                AgentEvent::ToolCallStarted { tool, .. } => println!("  -> {}", tool),
                AgentEvent::ToolCallCompleted {
                    tool, output, success, ..
                } => {
                    let mark = if success { "ok" } else { "failed" };
                    println!("  <- {} [{}] {}", tool, mark, preview(&output));
                }
                AgentEvent::Error { message } => eprintln!("Error: {}", message),
                AgentEvent::StateChange { .. } | AgentEvent::Complete { .. } => {}
            }
        }
    })
}

/// Run one message, cancelling on Ctrl-C
async fn send_with_interrupt(agent: &mut MineAgent, message: &str) -> RunOutcome {
    let handle = agent.cancel_handle();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    let outcome = agent.send(message).await;
    watcher.abort();

    if matches!(outcome, RunOutcome::Cancelled) {
        println!("\nCancelled.");
    }
    outcome
}

async fn run_single_prompt(config: Config, workspace: PathBuf, message: &str) -> Result<()> {
    let (tx, rx) = event_channel();
    let printer = spawn_event_printer(rx);
    let mut agent = MineAgent::new(config, workspace, Arc::new(ConsoleHost), tx)?;

    println!("Workspace: {}", agent.workspace().display());
    println!("Model: {} ({})", agent.config().provider.model, agent.provider().name());
    println!("---");

    let outcome = send_with_interrupt(&mut agent, message).await;
    agent.dispose();
    drop(agent);
    let _ = printer.await;

    println!("---");
    match outcome {
        RunOutcome::Completed { .. } => Ok(()),
        other => anyhow::bail!("Run ended in state {}", other.final_state()),
    }
}

const REPL_HELP: &str = "\
Commands:
  /quit, /exit       - Exit the REPL
  /clear             - Start a new conversation
  /reload            - Reload the knowledge base
  /search <query>    - Search the knowledge base
  /help              - Show this help";

async fn run_repl(config: Config, workspace: PathBuf, log_dir: &Path) -> Result<()> {
    let (tx, rx) = event_channel();
    let printer = spawn_event_printer(rx);
    let mut agent = MineAgent::new(config, workspace, Arc::new(ConsoleHost), tx)?;

    println!("MineAgent REPL");
    println!("Workspace: {}", agent.workspace().display());
    println!("Model: {} ({})", agent.config().provider.model, agent.provider().name());
    println!("Knowledge: {} documents", agent.engine().len());
    println!("Mode: {}", agent.config().agent.interaction_mode);
    println!();
    println!("{}", REPL_HELP);
    println!();

    let mut rl = DefaultEditor::new()?;
    let history_path = log_dir.join("history.txt");
    let _ = rl.load_history(&history_path);

    let mut in_conversation = false;

    loop {
        let prompt = if in_conversation { "mine-agent>> " } else { "mine-agent> " };

        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line)?;

                if line.starts_with('/') {
                    let (cmd, arg) = match line.split_once(' ') {
                        Some((cmd, arg)) => (cmd, Some(arg.trim())),
                        None => (line, None),
                    };

                    match cmd {
                        "/quit" | "/exit" => {
                            println!("Goodbye!");
                            break;
                        }
                        "/clear" => {
                            agent.reset();
                            in_conversation = false;
                            println!("Conversation cleared.");
                        }
                        "/reload" => {
                            let count = agent.reload_knowledge();
                            println!("Loaded {} knowledge documents.", count);
                        }
                        "/search" => match arg.filter(|a| !a.is_empty()) {
                            Some(query) => {
                                let options = SearchOptions::new()
                                    .with_target_version(agent.config().knowledge.target_version.clone());
                                let results = agent.engine().search(query, &options);
                                println!("{}", KnowledgeEngine::format_search_results(&results));
                            }
                            None => println!("Usage: /search <query>"),
                        },
                        "/help" => println!("{}", REPL_HELP),
                        _ => println!("Unknown command: {}", cmd),
                    }
                    continue;
                }

                println!();
                send_with_interrupt(&mut agent, line).await;
                in_conversation = true;
                println!();
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);
    agent.dispose();
    drop(agent);
    let _ = printer.await;

    Ok(())
}

async fn list_models(config: &Config) -> Result<()> {
    let providers = ProviderRegistry::new();
    let provider = providers.create(&config.provider)?;

    let models = provider.list_models().await?;
    println!("{} models at {}:", provider.name(), config.provider.effective_base_url());
    if models.is_empty() {
        println!("  (none)");
    }
    for model in models {
        let mut line = format!("  {}", model.id);
        if let Some(window) = model.context_window {
            line.push_str(&format!(" | {} ctx", window));
        }
        if model.supports_tool_calling == Some(true) {
            line.push_str(" | tools");
        }
        println!("{}", line);
    }

    providers.dispose_all();
    Ok(())
}

async fn check_connection(config: &Config) -> Result<()> {
    let providers = ProviderRegistry::new();
    let provider = providers.create(&config.provider)?;
    let status = provider.test_connection().await;
    providers.dispose_all();

    if status.ok {
        println!("{} is reachable at {}", provider.name(), config.provider.effective_base_url());
        Ok(())
    } else {
        anyhow::bail!(
            "{} is not usable: {}",
            provider.name(),
            status.error.as_deref().unwrap_or("no models available")
        )
    }
}

fn run_knowledge_command(config: &Config, workspace: &Path, command: KnowledgeCommands) -> Result<()> {
    let engine = KnowledgeEngine::load(config.knowledge_dir(workspace));

    match command {
        KnowledgeCommands::Search { query, category, max } => {
            let mut options = SearchOptions::new()
                .with_max_results(max)
                .with_target_version(config.knowledge.target_version.clone());
            if let Some(category) = category {
                options = options.with_category(category);
            }
            let results = engine.search(&query, &options);
            println!("{}", KnowledgeEngine::format_search_results(&results));
        }

        KnowledgeCommands::Show { id } => {
            let doc = engine
                .get_document(&id)
                .with_context(|| format!("Document \"{}\" not found", id))?;
            println!("# {} ({})", doc.metadata.title, doc.metadata.id);
            println!("Category: {}", doc.metadata.category);
            println!("MC versions: {} - {}", doc.metadata.version_min, doc.metadata.version_max);
            println!();
            println!("{}", doc.raw_content);
        }

        KnowledgeCommands::List => {
            let docs = engine.list_documents();
            println!("Knowledge directory: {}\n", engine.dir().display());
            if docs.is_empty() {
                println!("  No documents found.");
            }
            for doc in docs {
                println!(
                    "  {:24} | {:12} | up to {:8} | {}",
                    doc.id, doc.category, doc.version_max, doc.title
                );
            }
        }

        KnowledgeCommands::Report { target } => {
            let target = target.unwrap_or_else(|| config.knowledge.target_version.clone());
            println!("{}", engine.freshness_report(Some(target.as_str())));
        }
    }

    Ok(())
}
