mod banner;
mod config;
mod error;
mod logging;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use runtime::{Agent, ChatService, HistoryEntry, OpenAiBackend, SessionHandle, SessionManager};
use tracing::info;

use config::Config;
use error::Result;

#[derive(Parser)]
#[command(name = "bridgechat")]
#[command(about = "Chat with a language model that can call MCP tools", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (defaults to ./bridgechat.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// MCP server SSE endpoint
    #[arg(short, long, global = true)]
    endpoint: Option<String>,

    /// Model identifier passed to the provider
    #[arg(short, long, global = true)]
    model: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat,
    /// Connect, list the server's tools, and exit
    Tools,
}

fn main() {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::discover(cli.config.as_deref())?;
    config.apply_env(|name| std::env::var(name).ok());
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(model) = cli.model {
        config.backend.model = model;
    }

    match cli.command {
        Some(Commands::Chat) | None => cmd_chat(&config),
        Some(Commands::Tools) => cmd_tools(&config),
    }
}

/// Start the session and wait until its agent is published.
fn connect(
    config: &Config,
) -> Result<(SessionHandle<OpenAiBackend>, Arc<Agent<OpenAiBackend>>)> {
    let backend = config.backend()?;
    info!(%backend, endpoint = %config.endpoint, "starting MCP session");

    let session = SessionManager::new(&config.endpoint, backend).start()?;
    let agent = session.readiness_gate().wait()?;
    Ok((session, agent))
}

fn cmd_tools(config: &Config) -> Result<()> {
    let (session, agent) = connect(config)?;
    println!("{}", banner::banner(session.endpoint(), agent.catalog()));
    Ok(())
}

fn cmd_chat(config: &Config) -> Result<()> {
    println!("bridgechat v{}", env!("CARGO_PKG_VERSION"));

    let (session, agent) = connect(config)?;
    println!("{}\n", banner::banner(session.endpoint(), agent.catalog()));
    println!("Model: {}", config.backend.model);
    println!("Type 'quit' or Ctrl+D to exit, '/clear' to reset the conversation.\n");

    let chat = ChatService::new(Arc::clone(session.publisher()))?;
    let mut history: Vec<HistoryEntry> = Vec::new();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            // EOF
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            break;
        }
        if input == "/clear" {
            history.clear();
            println!("Conversation cleared.\n");
            continue;
        }

        let reply = chat.chat(input, &history);
        println!("\n{reply}\n");

        history.push(HistoryEntry::user(input));
        history.push(HistoryEntry::assistant(reply));
    }

    println!("\nGoodbye.");
    Ok(())
}
