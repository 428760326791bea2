//! CLI entry point for the CodeWizard chat server.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod client;
mod config;
mod core;
mod docs;
mod models;
mod prompts;
mod server;
mod tools;

use crate::client::ChatClient;
use crate::config::Config;
use crate::core::driver::{EVENT_CHANNEL_CAPACITY, RunOutcome, TurnDriver};
use crate::core::events::Event;
use crate::core::frame;
use crate::core::turn_log::TurnLog;
use crate::docs::DocsClient;
use crate::models::IncomingTurn;
use crate::tools::ToolRegistry;

#[derive(Parser, Debug)]
#[command(
    name = "codewizard",
    author,
    version,
    about = "CodeWizard - coding answers backed by live library documentation"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server (default)
    Serve(ServeArgs),
    /// Ask one question from the terminal
    Ask(AskArgs),
    /// List the library IDs the assistant uses without searching
    Libraries,
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Address to bind
    #[arg(long)]
    host: Option<String>,
    /// Port to bind
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Args, Debug)]
struct AskArgs {
    /// The question
    #[arg(required = true)]
    question: Vec<String>,
    /// Model to use instead of the configured default
    #[arg(long)]
    model: Option<String>,
    /// Groq API key
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    api_key: String,
    /// Print raw `data:` frames instead of rendered text
    #[arg(long)]
    frames: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Some(Commands::Libraries) => {
            for (name, id) in prompts::library_shortcuts() {
                println!("{name:<14} {id}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Ask(args)) => {
            let config = Config::load(cli.config)?;
            run_ask(&config, args).await
        }
        Some(Commands::Serve(args)) => serve(cli.config, args).await,
        None => serve(cli.config, ServeArgs::default()).await,
    }
}

async fn serve(path: Option<PathBuf>, args: ServeArgs) -> Result<ExitCode> {
    let mut config = Config::load(path)?;
    if let Some(host) = args.host {
        config.host = Some(host);
    }
    if let Some(port) = args.port {
        config.port = Some(port);
    }
    config.validate()?;
    server::run_http_server(config).await?;
    Ok(ExitCode::SUCCESS)
}

async fn run_ask(config: &Config, args: AskArgs) -> Result<ExitCode> {
    let question = args.question.join(" ");
    let model = args
        .model
        .unwrap_or_else(|| config.default_model().to_string());
    let http_client = client::build_http_client(config.request_timeout())?;
    let docs = Arc::new(DocsClient::new(http_client.clone(), &config.docs_url()));
    let client = ChatClient::new(http_client, &config.chat_base_url(), &args.api_key)?;
    let registry = ToolRegistry::for_credential(Some(&args.api_key), &docs);
    let log = TurnLog::seed(
        prompts::system_prompt(),
        [IncomingTurn {
            role: serde_json::Value::from("user"),
            content: serde_json::Value::String(question),
        }],
    );

    let (tx_event, mut rx_event) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let driver = TurnDriver::new(client, registry, model, tx_event, CancellationToken::new());
    let run = tokio::spawn(driver.run(log));

    let mut stdout = io::stdout().lock();
    while let Some(event) = rx_event.recv().await {
        if args.frames {
            write!(stdout, "{}", frame::encode(&event))?;
            continue;
        }
        match event {
            Event::TextDelta { content } => write!(stdout, "{content}")?,
            Event::ToolInvocation { calls } => {
                for call in calls {
                    eprintln!("-> {} {}", call.name, call.args);
                }
            }
            Event::ToolResult {
                name,
                content,
                is_error,
            } => {
                let status = if is_error { "failed" } else { "ok" };
                eprintln!("<- {name} {status} ({} chars)", content.chars().count());
            }
            Event::Done => writeln!(stdout)?,
            Event::Error { message } => eprintln!("Error: {message}"),
        }
        stdout.flush()?;
    }

    let report = run.await.context("Driver task failed")?;
    Ok(match report.outcome {
        RunOutcome::Completed => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}
