//! # chatline
//!
//! `chatline serve` runs the HTTP backend; `chatline chat` is a line-based
//! client that streams replies into the terminal.

#![deny(unsafe_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use secrecy::SecretString;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::Level;

use chatline_client::{ChatClient, ClientConfig, TurnOutcome};
use chatline_core::provider::Generator;
use chatline_llm::{GeminiConfig, GeminiProvider, MockGenerator, MockResponse};
use chatline_server::ServerConfig;
use chatline_store::Database;
use chatline_telemetry::{data_dir, init_telemetry, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "chatline", about = "Streaming chat backend and client")]
struct Cli {
    /// Default log level (`RUST_LOG` overrides). Defaults to info for
    /// `serve` and warn for `chat`.
    #[arg(long, global = true)]
    log_level: Option<Level>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP backend.
    Serve(ServeArgs),
    /// Chat interactively against a running backend.
    Chat(ChatArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, env = "PORT", default_value = "5000")]
    port: u16,

    /// Path to the chat database.
    #[arg(long, env = "CHATLINE_DB")]
    db_path: Option<PathBuf>,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, default_value = chatline_llm::gemini::DEFAULT_MODEL)]
    model: String,

    /// Answer with canned text instead of calling Gemini.
    #[arg(long)]
    mock: bool,
}

#[derive(Args, Debug)]
struct ChatArgs {
    #[arg(long, env = "CHATLINE_API_URL", default_value = chatline_client::config::DEFAULT_API_URL)]
    api_url: String,

    /// Display name to sign in with. Prompted for when absent.
    #[arg(long)]
    name: Option<String>,
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

/// `chat` shares stderr with the transcript, so it stays quiet by default.
fn default_level(command: &Command) -> Level {
    match command {
        Command::Serve(_) => Level::INFO,
        Command::Chat(_) => Level::WARN,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let telemetry = TelemetryConfig {
        log_level: cli.log_level.unwrap_or_else(|| default_level(&cli.command)),
        json: cli.json_logs,
        ..Default::default()
    };
    ensure_parent_dir(&telemetry.log_db_path)?;
    let _guard = init_telemetry(telemetry);

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Chat(args) => chat(args).await,
    }
}

fn generator(args: &ServeArgs) -> Result<Arc<dyn Generator>> {
    if args.mock {
        let canned = MockResponse::Paced {
            interval: Duration::from_millis(40),
            chunks: ["This ", "is ", "a ", "canned ", "reply ", "from ", "the ", "mock ", "backend."]
                .map(String::from)
                .to_vec(),
        };
        return Ok(Arc::new(MockGenerator::new(Vec::new()).with_fallback(canned)));
    }

    // `API_KEY` is accepted as a legacy name.
    let key = args
        .api_key
        .clone()
        .or_else(|| std::env::var("API_KEY").ok())
        .filter(|k| !k.is_empty())
        .context("no Gemini API key: set GEMINI_API_KEY or pass --mock")?;

    let mut config = GeminiConfig::new(SecretString::from(key));
    config.model = args.model.clone();
    let provider = GeminiProvider::new(config).context("Failed to build Gemini client")?;
    Ok(Arc::new(provider))
}

async fn serve(args: ServeArgs) -> Result<()> {
    let db_path = args
        .db_path
        .clone()
        .unwrap_or_else(|| data_dir().join("chats.db"));
    ensure_parent_dir(&db_path)?;
    let db = Database::open(&db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");

    let config = ServerConfig {
        host: args.host.clone(),
        port: args.port,
        ..Default::default()
    };
    let handle = chatline_server::start(config, db, generator(&args)?)
        .await
        .context("Failed to start server")?;
    tracing::info!(port = handle.port, "chatline server ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;
    tracing::info!("shutting down");
    handle.abort();
    Ok(())
}

const HELP: &str = "commands: /new  /list  /open N  /delete N  /quit";

async fn chat(args: ChatArgs) -> Result<()> {
    let mut client = ChatClient::connect(&ClientConfig::new(args.api_url))?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let name = match args.name {
        Some(name) => name,
        None => {
            prompt("name> ")?;
            lines.next_line().await?.unwrap_or_default()
        }
    };
    let user = client.login(&name).await?;
    println!("Hello, {}. {HELP}", user.first_name());
    print_sessions(&client);

    loop {
        prompt("> ")?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            match run_command(&mut client, command).await {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => println!("error: {e:#}"),
            }
            continue;
        }

        let outcome = send(&mut client, line).await?;
        if let Some(e) = &outcome.generation_error {
            println!("[reply failed: {e}]");
        }
        if let Some(e) = &outcome.persistence_error {
            println!("[not saved: {e}]");
        }
    }
    Ok(())
}

fn prompt(text: &str) -> Result<()> {
    let mut out = std::io::stdout();
    out.write_all(text.as_bytes())?;
    out.flush()?;
    Ok(())
}

/// Stream a reply, printing only the part of the accumulated text that is new.
async fn send(client: &mut ChatClient, text: &str) -> Result<TurnOutcome> {
    let mut shown = 0;
    let outcome = client
        .send_message(text, |acc| {
            let mut out = std::io::stdout();
            let _ = out.write_all(acc[shown..].as_bytes());
            let _ = out.flush();
            shown = acc.len();
        })
        .await?;
    if shown == 0 || outcome.generation_error.is_some() {
        // Nothing streamed, or the partial text was replaced by the apology.
        if shown > 0 {
            println!();
        }
        println!("{}", outcome.reply.content);
    } else {
        println!();
    }
    Ok(outcome)
}

fn print_sessions(client: &ChatClient) {
    if client.sessions().is_empty() {
        println!("(no saved chats)");
    }
    for (i, chat) in client.sessions().iter().enumerate() {
        let marker = if client.active_session() == Some(&chat.id) { "*" } else { " " };
        println!("{marker}{:>3}  {}", i + 1, chat.title);
    }
}

/// Handle a `/command`. Returns `true` to quit.
async fn run_command(client: &mut ChatClient, command: &str) -> Result<bool> {
    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("quit" | "q"), _) => return Ok(true),
        (Some("new"), _) => {
            client.new_chat();
            println!("(new chat)");
        }
        (Some("list"), _) => {
            client.refresh_sessions().await?;
            print_sessions(client);
        }
        (Some("open"), Some(n)) => {
            let id = pick(client, n)?;
            client.select_chat(&id).await?;
            for msg in client.messages() {
                println!("[{:?}] {}", msg.role, msg.content);
            }
        }
        (Some("delete"), Some(n)) => {
            let id = pick(client, n)?;
            client.delete_chat(&id).await?;
            print_sessions(client);
        }
        _ => println!("{HELP}"),
    }
    Ok(false)
}

fn pick(client: &ChatClient, n: &str) -> Result<chatline_core::SessionId> {
    let index: usize = n.parse().with_context(|| format!("not a number: {n}"))?;
    match client.sessions().get(index.wrapping_sub(1)) {
        Some(chat) => Ok(chat.id.clone()),
        None => bail!("no chat #{index}; try /list"),
    }
}
