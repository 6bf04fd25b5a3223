use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use anyhow::{Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use tokio::task::JoinError;
use tracing::info;
use tracing_subscriber::EnvFilter;
use carechat_core::config::BASE_URL_ENV;
use carechat_core::{
    Behavior, ChatClient, ChatError, Config, Conversation, Draft, Endpoint, DEFAULT_BEHAVIORS,
};

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::{AppEvent, EventHandler, Tui};

#[derive(Parser)]
#[command(name = "carechat")]
#[command(about = "Supporter chat client for a remote chat endpoint", version)]
struct Cli {
    /// Base URL of the chat service (the client posts to <BASE_URL>/chat)
    #[arg(long, env = BASE_URL_ENV, global = true)]
    base_url: Option<String>,

    /// Where the interactive UI writes its log
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a single message and print the reply
    Send(SendArgs),
    /// List the built-in behavior categories
    Behaviors,
}

#[derive(Args)]
struct SendArgs {
    /// Free-text message
    #[arg(required_unless_present = "question", conflicts_with = "question")]
    text: Option<String>,

    /// Supporter's question (Q&A mode)
    #[arg(short, long, requires = "answer")]
    question: Option<String>,

    /// The person's answer (Q&A mode)
    #[arg(short, long, requires = "question")]
    answer: Option<String>,

    /// Behavior category used as context
    #[arg(short, long)]
    behavior: Option<String>,

    /// Custom name when the category is "その他"
    #[arg(long, requires = "behavior")]
    custom: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Behaviors) => {
            for behavior in DEFAULT_BEHAVIORS {
                println!("{}", behavior);
            }
            Ok(())
        }
        Some(Commands::Send(args)) => {
            init_logging(None)?;
            let config = load_config();
            let endpoint = Endpoint::resolve(cli.base_url.as_deref(), &config);
            send_once(&endpoint, args).await
        }
        None => {
            let log_file = match cli.log_file {
                Some(path) => path,
                None => Config::config_dir()?.join("carechat.log"),
            };
            init_logging(Some(&log_file))?;
            let config = load_config();
            let endpoint = Endpoint::resolve(cli.base_url.as_deref(), &config);
            run_tui(endpoint, &config).await
        }
    }
}

/// Logs go to a file while the alternate screen is up, otherwise to stderr.
fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|err| anyhow!(err))?;
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|err| anyhow!(err))?;
        }
    }
    Ok(())
}

fn load_config() -> Config {
    Config::load().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "could not read config, using defaults");
        Config::new()
    })
}

async fn send_once(endpoint: &Endpoint, args: SendArgs) -> Result<()> {
    let client = ChatClient::new(endpoint.base_url());
    let mut conversation = Conversation::new();

    if let Some(label) = args.behavior {
        conversation.set_behavior(Some(Behavior::with_custom(
            label,
            args.custom.unwrap_or_default(),
        )));
    }

    conversation.draft = match (args.text, args.question, args.answer) {
        (Some(text), _, _) => Draft::free(text),
        (None, Some(question), Some(answer)) => Draft::qa(question, answer),
        _ => bail!("either a message or both --question and --answer are required"),
    };

    info!(url = %endpoint.chat_url(), source = ?endpoint.source(), "sending one-shot message");
    conversation.send(&client).await?;

    if let Some(error) = conversation.error() {
        bail!("{}", error);
    }
    if let Some(reply) = conversation.last_reply() {
        println!("{}", reply.content);
    }
    Ok(())
}

async fn run_tui(endpoint: Endpoint, config: &Config) -> Result<()> {
    info!(url = %endpoint.chat_url(), source = ?endpoint.source(), "starting interactive session");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut app = App::new(endpoint, config);
    let mut events = EventHandler::new();

    let result = run_app(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}

/// What woke the event loop.
enum Wake {
    Event(Option<AppEvent>),
    Reply(Result<Result<String, ChatError>, JoinError>),
}

async fn run_app(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        let wake = match app.reply_task.as_mut() {
            Some(task) => tokio::select! {
                joined = task => Wake::Reply(joined),
                event = events.next() => Wake::Event(event),
            },
            None => Wake::Event(events.next().await),
        };

        match wake {
            Wake::Reply(joined) => app.complete_send(joined),
            Wake::Event(Some(event)) => handler::handle_event(app, event)?,
            Wake::Event(None) => break,
        }
    }

    if let Some(task) = app.reply_task.take() {
        task.abort();
    }
    Ok(())
}
