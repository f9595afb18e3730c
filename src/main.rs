use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use folio_chat::conversation::{
    SlashCommand, find_starter, get_help_text, get_starters_text, parse_slash_command,
};
use folio_chat::{
    Config, ConversationManager, MessageId, MessageState, Sender, StreamEvent,
    StreamingResponseClient,
};

#[derive(Parser)]
#[command(name = "folio-chat")]
#[command(version)]
#[command(about = "Chat with the portfolio assistant from a terminal", long_about = None)]
struct Cli {
    /// Config file to use instead of ~/.folio-chat/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat (default)
    Chat {
        /// Answer from canned replies instead of the backend
        #[arg(long)]
        offline: bool,
    },
    /// Ask a single question and exit
    Ask {
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
    /// Print the effective configuration
    Config,
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    init_tracing(&config.log_level);

    match cli.command.unwrap_or(Commands::Chat { offline: false }) {
        Commands::Chat { offline } => run_chat(config, offline).await,
        Commands::Ask { question } => {
            let mut manager = ConversationManager::new(StreamingResponseClient::new(config));
            if let Some(id) = stream_turn(&mut manager, &question.join(" ")).await? {
                manager.wait_for_suggestions().await;
                show_suggestions(&manager, id);
            }
            Ok(())
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

async fn run_chat(config: Config, offline: bool) -> Result<()> {
    let mut manager = ConversationManager::new(StreamingResponseClient::new(config));
    if let Some(greeting) = manager.messages().first() {
        println!("🤖 {}", greeting.text);
    }
    println!("Type a question, /starters for ideas, /help for commands.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    // Answer whose side-channel suggestions have not been shown yet
    let mut unshown: Option<MessageId> = None;
    loop {
        if let Some(id) = unshown {
            manager.process_stream_events();
            if show_suggestions(&manager, id) {
                unshown = None;
            }
        }

        print!("👤 ");
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };

        let question = match parse_slash_command(&line) {
            Some(parsed) => match parsed.command {
                SlashCommand::Bye => break,
                SlashCommand::Help => {
                    println!("{}", get_help_text());
                    continue;
                }
                SlashCommand::Starters => {
                    println!("{}", get_starters_text());
                    continue;
                }
                SlashCommand::History => {
                    print_history(&manager);
                    continue;
                }
                SlashCommand::Ask => match parsed.argument().and_then(find_starter) {
                    Some(starter) => {
                        println!("👤 {}", starter.message);
                        starter.message.to_string()
                    }
                    None => {
                        println!("Unknown starter. Try /starters.");
                        continue;
                    }
                },
            },
            None => line,
        };

        if offline {
            if let Some(id) = manager.submit_offline(&question) {
                print_reply(&manager, id);
            }
        } else {
            unshown = stream_turn(&mut manager, &question).await?;
        }
    }

    println!("👋 Bye!");
    Ok(())
}

/// Submit one question and echo the answer as it streams in. Returns the
/// answer's id when its suggestions have not been shown yet.
async fn stream_turn(
    manager: &mut ConversationManager,
    question: &str,
) -> Result<Option<MessageId>> {
    let Some(id) = manager.submit(question) else {
        return Ok(None);
    };

    let mut stdout = io::stdout();
    write!(stdout, "🤖 ")?;
    stdout.flush()?;
    let mut printed_any = false;

    while let Some((_, event)) = manager.next_update().await {
        if let StreamEvent::TextDelta(fragment) = &event {
            write!(stdout, "{fragment}")?;
            stdout.flush()?;
            printed_any = true;
        }
    }

    manager.process_stream_events();
    match manager.store().get(id) {
        Some(message) if message.state == MessageState::Failed => {
            if printed_any {
                writeln!(stdout)?;
            }
            writeln!(stdout, "{}", message.text)?;
            Ok(None)
        }
        Some(_) => {
            writeln!(stdout)?;
            Ok((!show_suggestions(manager, id)).then_some(id))
        }
        None => {
            writeln!(stdout)?;
            Ok(None)
        }
    }
}

/// Print the answer's suggestions if it has any yet
fn show_suggestions(manager: &ConversationManager, id: MessageId) -> bool {
    match manager.store().get(id) {
        Some(message) if !message.suggestions.is_empty() => {
            print_suggestions(&message.suggestions);
            true
        }
        _ => false,
    }
}

fn print_reply(manager: &ConversationManager, id: MessageId) {
    if let Some(message) = manager.store().get(id) {
        println!("🤖 {}", message.text);
        print_suggestions(&message.suggestions);
    }
}

fn print_suggestions(suggestions: &[String]) {
    if suggestions.is_empty() {
        return;
    }
    println!("\n💡 You could also ask:");
    for suggestion in suggestions {
        println!("  • {suggestion}");
    }
    println!();
}

fn print_history(manager: &ConversationManager) {
    for message in manager.messages() {
        let icon = match message.sender {
            Sender::User => "👤",
            Sender::Bot => "🤖",
        };
        let timestamp = message.timestamp.format("%H:%M:%S");
        println!("{icon} {timestamp} {}", message.text);
    }
}
