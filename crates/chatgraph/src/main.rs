//! Interactive terminal chat built on the `chatgraph` library.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chatgraph::core::{NodeEvent, StreamEvent};
use chatgraph::{Config, DEFAULT_SYSTEM_PROMPT, Session, bootstrap};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};

const BAR_CHAR: &str = "▎";

/// Chat with a tool-using model in the terminal.
#[derive(Parser, Debug)]
#[command(name = "chatgraph", version)]
struct Cli {
    /// Conversation id, used as the thread and run id
    #[arg(long, value_name = "ID")]
    chat_id: Option<String>,

    /// Print every stream event as a JSON line instead of formatted text
    #[arg(long)]
    json: bool,

    /// Read the system prompt from a file
    #[arg(long, value_name = "FILE")]
    system_prompt: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    let system_prompt = match &cli.system_prompt {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(prompt) => prompt,
            Err(err) => {
                eprintln!("failed to read {}: {err}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => DEFAULT_SYSTEM_PROMPT.to_owned(),
    };
    let chat_id = cli.chat_id.clone().unwrap_or_else(new_chat_id);

    let mut session = match bootstrap(&config, &system_prompt, &chat_id).await {
        Ok(session) => session,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    if !cli.json {
        let tools = session.workflow().tool_names().join(", ");
        println!(
            "{} {} {}",
            "chat".bright_black(),
            session.chat_id().bright_white(),
            format!("({} · tools: {tools})", config.model).bright_black()
        );
    }

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    loop {
        if !cli.json {
            print!("> ");
            std::io::stdout().flush().ok();
        }
        let Some(line) = read_line().await else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let result = if cli.json {
            send_json(&mut session, &line).await
        } else {
            send_pretty(&mut session, &line, &progress_style).await
        };
        if let Err(err) = result {
            eprintln!("{} {err}", "error:".bright_red());
        }
    }
    ExitCode::SUCCESS
}

async fn send_json(
    session: &mut Session,
    line: &str,
) -> Result<(), chatgraph::SessionError> {
    session
        .send_message(line, |event| match serde_json::to_string(event) {
            Ok(json) => println!("{json}"),
            Err(err) => error!("failed to encode event: {err}"),
        })
        .await
        .map(|_| ())
}

async fn send_pretty(
    session: &mut Session,
    line: &str,
    progress_style: &ProgressStyle,
) -> Result<(), chatgraph::SessionError> {
    let mut progress_bar = Some(new_spinner(progress_style));
    let mut in_text = false;

    let result = session
        .send_message(line, |event| {
            // Finish the spinner before printing anything else.
            if let Some(progress_bar) = progress_bar.take() {
                progress_bar.finish_and_clear();
            }

            match event {
                StreamEvent::Node {
                    event: NodeEvent::MessageDelta(delta),
                    ..
                } => {
                    if !in_text {
                        print!("{}🤖 ", BAR_CHAR.bright_cyan());
                        in_text = true;
                    }
                    print!("{}", delta.bright_white());
                    std::io::stdout().flush().ok();
                }
                StreamEvent::Node {
                    event: NodeEvent::ToolCallStarted { name, .. },
                    ..
                } => {
                    println!(
                        "{}🔧 {}",
                        BAR_CHAR.bright_yellow(),
                        name.bright_white().bold()
                    );
                }
                StreamEvent::Node {
                    event:
                        NodeEvent::ToolCallFinished {
                            name,
                            is_error: true,
                            ..
                        },
                    ..
                } => {
                    println!("{}❌ {name} failed", BAR_CHAR.bright_red());
                }
                StreamEvent::NodeFinished { .. } if in_text => {
                    println!();
                    in_text = false;
                }
                _ => {}
            }
        })
        .await;

    if let Some(progress_bar) = progress_bar {
        progress_bar.finish_and_clear();
    }
    result.map(|_| ())
}

fn new_spinner(style: &ProgressStyle) -> ProgressBar {
    let progress_bar = ProgressBar::new_spinner();
    progress_bar.set_style(style.clone());
    progress_bar.set_message("🤔 Thinking...");
    progress_bar.enable_steady_tick(Duration::from_millis(100));
    progress_bar
}

fn new_chat_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("chat-{millis}")
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(0) => None,
        Ok(_) => Some(line),
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
