mod app;
mod cli;
mod config;
mod models;
mod providers;
mod services;
mod session;

use std::io::Write;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use app::{App, AppMsg, ViewChange};
use cli::{parse_command, Cli, Command, HELP};
use config::{Config, APP_NAME};
use models::{Message, Role};
use services::chat::{RenderEvent, StreamPhase};
use services::preferences::Preferences;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level).context("Invalid --log-level")?,
        None => EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::new(cli.api_key, &cli.base_url, cli.data_dir)?;
    tracing::debug!(?config, "Starting {}", APP_NAME);
    if config.api_key.is_empty() {
        tracing::warn!("No API key configured; set GROQ_API_KEY or pass --api-key");
    }

    let mut app = App::init(&config).await;

    println!("{} - type /help for commands", APP_NAME);
    print_transcript(
        &app.state().active_id,
        &app.state().messages,
        &app.state().preferences,
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt(&app.state().preferences)?;
        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };

        let msg = match parse_command(&line) {
            Command::Msg(msg) => msg,
            Command::Help => {
                println!("{}", HELP);
                continue;
            }
            Command::Quit => break,
            Command::Empty => continue,
            Command::Invalid(usage) => {
                println!("{}", usage);
                continue;
            }
        };

        let streaming = matches!(msg, AppMsg::SendMessage(_));
        let avatar = app.state().preferences.assistant_avatar.clone();
        let mut printed = 0;
        let changes = app
            .update(msg, |event| match event {
                RenderEvent::Phase(StreamPhase::Sending) => {
                    print!("{} ", avatar);
                    flush();
                }
                RenderEvent::Partial(text) => {
                    print!("{}", &text[printed..]);
                    printed = text.len();
                    flush();
                }
                RenderEvent::Phase(StreamPhase::Committed | StreamPhase::Failed) => println!(),
                RenderEvent::Phase(_) => {}
            })
            .await;

        for change in changes {
            render(&change, &app.state().preferences, streaming);
        }
    }

    Ok(())
}

fn prompt(prefs: &Preferences) -> Result<()> {
    print!("{} > ", prefs.user_avatar);
    std::io::stdout().flush().context("Failed to write prompt")
}

fn flush() {
    if let Err(e) = std::io::stdout().flush() {
        tracing::debug!("stdout flush failed: {}", e);
    }
}

fn render(change: &ViewChange, prefs: &Preferences, streamed: bool) {
    match change {
        ViewChange::TranscriptReplaced {
            conversation_id,
            messages,
        } => print_transcript(conversation_id, messages, prefs),
        ViewChange::Conversations(entries) if entries.is_empty() => {
            println!("No saved conversations");
        }
        ViewChange::Conversations(entries) => {
            for entry in entries {
                let marker = if entry.active { "*" } else { " " };
                println!("{} {} ({} messages)", marker, entry.id, entry.message_count);
            }
        }
        // Already shown fragment by fragment.
        ViewChange::AssistantReplied(reply) if !streamed => {
            println!("{} {}", prefs.assistant_avatar, reply);
        }
        ViewChange::AssistantReplied(_) => {}
        ViewChange::Summary(text) => println!("Summary: {}", text),
        ViewChange::Exported(path) => println!("Exported to {}", path.display()),
        ViewChange::Models { models, selected } => {
            for model in models {
                let marker = if model == selected { "*" } else { " " };
                println!("{} {:<28} {}", marker, model.id(), model.display_name());
            }
        }
        ViewChange::Preferences(p) => {
            println!("Model:       {} ({})", p.model.display_name(), p.model.id());
            println!("Temperature: {:.2}", p.temperature);
            println!("Max tokens:  {}", p.max_tokens);
            println!("Top P:       {:.2}", p.top_p);
            println!("Avatars:     {} / {}", p.user_avatar, p.assistant_avatar);
        }
        ViewChange::PreferencesSaved => println!("Preferences saved"),
        ViewChange::Notice(text) => println!("{}", text),
        ViewChange::Error(text) => println!("! {}", text),
    }
}

fn print_transcript(conversation_id: &str, messages: &[Message], prefs: &Preferences) {
    println!("-- {} --", conversation_id);
    for msg in messages {
        let avatar = match msg.role {
            Role::User => &prefs.user_avatar,
            Role::Assistant => &prefs.assistant_avatar,
        };
        println!("{} {}", avatar, msg.content);
    }
}
