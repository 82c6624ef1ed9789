//! Command-line arguments and REPL command parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::app::AppMsg;
use crate::config::DEFAULT_BASE_URL;
use crate::services::export::ExportFormat;

#[derive(Parser, Debug)]
#[command(name = "cosmic-query")]
#[command(about = "Chat with Groq-hosted models from the terminal")]
#[command(
    long_about = "CosmicQuery is a terminal chat client for Groq-hosted models. Replies stream \
as they arrive and every conversation is kept in a local history.\n\n\
Type a message and press Enter to send it. Lines starting with '/' are commands; \
type /help inside the session for the list."
)]
pub struct Cli {
    /// Groq API key
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "COSMIC_QUERY_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Directory holding history, preferences and exports
    #[arg(long, env = "COSMIC_QUERY_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "cosmic_query=trace" (defaults to RUST_LOG)
    #[arg(long)]
    pub log_level: Option<String>,
}

pub const HELP: &str = "\
Commands:
  /new                          Start a new conversation
  /list                         List saved conversations
  /switch <id>                  Switch to a saved conversation
  /delete <id>                  Delete a conversation
  /delete-all                   Delete every conversation
  /summary                      Show the summary of the current conversation
  /summary refresh              Regenerate the summary
  /export <json|csv|text>       Export the current conversation
  /models                       List available models
  /model <id|name>              Select a model
  /temperature <0-1>            Set sampling temperature
  /max-tokens <256-4096>        Set response length limit
  /top-p <0.1-1>                Set nucleus sampling threshold
  /avatar user|assistant <sym>  Change an avatar
  /prefs                        Show current preferences
  /save-prefs                   Save preferences
  /help                         Show this help
  /quit                         Exit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Msg(AppMsg),
    Help,
    Quit,
    Empty,
    /// Unknown command or bad argument, with a usage hint.
    Invalid(String),
}

/// Map one input line to a command. Lines without a leading `/` are chat messages.
pub fn parse_command(line: &str) -> Command {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Command::Empty;
    }
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Command::Msg(AppMsg::SendMessage(trimmed.to_string()));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    match name {
        "new" => Command::Msg(AppMsg::NewChat),
        "list" => Command::Msg(AppMsg::ListConversations),
        "switch" => required(arg, "/switch <id>", |id| {
            Some(AppMsg::ConversationSelected(id.to_string()))
        }),
        "delete" => required(arg, "/delete <id>", |id| {
            Some(AppMsg::DeleteConversation(id.to_string()))
        }),
        "delete-all" => Command::Msg(AppMsg::DeleteAllConversations),
        "summary" => match arg {
            "" => Command::Msg(AppMsg::Summarize),
            "refresh" => Command::Msg(AppMsg::RefreshSummary),
            _ => Command::Invalid("Usage: /summary [refresh]".to_string()),
        },
        "export" => required(arg, "/export <json|csv|text>", |f| {
            f.parse().ok().map(AppMsg::Export)
        }),
        "models" => Command::Msg(AppMsg::ListModels),
        "model" => required(arg, "/model <id|name>", |m| {
            Some(AppMsg::ModelSelected(m.to_string()))
        }),
        "temperature" => required(arg, "/temperature <0-1>", |v| {
            v.parse().ok().map(AppMsg::SetTemperature)
        }),
        "max-tokens" => required(arg, "/max-tokens <256-4096>", |v| {
            v.parse().ok().map(AppMsg::SetMaxTokens)
        }),
        "top-p" => required(arg, "/top-p <0.1-1>", |v| v.parse().ok().map(AppMsg::SetTopP)),
        "avatar" => required(arg, "/avatar user|assistant <symbol>", |a| {
            let (who, symbol) = a.split_once(char::is_whitespace)?;
            let symbol = symbol.trim().to_string();
            match who {
                "user" => Some(AppMsg::SetUserAvatar(symbol)),
                "assistant" => Some(AppMsg::SetAssistantAvatar(symbol)),
                _ => None,
            }
        }),
        "prefs" => Command::Msg(AppMsg::ShowPreferences),
        "save-prefs" => Command::Msg(AppMsg::SavePreferences),
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => Command::Invalid(format!("Unknown command: /{} (try /help)", other)),
    }
}

fn required<F>(arg: &str, usage: &str, build: F) -> Command
where
    F: FnOnce(&str) -> Option<AppMsg>,
{
    if arg.is_empty() {
        return Command::Invalid(format!("Usage: {}", usage));
    }
    match build(arg) {
        Some(msg) => Command::Msg(msg),
        None => Command::Invalid(format!("Usage: {}", usage)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_a_message() {
        assert_eq!(
            parse_command("  hello there \n"),
            Command::Msg(AppMsg::SendMessage("hello there".into()))
        );
        assert_eq!(parse_command("   "), Command::Empty);
    }

    #[test]
    fn test_commands_with_arguments() {
        assert_eq!(
            parse_command("/switch Conversation-20240501-093000"),
            Command::Msg(AppMsg::ConversationSelected(
                "Conversation-20240501-093000".into()
            ))
        );
        assert_eq!(
            parse_command("/export CSV"),
            Command::Msg(AppMsg::Export(ExportFormat::Csv))
        );
        assert_eq!(
            parse_command("/model Mixtral-8x7B"),
            Command::Msg(AppMsg::ModelSelected("Mixtral-8x7B".into()))
        );
        assert_eq!(
            parse_command("/temperature 0.25"),
            Command::Msg(AppMsg::SetTemperature(0.25))
        );
        assert_eq!(
            parse_command("/summary refresh"),
            Command::Msg(AppMsg::RefreshSummary)
        );
        assert_eq!(parse_command("/summary"), Command::Msg(AppMsg::Summarize));
        assert_eq!(
            parse_command("/avatar assistant 🚀"),
            Command::Msg(AppMsg::SetAssistantAvatar("🚀".into()))
        );
    }

    #[test]
    fn test_bad_arguments_show_usage() {
        assert_eq!(
            parse_command("/max-tokens lots"),
            Command::Invalid("Usage: /max-tokens <256-4096>".into())
        );
        assert_eq!(
            parse_command("/switch"),
            Command::Invalid("Usage: /switch <id>".into())
        );
        assert_eq!(
            parse_command("/avatar robot 🤖"),
            Command::Invalid("Usage: /avatar user|assistant <symbol>".into())
        );
        assert!(matches!(parse_command("/frobnicate"), Command::Invalid(_)));
    }

    #[test]
    fn test_cli_reads_flags() {
        let cli = Cli::try_parse_from([
            "cosmic-query",
            "--api-key",
            "k",
            "--data-dir",
            "/tmp/cq",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.api_key.as_deref(), Some("k"));
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/cq")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }
}
