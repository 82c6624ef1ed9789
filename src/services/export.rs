use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, Local};
use serde::Serialize;

use crate::models::Message;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Text,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Text => "txt",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "text" | "txt" => Ok(ExportFormat::Text),
            other => Err(format!("Unknown export format: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub file_name: String,
    pub contents: String,
}

#[derive(Serialize)]
struct JsonExport<'a> {
    conversation_id: &'a str,
    timestamp: String,
    messages: &'a [Message],
}

/// Serialize a transcript. Returns `None` when there is nothing to export.
pub fn export_conversation(
    format: ExportFormat,
    conversation_id: &str,
    messages: &[Message],
    now: DateTime<Local>,
) -> Result<Option<Export>> {
    if messages.is_empty() {
        return Ok(None);
    }

    let timestamp = now.format(TIMESTAMP_FORMAT).to_string();
    let contents = match format {
        ExportFormat::Json => export_to_json(conversation_id, messages, timestamp)?,
        ExportFormat::Csv => export_to_csv(messages, &timestamp),
        ExportFormat::Text => export_to_text(conversation_id, messages, &timestamp),
    };

    Ok(Some(Export {
        file_name: format!("{}.{}", conversation_id, format.extension()),
        contents,
    }))
}

fn export_to_json(conversation_id: &str, messages: &[Message], timestamp: String) -> Result<String> {
    let data = JsonExport {
        conversation_id,
        timestamp,
        messages,
    };
    Ok(serde_json::to_string_pretty(&data)?)
}

// Rows carry the export time; messages have no timestamps of their own.
fn export_to_csv(messages: &[Message], timestamp: &str) -> String {
    let mut output = String::from("role,content,timestamp\n");
    for msg in messages {
        output.push_str(&format!(
            "{},{},{}\n",
            csv_field(msg.role.as_str()),
            csv_field(&msg.content),
            csv_field(timestamp)
        ));
    }
    output
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn export_to_text(conversation_id: &str, messages: &[Message], timestamp: &str) -> String {
    let mut output = format!("Conversation: {}\n", conversation_id);
    output.push_str(&format!("Date: {}\n\n", timestamp));

    for msg in messages {
        output.push_str(&format!("{}: {}\n\n", msg.role.label(), msg.content));
    }

    output
}
