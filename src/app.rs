use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;

use crate::config::Config;
use crate::models::Message;
use crate::providers::groq::GroqProvider;
use crate::providers::CompletionProvider;
use crate::services::chat::{self, RenderEvent, SendOutcome};
use crate::services::conversation::ConversationEntry;
use crate::services::export::{self, ExportFormat};
use crate::services::preferences::{Model, Preferences};
use crate::services::{
    summary, ConversationError, ConversationManager, ConversationStore, KvStore, PreferenceStore,
};
use crate::session::SessionState;

/// Owns the session and routes user actions to the services.
pub struct App {
    state: SessionState,
    conversations: ConversationManager,
    preferences: PreferenceStore,
    provider: Arc<dyn CompletionProvider>,
    api_key: String,
    exports_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppMsg {
    NewChat,
    ListConversations,
    ConversationSelected(String),
    DeleteConversation(String),
    DeleteAllConversations,
    SendMessage(String),
    /// Show the cached summary, generating one only when none is cached.
    Summarize,
    RefreshSummary,
    Export(ExportFormat),
    ListModels,
    ModelSelected(String),
    SetTemperature(f32),
    SetMaxTokens(u32),
    SetTopP(f32),
    SetUserAvatar(String),
    SetAssistantAvatar(String),
    ShowPreferences,
    SavePreferences,
}

/// What a handler changed, for the presentation layer to redraw.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewChange {
    /// The active conversation was replaced (new, switched or deleted).
    TranscriptReplaced {
        conversation_id: String,
        messages: Vec<Message>,
    },
    Conversations(Vec<ConversationEntry>),
    AssistantReplied(String),
    Summary(String),
    Exported(PathBuf),
    Models {
        models: Vec<Model>,
        selected: Model,
    },
    Preferences(Preferences),
    PreferencesSaved,
    /// Informational message, not a failure.
    Notice(String),
    Error(String),
}

impl App {
    pub async fn init(config: &Config) -> Self {
        let provider = Arc::new(GroqProvider::new(config.base_url.as_str()));
        Self::with_provider(config, provider).await
    }

    /// Load both stores and build the session around `provider`.
    pub async fn with_provider(config: &Config, provider: Arc<dyn CompletionProvider>) -> Self {
        let conversation_store = ConversationStore::new(KvStore::new(config.chat_history_path()));
        let preferences = PreferenceStore::new(KvStore::new(config.preferences_path()));

        let stored = conversation_store.load().await;
        let prefs = preferences.load().await;
        tracing::info!(
            conversations = stored.index.len(),
            active = %stored.active_id,
            model = prefs.model.id(),
            "Session loaded"
        );

        let state = SessionState::new(stored, prefs);
        debug_assert!(state.pointer_is_consistent());

        Self {
            state,
            conversations: ConversationManager::new(conversation_store),
            preferences,
            provider,
            api_key: config.api_key.clone(),
            exports_dir: config.exports_dir(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub async fn update<F>(&mut self, msg: AppMsg, on_event: F) -> Vec<ViewChange>
    where
        F: FnMut(RenderEvent<'_>),
    {
        match msg {
            AppMsg::NewChat => {
                let result = self.conversations.new_conversation(&mut self.state).await;
                self.with_transcript(result.err())
            }
            AppMsg::ListConversations => {
                vec![ViewChange::Conversations(
                    self.conversations.list_conversations(&self.state),
                )]
            }
            AppMsg::ConversationSelected(id) => {
                match self
                    .conversations
                    .switch_conversation(&mut self.state, &id)
                    .await
                {
                    Ok(()) => self.with_transcript(None),
                    Err(e @ ConversationError::NotFound(_)) => {
                        vec![ViewChange::Error(e.to_string())]
                    }
                    Err(e) => self.with_transcript(Some(e)),
                }
            }
            AppMsg::DeleteConversation(id) => {
                let was_active = id == self.state.active_id;
                match self
                    .conversations
                    .delete_conversation(&mut self.state, &id)
                    .await
                {
                    Ok(()) if !was_active => vec![ViewChange::Notice(format!("Deleted {}", id))],
                    Ok(()) => self.with_transcript(None),
                    Err(e @ ConversationError::NotFound(_)) => {
                        vec![ViewChange::Error(e.to_string())]
                    }
                    Err(e) => self.with_transcript(Some(e)),
                }
            }
            AppMsg::DeleteAllConversations => {
                let result = self
                    .conversations
                    .delete_all_conversations(&mut self.state)
                    .await;
                let mut changes = self.with_transcript(result.err());
                changes.push(ViewChange::Notice("All conversations deleted".to_string()));
                changes
            }
            AppMsg::SendMessage(text) => self.handle_send_message(&text, on_event).await,
            AppMsg::Summarize if !self.state.summary.is_empty() => {
                vec![ViewChange::Summary(self.state.summary.clone())]
            }
            AppMsg::Summarize | AppMsg::RefreshSummary => {
                let text =
                    summary::summarize(self.provider.as_ref(), &mut self.state, &self.api_key).await;
                vec![ViewChange::Summary(text)]
            }
            AppMsg::Export(format) => self.handle_export(format).await,
            AppMsg::ListModels => vec![ViewChange::Models {
                models: Model::ALL.to_vec(),
                selected: self.state.preferences.model,
            }],
            AppMsg::ModelSelected(name) => match Model::lookup(&name) {
                Ok(model) => {
                    self.state.preferences.model = model;
                    self.preferences_changed()
                }
                Err(e) => vec![ViewChange::Error(e.to_string())],
            },
            AppMsg::SetTemperature(value) => {
                self.state.preferences.set_temperature(value);
                self.preferences_changed()
            }
            AppMsg::SetMaxTokens(value) => {
                self.state.preferences.set_max_tokens(value);
                self.preferences_changed()
            }
            AppMsg::SetTopP(value) => {
                self.state.preferences.set_top_p(value);
                self.preferences_changed()
            }
            AppMsg::SetUserAvatar(symbol) => {
                match self.state.preferences.set_user_avatar(&symbol) {
                    Ok(()) => self.preferences_changed(),
                    Err(e) => vec![ViewChange::Error(e.to_string())],
                }
            }
            AppMsg::SetAssistantAvatar(symbol) => {
                match self.state.preferences.set_assistant_avatar(&symbol) {
                    Ok(()) => self.preferences_changed(),
                    Err(e) => vec![ViewChange::Error(e.to_string())],
                }
            }
            AppMsg::ShowPreferences => self.preferences_changed(),
            AppMsg::SavePreferences => match self.preferences.save(&self.state.preferences).await {
                Ok(()) => vec![ViewChange::PreferencesSaved],
                Err(e) => {
                    tracing::error!("Failed to save preferences: {:#}", e);
                    vec![ViewChange::Error(format!("Error saving preferences: {:#}", e))]
                }
            },
        }
    }

    async fn handle_send_message<F>(&mut self, text: &str, on_event: F) -> Vec<ViewChange>
    where
        F: FnMut(RenderEvent<'_>),
    {
        let report = chat::send_message(
            self.provider.as_ref(),
            &self.conversations,
            &mut self.state,
            &self.api_key,
            text,
            on_event,
        )
        .await;

        let mut changes: Vec<ViewChange> =
            report.notices.into_iter().map(ViewChange::Error).collect();
        match report.outcome {
            SendOutcome::Ignored => {}
            SendOutcome::Committed { reply } => changes.push(ViewChange::AssistantReplied(reply)),
            SendOutcome::Failed { error } => changes.push(ViewChange::Error(format!("Error: {}", error))),
        }
        changes
    }

    async fn handle_export(&self, format: ExportFormat) -> Vec<ViewChange> {
        match self.write_export(format).await {
            Ok(Some(path)) => vec![ViewChange::Exported(path)],
            Ok(None) => vec![ViewChange::Notice("No conversation to export".to_string())],
            Err(e) => {
                tracing::error!("Export failed: {:#}", e);
                vec![ViewChange::Error(format!("Error exporting conversation: {:#}", e))]
            }
        }
    }

    async fn write_export(&self, format: ExportFormat) -> Result<Option<PathBuf>> {
        let Some(export) = export::export_conversation(
            format,
            &self.state.active_id,
            &self.state.messages,
            Local::now(),
        )?
        else {
            return Ok(None);
        };

        tokio::fs::create_dir_all(&self.exports_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.exports_dir.display()))?;
        let path = self.exports_dir.join(&export.file_name);
        tokio::fs::write(&path, export.contents)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(Some(path))
    }

    fn with_transcript(&self, persist_error: Option<ConversationError>) -> Vec<ViewChange> {
        let mut changes = vec![ViewChange::TranscriptReplaced {
            conversation_id: self.state.active_id.clone(),
            messages: self.state.messages.clone(),
        }];
        if let Some(e) = persist_error {
            changes.push(ViewChange::Error(e.to_string()));
        }
        changes
    }

    fn preferences_changed(&self) -> Vec<ViewChange> {
        vec![ViewChange::Preferences(self.state.preferences.clone())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::scripted::{Script, ScriptedProvider};

    async fn app_with(dir: &tempfile::TempDir, script: Script) -> App {
        let config = Config::new(
            Some("key".to_string()),
            crate::config::DEFAULT_BASE_URL,
            Some(dir.path().to_path_buf()),
        )
        .unwrap();
        App::with_provider(&config, Arc::new(ScriptedProvider::new(script))).await
    }

    #[tokio::test]
    async fn test_send_then_reload_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with(&dir, Script::Fragments(vec!["Hel", "lo!"])).await;

        let changes = app.update(AppMsg::SendMessage("Hi".into()), |_| {}).await;
        assert_eq!(changes, vec![ViewChange::AssistantReplied("Hello!".into())]);
        let active = app.state().active_id.clone();

        let reopened = app_with(&dir, Script::Reject).await;
        assert_eq!(reopened.state().active_id, active);
        assert_eq!(
            reopened.state().messages,
            vec![Message::user("Hi"), Message::assistant("Hello!")]
        );
    }

    #[tokio::test]
    async fn test_summary_is_cached_until_refreshed() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(
            Some("key".to_string()),
            crate::config::DEFAULT_BASE_URL,
            Some(dir.path().to_path_buf()),
        )
        .unwrap();
        let provider = Arc::new(ScriptedProvider::new(Script::Reply("A greeting.")));
        let mut app = App::with_provider(&config, provider.clone()).await;

        app.update(AppMsg::SendMessage("Hi".into()), |_| {}).await;
        let first = app.update(AppMsg::Summarize, |_| {}).await;
        let second = app.update(AppMsg::Summarize, |_| {}).await;
        assert_eq!(first, vec![ViewChange::Summary("A greeting.".into())]);
        assert_eq!(second, first);
        assert_eq!(provider.requests().len(), 2);

        app.update(AppMsg::RefreshSummary, |_| {}).await;
        assert_eq!(provider.requests().len(), 3);

        app.update(AppMsg::SendMessage("More".into()), |_| {}).await;
        app.update(AppMsg::Summarize, |_| {}).await;
        assert_eq!(provider.requests().len(), 5);
    }

    #[tokio::test]
    async fn test_failed_send_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with(&dir, Script::FailAfter(vec!["Hel", "lo"])).await;

        let changes = app.update(AppMsg::SendMessage("Hi".into()), |_| {}).await;
        assert!(matches!(&changes[..], [ViewChange::Error(e)] if e.starts_with("Error: ")));
        assert!(app.state().messages.is_empty());
    }

    #[tokio::test]
    async fn test_switch_to_unknown_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with(&dir, Script::Reject).await;

        let changes = app
            .update(AppMsg::ConversationSelected("Conversation-nope".into()), |_| {})
            .await;
        assert_eq!(
            changes,
            vec![ViewChange::Error(
                "Conversation not found: Conversation-nope".into()
            )]
        );
    }

    #[tokio::test]
    async fn test_export_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with(&dir, Script::Fragments(vec!["pong"])).await;

        let empty = app.update(AppMsg::Export(ExportFormat::Text), |_| {}).await;
        assert_eq!(
            empty,
            vec![ViewChange::Notice("No conversation to export".into())]
        );

        app.update(AppMsg::SendMessage("ping".into()), |_| {}).await;
        let changes = app.update(AppMsg::Export(ExportFormat::Csv), |_| {}).await;
        let [ViewChange::Exported(path)] = &changes[..] else {
            panic!("unexpected changes: {changes:?}");
        };
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            format!("{}.csv", app.state().active_id)
        );
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.starts_with("role,content,timestamp\nuser,ping,"));
    }

    #[tokio::test]
    async fn test_preferences_update_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with(&dir, Script::Reject).await;

        app.update(AppMsg::ModelSelected("Gemma-7B".into()), |_| {}).await;
        app.update(AppMsg::SetMaxTokens(100_000), |_| {}).await;
        let bad = app.update(AppMsg::SetUserAvatar("🐙".into()), |_| {}).await;
        assert!(matches!(&bad[..], [ViewChange::Error(_)]));

        let saved = app.update(AppMsg::SavePreferences, |_| {}).await;
        assert_eq!(saved, vec![ViewChange::PreferencesSaved]);

        let reopened = app_with(&dir, Script::Reject).await;
        assert_eq!(reopened.state().preferences.model, Model::Gemma7b);
        assert_eq!(reopened.state().preferences.max_tokens, 4096);
    }

    #[tokio::test]
    async fn test_delete_all_resets_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with(&dir, Script::Fragments(vec!["ok"])).await;
        app.update(AppMsg::SendMessage("one".into()), |_| {}).await;
        app.update(AppMsg::NewChat, |_| {}).await;
        app.update(AppMsg::SendMessage("two".into()), |_| {}).await;

        let changes = app.update(AppMsg::DeleteAllConversations, |_| {}).await;
        assert!(matches!(
            &changes[0],
            ViewChange::TranscriptReplaced { messages, .. } if messages.is_empty()
        ));
        let listed = app.update(AppMsg::ListConversations, |_| {}).await;
        assert_eq!(listed, vec![ViewChange::Conversations(Vec::new())]);
    }
}
