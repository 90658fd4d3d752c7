//! Dialog history with automatic summarization, TTL, and a conversation cap.
//!
//! Messages are append-only. When the unsummarized suffix grows past the
//! configured threshold, the oldest prefix is folded into a summary written
//! by the LLM, keeping the most recent `threshold / 2` messages verbatim.
//! Conversations idle longer than the TTL, or beyond the cap (oldest by
//! `updated_at` first), are deleted — persisted file included.
//!
//! Persistence is one JSON file per conversation under the configured
//! directory. Old files may carry timezone-naive timestamps; they are
//! coerced to UTC on load.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::CoreError;
use crate::llm::{LlmRuntime, SamplingOptions};
use crate::logfab::{LogEvent, LogManager, LogSource};

const SUMMARIZATION_PROMPT: &str = "Summarize the following dialog, keeping the key information: \
the main topic, decisions made and why, implementation details (function, class, and file names), \
problems that were solved, and any plans mentioned.\n\nDialog:\n{conversation}\n\n\
Summary (2-4 sentences, keep the technical details):";

/// Timestamps that may have been persisted without an offset.
mod flexible_utc {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(dt.with_timezone(&Utc));
        }
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(&raw, format) {
                return Ok(naive.and_utc());
            }
        }
        Err(serde::de::Error::custom(format!("unparseable timestamp: {}", raw)))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(with = "flexible_utc")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// One role/content pair in LLM-context shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub summarized_count: usize,
    #[serde(with = "flexible_utc")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "flexible_utc")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            messages: Vec::new(),
            summary: None,
            summarized_count: 0,
            created_at: now,
            updated_at: now,
            metadata: None,
        }
    }

    pub fn add_message(
        &mut self,
        role: Role,
        content: impl Into<String>,
        metadata: Option<Value>,
    ) -> ConversationMessage {
        let message = ConversationMessage {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata,
        };
        self.messages.push(message.clone());
        self.updated_at = Utc::now();
        message
    }

    pub fn recent(&self, count: usize) -> &[ConversationMessage] {
        let start = self.messages.len().saturating_sub(count);
        &self.messages[start..]
    }

    /// Context for the LLM: summary preamble (when present) plus the last
    /// `max_messages` turns.
    pub fn context_for_llm(&self, max_messages: usize) -> Vec<ChatTurn> {
        let mut turns = Vec::new();
        if let Some(ref summary) = self.summary {
            turns.push(ChatTurn {
                role: Role::System.as_str().to_string(),
                content: format!("Summary of the earlier dialog:\n{}", summary),
            });
        }
        for message in self.recent(max_messages) {
            turns.push(ChatTurn {
                role: message.role.as_str().to_string(),
                content: message.content.clone(),
            });
        }
        turns
    }
}

#[derive(Clone, Debug)]
pub struct ConversationMemoryConfig {
    pub max_messages_before_summary: usize,
    pub persist_dir: Option<PathBuf>,
    pub max_conversations: usize,
    pub ttl_hours: i64,
    pub summarize_model: String,
}

impl Default for ConversationMemoryConfig {
    fn default() -> Self {
        Self {
            max_messages_before_summary: 20,
            persist_dir: None,
            max_conversations: 100,
            ttl_hours: 72,
            summarize_model: "qwen2.5-coder:7b".to_string(),
        }
    }
}

/// Deletions performed by one cleanup pass.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct CleanupReport {
    pub expired: usize,
    pub over_limit: usize,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.expired + self.over_limit
    }
}

pub struct ConversationMemory {
    cfg: ConversationMemoryConfig,
    conversations: DashMap<String, Arc<Mutex<Conversation>>>,
    llm: Arc<dyn LlmRuntime>,
    logs: Arc<LogManager>,
}

impl ConversationMemory {
    pub fn new(
        cfg: ConversationMemoryConfig,
        llm: Arc<dyn LlmRuntime>,
        logs: Arc<LogManager>,
    ) -> Self {
        let memory = Self {
            cfg,
            conversations: DashMap::new(),
            llm,
            logs,
        };
        memory.load_persisted();
        memory.cleanup();
        memory
    }

    fn load_persisted(&self) {
        let Some(ref dir) = self.cfg.persist_dir else {
            return;
        };
        if std::fs::create_dir_all(dir).is_err() {
            return;
        }
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        let mut loaded = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|raw| serde_json::from_str::<Conversation>(&raw).map_err(|e| e.to_string()))
            {
                Ok(conversation) => {
                    self.conversations
                        .insert(conversation.id.clone(), Arc::new(Mutex::new(conversation)));
                    loaded += 1;
                }
                Err(e) => self.logs.emit(
                    LogEvent::warning(format!("skipping unreadable conversation {:?}: {}", path, e))
                        .source(LogSource::Infrastructure),
                ),
            }
        }
        if loaded > 0 {
            self.logs.emit(
                LogEvent::info(format!("loaded {} persisted conversations", loaded))
                    .source(LogSource::Infrastructure),
            );
        }
    }

    fn persist(&self, conversation: &Conversation) {
        let Some(ref dir) = self.cfg.persist_dir else {
            return;
        };
        let path = dir.join(format!("{}.json", conversation.id));
        match serde_json::to_string_pretty(conversation) {
            Ok(raw) => {
                if let Err(e) = std::fs::write(&path, raw) {
                    self.logs.emit(
                        LogEvent::error(format!("failed to persist conversation: {}", e))
                            .source(LogSource::Infrastructure),
                    );
                }
            }
            Err(e) => self.logs.emit(
                LogEvent::error(format!("failed to serialize conversation: {}", e))
                    .source(LogSource::Infrastructure),
            ),
        }
    }

    /// Existing id, or a new conversation (evicting over the cap first).
    pub fn get_or_create(&self, conversation_id: Option<&str>) -> String {
        if let Some(id) = conversation_id {
            if self.conversations.contains_key(id) {
                return id.to_string();
            }
        }
        self.enforce_limit();
        let id = conversation_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.conversations
            .insert(id.clone(), Arc::new(Mutex::new(Conversation::new(&id))));
        self.logs.emit(
            LogEvent::info(format!("created conversation {}", id)).source(LogSource::Infrastructure),
        );
        id
    }

    /// Appends a message, summarizing the oldest prefix when the
    /// unsummarized suffix exceeds the threshold.
    pub async fn add_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        metadata: Option<Value>,
        auto_summarize: bool,
    ) -> Result<ConversationMessage, CoreError> {
        let id = self.get_or_create(Some(conversation_id));
        let handle = self
            .conversations
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| CoreError::NotFound(format!("conversation {}", id)))?;

        let (message, needs_summary, snapshot) = {
            let mut conversation = handle.lock().expect("conversation lock poisoned");
            let message = conversation.add_message(role, content, metadata);
            let unsummarized = conversation.messages.len() - conversation.summarized_count;
            let needs_summary =
                auto_summarize && unsummarized > self.cfg.max_messages_before_summary;
            (message, needs_summary, conversation.clone())
        };

        if needs_summary {
            self.summarize(&handle, &snapshot).await;
        }

        let snapshot = handle.lock().expect("conversation lock poisoned").clone();
        self.persist(&snapshot);
        Ok(message)
    }

    async fn summarize(&self, handle: &Arc<Mutex<Conversation>>, snapshot: &Conversation) {
        let keep_count = self.cfg.max_messages_before_summary / 2;
        if snapshot.messages.len() <= keep_count {
            return;
        }
        let boundary = snapshot.messages.len() - keep_count;
        let mut dialog: String = snapshot.messages[..boundary]
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.content))
            .collect::<Vec<_>>()
            .join("\n");
        if let Some(ref previous) = snapshot.summary {
            dialog = format!("Previous summary: {}\n\n{}", previous, dialog);
        }
        let prompt = SUMMARIZATION_PROMPT.replace("{conversation}", &dialog);
        let options = SamplingOptions {
            temperature: 0.1,
            max_tokens: 256,
        };
        match self
            .llm
            .generate(&self.cfg.summarize_model, &prompt, &options)
            .await
        {
            Ok(summary) => {
                let mut conversation = handle.lock().expect("conversation lock poisoned");
                conversation.summary = Some(summary.trim().to_string());
                conversation.summarized_count = conversation.messages.len().saturating_sub(keep_count);
                self.logs.emit(
                    LogEvent::info(format!(
                        "conversation {} summarized ({} messages folded)",
                        conversation.id, conversation.summarized_count
                    ))
                    .source(LogSource::Infrastructure),
                );
            }
            Err(e) => self.logs.emit(
                LogEvent::error(format!("summarization failed: {}", e))
                    .source(LogSource::Infrastructure),
            ),
        }
    }

    /// LLM context for a conversation; empty when unknown.
    pub fn context(&self, conversation_id: &str, max_messages: usize) -> Vec<ChatTurn> {
        match self.conversations.get(conversation_id) {
            Some(handle) => handle
                .lock()
                .expect("conversation lock poisoned")
                .context_for_llm(max_messages),
            None => Vec::new(),
        }
    }

    pub fn snapshot(&self, conversation_id: &str) -> Option<Conversation> {
        self.conversations
            .get(conversation_id)
            .map(|h| h.lock().expect("conversation lock poisoned").clone())
    }

    pub fn delete(&self, conversation_id: &str) -> bool {
        let removed = self.conversations.remove(conversation_id).is_some();
        if removed {
            if let Some(ref dir) = self.cfg.persist_dir {
                let _ = std::fs::remove_file(dir.join(format!("{}.json", conversation_id)));
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    fn updated_at_index(&self) -> Vec<(String, DateTime<Utc>)> {
        self.conversations
            .iter()
            .map(|entry| {
                let updated_at = entry
                    .value()
                    .lock()
                    .expect("conversation lock poisoned")
                    .updated_at;
                (entry.key().clone(), updated_at)
            })
            .collect()
    }

    fn cleanup_expired(&self) -> usize {
        let deadline = Utc::now() - Duration::hours(self.cfg.ttl_hours);
        let expired: Vec<String> = self
            .updated_at_index()
            .into_iter()
            .filter(|(_, updated_at)| *updated_at < deadline)
            .map(|(id, _)| id)
            .collect();
        let count = expired.len();
        for id in expired {
            self.delete(&id);
        }
        if count > 0 {
            self.logs.emit(
                LogEvent::info(format!(
                    "deleted {} conversations past the {}h TTL",
                    count, self.cfg.ttl_hours
                ))
                .source(LogSource::Infrastructure),
            );
        }
        count
    }

    fn enforce_limit(&self) -> usize {
        let over = self
            .conversations
            .len()
            .saturating_sub(self.cfg.max_conversations);
        if over == 0 {
            return 0;
        }
        let mut index = self.updated_at_index();
        index.sort_by_key(|(_, updated_at)| *updated_at);
        let mut removed = 0;
        for (id, _) in index.into_iter().take(over) {
            if self.delete(&id) {
                removed += 1;
            }
        }
        if removed > 0 {
            self.logs.emit(
                LogEvent::info(format!(
                    "deleted {} conversations over the {} cap",
                    removed, self.cfg.max_conversations
                ))
                .source(LogSource::Infrastructure),
            );
        }
        removed
    }

    /// TTL pass followed by the cap pass.
    pub fn cleanup(&self) -> CleanupReport {
        CleanupReport {
            expired: self.cleanup_expired(),
            over_limit: self.enforce_limit(),
        }
    }
}
