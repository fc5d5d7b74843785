use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deskpilot_core::{Conversation, ConversationMessage, ConversationStore, Error, Paths, Result, Role};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_TITLE: &str = "New Chat";
const AUTO_TITLE_CHARS: usize = 60;

const METADATA_TYPE: &str = "metadata";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Metadata {
    #[serde(rename = "_type")]
    kind: String,
    id: String,
    title: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// One JSONL file per conversation: a metadata line, then one line per
/// message. Messages are appended; the file is rewritten only when the
/// title changes.
pub struct JsonlConversationStore {
    paths: Paths,
    cache: RwLock<HashMap<String, Conversation>>,
}

impl JsonlConversationStore {
    pub fn open(paths: Paths) -> Result<Self> {
        let dir = paths.conversations_dir();
        let mut cache = HashMap::new();
        if dir.exists() {
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                    continue;
                }
                match load_file(&path) {
                    Ok(Some(conv)) => {
                        cache.insert(conv.id.clone(), conv);
                    }
                    Ok(None) => debug!(path = %path.display(), "Conversation file has no metadata, skipping"),
                    Err(e) => debug!(path = %path.display(), error = %e, "Failed to load conversation"),
                }
            }
        }
        debug!(count = cache.len(), "Conversations loaded");
        Ok(Self {
            paths,
            cache: RwLock::new(cache),
        })
    }

    fn rewrite(&self, conv: &Conversation) -> Result<()> {
        let path = self.paths.conversation_file(&conv.id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&path)?;
        let meta = Metadata {
            kind: METADATA_TYPE.to_string(),
            id: conv.id.clone(),
            title: conv.title.clone(),
            created_at: conv.created_at,
            updated_at: conv.updated_at,
        };
        writeln!(file, "{}", serde_json::to_string(&meta)?)?;
        for msg in &conv.messages {
            writeln!(file, "{}", serde_json::to_string(msg)?)?;
        }
        Ok(())
    }

    fn append(&self, conversation_id: &str, message: &ConversationMessage) -> Result<()> {
        let path = self.paths.conversation_file(conversation_id);
        let mut file = OpenOptions::new().append(true).open(&path)?;
        writeln!(file, "{}", serde_json::to_string(message)?)?;
        Ok(())
    }

    fn sorted(mut convs: Vec<Conversation>) -> Vec<Conversation> {
        convs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        convs
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Conversation>> {
        self.cache.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Conversation>> {
        self.cache.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn load_file(path: &std::path::Path) -> Result<Option<Conversation>> {
    let reader = BufReader::new(File::open(path)?);
    let mut conv: Option<Conversation> = None;

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "Failed to parse conversation line, skipping");
                continue;
            }
        };
        if value.get("_type").and_then(|t| t.as_str()) == Some(METADATA_TYPE) {
            let meta: Metadata = serde_json::from_value(value)?;
            conv = Some(Conversation {
                id: meta.id,
                title: meta.title,
                created_at: meta.created_at,
                updated_at: meta.updated_at,
                messages: Vec::new(),
            });
            continue;
        }
        match (conv.as_mut(), serde_json::from_value::<ConversationMessage>(value)) {
            (Some(conv), Ok(msg)) => {
                conv.updated_at = conv.updated_at.max(msg.timestamp);
                conv.messages.push(msg);
            }
            (None, _) => {}
            (_, Err(e)) => debug!(error = %e, "Skipping malformed message line"),
        }
    }
    Ok(conv)
}

fn auto_title(content: &str) -> String {
    let mut title: String = content.chars().take(AUTO_TITLE_CHARS).collect();
    if content.chars().count() > AUTO_TITLE_CHARS {
        title.push_str("...");
    }
    title
}

#[async_trait]
impl ConversationStore for JsonlConversationStore {
    async fn create(&self, title: Option<String>) -> Result<Conversation> {
        let now = Utc::now();
        let conv = Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            title: title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        };
        self.rewrite(&conv)?;
        self.write().insert(conv.id.clone(), conv.clone());
        Ok(conv)
    }

    async fn get(&self, id: &str) -> Result<Option<Conversation>> {
        Ok(self.read().get(id).cloned())
    }

    async fn all(&self) -> Result<Vec<Conversation>> {
        Ok(Self::sorted(self.read().values().cloned().collect()))
    }

    async fn update_title(&self, id: &str, title: &str) -> Result<()> {
        let updated = {
            let mut cache = self.write();
            let conv = cache
                .get_mut(id)
                .ok_or_else(|| Error::NotFound(format!("conversation {}", id)))?;
            conv.title = title.to_string();
            conv.updated_at = Utc::now();
            conv.clone()
        };
        self.rewrite(&updated)
    }

    /// The first user message of an untitled conversation becomes its title.
    async fn add_message(&self, conversation_id: &str, message: ConversationMessage) -> Result<()> {
        let retitled = {
            let mut cache = self.write();
            let conv = cache
                .get_mut(conversation_id)
                .ok_or_else(|| Error::NotFound(format!("conversation {}", conversation_id)))?;
            conv.updated_at = conv.updated_at.max(message.timestamp);
            conv.messages.push(message.clone());
            let retitle = conv.title == DEFAULT_TITLE && message.role == Role::User && conv.messages.len() == 1;
            if retitle {
                conv.title = auto_title(&message.content);
            }
            retitle.then(|| conv.clone())
        };
        match retitled {
            Some(conv) => self.rewrite(&conv),
            None => self.append(conversation_id, &message),
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<Conversation>> {
        let q = query.to_lowercase();
        let hits = self
            .read()
            .values()
            .filter(|c| {
                c.title.to_lowercase().contains(&q)
                    || c.messages.iter().any(|m| m.content.to_lowercase().contains(&q))
            })
            .cloned()
            .collect();
        Ok(Self::sorted(hits))
    }
}
