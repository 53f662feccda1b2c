pub mod types;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use cnidarium::{Snapshot, StateDelta, StateRead, StateWrite, Storage};
use futures::StreamExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use types::{message_id, Message};

// Key prefixes (no trailing slashes — cnidarium convention)
pub const MSG_PREFIX: &str = "chat/msg";
pub const CONFIG_PREFIX: &str = "config";

fn conversation_prefix(conversation: &str) -> String {
    format!("{}/{}/", MSG_PREFIX, conversation)
}
fn msg_key(conversation: &str, seq: u64) -> String {
    format!("{}/{}/{:020}", MSG_PREFIX, conversation, seq)
}

/// Open (or create) the on-disk store shared by chat history and settings.
pub async fn open_storage(data_dir: &Path) -> Result<ChatStorage> {
    std::fs::create_dir_all(data_dir)?;
    let prefixes = vec![MSG_PREFIX.to_string(), CONFIG_PREFIX.to_string()];
    let storage = Storage::load(data_dir.to_path_buf(), prefixes)
        .await
        .context("Failed to init cnidarium storage")?;
    Ok(ChatStorage {
        storage,
        write_lock: Arc::new(Mutex::new(())),
    })
}

/// The cnidarium store plus the lock every writer goes through.
///
/// A delta forked from an older version is rejected at commit, so the span
/// from snapshot to commit runs under one process-wide lock.
#[derive(Clone)]
pub struct ChatStorage {
    storage: Storage,
    write_lock: Arc<Mutex<()>>,
}

impl ChatStorage {
    pub fn snapshot(&self) -> Snapshot {
        self.storage.latest_snapshot()
    }

    /// Apply `edit` to a delta over the latest version and commit it.
    pub async fn commit_with<F>(&self, edit: F) -> Result<()>
    where
        F: FnOnce(&mut StateDelta<Snapshot>),
    {
        let _writer = self.write_lock.lock().await;
        let mut delta = StateDelta::new(self.storage.latest_snapshot());
        edit(&mut delta);
        self.storage.commit(delta).await?;
        Ok(())
    }
}

/// Ordered, append-only message collection for one conversation.
///
/// The generation counter increases on every `clear`; an in-flight request
/// captures it up front and appends through [`MessageStore::append_if_current`]
/// so a reply computed before a clear never lands in the cleared history.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// All messages in append order.
    async fn list(&self) -> Result<Vec<Message>>;

    /// Append a message, assigning its ID. Returns the stored message and the
    /// generation it was written under.
    async fn append(&self, message: Message) -> Result<(Message, u64)>;

    /// Append only if no `clear` happened since `generation` was observed.
    /// Returns `None` when the message was discarded as stale.
    async fn append_if_current(&self, message: Message, generation: u64)
        -> Result<Option<Message>>;

    /// Remove every message and bump the generation.
    async fn clear(&self) -> Result<()>;

    async fn generation(&self) -> u64;
}

#[derive(Debug, Default)]
struct ConversationState {
    generation: u64,
    next_seq: u64,
}

/// Persistent chat history keyed by conversation (one per Discord channel).
pub struct ChatHistory {
    storage: ChatStorage,
    /// Per-conversation counters, loaded lazily from storage on first use.
    states: RwLock<HashMap<String, Arc<Mutex<ConversationState>>>>,
}

impl ChatHistory {
    pub fn new(storage: ChatStorage) -> Arc<Self> {
        Arc::new(Self {
            storage,
            states: RwLock::new(HashMap::new()),
        })
    }

    /// Handle to a single conversation's history.
    pub fn conversation(self: &Arc<Self>, key: impl Into<String>) -> Conversation {
        Conversation {
            history: self.clone(),
            key: key.into(),
        }
    }

    async fn state(&self, conversation: &str) -> Result<Arc<Mutex<ConversationState>>> {
        {
            let states = self.states.read().await;
            if let Some(state) = states.get(conversation) {
                return Ok(state.clone());
            }
        }

        // Resume the sequence after whatever is already on disk.
        let next_seq = self
            .read_raw(conversation)
            .await?
            .last()
            .map(|(seq, _)| seq + 1)
            .unwrap_or(0);

        let mut states = self.states.write().await;
        let state = states
            .entry(conversation.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(ConversationState {
                    generation: 0,
                    next_seq,
                }))
            })
            .clone();
        Ok(state)
    }

    /// Read a conversation's entries as `(seq, message)`, sorted by sequence.
    async fn read_raw(&self, conversation: &str) -> Result<Vec<(u64, Message)>> {
        let snapshot = self.storage.snapshot();
        let prefix = conversation_prefix(conversation);
        let mut stream = snapshot.prefix_raw(&prefix);
        let mut results = Vec::new();

        while let Some(entry) = stream.next().await {
            match entry {
                Ok((key, value)) => {
                    // Key format: "chat/msg/{conversation}/{seq}"
                    let Some(seq) = key
                        .strip_prefix(&prefix)
                        .and_then(|s| s.parse::<u64>().ok())
                    else {
                        warn!(key, "Skipping unrecognized history key");
                        continue;
                    };
                    match serde_json::from_slice::<Message>(&value) {
                        Ok(message) => results.push((seq, message)),
                        Err(e) => warn!(key, "Failed to decode message: {}", e),
                    }
                }
                Err(e) => {
                    warn!("Error reading history stream: {}", e);
                }
            }
        }

        results.sort_by_key(|(seq, _)| *seq);
        Ok(results)
    }

    async fn write(
        &self,
        conversation: &str,
        state: &mut ConversationState,
        mut message: Message,
    ) -> Result<Message> {
        let seq = state.next_seq;
        message.id = message_id(conversation, state.generation, seq, &message);

        let key = msg_key(conversation, seq);
        let value = serde_json::to_vec(&message).context("serialize message")?;
        self.storage
            .commit_with(|delta| delta.put_raw(key, value))
            .await?;

        state.next_seq += 1;
        debug!(
            conversation,
            seq,
            id = %message.id,
            role = ?message.role,
            "message appended"
        );
        Ok(message)
    }
}

/// One conversation inside a [`ChatHistory`].
#[derive(Clone)]
pub struct Conversation {
    history: Arc<ChatHistory>,
    key: String,
}

impl Conversation {
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl MessageStore for Conversation {
    async fn list(&self) -> Result<Vec<Message>> {
        Ok(self
            .history
            .read_raw(&self.key)
            .await?
            .into_iter()
            .map(|(_, message)| message)
            .collect())
    }

    async fn append(&self, message: Message) -> Result<(Message, u64)> {
        let state = self.history.state(&self.key).await?;
        let mut state = state.lock().await;
        let message = self.history.write(&self.key, &mut state, message).await?;
        Ok((message, state.generation))
    }

    async fn append_if_current(
        &self,
        message: Message,
        generation: u64,
    ) -> Result<Option<Message>> {
        let state = self.history.state(&self.key).await?;
        let mut state = state.lock().await;
        if state.generation != generation {
            debug!(
                conversation = %self.key,
                expected = generation,
                current = state.generation,
                "stale message discarded"
            );
            return Ok(None);
        }
        self.history.write(&self.key, &mut state, message).await.map(Some)
    }

    async fn clear(&self) -> Result<()> {
        let state = self.history.state(&self.key).await?;
        let mut state = state.lock().await;

        let entries = self.history.read_raw(&self.key).await?;
        self.history
            .storage
            .commit_with(|delta| {
                for (seq, _) in &entries {
                    delta.delete(msg_key(&self.key, *seq));
                }
            })
            .await?;

        state.generation += 1;
        debug!(
            conversation = %self.key,
            removed = entries.len(),
            generation = state.generation,
            "history cleared"
        );
        Ok(())
    }

    async fn generation(&self) -> u64 {
        match self.history.state(&self.key).await {
            Ok(state) => state.lock().await.generation,
            Err(e) => {
                warn!(conversation = %self.key, "Failed to load history state: {}", e);
                0
            }
        }
    }
}

#[cfg(test)]
#[derive(Debug, Default)]
struct MemoryState {
    messages: Vec<Message>,
    generation: u64,
    next_seq: u64,
}

/// Volatile store for exercising the pipeline without disk.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(state: &mut MemoryState, mut message: Message) -> Message {
        message.id = message_id("memory", state.generation, state.next_seq, &message);
        state.next_seq += 1;
        state.messages.push(message.clone());
        message
    }
}

#[cfg(test)]
#[async_trait]
impl MessageStore for MemoryStore {
    async fn list(&self) -> Result<Vec<Message>> {
        Ok(self.state.lock().await.messages.clone())
    }

    async fn append(&self, message: Message) -> Result<(Message, u64)> {
        let mut state = self.state.lock().await;
        let message = Self::push(&mut state, message);
        Ok((message, state.generation))
    }

    async fn append_if_current(
        &self,
        message: Message,
        generation: u64,
    ) -> Result<Option<Message>> {
        let mut state = self.state.lock().await;
        if state.generation != generation {
            return Ok(None);
        }
        Ok(Some(Self::push(&mut state, message)))
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.messages.clear();
        state.generation += 1;
        Ok(())
    }

    async fn generation(&self) -> u64 {
        self.state.lock().await.generation
    }
}
