use anyhow::{Context, Result};
use cnidarium::{StateRead, StateWrite};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::history::{ChatStorage, CONFIG_PREFIX};

fn credential_key() -> String {
    format!("{}/credential", CONFIG_PREFIX)
}

/// The Gemini API key: one process-wide value, persisted across restarts.
///
/// Readers take a copy via [`CredentialStore::get`] and hand it to the
/// pipeline explicitly; nothing else reads the key behind the pipeline's back.
pub struct CredentialStore {
    storage: Option<ChatStorage>,
    value: RwLock<String>,
}

impl CredentialStore {
    /// Load the stored key, falling back to `default` (usually `GEMINI_API_KEY`).
    pub async fn load(storage: ChatStorage, default: Option<String>) -> Result<Self> {
        let snapshot = storage.snapshot();
        let stored = snapshot
            .get_raw(&credential_key())
            .await?
            .map(|bytes| String::from_utf8(bytes).context("stored credential is not UTF-8"))
            .transpose()?
            .filter(|k| !k.trim().is_empty());

        let from_storage = stored.is_some();
        let value = stored.or(default).unwrap_or_default();
        info!(
            configured = !value.is_empty(),
            from_storage, "Gemini credential loaded"
        );

        Ok(Self {
            storage: Some(storage),
            value: RwLock::new(value),
        })
    }

    #[cfg(test)]
    pub fn in_memory(value: impl Into<String>) -> Self {
        Self {
            storage: None,
            value: RwLock::new(value.into()),
        }
    }

    pub async fn get(&self) -> String {
        self.value.read().await.clone()
    }

    /// Replace the key. An empty value removes it.
    pub async fn set(&self, key: &str) -> Result<()> {
        let key = key.trim();
        let mut value = self.value.write().await;

        if let Some(storage) = &self.storage {
            storage
                .commit_with(|delta| {
                    if key.is_empty() {
                        delta.delete(credential_key());
                    } else {
                        delta.put_raw(credential_key(), key.as_bytes().to_vec());
                    }
                })
                .await?;
        }

        *value = key.to_string();
        debug!(configured = !key.is_empty(), "Gemini credential updated");
        Ok(())
    }
}

/// Mask a key for display, keeping only the last four characters.
pub fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(8), tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::types::Message;
    use crate::history::{open_storage, ChatHistory, MessageStore};

    #[tokio::test]
    async fn test_set_persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(dir.path()).await.unwrap();

        let store = CredentialStore::load(storage.clone(), None).await.unwrap();
        assert!(store.get().await.is_empty());
        store.set("  AIza-secret  ").await.unwrap();
        assert_eq!(store.get().await, "AIza-secret");

        let reloaded = CredentialStore::load(storage, Some("from-env".to_string()))
            .await
            .unwrap();
        assert_eq!(reloaded.get().await, "AIza-secret");
    }

    #[tokio::test]
    async fn test_env_default_used_when_nothing_stored() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(dir.path()).await.unwrap();
        let store = CredentialStore::load(storage, Some("from-env".to_string()))
            .await
            .unwrap();
        assert_eq!(store.get().await, "from-env");
    }

    #[tokio::test]
    async fn test_set_empty_clears() {
        let store = CredentialStore::in_memory("abc");
        store.set("").await.unwrap();
        assert!(store.get().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_set_alongside_history_writes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open_storage(dir.path()).await.unwrap();
        let store = CredentialStore::load(storage.clone(), None).await.unwrap();
        let chat = ChatHistory::new(storage).conversation("1");

        let writer = tokio::spawn(async move {
            for i in 0..20 {
                chat.append(Message::user(format!("q{}", i))).await?;
            }
            anyhow::Ok(chat.list().await?.len())
        });
        for i in 0..20 {
            store.set(&format!("key-{}", i)).await.unwrap();
        }

        assert_eq!(writer.await.unwrap().unwrap(), 20);
        assert_eq!(store.get().await, "key-19");
    }

    #[test]
    fn test_mask() {
        assert_eq!(mask("AIzaSyABCDEF1234"), "********1234");
        assert_eq!(mask("abc"), "***");
    }
}
