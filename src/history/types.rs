use serde::{Deserialize, Serialize};

/// Opaque message ID (truncated blake3 hex digest).
pub type MessageId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    /// Wikipedia article titles the answer drew on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wiki_references: Option<Vec<String>>,
    /// Human-readable failure note shown under the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A chat message. Never mutated after it is appended to a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
    pub created_at: i64,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into(), None, None)
    }

    /// Build an assistant reply. Empty reasoning and empty reference lists are dropped.
    pub fn assistant(
        content: impl Into<String>,
        reasoning: Option<String>,
        wiki_references: Option<Vec<String>>,
    ) -> Self {
        let reasoning = reasoning.filter(|r| !r.trim().is_empty());
        let wiki_references = wiki_references.filter(|refs| !refs.is_empty());
        let metadata = wiki_references.map(|refs| MessageMetadata {
            wiki_references: Some(refs),
            error: None,
        });
        Self::new(Role::Assistant, content.into(), reasoning, metadata)
    }

    /// Assistant message carrying a failure note.
    pub fn assistant_error(content: impl Into<String>, error: impl Into<String>) -> Self {
        let metadata = MessageMetadata {
            wiki_references: None,
            error: Some(error.into()),
        };
        Self::new(Role::Assistant, content.into(), None, Some(metadata))
    }

    fn new(
        role: Role,
        content: String,
        reasoning: Option<String>,
        metadata: Option<MessageMetadata>,
    ) -> Self {
        Self {
            // Assigned by the store on append.
            id: String::new(),
            role,
            content,
            reasoning,
            metadata,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn wiki_references(&self) -> &[String] {
        self.metadata
            .as_ref()
            .and_then(|m| m.wiki_references.as_deref())
            .unwrap_or(&[])
    }

    pub fn error(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.error.as_deref())
    }
}

/// Derive a message ID from its position in a conversation and its content.
pub fn message_id(conversation: &str, generation: u64, seq: u64, message: &Message) -> MessageId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(conversation.as_bytes());
    hasher.update(&generation.to_le_bytes());
    hasher.update(&seq.to_le_bytes());
    hasher.update(&message.created_at.to_le_bytes());
    hasher.update(message.content.as_bytes());
    hasher.finalize().to_hex()[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_has_no_assistant_fields() {
        let msg = Message::user("hello");
        assert_eq!(msg.role, Role::User);
        assert!(msg.reasoning.is_none());
        assert!(msg.metadata.is_none());
    }

    #[test]
    fn test_assistant_drops_empty_reasoning() {
        let msg = Message::assistant("answer", Some("   ".to_string()), None);
        assert!(msg.reasoning.is_none());
        assert!(msg.metadata.is_none());
        assert!(msg.wiki_references().is_empty());
    }

    #[test]
    fn test_assistant_keeps_references() {
        let msg = Message::assistant(
            "answer",
            Some("because".to_string()),
            Some(vec!["Photosynthesis".to_string()]),
        );
        assert_eq!(msg.reasoning.as_deref(), Some("because"));
        assert_eq!(msg.wiki_references(), ["Photosynthesis".to_string()]);
        assert!(msg.error().is_none());
    }

    #[test]
    fn test_metadata_serializes_camel_case() {
        let msg = Message::assistant("a", None, Some(vec!["Rust".to_string()]));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["metadata"]["wikiReferences"][0], "Rust");
        assert!(json.get("reasoning").is_none());
    }

    #[test]
    fn test_message_id_differs_by_position() {
        let msg = Message::user("same");
        let a = message_id("chan", 0, 0, &msg);
        let b = message_id("chan", 0, 1, &msg);
        let c = message_id("chan", 1, 0, &msg);
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
