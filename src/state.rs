use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::chat::{InFlight, Responder};
use crate::credential::CredentialStore;
use crate::history::{ChatHistory, Conversation};

/// Chat settings users can change at runtime.
pub struct ChatSettings {
    /// Include the model's reasoning trace under answers.
    pub show_reasoning: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            show_reasoning: true,
        }
    }
}

pub struct AppState {
    pub history: Arc<ChatHistory>,
    pub credential: Arc<CredentialStore>,
    pub responder: Arc<Responder>,
    pub in_flight: InFlight,
    pub admin_ids: HashSet<u64>,
    pub settings: Arc<RwLock<ChatSettings>>,
}

impl AppState {
    /// Anyone may manage the key when no admins are configured.
    pub fn is_admin(&self, user_id: u64) -> bool {
        admin_allowed(&self.admin_ids, user_id)
    }

    /// Each channel is its own conversation.
    pub fn conversation(&self, channel_id: u64) -> Conversation {
        self.history.conversation(channel_id.to_string())
    }
}

/// An empty admin list leaves key management open to everyone; `main` warns
/// about that at startup.
fn admin_allowed(admin_ids: &HashSet<u64>, user_id: u64) -> bool {
    admin_ids.is_empty() || admin_ids.contains(&user_id)
}

pub type Context<'a> = poise::Context<'a, AppState, anyhow::Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_list_restricts_when_set() {
        let admins = HashSet::from([7u64]);
        assert!(admin_allowed(&admins, 7));
        assert!(!admin_allowed(&admins, 8));
        assert!(admin_allowed(&HashSet::new(), 8));
    }
}
