pub mod prompts;
pub mod reply;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::history::types::Message;
use crate::history::MessageStore;
use crate::llm::Generator;
use crate::wiki::types::KnowledgeResult;
use crate::wiki::{KnowledgeSource, MIN_TOPIC_CHARS};

use prompts::{compose, APOLOGY, SYSTEM_DIRECTIVE};
use reply::ModelReply;

/// Summaries containing any of these phrases are "no results" placeholders.
/// Matched literally, anywhere in the summary.
const NO_RESULTS_SENTINELS: &[&str] = &[
    "No Wikipedia results found",
    "too short for Wikipedia search",
];

pub const DEFAULT_MAX_SECTION_CHARS: usize = 2000;

/// What happened to one question.
#[derive(Debug)]
pub enum Outcome {
    /// The model answered; the reply was appended.
    Answered(Message),
    /// Generation failed; the apology (with the error in its metadata) was appended.
    Failed(Message),
    /// The conversation was cleared while the request was in flight; nothing appended.
    Discarded,
}

/// Runs the lookup → compose → generate → parse pipeline for a question.
pub struct Responder {
    knowledge: Arc<dyn KnowledgeSource>,
    generator: Arc<dyn Generator>,
    max_section_chars: usize,
}

impl Responder {
    pub fn new(knowledge: Arc<dyn KnowledgeSource>, generator: Arc<dyn Generator>) -> Self {
        Self {
            knowledge,
            generator,
            max_section_chars: DEFAULT_MAX_SECTION_CHARS,
        }
    }

    pub fn with_max_section_chars(mut self, max_section_chars: usize) -> Self {
        self.max_section_chars = max_section_chars;
        self
    }

    /// Answer `user_text`, recording both turns in `store`.
    ///
    /// Returns `CredentialRequired` without touching the store when no key is
    /// configured. Every other failure is folded into [`Outcome::Failed`].
    pub async fn handle(
        &self,
        user_text: &str,
        credential: &str,
        store: &dyn MessageStore,
    ) -> Result<Outcome, ChatError> {
        if credential.trim().is_empty() {
            return Err(ChatError::CredentialRequired);
        }

        // The generation the question landed in decides whether the reply is stale.
        let (_, generation) = store
            .append(Message::user(user_text))
            .await
            .map_err(storage_error)?;

        let knowledge = self.lookup(user_text).await.filter(is_usable);
        let (context, references) = match knowledge {
            Some(k) => (k.to_context(self.max_section_chars), Some(vec![k.title])),
            None => (String::new(), None),
        };
        info!(
            question_len = user_text.len(),
            with_context = !context.is_empty(),
            "Composing prompt"
        );

        let prompt = compose(SYSTEM_DIRECTIVE, &context, user_text);
        debug!(prompt_len = prompt.len(), "Prompt composed");

        let (message, failed) = match self.generator.generate(&prompt, credential).await {
            Ok(raw) => {
                let reply = ModelReply::parse(&raw);
                debug!(
                    content_len = reply.content.len(),
                    reasoning_len = reply.reasoning.len(),
                    "Reply parsed"
                );
                (
                    Message::assistant(reply.content, Some(reply.reasoning), references),
                    false,
                )
            }
            Err(e) => {
                warn!("Generation failed: {}", e);
                (Message::assistant_error(APOLOGY, e.to_string()), true)
            }
        };

        let stored = store
            .append_if_current(message, generation)
            .await
            .map_err(storage_error)?;
        Ok(match stored {
            Some(message) if failed => Outcome::Failed(message),
            Some(message) => Outcome::Answered(message),
            None => {
                info!("Conversation cleared mid-request, reply discarded");
                Outcome::Discarded
            }
        })
    }

    /// Look the question up, swallowing failures. Short questions are not looked up.
    async fn lookup(&self, user_text: &str) -> Option<KnowledgeResult> {
        if user_text.trim().chars().count() < MIN_TOPIC_CHARS {
            debug!("Question too short for Wikipedia lookup");
            return None;
        }
        match self.knowledge.lookup(user_text).await {
            Ok(result) => Some(result),
            Err(e) => {
                warn!("Wikipedia lookup failed: {}", e);
                None
            }
        }
    }
}

fn is_usable(result: &KnowledgeResult) -> bool {
    !result.summary.is_empty()
        && !NO_RESULTS_SENTINELS
            .iter()
            .any(|s| result.summary.contains(s))
}

fn storage_error(e: anyhow::Error) -> ChatError {
    ChatError::Storage(format!("{:#}", e))
}

/// Tracks conversations with a question in flight, so a channel answers one
/// question at a time.
#[derive(Debug, Default)]
pub struct InFlight {
    active: Arc<Mutex<HashSet<String>>>,
}

/// Releases the conversation when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    active: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`, or `None` if it is already busy.
    pub fn try_begin(&self, key: &str) -> Option<InFlightGuard> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(key.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            active: self.active.clone(),
            key: key.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.key);
    }
}
