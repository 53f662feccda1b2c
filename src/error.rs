/// Failures the chat pipeline can surface to a user.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// No Gemini key configured; the pipeline stops before doing anything.
    #[error("Gemini API key is not configured. Use `/wiki key` to add one.")]
    CredentialRequired,

    /// The generative client was called without a key.
    #[error("Gemini API key is not provided. Please add your API key to use this feature.")]
    MissingCredential,

    /// Transport, status, or payload failure from the generative service.
    /// The message is shown to the user verbatim.
    #[error("{0}")]
    Upstream(String),

    /// The message store could not be read or written.
    #[error("chat history unavailable: {0}")]
    Storage(String),
}

/// Knowledge lookup failures. These never reach the user.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("topic '{0}' is too short for Wikipedia search")]
    TopicTooShort(String),

    #[error("Wikipedia request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Wikipedia API error: {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed Wikipedia response: {0}")]
    Malformed(String),
}
