use thiserror::Error;

#[derive(Error, Debug)]
pub enum TriageError {
    /// The inference capability errored or timed out. Never retried here.
    #[error("Inference failed: {0}")]
    InferenceFailure(String),

    /// The assessment store rejected or failed a read or write.
    #[error("Persistence failed: {0}")]
    PersistenceFailure(String),

    #[error("Conversation already finished")]
    ConversationFinished,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for TriageError {
    fn from(err: sqlx::Error) -> Self {
        TriageError::PersistenceFailure(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TriageError>;
