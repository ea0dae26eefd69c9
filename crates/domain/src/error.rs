use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid event id '{0}'")]
    InvalidEventId(String),
    #[error("invalid comment id '{0}'")]
    InvalidCommentId(String),
    #[error("invalid user id '{0}'")]
    InvalidUserId(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("event '{0}' not found")]
    EventNotFound(String),
    #[error("comment '{0}' not found")]
    CommentNotFound(String),
    #[error("parent comment '{0}' not found")]
    ParentNotFound(String),
    #[error("user '{0}' not found")]
    UserNotFound(String),
    #[error("comment '{0}' belongs to another user")]
    NotOwner(String),
    #[error("conflict")]
    Conflict,
    #[error("storage failure: {0}")]
    Storage(String),
}

impl DomainError {
    /// Conflict is the only kind a caller may retry; everything else is
    /// terminal for the request that produced it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DomainError::Conflict)
    }
}
