use thiserror::Error;

use crate::types::ChannelId;

#[derive(Error, Debug)]
pub enum ChatError {
    /// The session token was rejected; the user must re-authenticate.
    #[error("Session is no longer valid")]
    Auth,

    /// Network or server failure. Surfaced as a dismissible notice.
    #[error("Network error: {0}")]
    Transient(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Client is not live (state: {0})")]
    NotLive(String),

    #[error("No channel is selected")]
    NoActiveChannel,

    #[error("Channel not found: {0}")]
    ChannelNotFound(ChannelId),

    #[error("Channel cannot be removed or renamed: {0}")]
    NotRemovable(ChannelId),

    /// The session changed while a request was in flight.
    #[error("Response discarded: session was superseded")]
    StaleSession,

    #[error("Lock poisoned")]
    LockPoisoned,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Value is required")]
    Empty,

    #[error("Must be at least {min} characters")]
    TooShort { min: usize },

    #[error("Must be at most {max} characters")]
    TooLong { max: usize },

    #[error("Channel name is already taken")]
    Duplicate,
}

impl ChatError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ChatError::Auth)
    }
}
