//! Client state shared between the controller and its push handlers.
//!
//! [`ClientState`] lives behind `Arc<Mutex<>>`. The lock is taken briefly to
//! read or apply; it is never held across an `.await`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use parley_net::ConnectionHandle;
use parley_shared::types::Session;
use parley_store::{ChannelStore, MessageStore};

/// Session lifecycle as seen by the synchronization controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Disconnected,
    Syncing,
    Live,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncState::Disconnected => "disconnected",
            SyncState::Syncing => "syncing",
            SyncState::Live => "live",
        };
        f.write_str(s)
    }
}

/// Captured before a request is awaited; the response is applied only if
/// the ticket still matches the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTicket {
    pub token: String,
    pub username: String,
    pub generation: u64,
}

/// A dismissible notice: transient failures and rename confirmations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub id: Uuid,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

impl Notice {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            message: message.into(),
            raised_at: Utc::now(),
        }
    }
}

pub struct ClientState {
    pub sync: SyncState,

    /// `None` outside of a session.
    pub session: Option<Session>,

    /// Bumped on every session start and teardown.
    pub generation: u64,

    pub channels: ChannelStore,
    pub messages: MessageStore,

    /// Handle of the push connection while `Live`.
    pub connection: Option<ConnectionHandle>,

    pub notices: Vec<Notice>,
}

impl ClientState {
    pub fn new() -> Self {
        Self {
            sync: SyncState::Disconnected,
            session: None,
            generation: 0,
            channels: ChannelStore::new(),
            messages: MessageStore::new(),
            connection: None,
            notices: Vec::new(),
        }
    }

    pub fn ticket(&self) -> Option<SessionTicket> {
        self.session.as_ref().map(|s| SessionTicket {
            token: s.token.clone(),
            username: s.username.clone(),
            generation: self.generation,
        })
    }

    /// Whether `ticket` still describes the current session.
    pub fn holds(&self, ticket: &SessionTicket) -> bool {
        self.generation == ticket.generation
            && self
                .session
                .as_ref()
                .is_some_and(|s| s.token == ticket.token)
    }

    pub fn username(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.username.as_str())
    }
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}
