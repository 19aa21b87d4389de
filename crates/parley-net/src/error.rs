use thiserror::Error;

use parley_shared::ChatError;

#[derive(Error, Debug)]
pub enum NetError {
    /// 401 from the backend: the session token is invalid or expired.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Connection closed")]
    Closed,
}

impl NetError {
    pub fn is_auth(&self) -> bool {
        matches!(self, NetError::Unauthorized)
    }
}

impl From<serde_json::Error> for NetError {
    fn from(e: serde_json::Error) -> Self {
        NetError::Decode(e.to_string())
    }
}

impl From<NetError> for ChatError {
    fn from(e: NetError) -> Self {
        match e {
            NetError::Unauthorized => ChatError::Auth,
            other => ChatError::Transient(other.to_string()),
        }
    }
}
