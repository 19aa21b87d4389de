/// Application name
pub const APP_NAME: &str = "Parley";

/// Default REST API base URL (no trailing slash)
pub const DEFAULT_API_URL: &str = "http://localhost:5001/api/v1";

/// Default socket.io endpoint (Engine.IO v4 over WebSocket)
pub const DEFAULT_PUSH_URL: &str = "ws://localhost:5001/socket.io/?EIO=4&transport=websocket";

/// Channel name bounds, counted in characters after trimming
pub const CHANNEL_NAME_MIN_LEN: usize = 3;
pub const CHANNEL_NAME_MAX_LEN: usize = 20;

/// Push event names as sent by the backend
pub const EVENT_NEW_MESSAGE: &str = "newMessage";
pub const EVENT_NEW_CHANNEL: &str = "newChannel";
pub const EVENT_REMOVE_CHANNEL: &str = "removeChannel";
pub const EVENT_RENAME_CHANNEL: &str = "renameChannel";

/// HTTP request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Push reconnect backoff bounds in milliseconds
pub const DEFAULT_RECONNECT_INITIAL_MS: u64 = 500;
pub const DEFAULT_RECONNECT_MAX_MS: u64 = 30_000;

/// Distance from the bottom (in pixels) still counted as "at bottom"
pub const DEFAULT_SCROLL_THRESHOLD_PX: f64 = 8.0;
