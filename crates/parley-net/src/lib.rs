// Backend access: the REST client and the push connection.

pub mod api;
pub mod error;
pub mod push;
pub mod socketio;
pub mod transport;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use api::{ChatApi, HttpChatApi};
pub use error::NetError;
pub use push::{ConnectionHandle, ConnectionManager, ConnectionStatus, ReconnectPolicy};
pub use transport::{PushStream, PushTransport, SocketIoTransport};
