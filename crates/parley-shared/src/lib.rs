//! Domain types, the push event contract and the error taxonomy shared by
//! every Parley crate.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;
pub mod validation;

pub use error::{ChatError, ValidationError};
pub use protocol::{PushEvent, PushEventKind};
pub use types::{Channel, ChannelId, Message, MessageId, Session};
