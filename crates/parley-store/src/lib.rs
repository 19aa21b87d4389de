//! # parley-store
//!
//! In-memory state containers for the chat client.
//!
//! [`ChannelStore`] holds the ordered channel list and the current selection;
//! [`MessageStore`] holds every message across channels in insertion order.
//! Both de-duplicate by identifier, which is what makes a remote echo of a
//! locally performed action harmless. Mutation only happens through the
//! operations defined here.

pub mod channels;
pub mod messages;

pub use channels::ChannelStore;
pub use messages::MessageStore;
