use serde::Serialize;
use tokio::sync::broadcast;

use parley_shared::types::{ChannelId, MessageId};

use crate::state::{Notice, SyncState};

/// Capacity of the change-notification channel.
pub const EVENT_CAPACITY: usize = 256;

/// Change notifications for the view layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientEvent {
    StateChanged { state: SyncState },
    ChannelsChanged,
    #[serde(rename_all = "camelCase")]
    SelectionChanged { channel_id: Option<ChannelId> },
    #[serde(rename_all = "camelCase")]
    MessageAdded {
        channel_id: ChannelId,
        message_id: MessageId,
        author: String,
    },
    MessagesReset,
    Notice { notice: Notice },
    /// A notice was dismissed.
    NoticesChanged,
    /// The session was rejected; the user must sign in again.
    AuthRequired,
}

pub fn emit_event(tx: &broadcast::Sender<ClientEvent>, event: ClientEvent) {
    if tx.send(event).is_err() {
        tracing::trace!("No view subscribed, event dropped");
    }
}

pub fn emit_all(tx: &broadcast::Sender<ClientEvent>, events: Vec<ClientEvent>) {
    for event in events {
        emit_event(tx, event);
    }
}
