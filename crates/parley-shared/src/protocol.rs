//! Push event contract and HTTP request bodies.

use serde::{Deserialize, Serialize};

use crate::constants::{
    EVENT_NEW_CHANNEL, EVENT_NEW_MESSAGE, EVENT_REMOVE_CHANNEL, EVENT_RENAME_CHANNEL,
};
use crate::types::{Channel, ChannelId, Message};

/// The four server-initiated events a session subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushEventKind {
    NewMessage,
    NewChannel,
    RemoveChannel,
    RenameChannel,
}

impl PushEventKind {
    pub const ALL: [PushEventKind; 4] = [
        PushEventKind::NewMessage,
        PushEventKind::NewChannel,
        PushEventKind::RemoveChannel,
        PushEventKind::RenameChannel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PushEventKind::NewMessage => EVENT_NEW_MESSAGE,
            PushEventKind::NewChannel => EVENT_NEW_CHANNEL,
            PushEventKind::RemoveChannel => EVENT_REMOVE_CHANNEL,
            PushEventKind::RenameChannel => EVENT_RENAME_CHANNEL,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            EVENT_NEW_MESSAGE => Some(PushEventKind::NewMessage),
            EVENT_NEW_CHANNEL => Some(PushEventKind::NewChannel),
            EVENT_REMOVE_CHANNEL => Some(PushEventKind::RemoveChannel),
            EVENT_RENAME_CHANNEL => Some(PushEventKind::RenameChannel),
            _ => None,
        }
    }
}

impl std::fmt::Display for PushEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `removeChannel` only carries the identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemovedChannel {
    pub id: ChannelId,
}

/// A decoded push event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    NewMessage(Message),
    NewChannel(Channel),
    RemoveChannel(ChannelId),
    RenameChannel(Channel),
}

impl PushEvent {
    pub fn kind(&self) -> PushEventKind {
        match self {
            PushEvent::NewMessage(_) => PushEventKind::NewMessage,
            PushEvent::NewChannel(_) => PushEventKind::NewChannel,
            PushEvent::RemoveChannel(_) => PushEventKind::RemoveChannel,
            PushEvent::RenameChannel(_) => PushEventKind::RenameChannel,
        }
    }

    /// Decode a named event with its JSON payload.
    ///
    /// Returns `Ok(None)` for event names this client does not subscribe to.
    pub fn decode(name: &str, payload: serde_json::Value) -> serde_json::Result<Option<Self>> {
        let Some(kind) = PushEventKind::from_name(name) else {
            return Ok(None);
        };

        let event = match kind {
            PushEventKind::NewMessage => PushEvent::NewMessage(serde_json::from_value(payload)?),
            PushEventKind::NewChannel => PushEvent::NewChannel(serde_json::from_value(payload)?),
            PushEventKind::RemoveChannel => {
                let removed: RemovedChannel = serde_json::from_value(payload)?;
                PushEvent::RemoveChannel(removed.id)
            }
            PushEventKind::RenameChannel => {
                PushEvent::RenameChannel(serde_json::from_value(payload)?)
            }
        };

        Ok(Some(event))
    }
}

/// Body of `POST /messages`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessageRequest<'a> {
    pub body: &'a str,
    pub channel_id: &'a ChannelId,
    pub username: &'a str,
}

/// Body of `POST /channels` and `PATCH /channels/:id`.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelNameRequest<'a> {
    pub name: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_each_subscribed_event() {
        let msg = PushEvent::decode(
            "newMessage",
            json!({"id": "5", "channelId": "1", "username": "bob", "body": "yo"}),
        )
        .unwrap()
        .unwrap();
        assert_eq!(msg.kind(), PushEventKind::NewMessage);

        let removed = PushEvent::decode("removeChannel", json!({"id": 4}))
            .unwrap()
            .unwrap();
        assert_eq!(removed, PushEvent::RemoveChannel(ChannelId::from("4")));

        let renamed = PushEvent::decode(
            "renameChannel",
            json!({"id": 4, "name": "memes", "removable": true}),
        )
        .unwrap()
        .unwrap();
        assert_eq!(renamed.kind(), PushEventKind::RenameChannel);
    }

    #[test]
    fn unknown_event_is_ignored() {
        assert_eq!(PushEvent::decode("typing", json!({})).unwrap(), None);
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(PushEvent::decode("newChannel", json!({"name": "no-id"})).is_err());
    }

    #[test]
    fn event_names_round_trip() {
        for kind in PushEventKind::ALL {
            assert_eq!(PushEventKind::from_name(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn message_request_shape() {
        let channel = ChannelId::from("1");
        let body = serde_json::to_value(NewMessageRequest {
            body: "hello",
            channel_id: &channel,
            username: "admin",
        })
        .unwrap();
        assert_eq!(body, json!({"body": "hello", "channelId": "1", "username": "admin"}));
    }
}
