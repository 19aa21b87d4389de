use serde::{Deserialize, Deserializer, Serialize};

// The backend has shipped both numeric and string identifiers over time, so
// ids are normalized to their string form on the way in.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum WireId {
        Text(String),
        Number(u64),
    }

    Ok(match WireId::deserialize(deserializer)? {
        WireId::Text(s) => s,
        WireId::Number(n) => n.to_string(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(#[serde(deserialize_with = "string_or_number")] pub String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(#[serde(deserialize_with = "string_or_number")] pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A named message stream users can select and post to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    /// `false` for system-default channels such as `general`.
    #[serde(default)]
    pub removable: bool,
}

/// A single chat message as delivered by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub username: String,
    pub body: String,
    /// Client-side insertion order, assigned by the message store.
    #[serde(skip)]
    pub seq: u64,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        channel_id: impl Into<String>,
        username: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId(id.into()),
            channel_id: ChannelId(channel_id.into()),
            username: username.into(),
            body: body.into(),
            seq: 0,
        }
    }
}

/// An authenticated session. Token acquisition happens elsewhere.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub username: String,
}

impl Session {
    pub fn new(token: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            username: username.into(),
        }
    }
}

// Never print the bearer token.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("username", &self.username)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_id_accepts_numbers_and_strings() {
        let numeric: Channel =
            serde_json::from_str(r#"{"id":1,"name":"general","removable":false}"#).unwrap();
        let text: Channel =
            serde_json::from_str(r#"{"id":"1","name":"general","removable":false}"#).unwrap();
        assert_eq!(numeric, text);
        assert_eq!(numeric.id.as_str(), "1");
    }

    #[test]
    fn message_uses_camel_case_and_skips_seq() {
        let msg: Message = serde_json::from_str(
            r#"{"id":7,"channelId":2,"username":"admin","body":"hi"}"#,
        )
        .unwrap();
        assert_eq!(msg.channel_id, ChannelId::from("2"));
        assert_eq!(msg.seq, 0);

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["channelId"], "2");
        assert!(json.get("seq").is_none());
    }

    #[test]
    fn missing_removable_defaults_to_false() {
        let ch: Channel = serde_json::from_str(r#"{"id":"3","name":"random"}"#).unwrap();
        assert!(!ch.removable);
    }

    #[test]
    fn session_debug_hides_token() {
        let session = Session::new("secret-token", "admin");
        let printed = format!("{session:?}");
        assert!(!printed.contains("secret-token"));
        assert!(printed.contains("admin"));
    }
}
