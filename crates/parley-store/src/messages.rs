//! Message collection across all channels, kept in insertion order.

use std::collections::HashSet;

use tracing::debug;

use parley_shared::types::{ChannelId, Message, MessageId};

#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
    next_seq: u64,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the collection with a fetched snapshot, dropping repeated ids
    /// (first occurrence wins).
    pub fn set_all(&mut self, messages: Vec<Message>) {
        self.messages.clear();
        self.ids.clear();
        for message in messages {
            self.add(message);
        }
        debug!(count = self.messages.len(), "Message snapshot applied");
    }

    /// Append a message unless its id is already stored.
    ///
    /// This is the only de-duplication point between a local send and the
    /// server's echo of it.
    pub fn add(&mut self, mut message: Message) -> bool {
        if self.ids.contains(&message.id) {
            debug!(msg_id = %message.id, "Duplicate message ignored");
            return false;
        }

        self.next_seq += 1;
        message.seq = self.next_seq;
        self.ids.insert(message.id.clone());
        self.messages.push(message);
        true
    }

    /// Messages of one channel in insertion order.
    ///
    /// The iterator borrows the store; calling again restarts from the top.
    pub fn by_channel<'a>(
        &'a self,
        channel_id: &'a ChannelId,
    ) -> impl Iterator<Item = &'a Message> + Clone + 'a {
        self.messages
            .iter()
            .filter(move |m| &m.channel_id == channel_id)
    }

    pub fn count_in(&self, channel_id: &ChannelId) -> usize {
        self.by_channel(channel_id).count()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str, channel: &str, body: &str) -> Message {
        Message::new(id, channel, "admin", body)
    }

    #[test]
    fn repeated_adds_never_duplicate() {
        let mut store = MessageStore::new();
        let ids = ["1", "2", "1", "3", "2", "2", "4", "1"];
        for id in ids {
            store.add(msg(id, "1", "body"));
        }

        assert_eq!(store.len(), 4);
        let unique: HashSet<&MessageId> = store.messages.iter().map(|m| &m.id).collect();
        assert_eq!(unique.len(), store.len());
        assert_eq!(store.get(&MessageId::from("1")).unwrap().seq, 1);
    }

    #[test]
    fn local_send_then_echo_yields_one_message() {
        let mut store = MessageStore::new();
        assert!(store.add(msg("10", "1", "hello")));
        assert!(!store.add(msg("10", "1", "hello")));
        assert_eq!(store.count_in(&ChannelId::from("1")), 1);
    }

    #[test]
    fn echo_before_confirmation_yields_one_message() {
        let mut store = MessageStore::new();
        assert!(store.add(msg("11", "1", "race")));
        assert!(!store.add(msg("11", "1", "race")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn by_channel_preserves_order_and_filters() {
        let mut store = MessageStore::new();
        store.add(msg("1", "a", "first"));
        store.add(msg("2", "b", "other"));
        store.add(msg("3", "a", "second"));
        store.add(msg("4", "b", "other again"));
        store.add(msg("5", "a", "third"));

        let channel = ChannelId::from("a");
        let bodies: Vec<&str> = store.by_channel(&channel).map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["first", "second", "third"]);

        let seqs: Vec<u64> = store.by_channel(&channel).map(|m| m.seq).collect();
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn by_channel_is_restartable() {
        let mut store = MessageStore::new();
        store.add(msg("1", "a", "x"));
        store.add(msg("2", "a", "y"));

        let channel = ChannelId::from("a");
        let iter = store.by_channel(&channel);
        let first: Vec<_> = iter.clone().map(|m| m.id.clone()).collect();
        let second: Vec<_> = iter.map(|m| m.id.clone()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn set_all_deduplicates_snapshot() {
        let mut store = MessageStore::new();
        store.add(msg("99", "a", "stale"));
        store.set_all(vec![msg("1", "a", "keep"), msg("1", "a", "drop"), msg("2", "b", "z")]);

        assert_eq!(store.len(), 2);
        assert!(!store.contains(&MessageId::from("99")));
        assert_eq!(store.get(&MessageId::from("1")).unwrap().body, "keep");
    }

    #[test]
    fn unknown_channel_is_empty() {
        let mut store = MessageStore::new();
        store.add(msg("1", "a", "x"));
        assert_eq!(store.count_in(&ChannelId::from("zzz")), 0);
    }
}
