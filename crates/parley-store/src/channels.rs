//! Ordered channel collection plus the active selection.

use tracing::{debug, warn};

use parley_shared::types::{Channel, ChannelId};

#[derive(Debug, Clone, Default)]
pub struct ChannelStore {
    channels: Vec<Channel>,
    selected: Option<ChannelId>,
}

impl ChannelStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Replace the whole collection with a fresh snapshot.
    ///
    /// The previous selection survives if it is still present; otherwise
    /// selection falls back to the default channel.
    pub fn set_all(&mut self, channels: Vec<Channel>) {
        let mut unique: Vec<Channel> = Vec::with_capacity(channels.len());
        for channel in channels {
            if !unique.iter().any(|c| c.id == channel.id) {
                unique.push(channel);
            }
        }
        self.channels = unique;

        let keep = self
            .selected
            .as_ref()
            .is_some_and(|id| self.position(id).is_some());
        if !keep {
            self.selected = self.default_id();
        }

        debug!(count = self.channels.len(), selected = ?self.selected, "Channel snapshot applied");
    }

    /// Append a channel. Returns `false` if the id is already present.
    pub fn add(&mut self, channel: Channel) -> bool {
        if self.position(&channel.id).is_some() {
            debug!(channel = %channel.id, "Duplicate channel ignored");
            return false;
        }

        debug!(channel = %channel.id, name = %channel.name, "Channel added");
        self.channels.push(channel);
        if self.selected.is_none() {
            self.selected = self.default_id();
        }
        true
    }

    /// Remove a channel, moving the selection to the default channel if the
    /// removed one was selected.
    pub fn remove(&mut self, id: &ChannelId) -> Option<Channel> {
        let index = self.position(id)?;
        let removed = self.channels.remove(index);

        if self.selected.as_ref() == Some(id) {
            self.selected = self.default_id();
            debug!(channel = %id, selected = ?self.selected, "Selected channel removed, fell back to default");
        } else {
            debug!(channel = %id, "Channel removed");
        }

        Some(removed)
    }

    /// Rename a channel and return its previous name.
    ///
    /// An unknown id is logged and ignored; names are validated upstream.
    pub fn rename(&mut self, id: &ChannelId, new_name: impl Into<String>) -> Option<String> {
        let Some(channel) = self.channels.iter_mut().find(|c| &c.id == id) else {
            warn!(channel = %id, "Rename for unknown channel ignored");
            return None;
        };

        let old = std::mem::replace(&mut channel.name, new_name.into());
        debug!(channel = %id, from = %old, to = %channel.name, "Channel renamed");
        Some(old)
    }

    /// Make `id` the active channel. Unknown ids leave the selection as is.
    pub fn select(&mut self, id: &ChannelId) -> bool {
        if self.position(id).is_none() {
            warn!(channel = %id, "Cannot select unknown channel");
            return false;
        }
        self.selected = Some(id.clone());
        true
    }

    /// Drop everything, including the selection.
    pub fn clear(&mut self) {
        self.channels.clear();
        self.selected = None;
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn get(&self, id: &ChannelId) -> Option<&Channel> {
        self.channels.iter().find(|c| &c.id == id)
    }

    /// Find a channel by its display name.
    pub fn find_by_name(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }

    pub fn selected_id(&self) -> Option<&ChannelId> {
        self.selected.as_ref()
    }

    pub fn selected(&self) -> Option<&Channel> {
        self.selected.as_ref().and_then(|id| self.get(id))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn position(&self, id: &ChannelId) -> Option<usize> {
        self.channels.iter().position(|c| &c.id == id)
    }

    fn default_id(&self) -> Option<ChannelId> {
        self.channels.first().map(|c| c.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: &str, name: &str, removable: bool) -> Channel {
        Channel {
            id: ChannelId::from(id),
            name: name.to_string(),
            removable,
        }
    }

    fn seeded() -> ChannelStore {
        let mut store = ChannelStore::new();
        store.set_all(vec![
            channel("1", "general", false),
            channel("2", "random", false),
            channel("3", "memes", true),
        ]);
        store
    }

    #[test]
    fn set_all_selects_first_channel() {
        let store = seeded();
        assert_eq!(store.selected_id(), Some(&ChannelId::from("1")));
    }

    #[test]
    fn duplicate_add_is_ignored() {
        let mut store = ChannelStore::new();
        store.set_all(vec![channel("1", "general", false)]);

        assert!(!store.add(channel("1", "general", false)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.names().filter(|n| *n == "general").count(), 1);
    }

    #[test]
    fn removing_selected_falls_back_to_default() {
        let mut store = seeded();
        assert!(store.select(&ChannelId::from("3")));

        let removed = store.remove(&ChannelId::from("3")).unwrap();
        assert_eq!(removed.name, "memes");
        assert_eq!(store.selected_id(), Some(&ChannelId::from("1")));
        assert!(store.selected().is_some());
    }

    #[test]
    fn removing_default_while_selected_picks_next_first() {
        let mut store = seeded();
        store.remove(&ChannelId::from("1"));
        assert_eq!(store.selected_id(), Some(&ChannelId::from("2")));
    }

    #[test]
    fn removing_unselected_keeps_selection() {
        let mut store = seeded();
        store.select(&ChannelId::from("2"));
        store.remove(&ChannelId::from("3"));
        assert_eq!(store.selected_id(), Some(&ChannelId::from("2")));
    }

    #[test]
    fn removing_last_channel_clears_selection() {
        let mut store = ChannelStore::new();
        store.add(channel("9", "solo", true));
        store.remove(&ChannelId::from("9"));
        assert!(store.selected_id().is_none());
    }

    #[test]
    fn selection_never_dangles_over_removal_sequences() {
        let mut store = seeded();
        for target in ["2", "1", "3"] {
            store.select(&ChannelId::from(target));
            store.remove(&ChannelId::from(target));
            match store.selected_id() {
                Some(id) => assert!(store.get(id).is_some()),
                None => assert!(store.is_empty()),
            }
        }
    }

    #[test]
    fn rename_returns_old_name_and_ignores_unknown() {
        let mut store = seeded();
        let old = store.rename(&ChannelId::from("3"), "dank-memes");
        assert_eq!(old.as_deref(), Some("memes"));
        assert_eq!(store.get(&ChannelId::from("3")).unwrap().name, "dank-memes");

        assert_eq!(store.rename(&ChannelId::from("42"), "ghost"), None);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn select_unknown_is_rejected() {
        let mut store = seeded();
        assert!(!store.select(&ChannelId::from("42")));
        assert_eq!(store.selected_id(), Some(&ChannelId::from("1")));
    }

    #[test]
    fn set_all_keeps_surviving_selection() {
        let mut store = seeded();
        store.select(&ChannelId::from("2"));
        store.set_all(vec![channel("2", "random", false), channel("4", "new", true)]);
        assert_eq!(store.selected_id(), Some(&ChannelId::from("2")));

        store.set_all(vec![channel("4", "new", true)]);
        assert_eq!(store.selected_id(), Some(&ChannelId::from("4")));
    }

    #[test]
    fn add_into_empty_store_selects_it() {
        let mut store = ChannelStore::new();
        store.add(channel("5", "first", true));
        assert_eq!(store.selected_id(), Some(&ChannelId::from("5")));
    }

    #[test]
    fn find_by_name_is_case_sensitive_and_tracks_renames() {
        let mut store = seeded();
        assert_eq!(store.find_by_name("memes").map(|c| c.id.as_str()), Some("3"));
        assert!(store.find_by_name("Memes").is_none());

        store.rename(&ChannelId::from("3"), "dank");
        assert!(store.find_by_name("memes").is_none());
        assert_eq!(store.find_by_name("dank").map(|c| c.id.as_str()), Some("3"));
    }
}
