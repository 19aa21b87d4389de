//! Synchronization controller.
//!
//! Drives the session lifecycle (`Disconnected` → `Syncing` → `Live`),
//! applies backend responses and push events to the stores, and dispatches
//! user intents as backend requests.
//!
//! Reconciliation between a local action and its echo is left entirely to
//! the stores' identifier de-duplication. Every request snapshots a
//! [`SessionTicket`] before awaiting and its response is dropped if the
//! session changed in the meantime.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use parley_net::{ChatApi, ConnectionManager, ConnectionStatus, NetError, PushTransport};
use parley_shared::protocol::{PushEvent, PushEventKind};
use parley_shared::types::{Channel, ChannelId, Message, Session};
use parley_shared::validation::{validate_channel_name, validate_message_body};
use parley_shared::ChatError;

use crate::config::ClientConfig;
use crate::events::{emit_all, emit_event, ClientEvent, EVENT_CAPACITY};
use crate::state::{ClientState, Notice, SessionTicket, SyncState};

struct Inner {
    state: Arc<Mutex<ClientState>>,
    api: Arc<dyn ChatApi>,
    connection: ConnectionManager,
    events: broadcast::Sender<ClientEvent>,
    filter_own_echoes: bool,
}

/// Cheap to clone; all clones drive the same session.
#[derive(Clone)]
pub struct SyncController {
    inner: Arc<Inner>,
}

impl SyncController {
    pub fn new(
        api: Arc<dyn ChatApi>,
        transport: Arc<dyn PushTransport>,
        config: &ClientConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                state: Arc::new(Mutex::new(ClientState::new())),
                api,
                connection: ConnectionManager::new(transport, config.reconnect_policy()),
                events,
                filter_own_echoes: config.filter_own_echoes,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Establish (or renew) a session and run the initial sync.
    ///
    /// A renewal tears down the previous session's connection and state
    /// first. On a transient failure the controller stays in `Syncing`.
    pub async fn start_session(&self, session: Session) -> Result<(), ChatError> {
        info!(user = %session.username, "Starting session");
        let mut events = Vec::new();
        let ticket = {
            let mut st = self.lock()?;
            self.leave_live(&mut st);
            st.generation += 1;
            st.session = Some(session);
            st.channels.clear();
            st.messages.clear();
            st.notices.clear();
            st.sync = SyncState::Syncing;
            events.push(ClientEvent::MessagesReset);
            events.push(ClientEvent::ChannelsChanged);
            events.push(ClientEvent::StateChanged {
                state: SyncState::Syncing,
            });
            st.ticket().ok_or(ChatError::StaleSession)?
        };
        emit_all(&self.inner.events, events);

        self.initial_sync(ticket).await
    }

    /// Re-run the initial fetch for the current session.
    pub async fn resync(&self) -> Result<(), ChatError> {
        let ticket = {
            let mut st = self.lock()?;
            if st.sync == SyncState::Disconnected {
                return Err(ChatError::NotLive(st.sync.to_string()));
            }
            self.leave_live(&mut st);
            st.sync = SyncState::Syncing;
            st.ticket().ok_or(ChatError::StaleSession)?
        };
        emit_event(
            &self.inner.events,
            ClientEvent::StateChanged {
                state: SyncState::Syncing,
            },
        );

        self.initial_sync(ticket).await
    }

    /// End the session: unbind push handlers, close the connection and
    /// invalidate all local state.
    pub fn logout(&self) -> Result<(), ChatError> {
        let events = {
            let mut st = self.lock()?;
            if st.session.is_none() && st.sync == SyncState::Disconnected {
                return Ok(());
            }
            self.invalidate(&mut st)
        };
        emit_all(&self.inner.events, events);
        info!("Logged out");
        Ok(())
    }

    async fn initial_sync(&self, ticket: SessionTicket) -> Result<(), ChatError> {
        debug!(generation = ticket.generation, "Fetching channels and messages");
        let fetched = tokio::try_join!(
            self.inner.api.fetch_channels(&ticket.token),
            self.inner.api.fetch_messages(&ticket.token),
        );

        let (channels, messages) = match fetched {
            Ok(snapshot) => snapshot,
            Err(e) => return Err(self.handle_failure(&ticket, e, "initial sync")),
        };

        let events = {
            let mut st = self.lock()?;
            if !st.holds(&ticket) {
                debug!(generation = ticket.generation, "Discarding stale sync response");
                return Err(ChatError::StaleSession);
            }
            if st.sync == SyncState::Live {
                // An overlapping sync for this session already went live.
                debug!(generation = ticket.generation, "Session already live, dropping duplicate sync");
                return Ok(());
            }

            st.channels.set_all(channels);
            st.messages.set_all(messages);
            st.sync = SyncState::Live;
            self.bind_push_handlers(&ticket);
            let handle = self.inner.connection.connect(&ticket.token);
            debug!(connection = handle.generation(), "Push connection bound to session");
            st.connection = Some(handle);

            info!(
                channels = st.channels.len(),
                messages = st.messages.len(),
                "Session live"
            );

            vec![
                ClientEvent::ChannelsChanged,
                ClientEvent::MessagesReset,
                ClientEvent::SelectionChanged {
                    channel_id: st.channels.selected_id().cloned(),
                },
                ClientEvent::StateChanged {
                    state: SyncState::Live,
                },
            ]
        };
        emit_all(&self.inner.events, events);
        Ok(())
    }

    /// Unbind handlers and close the connection if currently `Live`.
    fn leave_live(&self, st: &mut ClientState) {
        self.inner.connection.off_all();
        if let Some(handle) = st.connection.take() {
            self.inner.connection.disconnect(handle);
        }
    }

    fn invalidate(&self, st: &mut ClientState) -> Vec<ClientEvent> {
        self.leave_live(st);
        st.session = None;
        st.generation += 1;
        st.channels.clear();
        st.messages.clear();
        st.notices.clear();
        st.sync = SyncState::Disconnected;
        vec![
            ClientEvent::MessagesReset,
            ClientEvent::ChannelsChanged,
            ClientEvent::StateChanged {
                state: SyncState::Disconnected,
            },
        ]
    }

    /// Map a backend failure: auth failures end the session, anything else
    /// becomes a dismissible notice.
    fn handle_failure(&self, ticket: &SessionTicket, err: NetError, action: &str) -> ChatError {
        let mut st = match self.lock() {
            Ok(st) => st,
            Err(e) => return e,
        };
        if !st.holds(ticket) {
            debug!(action, error = %err, "Ignoring failure for superseded session");
            return ChatError::StaleSession;
        }

        if err.is_auth() {
            warn!(action, "Session rejected by backend, re-authentication required");
            let mut events = self.invalidate(&mut st);
            drop(st);
            events.push(ClientEvent::AuthRequired);
            emit_all(&self.inner.events, events);
            return ChatError::Auth;
        }

        warn!(action, error = %err, "Backend request failed");
        let notice = Notice::new(format!("Failed to {action}: {err}"));
        st.notices.push(notice.clone());
        drop(st);
        emit_event(&self.inner.events, ClientEvent::Notice { notice });
        ChatError::from(err)
    }

    // ------------------------------------------------------------------
    // Push events
    // ------------------------------------------------------------------

    fn bind_push_handlers(&self, ticket: &SessionTicket) {
        for kind in PushEventKind::ALL {
            let state = self.inner.state.clone();
            let events = self.inner.events.clone();
            let ticket = ticket.clone();
            let filter_own = self.inner.filter_own_echoes;
            self.inner.connection.on(kind, move |event| {
                let emitted = apply_push(&state, &ticket, filter_own, event);
                emit_all(&events, emitted);
            });
        }
        debug!(generation = ticket.generation, "Push handlers bound");
    }

    // ------------------------------------------------------------------
    // Intents
    // ------------------------------------------------------------------

    /// Post a message to the active channel.
    ///
    /// The message is added once the backend confirms it; if the echo got
    /// there first the add is a no-op.
    pub async fn send_message(&self, text: &str) -> Result<Message, ChatError> {
        let body = validate_message_body(text)?;
        let (ticket, channel_id) = {
            let st = self.lock()?;
            let ticket = require_live(&st)?;
            let channel_id = st
                .channels
                .selected_id()
                .cloned()
                .ok_or(ChatError::NoActiveChannel)?;
            (ticket, channel_id)
        };

        let result = self
            .inner
            .api
            .send_message(&ticket.token, &channel_id, &ticket.username, &body)
            .await;
        let message = match result {
            Ok(message) => message,
            Err(e) => return Err(self.handle_failure(&ticket, e, "send message")),
        };

        let (stored, added) = {
            let mut st = self.lock()?;
            if !st.holds(&ticket) {
                return Err(ChatError::StaleSession);
            }
            let id = message.id.clone();
            let added = st.messages.add(message.clone());
            (st.messages.get(&id).cloned().unwrap_or(message), added)
        };

        if added {
            emit_event(
                &self.inner.events,
                ClientEvent::MessageAdded {
                    channel_id: stored.channel_id.clone(),
                    message_id: stored.id.clone(),
                    author: stored.username.clone(),
                },
            );
        }
        info!(msg_id = %stored.id, channel = %channel_id, echoed_first = !added, "Message sent");
        Ok(stored)
    }

    /// Create a channel and make it the active one.
    pub async fn create_channel(&self, name: &str) -> Result<Channel, ChatError> {
        let (ticket, name) = {
            let st = self.lock()?;
            let ticket = require_live(&st)?;
            let name = validate_channel_name(name, st.channels.names())?;
            (ticket, name)
        };

        let channel = match self.inner.api.create_channel(&ticket.token, &name).await {
            Ok(channel) => channel,
            Err(e) => return Err(self.handle_failure(&ticket, e, "create channel")),
        };

        {
            let mut st = self.lock()?;
            if !st.holds(&ticket) {
                return Err(ChatError::StaleSession);
            }
            st.channels.add(channel.clone());
            st.channels.select(&channel.id);
        }
        emit_all(
            &self.inner.events,
            vec![
                ClientEvent::ChannelsChanged,
                ClientEvent::SelectionChanged {
                    channel_id: Some(channel.id.clone()),
                },
            ],
        );
        info!(channel = %channel.id, name = %channel.name, "Channel created");
        Ok(channel)
    }

    /// Rename a channel optimistically, rolling back if the backend refuses.
    pub async fn rename_channel(&self, id: &ChannelId, name: &str) -> Result<Channel, ChatError> {
        let (ticket, name, old_name) = {
            let mut st = self.lock()?;
            let ticket = require_live(&st)?;
            let channel = st
                .channels
                .get(id)
                .ok_or_else(|| ChatError::ChannelNotFound(id.clone()))?;
            if !channel.removable {
                return Err(ChatError::NotRemovable(id.clone()));
            }
            let name = validate_channel_name(name, st.channels.names())?;
            let old_name = st
                .channels
                .rename(id, name.clone())
                .ok_or_else(|| ChatError::ChannelNotFound(id.clone()))?;
            (ticket, name, old_name)
        };
        emit_event(&self.inner.events, ClientEvent::ChannelsChanged);

        match self.inner.api.rename_channel(&ticket.token, id, &name).await {
            Ok(confirmed) => {
                let notice = Notice::new(format!("Channel renamed to {}", confirmed.name));
                let changed = {
                    let mut st = self.lock()?;
                    if !st.holds(&ticket) {
                        return Err(ChatError::StaleSession);
                    }
                    st.notices.push(notice.clone());
                    // The backend may normalize the name.
                    confirmed.name != name && st.channels.rename(id, confirmed.name.clone()).is_some()
                };
                if changed {
                    emit_event(&self.inner.events, ClientEvent::ChannelsChanged);
                }
                emit_event(&self.inner.events, ClientEvent::Notice { notice });
                info!(channel = %id, from = %old_name, to = %confirmed.name, "Channel renamed");
                Ok(confirmed)
            }
            Err(e) => {
                if !e.is_auth() {
                    let rolled_back = {
                        let mut st = self.lock()?;
                        let still_ours = st.holds(&ticket)
                            && st.channels.get(id).is_some_and(|c| c.name == name);
                        still_ours && st.channels.rename(id, old_name.clone()).is_some()
                    };
                    if rolled_back {
                        debug!(channel = %id, name = %old_name, "Rename rolled back");
                        emit_event(&self.inner.events, ClientEvent::ChannelsChanged);
                    }
                }
                Err(self.handle_failure(&ticket, e, "rename channel"))
            }
        }
    }

    /// Remove a channel once the backend confirms.
    pub async fn remove_channel(&self, id: &ChannelId) -> Result<(), ChatError> {
        let ticket = {
            let st = self.lock()?;
            let ticket = require_live(&st)?;
            let channel = st
                .channels
                .get(id)
                .ok_or_else(|| ChatError::ChannelNotFound(id.clone()))?;
            if !channel.removable {
                return Err(ChatError::NotRemovable(id.clone()));
            }
            ticket
        };

        if let Err(e) = self.inner.api.remove_channel(&ticket.token, id).await {
            return Err(self.handle_failure(&ticket, e, "remove channel"));
        }

        let events = {
            let mut st = self.lock()?;
            if !st.holds(&ticket) {
                return Err(ChatError::StaleSession);
            }
            remove_channel_locked(&mut st, id)
        };
        emit_all(&self.inner.events, events);
        info!(channel = %id, "Channel removed");
        Ok(())
    }

    /// Change the active channel. Local only.
    pub fn select_channel(&self, id: &ChannelId) -> Result<(), ChatError> {
        {
            let mut st = self.lock()?;
            if st.channels.selected_id() == Some(id) {
                return Ok(());
            }
            if !st.channels.select(id) {
                return Err(ChatError::ChannelNotFound(id.clone()));
            }
        }
        emit_event(
            &self.inner.events,
            ClientEvent::SelectionChanged {
                channel_id: Some(id.clone()),
            },
        );
        Ok(())
    }

    pub fn dismiss_notice(&self, id: uuid::Uuid) -> Result<bool, ChatError> {
        let removed = {
            let mut st = self.lock()?;
            let before = st.notices.len();
            st.notices.retain(|n| n.id != id);
            st.notices.len() != before
        };
        if removed {
            emit_event(&self.inner.events, ClientEvent::NoticesChanged);
        }
        Ok(removed)
    }

    /// Resolve a channel by id, falling back to its exact name.
    pub fn find_channel(&self, id_or_name: &str) -> Result<Option<ChannelId>, ChatError> {
        self.read(|st| {
            st.channels
                .get(&ChannelId::from(id_or_name))
                .or_else(|| st.channels.find_by_name(id_or_name))
                .map(|c| c.id.clone())
        })
    }

    // ------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------

    /// Run `f` against the current state under the lock.
    pub fn read<R>(&self, f: impl FnOnce(&ClientState) -> R) -> Result<R, ChatError> {
        let st = self.lock()?;
        Ok(f(&st))
    }

    pub fn sync_state(&self) -> SyncState {
        self.read(|st| st.sync).unwrap_or(SyncState::Disconnected)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    pub fn connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.connection.status()
    }

    fn lock(&self) -> Result<MutexGuard<'_, ClientState>, ChatError> {
        self.inner.state.lock().map_err(|_| ChatError::LockPoisoned)
    }
}

fn require_live(st: &ClientState) -> Result<SessionTicket, ChatError> {
    if st.sync != SyncState::Live {
        return Err(ChatError::NotLive(st.sync.to_string()));
    }
    st.ticket().ok_or_else(|| ChatError::NotLive(st.sync.to_string()))
}

fn remove_channel_locked(st: &mut ClientState, id: &ChannelId) -> Vec<ClientEvent> {
    let was_selected = st.channels.selected_id() == Some(id);
    if st.channels.remove(id).is_none() {
        return Vec::new();
    }

    let mut events = vec![ClientEvent::ChannelsChanged];
    if was_selected {
        events.push(ClientEvent::SelectionChanged {
            channel_id: st.channels.selected_id().cloned(),
        });
    }
    events
}

/// Apply one push event to the stores. Runs on the connection task.
fn apply_push(
    state: &Mutex<ClientState>,
    ticket: &SessionTicket,
    filter_own: bool,
    event: PushEvent,
) -> Vec<ClientEvent> {
    let Ok(mut st) = state.lock() else {
        return Vec::new();
    };
    if st.sync != SyncState::Live || !st.holds(ticket) {
        debug!(event = %event.kind(), "Dropping push event outside live session");
        return Vec::new();
    }

    match event {
        PushEvent::NewMessage(message) => {
            if filter_own && message.username == ticket.username {
                debug!(msg_id = %message.id, "Skipping own echo");
                return Vec::new();
            }
            let added_event = ClientEvent::MessageAdded {
                channel_id: message.channel_id.clone(),
                message_id: message.id.clone(),
                author: message.username.clone(),
            };
            if st.messages.add(message) {
                vec![added_event]
            } else {
                Vec::new()
            }
        }

        PushEvent::NewChannel(channel) => {
            let had_selection = st.channels.selected_id().is_some();
            if !st.channels.add(channel) {
                return Vec::new();
            }
            let mut events = vec![ClientEvent::ChannelsChanged];
            if !had_selection {
                events.push(ClientEvent::SelectionChanged {
                    channel_id: st.channels.selected_id().cloned(),
                });
            }
            events
        }

        PushEvent::RemoveChannel(id) => remove_channel_locked(&mut st, &id),

        PushEvent::RenameChannel(channel) => {
            let unchanged = st
                .channels
                .get(&channel.id)
                .is_some_and(|c| c.name == channel.name);
            if unchanged {
                return Vec::new();
            }
            match st.channels.rename(&channel.id, channel.name) {
                Some(_) => vec![ClientEvent::ChannelsChanged],
                None => Vec::new(),
            }
        }
    }
}
