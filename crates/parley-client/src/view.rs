//! View binding: derived, read-only values for a presentation layer plus
//! the intents it may forward.
//!
//! Rendering is not done here. A front end subscribes with
//! [`ChatView::next_update`], re-renders from the attached
//! [`ViewSnapshot`], and applies the [`ScrollAction`] that comes with it.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use parley_net::ConnectionStatus;
use parley_shared::types::{Channel, ChannelId, Message};
use parley_shared::ChatError;

use crate::controller::SyncController;
use crate::events::ClientEvent;
use crate::state::{Notice, SyncState};

/// Sidebar row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelView {
    pub id: ChannelId,
    pub name: String,
    pub removable: bool,
    pub is_active: bool,
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSnapshot {
    pub state: SyncState,
    pub username: Option<String>,
    pub channels: Vec<ChannelView>,
    pub active_channel: Option<Channel>,
    /// Messages of the active channel, oldest first.
    pub messages: Vec<Message>,
    pub message_count: usize,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAction {
    StickToBottom,
    Stay,
}

/// Tracks whether the viewer is parked at the bottom of the message pane.
#[derive(Debug, Clone, Copy)]
pub struct ScrollTracker {
    at_bottom: bool,
    threshold: f64,
}

impl ScrollTracker {
    pub fn new(threshold: f64) -> Self {
        Self {
            at_bottom: true,
            threshold: threshold.max(0.0),
        }
    }

    /// Record a scroll position reported by the renderer.
    pub fn on_scroll(&mut self, offset: f64, viewport_height: f64, content_height: f64) {
        let distance = content_height - (offset + viewport_height);
        self.at_bottom = distance <= self.threshold;
    }

    /// Decide how to react to a new message.
    ///
    /// Sticks only for the active channel, and only if the viewer was at the
    /// bottom before the message arrived or wrote it themselves.
    pub fn on_new_message(&mut self, in_active_channel: bool, authored_by_viewer: bool) -> ScrollAction {
        if !in_active_channel {
            return ScrollAction::Stay;
        }
        if self.at_bottom || authored_by_viewer {
            self.at_bottom = true;
            ScrollAction::StickToBottom
        } else {
            ScrollAction::Stay
        }
    }

    pub fn is_at_bottom(&self) -> bool {
        self.at_bottom
    }
}

/// One change notification with the re-derived view.
#[derive(Debug, Clone)]
pub struct ViewUpdate {
    pub event: Option<ClientEvent>,
    pub snapshot: ViewSnapshot,
    pub scroll: ScrollAction,
}

pub struct ChatView {
    controller: SyncController,
    scroll: ScrollTracker,
    changes: broadcast::Receiver<ClientEvent>,
}

impl ChatView {
    pub fn new(controller: SyncController, scroll_threshold: f64) -> Self {
        let changes = controller.subscribe();
        Self {
            controller,
            scroll: ScrollTracker::new(scroll_threshold),
            changes,
        }
    }

    pub fn snapshot(&self) -> Result<ViewSnapshot, ChatError> {
        self.controller.read(|st| {
            let active_id = st.channels.selected_id();
            let channels = st
                .channels
                .channels()
                .iter()
                .map(|c| ChannelView {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    removable: c.removable,
                    is_active: Some(&c.id) == active_id,
                })
                .collect();
            let messages: Vec<Message> = match active_id {
                Some(id) => st.messages.by_channel(id).cloned().collect(),
                None => Vec::new(),
            };

            ViewSnapshot {
                state: st.sync,
                username: st.username().map(str::to_string),
                channels,
                active_channel: st.channels.selected().cloned(),
                message_count: messages.len(),
                messages,
                notices: st.notices.clone(),
            }
        })
    }

    /// Wait for the next store change and return the re-derived view.
    ///
    /// Returns `None` once the controller is gone.
    pub async fn next_update(&mut self) -> Option<ViewUpdate> {
        let event = match self.changes.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                // Missed notifications only mean a full re-derive.
                warn!(skipped, "View lagged behind change notifications");
                None
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        };

        let snapshot = match self.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Failed to derive view");
                return None;
            }
        };

        let scroll = match &event {
            Some(ClientEvent::MessageAdded {
                channel_id, author, ..
            }) => {
                let in_active = snapshot
                    .active_channel
                    .as_ref()
                    .is_some_and(|c| &c.id == channel_id);
                let own = snapshot.username.as_deref() == Some(author.as_str());
                self.scroll.on_new_message(in_active, own)
            }
            _ => ScrollAction::Stay,
        };
        debug!(event = ?event, scroll = ?scroll, "View updated");

        Some(ViewUpdate {
            event,
            snapshot,
            scroll,
        })
    }

    pub fn on_scroll(&mut self, offset: f64, viewport_height: f64, content_height: f64) {
        self.scroll.on_scroll(offset, viewport_height, content_height);
    }

    pub fn is_at_bottom(&self) -> bool {
        self.scroll.is_at_bottom()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        *self.controller.connection_status().borrow()
    }

    // ------------------------------------------------------------------
    // Intents
    // ------------------------------------------------------------------

    pub async fn send_message(&self, text: &str) -> Result<Message, ChatError> {
        self.controller.send_message(text).await
    }

    pub fn select_channel(&self, id: &ChannelId) -> Result<(), ChatError> {
        self.controller.select_channel(id)
    }

    pub async fn create_channel(&self, name: &str) -> Result<Channel, ChatError> {
        self.controller.create_channel(name).await
    }

    pub async fn rename_channel(&self, id: &ChannelId, name: &str) -> Result<Channel, ChatError> {
        self.controller.rename_channel(id, name).await
    }

    pub async fn remove_channel(&self, id: &ChannelId) -> Result<(), ChatError> {
        self.controller.remove_channel(id).await
    }

    pub fn dismiss_notice(&self, id: uuid::Uuid) -> Result<bool, ChatError> {
        self.controller.dismiss_notice(id)
    }

    pub fn controller(&self) -> &SyncController {
        &self.controller
    }
}
