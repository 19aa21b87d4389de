//! In-process doubles for the backend, used by tests in this and downstream
//! crates (enable the `test-util` feature).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};

use parley_shared::protocol::PushEvent;
use parley_shared::types::{Channel, ChannelId, Message, MessageId};

use crate::api::ChatApi;
use crate::error::NetError;
use crate::transport::{PushStream, PushTransport};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Poll `cond` until it holds or roughly a second has passed.
pub async fn eventually<F: FnMut() -> bool>(mut cond: F) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

// ---------------------------------------------------------------------------
// Push transport
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LoopbackState {
    senders: Vec<mpsc::Sender<PushEvent>>,
    opened_tokens: Vec<String>,
    fail_next: u32,
    failed_attempts: u32,
}

/// A [`PushTransport`] whose events are injected by the test.
#[derive(Default)]
pub struct LoopbackTransport {
    state: Mutex<LoopbackState>,
}

impl LoopbackTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver `event` to the most recently opened stream.
    pub async fn push(&self, event: PushEvent) -> bool {
        let sender = lock(&self.state).senders.last().cloned();
        match sender {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Make the next `n` open attempts fail.
    pub fn fail_next(&self, n: u32) {
        lock(&self.state).fail_next = n;
    }

    /// Close every open stream, as a server restart would.
    pub fn drop_connections(&self) {
        lock(&self.state).senders.clear();
    }

    pub fn open_count(&self) -> usize {
        lock(&self.state).opened_tokens.len()
    }

    pub fn opened_tokens(&self) -> Vec<String> {
        lock(&self.state).opened_tokens.clone()
    }

    pub fn failed_attempts(&self) -> u32 {
        lock(&self.state).failed_attempts
    }
}

#[async_trait]
impl PushTransport for LoopbackTransport {
    async fn open(&self, token: &str) -> Result<PushStream, NetError> {
        let mut state = lock(&self.state);
        if state.fail_next > 0 {
            state.fail_next -= 1;
            state.failed_attempts += 1;
            return Err(NetError::Closed);
        }

        let (tx, rx) = mpsc::channel(64);
        state.senders.push(tx);
        state.opened_tokens.push(token.to_string());
        Ok(PushStream::new(rx, None))
    }
}

// ---------------------------------------------------------------------------
// REST backend
// ---------------------------------------------------------------------------

/// Failure mode for the next calls of [`FakeChatApi`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeFailure {
    Unauthorized,
    ServerError,
}

#[derive(Default)]
struct FakeBackend {
    channels: Vec<Channel>,
    messages: Vec<Message>,
    next_id: u64,
    failures: VecDeque<FakeFailure>,
    tokens: Vec<String>,
}

/// A [`ChatApi`] backed by in-memory collections.
///
/// When an echo transport is attached, every successful mutation is pushed
/// back through it before the call returns, reproducing the echo-first race.
#[derive(Default)]
pub struct FakeChatApi {
    backend: Mutex<FakeBackend>,
    echo: Mutex<Option<Arc<LoopbackTransport>>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeChatApi {
    pub fn new(channels: Vec<Channel>, messages: Vec<Message>) -> Arc<Self> {
        let api = Self::default();
        {
            let mut backend = lock(&api.backend);
            backend.channels = channels;
            backend.messages = messages;
            backend.next_id = 1000;
        }
        Arc::new(api)
    }

    pub fn with_echo(&self, transport: Arc<LoopbackTransport>) {
        *lock(&self.echo) = Some(transport);
    }

    /// Queue a failure for the next call.
    pub fn fail_next(&self, failure: FakeFailure) {
        lock(&self.backend).failures.push_back(failure);
    }

    /// Hold every subsequent call until the returned gate is notified.
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *lock(&self.gate) = Some(gate.clone());
        gate
    }

    pub fn release(&self) {
        if let Some(gate) = lock(&self.gate).take() {
            gate.notify_waiters();
            gate.notify_one();
        }
    }

    /// Tokens presented to the backend, one per call.
    pub fn tokens_seen(&self) -> Vec<String> {
        lock(&self.backend).tokens.clone()
    }

    pub fn channels(&self) -> Vec<Channel> {
        lock(&self.backend).channels.clone()
    }

    async fn enter(&self, token: &str) -> Result<(), NetError> {
        let gate = lock(&self.gate).clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut backend = lock(&self.backend);
        backend.tokens.push(token.to_string());
        match backend.failures.pop_front() {
            Some(FakeFailure::Unauthorized) => Err(NetError::Unauthorized),
            Some(FakeFailure::ServerError) => Err(NetError::Status(500)),
            None => Ok(()),
        }
    }

    async fn echo(&self, event: PushEvent) {
        let transport = lock(&self.echo).clone();
        if let Some(transport) = transport {
            transport.push(event).await;
        }
    }
}

#[async_trait]
impl ChatApi for FakeChatApi {
    async fn fetch_channels(&self, token: &str) -> Result<Vec<Channel>, NetError> {
        self.enter(token).await?;
        Ok(lock(&self.backend).channels.clone())
    }

    async fn fetch_messages(&self, token: &str) -> Result<Vec<Message>, NetError> {
        self.enter(token).await?;
        Ok(lock(&self.backend).messages.clone())
    }

    async fn send_message(
        &self,
        token: &str,
        channel_id: &ChannelId,
        username: &str,
        body: &str,
    ) -> Result<Message, NetError> {
        self.enter(token).await?;
        let message = {
            let mut backend = lock(&self.backend);
            backend.next_id += 1;
            let message = Message {
                id: MessageId(backend.next_id.to_string()),
                channel_id: channel_id.clone(),
                username: username.to_string(),
                body: body.to_string(),
                seq: 0,
            };
            backend.messages.push(message.clone());
            message
        };
        self.echo(PushEvent::NewMessage(message.clone())).await;
        Ok(message)
    }

    async fn create_channel(&self, token: &str, name: &str) -> Result<Channel, NetError> {
        self.enter(token).await?;
        let channel = {
            let mut backend = lock(&self.backend);
            backend.next_id += 1;
            let channel = Channel {
                id: ChannelId(backend.next_id.to_string()),
                name: name.to_string(),
                removable: true,
            };
            backend.channels.push(channel.clone());
            channel
        };
        self.echo(PushEvent::NewChannel(channel.clone())).await;
        Ok(channel)
    }

    async fn rename_channel(
        &self,
        token: &str,
        id: &ChannelId,
        name: &str,
    ) -> Result<Channel, NetError> {
        self.enter(token).await?;
        let channel = {
            let mut backend = lock(&self.backend);
            let channel = backend
                .channels
                .iter_mut()
                .find(|c| &c.id == id)
                .ok_or(NetError::Status(404))?;
            channel.name = name.to_string();
            channel.clone()
        };
        self.echo(PushEvent::RenameChannel(channel.clone())).await;
        Ok(channel)
    }

    async fn remove_channel(&self, token: &str, id: &ChannelId) -> Result<(), NetError> {
        self.enter(token).await?;
        {
            let mut backend = lock(&self.backend);
            let before = backend.channels.len();
            backend.channels.retain(|c| &c.id != id);
            if backend.channels.len() == before {
                return Err(NetError::Status(404));
            }
            backend.messages.retain(|m| &m.channel_id != id);
        }
        self.echo(PushEvent::RemoveChannel(id.clone())).await;
        Ok(())
    }
}
