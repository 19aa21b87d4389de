//! Connection manager: one live push connection per session.
//!
//! The connection runs in a dedicated tokio task that owns the transport
//! stream and dispatches every event, in delivery order, to the handler
//! bound for its kind. Transport failures never surface as errors: the task
//! reports [`ConnectionStatus::Degraded`] and reconnects with exponential
//! backoff until it is disconnected.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use parley_shared::constants::{DEFAULT_RECONNECT_INITIAL_MS, DEFAULT_RECONNECT_MAX_MS};
use parley_shared::protocol::{PushEvent, PushEventKind};

use crate::transport::PushTransport;

/// Callback bound to one push event kind.
pub type PushHandler = Arc<dyn Fn(PushEvent) + Send + Sync>;

type HandlerTable = Arc<RwLock<HashMap<PushEventKind, PushHandler>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    /// The connection dropped or could not be opened; retrying.
    Degraded { attempt: u32 },
}

/// Identifies one `connect` call. Stale handles are ignored by `disconnect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(u64);

impl ConnectionHandle {
    pub fn generation(&self) -> u64 {
        self.0
    }
}

/// Exponential reconnect backoff.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(DEFAULT_RECONNECT_INITIAL_MS),
            max: Duration::from_millis(DEFAULT_RECONNECT_MAX_MS),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial.saturating_mul(1u32 << shift).min(self.max)
    }
}

struct LiveConnection {
    handle: ConnectionHandle,
    task: JoinHandle<()>,
}

pub struct ConnectionManager {
    transport: Arc<dyn PushTransport>,
    policy: ReconnectPolicy,
    handlers: HandlerTable,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
    /// Generation allowed to publish status; 0 when none is live.
    live_generation: Arc<AtomicU64>,
    live: Mutex<Option<LiveConnection>>,
    next_generation: AtomicU64,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn PushTransport>, policy: ReconnectPolicy) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            transport,
            policy,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            status_tx: Arc::new(status_tx),
            live_generation: Arc::new(AtomicU64::new(0)),
            live: Mutex::new(None),
            next_generation: AtomicU64::new(1),
        }
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    /// Open the session's connection, tearing down any previous one first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self, token: &str) -> ConnectionHandle {
        let handle = ConnectionHandle(self.next_generation.fetch_add(1, Ordering::Relaxed));

        let mut live = lock_live(&self.live);
        if let Some(old) = live.take() {
            old.task.abort();
            debug!(old = old.handle.0, new = handle.0, "Replaced previous push connection");
        }
        self.status_tx.send_modify(|status| {
            self.live_generation.store(handle.0, Ordering::SeqCst);
            *status = ConnectionStatus::Connecting;
        });

        let task = tokio::spawn(run_connection(
            self.transport.clone(),
            token.to_string(),
            self.handlers.clone(),
            StatusPublisher {
                tx: self.status_tx.clone(),
                live_generation: self.live_generation.clone(),
                handle,
            },
            self.policy,
        ));
        *live = Some(LiveConnection { handle, task });
        drop(live);

        info!(generation = handle.0, "Push connection requested");
        handle
    }

    /// Close the connection identified by `handle`. Returns `false` if the
    /// handle is not the live one.
    pub fn disconnect(&self, handle: ConnectionHandle) -> bool {
        let taken = {
            let mut live = lock_live(&self.live);
            match live.as_ref() {
                Some(conn) if conn.handle == handle => live.take(),
                _ => None,
            }
        };

        match taken {
            Some(conn) => {
                self.status_tx.send_modify(|status| {
                    self.live_generation.store(0, Ordering::SeqCst);
                    *status = ConnectionStatus::Disconnected;
                });
                conn.task.abort();
                info!(generation = handle.0, "Push connection closed");
                true
            }
            None => {
                debug!(generation = handle.0, "Ignoring disconnect for stale handle");
                false
            }
        }
    }

    pub fn current(&self) -> Option<ConnectionHandle> {
        lock_live(&self.live).as_ref().map(|c| c.handle)
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    // ------------------------------------------------------------------
    // Event binding
    // ------------------------------------------------------------------

    /// Bind `handler` to `kind`, replacing any previous binding.
    pub fn on<F>(&self, kind: PushEventKind, handler: F)
    where
        F: Fn(PushEvent) + Send + Sync + 'static,
    {
        write_handlers(&self.handlers).insert(kind, Arc::new(handler));
    }

    pub fn off(&self, kind: PushEventKind) -> bool {
        write_handlers(&self.handlers).remove(&kind).is_some()
    }

    pub fn off_all(&self) {
        write_handlers(&self.handlers).clear();
    }

    pub fn bound_kinds(&self) -> Vec<PushEventKind> {
        read_handlers(&self.handlers).keys().copied().collect()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.live_generation.store(0, Ordering::SeqCst);
        if let Some(conn) = lock_live(&self.live).take() {
            conn.task.abort();
        }
    }
}

/// Status writer owned by one connection task.
///
/// Writes are dropped once the task's generation is no longer live, so an
/// aborted task still finishing its poll cannot overwrite `Disconnected`.
struct StatusPublisher {
    tx: Arc<watch::Sender<ConnectionStatus>>,
    live_generation: Arc<AtomicU64>,
    handle: ConnectionHandle,
}

impl StatusPublisher {
    fn publish(&self, next: ConnectionStatus) -> bool {
        self.tx.send_if_modified(|status| {
            if self.live_generation.load(Ordering::SeqCst) != self.handle.0 {
                return false;
            }
            *status = next;
            true
        })
    }
}

async fn run_connection(
    transport: Arc<dyn PushTransport>,
    token: String,
    handlers: HandlerTable,
    status: StatusPublisher,
    policy: ReconnectPolicy,
) {
    let handle = status.handle;
    let mut attempt: u32 = 0;

    loop {
        match transport.open(&token).await {
            Ok(mut stream) => {
                attempt = 0;
                status.publish(ConnectionStatus::Connected);
                info!(generation = handle.0, "Push connection live");

                while let Some(event) = stream.next().await {
                    dispatch(&handlers, event);
                }
                warn!(generation = handle.0, "Push stream ended");
            }
            Err(e) => {
                warn!(generation = handle.0, attempt, error = %e, "Push connection failed");
            }
        }

        attempt = attempt.saturating_add(1);
        if !status.publish(ConnectionStatus::Degraded { attempt }) {
            debug!(generation = handle.0, "Connection superseded, stopping");
            return;
        }
        let delay = policy.delay(attempt);
        debug!(generation = handle.0, attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");
        tokio::time::sleep(delay).await;
    }
}

fn dispatch(handlers: &HandlerTable, event: PushEvent) {
    let kind = event.kind();
    let handler = read_handlers(handlers).get(&kind).cloned();
    match handler {
        Some(handler) => handler(event),
        None => debug!(event = %kind, "No handler bound, dropping event"),
    }
}

// Poisoning is ignored: the table holds no cross-entry invariants.
fn read_handlers(
    handlers: &HandlerTable,
) -> std::sync::RwLockReadGuard<'_, HashMap<PushEventKind, PushHandler>> {
    handlers.read().unwrap_or_else(|e| e.into_inner())
}

fn write_handlers(
    handlers: &HandlerTable,
) -> std::sync::RwLockWriteGuard<'_, HashMap<PushEventKind, PushHandler>> {
    handlers.write().unwrap_or_else(|e| e.into_inner())
}

fn lock_live(live: &Mutex<Option<LiveConnection>>) -> std::sync::MutexGuard<'_, Option<LiveConnection>> {
    live.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{eventually, LoopbackTransport};
    use parley_shared::types::{Channel, ChannelId};

    fn new_channel(id: &str) -> PushEvent {
        PushEvent::NewChannel(Channel {
            id: ChannelId::from(id),
            name: format!("ch-{id}"),
            removable: true,
        })
    }

    fn fast_policy() -> ReconnectPolicy {
        ReconnectPolicy {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(5),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = ReconnectPolicy {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(1000),
        };
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(4), Duration::from_millis(800));
        assert_eq!(policy.delay(5), Duration::from_millis(1000));
        assert_eq!(policy.delay(500), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn dispatches_in_delivery_order() {
        let transport = LoopbackTransport::new();
        let manager = ConnectionManager::new(transport.clone(), fast_policy());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        manager.on(PushEventKind::NewChannel, move |event| {
            if let PushEvent::NewChannel(ch) = event {
                sink.lock().unwrap().push(ch.id.0);
            }
        });

        manager.connect("token-a");
        assert!(eventually(|| transport.open_count() == 1).await);
        for id in ["1", "2", "3"] {
            assert!(transport.push(new_channel(id)).await);
        }

        assert!(eventually(|| seen.lock().unwrap().len() == 3).await);
        assert_eq!(*seen.lock().unwrap(), ["1", "2", "3"]);
    }

    #[tokio::test]
    async fn reconnect_replaces_previous_connection() {
        let transport = LoopbackTransport::new();
        let manager = ConnectionManager::new(transport.clone(), fast_policy());

        let first = manager.connect("token-a");
        assert!(eventually(|| transport.open_count() == 1).await);
        let second = manager.connect("token-b");
        assert!(eventually(|| transport.open_count() == 2).await);

        assert_ne!(first, second);
        assert!(second.generation() > first.generation());
        assert_eq!(manager.current(), Some(second));
        assert_eq!(transport.opened_tokens(), ["token-a", "token-b"]);

        // The stale handle cannot close the live connection.
        assert!(!manager.disconnect(first));
        assert!(manager.disconnect(second));
        assert_eq!(manager.current(), None);
        assert_eq!(*manager.status().borrow(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn unbound_events_are_dropped() {
        let transport = LoopbackTransport::new();
        let manager = ConnectionManager::new(transport.clone(), fast_policy());

        let hits = Arc::new(AtomicU64::new(0));
        let counter = hits.clone();
        manager.on(PushEventKind::NewChannel, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(manager.off(PushEventKind::NewChannel));
        assert!(manager.bound_kinds().is_empty());

        manager.connect("token");
        assert!(eventually(|| transport.open_count() == 1).await);
        transport.push(new_channel("1")).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failures_degrade_then_recover() {
        let transport = LoopbackTransport::new();
        transport.fail_next(2);
        let manager = ConnectionManager::new(transport.clone(), fast_policy());
        let status = manager.status();

        manager.connect("token");
        assert!(eventually(|| transport.open_count() == 1).await);
        assert!(eventually(|| *status.borrow() == ConnectionStatus::Connected).await);
        assert_eq!(transport.failed_attempts(), 2);
    }

    #[tokio::test]
    async fn dropped_stream_triggers_reconnect() {
        let transport = LoopbackTransport::new();
        let manager = ConnectionManager::new(transport.clone(), fast_policy());

        manager.connect("token");
        assert!(eventually(|| transport.open_count() == 1).await);
        transport.drop_connections();
        assert!(eventually(|| transport.open_count() == 2).await);
    }

    #[test]
    fn superseded_task_cannot_publish_status() {
        let (tx, rx) = watch::channel(ConnectionStatus::Disconnected);
        let live_generation = Arc::new(AtomicU64::new(7));
        let stale = StatusPublisher {
            tx: Arc::new(tx),
            live_generation: live_generation.clone(),
            handle: ConnectionHandle(7),
        };

        assert!(stale.publish(ConnectionStatus::Connected));
        assert_eq!(*rx.borrow(), ConnectionStatus::Connected);

        stale.tx.send_modify(|status| {
            live_generation.store(0, Ordering::SeqCst);
            *status = ConnectionStatus::Disconnected;
        });
        assert!(!stale.publish(ConnectionStatus::Degraded { attempt: 1 }));
        assert_eq!(*rx.borrow(), ConnectionStatus::Disconnected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn disconnect_while_retrying_stays_disconnected() {
        let transport = LoopbackTransport::new();
        transport.fail_next(u32::MAX);
        let manager = ConnectionManager::new(transport.clone(), fast_policy());

        for _ in 0..20 {
            let handle = manager.connect("token");
            assert!(eventually(|| transport.failed_attempts() > 0).await);
            assert!(manager.disconnect(handle));
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert_eq!(*manager.status().borrow(), ConnectionStatus::Disconnected);
        }
    }
}
