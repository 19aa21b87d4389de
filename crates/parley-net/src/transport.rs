//! Push transport: opening a per-session event stream.
//!
//! The production implementation speaks Socket.IO over a WebSocket. The
//! reader runs in its own tokio task and forwards decoded events into an
//! mpsc channel, answering heartbeats along the way.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use parley_shared::protocol::PushEvent;

use crate::error::NetError;
use crate::socketio::{self, Frame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long to wait for the open and namespace-connect packets.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Buffered events between the reader task and the consumer.
const EVENT_BUFFER: usize = 256;

/// A live stream of push events. Dropping it stops the reader task.
pub struct PushStream {
    events: mpsc::Receiver<PushEvent>,
    reader: Option<JoinHandle<()>>,
}

impl PushStream {
    pub fn new(events: mpsc::Receiver<PushEvent>, reader: Option<JoinHandle<()>>) -> Self {
        Self { events, reader }
    }

    /// Next event, or `None` once the connection is gone.
    pub async fn next(&mut self) -> Option<PushEvent> {
        self.events.recv().await
    }
}

impl Drop for PushStream {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

#[async_trait]
pub trait PushTransport: Send + Sync + 'static {
    /// Open a connection authenticated with `token`.
    async fn open(&self, token: &str) -> Result<PushStream, NetError>;
}

/// Socket.IO client for the backend's fixed push endpoint.
#[derive(Debug, Clone)]
pub struct SocketIoTransport {
    endpoint: Url,
}

impl SocketIoTransport {
    pub fn new(endpoint: &str) -> Result<Self, NetError> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl PushTransport for SocketIoTransport {
    async fn open(&self, token: &str) -> Result<PushStream, NetError> {
        debug!(endpoint = %self.endpoint, "Opening push connection");
        let (ws, _) = connect_async(self.endpoint.as_str()).await?;
        let (mut sink, mut stream) = ws.split();

        tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(&mut sink, &mut stream, token))
            .await
            .map_err(|_| NetError::Handshake("timed out".into()))??;

        info!(endpoint = %self.endpoint, "Push connection established");

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let reader = tokio::spawn(read_loop(sink, stream, tx));
        Ok(PushStream::new(rx, Some(reader)))
    }
}

async fn handshake(
    sink: &mut SplitSink<WsStream, WsMessage>,
    stream: &mut SplitStream<WsStream>,
    token: &str,
) -> Result<(), NetError> {
    match next_frame(stream).await? {
        Frame::Open(info) => {
            debug!(sid = %info.sid, ping_interval = info.ping_interval, "Engine.IO open");
        }
        other => {
            return Err(NetError::Handshake(format!("expected open packet, got {other:?}")));
        }
    }

    sink.send(WsMessage::Text(socketio::encode_connect(token)))
        .await?;

    loop {
        match next_frame(stream).await? {
            Frame::Connected => return Ok(()),
            Frame::ConnectError(reason) => return Err(NetError::Handshake(reason)),
            Frame::Ping => {
                sink.send(WsMessage::Text(socketio::PONG.into())).await?;
            }
            other => debug!(frame = ?other, "Ignoring frame during handshake"),
        }
    }
}

async fn next_frame(stream: &mut SplitStream<WsStream>) -> Result<Frame, NetError> {
    while let Some(msg) = stream.next().await {
        match msg? {
            WsMessage::Text(text) => return socketio::decode(&text),
            WsMessage::Close(_) => return Err(NetError::Closed),
            _ => {}
        }
    }
    Err(NetError::Closed)
}

async fn read_loop(
    mut sink: SplitSink<WsStream, WsMessage>,
    mut stream: SplitStream<WsStream>,
    tx: mpsc::Sender<PushEvent>,
) {
    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "Push connection error");
                break;
            }
        };

        let frame = match socketio::decode(&text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "Skipping undecodable frame");
                continue;
            }
        };

        match frame {
            Frame::Ping => {
                if sink.send(WsMessage::Text(socketio::PONG.into())).await.is_err() {
                    break;
                }
            }
            Frame::Event { name, payload } => match PushEvent::decode(&name, payload) {
                Ok(Some(event)) => {
                    if tx.send(event).await.is_err() {
                        // Consumer is gone.
                        break;
                    }
                }
                Ok(None) => debug!(event = %name, "Ignoring unsubscribed event"),
                Err(e) => warn!(event = %name, error = %e, "Malformed event payload"),
            },
            Frame::Close | Frame::Disconnected => {
                info!("Server closed the push connection");
                break;
            }
            _ => {}
        }
    }

    let _ = sink.send(WsMessage::Text(socketio::DISCONNECT.into())).await;
    let _ = sink.close().await;
    debug!("Push reader stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_parsed_once() {
        let transport =
            SocketIoTransport::new("ws://localhost:5001/socket.io/?EIO=4&transport=websocket")
                .unwrap();
        assert_eq!(transport.endpoint().scheme(), "ws");
        assert_eq!(transport.endpoint().path(), "/socket.io/");
        assert_eq!(transport.endpoint().port(), Some(5001));
    }

    #[test]
    fn malformed_endpoint_is_rejected() {
        assert!(matches!(
            SocketIoTransport::new("not a url"),
            Err(NetError::Url(_))
        ));
    }
}
