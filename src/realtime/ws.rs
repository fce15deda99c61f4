//! WebSocket client for the server's realtime feed.
//!
//! Frames are JSON text `{"event": "<name>", "data": {...}}`. A reader task
//! decodes each frame and republishes it through an in-process hub, so
//! subscribers see the same broadcast receivers as with `LocalChannel`.
//! Unknown events and malformed frames are logged and skipped.
//!
//! When the socket closes or a read fails, the reader reconnects with the
//! same request under a bounded backoff. Subscribers keep their receivers
//! across reconnects.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{ChannelError, LocalChannel, RealtimeChannel};
use crate::config::{
    REALTIME_RECONNECT_ATTEMPTS, REALTIME_RECONNECT_DELAY, REALTIME_RECONNECT_DELAY_MAX,
};
use crate::models::{EventFrame, EventName, RealtimeEvent};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How the reader reconnects after losing the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts per outage before giving up. Zero disables reconnection.
    pub attempts: u32,
    /// Delay before the first attempt; doubles on each further attempt.
    pub delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            attempts: REALTIME_RECONNECT_ATTEMPTS,
            delay: REALTIME_RECONNECT_DELAY,
            max_delay: REALTIME_RECONNECT_DELAY_MAX,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Where to connect and with which credentials.
struct Endpoint {
    url: String,
    token: Option<String>,
}

impl Endpoint {
    /// Connect once. `token` goes in a bearer `Authorization` header on the upgrade.
    async fn open(&self) -> Result<Socket, ChannelError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ChannelError::InvalidUrl {
                url: self.url.clone(),
                detail: e.to_string(),
            })?;
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ChannelError::InvalidToken)?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (socket, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        Ok(socket)
    }
}

pub struct WsChannel {
    hub: Arc<LocalChannel>,
    connected: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl WsChannel {
    /// Open the socket with the default reconnect policy.
    pub async fn connect(url: &str, token: Option<&str>) -> Result<Self, ChannelError> {
        Self::connect_with(url, token, ReconnectPolicy::default()).await
    }

    /// Open the socket and start the reader task. Only the first connection
    /// is reported as an error; later outages are retried under `policy`.
    pub async fn connect_with(
        url: &str,
        token: Option<&str>,
        policy: ReconnectPolicy,
    ) -> Result<Self, ChannelError> {
        let endpoint = Endpoint {
            url: url.to_string(),
            token: token.map(str::to_string),
        };
        let socket = endpoint.open().await?;
        tracing::info!(url = %url, "Realtime channel connected");

        let hub = Arc::new(LocalChannel::new());
        let connected = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(run(endpoint, socket, policy, hub.clone(), connected.clone()));

        Ok(Self {
            hub,
            connected,
            reader,
        })
    }

    /// False while reconnecting and after giving up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Stop reading and reconnecting. Existing receivers stay open but
    /// receive nothing further.
    pub fn close(&self) {
        self.reader.abort();
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl RealtimeChannel for WsChannel {
    fn subscribe(&self, name: EventName) -> broadcast::Receiver<RealtimeEvent> {
        self.hub.subscribe(name)
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn run(
    endpoint: Endpoint,
    mut socket: Socket,
    policy: ReconnectPolicy,
    hub: Arc<LocalChannel>,
    connected: Arc<AtomicBool>,
) {
    loop {
        read_loop(&mut socket, &hub).await;
        connected.store(false, Ordering::SeqCst);

        match reconnect(&endpoint, policy).await {
            Some(next) => {
                socket = next;
                connected.store(true, Ordering::SeqCst);
            }
            None => {
                tracing::warn!(
                    url = %endpoint.url,
                    attempts = policy.attempts,
                    "Realtime reconnection failed, giving up"
                );
                return;
            }
        }
    }
}

async fn read_loop(socket: &mut Socket, hub: &LocalChannel) {
    while let Some(frame) = socket.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                dispatch(hub, &text);
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Realtime channel read failed");
                break;
            }
        }
    }
    tracing::info!("Realtime channel closed");
}

async fn reconnect(endpoint: &Endpoint, policy: ReconnectPolicy) -> Option<Socket> {
    for attempt in 1..=policy.attempts {
        tokio::time::sleep(policy.delay_for(attempt)).await;
        match endpoint.open().await {
            Ok(socket) => {
                tracing::info!(url = %endpoint.url, attempt, "Realtime channel reconnected");
                return Some(socket);
            }
            Err(e) => tracing::warn!(attempt, error = %e, "Realtime reconnect attempt failed"),
        }
    }
    None
}

/// Decode one text frame and publish it. Returns the event name on success.
pub(crate) fn dispatch(hub: &LocalChannel, text: &str) -> Option<EventName> {
    let frame: EventFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(error = %e, "Skipping malformed realtime frame");
            return None;
        }
    };

    let Some(name) = EventName::parse(&frame.event) else {
        tracing::debug!(event = %frame.event, "Ignoring unknown realtime event");
        return None;
    };

    match RealtimeEvent::decode(name, frame.data) {
        Ok(event) => {
            let delivered = hub.publish(name, event);
            tracing::debug!(event = %name, delivered, "Realtime event received");
            Some(name)
        }
        Err(e) => {
            tracing::warn!(event = %name, error = %e, "Skipping realtime event with invalid payload");
            None
        }
    }
}
