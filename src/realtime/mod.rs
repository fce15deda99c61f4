//! Realtime invalidation channel.
//!
//! Subscribing hands back a broadcast receiver for one event name; dropping
//! the receiver is the unsubscribe. `LocalChannel` is the in-process hub,
//! `WsChannel` feeds a hub from the server's WebSocket.

pub mod local;
pub mod ws;

use tokio::sync::broadcast;

use crate::models::{EventName, RealtimeEvent};

pub use local::LocalChannel;
pub use ws::{ReconnectPolicy, WsChannel};

/// Errors opening a realtime connection.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Invalid realtime URL {url}: {detail}")]
    InvalidUrl { url: String, detail: String },
    #[error("Invalid realtime token")]
    InvalidToken,
    #[error("Realtime connection failed: {0}")]
    Connect(String),
}

pub trait RealtimeChannel: Send + Sync {
    fn subscribe(&self, name: EventName) -> broadcast::Receiver<RealtimeEvent>;
}
