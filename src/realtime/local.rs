use tokio::sync::broadcast;

use super::RealtimeChannel;
use crate::models::{EventName, RealtimeEvent};

/// Events buffered per name before slow receivers start lagging.
const DEFAULT_CAPACITY: usize = 64;

/// In-process fan-out hub, one broadcast channel per event name.
pub struct LocalChannel {
    twin_updated: broadcast::Sender<RealtimeEvent>,
    risk_alert: broadcast::Sender<RealtimeEvent>,
    data_changed: broadcast::Sender<RealtimeEvent>,
}

impl LocalChannel {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            twin_updated: broadcast::channel(capacity).0,
            risk_alert: broadcast::channel(capacity).0,
            data_changed: broadcast::channel(capacity).0,
        }
    }

    fn sender(&self, name: EventName) -> &broadcast::Sender<RealtimeEvent> {
        match name {
            EventName::TwinUpdated => &self.twin_updated,
            EventName::RiskAlert => &self.risk_alert,
            EventName::PatientDataChanged => &self.data_changed,
        }
    }

    /// Deliver `event` to every current subscriber of `name`.
    /// Returns how many receivers got it (0 when nobody listens).
    pub fn publish(&self, name: EventName, event: RealtimeEvent) -> usize {
        self.sender(name).send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self, name: EventName) -> usize {
        self.sender(name).receiver_count()
    }
}

impl Default for LocalChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeChannel for LocalChannel {
    fn subscribe(&self, name: EventName) -> broadcast::Receiver<RealtimeEvent> {
        self.sender(name).subscribe()
    }
}
