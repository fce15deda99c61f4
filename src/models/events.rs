//! Realtime events pushed by the server.
//!
//! Events are invalidation signals: the synchronizer only reads the patient
//! id and throws the rest away after logging.

use serde::{Deserialize, Serialize};

use super::enums::{AlertKind, Severity, UpdateKind};

/// The event names the synchronizer listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    TwinUpdated,
    RiskAlert,
    PatientDataChanged,
}

impl EventName {
    pub const ALL: [EventName; 3] = [Self::TwinUpdated, Self::RiskAlert, Self::PatientDataChanged];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TwinUpdated => "healthTwin:updated",
            Self::RiskAlert => "healthTwin:riskAlert",
            Self::PatientDataChanged => "patient:dataChanged",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == name)
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of `healthTwin:updated` and `patient:dataChanged`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthTwinUpdateEvent {
    pub patient_id: String,
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub timestamp: String,
}

/// Payload of `healthTwin:riskAlert`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAlertEvent {
    pub patient_id: String,
    pub alert_type: AlertKind,
    pub severity: Severity,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    Update(HealthTwinUpdateEvent),
    RiskAlert(RiskAlertEvent),
}

impl RealtimeEvent {
    pub fn patient_id(&self) -> &str {
        match self {
            Self::Update(e) => &e.patient_id,
            Self::RiskAlert(e) => &e.patient_id,
        }
    }

    /// Decode a payload according to the event name it arrived under.
    pub fn decode(name: EventName, data: serde_json::Value) -> Result<Self, serde_json::Error> {
        match name {
            EventName::TwinUpdated | EventName::PatientDataChanged => {
                serde_json::from_value(data).map(Self::Update)
            }
            EventName::RiskAlert => serde_json::from_value(data).map(Self::RiskAlert),
        }
    }
}

/// WebSocket frame carrying one named event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}
