use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{PredictiveInsights, TwinRecord, VisualizationData};
use crate::summary::{self, HealthSummary};

/// Where the synchronizer is in its fetch cycle.
///
/// `Idle` before the first patient and after `stop()`; `Loading` while a
/// pass runs; `Ready` or `Errored` once the latest pass finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Idle,
    Loading,
    Ready,
    Errored,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Errored => "errored",
        }
    }
}

/// Snapshot of everything the synchronizer knows about one patient.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthTwinState {
    pub patient_id: Option<String>,
    pub health_twin: Option<TwinRecord>,
    pub predictive_insights: Option<PredictiveInsights>,
    pub visualization_data: Option<VisualizationData>,
    pub loading: bool,
    /// Message of the last failed primary fetch, cleared when a pass starts.
    pub error: Option<String>,
    /// Local time of the last successful primary fetch.
    pub last_updated: Option<DateTime<Utc>>,
    pub phase: SyncPhase,
}

impl HealthTwinState {
    /// Empty state bound to `patient_id`.
    pub fn for_patient(patient_id: &str) -> Self {
        Self {
            patient_id: Some(patient_id.to_string()),
            ..Self::default()
        }
    }

    /// Twin loaded and its server timestamp younger than `window` at `now`.
    pub fn is_data_fresh_at(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.health_twin
            .as_ref()
            .is_some_and(|record| summary::is_fresh(record.last_updated(), now, window))
    }

    pub fn health_summary(&self) -> Option<HealthSummary> {
        self.health_twin
            .as_ref()
            .map(|record| summary::generate_health_summary(record.twin()))
    }
}
