//! Remote health twin service.
//!
//! `HealthTwinSource` is the seam between the synchronizer and the network:
//! production wires in `HttpTwinSource`, tests wire in a scripted double.
//! Any failure is reported as a `SourceError` whose `Display` is the bare
//! message, because that string is what ends up in the synchronizer's
//! `error` field.

pub mod http;
#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;

use crate::models::{
    ComprehensiveHealthTwin, HealthTwin, HealthTwinUpdate, PredictiveInsights, UpdateResponse,
    VisualizationData,
};

pub use http::HttpTwinSource;

/// Errors from the remote service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Connection refused, DNS, timeout, TLS...
    #[error("{0}")]
    Transport(String),
    /// Non-2xx answer. `message` comes from the body when the server sent one.
    #[error("{message}")]
    Api { status: u16, message: String },
    /// 2xx answer whose body did not match the expected shape.
    #[error("Invalid response from {endpoint}: {detail}")]
    Decode { endpoint: String, detail: String },
}

#[async_trait]
pub trait HealthTwinSource: Send + Sync {
    async fn get_health_twin(&self, patient_id: &str) -> Result<HealthTwin, SourceError>;

    async fn get_comprehensive_health_twin(
        &self,
        patient_id: &str,
    ) -> Result<ComprehensiveHealthTwin, SourceError>;

    async fn get_predictive_insights(
        &self,
        patient_id: &str,
    ) -> Result<PredictiveInsights, SourceError>;

    async fn get_visualization_data(
        &self,
        patient_id: &str,
    ) -> Result<VisualizationData, SourceError>;

    /// Submit a partial write for `patient_id`.
    async fn update_health_twin(
        &self,
        patient_id: &str,
        update: &HealthTwinUpdate,
    ) -> Result<UpdateResponse, SourceError>;
}
