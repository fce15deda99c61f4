use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{HealthTwinSource, SourceError};
use crate::config::HTTP_CONNECT_TIMEOUT;
use crate::models::{
    ComprehensiveHealthTwin, HealthTwin, HealthTwinUpdate, PredictiveInsights, UpdateRequest,
    UpdateResponse, VisualizationData,
};

/// Error body shape used by the API (`{"message": "..."}`).
#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// HTTP client for the health twin REST API.
pub struct HttpTwinSource {
    base_url: Url,
    client: reqwest::Client,
    token: Option<String>,
}

impl HttpTwinSource {
    /// Client for `base_url` (e.g. `http://localhost:3000`), sending `token`
    /// as a bearer credential when present.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, SourceError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| SourceError::Transport(format!("Invalid API URL {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(SourceError::Transport(format!("Invalid API URL {base_url}")));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| SourceError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            client,
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Build `base/segments...`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, SourceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SourceError::Transport(format!("Invalid API URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn request<T, B>(&self, method: Method, segments: &[&str], body: Option<&B>) -> Result<T, SourceError>
    where
        T: DeserializeOwned,
        B: serde::Serialize + ?Sized,
    {
        let url = self.endpoint(segments)?;
        let endpoint = url.path().to_string();

        let mut builder = self.client.request(method, url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let result = self.execute(builder, &endpoint).await;
        if let Err(e) = &result {
            tracing::warn!(endpoint = %endpoint, error = %e, "Health twin API error");
        }
        result
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        endpoint: &str,
    ) -> Result<T, SourceError> {
        let response = builder.send().await.map_err(|e| {
            if e.is_connect() {
                SourceError::Transport(format!("Cannot connect to {}", self.base_url))
            } else if e.is_timeout() {
                SourceError::Transport("Request timed out".to_string())
            } else {
                SourceError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| {
                    format!(
                        "HTTP {}: {}",
                        status.as_u16(),
                        status.canonical_reason().unwrap_or("Unknown Status")
                    )
                });
            return Err(SourceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| SourceError::Decode {
            endpoint: endpoint.to_string(),
            detail: e.to_string(),
        })
    }
}

#[async_trait]
impl HealthTwinSource for HttpTwinSource {
    async fn get_health_twin(&self, patient_id: &str) -> Result<HealthTwin, SourceError> {
        self.request::<_, ()>(Method::GET, &["api", "health-twin", patient_id], None)
            .await
    }

    async fn get_comprehensive_health_twin(
        &self,
        patient_id: &str,
    ) -> Result<ComprehensiveHealthTwin, SourceError> {
        self.request::<_, ()>(
            Method::GET,
            &["api", "health-twin", patient_id, "comprehensive"],
            None,
        )
        .await
    }

    async fn get_predictive_insights(
        &self,
        patient_id: &str,
    ) -> Result<PredictiveInsights, SourceError> {
        self.request::<_, ()>(
            Method::GET,
            &["api", "predictive", "insights", "patient", patient_id],
            None,
        )
        .await
    }

    async fn get_visualization_data(
        &self,
        patient_id: &str,
    ) -> Result<VisualizationData, SourceError> {
        self.request::<_, ()>(
            Method::GET,
            &["api", "health-twin", "data", "patient", patient_id],
            None,
        )
        .await
    }

    async fn update_health_twin(
        &self,
        patient_id: &str,
        update: &HealthTwinUpdate,
    ) -> Result<UpdateResponse, SourceError> {
        let body = UpdateRequest { patient_id, update };
        self.request(Method::POST, &["api", "health-twin", "update"], Some(&body))
            .await
    }
}
