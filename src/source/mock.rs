//! Scripted `HealthTwinSource` for synchronizer tests.
//!
//! Primary fetches pop scripted steps (delay + result) and fall back to a
//! fixed twin once the script is exhausted. Every call is counted.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{HealthTwinSource, SourceError};
use crate::models::{
    ComprehensiveHealthTwin, HealthTwin, HealthTwinUpdate, InsightReport, InsightStatus,
    PopulationComparison, PredictiveInsights, UpdateResponse, VisualizationData,
};

struct Step {
    delay: Duration,
    result: Result<HealthTwin, SourceError>,
}

#[derive(Default)]
pub(crate) struct CallCounts {
    pub twin: AtomicUsize,
    pub comprehensive: AtomicUsize,
    pub insights: AtomicUsize,
    pub visualization: AtomicUsize,
    pub update: AtomicUsize,
}

impl CallCounts {
    /// Primary fetches of either shape.
    pub fn primary(&self) -> usize {
        self.twin.load(Ordering::SeqCst) + self.comprehensive.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.primary()
            + self.insights.load(Ordering::SeqCst)
            + self.visualization.load(Ordering::SeqCst)
            + self.update.load(Ordering::SeqCst)
    }
}

pub(crate) struct ScriptedSource {
    steps: Mutex<VecDeque<Step>>,
    fallback: Mutex<Result<HealthTwin, SourceError>>,
    insights: Mutex<Result<PredictiveInsights, SourceError>>,
    visualization: Mutex<Result<VisualizationData, SourceError>>,
    aux_delay: Mutex<Duration>,
    update: Mutex<Result<UpdateResponse, SourceError>>,
    update_delay: Mutex<Duration>,
    pub calls: CallCounts,
}

pub(crate) fn twin(patient_id: &str, last_updated: &str) -> HealthTwin {
    HealthTwin {
        patient_id: patient_id.to_string(),
        last_updated: last_updated.to_string(),
        ..Default::default()
    }
}

pub(crate) fn insights(patient_id: &str, timestamp: &str) -> PredictiveInsights {
    PredictiveInsights {
        patient_id: patient_id.to_string(),
        timestamp: timestamp.to_string(),
        insights: InsightReport {
            status: InsightStatus::Success,
            insights: None,
            early_warnings: Vec::new(),
            recommendations: Vec::new(),
            next_steps: Vec::new(),
        },
    }
}

pub(crate) fn visualization(patient_id: &str, timestamp: &str) -> VisualizationData {
    VisualizationData {
        patient_id: patient_id.to_string(),
        timestamp: timestamp.to_string(),
        ..Default::default()
    }
}

impl ScriptedSource {
    /// Every call succeeds with records for `patient_id`.
    pub fn healthy(patient_id: &str, last_updated: &str) -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Ok(twin(patient_id, last_updated))),
            insights: Mutex::new(Ok(insights(patient_id, last_updated))),
            visualization: Mutex::new(Ok(visualization(patient_id, last_updated))),
            aux_delay: Mutex::new(Duration::ZERO),
            update: Mutex::new(Ok(UpdateResponse {
                success: true,
                ..Default::default()
            })),
            update_delay: Mutex::new(Duration::ZERO),
            calls: CallCounts::default(),
        }
    }

    /// Queue one primary response, served after `delay`.
    pub fn push_twin(&self, delay: Duration, result: Result<HealthTwin, SourceError>) {
        self.steps.lock().unwrap().push_back(Step { delay, result });
    }

    pub fn set_twin(&self, result: Result<HealthTwin, SourceError>) {
        *self.fallback.lock().unwrap() = result;
    }

    pub fn set_insights(&self, result: Result<PredictiveInsights, SourceError>) {
        *self.insights.lock().unwrap() = result;
    }

    pub fn set_visualization(&self, result: Result<VisualizationData, SourceError>) {
        *self.visualization.lock().unwrap() = result;
    }

    pub fn set_aux_delay(&self, delay: Duration) {
        *self.aux_delay.lock().unwrap() = delay;
    }

    pub fn set_update(&self, result: Result<UpdateResponse, SourceError>) {
        *self.update.lock().unwrap() = result;
    }

    pub fn set_update_delay(&self, delay: Duration) {
        *self.update_delay.lock().unwrap() = delay;
    }

    async fn next_twin(&self) -> Result<HealthTwin, SourceError> {
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(step) => {
                if !step.delay.is_zero() {
                    tokio::time::sleep(step.delay).await;
                }
                step.result
            }
            None => self.fallback.lock().unwrap().clone(),
        }
    }

    async fn aux_pause(&self) {
        let delay = *self.aux_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl HealthTwinSource for ScriptedSource {
    async fn get_health_twin(&self, _patient_id: &str) -> Result<HealthTwin, SourceError> {
        self.calls.twin.fetch_add(1, Ordering::SeqCst);
        self.next_twin().await
    }

    async fn get_comprehensive_health_twin(
        &self,
        _patient_id: &str,
    ) -> Result<ComprehensiveHealthTwin, SourceError> {
        self.calls.comprehensive.fetch_add(1, Ordering::SeqCst);
        self.next_twin().await.map(|twin| ComprehensiveHealthTwin {
            twin,
            population_comparison: Some(PopulationComparison {
                risk_percentile: 50.0,
                health_score_percentile: 50.0,
            }),
            ai_insights: None,
        })
    }

    async fn get_predictive_insights(
        &self,
        _patient_id: &str,
    ) -> Result<PredictiveInsights, SourceError> {
        self.calls.insights.fetch_add(1, Ordering::SeqCst);
        self.aux_pause().await;
        self.insights.lock().unwrap().clone()
    }

    async fn get_visualization_data(
        &self,
        _patient_id: &str,
    ) -> Result<VisualizationData, SourceError> {
        self.calls.visualization.fetch_add(1, Ordering::SeqCst);
        self.aux_pause().await;
        self.visualization.lock().unwrap().clone()
    }

    async fn update_health_twin(
        &self,
        _patient_id: &str,
        _update: &HealthTwinUpdate,
    ) -> Result<UpdateResponse, SourceError> {
        self.calls.update.fetch_add(1, Ordering::SeqCst);
        let delay = *self.update_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.update.lock().unwrap().clone()
    }
}
