//! Health twin aggregate as served by the remote API.
//!
//! Every nested record defaults its missing fields so that a partially
//! populated twin (new patient, no labs yet) still decodes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{
    AppointmentStatus, LabStatus, Priority, Progression, RiskLevel, Severity, SymptomSeverity,
    TimelineKind, Trajectory, Urgency,
};

// ═══════════════════════════════════════════════════════════
// Patient basics
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BasicInfo {
    pub id: String,
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub contact: String,
    pub address: String,
    pub medical_history: Vec<String>,
    pub allergies: Vec<String>,
    pub chronic_conditions: Vec<String>,
    pub medications: Vec<String>,
    pub blood_type: String,
    pub last_checkup_date: String,
    pub risk_factors: Vec<String>,
    pub is_pregnant: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PregnancyData {
    pub id: String,
    pub patient_id: String,
    pub estimated_due_date: String,
    pub health_status: String,
    pub transport_booked: bool,
    pub alerts: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

// ═══════════════════════════════════════════════════════════
// Health history
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymptomCheck {
    pub id: String,
    pub patient_id: String,
    #[serde(default)]
    pub symptoms: Vec<String>,
    pub severity: SymptomSeverity,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_recommendation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabResult {
    pub id: String,
    pub patient_id: String,
    pub test_name: String,
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub normal_range: String,
    pub timestamp: i64,
    pub status: LabStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub patient_id: String,
    #[serde(default)]
    pub patient_name: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub appointment_date: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub health_worker_id: String,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatedCount {
    pub date: String,
    pub count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SymptomCount {
    pub symptom: String,
    pub count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SymptomTrends {
    pub frequency: HashMap<String, u32>,
    pub severity: HashMap<String, u32>,
    pub timeline: Vec<DatedCount>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SymptomSummary {
    pub total_reports: u32,
    pub unique_symptoms: u32,
    pub top_symptoms: Vec<SymptomCount>,
    pub last_reported: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SymptomHistory {
    pub recent: Vec<SymptomCheck>,
    pub all: Vec<SymptomCheck>,
    pub trends: SymptomTrends,
    pub summary: SymptomSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppointmentFrequency {
    pub frequency: f64,
    pub pattern: String,
}

/// Adherence is reported as a percentage string (e.g. "87.5").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Adherence {
    pub adherence: String,
    pub status: String,
}

impl Adherence {
    /// Adherence as a number, `None` when the server sent something unparseable.
    pub fn percent(&self) -> Option<f64> {
        self.adherence.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppointmentHistory {
    pub recent: Vec<Appointment>,
    pub all: Vec<Appointment>,
    pub frequency: AppointmentFrequency,
    pub adherence: Adherence,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatedValue {
    pub date: String,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LatestLab {
    pub value: f64,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LabTrends {
    pub values: HashMap<String, Vec<DatedValue>>,
    pub abnormal_count: u32,
    pub latest_results: HashMap<String, LatestLab>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LabHistory {
    pub recent: Vec<LabResult>,
    pub all: Vec<LabResult>,
    pub trends: LabTrends,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthHistory {
    pub symptoms: SymptomHistory,
    pub appointments: AppointmentHistory,
    pub lab_results: LabHistory,
}

// ═══════════════════════════════════════════════════════════
// Risk profile
// ═══════════════════════════════════════════════════════════

/// One weighted sub-score of the risk profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RiskComponent {
    pub score: f64,
    pub factors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RiskProfile {
    pub demographic: RiskComponent,
    pub behavioral: RiskComponent,
    pub clinical: RiskComponent,
    pub environmental: RiskComponent,
    pub overall: RiskLevel,
}

/// Older servers send a flat assessment instead of (or next to) the profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RiskAssessment {
    pub score: f64,
    pub level: RiskLevel,
    pub factors: Vec<String>,
}

// ═══════════════════════════════════════════════════════════
// Insights & predictions
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthStatus {
    pub status: String,
    pub factors: Vec<String>,
    pub summary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SymptomDirections {
    pub increasing: Vec<String>,
    pub decreasing: Vec<String>,
    pub stable: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentTrend {
    pub frequency: Progression,
    #[serde(default)]
    pub compliance: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InsightTrends {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symptoms: Option<SymptomDirections>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointments: Option<AppointmentTrend>,
    pub overall: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightAlert {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskIndicator {
    #[serde(rename = "type")]
    pub kind: String,
    pub factor: String,
    pub risk: Priority,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthInsights {
    pub health_status: HealthStatus,
    pub trends: InsightTrends,
    pub alerts: Vec<InsightAlert>,
    pub recommendations: Vec<String>,
    pub risk_indicators: Vec<RiskIndicator>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthTrajectory {
    pub direction: Trajectory,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub factors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskProgression {
    #[serde(default)]
    pub timeframe: String,
    pub progression: Progression,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub factors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterventionNeed {
    #[serde(rename = "type")]
    pub kind: String,
    pub urgency: Urgency,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppointmentNeeds {
    pub frequency: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitoringNeeds {
    pub required: bool,
    pub frequency: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MedicationNeeds {
    pub refill_reminder: bool,
    pub adherence_monitoring: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceRequirements {
    pub appointments: AppointmentNeeds,
    pub monitoring: MonitoringNeeds,
    pub medications: MedicationNeeds,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthPredictions {
    pub health_trajectory: Option<HealthTrajectory>,
    pub risk_progression: Option<RiskProgression>,
    pub intervention_needs: Vec<InterventionNeed>,
    pub resource_requirements: ResourceRequirements,
}

// ═══════════════════════════════════════════════════════════
// Timeline
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimelineData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
    pub date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: TimelineKind,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<TimelineData>,
}

// ═══════════════════════════════════════════════════════════
// HealthTwin / ComprehensiveHealthTwin / TwinRecord
// ═══════════════════════════════════════════════════════════

/// The base health twin record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthTwin {
    pub patient_id: String,
    /// ISO-8601 timestamp of the server-side aggregation.
    pub last_updated: String,
    pub basic_info: BasicInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pregnancy_data: Option<PregnancyData>,
    pub health_history: HealthHistory,
    pub risk_profile: RiskProfile,
    pub insights: HealthInsights,
    pub predictions: HealthPredictions,
    pub timeline: Vec<TimelineEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_assessment: Option<RiskAssessment>,
}

impl HealthTwin {
    /// Parsed `last_updated`, `None` if the server sent a malformed timestamp.
    pub fn last_updated_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.last_updated)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PopulationComparison {
    pub risk_percentile: f64,
    pub health_score_percentile: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PredictiveAnalysis {
    pub confidence_score: f64,
    pub prediction_accuracy: f64,
    pub model_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PotentialCondition {
    pub condition: String,
    pub probability: f64,
    pub symptoms: Vec<String>,
    pub timeframe: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarlyWarning {
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub timeframe: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AiInsights {
    pub predictive_analysis: PredictiveAnalysis,
    pub potential_conditions: Vec<PotentialCondition>,
    pub early_warnings: Vec<EarlyWarning>,
}

/// Twin record extended with population comparison and model output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComprehensiveHealthTwin {
    #[serde(flatten)]
    pub twin: HealthTwin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population_comparison: Option<PopulationComparison>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_insights: Option<AiInsights>,
}

/// Which twin shape the synchronizer currently holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "variant", content = "record", rename_all = "snake_case")]
pub enum TwinRecord {
    Base(HealthTwin),
    Comprehensive(ComprehensiveHealthTwin),
}

impl TwinRecord {
    /// The shared base part, whichever variant this is.
    pub fn twin(&self) -> &HealthTwin {
        match self {
            Self::Base(twin) => twin,
            Self::Comprehensive(extended) => &extended.twin,
        }
    }

    pub fn patient_id(&self) -> &str {
        &self.twin().patient_id
    }

    pub fn last_updated(&self) -> &str {
        &self.twin().last_updated
    }

    pub fn is_comprehensive(&self) -> bool {
        matches!(self, Self::Comprehensive(_))
    }
}
