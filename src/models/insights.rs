use serde::{Deserialize, Serialize};

use super::enums::{InsightStatus, Priority};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecurringSymptom {
    pub name: String,
    pub frequency: u32,
    pub trend: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SymptomPattern {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SymptomInsights {
    pub recurring_symptoms: Vec<RecurringSymptom>,
    pub patterns: Vec<SymptomPattern>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BloodPressureReading {
    pub date: String,
    pub systolic: f64,
    pub diastolic: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VitalReading {
    pub date: String,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VitalTrends {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blood_pressure: Option<Vec<BloodPressureReading>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<Vec<VitalReading>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<Vec<VitalReading>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VitalInsights {
    pub trends: VitalTrends,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InsightDetail {
    pub health_trajectory: String,
    pub overall_concern_level: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symptom_insights: Option<SymptomInsights>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vital_insights: Option<VitalInsights>,
    pub risk_factors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictiveWarning {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub urgency: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symptoms: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vitals: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NextStep {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urgency: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightReport {
    pub status: InsightStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insights: Option<InsightDetail>,
    #[serde(default)]
    pub early_warnings: Vec<PredictiveWarning>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<NextStep>,
}

/// Model-derived forecast for one patient (auxiliary fetch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictiveInsights {
    pub patient_id: String,
    #[serde(default)]
    pub timestamp: String,
    pub insights: InsightReport,
}

impl PredictiveInsights {
    /// Whether the model had enough data to say anything.
    pub fn has_insights(&self) -> bool {
        self.insights.status == InsightStatus::Success && self.insights.insights.is_some()
    }
}
