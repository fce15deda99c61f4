use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VisualPatientInfo {
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub chronic_conditions: Vec<String>,
    pub risk_factors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SymptomPoint {
    pub id: String,
    pub timestamp: i64,
    pub date: String,
    pub symptoms: Vec<String>,
    pub count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SymptomSeries {
    /// Symptoms reported per date.
    pub timeline: HashMap<String, Vec<String>>,
    pub raw: Vec<SymptomPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VitalPoint {
    pub timestamp: i64,
    pub date: String,
    pub value: f64,
    pub unit: String,
    pub normal_range: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppointmentPoint {
    pub id: String,
    pub scheduled_time: i64,
    pub status: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub notes: String,
}

/// Chart-ready series for one patient (auxiliary fetch).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VisualizationData {
    pub patient_id: String,
    pub patient_info: VisualPatientInfo,
    pub symptom_data: SymptomSeries,
    /// Keyed by vital name (e.g. "heartRate").
    pub vital_signs: HashMap<String, Vec<VitalPoint>>,
    pub appointments: Vec<AppointmentPoint>,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visualization_payload_decodes() {
        let data: VisualizationData = serde_json::from_value(serde_json::json!({
            "patientId": "p1",
            "patientInfo": { "name": "Kofi", "age": 61 },
            "symptomData": { "timeline": { "2024-01-02": ["headache"] }, "raw": [] },
            "vitalSigns": { "heartRate": [{ "timestamp": 1, "date": "2024-01-02", "value": 88.0, "unit": "bpm", "normalRange": "60-100" }] },
            "appointments": [{ "id": "a1", "scheduledTime": 2, "status": "scheduled", "type": "follow-up", "notes": "" }],
            "timestamp": "2024-01-02T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(data.patient_info.age, 61);
        assert_eq!(data.symptom_data.timeline["2024-01-02"], vec!["headache".to_string()]);
        assert_eq!(data.vital_signs["heartRate"][0].unit, "bpm");
        assert_eq!(data.appointments[0].kind, "follow-up");
    }
}
