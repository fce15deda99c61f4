use serde::{Deserialize, Serialize};

/// Error for wire strings that do not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {field} value: {value}")]
pub struct InvalidEnum {
    pub field: String,
    pub value: String,
}

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The wire name doubles as the serde name.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = InvalidEnum;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(Severity {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

str_enum!(Priority {
    Low => "low",
    Medium => "medium",
    High => "high",
});

str_enum!(UpdateKind {
    Vitals => "vitals",
    Symptoms => "symptoms",
    Medications => "medications",
    Lifestyle => "lifestyle",
});

str_enum!(AlertKind {
    RiskScoreChange => "risk_score_change",
    CriticalSymptoms => "critical_symptoms",
    VitalAlert => "vital_alert",
});

str_enum!(SymptomSeverity {
    Mild => "mild",
    Moderate => "moderate",
    Severe => "severe",
});

str_enum!(LabStatus {
    Normal => "normal",
    Abnormal => "abnormal",
    Critical => "critical",
});

str_enum!(AppointmentStatus {
    Scheduled => "scheduled",
    Completed => "completed",
    Cancelled => "cancelled",
});

str_enum!(TimelineKind {
    Symptom => "symptom",
    Appointment => "appointment",
    LabResult => "lab_result",
    Medication => "medication",
    Emergency => "emergency",
});

str_enum!(Trajectory {
    Improving => "improving",
    Stable => "stable",
    Declining => "declining",
});

str_enum!(Progression {
    Stable => "stable",
    Increasing => "increasing",
    Decreasing => "decreasing",
});

str_enum!(Urgency {
    Routine => "routine",
    Urgent => "urgent",
});

str_enum!(RecommendationCategory {
    Lifestyle => "lifestyle",
    Medical => "medical",
    Monitoring => "monitoring",
});

str_enum!(InsightStatus {
    Success => "success",
    InsufficientData => "insufficient_data",
    Error => "error",
});

str_enum!(ExerciseLevel {
    Low => "low",
    Moderate => "moderate",
    High => "high",
});

str_enum!(DietQuality {
    Poor => "poor",
    Average => "average",
    Healthy => "healthy",
});

str_enum!(StressLevel {
    Low => "low",
    Medium => "medium",
    High => "high",
});

/// Overall risk category of a twin. Unrecognised wire values map to `Unknown`
/// so a new server-side category does not break decoding of the whole twin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
    #[default]
    #[serde(other)]
    Unknown,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
            Self::Unknown => "unknown",
        }
    }

    /// Display label, e.g. "High Risk".
    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "Low Risk",
            Self::Medium => "Medium Risk",
            Self::High => "High Risk",
            Self::Critical => "Critical Risk",
            Self::Unknown => "Unknown",
        }
    }

    /// Case-insensitive parse; anything unrecognised is `Unknown`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            "critical" => Self::Critical,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn alert_kind_round_trip() {
        for (variant, s) in [
            (AlertKind::RiskScoreChange, "risk_score_change"),
            (AlertKind::CriticalSymptoms, "critical_symptoms"),
            (AlertKind::VitalAlert, "vital_alert"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(AlertKind::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&TimelineKind::LabResult).unwrap();
        assert_eq!(json, "\"lab_result\"");
        let back: InsightStatus = serde_json::from_str("\"insufficient_data\"").unwrap();
        assert_eq!(back, InsightStatus::InsufficientData);
    }

    #[test]
    fn invalid_enum_returns_error() {
        let err = UpdateKind::from_str("weather").unwrap_err();
        assert_eq!(err.field, "UpdateKind");
        assert_eq!(err.value, "weather");
        assert!(Severity::from_str("").is_err());
    }

    #[test]
    fn risk_level_unknown_values_decode_as_unknown() {
        let level: RiskLevel = serde_json::from_str("\"extreme\"").unwrap();
        assert_eq!(level, RiskLevel::Unknown);
        let level: RiskLevel = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(level, RiskLevel::Critical);
    }

    #[test]
    fn risk_level_labels() {
        assert_eq!(RiskLevel::Low.label(), "Low Risk");
        assert_eq!(RiskLevel::Critical.label(), "Critical Risk");
        assert_eq!(RiskLevel::parse_lenient(" HIGH ").label(), "High Risk");
        assert_eq!(RiskLevel::parse_lenient("n/a").label(), "Unknown");
    }
}
