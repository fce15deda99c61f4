//! Derived views over a loaded health twin: health score, quick summary,
//! data freshness and status tone. All pure functions of their inputs.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{HealthTwin, RiskLevel};

/// Starting point before risk, condition, symptom and adherence adjustments.
const BASE_SCORE: i32 = 85;

/// Recommendations surfaced as next actions.
const MAX_NEXT_ACTIONS: usize = 3;

/// Quick overview of one twin.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSummary {
    /// 0..=100.
    pub score: u8,
    pub status: String,
    pub key_insights: Vec<String>,
    pub next_actions: Vec<String>,
}

/// Heuristic 0..=100 score.
pub fn calculate_health_score(twin: &HealthTwin) -> u8 {
    let mut score = BASE_SCORE;

    score += match twin.risk_profile.overall {
        RiskLevel::Low => 10,
        RiskLevel::Medium => -5,
        RiskLevel::High => -15,
        RiskLevel::Critical => -30,
        RiskLevel::Unknown => 0,
    };

    score = score.saturating_sub(count(twin.basic_info.chronic_conditions.len()).saturating_mul(5));
    score = score.saturating_sub(count(twin.health_history.symptoms.recent.len()).saturating_mul(2));

    match twin.health_history.appointments.adherence.percent() {
        Some(pct) if pct > 80.0 => score += 5,
        Some(pct) if pct < 50.0 => score -= 10,
        _ => {}
    }

    // Clamped into 0..=100 so the cast is lossless.
    score.clamp(0, 100) as u8
}

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

pub fn generate_health_summary(twin: &HealthTwin) -> HealthSummary {
    let mut key_insights = Vec::new();

    let risk = twin.risk_profile.overall;
    if !matches!(risk, RiskLevel::Low | RiskLevel::Unknown) {
        key_insights.push(format!("Risk Level: {}", risk.as_str().to_uppercase()));
    }

    let chronic = twin.basic_info.chronic_conditions.len();
    if chronic > 0 {
        key_insights.push(format!("Managing {chronic} chronic conditions"));
    }

    let recent = twin.health_history.symptoms.recent.len();
    if recent > 0 {
        key_insights.push(format!("{recent} recent symptom reports"));
    }

    if twin.basic_info.is_pregnant {
        key_insights.push("Currently pregnant - monitoring required".to_string());
    }

    HealthSummary {
        score: calculate_health_score(twin),
        status: twin.insights.health_status.status.clone(),
        key_insights,
        next_actions: twin
            .insights
            .recommendations
            .iter()
            .take(MAX_NEXT_ACTIONS)
            .cloned()
            .collect(),
    }
}

/// Whether a server timestamp is younger than `window` at `now`.
///
/// Unparseable timestamps are stale. Timestamps ahead of `now` (clock skew)
/// count as fresh.
pub fn is_fresh(last_updated: &str, now: DateTime<Utc>, window: Duration) -> bool {
    let Ok(at) = DateTime::parse_from_rfc3339(last_updated.trim()) else {
        return false;
    };
    match now.signed_duration_since(at.with_timezone(&Utc)).to_std() {
        Ok(age) => age < window,
        Err(_) => true,
    }
}

/// Coarse presentation bucket for `insights.healthStatus.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusTone {
    Good,
    NeedsAttention,
    Critical,
    Unknown,
}

impl StatusTone {
    pub fn from_status(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "stable" | "good" => Self::Good,
            "needs_attention" | "managing_conditions" => Self::NeedsAttention,
            "critical" | "emergency" => Self::Critical,
            _ => Self::Unknown,
        }
    }
}
