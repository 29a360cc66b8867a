use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tri-state eligibility verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallStatus {
    #[serde(rename = "Eligible")]
    Eligible,
    #[serde(rename = "Possibly Eligible")]
    PossiblyEligible,
    #[serde(rename = "Unlikely")]
    Unlikely,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Eligible => "Eligible",
            OverallStatus::PossiblyEligible => "Possibly Eligible",
            OverallStatus::Unlikely => "Unlikely",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "Eligible" => Some(OverallStatus::Eligible),
            "Possibly Eligible" => Some(OverallStatus::PossiblyEligible),
            "Unlikely" => Some(OverallStatus::Unlikely),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyFlag {
    High,
    Medium,
    Low,
}

impl UrgencyFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrgencyFlag::High => "high",
            UrgencyFlag::Medium => "medium",
            UrgencyFlag::Low => "low",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "high" => UrgencyFlag::High,
            "medium" => UrgencyFlag::Medium,
            _ => UrgencyFlag::Low,
        }
    }
}

/// Outreach lifecycle, owned by the outreach subsystem. The matching engine
/// only ever writes the initial `Pending` and must never regress it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutreachStatus {
    Pending,
    Draft,
    Sent,
    Delivered,
    Replied,
    NoResponse,
}

impl OutreachStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutreachStatus::Pending => "pending",
            OutreachStatus::Draft => "draft",
            OutreachStatus::Sent => "sent",
            OutreachStatus::Delivered => "delivered",
            OutreachStatus::Replied => "replied",
            OutreachStatus::NoResponse => "no_response",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "draft" => OutreachStatus::Draft,
            "sent" => OutreachStatus::Sent,
            "delivered" => OutreachStatus::Delivered,
            "replied" => OutreachStatus::Replied,
            "no_response" => OutreachStatus::NoResponse,
            _ => OutreachStatus::Pending,
        }
    }
}

/// One persisted evaluation per unique (patient, trial) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchEvaluation {
    pub id: String,
    pub org_id: String,
    pub patient_id: String,
    pub trial_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matching_run_id: Option<String>,

    pub eligibility_score: u8,
    pub feasibility_score: u8,
    pub urgency_score: u8,
    pub explainability_score: u8,

    pub urgency_flag: UrgencyFlag,
    pub overall_status: OverallStatus,

    pub reasons_matched: Vec<String>,
    pub reasons_failed: Vec<String>,
    pub missing_info: Vec<String>,
    pub doctor_checklist: Vec<String>,

    pub explanation_summary: String,
    pub explanation_language: String,
    pub explanation_model: String,
    pub explanation_provider: String,
    pub prompt_version: String,
    pub confidence: f64,

    pub outreach_status: OutreachStatus,
    pub vector_similarity: f64,

    /// True only on the first creation of this (patient, trial) pair.
    pub is_new: bool,
    pub last_evaluated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Upsert payload for a (patient, trial) evaluation. The store fills
/// `is_new`, preserves `outreach_status` on update, and stamps
/// `last_evaluated`.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationDraft {
    pub org_id: String,
    pub patient_id: String,
    pub trial_id: String,
    pub matching_run_id: Option<String>,
    pub eligibility_score: u8,
    pub feasibility_score: u8,
    pub urgency_score: u8,
    pub explainability_score: u8,
    pub urgency_flag: UrgencyFlag,
    pub overall_status: OverallStatus,
    pub reasons_matched: Vec<String>,
    pub reasons_failed: Vec<String>,
    pub missing_info: Vec<String>,
    pub doctor_checklist: Vec<String>,
    pub explanation_summary: String,
    pub explanation_language: String,
    pub explanation_model: String,
    pub explanation_provider: String,
    pub prompt_version: String,
    pub confidence: f64,
    pub vector_similarity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overall_status_strings() {
        assert_eq!(OverallStatus::PossiblyEligible.as_str(), "Possibly Eligible");
        assert_eq!(
            OverallStatus::parse("Possibly Eligible"),
            Some(OverallStatus::PossiblyEligible)
        );
        assert_eq!(OverallStatus::parse("eligible"), None);
    }

    #[test]
    fn test_outreach_parse_defaults_to_pending() {
        assert_eq!(OutreachStatus::parse("replied"), OutreachStatus::Replied);
        assert_eq!(OutreachStatus::parse("bogus"), OutreachStatus::Pending);
    }

    #[test]
    fn test_urgency_flag_serde() {
        let flag: UrgencyFlag = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(flag, UrgencyFlag::High);
        assert_eq!(serde_json::to_string(&UrgencyFlag::Low).unwrap(), "\"low\"");
    }
}
