use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Stopped,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Stopped => "stopped",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "running" => RunStatus::Running,
            "completed" => RunStatus::Completed,
            "failed" => RunStatus::Failed,
            _ => RunStatus::Stopped,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// Run bookkeeping. Explicit fields for everything the coordinator and the
/// stop command write; unknown keys survive in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patients: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updates: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_requested: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_requested_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One full-population matching cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingRun {
    pub id: String,
    pub run_type: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub metadata: RunMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MatchingRun {
    pub fn new(id: String, run_type: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            run_type,
            status: RunStatus::Running,
            started_at: now,
            finished_at: None,
            metadata: RunMetadata::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_terminality() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Stopped.is_terminal());
    }

    #[test]
    fn test_metadata_round_trip_preserves_unknown_keys() {
        let raw = serde_json::json!({
            "patients": 12,
            "updates": 40,
            "trigger_host": "worker-2",
        });
        let metadata: RunMetadata = serde_json::from_value(raw).unwrap();
        assert_eq!(metadata.patients, Some(12));
        assert_eq!(metadata.updates, Some(40));
        assert!(metadata.extra.contains_key("trigger_host"));

        let back = serde_json::to_value(&metadata).unwrap();
        assert_eq!(back["trigger_host"], "worker-2");
    }

    #[test]
    fn test_new_run_starts_running() {
        let run = MatchingRun::new("r1".to_string(), "manual".to_string());
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.finished_at.is_none());
    }
}
