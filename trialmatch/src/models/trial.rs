use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trial recruitment status as reported by the registry. Unknown registry
/// values are preserved verbatim so re-exports stay lossless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrialStatus {
    Recruiting,
    NotYetRecruiting,
    ActiveNotRecruiting,
    Completed,
    Other(String),
}

impl TrialStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "RECRUITING" => TrialStatus::Recruiting,
            "NOT_YET_RECRUITING" => TrialStatus::NotYetRecruiting,
            "ACTIVE_NOT_RECRUITING" => TrialStatus::ActiveNotRecruiting,
            "COMPLETED" => TrialStatus::Completed,
            other => TrialStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TrialStatus::Recruiting => "RECRUITING",
            TrialStatus::NotYetRecruiting => "NOT_YET_RECRUITING",
            TrialStatus::ActiveNotRecruiting => "ACTIVE_NOT_RECRUITING",
            TrialStatus::Completed => "COMPLETED",
            TrialStatus::Other(raw) => raw,
        }
    }

    /// Whether this trial may receive new matches.
    pub fn is_matchable(&self) -> bool {
        matches!(
            self,
            TrialStatus::Recruiting
                | TrialStatus::NotYetRecruiting
                | TrialStatus::ActiveNotRecruiting
        )
    }
}

impl Serialize for TrialStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TrialStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(TrialStatus::parse(&raw))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialSite {
    pub id: String,
    pub trial_id: String,
    pub facility: String,
    pub city: String,
    pub country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trial {
    pub id: String,
    pub source: String,
    /// External registry identifier (e.g. NCT number). Unique.
    pub trial_id: String,
    pub title: String,
    pub phase: String,
    pub status: TrialStatus,
    pub conditions: Vec<String>,
    pub interventions: Vec<String>,
    pub countries: Vec<String>,
    pub sponsor: String,
    pub summary: String,
    pub eligibility_summary: String,
    pub inclusion_text: String,
    pub exclusion_text: String,
    pub embedding_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub source_url: String,
    pub sites: Vec<TrialSite>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trial {
    /// Concatenated lowercase free text used by the rule evaluator for
    /// marker, age, and sex checks.
    pub fn combined_text(&self) -> String {
        [
            self.title.as_str(),
            self.summary.as_str(),
            self.eligibility_summary.as_str(),
            self.inclusion_text.as_str(),
            self.exclusion_text.as_str(),
            &self.conditions.join(" "),
            &self.interventions.join(" "),
        ]
        .join(" ")
        .to_lowercase()
    }
}

/// Ingestion payload for a trial upsert. The persisted `Trial` is produced by
/// the store, which replaces sites wholesale and recomputes the embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialDraft {
    pub trial_id: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub phase: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub interventions: Vec<String>,
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default)]
    pub sponsor: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub eligibility_summary: String,
    #[serde(default)]
    pub inclusion_text: String,
    #[serde(default)]
    pub exclusion_text: String,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub sites: Vec<TrialSiteDraft>,
}

fn default_status() -> String {
    "RECRUITING".to_string()
}

// Keep `Default` in sync with the serde field defaults above, so drafts built
// in Rust get the same `status` a deserialized payload would.
impl Default for TrialDraft {
    fn default() -> Self {
        Self {
            trial_id: String::new(),
            source: String::new(),
            title: String::new(),
            phase: String::new(),
            status: default_status(),
            conditions: Vec::new(),
            interventions: Vec::new(),
            countries: Vec::new(),
            sponsor: String::new(),
            summary: String::new(),
            eligibility_summary: String::new(),
            inclusion_text: String::new(),
            exclusion_text: String::new(),
            source_url: String::new(),
            sites: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrialSiteDraft {
    #[serde(default)]
    pub facility: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_and_matchability() {
        assert!(TrialStatus::parse("recruiting").is_matchable());
        assert!(TrialStatus::parse("NOT_YET_RECRUITING").is_matchable());
        assert!(TrialStatus::parse("ACTIVE_NOT_RECRUITING").is_matchable());
        assert!(!TrialStatus::parse("COMPLETED").is_matchable());

        let withdrawn = TrialStatus::parse("WITHDRAWN");
        assert!(!withdrawn.is_matchable());
        assert_eq!(withdrawn.as_str(), "WITHDRAWN");
    }

    #[test]
    fn test_status_serde_round_trip() {
        let status: TrialStatus = serde_json::from_str("\"RECRUITING\"").unwrap();
        assert_eq!(status, TrialStatus::Recruiting);
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"RECRUITING\"");
    }

    #[test]
    fn test_combined_text_includes_conditions() {
        let mut trial = TrialDraft {
            trial_id: "NCT-1".to_string(),
            title: "HER2 Study".to_string(),
            conditions: vec!["Breast Cancer".to_string()],
            ..Default::default()
        };
        trial.inclusion_text = "Minimum age 18 years".to_string();
        let trial = Trial {
            id: "t1".to_string(),
            source: String::new(),
            trial_id: trial.trial_id,
            title: trial.title,
            phase: String::new(),
            status: TrialStatus::Recruiting,
            conditions: trial.conditions,
            interventions: Vec::new(),
            countries: Vec::new(),
            sponsor: String::new(),
            summary: String::new(),
            eligibility_summary: String::new(),
            inclusion_text: trial.inclusion_text,
            exclusion_text: String::new(),
            embedding_text: String::new(),
            embedding: None,
            source_url: String::new(),
            sites: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let text = trial.combined_text();
        assert!(text.contains("her2 study"));
        assert!(text.contains("breast cancer"));
        assert!(text.contains("minimum age 18"));
    }
}
