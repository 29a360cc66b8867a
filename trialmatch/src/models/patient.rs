use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactChannel {
    Sms,
    Whatsapp,
    Email,
    Phone,
}

impl ContactChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactChannel::Sms => "sms",
            ContactChannel::Whatsapp => "whatsapp",
            ContactChannel::Email => "email",
            ContactChannel::Phone => "phone",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "sms" => ContactChannel::Sms,
            "whatsapp" => ContactChannel::Whatsapp,
            "phone" => ContactChannel::Phone,
            _ => ContactChannel::Email,
        }
    }
}

/// Structured signals derived from the patient's narrative and documents.
/// Explicit fields cover everything the matcher reads; anything else an
/// upstream extractor emits lands in `extra` untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuredProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub markers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_story: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clean_story: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl StructuredProfile {
    /// Marker strings, lowercased and trimmed, empty entries dropped.
    pub fn clean_markers(&self) -> Vec<String> {
        self.markers
            .iter()
            .map(|m| m.trim().to_lowercase())
            .filter(|m| !m.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientProfile {
    pub id: String,
    pub patient_code: String,
    pub org_id: String,
    pub full_name: String,
    pub age: u32,
    pub sex: String,
    pub city: String,
    pub country: String,
    pub language: String,
    pub diagnosis: String,
    pub stage: String,
    pub story: String,
    pub structured_profile: StructuredProfile,
    pub contact_channel: ContactChannel,
    pub contact_value: String,
    pub consent: bool,
    /// Intake completeness, 0-100.
    pub profile_completeness: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PatientProfile {
    pub fn new(id: String, patient_code: String, org_id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            patient_code,
            org_id,
            full_name: String::new(),
            age: 0,
            sex: String::new(),
            city: String::new(),
            country: String::new(),
            language: "English".to_string(),
            diagnosis: String::new(),
            stage: String::new(),
            story: String::new(),
            structured_profile: StructuredProfile::default(),
            contact_channel: ContactChannel::Email,
            contact_value: String::new(),
            consent: false,
            profile_completeness: 0,
            embedding: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Two-letter language tag used for explanation records.
    pub fn language_tag(&self) -> String {
        let tag: String = self.language.chars().take(2).collect::<String>().to_lowercase();
        if tag.is_empty() {
            "en".to_string()
        } else {
            tag
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_tag() {
        let mut patient =
            PatientProfile::new("p1".to_string(), "PAT-1".to_string(), "org1".to_string());
        assert_eq!(patient.language_tag(), "en");
        patient.language = "Urdu".to_string();
        assert_eq!(patient.language_tag(), "ur");
        patient.language = String::new();
        assert_eq!(patient.language_tag(), "en");
    }

    #[test]
    fn test_structured_profile_round_trip_preserves_extra() {
        let raw = serde_json::json!({
            "diagnosis": "HER2+ Breast Cancer",
            "markers": ["her2", "metastatic"],
            "ingest_version": 3,
        });
        let profile: StructuredProfile = serde_json::from_value(raw).unwrap();
        assert_eq!(profile.diagnosis.as_deref(), Some("HER2+ Breast Cancer"));
        assert_eq!(profile.markers.len(), 2);
        assert!(profile.extra.contains_key("ingest_version"));

        let back = serde_json::to_value(&profile).unwrap();
        assert_eq!(back["ingest_version"], 3);
    }

    #[test]
    fn test_clean_markers_drops_blank_entries() {
        let profile = StructuredProfile {
            markers: vec!["  HER2 ".to_string(), String::new(), "brca".to_string()],
            ..Default::default()
        };
        assert_eq!(profile.clean_markers(), vec!["her2", "brca"]);
    }

    #[test]
    fn test_contact_channel_parse_defaults_to_email() {
        assert_eq!(ContactChannel::parse("whatsapp"), ContactChannel::Whatsapp);
        assert_eq!(ContactChannel::parse("fax"), ContactChannel::Email);
    }
}
