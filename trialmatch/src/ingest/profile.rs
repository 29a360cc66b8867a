//! Intake-side derivations: structured profile inference from the narrative,
//! completeness scoring, and the canonical patient embedding text.

use crate::models::{PatientProfile, StructuredProfile};
use crate::signals::BIOMARKER_VOCABULARY;

/// Keyword to canonical diagnosis label, checked in order; first hit wins.
const KEYWORDS_TO_DIAGNOSIS: [(&str, &str); 5] = [
    ("her2", "HER2+ Breast Cancer"),
    ("triple-negative", "Triple-Negative Breast Cancer"),
    ("tnbc", "Triple-Negative Breast Cancer"),
    ("brca", "BRCA-Mutated Breast Cancer"),
    ("hr+", "HR+/HER2- Breast Cancer"),
];

pub fn infer_structured_profile(story: &str) -> StructuredProfile {
    let lowered = story.to_lowercase();

    let diagnosis = KEYWORDS_TO_DIAGNOSIS
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map(|(_, diagnosis)| diagnosis.to_string());

    let markers: Vec<String> = BIOMARKER_VOCABULARY
        .iter()
        .filter(|marker| lowered.contains(*marker))
        .map(|marker| marker.to_string())
        .collect();

    let stage = if lowered.contains("stage iv") || lowered.contains("metastatic") {
        Some("Stage IV (Metastatic)".to_string())
    } else if lowered.contains("stage iii") {
        Some("Stage III".to_string())
    } else {
        None
    };

    StructuredProfile {
        diagnosis,
        stage,
        markers,
        raw_story: Some(story.to_string()),
        ..Default::default()
    }
}

/// Share of filled intake fields, 0-100. The contact channel always has a
/// value in this model, so it counts as filled whenever a contact value does.
pub fn compute_completeness(patient: &PatientProfile) -> u8 {
    let fields = [
        !patient.full_name.is_empty(),
        patient.age > 0,
        !patient.sex.is_empty(),
        !patient.city.is_empty(),
        !patient.country.is_empty(),
        !patient.language.is_empty(),
        !patient.contact_value.is_empty(),
        !patient.contact_value.is_empty(),
        !patient.story.is_empty(),
        patient.consent,
    ];
    let filled = fields.iter().filter(|f| **f).count();
    ((filled as f64 / fields.len() as f64) * 100.0).round() as u8
}

/// Canonical text embedded for a patient. Keep stable: evaluation
/// reproducibility depends on it.
pub fn patient_embedding_text(patient: &PatientProfile) -> String {
    let structured = &patient.structured_profile;
    format!(
        "Patient summary. Name: {}. Age: {}. Sex: {}. Location: {}, {}. \
         Diagnosis: {}. Stage: {}. Markers: {}. Story: {}",
        patient.full_name,
        patient.age,
        patient.sex,
        patient.city,
        patient.country,
        structured.diagnosis.as_deref().unwrap_or(""),
        structured.stage.as_deref().unwrap_or(""),
        structured.markers.join(", "),
        patient.story,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_structured_profile_her2_story() {
        let profile = infer_structured_profile(
            "Diagnosed with HER2 positive disease, now metastatic. ECOG 1.",
        );
        assert_eq!(profile.diagnosis.as_deref(), Some("HER2+ Breast Cancer"));
        assert_eq!(profile.stage.as_deref(), Some("Stage IV (Metastatic)"));
        assert!(profile.markers.contains(&"her2".to_string()));
        assert!(profile.markers.contains(&"metastatic".to_string()));
        assert!(profile.markers.contains(&"ecog".to_string()));
        assert!(profile.raw_story.is_some());
    }

    #[test]
    fn test_infer_structured_profile_first_keyword_wins() {
        // Both her2 and brca appear; her2 is checked first.
        let profile = infer_structured_profile("her2 and brca noted");
        assert_eq!(profile.diagnosis.as_deref(), Some("HER2+ Breast Cancer"));
    }

    #[test]
    fn test_infer_structured_profile_stage_iii() {
        let profile = infer_structured_profile("stage iii disease, locally advanced");
        assert_eq!(profile.stage.as_deref(), Some("Stage III"));
    }

    #[test]
    fn test_infer_structured_profile_plain_story() {
        let profile = infer_structured_profile("general checkup notes");
        assert!(profile.diagnosis.is_none());
        assert!(profile.stage.is_none());
        assert!(profile.markers.is_empty());
    }

    #[test]
    fn test_compute_completeness_full_and_empty() {
        let mut patient =
            PatientProfile::new("p1".to_string(), "PAT-1".to_string(), "org1".to_string());
        // language defaults to "English", so one field of ten is filled.
        assert_eq!(compute_completeness(&patient), 10);

        patient.full_name = "Aisha Khan".to_string();
        patient.age = 47;
        patient.sex = "female".to_string();
        patient.city = "Karachi".to_string();
        patient.country = "Pakistan".to_string();
        patient.contact_value = "aisha@example.com".to_string();
        patient.story = "HER2 positive breast cancer".to_string();
        patient.consent = true;
        assert_eq!(compute_completeness(&patient), 100);
    }

    #[test]
    fn test_patient_embedding_text_is_stable() {
        let mut patient =
            PatientProfile::new("p1".to_string(), "PAT-1".to_string(), "org1".to_string());
        patient.full_name = "Aisha Khan".to_string();
        patient.age = 47;
        patient.story = "metastatic her2".to_string();
        patient.structured_profile = infer_structured_profile(&patient.story);

        let text = patient_embedding_text(&patient);
        assert!(text.starts_with("Patient summary. Name: Aisha Khan. Age: 47."));
        assert!(text.contains("Diagnosis: HER2+ Breast Cancer."));
        assert!(text.contains("Markers: her2, metastatic."));
        assert_eq!(text, patient_embedding_text(&patient));
    }
}
