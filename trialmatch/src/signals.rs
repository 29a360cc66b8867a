//! Text signal extraction: tokenizing, biomarker detection, eligibility
//! phrase parsing, and the meaningful-clinical-context gate that decides
//! whether a patient enters matching at all.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{PatientProfile, UrgencyFlag};

static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9+\-]{3,}").unwrap());

static AGE_RANGE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,3})\s*(?:-|to)\s*(\d{1,3})\s*(?:years|year|yrs|yr|yo|y/o)").unwrap()
});

static MIN_AGE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:minimum age|min age)\s*[:\-]?\s*(\d{1,3})").unwrap());

static MAX_AGE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:maximum age|max age)\s*[:\-]?\s*(\d{1,3})").unwrap());

static MEDICAL_SIGNAL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(cancer|tumou?r|metasta\w+|stage|ecog|her2|brca|chemo\w*|radiation|biopsy|diagnos\w+|treatment|surgery|hormone|receptor|trial|oncolog\w+|carcinoma|lymphoma|leukemia|platelet|bilirubin|creatinine|cbc|lft|lab|blood|symptom|pain|mri|ct|scan)\b",
    )
    .unwrap()
});

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "with", "from", "have", "been", "that", "this", "were", "which", "will", "patient",
        "patients", "trial", "study", "disease", "cancer", "treatment", "prior", "after",
        "before", "under", "over", "into", "and", "the", "for", "are",
    ])
});

/// Fixed biomarker vocabulary matched literally against patient stories.
pub const BIOMARKER_VOCABULARY: [&str; 7] =
    ["her2", "brca", "pik3ca", "ecog", "metastatic", "stage iv", "pd-l1"];

pub fn clamp(value: f64, low: f64, high: f64) -> f64 {
    value.max(low).min(high)
}

/// Lowercase alphanumeric/hyphen/plus tokens of length >= 3, stop words removed.
pub fn tokenize(text: &str) -> HashSet<String> {
    if text.is_empty() {
        return HashSet::new();
    }
    let lowered = text.to_lowercase();
    TOKEN_PATTERN
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .filter(|t| !STOP_WORDS.contains(t.as_str()))
        .collect()
}

/// Intersection over union; 0.0 when either side is empty.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

/// Structured-profile markers plus any vocabulary entry literally present in
/// the patient's story.
pub fn extract_markers(patient: &PatientProfile) -> HashSet<String> {
    let mut markers: HashSet<String> =
        patient.structured_profile.clean_markers().into_iter().collect();

    let story = patient.story.to_lowercase();
    for marker in BIOMARKER_VOCABULARY {
        if story.contains(marker) {
            markers.insert(marker.to_string());
        }
    }
    markers
}

/// Age window extracted from trial eligibility text. A `"18-75 years"` style
/// range and explicit minimum/maximum phrases are parsed independently; when
/// both appear, the explicit bound tightens the range rather than replacing it.
pub fn extract_age_limits(text: &str) -> (Option<u32>, Option<u32>) {
    let mut min_age: Option<u32> = None;
    let mut max_age: Option<u32> = None;

    if let Some(captures) = AGE_RANGE_PATTERN.captures(text) {
        min_age = captures[1].parse().ok();
        max_age = captures[2].parse().ok();
    }

    if let Some(captures) = MIN_AGE_PATTERN.captures(text) {
        if let Ok(parsed) = captures[1].parse::<u32>() {
            min_age = Some(min_age.map_or(parsed, |existing| existing.max(parsed)));
        }
    }

    if let Some(captures) = MAX_AGE_PATTERN.captures(text) {
        if let Ok(parsed) = captures[1].parse::<u32>() {
            max_age = Some(max_age.map_or(parsed, |existing| existing.min(parsed)));
        }
    }

    (min_age, max_age)
}

/// Sex constraint detection. `None` when no restriction phrase is found,
/// otherwise whether the patient satisfies it plus a display reason.
pub fn sex_constraint(trial_text: &str, patient_sex: &str) -> (Option<bool>, String) {
    let lowered = trial_text.to_lowercase();
    let patient_sex = patient_sex.trim().to_lowercase();

    let female_only = lowered.contains("female") || lowered.contains("women");
    let male_only = lowered.contains("male only") || lowered.contains("men only");

    if female_only && !patient_sex.is_empty() && patient_sex != "female" {
        return (
            Some(false),
            "Trial appears restricted to female participants".to_string(),
        );
    }
    if male_only && !patient_sex.is_empty() && patient_sex != "male" {
        return (
            Some(false),
            "Trial appears restricted to male participants".to_string(),
        );
    }
    if female_only || male_only {
        return (
            Some(true),
            "Patient sex aligns with trial sex requirements".to_string(),
        );
    }
    (None, String::new())
}

/// Trial-independent urgency derived from the patient's stage and story.
pub fn derive_urgency(patient: &PatientProfile) -> (u8, UrgencyFlag) {
    let text = format!("{} {}", patient.stage, patient.story).to_lowercase();
    if text.contains("stage iv") || text.contains("metastatic") || text.contains("progress") {
        return (88, UrgencyFlag::High);
    }
    if text.contains("stage iii") || text.contains("advanced") {
        return (64, UrgencyFlag::Medium);
    }
    (38, UrgencyFlag::Low)
}

fn has_repeated_char_run(text: &str) -> bool {
    let mut previous: Option<char> = None;
    let mut run = 0usize;
    for ch in text.chars() {
        if Some(ch) == previous {
            run += 1;
            if run >= 6 {
                return true;
            }
        } else {
            previous = Some(ch);
            run = 1;
        }
    }
    false
}

/// Gate run before any trial evaluation. A patient failing it is excluded
/// from matching entirely: zero work is performed and pre-existing
/// evaluations are deleted by the caller.
pub fn has_meaningful_clinical_context(patient: &PatientProfile) -> bool {
    let story = patient.story.trim();
    let diagnosis = patient.diagnosis.trim();
    let stage = patient.stage.trim();
    let markers = patient.structured_profile.clean_markers();

    let combined_text = [diagnosis, stage, story, &markers.join(" ")]
        .iter()
        .filter(|part| !part.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(" ");
    if combined_text.is_empty() {
        return false;
    }

    let lowered = combined_text.to_lowercase();
    if has_repeated_char_run(&lowered) {
        return false;
    }

    let has_structured_signal = !diagnosis.is_empty() || !stage.is_empty() || !markers.is_empty();

    let raw_tokens: Vec<&str> = TOKEN_PATTERN
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|t| !STOP_WORDS.contains(t))
        .collect();
    if raw_tokens.len() < 5 && !has_structured_signal {
        return false;
    }

    if raw_tokens.len() >= 8 {
        let unique: HashSet<&&str> = raw_tokens.iter().collect();
        let unique_ratio = unique.len() as f64 / raw_tokens.len().max(1) as f64;
        if unique_ratio < 0.4 {
            return false;
        }
    }

    let non_space: Vec<char> = combined_text.chars().filter(|c| !c.is_whitespace()).collect();
    if non_space.len() >= 16 {
        let letters = non_space.iter().filter(|c| c.is_alphabetic()).count();
        if letters > 0 && (letters as f64 / non_space.len() as f64) < 0.45 {
            return false;
        }
    }

    has_structured_signal || MEDICAL_SIGNAL_PATTERN.is_match(&combined_text)
}
