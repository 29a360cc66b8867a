//! Deterministic rule scoring for one (patient, trial) pair. Everything here
//! is pure; the engine supplies similarity and normalized weights.

use crate::models::{OverallStatus, PatientProfile, ScoreWeightVector, Trial, UrgencyFlag};
use crate::signals::{
    clamp, derive_urgency, extract_age_limits, extract_markers, jaccard, sex_constraint, tokenize,
};

#[derive(Debug, Clone)]
pub struct RuleEvaluation {
    pub eligibility_score: u8,
    pub feasibility_score: u8,
    pub urgency_score: u8,
    pub explainability_score: u8,
    pub urgency_flag: UrgencyFlag,
    pub weighted_score: f64,
    pub overall_status: OverallStatus,
    pub reasons_matched: Vec<String>,
    pub reasons_failed: Vec<String>,
    pub missing_info: Vec<String>,
    pub doctor_checklist: Vec<String>,
    pub confidence: f64,
}

/// Token overlap between the patient's diagnosis text and the trial's
/// condition list. Shared with the retriever's lexical scoring.
pub fn condition_overlap_score(patient: &PatientProfile, trial: &Trial) -> f64 {
    let patient_tokens = tokenize(&format!(
        "{} {} {}",
        patient.diagnosis, patient.story, patient.stage
    ));
    let trial_tokens = tokenize(&trial.conditions.join(" "));
    jaccard(&patient_tokens, &trial_tokens)
}

fn marker_overlap_score(patient: &PatientProfile, trial: &Trial) -> (f64, Vec<String>) {
    let markers = extract_markers(patient);
    if markers.is_empty() {
        return (0.0, Vec::new());
    }
    let text = trial.combined_text();
    let mut matched: Vec<String> = markers
        .iter()
        .filter(|m| text.contains(m.as_str()))
        .cloned()
        .collect();
    matched.sort();
    let score = matched.len() as f64 / markers.len().max(1) as f64;
    (score, matched)
}

/// Graded travel feasibility. Matching is substring-based on lowercased
/// fields, so an empty patient country never blocks a city-level hit.
pub fn location_feasibility(patient: &PatientProfile, trial: &Trial) -> (f64, String) {
    let patient_city = patient.city.to_lowercase();
    let patient_country = patient.country.to_lowercase();

    for site in &trial.sites {
        if !patient_city.is_empty()
            && site.city.to_lowercase().contains(&patient_city)
            && site.country.to_lowercase().contains(&patient_country)
        {
            return (
                1.0,
                "Patient city and country align with a recruiting site".to_string(),
            );
        }
    }

    for site in &trial.sites {
        if !patient_country.is_empty() && site.country.to_lowercase().contains(&patient_country) {
            return (
                0.8,
                "Patient country aligns with a recruiting site".to_string(),
            );
        }
    }

    if !patient_country.is_empty()
        && trial
            .countries
            .iter()
            .any(|c| c.to_lowercase().contains(&patient_country))
    {
        return (
            0.7,
            "Patient country aligns with trial country availability".to_string(),
        );
    }

    if trial.sites.is_empty() {
        return (
            0.6,
            "Trial site data is limited; coordinator should confirm logistics".to_string(),
        );
    }

    (
        0.45,
        "Travel feasibility requires coordinator confirmation".to_string(),
    )
}

pub fn evaluate_rules(
    patient: &PatientProfile,
    trial: &Trial,
    similarity: f64,
    weights: &ScoreWeightVector,
) -> RuleEvaluation {
    let mut reasons_matched: Vec<String> = Vec::new();
    let mut reasons_failed: Vec<String> = Vec::new();
    let mut missing_info: Vec<String> = Vec::new();

    let trial_text = trial.combined_text();
    let condition_overlap = condition_overlap_score(patient, trial);
    let (marker_overlap, matched_markers) = marker_overlap_score(patient, trial);

    if condition_overlap >= 0.08 {
        reasons_matched.push("Diagnosis profile overlaps with trial condition focus".to_string());
    } else {
        reasons_failed.push("Diagnosis alignment with trial conditions is weak".to_string());
    }

    if !matched_markers.is_empty() {
        let shown: Vec<&str> = matched_markers.iter().take(3).map(String::as_str).collect();
        reasons_matched.push(format!("Biomarker alignment noted ({})", shown.join(", ")));
    } else {
        missing_info.push("Biomarker alignment unclear from provided records".to_string());
    }

    let (min_age, max_age) = extract_age_limits(&trial_text);
    let mut age_penalty = 0i64;
    match (min_age, max_age) {
        (Some(min), _) if patient.age < min => {
            reasons_failed.push(format!(
                "Patient age {} is below trial minimum age {}",
                patient.age, min
            ));
            age_penalty += 35;
        }
        (_, Some(max)) if patient.age > max => {
            reasons_failed.push(format!(
                "Patient age {} is above trial maximum age {}",
                patient.age, max
            ));
            age_penalty += 35;
        }
        (Some(_), _) | (_, Some(_)) => {
            reasons_matched.push("Patient age falls within trial age window".to_string());
        }
        (None, None) => {
            missing_info.push(
                "Age criteria could not be extracted from trial eligibility text".to_string(),
            );
        }
    }

    let (sex_ok, sex_reason) = sex_constraint(&trial_text, &patient.sex);
    match sex_ok {
        Some(false) => reasons_failed.push(sex_reason),
        Some(true) if !sex_reason.is_empty() => reasons_matched.push(sex_reason),
        _ => missing_info.push("Sex-specific eligibility constraints are not explicit".to_string()),
    }

    if trial.status.is_matchable() {
        reasons_matched.push(format!("Trial status is {}", trial.status.as_str()));
    } else {
        reasons_failed.push("Trial is not currently available for matching".to_string());
    }

    let (location_score, location_reason) = location_feasibility(patient, trial);
    if location_score >= 0.8 {
        reasons_matched.push(location_reason);
    } else {
        missing_info.push(location_reason);
    }

    let story = patient.story.to_lowercase();
    if !story.contains("ecog") {
        missing_info.push("ECOG/performance status missing".to_string());
    }
    if !story.contains("bilirubin") && !story.contains("cbc") && !story.contains("creatinine") {
        missing_info.push("Recent labs are missing (CBC/LFTs/renal)".to_string());
    }

    let doctor_checklist = vec![
        "Order CBC with differential".to_string(),
        "Order hepatic and renal function panel".to_string(),
        "Confirm ECOG performance status".to_string(),
        "Review inclusion/exclusion criteria with treating oncologist".to_string(),
    ];

    // Per-term truncation is deliberate: each contribution floors before
    // summation.
    let mut eligibility = 32
        + (condition_overlap * 34.0) as i64
        + (marker_overlap * 18.0) as i64
        + (similarity * 16.0) as i64;
    if !trial.status.is_matchable() {
        eligibility -= 25;
    }
    eligibility -= age_penalty;
    eligibility -= reasons_failed.len() as i64 * 7;
    let eligibility_score = clamp(eligibility as f64, 0.0, 100.0) as u8;

    let mut feasibility = 40
        + (location_score * 45.0) as i64
        + (patient.profile_completeness as f64 / 10.0).min(15.0) as i64;
    if missing_info.iter().any(|m| m.contains("Travel feasibility")) {
        feasibility -= 6;
    }
    let feasibility_score = clamp(feasibility as f64, 0.0, 100.0) as u8;

    let (urgency_score, urgency_flag) = derive_urgency(patient);
    let explainability =
        96 - missing_info.len() as i64 * 10 - reasons_failed.len() as i64 * 8;
    let explainability_score = clamp(explainability as f64, 30.0, 99.0) as u8;

    let weighted_score = eligibility_score as f64 * weights.eligibility
        + feasibility_score as f64 * weights.feasibility
        + urgency_score as f64 * weights.urgency
        + explainability_score as f64 * weights.explainability;

    let overall_status = if weighted_score >= 78.0 && reasons_failed.is_empty() {
        OverallStatus::Eligible
    } else if weighted_score >= 55.0 {
        OverallStatus::PossiblyEligible
    } else {
        OverallStatus::Unlikely
    };

    let confidence = 0.34 + (weighted_score / 100.0) * 0.44 + similarity * 0.14
        - missing_info.len() as f64 * 0.02;
    let confidence = (clamp(confidence, 0.2, 0.97) * 100.0).round() / 100.0;

    RuleEvaluation {
        eligibility_score,
        feasibility_score,
        urgency_score,
        explainability_score,
        urgency_flag,
        weighted_score: (weighted_score * 100.0).round() / 100.0,
        overall_status,
        reasons_matched,
        reasons_failed,
        missing_info,
        doctor_checklist,
        confidence,
    }
}
