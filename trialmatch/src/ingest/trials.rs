//! Trial ingestion: a built-in sample set for demos plus a minimal
//! ClinicalTrials.gov v2 fetcher.

use serde_json::Value;

use crate::db::traits::{MatchStore, TrialStore};
use crate::embeddings::EmbeddingProvider;
use crate::error::{MatchError, Result};
use crate::models::{Trial, TrialDraft, TrialSiteDraft};

/// Canonical text embedded for a trial. Recomputed on every upsert.
pub fn trial_embedding_text(draft: &TrialDraft) -> String {
    format!(
        "Trial {}. Title: {}. Conditions: {}. Interventions: {}. \
         Eligibility: {}. Inclusion: {}. Exclusion: {}. Countries: {}.",
        draft.trial_id,
        draft.title,
        draft.conditions.join(", "),
        draft.interventions.join(", "),
        draft.eligibility_summary,
        draft.inclusion_text,
        draft.exclusion_text,
        draft.countries.join(", "),
    )
}

/// Embed and upsert one trial draft.
pub async fn ingest_trial(
    store: &dyn MatchStore,
    embeddings: &EmbeddingProvider,
    draft: &TrialDraft,
) -> Result<Trial> {
    let text = trial_embedding_text(draft);
    let vector = embeddings.embed(&text).await;
    store.upsert_trial(draft, &text, &vector).await
}

pub async fn ingest_sample_trials(
    store: &dyn MatchStore,
    embeddings: &EmbeddingProvider,
) -> Result<Vec<Trial>> {
    let mut ingested = Vec::new();
    for draft in sample_trials() {
        ingested.push(ingest_trial(store, embeddings, &draft).await?);
    }
    Ok(ingested)
}

fn site(facility: &str, city: &str, country: &str) -> TrialSiteDraft {
    TrialSiteDraft {
        facility: facility.to_string(),
        city: city.to_string(),
        country: country.to_string(),
        latitude: None,
        longitude: None,
    }
}

/// Built-in demo trials, breast-cancer heavy with regional sites.
pub fn sample_trials() -> Vec<TrialDraft> {
    vec![
        TrialDraft {
            trial_id: "NCT-DEMO-0001".to_string(),
            source: "sample".to_string(),
            title: "Trastuzumab Deruxtecan in HER2-Positive Metastatic Breast Cancer".to_string(),
            phase: "PHASE3".to_string(),
            status: "RECRUITING".to_string(),
            conditions: vec![
                "HER2-positive Breast Cancer".to_string(),
                "Metastatic Breast Cancer".to_string(),
            ],
            interventions: vec!["Trastuzumab deruxtecan".to_string()],
            countries: vec!["Pakistan".to_string(), "UAE".to_string()],
            sponsor: "Sample Oncology Group".to_string(),
            summary: "Antibody-drug conjugate therapy for previously treated HER2-positive \
                      metastatic breast cancer."
                .to_string(),
            eligibility_summary: "Adults 18-75 years with HER2-positive metastatic breast cancer, \
                                  ECOG 0-1, prior anti-HER2 therapy."
                .to_string(),
            inclusion_text: "HER2-positive status confirmed. Measurable disease. ECOG 0-1. \
                             Adequate CBC, bilirubin and creatinine."
                .to_string(),
            exclusion_text: "Active brain metastases. Prior T-DXd exposure.".to_string(),
            source_url: String::new(),
            sites: vec![
                site("Aga Khan University Hospital", "Karachi", "Pakistan"),
                site("Shaukat Khanum Memorial Hospital", "Lahore", "Pakistan"),
            ],
        },
        TrialDraft {
            trial_id: "NCT-DEMO-0002".to_string(),
            source: "sample".to_string(),
            title: "Sacituzumab Govitecan for Triple-Negative Breast Cancer".to_string(),
            phase: "PHASE2".to_string(),
            status: "RECRUITING".to_string(),
            conditions: vec![
                "Triple-Negative Breast Cancer".to_string(),
                "TNBC".to_string(),
            ],
            interventions: vec!["Sacituzumab govitecan".to_string()],
            countries: vec!["Pakistan".to_string()],
            sponsor: "Sample Oncology Group".to_string(),
            summary: "Second-line therapy for metastatic triple-negative breast cancer."
                .to_string(),
            eligibility_summary: "Women 18-70 years with metastatic TNBC after one prior line."
                .to_string(),
            inclusion_text: "TNBC confirmed. Minimum age 18. ECOG 0-2.".to_string(),
            exclusion_text: "Uncontrolled infection.".to_string(),
            source_url: String::new(),
            sites: vec![site("Aga Khan University Hospital", "Karachi", "Pakistan")],
        },
        TrialDraft {
            trial_id: "NCT-DEMO-0003".to_string(),
            source: "sample".to_string(),
            title: "CDK4/6 Inhibition in HR-Positive Advanced Breast Cancer".to_string(),
            phase: "PHASE3".to_string(),
            status: "NOT_YET_RECRUITING".to_string(),
            conditions: vec!["HR+ Breast Cancer".to_string(), "Advanced Breast Cancer".to_string()],
            interventions: vec!["Ribociclib".to_string(), "Letrozole".to_string()],
            countries: vec!["UAE".to_string(), "Saudi Arabia".to_string()],
            sponsor: "Gulf Cancer Consortium".to_string(),
            summary: "Endocrine therapy combination for HR-positive HER2-negative advanced \
                      breast cancer."
                .to_string(),
            eligibility_summary: "Postmenopausal women 40-80 years, HR+/HER2- advanced disease."
                .to_string(),
            inclusion_text: "40 to 80 years. HR-positive, HER2-negative.".to_string(),
            exclusion_text: "Prior CDK4/6 inhibitor.".to_string(),
            source_url: String::new(),
            sites: vec![site("Cleveland Clinic Abu Dhabi", "Abu Dhabi", "UAE")],
        },
        TrialDraft {
            trial_id: "NCT-DEMO-0004".to_string(),
            source: "sample".to_string(),
            title: "PARP Inhibitor Maintenance for BRCA-Mutated Breast Cancer".to_string(),
            phase: "PHASE2".to_string(),
            status: "ACTIVE_NOT_RECRUITING".to_string(),
            conditions: vec!["BRCA-Mutated Breast Cancer".to_string()],
            interventions: vec!["Olaparib".to_string()],
            countries: vec!["Pakistan".to_string(), "India".to_string()],
            sponsor: "Sample Oncology Group".to_string(),
            summary: "Maintenance olaparib for germline BRCA-mutated HER2-negative breast cancer."
                .to_string(),
            eligibility_summary: "Adults 18-75 years with germline BRCA mutation.".to_string(),
            inclusion_text: "BRCA mutation confirmed. 18-75 years.".to_string(),
            exclusion_text: String::new(),
            source_url: String::new(),
            sites: vec![site("Shaukat Khanum Memorial Hospital", "Lahore", "Pakistan")],
        },
        TrialDraft {
            trial_id: "NCT-DEMO-0005".to_string(),
            source: "sample".to_string(),
            title: "Immunotherapy Plus Chemotherapy in Early TNBC".to_string(),
            phase: "PHASE3".to_string(),
            status: "COMPLETED".to_string(),
            conditions: vec!["Triple-Negative Breast Cancer".to_string()],
            interventions: vec!["Pembrolizumab".to_string(), "Carboplatin".to_string()],
            countries: vec!["Global".to_string()],
            sponsor: "Sample Oncology Group".to_string(),
            summary: "Completed neoadjuvant immunochemotherapy study, kept for reference."
                .to_string(),
            eligibility_summary: "Adults 18-70 years with early-stage TNBC.".to_string(),
            inclusion_text: "Early-stage TNBC. 18-70 years.".to_string(),
            exclusion_text: String::new(),
            source_url: String::new(),
            sites: vec![],
        },
    ]
}

/// Minimal ClinicalTrials.gov v2 extraction. Studies without an NCT id are
/// skipped; the long eligibility text doubles as inclusion text with a
/// truncated summary.
pub async fn fetch_ctgov_trials(limit: usize) -> Result<Vec<TrialDraft>> {
    let client = reqwest::Client::new();
    let response = client
        .get("https://clinicaltrials.gov/api/v2/studies")
        .query(&[
            ("pageSize", limit.to_string()),
            ("query.cond", "breast cancer".to_string()),
        ])
        .send()
        .await?
        .error_for_status()?;

    let payload: Value = response.json().await?;
    let studies = payload
        .get("studies")
        .and_then(Value::as_array)
        .ok_or_else(|| MatchError::Ingest("Unexpected registry response shape".to_string()))?;

    let mut drafts = Vec::new();
    for study in studies {
        if let Some(draft) = study_to_draft(study) {
            drafts.push(draft);
        }
    }
    Ok(drafts)
}

fn study_to_draft(study: &Value) -> Option<TrialDraft> {
    let protocol = study.get("protocolSection")?;
    let id_module = protocol.get("identificationModule");
    let trial_id = id_module?.get("nctId").and_then(Value::as_str)?;

    let eligibility_criteria = protocol
        .pointer("/eligibilityModule/eligibilityCriteria")
        .and_then(Value::as_str)
        .unwrap_or("");

    Some(TrialDraft {
        trial_id: trial_id.to_string(),
        source: "clinicaltrials.gov".to_string(),
        title: protocol
            .pointer("/identificationModule/briefTitle")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        phase: string_array(protocol.pointer("/designModule/phases")).join(", "),
        status: protocol
            .pointer("/statusModule/overallStatus")
            .and_then(Value::as_str)
            .unwrap_or("RECRUITING")
            .to_string(),
        conditions: string_array(protocol.pointer("/conditionsModule/conditions")),
        interventions: protocol
            .pointer("/armsInterventionsModule/interventions")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        countries: Vec::new(),
        sponsor: String::new(),
        summary: protocol
            .pointer("/descriptionModule/briefSummary")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        eligibility_summary: eligibility_criteria.chars().take(300).collect(),
        inclusion_text: eligibility_criteria.to_string(),
        exclusion_text: String::new(),
        source_url: format!("https://clinicaltrials.gov/study/{trial_id}"),
        sites: Vec::new(),
    })
}

fn string_array(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
