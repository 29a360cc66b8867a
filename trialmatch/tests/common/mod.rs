use std::sync::Arc;

use trialmatch::config::Config;
use trialmatch::db::{Database, LibSqlBackend, MatchStore, OrganizationStore, PatientStore};
use trialmatch::embeddings::EmbeddingProvider;
use trialmatch::ingest::{self, infer_structured_profile};
use trialmatch::llm::ExplanationProvider;
use trialmatch::matching::{MatchingEngine, ProcessLock};
use trialmatch::models::{Organization, PatientProfile};
use uuid::Uuid;

pub async fn store() -> Arc<dyn MatchStore> {
    let database = Database::in_memory().await.expect("in-memory database");
    Arc::new(LibSqlBackend::new(database))
}

/// Engine with deterministic embeddings and fallback-only explanations.
/// Each test passes its own lock key so concurrent tests never contend.
pub fn engine(store: Arc<dyn MatchStore>, lock_key: &str) -> MatchingEngine {
    let config = Config::from_env();
    MatchingEngine::new(
        store,
        Arc::new(EmbeddingProvider::deterministic(384)),
        Arc::new(ExplanationProvider::fallback_only()),
        Arc::new(ProcessLock::new(lock_key.to_string())),
        &config,
    )
}

pub async fn seed_sample_trials(store: &dyn MatchStore) {
    let embeddings = EmbeddingProvider::deterministic(384);
    ingest::ingest_sample_trials(store, &embeddings)
        .await
        .expect("sample trials ingest");
}

pub async fn create_org(store: &dyn MatchStore) -> Organization {
    let org = Organization::new(
        Uuid::new_v4().to_string(),
        "Aga Khan University Hospital".to_string(),
        "aga-khan-demo".to_string(),
        "Pakistan".to_string(),
    );
    store.create_organization(&org).await.expect("create org");
    org
}

/// A well-documented HER2-positive metastatic patient in Karachi.
pub async fn her2_patient(store: &dyn MatchStore, org_id: &str) -> PatientProfile {
    let mut patient = PatientProfile::new(
        Uuid::new_v4().to_string(),
        "PAT-0001".to_string(),
        org_id.to_string(),
    );
    patient.full_name = "Aisha Khan".to_string();
    patient.age = 47;
    patient.sex = "female".to_string();
    patient.city = "Karachi".to_string();
    patient.country = "Pakistan".to_string();
    patient.diagnosis = "HER2-positive Breast Cancer".to_string();
    patient.stage = "Stage IV".to_string();
    patient.story = "HER2 positive metastatic breast cancer. ECOG 1. CBC done.".to_string();
    patient.structured_profile = infer_structured_profile(&patient.story);
    patient.contact_value = "aisha.khan@example.com".to_string();
    patient.consent = true;
    patient.profile_completeness = 90;
    store.create_patient(&patient).await.expect("create patient");
    patient
}

/// A patient whose intake is gibberish with no structured signals.
pub async fn gibberish_patient(store: &dyn MatchStore, org_id: &str) -> PatientProfile {
    let mut patient = PatientProfile::new(
        Uuid::new_v4().to_string(),
        "PAT-0002".to_string(),
        org_id.to_string(),
    );
    patient.full_name = "Omar Malik".to_string();
    patient.age = 52;
    patient.sex = "male".to_string();
    patient.city = "Lahore".to_string();
    patient.country = "Pakistan".to_string();
    patient.story = "lorem zyxw qwer asdf zxcv tyui ghjk".to_string();
    patient.consent = true;
    patient.profile_completeness = 25;
    store.create_patient(&patient).await.expect("create patient");
    patient
}
