use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    EvaluationDraft, MatchEvaluation, MatchingRun, Organization, PatientProfile, Trial, TrialDraft,
};

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// A trial ranked by vector similarity (1 - cosine distance, clamped later
/// by the retriever).
#[derive(Debug, Clone)]
pub struct RankedTrial {
    pub trial: Trial,
    pub distance: f64,
}

/// Outcome of an evaluation upsert.
#[derive(Debug, Clone, Copy)]
pub struct UpsertOutcome {
    /// True when the (patient, trial) pair was created by this call.
    pub created: bool,
}

// ---------------------------------------------------------------------------
// Individual store traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait OrganizationStore: Send + Sync {
    async fn create_organization(&self, org: &Organization) -> Result<()>;
    async fn get_organization(&self, id: &str) -> Result<Option<Organization>>;
    async fn get_organization_by_slug(&self, slug: &str) -> Result<Option<Organization>>;
}

#[async_trait]
pub trait PatientStore: Send + Sync {
    async fn create_patient(&self, patient: &PatientProfile) -> Result<()>;
    async fn get_patient(&self, id: &str) -> Result<Option<PatientProfile>>;
    async fn get_patient_by_code(&self, patient_code: &str) -> Result<Option<PatientProfile>>;
    /// All patients across organizations, in stable creation order.
    async fn list_patients(&self) -> Result<Vec<PatientProfile>>;
    async fn update_patient_embedding(&self, id: &str, embedding: &[f32]) -> Result<()>;
}

#[async_trait]
pub trait TrialStore: Send + Sync {
    /// Upsert by external trial_id: embedding text/vector are replaced and
    /// sites recreated from the draft on every call.
    async fn upsert_trial(
        &self,
        draft: &TrialDraft,
        embedding_text: &str,
        embedding: &[f32],
    ) -> Result<Trial>;
    async fn get_trial_by_trial_id(&self, trial_id: &str) -> Result<Option<Trial>>;
    /// Matchable trials (recruiting statuses) in default order, with sites.
    async fn list_matchable_trials(&self, limit: u32) -> Result<Vec<Trial>>;
    /// Nearest matchable trials by cosine distance over non-null embeddings.
    async fn search_similar_trials(
        &self,
        embedding: &[f32],
        limit: u32,
    ) -> Result<Vec<RankedTrial>>;
}

#[async_trait]
pub trait EvaluationStore: Send + Sync {
    /// Idempotent upsert keyed by (patient, trial). On update the existing
    /// outreach_status is preserved and is_new forced false.
    async fn upsert_evaluation(&self, draft: &EvaluationDraft) -> Result<UpsertOutcome>;
    async fn get_evaluation(
        &self,
        patient_id: &str,
        trial_id: &str,
    ) -> Result<Option<MatchEvaluation>>;
    async fn list_evaluations_for_patient(&self, patient_id: &str)
        -> Result<Vec<MatchEvaluation>>;
    async fn delete_evaluations_for_patient(&self, patient_id: &str) -> Result<u64>;
    async fn set_outreach_status(
        &self,
        patient_id: &str,
        trial_id: &str,
        status: crate::models::OutreachStatus,
    ) -> Result<()>;
    async fn clear_is_new(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn create_run(&self, run: &MatchingRun) -> Result<()>;
    async fn update_run(&self, run: &MatchingRun) -> Result<()>;
    async fn get_run(&self, id: &str) -> Result<Option<MatchingRun>>;
    /// Most recently started run still marked running, if any.
    async fn latest_running_run(&self) -> Result<Option<MatchingRun>>;
    async fn list_running_runs(&self) -> Result<Vec<MatchingRun>>;
}

// ---------------------------------------------------------------------------
// Unified backend supertrait
// ---------------------------------------------------------------------------

/// Complete persistence backend for the matching engine.
#[async_trait]
pub trait MatchStore:
    OrganizationStore + PatientStore + TrialStore + EvaluationStore + RunStore
{
}
