use async_trait::async_trait;
use libsql::Connection;

use crate::error::Result;
use crate::models::{
    EvaluationDraft, MatchEvaluation, MatchingRun, Organization, OutreachStatus, PatientProfile,
    Trial, TrialDraft,
};

use super::connection::Database;
use super::repository::{
    EvaluationRepository, OrganizationRepository, PatientRepository, RunRepository,
    TrialRepository,
};
use super::traits::{
    EvaluationStore, MatchStore, OrganizationStore, PatientStore, RankedTrial, RunStore,
    TrialStore, UpsertOutcome,
};

/// Store backend over a local libsql database.
pub struct LibSqlBackend {
    db: Database,
}

impl LibSqlBackend {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn conn(&self) -> Result<Connection> {
        self.db.connect()
    }
}

#[async_trait]
impl OrganizationStore for LibSqlBackend {
    async fn create_organization(&self, org: &Organization) -> Result<()> {
        OrganizationRepository::create(&self.conn()?, org).await
    }

    async fn get_organization(&self, id: &str) -> Result<Option<Organization>> {
        OrganizationRepository::get_by_id(&self.conn()?, id).await
    }

    async fn get_organization_by_slug(&self, slug: &str) -> Result<Option<Organization>> {
        OrganizationRepository::get_by_slug(&self.conn()?, slug).await
    }
}

#[async_trait]
impl PatientStore for LibSqlBackend {
    async fn create_patient(&self, patient: &PatientProfile) -> Result<()> {
        PatientRepository::create(&self.conn()?, patient).await
    }

    async fn get_patient(&self, id: &str) -> Result<Option<PatientProfile>> {
        PatientRepository::get_by_id(&self.conn()?, id).await
    }

    async fn get_patient_by_code(&self, patient_code: &str) -> Result<Option<PatientProfile>> {
        PatientRepository::get_by_code(&self.conn()?, patient_code).await
    }

    async fn list_patients(&self) -> Result<Vec<PatientProfile>> {
        PatientRepository::list_all(&self.conn()?).await
    }

    async fn update_patient_embedding(&self, id: &str, embedding: &[f32]) -> Result<()> {
        PatientRepository::update_embedding(&self.conn()?, id, embedding).await
    }
}

#[async_trait]
impl TrialStore for LibSqlBackend {
    async fn upsert_trial(
        &self,
        draft: &TrialDraft,
        embedding_text: &str,
        embedding: &[f32],
    ) -> Result<Trial> {
        TrialRepository::upsert(&self.conn()?, draft, embedding_text, embedding).await
    }

    async fn get_trial_by_trial_id(&self, trial_id: &str) -> Result<Option<Trial>> {
        TrialRepository::get_by_trial_id(&self.conn()?, trial_id).await
    }

    async fn list_matchable_trials(&self, limit: u32) -> Result<Vec<Trial>> {
        TrialRepository::list_matchable(&self.conn()?, limit).await
    }

    async fn search_similar_trials(
        &self,
        embedding: &[f32],
        limit: u32,
    ) -> Result<Vec<RankedTrial>> {
        let ranked = TrialRepository::search_similar(&self.conn()?, embedding, limit).await?;
        Ok(ranked
            .into_iter()
            .map(|(trial, distance)| RankedTrial { trial, distance })
            .collect())
    }
}

#[async_trait]
impl EvaluationStore for LibSqlBackend {
    async fn upsert_evaluation(&self, draft: &EvaluationDraft) -> Result<UpsertOutcome> {
        EvaluationRepository::upsert(&self.conn()?, draft).await
    }

    async fn get_evaluation(
        &self,
        patient_id: &str,
        trial_id: &str,
    ) -> Result<Option<MatchEvaluation>> {
        EvaluationRepository::get(&self.conn()?, patient_id, trial_id).await
    }

    async fn list_evaluations_for_patient(
        &self,
        patient_id: &str,
    ) -> Result<Vec<MatchEvaluation>> {
        EvaluationRepository::list_for_patient(&self.conn()?, patient_id).await
    }

    async fn delete_evaluations_for_patient(&self, patient_id: &str) -> Result<u64> {
        EvaluationRepository::delete_for_patient(&self.conn()?, patient_id).await
    }

    async fn set_outreach_status(
        &self,
        patient_id: &str,
        trial_id: &str,
        status: OutreachStatus,
    ) -> Result<()> {
        EvaluationRepository::set_outreach_status(&self.conn()?, patient_id, trial_id, status)
            .await
    }

    async fn clear_is_new(&self, id: &str) -> Result<()> {
        EvaluationRepository::clear_is_new(&self.conn()?, id).await
    }
}

#[async_trait]
impl RunStore for LibSqlBackend {
    async fn create_run(&self, run: &MatchingRun) -> Result<()> {
        RunRepository::create(&self.conn()?, run).await
    }

    async fn update_run(&self, run: &MatchingRun) -> Result<()> {
        RunRepository::update(&self.conn()?, run).await
    }

    async fn get_run(&self, id: &str) -> Result<Option<MatchingRun>> {
        RunRepository::get_by_id(&self.conn()?, id).await
    }

    async fn latest_running_run(&self) -> Result<Option<MatchingRun>> {
        RunRepository::latest_running(&self.conn()?).await
    }

    async fn list_running_runs(&self) -> Result<Vec<MatchingRun>> {
        RunRepository::list_running(&self.conn()?).await
    }
}

impl MatchStore for LibSqlBackend {}
