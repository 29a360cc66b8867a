use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::Config;
use crate::db::traits::{
    EvaluationStore, MatchStore, OrganizationStore, PatientStore, RunStore,
};
use crate::embeddings::EmbeddingProvider;
use crate::error::{MatchError, Result};
use crate::ingest::patient_embedding_text;
use crate::llm::{ExplanationProvider, RuleContext};
use crate::models::{
    EvaluationDraft, MatchingRun, PatientProfile, RunStatus, ScoreWeightVector, Trial,
};
use crate::signals::has_meaningful_clinical_context;

use super::lock::RunLock;
use super::retriever::candidate_trials;
use super::rules::evaluate_rules;

/// Result of a stop request against the running cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// No run was marked running.
    NoRunningRun,
    /// Runs flipped to stopped (stale rows, or the worker finished while we
    /// polled).
    Stopped(Vec<String>),
    /// Stop flag written; the worker holds the lock and was left to finish.
    Requested(Vec<String>),
    /// Wait window elapsed with runs still marked running and the lock held.
    StillRunning(Vec<String>),
}

/// Full matching pipeline: gate, retrieve, score, explain, persist, under a
/// process-wide run lock.
pub struct MatchingEngine {
    store: Arc<dyn MatchStore>,
    embeddings: Arc<EmbeddingProvider>,
    explainer: Arc<ExplanationProvider>,
    lock: Arc<dyn RunLock>,
    top_k: usize,
    evaluate_top_n: usize,
    prompt_version: String,
}

impl MatchingEngine {
    pub fn new(
        store: Arc<dyn MatchStore>,
        embeddings: Arc<EmbeddingProvider>,
        explainer: Arc<ExplanationProvider>,
        lock: Arc<dyn RunLock>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            embeddings,
            explainer,
            lock,
            top_k: config.matching.top_k,
            evaluate_top_n: config.matching.evaluate_top_n,
            prompt_version: config.llm.prompt_version.clone(),
        }
    }

    /// Embed the patient's intake text if no vector is stored yet. Returns
    /// the patient with its embedding populated either way.
    async fn ensure_patient_embedding(
        &self,
        patient: &PatientProfile,
    ) -> Result<PatientProfile> {
        if patient.embedding.is_some() {
            return Ok(patient.clone());
        }

        let text = patient_embedding_text(patient);
        let vector = self.embeddings.embed(&text).await;
        self.store
            .update_patient_embedding(&patient.id, &vector)
            .await?;

        let mut updated = patient.clone();
        updated.embedding = Some(vector);
        Ok(updated)
    }

    async fn score_weights_for(&self, patient: &PatientProfile) -> ScoreWeightVector {
        match self.store.get_organization(&patient.org_id).await {
            Ok(Some(org)) => org.score_weights.normalized(),
            Ok(None) => ScoreWeightVector::defaults(),
            Err(error) => {
                tracing::warn!(org_id = %patient.org_id, error = %error, "Failed to load organization weights");
                ScoreWeightVector::defaults()
            }
        }
    }

    /// Evaluate one patient against retrieved trials. Returns the number of
    /// evaluations written. A patient failing the clinical-context gate gets
    /// zero work and loses any previously stored evaluations.
    pub async fn evaluate_patient(
        &self,
        patient: &PatientProfile,
        run_id: Option<&str>,
    ) -> Result<u64> {
        if !has_meaningful_clinical_context(patient) {
            let deleted = self
                .store
                .delete_evaluations_for_patient(&patient.id)
                .await?;
            tracing::info!(
                patient_id = %patient.id,
                deleted,
                "Patient failed clinical-context gate, skipping evaluation"
            );
            return Ok(0);
        }

        let patient = self.ensure_patient_embedding(patient).await?;
        let weights = self.score_weights_for(&patient).await;

        let mut candidates = candidate_trials(self.store.as_ref(), &patient, self.top_k).await?;
        candidates.truncate(self.evaluate_top_n);

        let mut updates = 0u64;
        for candidate in candidates {
            let trial = &candidate.trial;
            let rule = evaluate_rules(&patient, trial, candidate.similarity, &weights);

            let rule_context = RuleContext {
                eligibility_score: rule.eligibility_score,
                feasibility_score: rule.feasibility_score,
                urgency_score: rule.urgency_score,
                explainability_score: rule.explainability_score,
                urgency_flag: rule.urgency_flag,
                overall_status: rule.overall_status,
                reasons_matched: rule.reasons_matched.clone(),
                reasons_failed: rule.reasons_failed.clone(),
                missing_info: rule.missing_info.clone(),
                doctor_checklist: rule.doctor_checklist.clone(),
                confidence: rule.confidence,
                vector_similarity: candidate.similarity,
            };

            let explanation = self
                .explainer
                .generate(
                    &build_patient_payload(&patient),
                    &build_trial_payload(trial),
                    &rule_context,
                    true,
                )
                .await;

            let draft = EvaluationDraft {
                org_id: patient.org_id.clone(),
                patient_id: patient.id.clone(),
                trial_id: trial.id.clone(),
                matching_run_id: run_id.map(str::to_string),
                eligibility_score: rule.eligibility_score,
                feasibility_score: rule.feasibility_score,
                urgency_score: rule.urgency_score,
                explainability_score: rule.explainability_score,
                urgency_flag: rule.urgency_flag,
                overall_status: explanation.overall_status,
                reasons_matched: explanation.reasons_matched,
                reasons_failed: explanation.reasons_failed,
                missing_info: explanation.missing_info,
                doctor_checklist: explanation.doctor_checklist,
                explanation_summary: explanation.summary,
                explanation_language: patient.language_tag(),
                explanation_model: explanation.model,
                explanation_provider: explanation.provider,
                prompt_version: self.prompt_version.clone(),
                confidence: explanation.confidence,
                vector_similarity: candidate.similarity,
            };

            self.store.upsert_evaluation(&draft).await?;
            updates += 1;
        }

        Ok(updates)
    }

    /// Run the whole population under the run lock. Exactly one cycle may be
    /// active per process; a second caller gets `AlreadyRunning` with the
    /// latest running row attached.
    pub async fn run_full_cycle(&self, run_type: &str) -> Result<MatchingRun> {
        if !self.lock.try_acquire() {
            let running = self.store.latest_running_run().await.unwrap_or(None);
            return Err(MatchError::AlreadyRunning {
                running: running.map(Box::new),
            });
        }

        let result = self.run_cycle_locked(run_type).await;
        self.lock.release();
        result
    }

    async fn run_cycle_locked(&self, run_type: &str) -> Result<MatchingRun> {
        let mut run = MatchingRun::new(Uuid::new_v4().to_string(), run_type.to_string());
        self.store.create_run(&run).await?;
        tracing::info!(run_id = %run.id, run_type, "Matching run started");

        match self.evaluate_population(&run.id).await {
            Ok((patients, updates)) => {
                run.status = RunStatus::Completed;
                run.finished_at = Some(Utc::now());
                run.metadata.patients = Some(patients);
                run.metadata.updates = Some(updates);
                self.store.update_run(&run).await?;
                tracing::info!(run_id = %run.id, patients, updates, "Matching run completed");
                Ok(run)
            }
            Err(error) => {
                run.status = RunStatus::Failed;
                run.finished_at = Some(Utc::now());
                run.metadata.error = Some(error.to_string());
                if let Err(update_error) = self.store.update_run(&run).await {
                    tracing::error!(
                        run_id = %run.id,
                        error = %update_error,
                        "Failed to finalize failed run"
                    );
                }
                tracing::error!(run_id = %run.id, error = %error, "Matching run failed");
                Err(error)
            }
        }
    }

    async fn evaluate_population(&self, run_id: &str) -> Result<(u64, u64)> {
        let patients = self.store.list_patients().await?;
        let total_patients = patients.len() as u64;

        let mut total_updates = 0u64;
        for patient in &patients {
            total_updates += self.evaluate_patient(patient, Some(run_id)).await?;
        }

        Ok((total_patients, total_updates))
    }

    /// Flip orphaned `running` rows to `stopped` when nothing holds the lock.
    /// Idempotent; returns the ids it stopped.
    pub async fn reconcile_stale_runs(&self, reason: &str) -> Result<Vec<String>> {
        if !self.lock.is_free() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let mut stopped = Vec::new();
        for mut run in self.store.list_running_runs().await? {
            run.status = RunStatus::Stopped;
            run.finished_at = Some(now);
            run.metadata.stopped_reason = Some(reason.to_string());
            run.metadata.stopped_at = Some(now);
            self.store.update_run(&run).await?;
            tracing::warn!(run_id = %run.id, reason, "Stale running run marked stopped");
            stopped.push(run.id);
        }

        Ok(stopped)
    }

    /// Record a stop request for running rows, then either reconcile them
    /// (lock free means no worker is actually running) or wait out the
    /// worker. The flag itself is advisory; the cycle loop does not consult
    /// it mid-flight.
    pub async fn request_stop(
        &self,
        wait_seconds: u64,
        poll_interval: Duration,
    ) -> Result<StopOutcome> {
        let running = self.store.list_running_runs().await?;
        if running.is_empty() {
            return Ok(StopOutcome::NoRunningRun);
        }

        let now = Utc::now();
        let mut run_ids = Vec::with_capacity(running.len());
        for mut run in running {
            run.metadata.stop_requested = Some(true);
            run.metadata.stop_requested_at = Some(now);
            self.store.update_run(&run).await?;
            run_ids.push(run.id);
        }
        tracing::info!(?run_ids, "Stop requested for running matching run(s)");

        if self.lock.is_free() {
            let stopped = self
                .reconcile_stale_runs("stop_requested_no_active_lock")
                .await?;
            return Ok(StopOutcome::Stopped(stopped));
        }

        if wait_seconds == 0 {
            return Ok(StopOutcome::Requested(run_ids));
        }

        let poll_interval = poll_interval.max(Duration::from_millis(200));
        let deadline = tokio::time::Instant::now() + Duration::from_secs(wait_seconds);
        while tokio::time::Instant::now() < deadline {
            let still_running = self.store.list_running_runs().await?;
            if still_running.is_empty() {
                return Ok(StopOutcome::Stopped(Vec::new()));
            }
            tokio::time::sleep(poll_interval).await;
        }

        let remaining: Vec<String> = self
            .store
            .list_running_runs()
            .await?
            .into_iter()
            .map(|run| run.id)
            .collect();
        if remaining.is_empty() {
            return Ok(StopOutcome::Stopped(Vec::new()));
        }
        if self.lock.is_free() {
            let stopped = self
                .reconcile_stale_runs("stop_requested_timeout_no_active_lock")
                .await?;
            if !stopped.is_empty() {
                return Ok(StopOutcome::Stopped(stopped));
            }
        }

        Ok(StopOutcome::StillRunning(remaining))
    }
}

fn build_patient_payload(patient: &PatientProfile) -> Value {
    json!({
        "patient_code": patient.patient_code,
        "name": patient.full_name,
        "age": patient.age,
        "sex": patient.sex,
        "city": patient.city,
        "country": patient.country,
        "diagnosis": patient.diagnosis,
        "stage": patient.stage,
        "story": patient.story,
        "structured_profile": patient.structured_profile,
    })
}

fn build_trial_payload(trial: &Trial) -> Value {
    json!({
        "trial_id": trial.trial_id,
        "title": trial.title,
        "phase": trial.phase,
        "status": trial.status,
        "conditions": trial.conditions,
        "interventions": trial.interventions,
        "eligibility_summary": trial.eligibility_summary,
        "inclusion_text": trial.inclusion_text,
        "exclusion_text": trial.exclusion_text,
        "sites": trial.sites.iter().map(|s| json!({
            "facility": s.facility,
            "city": s.city,
            "country": s.country,
        })).collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trial_payload_shape() {
        use crate::models::{TrialSite, TrialStatus};

        let trial = Trial {
            id: "t1".to_string(),
            source: String::new(),
            trial_id: "NCT1".to_string(),
            title: "Study".to_string(),
            phase: "Phase 2".to_string(),
            status: TrialStatus::Recruiting,
            conditions: vec!["Breast Cancer".to_string()],
            interventions: vec![],
            countries: vec![],
            sponsor: String::new(),
            summary: String::new(),
            eligibility_summary: String::new(),
            inclusion_text: String::new(),
            exclusion_text: String::new(),
            embedding_text: String::new(),
            embedding: None,
            source_url: String::new(),
            sites: vec![TrialSite {
                id: "s1".to_string(),
                trial_id: "t1".to_string(),
                facility: "Clinic".to_string(),
                city: "Karachi".to_string(),
                country: "Pakistan".to_string(),
                latitude: None,
                longitude: None,
            }],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let payload = build_trial_payload(&trial);
        assert_eq!(payload["trial_id"], "NCT1");
        assert_eq!(payload["status"], "RECRUITING");
        assert_eq!(payload["sites"][0]["city"], "Karachi");
        assert!(payload.get("embedding").is_none());
    }

    #[test]
    fn test_patient_payload_excludes_contact_details() {
        let mut patient =
            PatientProfile::new("p1".to_string(), "PAT-1".to_string(), "org1".to_string());
        patient.contact_value = "+92-300-0000000".to_string();

        let payload = build_patient_payload(&patient);
        assert_eq!(payload["patient_code"], "PAT-1");
        assert!(payload.get("contact_value").is_none());
        assert!(payload.get("id").is_none());
    }
}
