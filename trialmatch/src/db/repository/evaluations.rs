use chrono::Utc;
use libsql::{params, Connection, Row};
use uuid::Uuid;

use crate::db::traits::UpsertOutcome;
use crate::error::Result;
use crate::models::{
    EvaluationDraft, MatchEvaluation, OutreachStatus, OverallStatus, UrgencyFlag,
};

use super::parse_datetime;

const EVALUATION_COLUMNS: &str = "id, org_id, patient_id, trial_id, matching_run_id, \
     eligibility_score, feasibility_score, urgency_score, explainability_score, urgency_flag, \
     overall_status, reasons_matched, reasons_failed, missing_info, doctor_checklist, \
     explanation_summary, explanation_language, explanation_model, explanation_provider, \
     prompt_version, confidence, outreach_status, vector_similarity, is_new, last_evaluated, \
     created_at, updated_at";

pub struct EvaluationRepository;

impl EvaluationRepository {
    /// Idempotent upsert keyed by (patient, trial). The unique index resolves
    /// concurrent writers; the update arm keeps outreach_status untouched and
    /// forces is_new off.
    pub async fn upsert(conn: &Connection, draft: &EvaluationDraft) -> Result<UpsertOutcome> {
        let existed = {
            let mut rows = conn
                .query(
                    "SELECT 1 FROM match_evaluations WHERE patient_id = ?1 AND trial_id = ?2",
                    params![draft.patient_id.clone(), draft.trial_id.clone()],
                )
                .await?;
            rows.next().await?.is_some()
        };

        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            INSERT INTO match_evaluations (
                id, org_id, patient_id, trial_id, matching_run_id,
                eligibility_score, feasibility_score, urgency_score, explainability_score,
                urgency_flag, overall_status, reasons_matched, reasons_failed,
                missing_info, doctor_checklist, explanation_summary, explanation_language,
                explanation_model, explanation_provider, prompt_version, confidence,
                outreach_status, vector_similarity, is_new, last_evaluated,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                      ?17, ?18, ?19, ?20, ?21, 'pending', ?22, 1, ?23, ?24, ?25)
            ON CONFLICT (patient_id, trial_id) DO UPDATE SET
                matching_run_id = excluded.matching_run_id,
                eligibility_score = excluded.eligibility_score,
                feasibility_score = excluded.feasibility_score,
                urgency_score = excluded.urgency_score,
                explainability_score = excluded.explainability_score,
                urgency_flag = excluded.urgency_flag,
                overall_status = excluded.overall_status,
                reasons_matched = excluded.reasons_matched,
                reasons_failed = excluded.reasons_failed,
                missing_info = excluded.missing_info,
                doctor_checklist = excluded.doctor_checklist,
                explanation_summary = excluded.explanation_summary,
                explanation_language = excluded.explanation_language,
                explanation_model = excluded.explanation_model,
                explanation_provider = excluded.explanation_provider,
                prompt_version = excluded.prompt_version,
                confidence = excluded.confidence,
                vector_similarity = excluded.vector_similarity,
                is_new = 0,
                last_evaluated = excluded.last_evaluated,
                updated_at = excluded.updated_at
            "#,
            params![
                Uuid::new_v4().to_string(),
                draft.org_id.clone(),
                draft.patient_id.clone(),
                draft.trial_id.clone(),
                draft.matching_run_id.clone(),
                draft.eligibility_score as i64,
                draft.feasibility_score as i64,
                draft.urgency_score as i64,
                draft.explainability_score as i64,
                draft.urgency_flag.as_str(),
                draft.overall_status.as_str(),
                serde_json::to_string(&draft.reasons_matched)?,
                serde_json::to_string(&draft.reasons_failed)?,
                serde_json::to_string(&draft.missing_info)?,
                serde_json::to_string(&draft.doctor_checklist)?,
                draft.explanation_summary.clone(),
                draft.explanation_language.clone(),
                draft.explanation_model.clone(),
                draft.explanation_provider.clone(),
                draft.prompt_version.clone(),
                draft.confidence,
                draft.vector_similarity,
                now.clone(),
                now.clone(),
                now,
            ],
        )
        .await?;

        Ok(UpsertOutcome { created: !existed })
    }

    pub async fn get(
        conn: &Connection,
        patient_id: &str,
        trial_id: &str,
    ) -> Result<Option<MatchEvaluation>> {
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {EVALUATION_COLUMNS} FROM match_evaluations
                     WHERE patient_id = ?1 AND trial_id = ?2"
                ),
                params![patient_id, trial_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_evaluation(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_for_patient(
        conn: &Connection,
        patient_id: &str,
    ) -> Result<Vec<MatchEvaluation>> {
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {EVALUATION_COLUMNS} FROM match_evaluations
                     WHERE patient_id = ?1
                     ORDER BY eligibility_score DESC, created_at ASC"
                ),
                params![patient_id],
            )
            .await?;

        let mut evaluations = Vec::new();
        while let Some(row) = rows.next().await? {
            evaluations.push(Self::row_to_evaluation(&row)?);
        }

        Ok(evaluations)
    }

    pub async fn delete_for_patient(conn: &Connection, patient_id: &str) -> Result<u64> {
        let deleted = conn
            .execute(
                "DELETE FROM match_evaluations WHERE patient_id = ?1",
                params![patient_id],
            )
            .await?;

        Ok(deleted)
    }

    pub async fn set_outreach_status(
        conn: &Connection,
        patient_id: &str,
        trial_id: &str,
        status: OutreachStatus,
    ) -> Result<()> {
        conn.execute(
            "UPDATE match_evaluations SET outreach_status = ?3, updated_at = ?4
             WHERE patient_id = ?1 AND trial_id = ?2",
            params![
                patient_id,
                trial_id,
                status.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )
        .await?;

        Ok(())
    }

    pub async fn clear_is_new(conn: &Connection, id: &str) -> Result<()> {
        conn.execute(
            "UPDATE match_evaluations SET is_new = 0, updated_at = ?2 WHERE id = ?1",
            params![id, Utc::now().to_rfc3339()],
        )
        .await?;

        Ok(())
    }

    fn row_to_evaluation(row: &Row) -> Result<MatchEvaluation> {
        Ok(MatchEvaluation {
            id: row.get::<String>(0)?,
            org_id: row.get::<String>(1)?,
            patient_id: row.get::<String>(2)?,
            trial_id: row.get::<String>(3)?,
            matching_run_id: row.get::<Option<String>>(4)?,
            eligibility_score: row.get::<i64>(5)?.clamp(0, 100) as u8,
            feasibility_score: row.get::<i64>(6)?.clamp(0, 100) as u8,
            urgency_score: row.get::<i64>(7)?.clamp(0, 100) as u8,
            explainability_score: row.get::<i64>(8)?.clamp(0, 100) as u8,
            urgency_flag: UrgencyFlag::parse(&row.get::<String>(9)?),
            overall_status: OverallStatus::parse(&row.get::<String>(10)?)
                .unwrap_or(OverallStatus::Unlikely),
            reasons_matched: serde_json::from_str(&row.get::<String>(11)?).unwrap_or_default(),
            reasons_failed: serde_json::from_str(&row.get::<String>(12)?).unwrap_or_default(),
            missing_info: serde_json::from_str(&row.get::<String>(13)?).unwrap_or_default(),
            doctor_checklist: serde_json::from_str(&row.get::<String>(14)?).unwrap_or_default(),
            explanation_summary: row.get::<String>(15)?,
            explanation_language: row.get::<String>(16)?,
            explanation_model: row.get::<String>(17)?,
            explanation_provider: row.get::<String>(18)?,
            prompt_version: row.get::<String>(19)?,
            confidence: row.get::<f64>(20)?,
            outreach_status: OutreachStatus::parse(&row.get::<String>(21)?),
            vector_similarity: row.get::<f64>(22)?,
            is_new: row.get::<i32>(23)? != 0,
            last_evaluated: parse_datetime(&row.get::<String>(24)?),
            created_at: parse_datetime(&row.get::<String>(25)?),
            updated_at: parse_datetime(&row.get::<String>(26)?),
        })
    }
}
