use std::cmp::Ordering;

use crate::db::traits::{MatchStore, TrialStore};
use crate::error::Result;
use crate::models::{PatientProfile, Trial};
use crate::signals::clamp;

use super::rules::condition_overlap_score;

/// A trial with its blended retrieval similarity in [0, 1].
#[derive(Debug, Clone)]
pub struct Candidate {
    pub trial: Trial,
    pub similarity: f64,
}

/// Two-tier retrieval. Vector search over trial embeddings is preferred; any
/// failure or empty result degrades silently to a lexical pass over the
/// matchable set so a broken vector index never empties the pipeline.
pub async fn candidate_trials(
    store: &dyn MatchStore,
    patient: &PatientProfile,
    top_k: usize,
) -> Result<Vec<Candidate>> {
    let fetch_limit = (top_k * 2) as u32;

    if let Some(embedding) = &patient.embedding {
        match store.search_similar_trials(embedding, fetch_limit).await {
            Ok(ranked) if !ranked.is_empty() => {
                let mut candidates: Vec<Candidate> = ranked
                    .into_iter()
                    .map(|r| {
                        let vector_similarity = clamp(1.0 - r.distance, 0.0, 1.0);
                        let lexical_similarity = condition_overlap_score(patient, &r.trial);
                        let similarity = clamp(
                            vector_similarity * 0.85 + lexical_similarity * 0.15,
                            0.0,
                            1.0,
                        );
                        Candidate {
                            trial: r.trial,
                            similarity,
                        }
                    })
                    .collect();
                sort_by_similarity(&mut candidates);
                candidates.truncate(top_k);
                return Ok(candidates);
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(
                    patient_id = %patient.id,
                    error = %error,
                    "Vector search failed, falling back to lexical retrieval"
                );
            }
        }
    }

    let trials = store.list_matchable_trials(fetch_limit).await?;
    let mut candidates: Vec<Candidate> = trials
        .into_iter()
        .map(|trial| {
            let lexical_similarity = condition_overlap_score(patient, &trial);
            Candidate {
                similarity: clamp(0.45 + lexical_similarity * 0.45, 0.0, 1.0),
                trial,
            }
        })
        .collect();
    sort_by_similarity(&mut candidates);
    candidates.truncate(top_k);
    Ok(candidates)
}

fn sort_by_similarity(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, LibSqlBackend};
    use crate::models::{TrialDraft, TrialSiteDraft};

    async fn backend() -> LibSqlBackend {
        LibSqlBackend::new(Database::in_memory().await.unwrap())
    }

    fn patient_with_embedding(embedding: Option<Vec<f32>>) -> PatientProfile {
        let mut patient =
            PatientProfile::new("p1".to_string(), "PAT-1".to_string(), "org1".to_string());
        patient.diagnosis = "HER2+ Breast Cancer".to_string();
        patient.story = "metastatic her2 positive breast carcinoma".to_string();
        patient.embedding = embedding;
        patient
    }

    async fn seed(
        backend: &LibSqlBackend,
        trial_id: &str,
        conditions: Vec<String>,
        status: &str,
        embedding: &[f32],
    ) {
        let draft = TrialDraft {
            trial_id: trial_id.to_string(),
            title: trial_id.to_string(),
            conditions,
            status: status.to_string(),
            sites: vec![TrialSiteDraft::default()],
            ..Default::default()
        };
        backend
            .upsert_trial(&draft, trial_id, embedding)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_vector_path_blends_and_ranks() {
        let backend = backend().await;
        let mut near = vec![0.0_f32; 384];
        near[0] = 1.0;
        let mut far = vec![0.0_f32; 384];
        far[1] = 1.0;

        seed(
            &backend,
            "NCT-NEAR",
            vec!["Colon Cancer".to_string()],
            "RECRUITING",
            &near,
        )
        .await;
        seed(
            &backend,
            "NCT-FAR",
            vec!["Lung Cancer".to_string()],
            "RECRUITING",
            &far,
        )
        .await;

        let patient = patient_with_embedding(Some(near.clone()));
        let candidates = candidate_trials(&backend, &patient, 20).await.unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].trial.trial_id, "NCT-NEAR");
        // Identical vectors give distance ~0; the blend caps at 0.85 plus the
        // lexical share.
        assert!(candidates[0].similarity > 0.8);
        assert!(candidates[0].similarity > candidates[1].similarity);
    }

    #[tokio::test]
    async fn test_lexical_fallback_without_embedding() {
        let backend = backend().await;
        seed(
            &backend,
            "NCT-BC",
            vec!["Breast Cancer".to_string(), "HER2-positive".to_string()],
            "RECRUITING",
            &vec![0.1_f32; 384],
        )
        .await;
        seed(
            &backend,
            "NCT-OTHER",
            vec!["Melanoma".to_string()],
            "RECRUITING",
            &vec![0.2_f32; 384],
        )
        .await;

        let patient = patient_with_embedding(None);
        let candidates = candidate_trials(&backend, &patient, 20).await.unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].trial.trial_id, "NCT-BC");
        // Zero lexical overlap still yields the 0.45 floor.
        assert!((candidates[1].similarity - 0.45).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_fallback_excludes_unmatchable_trials() {
        let backend = backend().await;
        seed(
            &backend,
            "NCT-OPEN",
            vec!["Breast Cancer".to_string()],
            "RECRUITING",
            &vec![0.1_f32; 384],
        )
        .await;
        seed(
            &backend,
            "NCT-CLOSED",
            vec!["Breast Cancer".to_string()],
            "COMPLETED",
            &vec![0.1_f32; 384],
        )
        .await;

        let patient = patient_with_embedding(None);
        let candidates = candidate_trials(&backend, &patient, 20).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].trial.trial_id, "NCT-OPEN");
    }

    #[tokio::test]
    async fn test_top_k_truncation() {
        let backend = backend().await;
        for i in 0..6 {
            seed(
                &backend,
                &format!("NCT-{i}"),
                vec!["Breast Cancer".to_string()],
                "RECRUITING",
                &vec![0.1_f32; 384],
            )
            .await;
        }

        let patient = patient_with_embedding(None);
        let candidates = candidate_trials(&backend, &patient, 4).await.unwrap();
        assert_eq!(candidates.len(), 4);
    }
}
