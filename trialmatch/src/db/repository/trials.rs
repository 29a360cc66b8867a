use chrono::Utc;
use libsql::{params, Connection, Row};
use uuid::Uuid;

use crate::error::{MatchError, Result};
use crate::models::{Trial, TrialDraft, TrialSite, TrialStatus};

use super::{parse_datetime, vector_from_blob};

const TRIAL_COLUMNS: &str = "id, source, trial_id, title, phase, status, conditions, \
     interventions, countries, sponsor, summary, eligibility_summary, inclusion_text, \
     exclusion_text, embedding_text, embedding, source_url, created_at, updated_at";

/// Statuses that may receive new matches.
const MATCHABLE_STATUSES: &str = "('RECRUITING', 'NOT_YET_RECRUITING', 'ACTIVE_NOT_RECRUITING')";

pub struct TrialRepository;

impl TrialRepository {
    /// Upsert keyed by the external registry id. Sites are replaced wholesale
    /// and the embedding recomputed by the caller on every ingest.
    pub async fn upsert(
        conn: &Connection,
        draft: &TrialDraft,
        embedding_text: &str,
        embedding: &[f32],
    ) -> Result<Trial> {
        let now = Utc::now().to_rfc3339();
        let status = TrialStatus::parse(&draft.status);
        let embedding_json = serde_json::to_string(embedding)?;

        let existing_id = {
            let mut rows = conn
                .query(
                    "SELECT id FROM trials WHERE trial_id = ?1",
                    params![draft.trial_id.clone()],
                )
                .await?;
            match rows.next().await? {
                Some(row) => Some(row.get::<String>(0)?),
                None => None,
            }
        };

        let id = match existing_id {
            Some(id) => {
                conn.execute(
                    r#"
                    UPDATE trials SET
                        source = ?2, title = ?3, phase = ?4, status = ?5,
                        conditions = ?6, interventions = ?7, countries = ?8,
                        sponsor = ?9, summary = ?10, eligibility_summary = ?11,
                        inclusion_text = ?12, exclusion_text = ?13,
                        embedding_text = ?14, embedding = vector32(?15),
                        source_url = ?16, updated_at = ?17
                    WHERE id = ?1
                    "#,
                    params![
                        id.clone(),
                        draft.source.clone(),
                        draft.title.clone(),
                        draft.phase.clone(),
                        status.as_str().to_string(),
                        serde_json::to_string(&draft.conditions)?,
                        serde_json::to_string(&draft.interventions)?,
                        serde_json::to_string(&draft.countries)?,
                        draft.sponsor.clone(),
                        draft.summary.clone(),
                        draft.eligibility_summary.clone(),
                        draft.inclusion_text.clone(),
                        draft.exclusion_text.clone(),
                        embedding_text.to_string(),
                        embedding_json,
                        draft.source_url.clone(),
                        now.clone(),
                    ],
                )
                .await?;
                id
            }
            None => {
                let id = Uuid::new_v4().to_string();
                conn.execute(
                    r#"
                    INSERT INTO trials (
                        id, source, trial_id, title, phase, status, conditions,
                        interventions, countries, sponsor, summary, eligibility_summary,
                        inclusion_text, exclusion_text, embedding_text, embedding,
                        source_url, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                              vector32(?16), ?17, ?18, ?19)
                    "#,
                    params![
                        id.clone(),
                        draft.source.clone(),
                        draft.trial_id.clone(),
                        draft.title.clone(),
                        draft.phase.clone(),
                        status.as_str().to_string(),
                        serde_json::to_string(&draft.conditions)?,
                        serde_json::to_string(&draft.interventions)?,
                        serde_json::to_string(&draft.countries)?,
                        draft.sponsor.clone(),
                        draft.summary.clone(),
                        draft.eligibility_summary.clone(),
                        draft.inclusion_text.clone(),
                        draft.exclusion_text.clone(),
                        embedding_text.to_string(),
                        embedding_json,
                        draft.source_url.clone(),
                        now.clone(),
                        now.clone(),
                    ],
                )
                .await?;
                id
            }
        };

        conn.execute("DELETE FROM trial_sites WHERE trial_id = ?1", params![id.clone()])
            .await?;
        for site in &draft.sites {
            conn.execute(
                r#"
                INSERT INTO trial_sites (id, trial_id, facility, city, country, latitude, longitude)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    Uuid::new_v4().to_string(),
                    id.clone(),
                    site.facility.clone(),
                    site.city.clone(),
                    site.country.clone(),
                    site.latitude,
                    site.longitude,
                ],
            )
            .await?;
        }

        Self::get_by_trial_id(conn, &draft.trial_id)
            .await?
            .ok_or_else(|| MatchError::NotFound(format!("trial {} after upsert", draft.trial_id)))
    }

    pub async fn get_by_trial_id(conn: &Connection, trial_id: &str) -> Result<Option<Trial>> {
        let mut rows = conn
            .query(
                &format!("SELECT {TRIAL_COLUMNS} FROM trials WHERE trial_id = ?1"),
                params![trial_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let mut trial = Self::row_to_trial(&row)?;
                trial.sites = Self::sites_for(conn, &trial.id).await?;
                Ok(Some(trial))
            }
            None => Ok(None),
        }
    }

    /// Matchable trials in stable ingest order, used by the lexical fallback
    /// when vector search yields nothing.
    pub async fn list_matchable(conn: &Connection, limit: u32) -> Result<Vec<Trial>> {
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {TRIAL_COLUMNS} FROM trials
                     WHERE status IN {MATCHABLE_STATUSES}
                     ORDER BY created_at ASC, id ASC
                     LIMIT ?1"
                ),
                params![limit as i64],
            )
            .await?;

        let mut trials = Vec::new();
        while let Some(row) = rows.next().await? {
            trials.push(Self::row_to_trial(&row)?);
        }
        for trial in &mut trials {
            trial.sites = Self::sites_for(conn, &trial.id).await?;
        }

        Ok(trials)
    }

    /// Nearest matchable trials by cosine distance over stored embeddings.
    pub async fn search_similar(
        conn: &Connection,
        embedding: &[f32],
        limit: u32,
    ) -> Result<Vec<(Trial, f64)>> {
        let embedding_json = serde_json::to_string(embedding)?;

        let mut rows = conn
            .query(
                &format!(
                    "SELECT {TRIAL_COLUMNS},
                            vector_distance_cos(embedding, vector32(?1)) as distance
                     FROM trials
                     WHERE embedding IS NOT NULL
                       AND status IN {MATCHABLE_STATUSES}
                     ORDER BY distance ASC
                     LIMIT ?2"
                ),
                params![embedding_json, limit as i64],
            )
            .await?;

        let mut ranked = Vec::new();
        while let Some(row) = rows.next().await? {
            let trial = Self::row_to_trial(&row)?;
            let distance = row.get::<f64>(19)?;
            ranked.push((trial, distance));
        }
        for (trial, _) in &mut ranked {
            trial.sites = Self::sites_for(conn, &trial.id).await?;
        }

        Ok(ranked)
    }

    async fn sites_for(conn: &Connection, trial_pk: &str) -> Result<Vec<TrialSite>> {
        let mut rows = conn
            .query(
                "SELECT id, trial_id, facility, city, country, latitude, longitude
                 FROM trial_sites WHERE trial_id = ?1 ORDER BY id ASC",
                params![trial_pk],
            )
            .await?;

        let mut sites = Vec::new();
        while let Some(row) = rows.next().await? {
            sites.push(TrialSite {
                id: row.get::<String>(0)?,
                trial_id: row.get::<String>(1)?,
                facility: row.get::<String>(2)?,
                city: row.get::<String>(3)?,
                country: row.get::<String>(4)?,
                latitude: row.get::<Option<f64>>(5)?,
                longitude: row.get::<Option<f64>>(6)?,
            });
        }

        Ok(sites)
    }

    fn row_to_trial(row: &Row) -> Result<Trial> {
        let embedding = row
            .get::<Option<Vec<u8>>>(15)?
            .map(|blob| vector_from_blob(&blob));

        Ok(Trial {
            id: row.get::<String>(0)?,
            source: row.get::<String>(1)?,
            trial_id: row.get::<String>(2)?,
            title: row.get::<String>(3)?,
            phase: row.get::<String>(4)?,
            status: TrialStatus::parse(&row.get::<String>(5)?),
            conditions: serde_json::from_str(&row.get::<String>(6)?).unwrap_or_default(),
            interventions: serde_json::from_str(&row.get::<String>(7)?).unwrap_or_default(),
            countries: serde_json::from_str(&row.get::<String>(8)?).unwrap_or_default(),
            sponsor: row.get::<String>(9)?,
            summary: row.get::<String>(10)?,
            eligibility_summary: row.get::<String>(11)?,
            inclusion_text: row.get::<String>(12)?,
            exclusion_text: row.get::<String>(13)?,
            embedding_text: row.get::<String>(14)?,
            embedding,
            source_url: row.get::<String>(16)?,
            sites: Vec::new(),
            created_at: parse_datetime(&row.get::<String>(17)?),
            updated_at: parse_datetime(&row.get::<String>(18)?),
        })
    }
}
