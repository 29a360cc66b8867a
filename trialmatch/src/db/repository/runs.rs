use libsql::{params, Connection, Row};

use crate::error::Result;
use crate::models::{MatchingRun, RunStatus};

use super::{parse_datetime, parse_optional_datetime};

const RUN_COLUMNS: &str =
    "id, run_type, status, started_at, finished_at, metadata, created_at, updated_at";

pub struct RunRepository;

impl RunRepository {
    pub async fn create(conn: &Connection, run: &MatchingRun) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO matching_runs (id, run_type, status, started_at, finished_at, metadata, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                run.id.clone(),
                run.run_type.clone(),
                run.status.as_str(),
                run.started_at.to_rfc3339(),
                run.finished_at.map(|dt| dt.to_rfc3339()),
                serde_json::to_string(&run.metadata)?,
                run.created_at.to_rfc3339(),
                run.updated_at.to_rfc3339(),
            ],
        )
        .await?;

        Ok(())
    }

    pub async fn update(conn: &Connection, run: &MatchingRun) -> Result<()> {
        conn.execute(
            r#"
            UPDATE matching_runs
            SET run_type = ?2, status = ?3, started_at = ?4, finished_at = ?5,
                metadata = ?6, updated_at = ?7
            WHERE id = ?1
            "#,
            params![
                run.id.clone(),
                run.run_type.clone(),
                run.status.as_str(),
                run.started_at.to_rfc3339(),
                run.finished_at.map(|dt| dt.to_rfc3339()),
                serde_json::to_string(&run.metadata)?,
                chrono::Utc::now().to_rfc3339(),
            ],
        )
        .await?;

        Ok(())
    }

    pub async fn get_by_id(conn: &Connection, id: &str) -> Result<Option<MatchingRun>> {
        let mut rows = conn
            .query(
                &format!("SELECT {RUN_COLUMNS} FROM matching_runs WHERE id = ?1"),
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_run(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn latest_running(conn: &Connection) -> Result<Option<MatchingRun>> {
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {RUN_COLUMNS} FROM matching_runs
                     WHERE status = 'running'
                     ORDER BY started_at DESC
                     LIMIT 1"
                ),
                params![],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_run(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_running(conn: &Connection) -> Result<Vec<MatchingRun>> {
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {RUN_COLUMNS} FROM matching_runs
                     WHERE status = 'running'
                     ORDER BY started_at ASC"
                ),
                params![],
            )
            .await?;

        let mut runs = Vec::new();
        while let Some(row) = rows.next().await? {
            runs.push(Self::row_to_run(&row)?);
        }

        Ok(runs)
    }

    fn row_to_run(row: &Row) -> Result<MatchingRun> {
        Ok(MatchingRun {
            id: row.get::<String>(0)?,
            run_type: row.get::<String>(1)?,
            status: RunStatus::parse(&row.get::<String>(2)?),
            started_at: parse_datetime(&row.get::<String>(3)?),
            finished_at: parse_optional_datetime(row.get::<Option<String>>(4)?),
            metadata: serde_json::from_str(&row.get::<String>(5)?).unwrap_or_default(),
            created_at: parse_datetime(&row.get::<String>(6)?),
            updated_at: parse_datetime(&row.get::<String>(7)?),
        })
    }
}
