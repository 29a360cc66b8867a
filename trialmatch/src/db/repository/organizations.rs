use libsql::{params, Connection, Row};

use crate::error::Result;
use crate::models::Organization;

use super::parse_datetime;

pub struct OrganizationRepository;

impl OrganizationRepository {
    pub async fn create(conn: &Connection, org: &Organization) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO organizations (id, name, slug, country, score_weights, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                org.id.clone(),
                org.name.clone(),
                org.slug.clone(),
                org.country.clone(),
                serde_json::to_string(&org.score_weights)?,
                org.created_at.to_rfc3339(),
                org.updated_at.to_rfc3339(),
            ],
        )
        .await?;

        Ok(())
    }

    pub async fn get_by_id(conn: &Connection, id: &str) -> Result<Option<Organization>> {
        let mut rows = conn
            .query(
                "SELECT id, name, slug, country, score_weights, created_at, updated_at
                 FROM organizations WHERE id = ?1",
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_organization(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn get_by_slug(conn: &Connection, slug: &str) -> Result<Option<Organization>> {
        let mut rows = conn
            .query(
                "SELECT id, name, slug, country, score_weights, created_at, updated_at
                 FROM organizations WHERE slug = ?1",
                params![slug],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_organization(&row)?)),
            None => Ok(None),
        }
    }

    fn row_to_organization(row: &Row) -> Result<Organization> {
        Ok(Organization {
            id: row.get::<String>(0)?,
            name: row.get::<String>(1)?,
            slug: row.get::<String>(2)?,
            country: row.get::<String>(3)?,
            score_weights: serde_json::from_str(&row.get::<String>(4)?).unwrap_or_default(),
            created_at: parse_datetime(&row.get::<String>(5)?),
            updated_at: parse_datetime(&row.get::<String>(6)?),
        })
    }
}
