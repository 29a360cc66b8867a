use libsql::{params, Connection, Row};

use crate::error::Result;
use crate::models::{ContactChannel, PatientProfile};

use super::{parse_datetime, vector_from_blob};

const PATIENT_COLUMNS: &str = "id, patient_code, org_id, full_name, age, sex, city, country, \
     language, diagnosis, stage, story, structured_profile, contact_channel, contact_value, \
     consent, profile_completeness, embedding, created_at, updated_at";

pub struct PatientRepository;

impl PatientRepository {
    pub async fn create(conn: &Connection, patient: &PatientProfile) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO patients (
                id, patient_code, org_id, full_name, age, sex, city, country,
                language, diagnosis, stage, story, structured_profile,
                contact_channel, contact_value, consent, profile_completeness,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
            "#,
            params![
                patient.id.clone(),
                patient.patient_code.clone(),
                patient.org_id.clone(),
                patient.full_name.clone(),
                patient.age as i64,
                patient.sex.clone(),
                patient.city.clone(),
                patient.country.clone(),
                patient.language.clone(),
                patient.diagnosis.clone(),
                patient.stage.clone(),
                patient.story.clone(),
                serde_json::to_string(&patient.structured_profile)?,
                patient.contact_channel.as_str(),
                patient.contact_value.clone(),
                patient.consent as i32,
                patient.profile_completeness as i64,
                patient.created_at.to_rfc3339(),
                patient.updated_at.to_rfc3339(),
            ],
        )
        .await?;

        if let Some(embedding) = &patient.embedding {
            Self::update_embedding(conn, &patient.id, embedding).await?;
        }

        Ok(())
    }

    pub async fn get_by_id(conn: &Connection, id: &str) -> Result<Option<PatientProfile>> {
        let mut rows = conn
            .query(
                &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1"),
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_patient(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn get_by_code(
        conn: &Connection,
        patient_code: &str,
    ) -> Result<Option<PatientProfile>> {
        let mut rows = conn
            .query(
                &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE patient_code = ?1"),
                params![patient_code],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_patient(&row)?)),
            None => Ok(None),
        }
    }

    /// All patients in stable creation order so repeated runs walk the
    /// population identically.
    pub async fn list_all(conn: &Connection) -> Result<Vec<PatientProfile>> {
        let mut rows = conn
            .query(
                &format!("SELECT {PATIENT_COLUMNS} FROM patients ORDER BY created_at ASC, id ASC"),
                params![],
            )
            .await?;

        let mut patients = Vec::new();
        while let Some(row) = rows.next().await? {
            patients.push(Self::row_to_patient(&row)?);
        }

        Ok(patients)
    }

    pub async fn update_embedding(conn: &Connection, id: &str, embedding: &[f32]) -> Result<()> {
        let embedding_json = serde_json::to_string(embedding)?;

        conn.execute(
            "UPDATE patients SET embedding = vector32(?2), updated_at = ?3 WHERE id = ?1",
            params![id, embedding_json, chrono::Utc::now().to_rfc3339()],
        )
        .await?;

        Ok(())
    }

    fn row_to_patient(row: &Row) -> Result<PatientProfile> {
        let embedding = row
            .get::<Option<Vec<u8>>>(17)?
            .map(|blob| vector_from_blob(&blob));

        Ok(PatientProfile {
            id: row.get::<String>(0)?,
            patient_code: row.get::<String>(1)?,
            org_id: row.get::<String>(2)?,
            full_name: row.get::<String>(3)?,
            age: row.get::<i64>(4)?.max(0) as u32,
            sex: row.get::<String>(5)?,
            city: row.get::<String>(6)?,
            country: row.get::<String>(7)?,
            language: row.get::<String>(8)?,
            diagnosis: row.get::<String>(9)?,
            stage: row.get::<String>(10)?,
            story: row.get::<String>(11)?,
            structured_profile: serde_json::from_str(&row.get::<String>(12)?).unwrap_or_default(),
            contact_channel: ContactChannel::parse(&row.get::<String>(13)?),
            contact_value: row.get::<String>(14)?,
            consent: row.get::<i32>(15)? != 0,
            profile_completeness: row.get::<i64>(16)?.clamp(0, 100) as u8,
            embedding,
            created_at: parse_datetime(&row.get::<String>(18)?),
            updated_at: parse_datetime(&row.get::<String>(19)?),
        })
    }
}
