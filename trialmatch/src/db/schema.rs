use libsql::Connection;

use crate::error::Result;

pub async fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Organizations owning patients and matches
        CREATE TABLE IF NOT EXISTS organizations (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            country TEXT NOT NULL DEFAULT '',
            score_weights TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        -- Patient profiles with intake embedding
        CREATE TABLE IF NOT EXISTS patients (
            id TEXT PRIMARY KEY,
            patient_code TEXT NOT NULL UNIQUE,
            org_id TEXT NOT NULL,
            full_name TEXT NOT NULL DEFAULT '',
            age INTEGER NOT NULL DEFAULT 0,
            sex TEXT NOT NULL DEFAULT '',
            city TEXT NOT NULL DEFAULT '',
            country TEXT NOT NULL DEFAULT '',
            language TEXT NOT NULL DEFAULT 'English',
            diagnosis TEXT NOT NULL DEFAULT '',
            stage TEXT NOT NULL DEFAULT '',
            story TEXT NOT NULL DEFAULT '',
            structured_profile TEXT NOT NULL DEFAULT '{}',
            contact_channel TEXT NOT NULL DEFAULT 'email',
            contact_value TEXT NOT NULL DEFAULT '',
            consent INTEGER NOT NULL DEFAULT 0,
            profile_completeness INTEGER NOT NULL DEFAULT 0,
            embedding F32_BLOB(384),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (org_id) REFERENCES organizations(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_patients_org_id ON patients(org_id);
        CREATE INDEX IF NOT EXISTS idx_patients_created_at ON patients(created_at);

        -- Trials ingested from registries, embedding recomputed on upsert
        CREATE TABLE IF NOT EXISTS trials (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL DEFAULT 'clinicaltrials.gov',
            trial_id TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL DEFAULT '',
            phase TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'RECRUITING',
            conditions TEXT NOT NULL DEFAULT '[]',
            interventions TEXT NOT NULL DEFAULT '[]',
            countries TEXT NOT NULL DEFAULT '[]',
            sponsor TEXT NOT NULL DEFAULT '',
            summary TEXT NOT NULL DEFAULT '',
            eligibility_summary TEXT NOT NULL DEFAULT '',
            inclusion_text TEXT NOT NULL DEFAULT '',
            exclusion_text TEXT NOT NULL DEFAULT '',
            embedding_text TEXT NOT NULL DEFAULT '',
            embedding F32_BLOB(384),
            source_url TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_trials_status ON trials(status);

        -- Sites are replaced wholesale on each trial upsert
        CREATE TABLE IF NOT EXISTS trial_sites (
            id TEXT PRIMARY KEY,
            trial_id TEXT NOT NULL,
            facility TEXT NOT NULL DEFAULT '',
            city TEXT NOT NULL DEFAULT '',
            country TEXT NOT NULL DEFAULT '',
            latitude REAL,
            longitude REAL,
            FOREIGN KEY (trial_id) REFERENCES trials(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_trial_sites_trial_id ON trial_sites(trial_id);

        -- Full-population matching cycles
        CREATE TABLE IF NOT EXISTS matching_runs (
            id TEXT PRIMARY KEY,
            run_type TEXT NOT NULL DEFAULT 'scheduled',
            status TEXT NOT NULL DEFAULT 'running',
            started_at TEXT NOT NULL,
            finished_at TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_matching_runs_status ON matching_runs(status);

        -- One evaluation per (patient, trial); the unique index is the only
        -- serialization point for concurrent writers.
        CREATE TABLE IF NOT EXISTS match_evaluations (
            id TEXT PRIMARY KEY,
            org_id TEXT NOT NULL,
            patient_id TEXT NOT NULL,
            trial_id TEXT NOT NULL,
            matching_run_id TEXT,
            eligibility_score INTEGER NOT NULL DEFAULT 0,
            feasibility_score INTEGER NOT NULL DEFAULT 0,
            urgency_score INTEGER NOT NULL DEFAULT 0,
            explainability_score INTEGER NOT NULL DEFAULT 0,
            urgency_flag TEXT NOT NULL DEFAULT 'low',
            overall_status TEXT NOT NULL DEFAULT 'Possibly Eligible',
            reasons_matched TEXT NOT NULL DEFAULT '[]',
            reasons_failed TEXT NOT NULL DEFAULT '[]',
            missing_info TEXT NOT NULL DEFAULT '[]',
            doctor_checklist TEXT NOT NULL DEFAULT '[]',
            explanation_summary TEXT NOT NULL DEFAULT '',
            explanation_language TEXT NOT NULL DEFAULT 'en',
            explanation_model TEXT NOT NULL DEFAULT '',
            explanation_provider TEXT NOT NULL DEFAULT '',
            prompt_version TEXT NOT NULL DEFAULT 'v1',
            confidence REAL NOT NULL DEFAULT 0.0,
            outreach_status TEXT NOT NULL DEFAULT 'pending',
            vector_similarity REAL NOT NULL DEFAULT 0.0,
            is_new INTEGER NOT NULL DEFAULT 1,
            last_evaluated TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (patient_id) REFERENCES patients(id) ON DELETE CASCADE,
            FOREIGN KEY (trial_id) REFERENCES trials(id) ON DELETE CASCADE,
            UNIQUE (patient_id, trial_id)
        );

        CREATE INDEX IF NOT EXISTS idx_match_evaluations_patient ON match_evaluations(patient_id);
        CREATE INDEX IF NOT EXISTS idx_match_evaluations_trial ON match_evaluations(trial_id);
        CREATE INDEX IF NOT EXISTS idx_match_evaluations_org ON match_evaluations(org_id);
        "#,
    )
    .await?;

    Ok(())
}
