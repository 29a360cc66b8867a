mod profile;
mod synthetic;
mod trials;

pub use profile::{compute_completeness, infer_structured_profile, patient_embedding_text};
pub use synthetic::{generate_patients, SeedMode, SeedSummary};
pub use trials::{
    fetch_ctgov_trials, ingest_sample_trials, ingest_trial, sample_trials, trial_embedding_text,
};
