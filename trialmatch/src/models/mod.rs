mod evaluation;
mod organization;
mod patient;
mod run;
mod trial;

pub use evaluation::{EvaluationDraft, MatchEvaluation, OutreachStatus, OverallStatus, UrgencyFlag};
pub use organization::{Organization, ScoreWeightVector, ScoreWeights};
pub use patient::{ContactChannel, PatientProfile, StructuredProfile};
pub use run::{MatchingRun, RunMetadata, RunStatus};
pub use trial::{Trial, TrialDraft, TrialSite, TrialSiteDraft, TrialStatus};
