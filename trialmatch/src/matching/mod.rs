mod engine;
mod lock;
mod retriever;
mod rules;

pub use engine::{MatchingEngine, StopOutcome};
pub use lock::{ProcessLock, RunLock, MATCHING_RUN_LOCK_KEY};
pub use retriever::{candidate_trials, Candidate};
pub use rules::{condition_overlap_score, evaluate_rules, location_feasibility, RuleEvaluation};
