//! Patient-to-clinical-trial matching: vector retrieval over libSQL, a
//! deterministic rule evaluator, and LLM-written explanations with a
//! rule-based fallback.

pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod matching;
pub mod models;
pub mod signals;

pub use error::{MatchError, Result};
