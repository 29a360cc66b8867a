use serde::Deserialize;
use std::env;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub embeddings: EmbeddingsConfig,
    pub llm: LlmConfig,
    pub matching: MatchingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    /// Remote embedding endpoint. When unset the deterministic hash backend
    /// is used for every request.
    pub endpoint: Option<String>,
    pub api_token: Option<String>,
    pub dimensions: usize,
    pub timeout_secs: u64,
}

/// Explanation-generation mode. Unknown values fall back to `Auto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum LlmMode {
    /// Prefer Gemini when configured, then the HF endpoint, then deterministic.
    Auto,
    Gemini,
    Hf,
    /// Never call a remote provider.
    Fallback,
}

impl LlmMode {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "gemini" => LlmMode::Gemini,
            "hf" => LlmMode::Hf,
            "fallback" => LlmMode::Fallback,
            _ => LlmMode::Auto,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub mode: LlmMode,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub hf_endpoint: Option<String>,
    pub hf_api_token: Option<String>,
    pub timeout_secs: u64,
    pub prompt_version: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            mode: LlmMode::Auto,
            gemini_api_key: None,
            gemini_model: "gemini-2.0-flash".to_string(),
            hf_endpoint: None,
            hf_api_token: None,
            timeout_secs: 40,
            prompt_version: "v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    /// Retrieval breadth: candidates fetched per patient.
    pub top_k: usize,
    /// Evaluation breadth: candidates actually scored (<= top_k).
    pub evaluate_top_n: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "file:trialmatch.db".to_string()),
            },
            embeddings: EmbeddingsConfig {
                endpoint: env::var("EMBEDDING_ENDPOINT").ok().filter(|v| !v.is_empty()),
                api_token: env::var("EMBEDDING_API_TOKEN").ok().filter(|v| !v.is_empty()),
                dimensions: parse_env_or("EMBEDDING_DIMENSIONS", 384),
                timeout_secs: parse_env_or("EMBEDDING_TIMEOUT", 20),
            },
            llm: LlmConfig {
                mode: LlmMode::parse(&env::var("LLM_MODE").unwrap_or_default()),
                gemini_api_key: env::var("GEMINI_API_KEY").ok().filter(|v| !v.is_empty()),
                gemini_model: env::var("GEMINI_MODEL")
                    .unwrap_or_else(|_| "gemini-2.0-flash".to_string()),
                hf_endpoint: env::var("HF_LLM_ENDPOINT").ok().filter(|v| !v.is_empty()),
                hf_api_token: env::var("HF_API_TOKEN").ok().filter(|v| !v.is_empty()),
                timeout_secs: parse_env_or("LLM_TIMEOUT", 40),
                prompt_version: env::var("LLM_PROMPT_VERSION").unwrap_or_else(|_| "v1".to_string()),
            },
            matching: MatchingConfig {
                top_k: parse_env_or("MATCH_TOP_K", 20),
                evaluate_top_n: parse_env_or("MATCH_EVALUATE_TOP_N", 5),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}
