use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::config::{LlmConfig, LlmMode};
use crate::error::{MatchError, Result};
use crate::models::{OverallStatus, UrgencyFlag};

use super::prompts::build_prompt;

const FALLBACK_SUMMARY: &str =
    "Potential match identified. Coordinator and physician review is required before enrollment.";
const NORMALIZED_DEFAULT_SUMMARY: &str =
    "Potential match identified. Coordinator review is required.";

/// Rule evaluator output handed to the explanation layer. Serialized into the
/// prompt verbatim; individual fields back-fill anything the model omits.
#[derive(Debug, Clone, Serialize)]
pub struct RuleContext {
    pub eligibility_score: u8,
    pub feasibility_score: u8,
    pub urgency_score: u8,
    pub explainability_score: u8,
    pub urgency_flag: UrgencyFlag,
    pub overall_status: OverallStatus,
    pub reasons_matched: Vec<String>,
    pub reasons_failed: Vec<String>,
    pub missing_info: Vec<String>,
    pub doctor_checklist: Vec<String>,
    pub confidence: f64,
    pub vector_similarity: f64,
}

/// Final explanation attached to an evaluation. Adapter output where a model
/// responded, rule output where it did not.
#[derive(Debug, Clone)]
pub struct Explanation {
    pub summary: String,
    pub reasons_matched: Vec<String>,
    pub reasons_failed: Vec<String>,
    pub missing_info: Vec<String>,
    pub doctor_checklist: Vec<String>,
    pub overall_status: OverallStatus,
    pub confidence: f64,
    pub model: String,
    pub provider: String,
    pub fallback_reason: Option<String>,
}

/// Explanation generation is total: every failure path degrades to the
/// deterministic fallback with a tagged reason.
pub struct ExplanationProvider {
    client: Client,
    config: LlmConfig,
}

impl ExplanationProvider {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MatchError::Explanation(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Fallback-only provider for tests and offline runs.
    pub fn fallback_only() -> Self {
        let config = LlmConfig {
            mode: LlmMode::Fallback,
            ..LlmConfig::default()
        };
        Self {
            client: Client::new(),
            config,
        }
    }

    pub async fn generate(
        &self,
        patient: &Value,
        trial: &Value,
        rule: &RuleContext,
        allow_llm: bool,
    ) -> Explanation {
        if !allow_llm {
            return fallback(rule, "llm_budget_reached");
        }

        let prompt = build_prompt(
            &patient.to_string(),
            &trial.to_string(),
            &serde_json::to_string(rule).unwrap_or_else(|_| "{}".to_string()),
        );

        let gemini_ready = self
            .config
            .gemini_api_key
            .as_deref()
            .map(|k| !k.is_empty())
            .unwrap_or(false);
        let hf_ready = self.config.hf_endpoint.as_deref().map(|e| !e.is_empty()).unwrap_or(false)
            && self.config.hf_api_token.as_deref().map(|t| !t.is_empty()).unwrap_or(false);

        match self.config.mode {
            LlmMode::Fallback => fallback(rule, "llm_mode_fallback"),
            LlmMode::Gemini => {
                if !gemini_ready {
                    return fallback(rule, "missing_gemini_config");
                }
                match self.generate_with_gemini(&prompt, rule).await {
                    Ok(explanation) => explanation,
                    Err(error) => {
                        tracing::warn!(error = %error, "Gemini explanation failed");
                        fallback(rule, "gemini_request_failed")
                    }
                }
            }
            LlmMode::Hf => {
                if !hf_ready {
                    return fallback(rule, "missing_hf_config");
                }
                match self.generate_with_hf(&prompt, rule).await {
                    Ok(explanation) => explanation,
                    Err(error) => {
                        tracing::warn!(error = %error, "HF explanation failed");
                        fallback(rule, "hf_request_failed")
                    }
                }
            }
            // Auto prefers Gemini when configured, then HF, then fallback.
            LlmMode::Auto => {
                if gemini_ready {
                    match self.generate_with_gemini(&prompt, rule).await {
                        Ok(explanation) => return explanation,
                        Err(error) => {
                            tracing::warn!(error = %error, "Gemini explanation failed");
                            if !hf_ready {
                                return fallback(rule, "gemini_request_failed");
                            }
                        }
                    }
                }
                if hf_ready {
                    return match self.generate_with_hf(&prompt, rule).await {
                        Ok(explanation) => explanation,
                        Err(error) => {
                            tracing::warn!(error = %error, "HF explanation failed");
                            fallback(rule, "hf_request_failed")
                        }
                    };
                }
                fallback(rule, "no_llm_provider_configured")
            }
        }
    }

    async fn generate_with_gemini(
        &self,
        prompt: &str,
        rule: &RuleContext,
    ) -> Result<Explanation> {
        let model = self.config.gemini_model.clone();
        let endpoint = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent"
        );
        let api_key = self.config.gemini_api_key.clone().unwrap_or_default();

        let response = self
            .client
            .post(&endpoint)
            .header("X-goog-api-key", api_key)
            .json(&serde_json::json!({
                "contents": [{ "parts": [{ "text": prompt }] }],
                "generationConfig": {
                    "temperature": 0.1,
                    "maxOutputTokens": 800,
                    "responseMimeType": "application/json",
                },
            }))
            .send()
            .await?
            .error_for_status()?;

        let payload: Value = response.json().await?;
        let text = extract_gemini_text(&payload);
        let parsed = extract_json_object(text.trim())?;
        Ok(normalize_response(
            &parsed,
            rule,
            format!("gemini:{model}"),
            "gemini".to_string(),
        ))
    }

    async fn generate_with_hf(&self, prompt: &str, rule: &RuleContext) -> Result<Explanation> {
        let endpoint = self.config.hf_endpoint.clone().unwrap_or_default();
        let api_token = self.config.hf_api_token.clone().unwrap_or_default();

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(api_token)
            .json(&serde_json::json!({
                "inputs": prompt,
                "parameters": { "max_new_tokens": 800, "temperature": 0.1 },
            }))
            .send()
            .await?
            .error_for_status()?;

        let payload: Value = response.json().await?;
        let text = extract_hf_text(&payload);
        let parsed = extract_json_object(text.trim())?;
        Ok(normalize_response(
            &parsed,
            rule,
            endpoint,
            "huggingface".to_string(),
        ))
    }
}

fn fallback(rule: &RuleContext, reason: &str) -> Explanation {
    Explanation {
        summary: FALLBACK_SUMMARY.to_string(),
        reasons_matched: rule.reasons_matched.clone(),
        reasons_failed: rule.reasons_failed.clone(),
        missing_info: rule.missing_info.clone(),
        doctor_checklist: rule.doctor_checklist.clone(),
        overall_status: rule.overall_status,
        confidence: rule.confidence,
        model: "deterministic-fallback".to_string(),
        provider: "local".to_string(),
        fallback_reason: Some(reason.to_string()),
    }
}

/// Model text wins field by field; empty or missing fields keep the rule
/// evaluator's values.
fn normalize_response(
    raw: &serde_json::Map<String, Value>,
    rule: &RuleContext,
    model: String,
    provider: String,
) -> Explanation {
    let summary = raw
        .get("plain_language_summary")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(NORMALIZED_DEFAULT_SUMMARY)
        .to_string();

    let overall_status = raw
        .get("overall_status")
        .and_then(Value::as_str)
        .and_then(OverallStatus::parse)
        .unwrap_or(rule.overall_status);

    let confidence = raw
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(rule.confidence);

    Explanation {
        summary,
        reasons_matched: string_list(raw.get("reasons_matched"), &rule.reasons_matched),
        reasons_failed: string_list(raw.get("reasons_failed"), &rule.reasons_failed),
        missing_info: string_list(raw.get("missing_info"), &rule.missing_info),
        doctor_checklist: string_list(raw.get("doctor_checklist"), &rule.doctor_checklist),
        overall_status,
        confidence,
        model,
        provider,
        fallback_reason: None,
    }
}

fn string_list(value: Option<&Value>, default: &[String]) -> Vec<String> {
    match value {
        Some(Value::Array(items)) if !items.is_empty() => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => default.to_vec(),
    }
}

fn extract_hf_text(payload: &Value) -> String {
    if let Some(obj) = payload.as_object() {
        for key in ["generated_text", "answer"] {
            if let Some(text) = obj.get(key).and_then(Value::as_str) {
                return text.to_string();
            }
        }
    }

    if let Some(first) = payload.as_array().and_then(|items| items.first()) {
        if let Some(obj) = first.as_object() {
            for key in ["generated_text", "summary_text"] {
                if let Some(text) = obj.get(key).and_then(Value::as_str) {
                    return text.to_string();
                }
            }
        }
        if let Some(text) = first.as_str() {
            return text.to_string();
        }
    }

    String::new()
}

fn extract_gemini_text(payload: &Value) -> String {
    let candidates = match payload.get("candidates").and_then(Value::as_array) {
        Some(candidates) => candidates,
        None => return String::new(),
    };

    for candidate in candidates {
        let parts = match candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(Value::as_array)
        {
            Some(parts) => parts,
            None => continue,
        };

        let chunks: Vec<&str> = parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .filter(|text| !text.trim().is_empty())
            .collect();

        if !chunks.is_empty() {
            return chunks.join("\n");
        }
    }

    String::new()
}

/// Pull the first JSON object out of model text, tolerating code fences and
/// prose around it.
fn extract_json_object(text: &str) -> Result<serde_json::Map<String, Value>> {
    let mut cleaned = text.trim();
    let stripped;
    if cleaned.starts_with("```") {
        stripped = cleaned.trim_matches('`').trim();
        cleaned = stripped;
        // Fence labels are not always ASCII, so only strip on a char boundary.
        let labeled_json = cleaned
            .get(..4)
            .is_some_and(|label| label.eq_ignore_ascii_case("json"));
        if labeled_json {
            cleaned = cleaned[4..].trim_start();
        }
    }

    let start = cleaned
        .find('{')
        .ok_or_else(|| MatchError::Explanation("no_json_object".to_string()))?;
    let end = cleaned
        .rfind('}')
        .filter(|end| *end >= start)
        .ok_or_else(|| MatchError::Explanation("no_json_object".to_string()))?;

    let parsed: Value = serde_json::from_str(&cleaned[start..=end])?;
    match parsed {
        Value::Object(map) => Ok(map),
        _ => Err(MatchError::Explanation("json_not_object".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule() -> RuleContext {
        RuleContext {
            eligibility_score: 72,
            feasibility_score: 80,
            urgency_score: 64,
            explainability_score: 86,
            urgency_flag: UrgencyFlag::Medium,
            overall_status: OverallStatus::PossiblyEligible,
            reasons_matched: vec!["Diagnosis profile overlaps with trial condition focus".into()],
            reasons_failed: vec![],
            missing_info: vec!["ECOG/performance status missing".into()],
            doctor_checklist: vec!["Confirm ECOG performance status".into()],
            confidence: 0.63,
            vector_similarity: 0.48,
        }
    }

    #[tokio::test]
    async fn test_fallback_mode_tags_reason_and_copies_rule_fields() {
        let provider = ExplanationProvider::fallback_only();
        let explanation = provider
            .generate(&json!({}), &json!({}), &rule(), true)
            .await;

        assert_eq!(explanation.summary, FALLBACK_SUMMARY);
        assert_eq!(
            explanation.fallback_reason.as_deref(),
            Some("llm_mode_fallback")
        );
        assert_eq!(explanation.provider, "local");
        assert_eq!(explanation.model, "deterministic-fallback");
        assert_eq!(explanation.overall_status, OverallStatus::PossiblyEligible);
        assert_eq!(explanation.confidence, 0.63);
        assert_eq!(explanation.missing_info, rule().missing_info);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_overrides_mode() {
        let provider = ExplanationProvider::fallback_only();
        let explanation = provider
            .generate(&json!({}), &json!({}), &rule(), false)
            .await;
        assert_eq!(
            explanation.fallback_reason.as_deref(),
            Some("llm_budget_reached")
        );
    }

    #[tokio::test]
    async fn test_auto_without_providers_reports_none_configured() {
        let provider = ExplanationProvider::new(LlmConfig::default()).unwrap();
        let explanation = provider
            .generate(&json!({}), &json!({}), &rule(), true)
            .await;
        assert_eq!(
            explanation.fallback_reason.as_deref(),
            Some("no_llm_provider_configured")
        );
    }

    #[tokio::test]
    async fn test_gemini_mode_without_key_reports_missing_config() {
        let config = LlmConfig {
            mode: LlmMode::Gemini,
            ..LlmConfig::default()
        };
        let provider = ExplanationProvider::new(config).unwrap();
        let explanation = provider
            .generate(&json!({}), &json!({}), &rule(), true)
            .await;
        assert_eq!(
            explanation.fallback_reason.as_deref(),
            Some("missing_gemini_config")
        );
    }

    #[test]
    fn test_extract_json_object_from_fenced_text() {
        let text = "```json\n{\"confidence\": 0.8}\n```";
        let parsed = extract_json_object(text).unwrap();
        assert_eq!(parsed.get("confidence"), Some(&json!(0.8)));
    }

    #[test]
    fn test_extract_json_object_tolerates_non_ascii_fence_label() {
        let text = "```日本語\n{\"summary\": \"ok\"}\n```";
        let parsed = extract_json_object(text).unwrap();
        assert_eq!(parsed.get("summary"), Some(&json!("ok")));
    }

    #[test]
    fn test_extract_json_object_from_surrounding_prose() {
        let text = "Here you go: {\"overall_status\": \"Eligible\"} hope this helps";
        let parsed = extract_json_object(text).unwrap();
        assert_eq!(parsed.get("overall_status"), Some(&json!("Eligible")));
    }

    #[test]
    fn test_extract_json_object_rejects_non_object() {
        assert!(extract_json_object("[1, 2, 3]").is_err());
        assert!(extract_json_object("no braces at all").is_err());
    }

    #[test]
    fn test_normalize_prefers_model_fields_but_backfills() {
        let raw = extract_json_object(
            r#"{"plain_language_summary": "Likely fit pending labs.",
                "reasons_matched": ["Condition matches"],
                "overall_status": "Eligible",
                "confidence": 0.9}"#,
        )
        .unwrap();
        let explanation =
            normalize_response(&raw, &rule(), "gemini:test".to_string(), "gemini".to_string());

        assert_eq!(explanation.summary, "Likely fit pending labs.");
        assert_eq!(explanation.reasons_matched, vec!["Condition matches"]);
        assert_eq!(explanation.overall_status, OverallStatus::Eligible);
        assert_eq!(explanation.confidence, 0.9);
        // Omitted lists come from the rule evaluator.
        assert_eq!(explanation.missing_info, rule().missing_info);
        assert_eq!(explanation.doctor_checklist, rule().doctor_checklist);
        assert!(explanation.fallback_reason.is_none());
    }

    #[test]
    fn test_normalize_unknown_status_keeps_rule_status() {
        let raw = extract_json_object(r#"{"overall_status": "Definitely!"}"#).unwrap();
        let explanation =
            normalize_response(&raw, &rule(), "m".to_string(), "gemini".to_string());
        assert_eq!(explanation.overall_status, OverallStatus::PossiblyEligible);
        assert_eq!(explanation.summary, NORMALIZED_DEFAULT_SUMMARY);
    }

    #[test]
    fn test_extract_gemini_text_joins_parts() {
        let payload = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"a\":" }, { "text": "1}" }] }
            }]
        });
        assert_eq!(extract_gemini_text(&payload), "{\"a\":\n1}");
    }

    #[test]
    fn test_extract_hf_text_variants() {
        assert_eq!(
            extract_hf_text(&json!({ "generated_text": "hello" })),
            "hello"
        );
        assert_eq!(
            extract_hf_text(&json!([{ "summary_text": "sum" }])),
            "sum"
        );
        assert_eq!(extract_hf_text(&json!(["plain"])), "plain");
        assert_eq!(extract_hf_text(&json!(42)), "");
    }
}
