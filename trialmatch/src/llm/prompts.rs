/// Prompt for the explanation model. The schema is enforced downstream by
/// JSON extraction and field-level fallbacks, not by the model.
const ELIGIBILITY_PROMPT_TEMPLATE: &str = r#"You are a clinical trial matching explanation engine.
Return strict JSON with this exact schema:
{
  "plain_language_summary": "string",
  "reasons_matched": ["string"],
  "reasons_failed": ["string"],
  "missing_info": ["string"],
  "doctor_checklist": ["string"],
  "overall_status": "Eligible|Possibly Eligible|Unlikely",
  "confidence": 0.0
}

Input patient profile:
{patient_json}

Input trial profile:
{trial_json}

Input rule evaluation:
{rule_json}

Rules:
- Be concise and clinically neutral.
- Mention unknowns explicitly in missing_info.
- Do not claim final medical eligibility.
- Output JSON only."#;

pub fn build_prompt(patient_json: &str, trial_json: &str, rule_json: &str) -> String {
    ELIGIBILITY_PROMPT_TEMPLATE
        .replace("{patient_json}", patient_json)
        .replace("{trial_json}", trial_json)
        .replace("{rule_json}", rule_json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_prompt_substitutes_all_sections() {
        let prompt = build_prompt(
            r#"{"age": 54}"#,
            r#"{"trial_id": "NCT1"}"#,
            r#"{"confidence": 0.6}"#,
        );
        assert!(prompt.contains(r#"{"age": 54}"#));
        assert!(prompt.contains(r#"{"trial_id": "NCT1"}"#));
        assert!(prompt.contains(r#"{"confidence": 0.6}"#));
        // The schema block keeps its literal braces.
        assert!(prompt.contains("\"plain_language_summary\": \"string\""));
    }
}
