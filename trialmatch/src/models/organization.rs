use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_ELIGIBILITY_WEIGHT: f64 = 0.45;
pub const DEFAULT_FEASIBILITY_WEIGHT: f64 = 0.30;
pub const DEFAULT_URGENCY_WEIGHT: f64 = 0.20;
pub const DEFAULT_EXPLAINABILITY_WEIGHT: f64 = 0.05;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub country: String,
    pub score_weights: ScoreWeights,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    pub fn new(id: String, name: String, slug: String, country: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            slug,
            country,
            score_weights: ScoreWeights::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Organization-configured blending weights, stored as-received. Values are
/// kept as raw JSON because operators submit this mapping by hand; validation
/// happens at normalization time, not at ingestion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreWeights {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eligibility: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feasibility: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urgency: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explainability: Option<Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Normalized weights, guaranteed non-negative and summing to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreWeightVector {
    pub eligibility: f64,
    pub feasibility: f64,
    pub urgency: f64,
    pub explainability: f64,
}

impl ScoreWeightVector {
    pub fn defaults() -> Self {
        Self {
            eligibility: DEFAULT_ELIGIBILITY_WEIGHT,
            feasibility: DEFAULT_FEASIBILITY_WEIGHT,
            urgency: DEFAULT_URGENCY_WEIGHT,
            explainability: DEFAULT_EXPLAINABILITY_WEIGHT,
        }
    }
}

/// Parse one configured weight. Numbers and numeric strings are accepted;
/// anything else takes the per-key default. Negatives clamp to zero and stay
/// zero (they do not fall back to the default).
fn parse_weight(value: Option<&Value>, default: f64) -> f64 {
    let parsed = match value {
        None => default,
        Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(default),
        Some(_) => default,
    };
    if !parsed.is_finite() {
        return default.max(0.0);
    }
    parsed.max(0.0)
}

impl ScoreWeights {
    pub fn from_values(
        eligibility: f64,
        feasibility: f64,
        urgency: f64,
        explainability: f64,
    ) -> Self {
        Self {
            eligibility: serde_json::Number::from_f64(eligibility).map(Value::Number),
            feasibility: serde_json::Number::from_f64(feasibility).map(Value::Number),
            urgency: serde_json::Number::from_f64(urgency).map(Value::Number),
            explainability: serde_json::Number::from_f64(explainability).map(Value::Number),
            extra: serde_json::Map::new(),
        }
    }

    /// Normalize to a vector summing to 1.0. When the merged total is not
    /// positive, all four defaults apply instead.
    pub fn normalized(&self) -> ScoreWeightVector {
        let eligibility = parse_weight(self.eligibility.as_ref(), DEFAULT_ELIGIBILITY_WEIGHT);
        let feasibility = parse_weight(self.feasibility.as_ref(), DEFAULT_FEASIBILITY_WEIGHT);
        let urgency = parse_weight(self.urgency.as_ref(), DEFAULT_URGENCY_WEIGHT);
        let explainability = parse_weight(
            self.explainability.as_ref(),
            DEFAULT_EXPLAINABILITY_WEIGHT,
        );

        let total = eligibility + feasibility + urgency + explainability;
        if total <= 0.0 {
            return ScoreWeightVector::defaults();
        }

        ScoreWeightVector {
            eligibility: eligibility / total,
            feasibility: feasibility / total,
            urgency: urgency / total,
            explainability: explainability / total,
        }
    }
}
