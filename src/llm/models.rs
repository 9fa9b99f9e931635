use serde::Serialize;
use serde_json::Value;

use super::Unavailable;

// Validated output of an AI generation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AiGeneration {
    pub sql: String,
    /// Always within [0, 1]
    pub confidence: f64,
    pub reasoning: Option<String>,
    pub tables_used: Vec<String>,
}

impl AiGeneration {
    /// Checks the decoded `{sql, confidence, reasoning, tables_used}` object.
    pub fn from_value(value: &Value) -> Result<Self, Unavailable> {
        let sql = value
            .get("sql")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|sql| !sql.is_empty())
            .ok_or_else(|| Unavailable::new("response has no sql"))?;

        let confidence = value
            .get("confidence")
            .and_then(Value::as_f64)
            .ok_or_else(|| Unavailable::new("response confidence is not numeric"))?;

        let reasoning = value
            .get("reasoning")
            .and_then(Value::as_str)
            .map(str::to_string);

        let tables_used = value
            .get("tables_used")
            .and_then(Value::as_array)
            .map(|tables| {
                tables
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            sql: sql.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            reasoning,
            tables_used,
        })
    }
}
