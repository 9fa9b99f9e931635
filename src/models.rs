use serde::{Deserialize, Serialize};

/// One result row, keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// Tables of the active database, in introspection order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaMap {
    pub tables: Vec<TableSchema>,
}

impl SchemaMap {
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self { tables }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }
}

// Generation

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(rename = "useAI", default = "default_use_ai")]
    pub use_ai: bool,
}

fn default_use_ai() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationSource {
    Ai,
    PatternMatching,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedPattern {
    pub intent: String,
    pub description: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub sql: String,
    pub confidence: f64,
    pub source: GenerationSource,
    pub matched_pattern: MatchedPattern,
    pub extracted_values: Vec<String>,
}

// Validation

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationRequest {
    pub sql: String,
    #[serde(default)]
    pub execute: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidQuery,
    Syntax,
    Execution,
    Timeout,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub syntax_valid: bool,
    /// The normalized statement that was dry-run and executed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Row>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    pub execution_time_ms: u64,
    pub limited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ValidationResult {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            syntax_valid: false,
            error_kind: Some(ErrorKind::InvalidQuery),
            error_message: Some(message.into()),
            hint: Some("Only single read-only SELECT statements are allowed".to_string()),
            ..Self::default()
        }
    }
}
