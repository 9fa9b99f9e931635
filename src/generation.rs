use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

use crate::audit::{AuditEntry, AuditLog, AuditStatus};
use crate::context::RuntimeContext;
use crate::llm::models::AiGeneration;
use crate::llm::LlmManager;
use crate::models::{GenerationRequest, GenerationResult, GenerationSource, MatchedPattern};
use crate::patterns::matcher::{FilledQuery, MatchError, NoMatchSuggestion, PatternMatcher};

pub const MAX_PROMPT_CHARS: usize = 500;
const AI_INTENT: &str = "ai_generated";

#[derive(Debug, Clone, Error)]
pub enum GenerateError {
    #[error("{0}")]
    Input(String),
    #[error("No query pattern matched the request")]
    NoPatternMatch(NoMatchSuggestion),
    #[error("Could not extract values for pattern '{intent}'")]
    ValueExtraction {
        intent: String,
        template: String,
        keywords: Vec<String>,
    },
}

impl From<MatchError> for GenerateError {
    fn from(err: MatchError) -> Self {
        match err {
            MatchError::NoMatch(suggestion) => GenerateError::NoPatternMatch(suggestion),
            MatchError::ValueExtraction {
                intent,
                template,
                keywords,
            } => GenerateError::ValueExtraction {
                intent,
                template,
                keywords,
            },
        }
    }
}

/// AI first, pattern matching as the fallback, one audit record per request.
pub struct Generator {
    llm: Arc<LlmManager>,
    matcher: PatternMatcher,
    audit: Arc<dyn AuditLog>,
}

impl Generator {
    pub fn new(llm: Arc<LlmManager>, matcher: PatternMatcher, audit: Arc<dyn AuditLog>) -> Self {
        Self {
            llm,
            matcher,
            audit,
        }
    }

    pub async fn generate(
        &self,
        context: &RuntimeContext,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GenerateError> {
        let prompt = request.prompt.trim();
        validate_prompt(prompt)?;

        let started = Instant::now();
        info!("Generating SQL for prompt (use_ai: {}): {}", request.use_ai, prompt);

        let mut ai_result = None;
        if request.use_ai && self.llm.is_enabled().await {
            // Any provider failure has already been logged; fall through silently
            ai_result = self.llm.generate(prompt, &context.schema).await.ok();
        }

        let outcome = match ai_result {
            Some(generation) => Ok(from_ai(generation)),
            None => self
                .matcher
                .generate(prompt)
                .map(from_pattern)
                .map_err(GenerateError::from),
        };

        self.audit(prompt, &outcome, started);
        outcome
    }

    fn audit(&self, prompt: &str, outcome: &Result<GenerationResult, GenerateError>, started: Instant) {
        let latency_ms = started.elapsed().as_millis() as u64;
        let entry = match outcome {
            Ok(result) => AuditEntry {
                timestamp: chrono::Utc::now(),
                prompt: prompt.to_string(),
                sql: Some(result.sql.clone()),
                status: AuditStatus::Success,
                source: Some(result.source),
                confidence: Some(result.confidence),
                latency_ms,
            },
            Err(err) => AuditEntry {
                timestamp: chrono::Utc::now(),
                prompt: prompt.to_string(),
                sql: None,
                status: match err {
                    GenerateError::ValueExtraction { .. } => AuditStatus::ValueExtractionFailure,
                    _ => AuditStatus::NoPatternMatch,
                },
                source: Some(GenerationSource::PatternMatching),
                confidence: None,
                latency_ms,
            },
        };

        if let Err(e) = self.audit.record(entry) {
            warn!("Failed to record generation audit entry: {}", e);
        }
    }
}

fn validate_prompt(prompt: &str) -> Result<(), GenerateError> {
    if prompt.is_empty() {
        return Err(GenerateError::Input("Prompt is required".to_string()));
    }
    let chars = prompt.chars().count();
    if chars > MAX_PROMPT_CHARS {
        return Err(GenerateError::Input(format!(
            "Prompt is too long ({} characters, maximum {})",
            chars, MAX_PROMPT_CHARS
        )));
    }
    Ok(())
}

fn from_ai(generation: AiGeneration) -> GenerationResult {
    GenerationResult {
        sql: generation.sql,
        confidence: generation.confidence.clamp(0.0, 1.0),
        source: GenerationSource::Ai,
        matched_pattern: MatchedPattern {
            intent: AI_INTENT.to_string(),
            description: generation
                .reasoning
                .unwrap_or_else(|| "Generated by AI provider".to_string()),
            keywords: generation.tables_used,
        },
        extracted_values: Vec::new(),
    }
}

fn from_pattern(filled: FilledQuery) -> GenerationResult {
    GenerationResult {
        sql: filled.sql,
        confidence: filled.confidence.clamp(0.0, 1.0),
        source: GenerationSource::PatternMatching,
        matched_pattern: MatchedPattern {
            intent: filled.pattern.intent,
            description: filled.pattern.description,
            keywords: filled.pattern.keywords,
        },
        extracted_values: filled.extracted_values,
    }
}
