use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::{PatternCatalog, QueryPattern};

const STOPWORDS: [&str; 10] = ["the", "and", "or", "in", "at", "to", "for", "of", "with", "by"];
const SUGGESTED_KEYWORDS_PER_PATTERN: usize = 2;
const MAX_SUGGESTED_KEYWORDS: usize = 10;
const MAX_SUGGESTED_PATTERNS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternSummary {
    pub intent: String,
    pub description: String,
}

/// Guidance returned when no pattern scores at all.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoMatchSuggestion {
    pub keywords: Vec<String>,
    pub patterns: Vec<PatternSummary>,
}

#[derive(Debug, Clone, Error)]
pub enum MatchError {
    #[error("no query pattern matched the request")]
    NoMatch(NoMatchSuggestion),
    #[error("pattern '{intent}' matched but no values could be extracted")]
    ValueExtraction {
        intent: String,
        template: String,
        keywords: Vec<String>,
    },
}

/// Scoring outcome for one catalog entry.
#[derive(Debug, Clone)]
pub struct ScoredPattern<'a> {
    pub pattern: &'a QueryPattern,
    pub score: usize,
    pub adjusted_score: f64,
    /// Tokens adjacent to matched keywords
    pub adjacent_values: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FilledQuery {
    pub sql: String,
    pub confidence: f64,
    pub pattern: QueryPattern,
    /// Values substituted into the template, one per placeholder
    pub extracted_values: Vec<String>,
}

/// Lower-cases the prompt, strips punctuation and splits it into words.
pub fn tokenize(prompt: &str) -> Vec<String> {
    prompt
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '_')
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

pub fn score_pattern<'a>(pattern: &'a QueryPattern, tokens: &[String]) -> ScoredPattern<'a> {
    let mut score = 0;
    let mut adjacent_values = Vec::new();

    for keyword in &pattern.keywords {
        let Some(i) = tokens.iter().position(|t| t == keyword) else {
            continue;
        };
        score += 1;

        let next = tokens.get(i + 1).filter(|t| !pattern.has_keyword(t));
        let prev = i
            .checked_sub(1)
            .and_then(|j| tokens.get(j))
            .filter(|t| !pattern.has_keyword(t));
        if let Some(value) = next.or(prev) {
            adjacent_values.push(value.clone());
        }
    }

    let density = score as f64 / pattern.keywords.len() as f64;
    ScoredPattern {
        pattern,
        score,
        adjusted_score: score as f64 + 0.5 * density,
        adjacent_values,
    }
}

/// Deterministic keyword-scoring generator over a fixed catalog.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    catalog: Arc<PatternCatalog>,
}

impl PatternMatcher {
    pub fn new(catalog: Arc<PatternCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &PatternCatalog {
        &self.catalog
    }

    /// Highest adjusted score wins; ties go to the earlier catalog entry.
    pub fn best_match<'a>(&'a self, tokens: &[String]) -> Option<ScoredPattern<'a>> {
        let mut best: Option<ScoredPattern<'a>> = None;
        for pattern in self.catalog.patterns() {
            if pattern.keywords.is_empty() {
                continue;
            }
            let scored = score_pattern(pattern, tokens);
            if best
                .as_ref()
                .is_none_or(|b| scored.adjusted_score > b.adjusted_score)
            {
                best = Some(scored);
            }
        }
        best.filter(|b| b.adjusted_score > 0.0)
    }

    pub fn generate(&self, prompt: &str) -> Result<FilledQuery, MatchError> {
        let tokens = tokenize(prompt);
        let best = self
            .best_match(&tokens)
            .ok_or_else(|| MatchError::NoMatch(self.suggestion()))?;
        let pattern = best.pattern;

        debug!(
            "Pattern '{}' won with score {} (adjusted {:.2}), adjacent values {:?}",
            pattern.intent, best.score, best.adjusted_score, best.adjacent_values
        );

        let placeholders = pattern.placeholder_count();
        let mut extracted_values = Vec::with_capacity(placeholders);
        let sql = if placeholders == 0 {
            pattern.template.clone()
        } else {
            let pool: Vec<&String> = tokens
                .iter()
                .filter(|t| !pattern.has_keyword(t))
                .filter(|t| t.chars().count() > 1)
                .filter(|t| !STOPWORDS.contains(&t.as_str()))
                .collect();

            if pool.is_empty() {
                return Err(MatchError::ValueExtraction {
                    intent: pattern.intent.clone(),
                    template: pattern.template.clone(),
                    keywords: pattern.keywords.clone(),
                });
            }

            let mut sql = String::with_capacity(pattern.template.len());
            for c in pattern.template.chars() {
                if c == '?' {
                    let value = pool[extracted_values.len() % pool.len()];
                    sql.push_str(value);
                    extracted_values.push(value.clone());
                } else {
                    sql.push(c);
                }
            }
            sql
        };

        let confidence = (best.adjusted_score / pattern.keywords.len() as f64).clamp(0.0, 1.0);

        Ok(FilledQuery {
            sql,
            confidence,
            pattern: pattern.clone(),
            extracted_values,
        })
    }

    pub fn suggestion(&self) -> NoMatchSuggestion {
        let mut keywords: Vec<String> = Vec::new();
        for pattern in self.catalog.patterns() {
            for keyword in pattern.keywords.iter().take(SUGGESTED_KEYWORDS_PER_PATTERN) {
                if keywords.len() < MAX_SUGGESTED_KEYWORDS && !keywords.contains(keyword) {
                    keywords.push(keyword.clone());
                }
            }
        }

        let patterns = self
            .catalog
            .patterns()
            .iter()
            .take(MAX_SUGGESTED_PATTERNS)
            .map(|p| PatternSummary {
                intent: p.intent.clone(),
                description: p.description.clone(),
            })
            .collect();

        NoMatchSuggestion { keywords, patterns }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(intent: &str, template: &str, keywords: &[&str]) -> QueryPattern {
        QueryPattern {
            intent: intent.to_string(),
            template: template.to_string(),
            description: format!("{} description", intent),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            examples: None,
        }
    }

    fn matcher(patterns: Vec<QueryPattern>) -> PatternMatcher {
        PatternMatcher::new(Arc::new(PatternCatalog::new(patterns)))
    }

    #[test]
    fn test_tokenize_strips_punctuation_and_case() {
        assert_eq!(
            tokenize("Show ORDERS, with status: 'Pending'!"),
            vec!["show", "orders", "with", "status", "pending"]
        );
    }

    #[test]
    fn test_keywords_match_whole_tokens_only() {
        let p = pattern("orders", "SELECT 1", &["order"]);
        let scored = score_pattern(&p, &tokenize("list all orders"));
        assert_eq!(scored.score, 0);
        assert_eq!(scored.adjusted_score, 0.0);
    }

    #[test]
    fn test_adjacent_value_prefers_next_then_previous() {
        let p = pattern("x", "SELECT 1", &["status", "orders"]);
        let scored = score_pattern(&p, &tokenize("shipped orders status"));
        // "status" is last: next missing, previous is a keyword -> nothing.
        // "orders": next is a keyword, previous is "shipped".
        assert_eq!(scored.score, 2);
        assert_eq!(scored.adjacent_values, vec!["shipped"]);
        assert_eq!(scored.adjusted_score, 2.5);
    }

    #[test]
    fn test_fills_every_placeholder() {
        let m = matcher(vec![pattern(
            "orders_by_status",
            "SELECT * FROM orders WHERE status = '?'",
            &["orders", "status"],
        )]);

        let filled = m.generate("orders with status pending").unwrap();
        assert_eq!(filled.sql, "SELECT * FROM orders WHERE status = 'pending'");
        assert!(!filled.sql.contains('?'));
        assert_eq!(filled.extracted_values, vec!["pending"]);
        assert_eq!(filled.pattern.intent, "orders_by_status");
        assert_eq!(filled.confidence, 1.0);
    }

    #[test]
    fn test_single_value_is_reused_cyclically() {
        let m = matcher(vec![pattern(
            "two",
            "SELECT * FROM t WHERE a = '?' OR b = '?'",
            &["lookup"],
        )]);

        let filled = m.generate("lookup the alice").unwrap();
        assert_eq!(filled.sql, "SELECT * FROM t WHERE a = 'alice' OR b = 'alice'");
        assert_eq!(filled.extracted_values, vec!["alice", "alice"]);
    }

    #[test]
    fn test_values_cycle_in_prompt_order() {
        let m = matcher(vec![pattern("three", "? ? ?", &["pick"])]);
        let filled = m.generate("pick red blue").unwrap();
        assert_eq!(filled.sql, "red blue red");
    }

    #[test]
    fn test_no_match_returns_suggestions() {
        let m = matcher(vec![
            pattern("a", "SELECT 1", &["orders", "status", "shipped"]),
            pattern("b", "SELECT 2", &["customers", "city"]),
            pattern("c", "SELECT 3", &["orders", "revenue"]),
            pattern("d", "SELECT 4", &["products"]),
        ]);

        match m.generate("what is the weather like") {
            Err(MatchError::NoMatch(suggestion)) => {
                assert_eq!(
                    suggestion.keywords,
                    vec!["orders", "status", "customers", "city", "revenue", "products"]
                );
                assert_eq!(suggestion.patterns.len(), 3);
                assert_eq!(suggestion.patterns[0].intent, "a");
            }
            other => panic!("expected NoMatch, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_pool_is_extraction_failure() {
        let m = matcher(vec![pattern(
            "by_status",
            "SELECT * FROM orders WHERE status = '?'",
            &["orders", "status"],
        )]);

        match m.generate("orders by status a") {
            Err(MatchError::ValueExtraction {
                intent,
                template,
                keywords,
            }) => {
                assert_eq!(intent, "by_status");
                assert!(template.contains('?'));
                assert_eq!(keywords, vec!["orders", "status"]);
            }
            other => panic!("expected ValueExtraction, got {:?}", other),
        }
    }

    #[test]
    fn test_template_without_placeholders_needs_no_values() {
        let m = matcher(vec![pattern("count", "SELECT COUNT(*) FROM customers", &["count"])]);
        let filled = m.generate("count").unwrap();
        assert_eq!(filled.sql, "SELECT COUNT(*) FROM customers");
        assert!(filled.extracted_values.is_empty());
    }

    #[test]
    fn test_highest_adjusted_score_wins_and_ties_keep_first() {
        let m = matcher(vec![
            pattern("first", "SELECT 1", &["orders", "x1", "x2", "x3"]),
            pattern("second", "SELECT 2", &["orders", "y1"]),
            pattern("third", "SELECT 3", &["orders", "y2"]),
        ]);

        // first: 1 + 0.5 * 0.25, second/third: 1 + 0.5 * 0.5 -> second wins the tie.
        let filled = m.generate("orders").unwrap();
        assert_eq!(filled.pattern.intent, "second");
        assert_eq!(filled.confidence, 0.625);
    }

    #[test]
    fn test_confidence_is_capped_at_one() {
        let m = matcher(vec![pattern("solo", "SELECT 1", &["revenue"])]);
        let filled = m.generate("revenue").unwrap();
        assert_eq!(filled.confidence, 1.0);

        let m = matcher(vec![pattern("wide", "SELECT 1", &["a1", "b1", "c1", "revenue"])]);
        let filled = m.generate("revenue").unwrap();
        assert!(filled.confidence > 0.0 && filled.confidence <= 1.0);
    }

    #[test]
    fn test_embedded_examples_resolve_to_their_own_pattern() {
        let catalog = Arc::new(PatternCatalog::load(None).unwrap());
        let m = PatternMatcher::new(Arc::clone(&catalog));

        for pattern in catalog.patterns() {
            let examples = pattern.examples.as_deref().unwrap_or_default();
            assert!(!examples.is_empty(), "{} has no examples", pattern.intent);

            for example in examples {
                let filled = m
                    .generate(example)
                    .unwrap_or_else(|e| panic!("'{}' failed: {}", example, e));
                assert_eq!(filled.pattern.intent, pattern.intent, "'{}'", example);
                assert!(!filled.sql.contains('?'), "'{}'", example);
                for value in &filled.extracted_values {
                    assert!(!pattern.has_keyword(value), "'{}' filled keyword {}", example, value);
                }
            }
        }
    }

    #[test]
    fn test_embedded_catalog_fills_prompt_values() {
        let m = PatternMatcher::new(Arc::new(PatternCatalog::load(None).unwrap()));

        let filled = m.generate("find products named lamp").unwrap();
        assert_eq!(filled.extracted_values, vec!["lamp"]);
        assert!(filled.sql.contains("'%lamp%'"));

        let filled = m.generate("orders with status shipped").unwrap();
        assert_eq!(filled.pattern.intent, "orders_by_status");
        assert_eq!(filled.extracted_values, vec!["shipped"]);

        let filled = m.generate("how many customers do we have").unwrap();
        assert_eq!(filled.pattern.intent, "count_customers");
    }
}
