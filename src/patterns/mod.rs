pub mod matcher;

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::util::assets::get_embedded_file;

const EMBEDDED_CATALOG: &str = "patterns.json";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read pattern catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse pattern catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("embedded pattern catalog is missing")]
    MissingEmbedded,
}

/// A canned SQL template selected by keyword scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPattern {
    pub intent: String,
    /// SQL with `?` positional placeholders
    pub template: String,
    pub description: String,
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples: Option<Vec<String>>,
}

impl QueryPattern {
    pub fn placeholder_count(&self) -> usize {
        self.template.matches('?').count()
    }

    pub fn has_keyword(&self, token: &str) -> bool {
        self.keywords.iter().any(|k| k == token)
    }
}

/// The immutable set of patterns the fallback engine scores against.
#[derive(Debug, Clone, Default)]
pub struct PatternCatalog {
    patterns: Vec<QueryPattern>,
}

impl PatternCatalog {
    /// Normalizes keywords to lower case, drops duplicates and discards
    /// patterns left without any keyword (they could never score).
    pub fn new(patterns: Vec<QueryPattern>) -> Self {
        let patterns = patterns
            .into_iter()
            .filter_map(|mut pattern| {
                let mut keywords: Vec<String> = Vec::with_capacity(pattern.keywords.len());
                for keyword in &pattern.keywords {
                    let keyword = keyword.trim().to_lowercase();
                    if !keyword.is_empty() && !keywords.contains(&keyword) {
                        keywords.push(keyword);
                    }
                }
                if keywords.is_empty() {
                    warn!("Dropping pattern '{}' without keywords", pattern.intent);
                    return None;
                }
                pattern.keywords = keywords;
                Some(pattern)
            })
            .collect();

        Self { patterns }
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let patterns: Vec<QueryPattern> = serde_json::from_str(json)?;
        Ok(Self::new(patterns))
    }

    /// Loads the catalog from `path`, or the embedded default when none is given.
    pub fn load(path: Option<&Path>) -> Result<Self, CatalogError> {
        let catalog = match path {
            Some(path) => {
                info!("Loading pattern catalog from {}", path.display());
                Self::from_json(&std::fs::read_to_string(path)?)?
            }
            None => {
                let json = get_embedded_file(EMBEDDED_CATALOG).ok_or(CatalogError::MissingEmbedded)?;
                Self::from_json(&json)?
            }
        };
        info!("Pattern catalog ready with {} patterns", catalog.len());
        Ok(catalog)
    }

    pub fn patterns(&self) -> &[QueryPattern] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
