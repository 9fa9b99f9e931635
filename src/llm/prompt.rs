use minijinja::{context, Environment};

use super::LlmError;
use crate::models::SchemaMap;
use crate::util::assets::get_embedded_file;

const SYSTEM_TEMPLATE: &str = "prompts/system.j2";
const DIALECT: &str = "DuckDB";

/// Renders the schema-grounded system instruction shared by all providers.
pub struct PromptBuilder {
    env: Environment<'static>,
}

impl PromptBuilder {
    pub fn new() -> Result<Self, LlmError> {
        let source = get_embedded_file(SYSTEM_TEMPLATE).ok_or_else(|| {
            LlmError::ConfigError(format!("Missing prompt template {}", SYSTEM_TEMPLATE))
        })?;

        let mut env = Environment::new();
        env.add_template_owned(SYSTEM_TEMPLATE, source)
            .map_err(|e| LlmError::ConfigError(format!("Invalid prompt template: {}", e)))?;

        Ok(Self { env })
    }

    pub fn system_prompt(&self, schema: &SchemaMap) -> Result<String, LlmError> {
        self.env
            .get_template(SYSTEM_TEMPLATE)
            .and_then(|tmpl| {
                tmpl.render(context! {
                    dialect => DIALECT,
                    tables => &schema.tables,
                })
            })
            .map_err(|e| LlmError::ConfigError(format!("Failed to render prompt: {}", e)))
    }

    pub fn user_prompt(&self, question: &str) -> String {
        question.trim().to_string()
    }
}
