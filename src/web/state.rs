use std::sync::Arc;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::context::ContextHandle;
use crate::db::db_pool::DbError;
use crate::db::schema_manager::SchemaManager;
use crate::generation::Generator;
use crate::llm::LlmManager;
use crate::validation::Validator;

/// Shared application state for the web server
pub struct AppState {
    pub config: AppConfig,
    pub context: Arc<ContextHandle>,
    pub generator: Generator,
    pub validator: Validator,
    pub llm_manager: Arc<LlmManager>,
    /// `None` when the server runs without a database
    pub schema_manager: Option<SchemaManager>,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        context: Arc<ContextHandle>,
        generator: Generator,
        validator: Validator,
        llm_manager: Arc<LlmManager>,
        schema_manager: Option<SchemaManager>,
    ) -> Self {
        Self {
            config,
            context,
            generator,
            validator,
            llm_manager,
            schema_manager,
            startup_time: chrono::Utc::now(),
        }
    }

    /// Re-reads the schema and swaps it into the runtime context.
    /// Returns the new table count.
    pub async fn refresh_schema(&self) -> Result<usize, DbError> {
        let Some(manager) = &self.schema_manager else {
            return Err(DbError::new("no database connection is configured"));
        };

        match manager.load().await {
            Ok(schema) => {
                let tables = schema.len();
                self.context.replace_schema(schema).await;
                info!("Schema refreshed: {} tables", tables);
                Ok(tables)
            }
            Err(e) => {
                error!("Error refreshing schema: {}", e);
                Err(e)
            }
        }
    }
}
