use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

use querygate::audit::TracingAuditLog;
use querygate::config::{AppConfig, CliArgs};
use querygate::context::{ContextHandle, RuntimeContext};
use querygate::db::db_pool::{build_pool, ConnectionPool};
use querygate::db::schema_manager::SchemaManager;
use querygate::generation::Generator;
use querygate::llm::LlmManager;
use querygate::models::SchemaMap;
use querygate::patterns::matcher::PatternMatcher;
use querygate::patterns::PatternCatalog;
use querygate::util::logging::init_tracing;
use querygate::validation::Validator;
use querygate::web::{self, state::AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = CliArgs::parse();

    // Initialize logging
    init_tracing(args.log_json);

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    info!("Initializing DuckDB connection pool: {}", config.database.connection_string);
    let (pool, schema_manager) =
        match build_pool(&config.database.connection_string, config.database.pool_size as u32) {
            Ok(pool) => {
                let manager = SchemaManager::new(pool.clone());
                (Some(Arc::new(pool) as Arc<dyn ConnectionPool>), Some(manager))
            }
            Err(e) => {
                // Generation still works without a database; validation reports unavailable
                error!("Failed to open database: {}", e);
                (None, None)
            }
        };

    // Initialize schema map
    let schema = match &schema_manager {
        Some(manager) => manager.load().await.unwrap_or_else(|e| {
            error!("Failed to load schema: {}", e);
            SchemaMap::default()
        }),
        None => SchemaMap::default(),
    };
    if schema.is_empty() {
        warn!("Schema map is empty; AI prompts will carry no table information");
    }
    let context = Arc::new(ContextHandle::new(RuntimeContext::new(schema, pool)));

    // Pattern catalog
    let catalog = PatternCatalog::load(config.patterns.catalog_path.as_deref())?;
    let matcher = PatternMatcher::new(Arc::new(catalog));

    // Initialize LLM manager
    info!("Initializing LLM manager with provider: {}", config.llm.provider);
    let llm_manager = Arc::new(LlmManager::new(&config.llm)?);

    let generator = Generator::new(
        Arc::clone(&llm_manager),
        matcher,
        Arc::new(TracingAuditLog),
    );
    let validator = Validator::new(&config.safety)?;

    let app_state = Arc::new(AppState::new(
        config.clone(),
        context,
        generator,
        validator,
        llm_manager,
        schema_manager,
    ));

    // Start the web server
    info!("Starting querygate on {}:{}", config.web.host, config.web.port);
    match web::run_server(config.web, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
