use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::{LlmConfig, ProviderConfig, ProviderKind};
use crate::generation::GenerateError;
use crate::llm::LlmError;
use crate::models::{GenerationRequest, GenerationResult, ValidationRequest, ValidationResult};
use crate::patterns::matcher::NoMatchSuggestion;
use crate::validation::ValidateError;
use crate::web::state::AppState;

const REDACTED_KEY: &str = "********";

// Error body

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<NoMatchSuggestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    /// Present only for database-unavailable verdicts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syntax_valid: Option<bool>,
}

pub type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, kind: &'static str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
            kind,
            suggestion: None,
            template: None,
            keywords: None,
            syntax_valid: None,
        }),
    )
}

fn internal_error(state: &AppState, detail: impl std::fmt::Display) -> ApiError {
    error!("Internal error: {}", detail);
    let message = if state.config.web.debug {
        format!("Internal error: {}", detail)
    } else {
        "Internal error".to_string()
    };
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
}

// Generation

pub async fn generate_sql(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GenerationRequest>,
) -> Result<Json<GenerationResult>, ApiError> {
    let context = state.context.snapshot().await;

    match state.generator.generate(&context, &payload).await {
        Ok(result) => Ok(Json(result)),
        Err(err) => {
            let message = err.to_string();
            Err(match err {
                GenerateError::Input(_) => api_error(StatusCode::BAD_REQUEST, "input_error", message),
                GenerateError::NoPatternMatch(suggestion) => {
                    let (status, Json(mut body)) =
                        api_error(StatusCode::UNPROCESSABLE_ENTITY, "no_pattern_match", message);
                    body.suggestion = Some(suggestion);
                    (status, Json(body))
                }
                GenerateError::ValueExtraction {
                    template, keywords, ..
                } => {
                    let (status, Json(mut body)) = api_error(
                        StatusCode::UNPROCESSABLE_ENTITY,
                        "value_extraction_failure",
                        message,
                    );
                    body.template = Some(template);
                    body.keywords = Some(keywords);
                    (status, Json(body))
                }
            })
        }
    }
}

// Validation

pub async fn validate_sql(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ValidationRequest>,
) -> Result<Json<ValidationResult>, ApiError> {
    let context = state.context.snapshot().await;

    match state
        .validator
        .validate(&context, &payload.sql, payload.execute)
        .await
    {
        Ok(verdict) => Ok(Json(verdict)),
        Err(ValidateError::Input(message)) => {
            Err(api_error(StatusCode::BAD_REQUEST, "input_error", message))
        }
        Err(ValidateError::DatabaseUnavailable(reason)) => {
            error!("Database unavailable: {}", reason);
            let (status, Json(mut body)) = api_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "database_unavailable",
                "Database unavailable",
            );
            body.syntax_valid = Some(true);
            Err((status, Json(body)))
        }
        Err(ValidateError::Internal(detail)) => Err(internal_error(&state, detail)),
    }
}

// Provider settings

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettingsView {
    pub enabled: bool,
    pub has_api_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl From<&ProviderConfig> for ProviderSettingsView {
    fn from(config: &ProviderConfig) -> Self {
        let has_api_key = config
            .api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty());
        Self {
            enabled: config.enabled,
            has_api_key,
            api_key: has_api_key.then_some(REDACTED_KEY),
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvidersView {
    pub provider: ProviderKind,
    /// Whether the selected provider will actually be called
    pub active: bool,
    pub openai: ProviderSettingsView,
    pub anthropic: ProviderSettingsView,
}

impl ProvidersView {
    fn new(settings: &LlmConfig, active: bool) -> Self {
        Self {
            provider: settings.provider,
            active,
            openai: (&settings.openai).into(),
            anthropic: (&settings.anthropic).into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUpdate {
    pub enabled: Option<bool>,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: Option<u64>,
}

impl ProviderUpdate {
    fn apply(self, config: &mut ProviderConfig) -> Result<(), String> {
        if let Some(enabled) = self.enabled {
            config.enabled = enabled;
        }
        // Echoing the redacted placeholder back keeps the stored key
        if let Some(key) = self.api_key.filter(|k| k != REDACTED_KEY) {
            config.api_key = Some(key).filter(|k| !k.trim().is_empty());
        }
        if let Some(url) = self.api_url {
            config.api_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Some(model) = self.model {
            if model.trim().is_empty() {
                return Err("model must not be empty".to_string());
            }
            config.model = model;
        }
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err("temperature must be between 0 and 2".to_string());
            }
            config.temperature = temperature;
        }
        if let Some(max_tokens) = self.max_tokens {
            if max_tokens == 0 {
                return Err("maxTokens must be positive".to_string());
            }
            config.max_tokens = max_tokens;
        }
        if let Some(timeout_secs) = self.timeout_secs {
            if timeout_secs == 0 {
                return Err("timeoutSecs must be positive".to_string());
            }
            config.timeout_secs = timeout_secs;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvidersUpdate {
    pub provider: Option<ProviderKind>,
    pub openai: Option<ProviderUpdate>,
    pub anthropic: Option<ProviderUpdate>,
}

pub async fn get_providers(State(state): State<Arc<AppState>>) -> Json<ProvidersView> {
    let settings = state.llm_manager.settings().await;
    let active = state.llm_manager.is_enabled().await;
    Json(ProvidersView::new(&settings, active))
}

pub async fn update_providers(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ProvidersUpdate>,
) -> Result<Json<ProvidersView>, ApiError> {
    let updated = state
        .llm_manager
        .update(move |settings| {
            if let Some(provider) = payload.provider {
                settings.provider = provider;
            }
            let updates = [
                (payload.openai, &mut settings.openai),
                (payload.anthropic, &mut settings.anthropic),
            ];
            for (update, config) in updates {
                if let Some(update) = update {
                    update.apply(config).map_err(LlmError::ConfigError)?;
                }
            }
            Ok(())
        })
        .await;

    let settings = match updated {
        Ok(settings) => settings,
        Err(LlmError::ConfigError(e)) => {
            return Err(api_error(StatusCode::BAD_REQUEST, "input_error", e));
        }
        Err(e) => return Err(internal_error(&state, e)),
    };

    info!("Provider settings updated (active provider: {})", settings.provider);
    // Same test the manager uses to decide whether to build a backend
    let active = settings.active().is_usable();
    Ok(Json(ProvidersView::new(&settings, active)))
}

// Schema

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaRefreshResponse {
    pub table_count: usize,
}

pub async fn refresh_schema(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SchemaRefreshResponse>, ApiError> {
    if state.schema_manager.is_none() {
        return Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "database_unavailable",
            "Database unavailable",
        ));
    }

    let table_count = state
        .refresh_schema()
        .await
        .map_err(|e| internal_error(&state, e))?;
    Ok(Json(SchemaRefreshResponse { table_count }))
}

// System status

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    pub table_count: usize,
    pub database_connected: bool,
    pub provider: ProviderKind,
    pub ai_enabled: bool,
}

pub async fn system_status(State(state): State<Arc<AppState>>) -> Json<SystemStatus> {
    let now = chrono::Utc::now();
    let uptime = now.signed_duration_since(state.startup_time).num_seconds();
    let context = state.context.snapshot().await;

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        table_count: context.schema.len(),
        database_connected: context.pool.is_some(),
        provider: state.llm_manager.settings().await.provider,
        ai_enabled: state.llm_manager.is_enabled().await,
    })
}
