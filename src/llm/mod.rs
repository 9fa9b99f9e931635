pub mod lenient;
pub mod models;
pub mod prompt;
pub mod providers;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::{LlmConfig, ProviderKind};
use crate::models::SchemaMap;
use self::lenient::lenient_decode;
use self::models::AiGeneration;
use self::prompt::PromptBuilder;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM connection error: {0}")]
    ConnectionError(String),
    #[error("LLM response error: {0}")]
    ResponseError(String),
    #[error("LLM configuration error: {0}")]
    ConfigError(String),
}

/// The single signal the adapter emits for any failed generation attempt.
#[derive(Debug, Clone, Error)]
#[error("AI provider unavailable: {reason}")]
pub struct Unavailable {
    pub reason: String,
}

impl Unavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<LlmError> for Unavailable {
    fn from(err: LlmError) -> Self {
        Self::new(err.to_string())
    }
}

/// A generative backend: one request/response shape, returns the model's raw text.
#[async_trait]
pub trait AiBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError>;
}

fn build_backend(config: &LlmConfig) -> Result<Option<Arc<dyn AiBackend>>, LlmError> {
    let provider = config.active();
    if !provider.is_usable() {
        return Ok(None);
    }

    let backend: Arc<dyn AiBackend> = match config.provider {
        ProviderKind::OpenAi => Arc::new(providers::openai::OpenAiProvider::new(provider)?),
        ProviderKind::Anthropic => Arc::new(providers::anthropic::AnthropicProvider::new(provider)?),
    };
    Ok(Some(backend))
}

struct ActiveProvider {
    settings: LlmConfig,
    /// `None` when the selected provider is disabled or has no credential
    backend: Option<Arc<dyn AiBackend>>,
}

/// Owns provider selection and configuration and exposes the
/// `generate(prompt, schema) -> AiGeneration | Unavailable` contract.
pub struct LlmManager {
    active: RwLock<ActiveProvider>,
    prompts: PromptBuilder,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let backend = build_backend(config)?;
        match &backend {
            Some(b) => info!("AI provider '{}' enabled", b.name()),
            None => warn!(
                "AI provider '{}' is disabled or has no API key; pattern matching only",
                config.provider
            ),
        }

        Ok(Self {
            active: RwLock::new(ActiveProvider {
                settings: config.clone(),
                backend,
            }),
            prompts: PromptBuilder::new()?,
        })
    }

    /// Wraps an already-built backend, bypassing configuration.
    pub fn with_backend(settings: LlmConfig, backend: Arc<dyn AiBackend>) -> Result<Self, LlmError> {
        Ok(Self {
            active: RwLock::new(ActiveProvider {
                settings,
                backend: Some(backend),
            }),
            prompts: PromptBuilder::new()?,
        })
    }

    pub async fn is_enabled(&self) -> bool {
        self.active.read().await.backend.is_some()
    }

    pub async fn settings(&self) -> LlmConfig {
        self.active.read().await.settings.clone()
    }

    /// Applies new settings for subsequent calls; in-flight calls keep the
    /// backend they started with.
    pub async fn configure(&self, settings: LlmConfig) -> Result<(), LlmError> {
        self.update(|current| {
            *current = settings;
            Ok(())
        })
        .await
        .map(|_| ())
    }

    /// Edits the current settings in place under the write lock, so
    /// concurrent updates never overwrite each other. Nothing changes unless
    /// both the edit and the new backend succeed.
    pub async fn update<F>(&self, edit: F) -> Result<LlmConfig, LlmError>
    where
        F: FnOnce(&mut LlmConfig) -> Result<(), LlmError>,
    {
        let mut active = self.active.write().await;
        let mut settings = active.settings.clone();
        edit(&mut settings)?;

        let backend = build_backend(&settings)?;
        info!(
            "Reconfigured AI provider: {} ({})",
            settings.provider,
            if backend.is_some() { "enabled" } else { "disabled" }
        );
        *active = ActiveProvider {
            settings: settings.clone(),
            backend,
        };
        Ok(settings)
    }

    pub async fn generate(&self, question: &str, schema: &SchemaMap) -> Result<AiGeneration, Unavailable> {
        let backend = self
            .active
            .read()
            .await
            .backend
            .clone()
            .ok_or_else(|| Unavailable::new("no AI provider enabled"))?;

        let result = self.try_generate(backend.as_ref(), question, schema).await;
        if let Err(e) = &result {
            warn!("AI generation via {} failed: {}", backend.name(), e);
        }
        result
    }

    async fn try_generate(
        &self,
        backend: &dyn AiBackend,
        question: &str,
        schema: &SchemaMap,
    ) -> Result<AiGeneration, Unavailable> {
        let system_prompt = self.prompts.system_prompt(schema)?;
        let user_prompt = self.prompts.user_prompt(question);

        info!("Requesting SQL from {}", backend.name());
        let raw = backend.complete(&system_prompt, &user_prompt).await?;
        debug!("Raw response from {}: {}", backend.name(), raw);

        let value = lenient_decode(&raw).map_err(|e| Unavailable::new(e.to_string()))?;
        AiGeneration::from_value(&value)
    }
}
