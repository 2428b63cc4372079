// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Provider factory and cache
//!
//! Dispatches a model id to the right adapter class through the closed
//! vendor enum and wires credentials. The cache holds default-parameter
//! providers per model id; custom-parameter requests always construct a
//! fresh, uncached provider so a cached instance never serves a different
//! configuration than requested.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use aws_config::BehaviorVersion;
use aws_sdk_bedrockruntime::config::Region;
use aws_sdk_bedrockruntime::Client as BedrockClient;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{PalaverError, ProviderError, Result};
use crate::llm::orchestrator::Provider;
use crate::llm::params::{ImageParams, InferenceParams, ModelParams};
use crate::llm::providers::{
    BedrockConverseAdapter, BedrockInvokeAdapter, GeminiAdapter, GeneratedImage, OpenAiAdapter,
};
use crate::llm::registry::{ModelCategory, ModelRegistry, Vendor};
use crate::tools::ToolRegistry;

/// Credentials and endpoints resolved from the environment
#[derive(Debug, Clone, Default)]
pub struct ProviderCredentials {
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: Option<String>,
    pub aws_region: Option<String>,
}

impl ProviderCredentials {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            openai_base_url: std::env::var("OPENAI_BASE_URL").ok(),
            gemini_api_key: std::env::var("GEMINI_API_KEY").ok(),
            gemini_base_url: std::env::var("GEMINI_BASE_URL").ok(),
            aws_region: std::env::var("AWS_REGION").ok(),
        }
    }
}

/// Image-model provider: Invoke adapter plus default image parameters
pub struct ImageProvider {
    adapter: BedrockInvokeAdapter,
    params: ImageParams,
}

impl ImageProvider {
    pub fn new(adapter: BedrockInvokeAdapter, params: ImageParams) -> Self {
        Self { adapter, params }
    }

    pub fn model_id(&self) -> &str {
        self.adapter.model_id()
    }

    pub async fn generate_image(
        &self,
        prompt: &str,
        overrides: Option<&ImageParams>,
    ) -> std::result::Result<GeneratedImage, ProviderError> {
        let params = overrides.unwrap_or(&self.params);
        self.adapter.generate_image(prompt, params).await
    }
}

/// Either a text provider (orchestrated) or an image provider
#[derive(Clone)]
pub enum ProviderHandle {
    Text(Arc<Provider>),
    Image(Arc<ImageProvider>),
}

impl ProviderHandle {
    pub fn as_text(&self) -> Result<&Arc<Provider>> {
        match self {
            ProviderHandle::Text(provider) => Ok(provider),
            ProviderHandle::Image(provider) => Err(PalaverError::Config(format!(
                "model {} generates images, not text",
                provider.model_id()
            ))),
        }
    }

    pub fn as_image(&self) -> Result<&Arc<ImageProvider>> {
        match self {
            ProviderHandle::Image(provider) => Ok(provider),
            ProviderHandle::Text(provider) => Err(PalaverError::Config(format!(
                "model {} generates text, not images",
                provider.model_id()
            ))),
        }
    }
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderHandle::Text(provider) => f
                .debug_tuple("Text")
                .field(&provider.model_id())
                .finish(),
            ProviderHandle::Image(provider) => f
                .debug_tuple("Image")
                .field(&provider.model_id())
                .finish(),
        }
    }
}

/// Creates providers for models known to the registry
pub struct ProviderFactory {
    models: Arc<ModelRegistry>,
    tools: Arc<ToolRegistry>,
    credentials: ProviderCredentials,
    bedrock: OnceCell<BedrockClient>,
}

impl ProviderFactory {
    pub fn new(
        models: Arc<ModelRegistry>,
        tools: Arc<ToolRegistry>,
        credentials: ProviderCredentials,
    ) -> Self {
        Self {
            models,
            tools,
            credentials,
            bedrock: OnceCell::new(),
        }
    }

    pub fn models(&self) -> &Arc<ModelRegistry> {
        &self.models
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Shared Bedrock SDK client, initialized once per factory
    async fn bedrock_client(&self) -> &BedrockClient {
        self.bedrock
            .get_or_init(|| async {
                let mut loader = aws_config::defaults(BehaviorVersion::latest());
                if let Some(region) = self.credentials.aws_region.clone() {
                    loader = loader.region(Region::new(region));
                }
                let config = loader.load().await;
                info!("Initialized Bedrock client");
                BedrockClient::new(&config)
            })
            .await
    }

    /// Create a provider for `model_id`.
    ///
    /// Unknown models and vendor/category mismatches fail here, at
    /// construction, not on first call.
    pub async fn create_provider(
        &self,
        model_id: &str,
        params: Option<ModelParams>,
        enabled_tools: &[String],
    ) -> Result<ProviderHandle> {
        let entry = self
            .models
            .get_model_by_id(model_id)
            .ok_or_else(|| PalaverError::Config(format!("Model not found: {}", model_id)))?;

        if let Some(ref params) = params {
            params.validate()?;
        }

        match entry.category {
            ModelCategory::Text => {
                let inference_params = match params {
                    Some(ModelParams::Text(p)) => p,
                    Some(ModelParams::Image(_)) => {
                        return Err(PalaverError::Config(format!(
                            "image parameters supplied for text model {}",
                            model_id
                        )));
                    }
                    None => InferenceParams::default(),
                };

                let adapter: Arc<dyn crate::llm::provider::ProviderAdapter> = match entry.vendor {
                    Vendor::Bedrock => {
                        let client = self.bedrock_client().await.clone();
                        Arc::new(BedrockConverseAdapter::new(client, model_id)?)
                    }
                    Vendor::Gemini => {
                        let api_key = self.credentials.gemini_api_key.clone().ok_or_else(|| {
                            PalaverError::Config(
                                "No Gemini API key found. Set GEMINI_API_KEY.".to_string(),
                            )
                        })?;
                        let mut adapter = GeminiAdapter::new(api_key, model_id)?;
                        if let Some(ref base_url) = self.credentials.gemini_base_url {
                            adapter = adapter.with_base_url(base_url);
                        }
                        Arc::new(adapter)
                    }
                    Vendor::OpenAi => {
                        let api_key = self.credentials.openai_api_key.clone().ok_or_else(|| {
                            PalaverError::Config(
                                "No OpenAI API key found. Set OPENAI_API_KEY.".to_string(),
                            )
                        })?;
                        let mut adapter = OpenAiAdapter::new(api_key, model_id)?;
                        if let Some(ref base_url) = self.credentials.openai_base_url {
                            adapter = adapter.with_base_url(base_url);
                        }
                        Arc::new(adapter)
                    }
                };

                debug!(model = model_id, vendor = %entry.vendor, "Created text provider");
                Ok(ProviderHandle::Text(Arc::new(Provider::new(
                    adapter,
                    Arc::clone(&self.tools),
                    enabled_tools,
                    inference_params,
                ))))
            }
            ModelCategory::Image => {
                if entry.vendor != Vendor::Bedrock {
                    return Err(PalaverError::Config(format!(
                        "image generation is only wired for Bedrock models, got {} for {}",
                        entry.vendor, model_id
                    )));
                }
                let image_params = match params {
                    Some(ModelParams::Image(p)) => p,
                    Some(ModelParams::Text(_)) => {
                        return Err(PalaverError::Config(format!(
                            "text parameters supplied for image model {}",
                            model_id
                        )));
                    }
                    None => ImageParams::default(),
                };
                let client = self.bedrock_client().await.clone();
                let adapter = BedrockInvokeAdapter::new(client, model_id)?;
                debug!(model = model_id, "Created image provider");
                Ok(ProviderHandle::Image(Arc::new(ImageProvider::new(
                    adapter,
                    image_params,
                ))))
            }
        }
    }
}

/// Cache of default-parameter providers, keyed by model id.
///
/// Owned by the service layer and shared across requests; `invalidate`
/// clears it when configuration changes.
#[derive(Default)]
pub struct ProviderCache {
    inner: Mutex<HashMap<String, ProviderHandle>>,
}

impl ProviderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, model_id: &str) -> Option<ProviderHandle> {
        self.inner.lock().expect("provider cache lock").get(model_id).cloned()
    }

    pub fn insert(&self, model_id: impl Into<String>, handle: ProviderHandle) {
        self.inner
            .lock()
            .expect("provider cache lock")
            .insert(model_id.into(), handle);
    }

    pub fn invalidate(&self) {
        self.inner.lock().expect("provider cache lock").clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("provider cache lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::MockAdapter;

    fn mock_handle(model_id: &str) -> ProviderHandle {
        ProviderHandle::Text(Arc::new(Provider::new(
            Arc::new(MockAdapter::new().with_model_id(model_id)),
            Arc::new(ToolRegistry::new()),
            &[],
            InferenceParams::default(),
        )))
    }

    #[test]
    fn test_cache_roundtrip() {
        let cache = ProviderCache::new();
        assert!(cache.get("m1").is_none());
        cache.insert("m1", mock_handle("m1"));
        assert!(cache.get("m1").is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_returns_same_instance() {
        let cache = ProviderCache::new();
        cache.insert("m1", mock_handle("m1"));

        let first = cache.get("m1").unwrap();
        let second = cache.get("m1").unwrap();
        let (ProviderHandle::Text(a), ProviderHandle::Text(b)) = (&first, &second) else {
            panic!("Expected text handles");
        };
        // Same Arc, not merely equal configuration
        assert!(Arc::ptr_eq(a, b));
    }

    #[test]
    fn test_cache_invalidate() {
        let cache = ProviderCache::new();
        cache.insert("m1", mock_handle("m1"));
        cache.insert("m2", mock_handle("m2"));
        cache.invalidate();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_handle_as_text() {
        let handle = mock_handle("m1");
        assert!(handle.as_text().is_ok());
        assert!(handle.as_image().is_err());
    }

    #[tokio::test]
    async fn test_factory_unknown_model_rejected() {
        let factory = ProviderFactory::new(
            Arc::new(ModelRegistry::with_defaults()),
            Arc::new(ToolRegistry::new()),
            ProviderCredentials::default(),
        );
        let err = factory
            .create_provider("no-such-model", None, &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Model not found"));
    }

    #[tokio::test]
    async fn test_factory_missing_openai_key_rejected() {
        let factory = ProviderFactory::new(
            Arc::new(ModelRegistry::with_defaults()),
            Arc::new(ToolRegistry::new()),
            ProviderCredentials::default(),
        );
        let err = factory.create_provider("gpt-4o", None, &[]).await.unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[tokio::test]
    async fn test_factory_param_variant_mismatch_rejected() {
        let factory = ProviderFactory::new(
            Arc::new(ModelRegistry::with_defaults()),
            Arc::new(ToolRegistry::new()),
            ProviderCredentials {
                openai_api_key: Some("key".to_string()),
                ..Default::default()
            },
        );
        let err = factory
            .create_provider(
                "gpt-4o",
                Some(ModelParams::Image(ImageParams::default())),
                &[],
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("image parameters"));
    }

    #[tokio::test]
    async fn test_factory_creates_openai_provider() {
        let factory = ProviderFactory::new(
            Arc::new(ModelRegistry::with_defaults()),
            Arc::new(ToolRegistry::with_builtins()),
            ProviderCredentials {
                openai_api_key: Some("key".to_string()),
                ..Default::default()
            },
        );
        let handle = factory
            .create_provider("gpt-4o", None, &["get_weather".to_string()])
            .await
            .unwrap();
        let provider = handle.as_text().unwrap();
        assert_eq!(provider.model_id(), "gpt-4o");
    }
}
