// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Image generation service
//!
//! Resolves the session's image model, generates through the Invoke
//! adapter, writes the image to the output directory and records the turn
//! in session history. Prompt optimization composes on top: run the raw
//! prompt through a text module's [`GenService`] first when desired.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info};

use crate::config::ModuleConfig;
use crate::error::{PalaverError, Result};
use crate::llm::factory::ProviderFactory;
use crate::llm::message::Role;
use crate::llm::params::{ImageParams, ModelParams};
use crate::service::session::{SessionStore, TurnContent};
use crate::service::ServiceCore;

pub struct DrawService {
    core: ServiceCore,
    module_name: String,
    output_dir: PathBuf,
}

impl DrawService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        config: Arc<ModuleConfig>,
        factory: Arc<ProviderFactory>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            core: ServiceCore::new(store, config, factory),
            module_name: "draw".to_string(),
            output_dir: output_dir.into(),
        }
    }

    pub fn core(&self) -> &ServiceCore {
        &self.core
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Generate one image and return the saved file path.
    ///
    /// Custom parameters construct a fresh provider; the default-parameter
    /// provider is cached per model.
    pub async fn generate_image(
        &self,
        user_id: &str,
        prompt: &str,
        overrides: Option<ImageParams>,
    ) -> Result<PathBuf> {
        if prompt.trim().is_empty() {
            return Err(PalaverError::InvalidInput(
                "image prompt is empty".to_string(),
            ));
        }

        let mut session = self
            .core
            .get_or_create_session(user_id, &self.module_name)
            .await?;
        let model_id = self.core.resolve_model(&mut session).await?;

        let handle = self
            .core
            .provider_for(
                &self.module_name,
                &model_id,
                overrides.map(ModelParams::Image),
            )
            .await?;
        let provider = handle.as_image()?;

        let image = provider.generate_image(prompt, None).await.map_err(|e| {
            error!(code = %e.code, detail = %e.detail, "Image generation failed");
            PalaverError::Provider(e)
        })?;
        let path = image.save_to(&self.output_dir)?;
        info!(path = %path.display(), model = %model_id, "Image saved");

        session.add_interaction(Role::User, TurnContent::text(prompt), None);
        session.add_interaction(
            Role::Assistant,
            TurnContent::default().with_files(vec![path.to_string_lossy().into_owned()]),
            None,
        );
        self.core.store().save_session(&session).await?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::factory::ProviderCredentials;
    use crate::llm::registry::ModelRegistry;
    use crate::service::MemoryStore;
    use crate::tools::ToolRegistry;

    fn service(dir: &Path) -> DrawService {
        let factory = ProviderFactory::new(
            Arc::new(ModelRegistry::with_defaults()),
            Arc::new(ToolRegistry::new()),
            ProviderCredentials::default(),
        );
        DrawService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(ModuleConfig::builtin()),
            Arc::new(factory),
            dir,
        )
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        assert!(service.generate_image("rob", "  ", None).await.is_err());
    }
}
