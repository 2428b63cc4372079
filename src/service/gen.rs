// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! General content generation service
//!
//! Single-prompt generation with or without session context. Unlike chat,
//! requests carry only the new message; history stays in the session store
//! but is not replayed to the model.

use std::sync::Arc;

use futures::Stream;
use tracing::error;

use crate::config::ModuleConfig;
use crate::error::{PalaverError, Result};
use crate::llm::factory::ProviderFactory;
use crate::llm::message::Role;
use crate::llm::params::InferenceParams;
use crate::service::session::{SessionStore, TurnContent};
use crate::service::{stream_turn, ChatChunk, ServiceCore};

pub struct GenService {
    core: ServiceCore,
    module_name: String,
}

impl GenService {
    pub fn new(
        module_name: impl Into<String>,
        store: Arc<dyn SessionStore>,
        config: Arc<ModuleConfig>,
        factory: Arc<ProviderFactory>,
    ) -> Self {
        Self {
            core: ServiceCore::new(store, config, factory),
            module_name: module_name.into(),
        }
    }

    pub fn from_core(core: ServiceCore, module_name: impl Into<String>) -> Self {
        Self {
            core,
            module_name: module_name.into(),
        }
    }

    pub fn core(&self) -> &ServiceCore {
        &self.core
    }

    /// Generate text without any session context
    pub async fn gen_text_stateless(
        &self,
        content: TurnContent,
        system_prompt: Option<&str>,
        overrides: Option<&InferenceParams>,
    ) -> Result<String> {
        let model_id = self
            .core
            .config()
            .get_default_model(&self.module_name)
            .ok_or_else(|| {
                PalaverError::Config(format!(
                    "No default model configured for {}",
                    self.module_name
                ))
            })?
            .to_string();
        let entry = self.core.model_entry(&model_id);

        let message = self.core.prepare_message(content, entry.as_ref())?;
        let handle = self
            .core
            .provider_for(&self.module_name, &model_id, None)
            .await?;
        let provider = handle.as_text()?;

        match provider
            .generate(vec![message], system_prompt, overrides)
            .await
        {
            Ok(reply) => Ok(reply.text),
            Err(e) => {
                error!(code = %e.code, detail = %e.detail, "Stateless generation failed");
                Ok(format!("I apologize, {}", e.message))
            }
        }
    }

    /// Generate text within the user's session and persist the turn
    pub async fn gen_text(
        &self,
        user_id: &str,
        content: TurnContent,
        overrides: Option<&InferenceParams>,
    ) -> Result<String> {
        let mut session = self
            .core
            .get_or_create_session(user_id, &self.module_name)
            .await?;
        let model_id = self.core.resolve_model(&mut session).await?;
        let entry = self.core.model_entry(&model_id);

        let message = self.core.prepare_message(content.clone(), entry.as_ref())?;
        let handle = self
            .core
            .provider_for(&self.module_name, &model_id, None)
            .await?;
        let provider = handle.as_text()?;

        let system_prompt = session.system_prompt().map(|s| s.to_string());
        let reply = match provider
            .generate(vec![message], system_prompt.as_deref(), overrides)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                // The failed turn is not persisted
                error!(code = %e.code, detail = %e.detail, "Generation failed");
                return Ok(format!("I apologize, {}", e.message));
            }
        };

        session.add_interaction(Role::User, content, None);
        session.add_interaction(
            Role::Assistant,
            TurnContent {
                text: Some(reply.text.clone()).filter(|t| !t.trim().is_empty()),
                files: reply.files.clone(),
            },
            Some(reply.metadata),
        );
        self.core.store().save_session(&session).await?;

        Ok(reply.text)
    }

    /// Stream generated text within the user's session
    pub fn gen_text_stream(
        &self,
        user_id: impl Into<String>,
        content: TurnContent,
        overrides: Option<InferenceParams>,
    ) -> impl Stream<Item = ChatChunk> + Send + 'static {
        stream_turn(
            self.core.clone(),
            self.module_name.clone(),
            user_id.into(),
            content,
            overrides,
            false,
        )
    }
}
