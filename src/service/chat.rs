// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat service
//!
//! Multi-turn conversation with windowed history, streaming replies and
//! per-module tool enablement.

use std::sync::Arc;

use futures::Stream;

use crate::config::ModuleConfig;
use crate::llm::factory::ProviderFactory;
use crate::llm::params::InferenceParams;
use crate::service::session::{Session, SessionStore, TurnContent};
use crate::service::{stream_turn, ChatChunk, ServiceCore};

pub struct ChatService {
    core: ServiceCore,
    module_name: String,
}

impl ChatService {
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

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// The user's current session for this module
    pub async fn session(&self, user_id: &str) -> crate::error::Result<Session> {
        self.core.get_or_create_session(user_id, &self.module_name).await
    }

    /// Switch the session to another model
    pub async fn switch_model(
        &self,
        user_id: &str,
        model_id: &str,
    ) -> crate::error::Result<()> {
        let mut session = self.session(user_id).await?;
        self.core.update_session_model(&mut session, model_id).await
    }

    /// Stream the assistant's reply to one user message.
    ///
    /// Deltas are forwarded as soon as they arrive; the full answer is
    /// buffered and written to history (never raw deltas) once the turn
    /// completes, then the session is saved exactly once.
    pub fn streaming_reply(
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
            true,
        )
    }
}
