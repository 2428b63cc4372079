// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Session-aware service layer
//!
//! Resolves per-user/module sessions and model ids, obtains cached or
//! fresh providers, windows history into vendor requests, accumulates
//! streamed output and persists completed turns. Provider errors never
//! surface as stack traces: the caller gets one apology line and the
//! failed turn is not persisted.

pub mod chat;
pub mod draw;
pub mod gen;
pub mod scanner;
pub mod session;

pub use chat::ChatService;
pub use draw::DrawService;
pub use gen::GenService;
pub use scanner::{ScanEvent, ThinkingScanner};
pub use session::{Interaction, MemoryStore, Session, SessionStore, TurnContent};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_stream::stream;
use futures::{Stream, StreamExt};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::ModuleConfig;
use crate::error::{PalaverError, Result};
use crate::llm::factory::{ProviderCache, ProviderFactory, ProviderHandle};
use crate::llm::message::{ContentBlock, Message, Role};
use crate::llm::params::{ImageParams, InferenceParams, ModelParams};
use crate::llm::provider::{ContentChunk, ResponseMetadata, StreamEvent};
use crate::llm::registry::{ModelCategory, ModelEntry};

/// Most recent raw history messages included in a vendor request
pub const HISTORY_WINDOW: usize = 24;

/// How long a resolved session id stays cached per user/module
const SESSION_CACHE_TTL: Duration = Duration::from_secs(600);

/// One chunk of service output, suitable for incremental rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatChunk {
    /// Answer text delta
    Text(String),
    /// Model reasoning split out by the thinking scanner
    Thinking(String),
    /// File produced during the turn (e.g. a generated image)
    File(String),
}

/// Shared plumbing for the session-aware services.
///
/// Cloning shares all state; each service owns one core, mirroring its own
/// provider cache and session cache.
#[derive(Clone)]
pub struct ServiceCore {
    store: Arc<dyn SessionStore>,
    config: Arc<ModuleConfig>,
    factory: Arc<ProviderFactory>,
    providers: Arc<ProviderCache>,
    session_ids: Arc<Mutex<HashMap<String, (Uuid, Instant)>>>,
}

impl ServiceCore {
    pub fn new(
        store: Arc<dyn SessionStore>,
        config: Arc<ModuleConfig>,
        factory: Arc<ProviderFactory>,
    ) -> Self {
        Self {
            store,
            config,
            factory,
            providers: Arc::new(ProviderCache::new()),
            session_ids: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn config(&self) -> &Arc<ModuleConfig> {
        &self.config
    }

    pub fn providers(&self) -> &Arc<ProviderCache> {
        &self.providers
    }

    pub fn model_entry(&self, model_id: &str) -> Option<ModelEntry> {
        self.factory.models().get_model_by_id(model_id).cloned()
    }

    /// Drop cached providers after a configuration change
    pub fn invalidate_providers(&self) {
        self.providers.invalidate();
    }

    /// Latest session for the user/module pair, creating one on first access
    pub async fn get_or_create_session(
        &self,
        user_id: &str,
        module_name: &str,
    ) -> Result<Session> {
        let cache_key = format!("{}:{}", user_id, module_name);

        let cached_id = {
            let mut cache = self.session_ids.lock().expect("session cache lock");
            match cache.get(&cache_key) {
                Some((id, expiry)) if *expiry > Instant::now() => Some(*id),
                Some(_) => {
                    cache.remove(&cache_key);
                    None
                }
                None => None,
            }
        };
        if let Some(id) = cached_id {
            if let Some(session) = self.store.get_session(id).await? {
                return Ok(session);
            }
        }

        let session = match self
            .store
            .list_sessions(user_id, Some(module_name))
            .await?
            .into_iter()
            .next()
        {
            Some(session) => session,
            None => {
                let name = format!("{} session for {}", capitalize(module_name), user_id);
                let mut session = self
                    .store
                    .create_session(user_id, module_name, &name)
                    .await?;
                if let Some(prompt) = self.config.get_system_prompt(module_name) {
                    session.set_system_prompt(prompt);
                    self.store.save_session(&session).await?;
                }
                debug!(user = user_id, module = module_name, "Created session");
                session
            }
        };

        self.session_ids.lock().expect("session cache lock").insert(
            cache_key,
            (session.session_id, Instant::now() + SESSION_CACHE_TTL),
        );
        Ok(session)
    }

    /// Model id for a session: override, else module default, else fallback.
    /// Resolving a default writes it back onto the session.
    pub async fn resolve_model(&self, session: &mut Session) -> Result<String> {
        if let Some(model_id) = session.model_id.clone() {
            return Ok(model_id);
        }
        if let Some(default) = self.config.get_default_model(&session.module_name) {
            session.model_id = Some(default.to_string());
            self.store.save_session(session).await?;
            debug!(model = default, "Resolved session to module default model");
            return Ok(default.to_string());
        }
        let fallback = self.config.fallback_model().to_string();
        warn!(
            module = %session.module_name,
            fallback = %fallback,
            "No model configured for module, using fallback"
        );
        Ok(fallback)
    }

    /// Record a model override on the session
    pub async fn update_session_model(
        &self,
        session: &mut Session,
        model_id: &str,
    ) -> Result<()> {
        if session.model_id.as_deref() != Some(model_id) {
            session.model_id = Some(model_id.to_string());
            self.store.save_session(session).await?;
        }
        Ok(())
    }

    /// Cached-or-new provider for a model.
    ///
    /// Default-parameter providers are cached per model id; a custom
    /// parameter set always constructs a fresh, uncached provider.
    pub async fn provider_for(
        &self,
        module_name: &str,
        model_id: &str,
        custom_params: Option<ModelParams>,
    ) -> Result<ProviderHandle> {
        let enabled_tools = self.config.get_enabled_tools(module_name);

        if let Some(params) = custom_params {
            return self
                .factory
                .create_provider(model_id, Some(params), &enabled_tools)
                .await;
        }

        if let Some(handle) = self.providers.get(model_id) {
            return Ok(handle);
        }

        let entry = self
            .model_entry(model_id)
            .ok_or_else(|| PalaverError::Config(format!("Model not found: {}", model_id)))?;
        let defaults = match entry.category {
            ModelCategory::Text => {
                ModelParams::Text(self.config.get_inference_params(module_name))
            }
            ModelCategory::Image => ModelParams::Image(ImageParams::default()),
        };
        let handle = self
            .factory
            .create_provider(model_id, Some(defaults), &enabled_tools)
            .await?;
        self.providers.insert(model_id, handle.clone());
        Ok(handle)
    }

    /// Normalize unified content into a message, filtering attachments the
    /// model cannot consume.
    pub fn prepare_message(
        &self,
        content: TurnContent,
        model: Option<&ModelEntry>,
    ) -> Result<Message> {
        if content.is_empty() {
            return Err(PalaverError::InvalidInput(
                "message content is empty".to_string(),
            ));
        }

        let mut text = content.text.unwrap_or_default();
        let mut files = content.files;

        if !files.is_empty() {
            let accepts = model
                .map(|m| m.capabilities.accepts_attachments())
                .unwrap_or(false);
            if !accepts {
                files.clear();
                text = format!(
                    "{}\n[Note: Files were removed as the current model does not support \
                     multimodal content.]",
                    text
                )
                .trim()
                .to_string();
            }
        }

        let mut blocks = Vec::new();
        if !text.trim().is_empty() {
            blocks.push(ContentBlock::Text { text });
        }
        for path in files {
            blocks.push(ContentBlock::File { path });
        }
        Ok(Message::blocks(Role::User, blocks))
    }

    /// Windowed history as neutral messages, oldest first
    pub fn history_messages(&self, session: &Session) -> Vec<Message> {
        let mut messages = Vec::new();
        for interaction in session.recent_history(HISTORY_WINDOW) {
            let mut parts: Vec<String> = Vec::new();
            if let Some(text) = interaction.content.text.as_deref() {
                if !text.trim().is_empty() {
                    parts.push(text.to_string());
                }
            }
            for file in &interaction.content.files {
                parts.push(file_description(file, interaction.role));
            }
            if parts.is_empty() {
                continue;
            }
            let text = parts.join("\n");
            messages.push(match interaction.role {
                Role::User => Message::user(text),
                Role::Assistant => Message::assistant(text),
            });
        }
        messages
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Stand-in text for a file attachment when replaying history
fn file_description(path: &str, role: Role) -> String {
    let lowered = path.to_ascii_lowercase();
    let kind = if [".png", ".jpg", ".jpeg", ".gif", ".webp"]
        .iter()
        .any(|ext| lowered.ends_with(ext))
    {
        "an image"
    } else if [".mp4", ".mov", ".webm"].iter().any(|ext| lowered.ends_with(ext)) {
        "a video"
    } else {
        "a document"
    };
    match role {
        Role::User => format!("[User shared {}]", kind),
        Role::Assistant => format!("[Generated {} in response]", kind),
    }
}

/// One streamed conversation turn, shared by the chat and gen services.
///
/// Forwards deltas as they arrive, buffers the full answer, and persists
/// the user+assistant interaction pair exactly once when the turn
/// completes. A provider error yields a single apology line and persists
/// nothing.
pub(crate) fn stream_turn(
    core: ServiceCore,
    module_name: String,
    user_id: String,
    content: TurnContent,
    overrides: Option<InferenceParams>,
    include_history: bool,
) -> impl Stream<Item = ChatChunk> + Send + 'static {
    stream! {
        let mut session = match core.get_or_create_session(&user_id, &module_name).await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "Failed to resolve session");
                yield ChatChunk::Text(APOLOGY_GENERIC.to_string());
                return;
            }
        };

        let model_id = match core.resolve_model(&mut session).await {
            Ok(model_id) => model_id,
            Err(e) => {
                error!(error = %e, "Failed to resolve model");
                yield ChatChunk::Text(APOLOGY_GENERIC.to_string());
                return;
            }
        };
        let entry = core.model_entry(&model_id);

        let message = match core.prepare_message(content.clone(), entry.as_ref()) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Rejected input");
                yield ChatChunk::Text(APOLOGY_GENERIC.to_string());
                return;
            }
        };

        let provider = match core.provider_for(&module_name, &model_id, None).await {
            Ok(handle) => match handle.as_text() {
                Ok(provider) => Arc::clone(provider),
                Err(e) => {
                    error!(error = %e, "Model cannot stream text");
                    yield ChatChunk::Text(APOLOGY_GENERIC.to_string());
                    return;
                }
            },
            Err(e) => {
                error!(error = %e, "Failed to create provider");
                yield ChatChunk::Text(APOLOGY_GENERIC.to_string());
                return;
            }
        };

        let mut messages = if include_history {
            core.history_messages(&session)
        } else {
            Vec::new()
        };
        messages.push(message);

        let system_prompt = session
            .system_prompt()
            .map(|s| s.to_string())
            .or_else(|| core.config().get_system_prompt(&module_name).map(|s| s.to_string()));

        let mut scanner = core
            .config()
            .strip_thinking(&module_name)
            .then(ThinkingScanner::new);

        let mut answer = String::new();
        let mut files: Vec<String> = Vec::new();
        let mut metadata = ResponseMetadata::default();

        let mut events = provider.generate_stream(messages, system_prompt, overrides);
        while let Some(event) = events.next().await {
            match event {
                Ok(StreamEvent::Content(ContentChunk::Text(text))) => {
                    match scanner.as_mut() {
                        Some(scanner) => {
                            for scanned in scanner.push(&text) {
                                match scanned {
                                    ScanEvent::Thinking(t) => yield ChatChunk::Thinking(t),
                                    ScanEvent::Answer(t) => {
                                        answer.push_str(&t);
                                        yield ChatChunk::Text(t);
                                    }
                                }
                            }
                        }
                        None => {
                            answer.push_str(&text);
                            yield ChatChunk::Text(text);
                        }
                    }
                }
                Ok(StreamEvent::Content(ContentChunk::File(path))) => {
                    files.push(path.clone());
                    yield ChatChunk::File(path);
                }
                Ok(StreamEvent::Content(ContentChunk::ToolUse(_))) => {}
                Ok(StreamEvent::Metadata(round_metadata)) => {
                    metadata.merge(&round_metadata);
                }
                Err(e) => {
                    error!(code = %e.code, detail = %e.detail, "Provider error mid-stream");
                    yield ChatChunk::Text(format!("I apologize, {}", e.message));
                    // The turn is incomplete: persist nothing
                    return;
                }
            }
        }

        if let Some(scanner) = scanner.take() {
            for scanned in scanner.finish() {
                match scanned {
                    ScanEvent::Thinking(t) => yield ChatChunk::Thinking(t),
                    ScanEvent::Answer(t) => {
                        answer.push_str(&t);
                        yield ChatChunk::Text(t);
                    }
                }
            }
        }

        if answer.trim().is_empty() && files.is_empty() {
            return;
        }

        session.add_interaction(Role::User, content, None);
        session.add_interaction(
            Role::Assistant,
            TurnContent {
                text: Some(answer).filter(|t| !t.trim().is_empty()),
                files,
            },
            Some(metadata),
        );
        if let Err(e) = core.store().save_session(&session).await {
            error!(error = %e, "Failed to persist session");
        }
    }
}

pub(crate) const APOLOGY_GENERIC: &str =
    "I apologize, but I encountered an error. Please try again.";
