// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Session model and store boundary
//!
//! A session is per-user-per-module conversation state: history, model
//! override and free-form context. The document store behind it is an
//! external collaborator reached through the [`SessionStore`] trait; the
//! in-memory implementation here backs tests and single-process use.
//! Saves are last-write-wins; the core never deletes sessions.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{PalaverError, Result};
use crate::llm::message::Role;
use crate::llm::provider::ResponseMetadata;

/// Unified user/assistant content: text and/or file paths
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TurnContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

impl TurnContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            files: vec![],
        }
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.as_deref().map_or(true, |t| t.trim().is_empty()) && self.files.is_empty()
    }
}

/// One persisted turn in a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub role: Role,
    pub content: TurnContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
    pub timestamp: DateTime<Utc>,
}

/// Per-user-per-module conversation state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub user_id: String,
    pub module_name: String,
    pub session_name: String,
    /// Model override; module default applies when unset
    pub model_id: Option<String>,
    pub history: Vec<Interaction>,
    /// Free-form module state, including `system_prompt`
    pub context: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        user_id: impl Into<String>,
        module_name: impl Into<String>,
        session_name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            user_id: user_id.into(),
            module_name: module_name.into(),
            session_name: session_name.into(),
            model_id: None,
            history: vec![],
            context: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append one interaction and touch the timestamp
    pub fn add_interaction(
        &mut self,
        role: Role,
        content: TurnContent,
        metadata: Option<ResponseMetadata>,
    ) {
        self.history.push(Interaction {
            role,
            content,
            metadata,
            timestamp: Utc::now(),
        });
        self.updated_at = Utc::now();
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.context.get("system_prompt").and_then(|v| v.as_str())
    }

    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.context.insert(
            "system_prompt".to_string(),
            serde_json::Value::String(prompt.into()),
        );
    }

    /// The trailing `max_messages` history entries, oldest first
    pub fn recent_history(&self, max_messages: usize) -> &[Interaction] {
        let start = self.history.len().saturating_sub(max_messages);
        &self.history[start..]
    }
}

/// Store boundary for session persistence
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(
        &self,
        user_id: &str,
        module_name: &str,
        session_name: &str,
    ) -> Result<Session>;

    async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>>;

    /// Sessions for a user, most recently updated first
    async fn list_sessions(
        &self,
        user_id: &str,
        module_name: Option<&str>,
    ) -> Result<Vec<Session>>;

    /// Persist the full session state (last-write-wins)
    async fn save_session(&self, session: &Session) -> Result<()>;
}

/// In-memory session store
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(
        &self,
        user_id: &str,
        module_name: &str,
        session_name: &str,
    ) -> Result<Session> {
        let session = Session::new(user_id, module_name, session_name);
        self.sessions
            .write()
            .await
            .insert(session.session_id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>> {
        Ok(self.sessions.read().await.get(&session_id).cloned())
    }

    async fn list_sessions(
        &self,
        user_id: &str,
        module_name: Option<&str>,
    ) -> Result<Vec<Session>> {
        let sessions = self.sessions.read().await;
        let mut matching: Vec<Session> = sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .filter(|s| module_name.map_or(true, |m| s.module_name == m))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(matching)
    }

    async fn save_session(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if !sessions.contains_key(&session.session_id) {
            return Err(PalaverError::Session(format!(
                "unknown session: {}",
                session.session_id
            )));
        }
        sessions.insert(session.session_id, session.clone());
        Ok(())
    }
}
