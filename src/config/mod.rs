// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Module configuration registry
//!
//! Read-only per-module settings: default model, inference parameters,
//! system prompt and enabled tools. Builtin defaults cover the shipped
//! modules; a TOML overlay can replace any of them. The core never writes
//! configuration.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::llm::params::InferenceParams;

/// Hard fallback when neither session nor module name a model
const FALLBACK_MODEL: &str = "anthropic.claude-3-5-sonnet-20241022-v2:0";

/// Settings for one module
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleSettings {
    /// Default model id for the module
    pub default_model: Option<String>,
    /// Default inference parameters
    pub inference_params: Option<InferenceParams>,
    /// System prompt for the module
    pub system_prompt: Option<String>,
    /// Tools the module's model may call
    #[serde(default)]
    pub enabled_tools: Vec<String>,
    /// Split `<thinking>` sections out of streamed output
    #[serde(default)]
    pub strip_thinking: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    modules: HashMap<String, ModuleSettings>,
    fallback_model: Option<String>,
}

/// Registry of per-module settings
#[derive(Debug, Clone)]
pub struct ModuleConfig {
    modules: HashMap<String, ModuleSettings>,
    fallback_model: String,
}

impl ModuleConfig {
    /// Builtin defaults for the shipped modules
    pub fn builtin() -> Self {
        let mut modules = HashMap::new();

        modules.insert(
            "chatbot".to_string(),
            ModuleSettings {
                default_model: Some("anthropic.claude-3-5-sonnet-20241022-v2:0".to_string()),
                system_prompt: Some(
                    "You are a friendly, knowledgeable assistant. Answer naturally and \
                     concisely, and use the available tools when they help."
                        .to_string(),
                ),
                enabled_tools: vec![
                    "get_weather".to_string(),
                    "get_text_from_url".to_string(),
                    "search_wikipedia".to_string(),
                    "get_current_time".to_string(),
                ],
                ..Default::default()
            },
        );
        modules.insert(
            "assistant".to_string(),
            ModuleSettings {
                default_model: Some("anthropic.claude-3-5-sonnet-20241022-v2:0".to_string()),
                system_prompt: Some(
                    "You are a capable work assistant. Think step by step inside \
                     <thinking></thinking> tags before giving the final answer."
                        .to_string(),
                ),
                enabled_tools: vec![
                    "get_text_from_url".to_string(),
                    "search_wikipedia".to_string(),
                ],
                strip_thinking: true,
                ..Default::default()
            },
        );
        modules.insert(
            "coding".to_string(),
            ModuleSettings {
                default_model: Some("anthropic.claude-3-5-sonnet-20241022-v2:0".to_string()),
                inference_params: Some(InferenceParams::default().with_temperature(0.2)),
                system_prompt: Some(
                    "You are an expert programmer. Produce correct, idiomatic code with \
                     brief explanations."
                        .to_string(),
                ),
                ..Default::default()
            },
        );
        modules.insert(
            "text".to_string(),
            ModuleSettings {
                default_model: Some("anthropic.claude-3-5-haiku-20241022-v1:0".to_string()),
                system_prompt: Some(
                    "You rewrite, translate and polish text. Return only the transformed \
                     text without commentary."
                        .to_string(),
                ),
                ..Default::default()
            },
        );
        modules.insert(
            "summary".to_string(),
            ModuleSettings {
                default_model: Some("anthropic.claude-3-5-haiku-20241022-v1:0".to_string()),
                inference_params: Some(InferenceParams::default().with_temperature(0.3)),
                system_prompt: Some(
                    "Summarize the provided content faithfully. Keep the key facts, drop \
                     the filler."
                        .to_string(),
                ),
                enabled_tools: vec!["get_text_from_url".to_string()],
                ..Default::default()
            },
        );
        modules.insert(
            "vision".to_string(),
            ModuleSettings {
                default_model: Some("amazon.nova-pro-v1:0".to_string()),
                system_prompt: Some(
                    "Describe and analyze the supplied images and documents.".to_string(),
                ),
                ..Default::default()
            },
        );
        modules.insert(
            "oneshot".to_string(),
            ModuleSettings {
                default_model: Some("gemini-2.0-flash".to_string()),
                ..Default::default()
            },
        );
        modules.insert(
            "draw".to_string(),
            ModuleSettings {
                default_model: Some("stability.sd3-5-large-v1:0".to_string()),
                ..Default::default()
            },
        );

        Self {
            modules,
            fallback_model: FALLBACK_MODEL.to_string(),
        }
    }

    /// Overlay settings from a TOML document onto the builtin defaults
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(toml_str)?;
        let mut config = Self::builtin();
        for (name, settings) in file.modules {
            config.modules.insert(name, settings);
        }
        if let Some(fallback) = file.fallback_model {
            config.fallback_model = fallback;
        }
        Ok(config)
    }

    /// Load an overlay file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        info!(path = %path.display(), "Loaded module configuration");
        Self::from_toml_str(&contents)
    }

    pub fn get_default_model(&self, module_name: &str) -> Option<&str> {
        self.modules
            .get(module_name)
            .and_then(|m| m.default_model.as_deref())
    }

    pub fn get_inference_params(&self, module_name: &str) -> InferenceParams {
        self.modules
            .get(module_name)
            .and_then(|m| m.inference_params.clone())
            .unwrap_or_default()
    }

    pub fn get_system_prompt(&self, module_name: &str) -> Option<&str> {
        self.modules
            .get(module_name)
            .and_then(|m| m.system_prompt.as_deref())
    }

    pub fn get_enabled_tools(&self, module_name: &str) -> Vec<String> {
        self.modules
            .get(module_name)
            .map(|m| m.enabled_tools.clone())
            .unwrap_or_default()
    }

    pub fn strip_thinking(&self, module_name: &str) -> bool {
        self.modules
            .get(module_name)
            .map(|m| m.strip_thinking)
            .unwrap_or(false)
    }

    /// Model used when neither the session nor the module name one
    pub fn fallback_model(&self) -> &str {
        &self.fallback_model
    }
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self::builtin()
    }
}
