// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Model registry
//!
//! Catalog of known models with their vendor, category and capabilities.
//! The factory uses the vendor to pick an adapter class; services use the
//! capabilities to filter attachments against supported input modalities.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PalaverError, Result};

/// Supported API vendors. Closed set: unknown vendor strings are rejected at
/// construction time, not at first use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Vendor {
    Bedrock,
    Gemini,
    OpenAi,
}

impl FromStr for Vendor {
    type Err = PalaverError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "BEDROCK" => Ok(Vendor::Bedrock),
            "GEMINI" => Ok(Vendor::Gemini),
            "OPENAI" => Ok(Vendor::OpenAi),
            other => Err(PalaverError::Config(format!(
                "Unsupported API vendor: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Vendor::Bedrock => write!(f, "BEDROCK"),
            Vendor::Gemini => write!(f, "GEMINI"),
            Vendor::OpenAi => write!(f, "OPENAI"),
        }
    }
}

/// Broad model category; decides which Bedrock adapter applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelCategory {
    Text,
    Image,
}

/// Input/output modality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
    Video,
    Document,
}

/// What a model can consume and produce
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCapabilities {
    pub input_modality: Vec<Modality>,
    pub output_modality: Vec<Modality>,
    pub streaming: bool,
    pub tool_use: bool,
}

impl ModelCapabilities {
    /// Text in, text out, streaming + tools
    pub fn text_only() -> Self {
        Self {
            input_modality: vec![Modality::Text],
            output_modality: vec![Modality::Text],
            streaming: true,
            tool_use: true,
        }
    }

    /// Text and attachments in, text out
    pub fn multimodal() -> Self {
        Self {
            input_modality: vec![Modality::Text, Modality::Image, Modality::Document],
            output_modality: vec![Modality::Text],
            streaming: true,
            tool_use: true,
        }
    }

    /// Text prompt in, image out
    pub fn image_generation() -> Self {
        Self {
            input_modality: vec![Modality::Text],
            output_modality: vec![Modality::Image],
            streaming: false,
            tool_use: false,
        }
    }

    /// True when the model accepts anything beyond plain text
    pub fn accepts_attachments(&self) -> bool {
        self.input_modality.iter().any(|m| *m != Modality::Text)
    }
}

/// One entry in the model catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Model identifier as the vendor knows it
    pub model_id: String,
    /// Human-readable name
    pub name: String,
    /// Which API serves this model
    pub vendor: Vendor,
    /// Broad category
    pub category: ModelCategory,
    /// Supported modalities and features
    pub capabilities: ModelCapabilities,
}

/// Registry of known models, keyed by model id
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: HashMap<String, ModelEntry>,
}

impl ModelRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            models: HashMap::new(),
        }
    }

    /// Registry pre-populated with the default catalog
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for entry in Self::default_catalog() {
            registry.register(entry);
        }
        registry
    }

    /// Add or replace a model entry
    pub fn register(&mut self, entry: ModelEntry) {
        self.models.insert(entry.model_id.clone(), entry);
    }

    /// Look up a model by id
    pub fn get_model_by_id(&self, model_id: &str) -> Option<&ModelEntry> {
        self.models.get(model_id)
    }

    /// All models of a category
    pub fn models_by_category(&self, category: ModelCategory) -> Vec<&ModelEntry> {
        let mut entries: Vec<&ModelEntry> = self
            .models
            .values()
            .filter(|m| m.category == category)
            .collect();
        entries.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        entries
    }

    fn default_catalog() -> Vec<ModelEntry> {
        vec![
            ModelEntry {
                model_id: "anthropic.claude-3-5-sonnet-20241022-v2:0".to_string(),
                name: "Claude 3.5 Sonnet".to_string(),
                vendor: Vendor::Bedrock,
                category: ModelCategory::Text,
                capabilities: ModelCapabilities::multimodal(),
            },
            ModelEntry {
                model_id: "anthropic.claude-3-5-haiku-20241022-v1:0".to_string(),
                name: "Claude 3.5 Haiku".to_string(),
                vendor: Vendor::Bedrock,
                category: ModelCategory::Text,
                capabilities: ModelCapabilities::text_only(),
            },
            ModelEntry {
                model_id: "amazon.nova-pro-v1:0".to_string(),
                name: "Amazon Nova Pro".to_string(),
                vendor: Vendor::Bedrock,
                category: ModelCategory::Text,
                capabilities: ModelCapabilities::multimodal(),
            },
            ModelEntry {
                model_id: "stability.sd3-5-large-v1:0".to_string(),
                name: "Stable Diffusion 3.5 Large".to_string(),
                vendor: Vendor::Bedrock,
                category: ModelCategory::Image,
                capabilities: ModelCapabilities::image_generation(),
            },
            ModelEntry {
                model_id: "stability.stable-image-ultra-v1:0".to_string(),
                name: "Stable Image Ultra".to_string(),
                vendor: Vendor::Bedrock,
                category: ModelCategory::Image,
                capabilities: ModelCapabilities::image_generation(),
            },
            ModelEntry {
                model_id: "gemini-2.0-flash".to_string(),
                name: "Gemini 2.0 Flash".to_string(),
                vendor: Vendor::Gemini,
                category: ModelCategory::Text,
                capabilities: ModelCapabilities::multimodal(),
            },
            ModelEntry {
                model_id: "gemini-1.5-pro".to_string(),
                name: "Gemini 1.5 Pro".to_string(),
                vendor: Vendor::Gemini,
                category: ModelCategory::Text,
                capabilities: ModelCapabilities::multimodal(),
            },
            ModelEntry {
                model_id: "gpt-4o".to_string(),
                name: "GPT-4o".to_string(),
                vendor: Vendor::OpenAi,
                category: ModelCategory::Text,
                capabilities: ModelCapabilities::multimodal(),
            },
            ModelEntry {
                model_id: "gpt-4o-mini".to_string(),
                name: "GPT-4o Mini".to_string(),
                vendor: Vendor::OpenAi,
                category: ModelCategory::Text,
                capabilities: ModelCapabilities::text_only(),
            },
        ]
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
