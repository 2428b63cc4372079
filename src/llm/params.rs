// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Vendor-neutral inference parameters
//!
//! Text and image generation carry disjoint parameter sets; a provider call
//! site picks exactly one variant.

use serde::{Deserialize, Serialize};

use crate::error::{PalaverError, Result};

/// Generation controls for text models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceParams {
    /// Maximum tokens in the response
    pub max_tokens: u32,
    /// Sampling temperature, 0.0..=1.0
    pub temperature: f32,
    /// Nucleus sampling cutoff, 0.0..=1.0
    pub top_p: f32,
    /// Top-k sampling cutoff (vendor-optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Stop sequences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.9,
            top_p: 0.99,
            top_k: None,
            stop_sequences: None,
        }
    }
}

impl InferenceParams {
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_stop_sequences(mut self, stop_sequences: Vec<String>) -> Self {
        self.stop_sequences = Some(stop_sequences);
        self
    }

    /// Check ranges; rejected values indicate a caller/config bug.
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(PalaverError::InvalidInput(
                "max_tokens must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(PalaverError::InvalidInput(format!(
                "temperature {} outside [0, 1]",
                self.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(PalaverError::InvalidInput(format!(
                "top_p {} outside [0, 1]",
                self.top_p
            )));
        }
        Ok(())
    }
}

/// Generation controls for image models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageParams {
    pub width: u32,
    pub height: u32,
    /// Prompt adherence strength
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cfg_scale: Option<f32>,
    /// Diffusion steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    /// e.g. "16:9"; some vendors take this instead of explicit dimensions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    /// Things the image must not contain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
}

impl Default for ImageParams {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            cfg_scale: None,
            steps: None,
            aspect_ratio: None,
            negative_prompt: None,
        }
    }
}

impl ImageParams {
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: impl Into<String>) -> Self {
        self.aspect_ratio = Some(aspect_ratio.into());
        self
    }

    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative_prompt.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PalaverError::InvalidInput(
                "image dimensions must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// The parameter variant a provider is constructed with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelParams {
    Text(InferenceParams),
    Image(ImageParams),
}

impl ModelParams {
    pub fn text(&self) -> Option<&InferenceParams> {
        match self {
            ModelParams::Text(params) => Some(params),
            ModelParams::Image(_) => None,
        }
    }

    pub fn image(&self) -> Option<&ImageParams> {
        match self {
            ModelParams::Image(params) => Some(params),
            ModelParams::Text(_) => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            ModelParams::Text(params) => params.validate(),
            ModelParams::Image(params) => params.validate(),
        }
    }
}

impl Default for ModelParams {
    fn default() -> Self {
        ModelParams::Text(InferenceParams::default())
    }
}
