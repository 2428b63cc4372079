// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Image generation tool
//!
//! Unlike the other builtins this tool needs a configured image provider
//! and an output directory, so it is registered eagerly by the caller
//! instead of through the lazy builtin map.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::error::Result;
use crate::llm::factory::ImageProvider;
use crate::llm::params::ImageParams;
use crate::tools::{SchemaBuilder, Tool, ToolHandler, ToolSpec};

pub struct ImageGenTool {
    provider: Arc<ImageProvider>,
    output_dir: PathBuf,
}

impl ImageGenTool {
    pub fn new(provider: Arc<ImageProvider>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            provider,
            output_dir: output_dir.into(),
        }
    }

    /// Registered tool backed by this handler
    pub fn into_tool(self) -> Tool {
        Tool::new(spec(), Arc::new(self))
    }
}

#[async_trait]
impl ToolHandler for ImageGenTool {
    async fn call(&self, input: Value) -> Result<Value> {
        let Some(prompt) = input["prompt"].as_str().filter(|p| !p.trim().is_empty()) else {
            return Ok(json!({ "error": "prompt is required" }));
        };

        let overrides = input["aspect_ratio"].as_str().map(|aspect_ratio| {
            ImageParams::default().with_aspect_ratio(aspect_ratio)
        });

        let image = match self
            .provider
            .generate_image(prompt, overrides.as_ref())
            .await
        {
            Ok(image) => image,
            Err(e) => {
                error!(error = %e, detail = %e.detail, "Image generation failed");
                return Ok(json!({ "error": e.to_string() }));
            }
        };

        let path = image.save_to(&self.output_dir)?;
        info!(path = %path.display(), "Generated image");
        Ok(json!({
            "text": format!("Generated an image for: {}", prompt),
            "file_path": path.to_string_lossy(),
        }))
    }
}

/// Spec for the image generation tool
pub fn spec() -> ToolSpec {
    ToolSpec {
        name: "generate_image".to_string(),
        description: "Generate an image from a text description. Use this when asked to draw, \
                      paint, create or visualize a picture. Describe the desired image in the \
                      prompt as concretely as possible."
            .to_string(),
        input_schema: SchemaBuilder::new()
            .string("prompt", "Text description of the desired image", true)
            .string("aspect_ratio", "Optional aspect ratio such as '16:9' or '1:1'", false)
            .build(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_shape() {
        let spec = spec();
        assert_eq!(spec.name, "generate_image");
        assert_eq!(spec.input_schema["required"][0], "prompt");
    }
}
