// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Bedrock InvokeModel adapter for image-generation models
//!
//! Covers Stability (SD3 / Stable Image) and Amazon Titan image models,
//! which are served through the raw InvokeModel API rather than Converse.

use std::path::{Path, PathBuf};

use aws_sdk_bedrockruntime::primitives::Blob;
use aws_sdk_bedrockruntime::Client;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ProviderError;
use crate::llm::params::ImageParams;

/// One generated image, decoded from the vendor response
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub format: String,
}

impl GeneratedImage {
    /// Write the image into `dir` under a fresh name and return its path
    pub fn save_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.{}", uuid::Uuid::new_v4().simple(), self.format));
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

/// Adapter for Bedrock image models via InvokeModel
pub struct BedrockInvokeAdapter {
    client: Client,
    model_id: String,
}

impl BedrockInvokeAdapter {
    pub fn new(client: Client, model_id: impl Into<String>) -> Result<Self, ProviderError> {
        let model_id = model_id.into();
        if model_id.is_empty() {
            return Err(ProviderError::invalid_request(
                "Model ID must be specified for Bedrock",
            ));
        }
        Ok(Self { client, model_id })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Build the vendor request body for this model family
    fn build_request(&self, prompt: &str, params: &ImageParams) -> Value {
        if self.model_id.starts_with("amazon.titan-image") {
            let mut config = json!({
                "numberOfImages": 1,
                "width": params.width,
                "height": params.height,
            });
            if let Some(cfg_scale) = params.cfg_scale {
                config["cfgScale"] = json!(cfg_scale);
            }
            let mut text_params = json!({ "text": prompt });
            if let Some(ref negative) = params.negative_prompt {
                text_params["negativeText"] = json!(negative);
            }
            json!({
                "taskType": "TEXT_IMAGE",
                "textToImageParams": text_params,
                "imageGenerationConfig": config,
            })
        } else {
            // Stability SD3 / Stable Image family
            let mut body = json!({
                "prompt": prompt,
                "mode": "text-to-image",
                "output_format": "png",
            });
            if let Some(ref aspect_ratio) = params.aspect_ratio {
                body["aspect_ratio"] = json!(aspect_ratio);
            }
            if let Some(ref negative) = params.negative_prompt {
                body["negative_prompt"] = json!(negative);
            }
            body
        }
    }

    /// Pull the base64 image out of either response shape
    fn extract_image(body: &Value) -> Option<&str> {
        if let Some(images) = body["images"].as_array() {
            return images.first().and_then(|i| i.as_str());
        }
        // Legacy SDXL shape
        body["artifacts"]
            .as_array()
            .and_then(|a| a.first())
            .and_then(|a| a["base64"].as_str())
    }

    /// Generate one image from a text prompt
    pub async fn generate_image(
        &self,
        prompt: &str,
        params: &ImageParams,
    ) -> Result<GeneratedImage, ProviderError> {
        if prompt.trim().is_empty() {
            return Err(ProviderError::invalid_request("empty image prompt"));
        }

        let request = self.build_request(prompt, params);
        debug!(model = %self.model_id, "Invoking image model");

        let body = serde_json::to_vec(&request)
            .map_err(|e| ProviderError::invalid_request(e.to_string()))?;

        let response = self
            .client
            .invoke_model()
            .model_id(&self.model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(body))
            .send()
            .await
            .map_err(map_invoke_error)?;

        let payload: Value = serde_json::from_slice(response.body().as_ref()).map_err(|e| {
            ProviderError::unknown(format!("unparseable InvokeModel response: {}", e))
        })?;

        let Some(encoded) = Self::extract_image(&payload) else {
            return Err(ProviderError::unknown(format!(
                "no image in InvokeModel response: {}",
                payload
            )));
        };

        let bytes = BASE64_STANDARD
            .decode(encoded)
            .map_err(|e| ProviderError::unknown(format!("invalid image base64: {}", e)))?;

        Ok(GeneratedImage {
            bytes,
            format: "png".to_string(),
        })
    }
}

/// Map SDK invoke errors onto the shared taxonomy
fn map_invoke_error<E, R>(err: aws_sdk_bedrockruntime::error::SdkError<E, R>) -> ProviderError
where
    E: std::error::Error + aws_sdk_bedrockruntime::error::ProvideErrorMetadata + 'static,
    R: std::fmt::Debug,
{
    super::bedrock_converse::map_sdk_error(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(model_id: &str) -> BedrockInvokeAdapter {
        let conf = aws_sdk_bedrockruntime::Config::builder()
            .behavior_version(aws_sdk_bedrockruntime::config::BehaviorVersion::latest())
            .build();
        BedrockInvokeAdapter::new(Client::from_conf(conf), model_id).unwrap()
    }

    #[test]
    fn test_empty_model_id_rejected() {
        let conf = aws_sdk_bedrockruntime::Config::builder()
            .behavior_version(aws_sdk_bedrockruntime::config::BehaviorVersion::latest())
            .build();
        assert!(BedrockInvokeAdapter::new(Client::from_conf(conf), "").is_err());
    }

    #[test]
    fn test_stability_request_shape() {
        let adapter = adapter("stability.sd3-5-large-v1:0");
        let params = ImageParams::default()
            .with_aspect_ratio("16:9")
            .with_negative_prompt("text, watermark");
        let body = adapter.build_request("a lighthouse at dusk", &params);

        assert_eq!(body["prompt"], "a lighthouse at dusk");
        assert_eq!(body["aspect_ratio"], "16:9");
        assert_eq!(body["negative_prompt"], "text, watermark");
        assert_eq!(body["output_format"], "png");
    }

    #[test]
    fn test_titan_request_shape() {
        let adapter = adapter("amazon.titan-image-generator-v2:0");
        let mut params = ImageParams::default().with_size(512, 768);
        params.cfg_scale = Some(7.5);
        let body = adapter.build_request("a red barn", &params);

        assert_eq!(body["taskType"], "TEXT_IMAGE");
        assert_eq!(body["textToImageParams"]["text"], "a red barn");
        assert_eq!(body["imageGenerationConfig"]["width"], 512);
        assert_eq!(body["imageGenerationConfig"]["height"], 768);
        assert_eq!(body["imageGenerationConfig"]["cfgScale"], 7.5);
    }

    #[test]
    fn test_extract_image_sd3_shape() {
        let body = serde_json::json!({ "images": ["aGVsbG8="] });
        assert_eq!(BedrockInvokeAdapter::extract_image(&body), Some("aGVsbG8="));
    }

    #[test]
    fn test_extract_image_artifacts_shape() {
        let body = serde_json::json!({ "artifacts": [{ "base64": "aGVsbG8=" }] });
        assert_eq!(BedrockInvokeAdapter::extract_image(&body), Some("aGVsbG8="));
    }

    #[test]
    fn test_extract_image_missing() {
        let body = serde_json::json!({ "finish_reasons": [null] });
        assert!(BedrockInvokeAdapter::extract_image(&body).is_none());
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected() {
        let adapter = adapter("stability.sd3-5-large-v1:0");
        let err = adapter
            .generate_image("  ", &ImageParams::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidRequest);
    }

    #[test]
    fn test_generated_image_save() {
        let dir = tempfile::tempdir().unwrap();
        let image = GeneratedImage {
            bytes: vec![1, 2, 3],
            format: "png".to_string(),
        };
        let path = image.save_to(dir.path()).unwrap();
        assert!(path.exists());
        assert_eq!(path.extension().unwrap(), "png");
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
    }
}
