// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Google Gemini adapter
//!
//! Speaks the generativelanguage REST API (generateContent and
//! streamGenerateContent with SSE). Gemini function calls carry no ids, so
//! the adapter assigns them and resolves results back to function names
//! when rebuilding the wire conversation.

use std::collections::HashMap;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::llm::message::{ContentBlock, Message, Role, ToolCall};
use crate::llm::provider::{
    ContentChunk, EventStream, ProviderAdapter, ResponseMetadata, RoundOutcome, RoundRequest,
    StopReason, StreamEvent, Usage,
};
use crate::llm::registry::Vendor;
use crate::tools::ToolSpec;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Adapter for Gemini models
pub struct GeminiAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model_id: String,
}

impl GeminiAdapter {
    pub fn new(
        api_key: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let model_id = model_id.into();
        if model_id.is_empty() {
            return Err(ProviderError::invalid_request(
                "Model ID must be specified for Gemini",
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("valid reqwest client config");
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: GEMINI_BASE_URL.to_string(),
            model_id,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model_id
        )
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url.trim_end_matches('/'),
            self.model_id
        )
    }

    /// Convert neutral messages to Gemini contents.
    ///
    /// Function responses need the original function name, which only the
    /// paired tool-use block carries, so call names are collected first.
    fn convert_messages(messages: &[Message]) -> Vec<GeminiContent> {
        let mut call_names: HashMap<String, String> = HashMap::new();
        for message in messages {
            for call in message.tool_calls() {
                call_names.insert(call.id.clone(), call.name.clone());
            }
        }

        let mut contents = Vec::new();
        for message in messages {
            let role = match message.role {
                Role::User => "user",
                Role::Assistant => "model",
            };

            let mut parts: Vec<GeminiPart> = Vec::new();
            if let Some(prefix) = message.context_prefix() {
                parts.push(GeminiPart::text(prefix));
            }

            for block in message.content.clone().into_blocks() {
                match block {
                    ContentBlock::Text { text } => {
                        if !text.trim().is_empty() {
                            parts.push(GeminiPart::text(text));
                        }
                    }
                    ContentBlock::File { path } => {
                        if let Some(part) = Self::convert_file(&path) {
                            parts.push(part);
                        }
                    }
                    ContentBlock::ToolUse(call) => {
                        parts.push(GeminiPart {
                            text: None,
                            function_call: Some(GeminiFunctionCall {
                                name: call.name,
                                args: call.input,
                            }),
                            function_response: None,
                            inline_data: None,
                        });
                    }
                    ContentBlock::ToolResult(result) => {
                        let name = call_names
                            .get(&result.call_id)
                            .cloned()
                            .unwrap_or_else(|| result.call_id.clone());
                        let response = if result.is_error {
                            json!({ "error": result.payload_text() })
                        } else {
                            match &result.payload {
                                Value::Object(_) => result.payload.clone(),
                                other => json!({ "result": other }),
                            }
                        };
                        parts.push(GeminiPart {
                            text: None,
                            function_call: None,
                            function_response: Some(GeminiFunctionResponse { name, response }),
                            inline_data: None,
                        });
                    }
                }
            }

            if !parts.is_empty() {
                contents.push(GeminiContent {
                    role: Some(role.to_string()),
                    parts,
                });
            }
        }
        contents
    }

    fn convert_file(path: &str) -> Option<GeminiPart> {
        let extension = std::path::Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())?;
        let mime_type = match extension.as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "webp" => "image/webp",
            "pdf" => "application/pdf",
            _ => {
                warn!(path, "Unsupported attachment type, skipping");
                return None;
            }
        };
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path, error = %e, "Failed to read attachment");
                return None;
            }
        };
        Some(GeminiPart {
            text: None,
            function_call: None,
            function_response: None,
            inline_data: Some(GeminiInlineData {
                mime_type: mime_type.to_string(),
                data: BASE64_STANDARD.encode(bytes),
            }),
        })
    }

    fn build_request(&self, round: &RoundRequest<'_>) -> GeminiRequest {
        let tools = if round.tools.is_empty() {
            None
        } else {
            Some(vec![GeminiTools {
                function_declarations: round
                    .tools
                    .iter()
                    .map(|tool| GeminiFunctionDeclaration {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.input_schema.clone(),
                    })
                    .collect(),
            }])
        };

        GeminiRequest {
            contents: Self::convert_messages(round.messages),
            system_instruction: round
                .system_prompt
                .filter(|s| !s.trim().is_empty())
                .map(|s| GeminiContent {
                    role: None,
                    parts: vec![GeminiPart::text(s.to_string())],
                }),
            tools,
            generation_config: GeminiGenerationConfig {
                max_output_tokens: round.params.max_tokens,
                temperature: round.params.temperature,
                top_p: round.params.top_p,
                top_k: round.params.top_k,
                stop_sequences: round.params.stop_sequences.clone(),
            },
        }
    }

    /// Fresh correlation id; Gemini does not provide one
    fn new_call_id() -> String {
        format!("toolu_{}", uuid::Uuid::new_v4().simple())
    }

    fn map_finish_reason(reason: &str, saw_tool_call: bool) -> StopReason {
        if saw_tool_call {
            return StopReason::ToolUse;
        }
        match reason {
            "MAX_TOKENS" => StopReason::MaxTokens,
            _ => StopReason::EndTurn,
        }
    }

    fn parse_error(status: u16, body: &str) -> ProviderError {
        let detail = format!("HTTP {}: {}", status, body);
        match status {
            401 | 403 => ProviderError::auth_failed(detail),
            429 => ProviderError::rate_limited(detail),
            400 | 404 => ProviderError::invalid_request(detail),
            408 | 504 => ProviderError::timeout(detail),
            _ => ProviderError::unknown(detail),
        }
    }

    fn map_transport_error(e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::timeout(e.to_string())
        } else {
            ProviderError::unknown(e.to_string())
        }
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Gemini
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn send(&self, round: RoundRequest<'_>) -> Result<RoundOutcome, ProviderError> {
        let body = self.build_request(&round);
        debug!(model = %self.model_id, contents = body.contents.len(), "Gemini request");

        let response = self
            .client
            .post(self.generate_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::parse_error(status, &body));
        }

        let api_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::unknown(format!("unparseable response: {}", e)))?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        let mut finish_reason = None;

        if let Some(candidate) = api_response.candidates.into_iter().next() {
            finish_reason = candidate.finish_reason;
            if let Some(content) = candidate.content {
                for part in content.parts {
                    if let Some(t) = part.text {
                        text.push_str(&t);
                    }
                    if let Some(call) = part.function_call {
                        tool_calls.push(ToolCall {
                            id: Self::new_call_id(),
                            name: call.name,
                            input: call.args,
                        });
                    }
                }
            }
        }

        let saw_tool_call = !tool_calls.is_empty();
        Ok(RoundOutcome {
            text,
            tool_calls,
            metadata: ResponseMetadata {
                usage: api_response.usage_metadata.map(|u| Usage {
                    input_tokens: u.prompt_token_count,
                    output_tokens: u.candidates_token_count,
                }),
                stop_reason: Some(Self::map_finish_reason(
                    finish_reason.as_deref().unwrap_or(""),
                    saw_tool_call,
                )),
                metrics: None,
            },
        })
    }

    async fn send_stream(&self, round: RoundRequest<'_>) -> Result<EventStream, ProviderError> {
        let body = self.build_request(&round);
        debug!(model = %self.model_id, "Gemini stream request");

        let response = self
            .client
            .post(self.stream_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::parse_error(status, &body));
        }

        let mut byte_stream = response.bytes_stream();

        let events = stream! {
            let mut buffer = String::new();
            let mut metadata = ResponseMetadata::default();
            let mut saw_tool_call = false;
            let mut finish_reason: Option<String> = None;

            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(Self::map_transport_error(e));
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer.drain(..=line_end);

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let Ok(parsed) = serde_json::from_str::<GeminiResponse>(data) else {
                        warn!("Skipping unparseable stream chunk");
                        continue;
                    };

                    // Usage metadata is cumulative; keep the latest
                    if let Some(usage) = parsed.usage_metadata {
                        metadata.usage = Some(Usage {
                            input_tokens: usage.prompt_token_count,
                            output_tokens: usage.candidates_token_count,
                        });
                    }

                    for candidate in parsed.candidates {
                        if candidate.finish_reason.is_some() {
                            finish_reason = candidate.finish_reason;
                        }
                        let Some(content) = candidate.content else {
                            continue;
                        };
                        for part in content.parts {
                            if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                                yield Ok(StreamEvent::Content(ContentChunk::Text(text)));
                            }
                            if let Some(call) = part.function_call {
                                saw_tool_call = true;
                                yield Ok(StreamEvent::Content(ContentChunk::ToolUse(ToolCall {
                                    id: Self::new_call_id(),
                                    name: call.name,
                                    input: call.args,
                                })));
                            }
                        }
                    }
                }
            }

            metadata.stop_reason = Some(Self::map_finish_reason(
                finish_reason.as_deref().unwrap_or(""),
                saw_tool_call,
            ));
            yield Ok(StreamEvent::Metadata(metadata));
        };

        Ok(Box::pin(events))
    }
}

// Gemini wire types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTools>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<GeminiFunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<GeminiFunctionResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<GeminiInlineData>,
}

impl GeminiPart {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            function_call: None,
            function_response: None,
            inline_data: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTools {
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}
