// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! OpenAI chat-completions adapter
//!
//! Speaks the OpenAI wire format over HTTPS with SSE streaming. Tool-call
//! argument fragments are accumulated per index and surfaced as completed
//! tool calls before the terminal metadata event.

use std::collections::BTreeMap;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::llm::message::{ContentBlock, Message, Role, ToolCall};
use crate::llm::provider::{
    ContentChunk, EventStream, ProviderAdapter, ResponseMetadata, RoundOutcome, RoundRequest,
    StopReason, StreamEvent, Usage,
};
use crate::llm::registry::Vendor;
use crate::tools::ToolSpec;

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Adapter for OpenAI chat-completions models
pub struct OpenAiAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model_id: String,
}

impl OpenAiAdapter {
    pub fn new(
        api_key: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let model_id = model_id.into();
        if model_id.is_empty() {
            return Err(ProviderError::invalid_request(
                "Model ID must be specified for OpenAI",
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("valid reqwest client config");
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: OPENAI_API_URL.to_string(),
            model_id,
        })
    }

    /// Point at a compatible endpoint (tests, proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Convert neutral messages to the OpenAI shape
    fn convert_messages(messages: &[Message], system: Option<&str>) -> Vec<OpenAiMessage> {
        let mut result = Vec::new();

        if let Some(system) = system.filter(|s| !s.trim().is_empty()) {
            result.push(OpenAiMessage {
                role: "system".to_string(),
                content: Some(OpenAiContent::Text(system.to_string())),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for message in messages {
            let role = match message.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };

            let mut text_parts: Vec<String> = Vec::new();
            if let Some(prefix) = message.context_prefix() {
                text_parts.push(prefix);
            }
            let mut image_parts: Vec<OpenAiContentPart> = Vec::new();
            let mut tool_calls: Vec<OpenAiToolCall> = Vec::new();
            let mut tool_results: Vec<(String, String)> = Vec::new();

            for block in message.content.clone().into_blocks() {
                match block {
                    ContentBlock::Text { text } => {
                        if !text.trim().is_empty() {
                            text_parts.push(text);
                        }
                    }
                    ContentBlock::File { path } => {
                        if let Some(part) = Self::convert_image(&path) {
                            image_parts.push(part);
                        }
                    }
                    ContentBlock::ToolUse(call) => {
                        tool_calls.push(OpenAiToolCall {
                            id: call.id,
                            r#type: "function".to_string(),
                            function: OpenAiFunctionCall {
                                name: call.name,
                                arguments: call.input.to_string(),
                            },
                        });
                    }
                    ContentBlock::ToolResult(result) => {
                        let content = if result.is_error {
                            format!("Error: {}", result.payload_text())
                        } else {
                            result.payload_text()
                        };
                        tool_results.push((result.call_id, content));
                    }
                }
            }

            if !text_parts.is_empty() || !image_parts.is_empty() || !tool_calls.is_empty() {
                let content = if image_parts.is_empty() {
                    Some(OpenAiContent::Text(text_parts.join("\n")))
                } else {
                    let mut parts: Vec<OpenAiContentPart> = text_parts
                        .into_iter()
                        .map(|text| OpenAiContentPart::Text { text })
                        .collect();
                    parts.extend(image_parts);
                    Some(OpenAiContent::Parts(parts))
                };
                result.push(OpenAiMessage {
                    role: role.to_string(),
                    content,
                    tool_calls: if tool_calls.is_empty() {
                        None
                    } else {
                        Some(tool_calls)
                    },
                    tool_call_id: None,
                });
            }

            for (tool_call_id, content) in tool_results {
                result.push(OpenAiMessage {
                    role: "tool".to_string(),
                    content: Some(OpenAiContent::Text(content)),
                    tool_calls: None,
                    tool_call_id: Some(tool_call_id),
                });
            }
        }

        result
    }

    /// Inline a local image as a data URL part
    fn convert_image(path: &str) -> Option<OpenAiContentPart> {
        let extension = std::path::Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())?;
        let media_type = match extension.as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "webp" => "image/webp",
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
        Some(OpenAiContentPart::ImageUrl {
            image_url: OpenAiImageUrl {
                url: format!("data:{};base64,{}", media_type, BASE64_STANDARD.encode(bytes)),
            },
        })
    }

    fn convert_tools(tools: &[ToolSpec]) -> Option<Vec<OpenAiTool>> {
        if tools.is_empty() {
            return None;
        }
        Some(
            tools
                .iter()
                .map(|tool| OpenAiTool {
                    r#type: "function".to_string(),
                    function: OpenAiFunction {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.input_schema.clone(),
                    },
                })
                .collect(),
        )
    }

    fn build_request(&self, round: &RoundRequest<'_>, stream: bool) -> OpenAiRequest {
        OpenAiRequest {
            model: self.model_id.clone(),
            messages: Self::convert_messages(round.messages, round.system_prompt),
            max_tokens: Some(round.params.max_tokens),
            temperature: Some(round.params.temperature),
            top_p: Some(round.params.top_p),
            stop: round.params.stop_sequences.clone(),
            tools: Self::convert_tools(round.tools),
            stream: Some(stream),
            stream_options: stream.then(|| OpenAiStreamOptions {
                include_usage: true,
            }),
        }
    }

    fn map_finish_reason(reason: &str) -> StopReason {
        match reason {
            "length" => StopReason::MaxTokens,
            "tool_calls" | "function_call" => StopReason::ToolUse,
            "stop" => StopReason::EndTurn,
            _ => StopReason::EndTurn,
        }
    }

    fn parse_error(status: u16, body: &str) -> ProviderError {
        let detail = format!("HTTP {}: {}", status, body);
        match status {
            401 | 403 => ProviderError::auth_failed(detail),
            429 => ProviderError::rate_limited(detail),
            400 | 404 | 422 => ProviderError::invalid_request(detail),
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
impl ProviderAdapter for OpenAiAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::OpenAi
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn send(&self, round: RoundRequest<'_>) -> Result<RoundOutcome, ProviderError> {
        let body = self.build_request(&round, false);
        debug!(model = %self.model_id, messages = body.messages.len(), "OpenAI request");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::parse_error(status, &body));
        }

        let api_response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::unknown(format!("unparseable response: {}", e)))?;

        let choice = api_response.choices.into_iter().next().ok_or_else(|| {
            ProviderError::unknown("no choices in OpenAI response".to_string())
        })?;

        let mut tool_calls = Vec::new();
        if let Some(calls) = choice.message.tool_calls {
            for call in calls {
                let input: Value = serde_json::from_str(&call.function.arguments)
                    .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
                tool_calls.push(ToolCall {
                    id: call.id,
                    name: call.function.name,
                    input,
                });
            }
        }

        Ok(RoundOutcome {
            text: choice.message.content.unwrap_or_default(),
            tool_calls,
            metadata: ResponseMetadata {
                usage: api_response.usage.map(|u| Usage {
                    input_tokens: u.prompt_tokens,
                    output_tokens: u.completion_tokens,
                }),
                stop_reason: choice
                    .finish_reason
                    .as_deref()
                    .map(Self::map_finish_reason),
                metrics: None,
            },
        })
    }

    async fn send_stream(&self, round: RoundRequest<'_>) -> Result<EventStream, ProviderError> {
        let body = self.build_request(&round, true);
        debug!(model = %self.model_id, "OpenAI stream request");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
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
            // Argument fragments per tool-call index
            let mut pending_tools: BTreeMap<u64, (String, String, String)> = BTreeMap::new();
            let mut metadata = ResponseMetadata::default();

            'outer: while let Some(chunk) = byte_stream.next().await {
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

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if data == "[DONE]" {
                        break 'outer;
                    }

                    let Ok(parsed) = serde_json::from_str::<OpenAiStreamChunk>(data) else {
                        warn!("Skipping unparseable stream chunk");
                        continue;
                    };

                    if let Some(usage) = parsed.usage {
                        metadata.usage = Some(Usage {
                            input_tokens: usage.prompt_tokens,
                            output_tokens: usage.completion_tokens,
                        });
                    }

                    for choice in parsed.choices {
                        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                            yield Ok(StreamEvent::Content(ContentChunk::Text(text)));
                        }
                        if let Some(calls) = choice.delta.tool_calls {
                            for call in calls {
                                let entry = pending_tools
                                    .entry(call.index.unwrap_or(0))
                                    .or_insert_with(|| {
                                        (String::new(), String::new(), String::new())
                                    });
                                if let Some(id) = call.id {
                                    entry.0 = id;
                                }
                                if let Some(function) = call.function {
                                    if let Some(name) = function.name {
                                        entry.1 = name;
                                    }
                                    if let Some(arguments) = function.arguments {
                                        entry.2.push_str(&arguments);
                                    }
                                }
                            }
                        }
                        if let Some(reason) = choice.finish_reason.as_deref() {
                            metadata.stop_reason = Some(Self::map_finish_reason(reason));
                        }
                    }
                }
            }

            for (index, (id, name, arguments)) in pending_tools {
                let input: Value = serde_json::from_str(&arguments)
                    .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
                let id = if id.is_empty() {
                    format!("call_{}", index)
                } else {
                    id
                };
                yield Ok(StreamEvent::Content(ContentChunk::ToolUse(ToolCall {
                    id,
                    name,
                    input,
                })));
            }

            yield Ok(StreamEvent::Metadata(metadata));
        };

        Ok(Box::pin(events))
    }
}

// OpenAI wire types

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<OpenAiStreamOptions>,
}

#[derive(Debug, Serialize)]
struct OpenAiStreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<OpenAiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum OpenAiContent {
    Text(String),
    Parts(Vec<OpenAiContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAiContentPart {
    Text { text: String },
    ImageUrl { image_url: OpenAiImageUrl },
}

#[derive(Debug, Serialize)]
struct OpenAiImageUrl {
    url: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    id: String,
    r#type: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    r#type: String,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize)]
struct OpenAiFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    choices: Vec<OpenAiStreamChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct OpenAiStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiStreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamToolCall {
    index: Option<u64>,
    id: Option<String>,
    function: Option<OpenAiStreamFunction>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}
