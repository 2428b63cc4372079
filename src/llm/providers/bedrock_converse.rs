// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Bedrock Converse adapter
//!
//! Translates the neutral message model into the Bedrock Converse API and
//! normalizes both the one-shot and streaming responses into the shared
//! event model. Tool-input JSON arrives as string deltas on the stream and
//! is assembled here; only completed tool calls cross the adapter boundary.

use std::collections::HashMap;

use async_stream::stream;
use async_trait::async_trait;
use aws_sdk_bedrockruntime::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_bedrockruntime::primitives::Blob;
use aws_sdk_bedrockruntime::types::{
    ContentBlock as BedrockContent, ContentBlockDelta as BedrockDelta,
    ContentBlockStart as BedrockBlockStart, ConversationRole, ConverseStreamOutput,
    DocumentBlock, DocumentFormat, DocumentSource, ImageBlock, ImageFormat,
    ImageSource as BedrockImageSource, InferenceConfiguration, Message as BedrockMessage,
    StopReason as BedrockStopReason, SystemContentBlock, Tool as BedrockTool, ToolConfiguration,
    ToolInputSchema, ToolResultBlock, ToolResultContentBlock, ToolResultStatus,
    ToolSpecification, ToolUseBlock,
};
use aws_sdk_bedrockruntime::Client;
use aws_smithy_types::{Document, Number};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ErrorCode, ProviderError};
use crate::llm::message::{ContentBlock, Message, Role, ToolCall};
use crate::llm::provider::{
    ContentChunk, EventStream, Metrics, ProviderAdapter, ResponseMetadata, RoundOutcome,
    RoundRequest, StopReason, StreamEvent, Usage,
};
use crate::llm::registry::Vendor;
use crate::tools::ToolSpec;

/// Adapter for text models served through the Bedrock Converse API
pub struct BedrockConverseAdapter {
    client: Client,
    model_id: String,
}

impl BedrockConverseAdapter {
    pub fn new(client: Client, model_id: impl Into<String>) -> Result<Self, ProviderError> {
        let model_id = model_id.into();
        if model_id.is_empty() {
            return Err(ProviderError::invalid_request(
                "Model ID must be specified for Bedrock",
            ));
        }
        Ok(Self { client, model_id })
    }
}

impl std::fmt::Debug for BedrockConverseAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BedrockConverseAdapter")
            .field("model_id", &self.model_id)
            .finish()
    }
}

impl BedrockConverseAdapter {

    /// Convert one neutral message into Bedrock content blocks
    fn convert_message(message: &Message) -> Result<BedrockMessage, ProviderError> {
        let role = match message.role {
            Role::User => ConversationRole::User,
            Role::Assistant => ConversationRole::Assistant,
        };

        let mut content: Vec<BedrockContent> = Vec::new();

        if let Some(prefix) = message.context_prefix() {
            content.push(BedrockContent::Text(prefix));
        }

        for block in message.content.clone().into_blocks() {
            match block {
                ContentBlock::Text { text } => {
                    if !text.trim().is_empty() {
                        content.push(BedrockContent::Text(text));
                    }
                }
                ContentBlock::File { path } => {
                    if let Some(block) = Self::convert_file(&path) {
                        content.push(block);
                    }
                }
                ContentBlock::ToolUse(call) => {
                    let block = ToolUseBlock::builder()
                        .tool_use_id(&call.id)
                        .name(&call.name)
                        .input(value_to_document(&call.input))
                        .build()
                        .map_err(|e| ProviderError::invalid_request(e.to_string()))?;
                    content.push(BedrockContent::ToolUse(block));
                }
                ContentBlock::ToolResult(result) => {
                    let payload = match &result.payload {
                        Value::String(s) => ToolResultContentBlock::Text(s.clone()),
                        other => ToolResultContentBlock::Json(value_to_document(other)),
                    };
                    let mut builder = ToolResultBlock::builder()
                        .tool_use_id(&result.call_id)
                        .content(payload);
                    if result.is_error {
                        builder = builder.status(ToolResultStatus::Error);
                    }
                    let block = builder
                        .build()
                        .map_err(|e| ProviderError::invalid_request(e.to_string()))?;
                    content.push(BedrockContent::ToolResult(block));
                }
            }
        }

        let mut builder = BedrockMessage::builder().role(role);
        for block in content {
            builder = builder.content(block);
        }
        builder
            .build()
            .map_err(|e| ProviderError::invalid_request(e.to_string()))
    }

    /// Attach a file by path as an image or document block
    fn convert_file(path: &str) -> Option<BedrockContent> {
        let extension = std::path::Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path, error = %e, "Failed to read attachment");
                return None;
            }
        };

        let image_format = match extension.as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "gif" => Some(ImageFormat::Gif),
            "webp" => Some(ImageFormat::Webp),
            _ => None,
        };
        if let Some(format) = image_format {
            let block = ImageBlock::builder()
                .format(format)
                .source(BedrockImageSource::Bytes(Blob::new(bytes)))
                .build()
                .ok()?;
            return Some(BedrockContent::Image(block));
        }

        let document_format = match extension.as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "csv" => Some(DocumentFormat::Csv),
            "doc" => Some(DocumentFormat::Doc),
            "docx" => Some(DocumentFormat::Docx),
            "html" => Some(DocumentFormat::Html),
            "md" => Some(DocumentFormat::Md),
            "txt" => Some(DocumentFormat::Txt),
            _ => None,
        };
        if let Some(format) = document_format {
            let name = std::path::Path::new(path)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("document");
            let block = DocumentBlock::builder()
                .format(format)
                .name(name)
                .source(DocumentSource::Bytes(Blob::new(bytes)))
                .build()
                .ok()?;
            return Some(BedrockContent::Document(block));
        }

        warn!(path, "Unsupported attachment type, skipping");
        None
    }

    fn convert_tools(tools: &[ToolSpec]) -> Result<Option<ToolConfiguration>, ProviderError> {
        if tools.is_empty() {
            return Ok(None);
        }
        let mut builder = ToolConfiguration::builder();
        for tool in tools {
            let spec = ToolSpecification::builder()
                .name(&tool.name)
                .description(&tool.description)
                .input_schema(ToolInputSchema::Json(value_to_document(&tool.input_schema)))
                .build()
                .map_err(|e| ProviderError::invalid_request(e.to_string()))?;
            builder = builder.tools(BedrockTool::ToolSpec(spec));
        }
        builder
            .build()
            .map(Some)
            .map_err(|e| ProviderError::invalid_request(e.to_string()))
    }

    fn inference_config(round: &RoundRequest<'_>) -> InferenceConfiguration {
        InferenceConfiguration::builder()
            .max_tokens(round.params.max_tokens as i32)
            .temperature(round.params.temperature)
            .top_p(round.params.top_p)
            .set_stop_sequences(round.params.stop_sequences.clone())
            .build()
    }

    fn map_stop_reason(reason: &BedrockStopReason) -> StopReason {
        match reason {
            BedrockStopReason::MaxTokens => StopReason::MaxTokens,
            BedrockStopReason::ToolUse => StopReason::ToolUse,
            BedrockStopReason::StopSequence => StopReason::StopSequence,
            _ => StopReason::EndTurn,
        }
    }
}

#[async_trait]
impl ProviderAdapter for BedrockConverseAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Bedrock
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn send(&self, round: RoundRequest<'_>) -> Result<RoundOutcome, ProviderError> {
        let mut request = self
            .client
            .converse()
            .model_id(&self.model_id)
            .inference_config(Self::inference_config(&round));

        for message in round.messages {
            request = request.messages(Self::convert_message(message)?);
        }
        if let Some(system) = round.system_prompt.filter(|s| !s.trim().is_empty()) {
            request = request.system(SystemContentBlock::Text(system.to_string()));
        }
        if let Some(top_k) = round.params.top_k {
            request = request.additional_model_request_fields(value_to_document(
                &serde_json::json!({ "topK": top_k }),
            ));
        }
        if let Some(tool_config) = Self::convert_tools(round.tools)? {
            request = request.tool_config(tool_config);
        }

        debug!(model = %self.model_id, messages = round.messages.len(), "Converse request");
        let response = request.send().await.map_err(map_sdk_error)?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        if let Some(aws_sdk_bedrockruntime::types::ConverseOutput::Message(message)) =
            response.output()
        {
            for block in message.content() {
                match block {
                    BedrockContent::Text(t) => text.push_str(t),
                    BedrockContent::ToolUse(tool_use) => tool_calls.push(ToolCall {
                        id: tool_use.tool_use_id().to_string(),
                        name: tool_use.name().to_string(),
                        input: document_to_value(tool_use.input()),
                    }),
                    _ => {}
                }
            }
        }

        let metadata = ResponseMetadata {
            usage: response.usage().map(|u| Usage {
                input_tokens: u.input_tokens() as u32,
                output_tokens: u.output_tokens() as u32,
            }),
            stop_reason: Some(Self::map_stop_reason(response.stop_reason())),
            metrics: response.metrics().map(|m| Metrics {
                latency_ms: Some(m.latency_ms() as u64),
            }),
        };

        Ok(RoundOutcome {
            text,
            tool_calls,
            metadata,
        })
    }

    async fn send_stream(&self, round: RoundRequest<'_>) -> Result<EventStream, ProviderError> {
        let mut request = self
            .client
            .converse_stream()
            .model_id(&self.model_id)
            .inference_config(Self::inference_config(&round));

        for message in round.messages {
            request = request.messages(Self::convert_message(message)?);
        }
        if let Some(system) = round.system_prompt.filter(|s| !s.trim().is_empty()) {
            request = request.system(SystemContentBlock::Text(system.to_string()));
        }
        if let Some(top_k) = round.params.top_k {
            request = request.additional_model_request_fields(value_to_document(
                &serde_json::json!({ "topK": top_k }),
            ));
        }
        if let Some(tool_config) = Self::convert_tools(round.tools)? {
            request = request.tool_config(tool_config);
        }

        debug!(model = %self.model_id, "ConverseStream request");
        let response = request.send().await.map_err(map_sdk_error)?;
        let mut receiver = response.stream;

        let events = stream! {
            // Tool input JSON arrives as string deltas keyed by block index;
            // a call is surfaced only once its block stops.
            let mut pending_tools: HashMap<i32, (String, String, String)> = HashMap::new();
            let mut metadata = ResponseMetadata::default();
            let mut metadata_sent = false;

            loop {
                let event = match receiver.recv().await {
                    Ok(Some(event)) => event,
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(map_sdk_error(e));
                        return;
                    }
                };

                match event {
                    ConverseStreamOutput::ContentBlockStart(start) => {
                        if let Some(BedrockBlockStart::ToolUse(tool_start)) = start.start() {
                            pending_tools.insert(
                                start.content_block_index(),
                                (
                                    tool_start.tool_use_id().to_string(),
                                    tool_start.name().to_string(),
                                    String::new(),
                                ),
                            );
                        }
                    }
                    ConverseStreamOutput::ContentBlockDelta(delta_event) => {
                        match delta_event.delta() {
                            Some(BedrockDelta::Text(text)) => {
                                yield Ok(StreamEvent::Content(ContentChunk::Text(text.clone())));
                            }
                            Some(BedrockDelta::ToolUse(tool_delta)) => {
                                if let Some(entry) =
                                    pending_tools.get_mut(&delta_event.content_block_index())
                                {
                                    entry.2.push_str(tool_delta.input());
                                }
                            }
                            _ => {}
                        }
                    }
                    ConverseStreamOutput::ContentBlockStop(stop) => {
                        if let Some((id, name, input_json)) =
                            pending_tools.remove(&stop.content_block_index())
                        {
                            let input = if input_json.trim().is_empty() {
                                Value::Object(serde_json::Map::new())
                            } else {
                                match serde_json::from_str(&input_json) {
                                    Ok(value) => value,
                                    Err(e) => {
                                        warn!(error = %e, "Failed to parse tool input as JSON");
                                        Value::Object(serde_json::Map::new())
                                    }
                                }
                            };
                            yield Ok(StreamEvent::Content(ContentChunk::ToolUse(ToolCall {
                                id,
                                name,
                                input,
                            })));
                        }
                    }
                    ConverseStreamOutput::MessageStop(stop) => {
                        metadata.stop_reason = Some(Self::map_stop_reason(stop.stop_reason()));
                    }
                    ConverseStreamOutput::Metadata(meta) => {
                        metadata.usage = meta.usage().map(|u| Usage {
                            input_tokens: u.input_tokens() as u32,
                            output_tokens: u.output_tokens() as u32,
                        });
                        metadata.metrics = meta.metrics().map(|m| Metrics {
                            latency_ms: Some(m.latency_ms() as u64),
                        });
                        metadata_sent = true;
                        yield Ok(StreamEvent::Metadata(metadata.clone()));
                    }
                    _ => {}
                }
            }

            if !metadata_sent {
                yield Ok(StreamEvent::Metadata(metadata));
            }
        };

        Ok(Box::pin(events))
    }
}

/// Map an SDK error onto the shared taxonomy
pub(crate) fn map_sdk_error<E, R>(err: SdkError<E, R>) -> ProviderError
where
    E: std::error::Error + ProvideErrorMetadata + 'static,
    R: std::fmt::Debug,
{
    let detail = format!("{}", DisplayErrorContext(&err));
    match &err {
        SdkError::TimeoutError(_) => ProviderError::timeout(detail),
        SdkError::ServiceError(context) => {
            let code = context.err().code().unwrap_or_default();
            match code {
                "ThrottlingException" | "TooManyRequestsException" | "ServiceQuotaExceededException" => {
                    ProviderError::rate_limited(detail)
                }
                "AccessDeniedException" | "UnrecognizedClientException" | "ExpiredTokenException" => {
                    ProviderError::auth_failed(detail)
                }
                "ValidationException" | "ResourceNotFoundException" => {
                    ProviderError::invalid_request(detail)
                }
                "ModelTimeoutException" => ProviderError::timeout(detail),
                _ => ProviderError::unknown(detail),
            }
        }
        _ => ProviderError::new(
            ErrorCode::Unknown,
            "could not reach the model provider.",
            detail,
        ),
    }
}

/// Convert JSON into a Smithy document for tool schemas and inputs
pub(crate) fn value_to_document(value: &Value) -> Document {
    match value {
        Value::Null => Document::Null,
        Value::Bool(b) => Document::Bool(*b),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Document::Number(Number::PosInt(u))
            } else if let Some(i) = n.as_i64() {
                Document::Number(Number::NegInt(i))
            } else {
                Document::Number(Number::Float(n.as_f64().unwrap_or(0.0)))
            }
        }
        Value::String(s) => Document::String(s.clone()),
        Value::Array(items) => Document::Array(items.iter().map(value_to_document).collect()),
        Value::Object(map) => Document::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_document(v)))
                .collect(),
        ),
    }
}

/// Convert a Smithy document back into JSON
pub(crate) fn document_to_value(document: &Document) -> Value {
    match document {
        Document::Null => Value::Null,
        Document::Bool(b) => Value::Bool(*b),
        Document::Number(n) => match n {
            Number::PosInt(u) => Value::from(*u),
            Number::NegInt(i) => Value::from(*i),
            Number::Float(f) => {
                serde_json::Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null)
            }
        },
        Document::String(s) => Value::String(s.clone()),
        Document::Array(items) => Value::Array(items.iter().map(document_to_value).collect()),
        Document::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), document_to_value(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::message::ToolResult;
    use serde_json::json;

    fn adapter() -> BedrockConverseAdapter {
        let conf = aws_sdk_bedrockruntime::Config::builder()
            .behavior_version(aws_sdk_bedrockruntime::config::BehaviorVersion::latest())
            .build();
        BedrockConverseAdapter::new(
            Client::from_conf(conf),
            "anthropic.claude-3-5-sonnet-20241022-v2:0",
        )
        .unwrap()
    }

    #[test]
    fn test_empty_model_id_rejected() {
        let conf = aws_sdk_bedrockruntime::Config::builder()
            .behavior_version(aws_sdk_bedrockruntime::config::BehaviorVersion::latest())
            .build();
        let err = BedrockConverseAdapter::new(Client::from_conf(conf), "").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequest);
    }

    #[test]
    fn test_adapter_identity() {
        let adapter = adapter();
        assert_eq!(adapter.vendor(), Vendor::Bedrock);
        assert!(adapter.model_id().contains("claude"));
    }

    #[test]
    fn test_convert_text_message() {
        let message =
            BedrockConverseAdapter::convert_message(&Message::user("Hello Bedrock")).unwrap();
        assert_eq!(message.role(), &ConversationRole::User);
        assert_eq!(message.content().len(), 1);
        assert!(matches!(&message.content()[0], BedrockContent::Text(t) if t == "Hello Bedrock"));
    }

    #[test]
    fn test_convert_message_with_context_prefix() {
        let mut context = std::collections::BTreeMap::new();
        context.insert("user_name".to_string(), "rob".to_string());
        let message = Message::user("hi").with_context(context);
        let converted = BedrockConverseAdapter::convert_message(&message).unwrap();

        assert_eq!(converted.content().len(), 2);
        assert!(
            matches!(&converted.content()[0], BedrockContent::Text(t) if t.starts_with("Context Information:"))
        );
    }

    #[test]
    fn test_convert_tool_use_message() {
        let message = Message::assistant_tool_use(
            Some("checking".to_string()),
            vec![ToolCall {
                id: "call_1".to_string(),
                name: "get_weather".to_string(),
                input: json!({"place": "Tokyo"}),
            }],
        );
        let converted = BedrockConverseAdapter::convert_message(&message).unwrap();
        assert_eq!(converted.role(), &ConversationRole::Assistant);
        assert_eq!(converted.content().len(), 2);
        match &converted.content()[1] {
            BedrockContent::ToolUse(tool_use) => {
                assert_eq!(tool_use.tool_use_id(), "call_1");
                assert_eq!(tool_use.name(), "get_weather");
                assert_eq!(document_to_value(tool_use.input())["place"], "Tokyo");
            }
            other => panic!("Expected tool use, got {:?}", other),
        }
    }

    #[test]
    fn test_convert_tool_result_message() {
        let message = Message::tool_results(vec![ToolResult::ok(
            "call_1",
            json!({"temperature": 18}),
        )]);
        let converted = BedrockConverseAdapter::convert_message(&message).unwrap();
        assert_eq!(converted.role(), &ConversationRole::User);
        match &converted.content()[0] {
            BedrockContent::ToolResult(result) => {
                assert_eq!(result.tool_use_id(), "call_1");
                assert!(result.status().is_none());
            }
            other => panic!("Expected tool result, got {:?}", other),
        }
    }

    #[test]
    fn test_convert_error_tool_result_sets_status() {
        let message =
            Message::tool_results(vec![ToolResult::error("call_1", "connection refused")]);
        let converted = BedrockConverseAdapter::convert_message(&message).unwrap();
        match &converted.content()[0] {
            BedrockContent::ToolResult(result) => {
                assert_eq!(result.status(), Some(&ToolResultStatus::Error));
            }
            other => panic!("Expected tool result, got {:?}", other),
        }
    }

    #[test]
    fn test_convert_tools_config() {
        let tools = vec![ToolSpec {
            name: "get_weather".to_string(),
            description: "Weather lookup".to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        }];
        let config = BedrockConverseAdapter::convert_tools(&tools).unwrap().unwrap();
        assert_eq!(config.tools().len(), 1);
    }

    #[test]
    fn test_convert_tools_empty_is_none() {
        assert!(BedrockConverseAdapter::convert_tools(&[]).unwrap().is_none());
    }

    #[test]
    fn test_stop_reason_mapping() {
        assert_eq!(
            BedrockConverseAdapter::map_stop_reason(&BedrockStopReason::ToolUse),
            StopReason::ToolUse
        );
        assert_eq!(
            BedrockConverseAdapter::map_stop_reason(&BedrockStopReason::MaxTokens),
            StopReason::MaxTokens
        );
        assert_eq!(
            BedrockConverseAdapter::map_stop_reason(&BedrockStopReason::EndTurn),
            StopReason::EndTurn
        );
    }

    #[test]
    fn test_value_document_roundtrip() {
        let value = json!({
            "place": "Tokyo",
            "count": 3,
            "ratio": 0.5,
            "flags": [true, false],
            "nested": { "deep": null }
        });
        let roundtripped = document_to_value(&value_to_document(&value));
        assert_eq!(roundtripped, value);
    }

    #[test]
    fn test_negative_number_document() {
        let value = json!({"offset": -5});
        assert_eq!(document_to_value(&value_to_document(&value)), value);
    }
}
