// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Conversation orchestrator
//!
//! Drives the bounded send → tool call → tool result → send loop over any
//! provider adapter, for both single-shot and streaming calls. Tool
//! failures become error tool results and the conversation continues;
//! exhausting the round budget returns the best text obtained so far.

use std::sync::Arc;

use async_stream::stream;
use futures::StreamExt;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::llm::message::{Message, ToolCall, ToolResult};
use crate::llm::params::InferenceParams;
use crate::llm::provider::{
    ContentChunk, EventStream, ProviderAdapter, ResponseMetadata, RoundRequest, StreamEvent,
};
use crate::tools::{ToolRegistry, ToolSpec};

/// Hard cap on model → tool → model cycles within one turn
pub const MAX_TOOL_ROUNDS: u32 = 5;

/// Complete reply assembled by [`Provider::generate`]
#[derive(Debug, Clone, Default)]
pub struct LlmReply {
    /// Final text content
    pub text: String,
    /// Files produced by tools along the way (e.g. generated images)
    pub files: Vec<String>,
    /// Metadata merged across all rounds
    pub metadata: ResponseMetadata,
}

/// An adapter paired with its tool subset and default parameters.
///
/// Cheap to clone; all state is shared and immutable, so one instance can
/// serve concurrent requests.
#[derive(Clone)]
pub struct Provider {
    adapter: Arc<dyn ProviderAdapter>,
    tools: Arc<ToolRegistry>,
    tool_specs: Vec<ToolSpec>,
    params: InferenceParams,
    max_tool_rounds: u32,
}

impl Provider {
    /// Pair an adapter with its enabled tools.
    ///
    /// Tool names that don't resolve are logged and skipped by the registry.
    pub fn new(
        adapter: Arc<dyn ProviderAdapter>,
        tools: Arc<ToolRegistry>,
        enabled_tools: &[String],
        params: InferenceParams,
    ) -> Self {
        let tool_specs = tools.resolve_specs(enabled_tools);
        debug!(
            model = adapter.model_id(),
            tools = tool_specs.len(),
            "Constructed provider"
        );
        Self {
            adapter,
            tools,
            tool_specs,
            params,
            max_tool_rounds: MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_max_tool_rounds(mut self, max_tool_rounds: u32) -> Self {
        self.max_tool_rounds = max_tool_rounds.max(1);
        self
    }

    pub fn model_id(&self) -> &str {
        self.adapter.model_id()
    }

    pub fn params(&self) -> &InferenceParams {
        &self.params
    }

    /// Execute the round's tool calls and extend the conversation with the
    /// assistant tool-use message and the paired result message.
    async fn run_tools(
        &self,
        conversation: &mut Vec<Message>,
        round_text: String,
        tool_calls: Vec<ToolCall>,
    ) -> Vec<String> {
        conversation.push(Message::assistant_tool_use(
            Some(round_text).filter(|t| !t.is_empty()),
            tool_calls.clone(),
        ));

        let mut files = Vec::new();
        let mut results = Vec::with_capacity(tool_calls.len());
        for call in tool_calls {
            debug!(tool = %call.name, id = %call.id, "Executing tool");
            let payload = self.tools.execute_tool(&call.name, call.input.clone()).await;
            if let Some(path) = payload.get("file_path").and_then(|v| v.as_str()) {
                files.push(path.to_string());
            }
            let is_error = payload.get("error").is_some();
            results.push(ToolResult {
                call_id: call.id,
                is_error,
                payload,
            });
        }
        conversation.push(Message::tool_results(results));
        files
    }

    /// Single complete response, looping through tool use as needed.
    pub async fn generate(
        &self,
        messages: Vec<Message>,
        system_prompt: Option<&str>,
        overrides: Option<&InferenceParams>,
    ) -> Result<LlmReply, ProviderError> {
        let params = overrides.unwrap_or(&self.params);
        let mut conversation = messages;
        let mut metadata = ResponseMetadata::default();
        let mut files = Vec::new();
        let mut best_text = String::new();

        for round in 1..=self.max_tool_rounds {
            let outcome = self
                .adapter
                .send(RoundRequest {
                    messages: &conversation,
                    system_prompt,
                    params,
                    tools: &self.tool_specs,
                })
                .await?;
            metadata.merge(&outcome.metadata);

            if !outcome.text.is_empty() {
                best_text = outcome.text.clone();
            }

            if !outcome.wants_tool_use() {
                return Ok(LlmReply {
                    text: outcome.text,
                    files,
                    metadata,
                });
            }

            debug!(round, calls = outcome.tool_calls.len(), "Tool use requested");
            let round_files = self
                .run_tools(&mut conversation, outcome.text, outcome.tool_calls)
                .await;
            files.extend(round_files);
        }

        warn!(
            model = self.adapter.model_id(),
            rounds = self.max_tool_rounds,
            "Tool-use round limit reached, returning best partial text"
        );
        Ok(LlmReply {
            text: best_text,
            files,
            metadata,
        })
    }

    /// Streaming response with the same tool-use loop.
    ///
    /// Text deltas are forwarded as they arrive; each round closes with its
    /// own metadata event; tool calls are intercepted, executed, and fed
    /// into the next round. Dropping the stream aborts the in-flight vendor
    /// call.
    pub fn generate_stream(
        &self,
        messages: Vec<Message>,
        system_prompt: Option<String>,
        overrides: Option<InferenceParams>,
    ) -> EventStream {
        let this = self.clone();
        Box::pin(stream! {
            let params = overrides.unwrap_or_else(|| this.params.clone());
            let mut conversation = messages;

            for round in 1..=this.max_tool_rounds {
                let round_stream = this
                    .adapter
                    .send_stream(RoundRequest {
                        messages: &conversation,
                        system_prompt: system_prompt.as_deref(),
                        params: &params,
                        tools: &this.tool_specs,
                    })
                    .await;
                let mut round_stream = match round_stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                let mut round_text = String::new();
                let mut tool_calls: Vec<ToolCall> = Vec::new();

                while let Some(event) = round_stream.next().await {
                    match event {
                        Ok(StreamEvent::Content(ContentChunk::Text(text))) => {
                            round_text.push_str(&text);
                            yield Ok(StreamEvent::Content(ContentChunk::Text(text)));
                        }
                        Ok(StreamEvent::Content(ContentChunk::ToolUse(call))) => {
                            tool_calls.push(call);
                        }
                        Ok(StreamEvent::Content(ContentChunk::File(path))) => {
                            yield Ok(StreamEvent::Content(ContentChunk::File(path)));
                        }
                        Ok(StreamEvent::Metadata(metadata)) => {
                            yield Ok(StreamEvent::Metadata(metadata));
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }

                if tool_calls.is_empty() {
                    return;
                }
                if round == this.max_tool_rounds {
                    warn!(
                        model = this.adapter.model_id(),
                        rounds = this.max_tool_rounds,
                        "Tool-use round limit reached mid-stream"
                    );
                    return;
                }

                debug!(round, calls = tool_calls.len(), "Tool use requested mid-stream");
                let files = this
                    .run_tools(&mut conversation, round_text, tool_calls)
                    .await;
                for path in files {
                    yield Ok(StreamEvent::Content(ContentChunk::File(path)));
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::mock::{MockAdapter, MockRound};
    use crate::llm::provider::StopReason;
    use crate::tools::{SchemaBuilder, Tool, ToolHandler, ToolSpec};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct StaticTool {
        payload: Value,
    }

    #[async_trait]
    impl ToolHandler for StaticTool {
        async fn call(&self, _input: Value) -> crate::error::Result<Value> {
            Ok(self.payload.clone())
        }
    }

    fn registry_with(name: &str, payload: Value) -> Arc<ToolRegistry> {
        let registry = ToolRegistry::new();
        registry.register(Tool::new(
            ToolSpec {
                name: name.to_string(),
                description: "test tool".to_string(),
                input_schema: SchemaBuilder::new().build(),
            },
            Arc::new(StaticTool { payload }),
        ));
        Arc::new(registry)
    }

    fn provider_with(adapter: MockAdapter, registry: Arc<ToolRegistry>, tools: &[&str]) -> Provider {
        let names: Vec<String> = tools.iter().map(|s| s.to_string()).collect();
        Provider::new(
            Arc::new(adapter),
            registry,
            &names,
            InferenceParams::default(),
        )
    }

    #[tokio::test]
    async fn test_generate_plain_text() {
        let adapter = MockAdapter::new().with_response("plain answer");
        let provider = provider_with(adapter, Arc::new(ToolRegistry::new()), &[]);

        let reply = provider
            .generate(vec![Message::user("hi")], None, None)
            .await
            .unwrap();
        assert_eq!(reply.text, "plain answer");
        assert!(reply.files.is_empty());
    }

    #[tokio::test]
    async fn test_generate_runs_tool_loop() {
        let adapter = MockAdapter::new().with_tool_call_then_text(
            "probe",
            json!({"q": 1}),
            "final answer",
        );
        let registry = registry_with("probe", json!({"observation": "ok"}));
        let provider = provider_with(adapter.clone(), registry, &["probe"]);

        let reply = provider
            .generate(vec![Message::user("go")], None, None)
            .await
            .unwrap();

        assert_eq!(reply.text, "final answer");
        assert_eq!(adapter.call_count(), 2);

        // Second round must carry the assistant tool-use and the paired result
        let second = adapter.recorded_rounds()[1].clone();
        assert_eq!(second.messages.len(), 3);
        let call_id = second.messages[1].tool_calls()[0].id.clone();
        match &second.messages[2].content {
            crate::llm::message::MessageContent::Blocks(blocks) => match &blocks[0] {
                crate::llm::message::ContentBlock::ToolResult(result) => {
                    assert_eq!(result.call_id, call_id);
                    assert!(!result.is_error);
                }
                other => panic!("Expected tool result, got {:?}", other),
            },
            other => panic!("Expected blocks, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_tool_failure_becomes_error_result() {
        let adapter = MockAdapter::new().with_tool_call_then_text(
            "missing_tool",
            json!({}),
            "degraded answer",
        );
        // Registry has no such tool: execute returns an error payload
        let provider = provider_with(adapter.clone(), Arc::new(ToolRegistry::new()), &[]);

        let reply = provider
            .generate(vec![Message::user("go")], None, None)
            .await
            .unwrap();
        assert_eq!(reply.text, "degraded answer");

        let second = adapter.recorded_rounds()[1].clone();
        match &second.messages[2].content {
            crate::llm::message::MessageContent::Blocks(blocks) => match &blocks[0] {
                crate::llm::message::ContentBlock::ToolResult(result) => {
                    assert!(result.is_error);
                }
                other => panic!("Expected tool result, got {:?}", other),
            },
            other => panic!("Expected blocks, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_bounded_rounds() {
        // Every round requests another tool call; the loop must terminate
        let endless = MockRound {
            text: "thinking...".to_string(),
            tool_calls: vec![ToolCall {
                id: "toolu_loop".to_string(),
                name: "probe".to_string(),
                input: json!({}),
            }],
            stop_reason: StopReason::ToolUse,
            ..Default::default()
        };
        let adapter = MockAdapter::new().with_rounds(vec![endless]);
        let registry = registry_with("probe", json!({"ok": true}));
        let provider = provider_with(adapter.clone(), registry, &["probe"]);

        let reply = provider
            .generate(vec![Message::user("go")], None, None)
            .await
            .unwrap();

        assert_eq!(adapter.call_count() as u32, MAX_TOOL_ROUNDS);
        // Best partial text survives the bound
        assert_eq!(reply.text, "thinking...");
    }

    #[tokio::test]
    async fn test_generate_merges_usage_across_rounds() {
        let adapter = MockAdapter::new().with_tool_call_then_text("probe", json!({}), "done");
        let registry = registry_with("probe", json!({"ok": true}));
        let provider = provider_with(adapter, registry, &["probe"]);

        let reply = provider
            .generate(vec![Message::user("go")], None, None)
            .await
            .unwrap();
        // Two rounds of the mock's 10/20 usage
        let usage = reply.metadata.usage.unwrap();
        assert_eq!(usage.input_tokens, 20);
        assert_eq!(usage.output_tokens, 40);
    }

    #[tokio::test]
    async fn test_generate_collects_tool_files() {
        let adapter = MockAdapter::new().with_tool_call_then_text(
            "painter",
            json!({"prompt": "a cat"}),
            "Here is your image.",
        );
        let registry = registry_with(
            "painter",
            json!({"text": "saved", "file_path": "/tmp/cat.png"}),
        );
        let provider = provider_with(adapter, registry, &["painter"]);

        let reply = provider
            .generate(vec![Message::user("draw a cat")], None, None)
            .await
            .unwrap();
        assert_eq!(reply.files, vec!["/tmp/cat.png"]);
    }

    #[tokio::test]
    async fn test_stream_matches_generate_text() {
        // Referential consistency: same scripted rounds, same final text
        let make_adapter = || {
            MockAdapter::new().with_tool_call_then_text("probe", json!({}), "streamed answer")
        };
        let registry = registry_with("probe", json!({"ok": true}));

        let provider = provider_with(make_adapter(), registry.clone(), &["probe"]);
        let reply = provider
            .generate(vec![Message::user("go")], None, None)
            .await
            .unwrap();

        let provider = provider_with(make_adapter(), registry, &["probe"]);
        let mut stream =
            provider.generate_stream(vec![Message::user("go")], None, None);
        let mut streamed = String::new();
        while let Some(event) = stream.next().await {
            if let StreamEvent::Content(ContentChunk::Text(text)) = event.unwrap() {
                streamed.push_str(&text);
            }
        }

        assert_eq!(streamed, reply.text);
    }

    #[tokio::test]
    async fn test_stream_round_metadata_per_round() {
        let adapter = MockAdapter::new().with_tool_call_then_text("probe", json!({}), "done");
        let registry = registry_with("probe", json!({"ok": true}));
        let provider = provider_with(adapter, registry, &["probe"]);

        let mut stream = provider.generate_stream(vec![Message::user("go")], None, None);
        let mut metadata_events = 0;
        let mut last_event_was_metadata = false;
        while let Some(event) = stream.next().await {
            match event.unwrap() {
                StreamEvent::Metadata(_) => {
                    metadata_events += 1;
                    last_event_was_metadata = true;
                }
                _ => last_event_was_metadata = false,
            }
        }
        // One terminal metadata per round
        assert_eq!(metadata_events, 2);
        assert!(last_event_was_metadata);
    }

    #[tokio::test]
    async fn test_stream_yields_file_chunks() {
        let adapter = MockAdapter::new().with_tool_call_then_text(
            "painter",
            json!({}),
            "image ready",
        );
        let registry = registry_with("painter", json!({"file_path": "/tmp/out.png"}));
        let provider = provider_with(adapter, registry, &["painter"]);

        let mut stream = provider.generate_stream(vec![Message::user("draw")], None, None);
        let mut files = Vec::new();
        while let Some(event) = stream.next().await {
            if let StreamEvent::Content(ContentChunk::File(path)) = event.unwrap() {
                files.push(path);
            }
        }
        assert_eq!(files, vec!["/tmp/out.png"]);
    }

    #[tokio::test]
    async fn test_stream_vendor_error_surfaces() {
        let adapter = MockAdapter::new()
            .with_error(crate::error::ProviderError::timeout("deadline"));
        let provider = provider_with(adapter, Arc::new(ToolRegistry::new()), &[]);

        let mut stream = provider.generate_stream(vec![Message::user("hi")], None, None);
        let first = stream.next().await.unwrap();
        assert!(first.is_err());
        assert_eq!(first.unwrap_err().code, crate::error::ErrorCode::Timeout);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_overrides_win_over_defaults() {
        let adapter = MockAdapter::new().with_response("ok");
        let provider = provider_with(adapter.clone(), Arc::new(ToolRegistry::new()), &[]);

        let overrides = InferenceParams::default().with_temperature(0.0);
        provider
            .generate(vec![Message::user("hi")], Some("sys"), Some(&overrides))
            .await
            .unwrap();

        let recorded = adapter.last_round().unwrap();
        assert_eq!(recorded.system_prompt.as_deref(), Some("sys"));
    }
}
