// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mock provider adapter for testing
//!
//! A configurable implementation of the adapter trait that can be scripted
//! with rounds and records every request, so orchestration and service
//! logic can be tested without real vendor calls.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::error::ProviderError;
use crate::llm::message::{Message, ToolCall};
use crate::llm::provider::{
    ContentChunk, EventStream, ProviderAdapter, ResponseMetadata, RoundOutcome, RoundRequest,
    StopReason, StreamEvent, Usage,
};
use crate::llm::registry::Vendor;

/// One scripted round for the mock adapter
#[derive(Clone, Debug)]
pub struct MockRound {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

impl Default for MockRound {
    fn default() -> Self {
        Self {
            text: "Mock response".to_string(),
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage: Usage {
                input_tokens: 10,
                output_tokens: 20,
            },
        }
    }
}

/// Snapshot of one request made against the mock
#[derive(Clone, Debug)]
pub struct RecordedRound {
    pub messages: Vec<Message>,
    pub system_prompt: Option<String>,
    pub tool_names: Vec<String>,
}

/// A mock adapter with scripted rounds
#[derive(Clone)]
pub struct MockAdapter {
    model_id: String,
    rounds: Arc<Mutex<Vec<MockRound>>>,
    error: Arc<Mutex<Option<ProviderError>>>,
    call_count: Arc<AtomicUsize>,
    recorded: Arc<Mutex<Vec<RecordedRound>>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self {
            model_id: "mock-model".to_string(),
            rounds: Arc::new(Mutex::new(vec![MockRound::default()])),
            error: Arc::new(Mutex::new(None)),
            call_count: Arc::new(AtomicUsize::new(0)),
            recorded: Arc::new(Mutex::new(vec![])),
        }
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Script a single text response
    pub fn with_response(self, text: impl Into<String>) -> Self {
        *self.rounds.lock().unwrap() = vec![MockRound {
            text: text.into(),
            ..Default::default()
        }];
        self
    }

    /// Script several rounds, returned in order (last one repeats)
    pub fn with_rounds(self, rounds: Vec<MockRound>) -> Self {
        *self.rounds.lock().unwrap() = rounds;
        self
    }

    /// Script a first round that requests a tool, then a final text round
    pub fn with_tool_call_then_text(
        self,
        tool_name: impl Into<String>,
        input: serde_json::Value,
        final_text: impl Into<String>,
    ) -> Self {
        *self.rounds.lock().unwrap() = vec![
            MockRound {
                text: String::new(),
                tool_calls: vec![ToolCall {
                    id: format!("toolu_{}", uuid::Uuid::new_v4().simple()),
                    name: tool_name.into(),
                    input,
                }],
                stop_reason: StopReason::ToolUse,
                ..Default::default()
            },
            MockRound {
                text: final_text.into(),
                ..Default::default()
            },
        ];
        self
    }

    /// Make every call fail with this error
    pub fn with_error(self, error: ProviderError) -> Self {
        *self.error.lock().unwrap() = Some(error);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn recorded_rounds(&self) -> Vec<RecordedRound> {
        self.recorded.lock().unwrap().clone()
    }

    pub fn last_round(&self) -> Option<RecordedRound> {
        self.recorded.lock().unwrap().last().cloned()
    }

    fn record(&self, round: &RoundRequest<'_>) {
        self.recorded.lock().unwrap().push(RecordedRound {
            messages: round.messages.to_vec(),
            system_prompt: round.system_prompt.map(|s| s.to_string()),
            tool_names: round.tools.iter().map(|t| t.name.clone()).collect(),
        });
    }

    fn next_round(&self) -> MockRound {
        let count = self.call_count.fetch_add(1, Ordering::SeqCst);
        let rounds = self.rounds.lock().unwrap();
        if rounds.is_empty() {
            MockRound::default()
        } else {
            rounds[count.min(rounds.len() - 1)].clone()
        }
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::OpenAi
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn send(&self, round: RoundRequest<'_>) -> Result<RoundOutcome, ProviderError> {
        self.record(&round);
        if let Some(error) = self.error.lock().unwrap().clone() {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            return Err(error);
        }
        let scripted = self.next_round();
        Ok(RoundOutcome {
            text: scripted.text,
            tool_calls: scripted.tool_calls,
            metadata: ResponseMetadata {
                usage: Some(scripted.usage),
                stop_reason: Some(scripted.stop_reason),
                metrics: None,
            },
        })
    }

    async fn send_stream(&self, round: RoundRequest<'_>) -> Result<EventStream, ProviderError> {
        self.record(&round);
        if let Some(error) = self.error.lock().unwrap().clone() {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            return Err(error);
        }
        let scripted = self.next_round();

        let mut events: Vec<Result<StreamEvent, ProviderError>> = Vec::new();
        // Deltas of a few characters each, like a real stream
        for chunk in scripted.text.chars().collect::<Vec<_>>().chunks(5) {
            events.push(Ok(StreamEvent::Content(ContentChunk::Text(
                chunk.iter().collect(),
            ))));
        }
        for call in scripted.tool_calls {
            events.push(Ok(StreamEvent::Content(ContentChunk::ToolUse(call))));
        }
        events.push(Ok(StreamEvent::Metadata(ResponseMetadata {
            usage: Some(scripted.usage),
            stop_reason: Some(scripted.stop_reason),
            metrics: None,
        })));

        Ok(Box::pin(stream::iter(events)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::params::InferenceParams;
    use futures::StreamExt;

    fn round<'a>(messages: &'a [Message], params: &'a InferenceParams) -> RoundRequest<'a> {
        RoundRequest {
            messages,
            system_prompt: None,
            params,
            tools: &[],
        }
    }

    #[tokio::test]
    async fn test_mock_send() {
        let adapter = MockAdapter::new().with_response("scripted");
        let params = InferenceParams::default();
        let messages = vec![Message::user("hi")];
        let outcome = adapter.send(round(&messages, &params)).await.unwrap();
        assert_eq!(outcome.text, "scripted");
        assert_eq!(adapter.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_records_requests() {
        let adapter = MockAdapter::new();
        let params = InferenceParams::default();
        let messages = vec![Message::user("first")];
        adapter.send(round(&messages, &params)).await.unwrap();

        let recorded = adapter.last_round().unwrap();
        assert_eq!(recorded.messages[0].text(), Some("first"));
    }

    #[tokio::test]
    async fn test_mock_rounds_repeat_last() {
        let adapter = MockAdapter::new().with_rounds(vec![
            MockRound {
                text: "one".to_string(),
                ..Default::default()
            },
            MockRound {
                text: "two".to_string(),
                ..Default::default()
            },
        ]);
        let params = InferenceParams::default();
        let messages = vec![Message::user("hi")];
        assert_eq!(
            adapter.send(round(&messages, &params)).await.unwrap().text,
            "one"
        );
        assert_eq!(
            adapter.send(round(&messages, &params)).await.unwrap().text,
            "two"
        );
        assert_eq!(
            adapter.send(round(&messages, &params)).await.unwrap().text,
            "two"
        );
    }

    #[tokio::test]
    async fn test_mock_stream_order() {
        let adapter = MockAdapter::new().with_response("Hello world");
        let params = InferenceParams::default();
        let messages = vec![Message::user("hi")];
        let mut stream = adapter.send_stream(round(&messages, &params)).await.unwrap();

        let mut text = String::new();
        let mut saw_metadata_last = false;
        while let Some(event) = stream.next().await {
            match event.unwrap() {
                StreamEvent::Content(ContentChunk::Text(t)) => {
                    assert!(!saw_metadata_last);
                    text.push_str(&t);
                }
                StreamEvent::Metadata(_) => saw_metadata_last = true,
                _ => {}
            }
        }
        assert_eq!(text, "Hello world");
        assert!(saw_metadata_last);
    }

    #[tokio::test]
    async fn test_mock_error_injection() {
        let adapter =
            MockAdapter::new().with_error(ProviderError::rate_limited("scripted throttle"));
        let params = InferenceParams::default();
        let messages = vec![Message::user("hi")];
        let err = adapter.send(round(&messages, &params)).await.unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::RateLimited);
    }
}
