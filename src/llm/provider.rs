// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Provider adapter trait and the neutral event model
//!
//! Each vendor adapter translates the neutral message/parameter model into
//! its own wire format for exactly one conversational round; the tool-use
//! loop across rounds lives in the orchestrator.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::llm::message::{Message, ToolCall};
use crate::llm::params::InferenceParams;
use crate::llm::registry::Vendor;
use crate::tools::ToolSpec;

/// Why the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of message
    EndTurn,
    /// Hit max tokens
    MaxTokens,
    /// Wants to use a tool
    ToolUse,
    /// Stop sequence hit
    StopSequence,
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Vendor-reported timing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// Terminal metadata for one round; merged across tool-use rounds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,
}

impl ResponseMetadata {
    /// Fold a later round into this one: usage accumulates, stop reason and
    /// metrics take the most recent round's values.
    pub fn merge(&mut self, other: &ResponseMetadata) {
        if let Some(other_usage) = other.usage {
            let usage = self.usage.get_or_insert_with(Usage::default);
            usage.input_tokens += other_usage.input_tokens;
            usage.output_tokens += other_usage.output_tokens;
        }
        if other.stop_reason.is_some() {
            self.stop_reason = other.stop_reason;
        }
        if other.metrics.is_some() {
            self.metrics = other.metrics;
        }
    }
}

/// Incremental content produced during streaming
#[derive(Debug, Clone, PartialEq)]
pub enum ContentChunk {
    /// A text delta
    Text(String),
    /// A completed tool call (partial input JSON is assembled by the adapter)
    ToolUse(ToolCall),
    /// A file produced by a tool (e.g. a generated image path)
    File(String),
}

/// The neutral unit emitted by every adapter during streaming.
///
/// Per streamed round: zero or more `Content` events, then exactly one
/// terminal `Metadata` event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Content(ContentChunk),
    Metadata(ResponseMetadata),
}

/// Stream of neutral events for one round
pub type EventStream =
    Pin<Box<dyn Stream<Item = std::result::Result<StreamEvent, ProviderError>> + Send>>;

/// Everything an adapter needs for one wire round
#[derive(Debug, Clone, Copy)]
pub struct RoundRequest<'a> {
    pub messages: &'a [Message],
    pub system_prompt: Option<&'a str>,
    pub params: &'a InferenceParams,
    pub tools: &'a [ToolSpec],
}

/// Result of one non-streaming wire round
#[derive(Debug, Clone, Default)]
pub struct RoundOutcome {
    /// Text content, possibly empty when the round is pure tool use
    pub text: String,
    /// Tool calls requested by the model
    pub tool_calls: Vec<ToolCall>,
    /// Usage, stop reason, metrics for the round
    pub metadata: ResponseMetadata,
}

impl RoundOutcome {
    pub fn wants_tool_use(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// One vendor adapter: neutral model in, neutral events out.
///
/// Adapters hold no per-call mutable state; a single instance may serve
/// concurrent requests.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Which vendor this adapter speaks to
    fn vendor(&self) -> Vendor;

    /// The model this adapter was constructed for
    fn model_id(&self) -> &str;

    /// One non-streaming request/response round
    async fn send(
        &self,
        round: RoundRequest<'_>,
    ) -> std::result::Result<RoundOutcome, ProviderError>;

    /// One streaming round, normalized into the neutral event order
    async fn send_stream(
        &self,
        round: RoundRequest<'_>,
    ) -> std::result::Result<EventStream, ProviderError>;
}
