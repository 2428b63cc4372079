// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! LLM abstraction layer
//!
//! Neutral message/parameter model, the adapter trait, vendor adapters,
//! the tool-use orchestrator, and the provider factory.

pub mod factory;
pub mod message;
pub mod orchestrator;
pub mod params;
pub mod provider;
pub mod providers;
pub mod registry;

pub use factory::{ImageProvider, ProviderCache, ProviderCredentials, ProviderFactory, ProviderHandle};
pub use message::{ContentBlock, Message, MessageContent, Role, ToolCall, ToolResult};
pub use orchestrator::{LlmReply, Provider, MAX_TOOL_ROUNDS};
pub use params::{ImageParams, InferenceParams, ModelParams};
pub use provider::{
    ContentChunk, EventStream, Metrics, ProviderAdapter, ResponseMetadata, RoundOutcome,
    RoundRequest, StopReason, StreamEvent, Usage,
};
pub use registry::{ModelCapabilities, ModelCategory, ModelEntry, ModelRegistry, Modality, Vendor};
