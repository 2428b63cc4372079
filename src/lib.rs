// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Palaver - multi-provider LLM conversation core.
//!
//! Normalizes heterogeneous vendor streaming and tool-call protocols into
//! one internal event model, drives the bounded model → tool → model loop
//! under streaming, and manages provider lifecycle and session-scoped model
//! selection.
//!
//! Architecture highlights:
//! - `llm`: neutral message/parameter model, vendor adapters
//!   (Bedrock Converse/Invoke, Gemini, OpenAI), orchestrator, factory
//! - `tools`: tool registry with lazy builtins and failure isolation
//! - `service`: session-aware chat/gen/draw services, thinking scanner
//! - `config`: read-only per-module settings registry

pub mod config;
pub mod error;
pub mod llm;
pub mod service;
pub mod tools;

pub use error::{ErrorCode, PalaverError, ProviderError, Result};
