// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Provider adapter implementations

pub mod bedrock_converse;
pub mod bedrock_invoke;
pub mod gemini;
pub mod mock;
pub mod openai;

pub use bedrock_converse::BedrockConverseAdapter;
pub use bedrock_invoke::{BedrockInvokeAdapter, GeneratedImage};
pub use gemini::GeminiAdapter;
pub use mock::{MockAdapter, MockRound};
pub use openai::OpenAiAdapter;
