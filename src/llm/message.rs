// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Vendor-neutral message types
//!
//! One `Message` is one turn in a conversation. Adapters translate these
//! into their own wire formats; nothing vendor-specific lives here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Role of the message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message
    User,
    /// Assistant response
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A tool invocation requested by the model.
///
/// The `id` correlates the eventual result back to this call in the vendor
/// wire protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// The answer to a single [`ToolCall`], fed back into the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub call_id: String,
    pub is_error: bool,
    pub payload: serde_json::Value,
}

impl ToolResult {
    /// Successful result for a call
    pub fn ok(call_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            call_id: call_id.into(),
            is_error: false,
            payload,
        }
    }

    /// Error result for a call
    pub fn error(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            is_error: true,
            payload: serde_json::Value::String(message.into()),
        }
    }

    /// Render the payload as plain text for vendors that only take strings
    pub fn payload_text(&self) -> String {
        match &self.payload {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// A block of content within a message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Text content
    Text { text: String },

    /// A file attachment referenced by path
    File { path: String },

    /// Tool use request from the assistant
    ToolUse(ToolCall),

    /// Tool result from the user side
    ToolResult(ToolResult),
}

/// Content of a message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Simple text content
    Text(String),
    /// Multiple content blocks (text, files, tool use, tool result)
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Convert content to blocks format
    pub fn into_blocks(self) -> Vec<ContentBlock> {
        match self {
            MessageContent::Text(text) => vec![ContentBlock::Text { text }],
            MessageContent::Blocks(blocks) => blocks,
        }
    }

    /// Get as text if it's a simple text content
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(text),
            MessageContent::Blocks(_) => None,
        }
    }

    /// True when no block carries anything
    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(text) => text.trim().is_empty(),
            MessageContent::Blocks(blocks) => blocks.iter().all(|b| match b {
                ContentBlock::Text { text } => text.trim().is_empty(),
                _ => false,
            }),
        }
    }
}

/// One turn in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: Role,

    /// Content of the message
    pub content: MessageContent,

    /// Auxiliary key/value pairs (timestamp, user name, ...) rendered by
    /// adapters as a prefix text block; never persisted as model output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<BTreeMap<String, String>>,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(content.into()),
            context: None,
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(content.into()),
            context: None,
        }
    }

    /// Create a message from content blocks
    pub fn blocks(role: Role, blocks: Vec<ContentBlock>) -> Self {
        Self {
            role,
            content: MessageContent::Blocks(blocks),
            context: None,
        }
    }

    /// Assistant message carrying optional leading text plus tool calls
    pub fn assistant_tool_use(text: Option<String>, calls: Vec<ToolCall>) -> Self {
        let mut blocks = Vec::new();
        if let Some(text) = text.filter(|t| !t.is_empty()) {
            blocks.push(ContentBlock::Text { text });
        }
        blocks.extend(calls.into_iter().map(ContentBlock::ToolUse));
        Self::blocks(Role::Assistant, blocks)
    }

    /// User message answering tool calls
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self::blocks(
            Role::User,
            results.into_iter().map(ContentBlock::ToolResult).collect(),
        )
    }

    /// Attach context key/value pairs
    pub fn with_context(mut self, context: BTreeMap<String, String>) -> Self {
        if !context.is_empty() {
            self.context = Some(context);
        }
        self
    }

    /// Get the first text content of the message, if any
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(text) => Some(text),
            MessageContent::Blocks(blocks) => blocks.iter().find_map(|block| {
                if let ContentBlock::Text { text } = block {
                    Some(text.as_str())
                } else {
                    None
                }
            }),
        }
    }

    /// All tool calls in the message
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        match &self.content {
            MessageContent::Text(_) => vec![],
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| {
                    if let ContentBlock::ToolUse(call) = block {
                        Some(call)
                    } else {
                        None
                    }
                })
                .collect(),
        }
    }

    /// All file attachment paths in the message
    pub fn files(&self) -> Vec<&str> {
        match &self.content {
            MessageContent::Text(_) => vec![],
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| {
                    if let ContentBlock::File { path } = block {
                        Some(path.as_str())
                    } else {
                        None
                    }
                })
                .collect(),
        }
    }

    /// Render the context map as a prefix text block.
    ///
    /// Keys go from snake_case to readable labels, values are joined with
    /// " | " under a "Context Information:" heading, mirroring how modules
    /// hand user metadata to the model.
    pub fn context_prefix(&self) -> Option<String> {
        let context = self.context.as_ref()?;
        let items: Vec<String> = context
            .iter()
            .map(|(key, value)| {
                let mut readable = key.replace('_', " ");
                if let Some(first) = readable.get_mut(0..1) {
                    first.make_ascii_uppercase();
                }
                format!("{}: {}", readable, value)
            })
            .collect();
        if items.is_empty() {
            return None;
        }
        Some(format!("Context Information:\n{}\n", items.join(" | ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_user() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), Some("Hello"));
        assert!(msg.context.is_none());
    }

    #[test]
    fn test_message_assistant() {
        let msg = Message::assistant("Hi there");
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.text(), Some("Hi there"));
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }

    #[test]
    fn test_assistant_tool_use_with_text() {
        let msg = Message::assistant_tool_use(
            Some("Checking the weather".to_string()),
            vec![ToolCall {
                id: "call_1".to_string(),
                name: "get_weather".to_string(),
                input: json!({"place": "Tokyo"}),
            }],
        );
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.text(), Some("Checking the weather"));
        assert_eq!(msg.tool_calls().len(), 1);
        assert_eq!(msg.tool_calls()[0].name, "get_weather");
    }

    #[test]
    fn test_assistant_tool_use_without_text() {
        let msg = Message::assistant_tool_use(
            None,
            vec![ToolCall {
                id: "call_1".to_string(),
                name: "get_weather".to_string(),
                input: json!({}),
            }],
        );
        assert!(msg.text().is_none());
        assert_eq!(msg.tool_calls().len(), 1);
    }

    #[test]
    fn test_tool_results_message() {
        let msg = Message::tool_results(vec![ToolResult::ok("call_1", json!({"temp": 18}))]);
        assert_eq!(msg.role, Role::User);
        if let MessageContent::Blocks(blocks) = &msg.content {
            assert!(matches!(blocks[0], ContentBlock::ToolResult(_)));
        } else {
            panic!("Expected blocks content");
        }
    }

    #[test]
    fn test_tool_result_error() {
        let result = ToolResult::error("call_1", "connection refused");
        assert!(result.is_error);
        assert_eq!(result.payload_text(), "connection refused");
    }

    #[test]
    fn test_tool_result_payload_text_json() {
        let result = ToolResult::ok("call_1", json!({"a": 1}));
        assert_eq!(result.payload_text(), "{\"a\":1}");
    }

    #[test]
    fn test_message_files() {
        let msg = Message::blocks(
            Role::User,
            vec![
                ContentBlock::Text {
                    text: "look at this".to_string(),
                },
                ContentBlock::File {
                    path: "/tmp/photo.png".to_string(),
                },
            ],
        );
        assert_eq!(msg.files(), vec!["/tmp/photo.png"]);
        assert_eq!(msg.text(), Some("look at this"));
    }

    #[test]
    fn test_context_prefix() {
        let mut context = BTreeMap::new();
        context.insert("user_name".to_string(), "rob".to_string());
        context.insert("local_time".to_string(), "09:15".to_string());
        let msg = Message::user("hi").with_context(context);

        let prefix = msg.context_prefix().unwrap();
        assert!(prefix.starts_with("Context Information:\n"));
        assert!(prefix.contains("User name: rob"));
        assert!(prefix.contains("Local time: 09:15"));
        assert!(prefix.contains(" | "));
    }

    #[test]
    fn test_context_prefix_absent() {
        assert!(Message::user("hi").context_prefix().is_none());
    }

    #[test]
    fn test_with_context_empty_map_ignored() {
        let msg = Message::user("hi").with_context(BTreeMap::new());
        assert!(msg.context.is_none());
    }

    #[test]
    fn test_content_is_empty() {
        assert!(MessageContent::Text("   ".to_string()).is_empty());
        assert!(!MessageContent::Text("hi".to_string()).is_empty());
        assert!(MessageContent::Blocks(vec![]).is_empty());
        assert!(!MessageContent::Blocks(vec![ContentBlock::File {
            path: "/a.png".to_string()
        }])
        .is_empty());
    }

    #[test]
    fn test_content_into_blocks() {
        let blocks = MessageContent::Text("Hello".to_string()).into_blocks();
        assert_eq!(blocks.len(), 1);
        assert!(matches!(&blocks[0], ContentBlock::Text { text } if text == "Hello"));
    }

    #[test]
    fn test_message_serialization_roundtrip() {
        let msg = Message::assistant_tool_use(
            Some("text".to_string()),
            vec![ToolCall {
                id: "t1".to_string(),
                name: "search".to_string(),
                input: json!({"q": "rust"}),
            }],
        );
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.role, Role::Assistant);
        assert_eq!(parsed.tool_calls().len(), 1);
    }

    #[test]
    fn test_content_block_tool_use_tag() {
        let block = ContentBlock::ToolUse(ToolCall {
            id: "t1".to_string(),
            name: "search".to_string(),
            input: json!({}),
        });
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains("tool_use"));
    }
}
