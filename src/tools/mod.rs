// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool system
//!
//! Maps tool names to JSON schemas and async handlers. Builtin tools are
//! registered from a static name map and lazily instantiated on first
//! lookup; the registry is immutable once a conversation starts using it.
//!
//! Tool failures never abort a conversation: `execute_tool` converts every
//! handler error into an `{"error": ...}` payload that is fed back to the
//! model as an error tool result.

pub mod builtin;
pub mod schema;

pub use schema::SchemaBuilder;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::Result;

/// Declared interface of one tool
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolSpec {
    /// Unique name within the registry
    pub name: String,
    /// Description shown to the model
    pub description: String,
    /// JSON Schema for the input object
    pub input_schema: Value,
}

/// Executable side of a tool
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool against its input object.
    ///
    /// Network handlers bound their own latency (clients are built with
    /// explicit timeouts); the registry imposes no global deadline.
    async fn call(&self, input: Value) -> Result<Value>;
}

/// A registered tool: spec plus handler
#[derive(Clone)]
pub struct Tool {
    pub spec: ToolSpec,
    pub handler: Arc<dyn ToolHandler>,
}

impl Tool {
    pub fn new(spec: ToolSpec, handler: Arc<dyn ToolHandler>) -> Self {
        Self { spec, handler }
    }
}

type ToolBuilder = fn() -> Tool;

/// Registry mapping tool names to specs and handlers.
///
/// Builtins are lazily constructed on first lookup from `BUILTIN_TOOLS`;
/// configured tools (e.g. image generation, which needs a provider handle)
/// are registered eagerly with [`ToolRegistry::register`].
pub struct ToolRegistry {
    builders: HashMap<&'static str, ToolBuilder>,
    loaded: Mutex<HashMap<String, Tool>>,
}

/// Static name map of builtin tools
const BUILTIN_TOOLS: &[(&str, ToolBuilder)] = &[
    ("get_weather", builtin::weather::build),
    ("get_text_from_url", builtin::web::build),
    ("search_wikipedia", builtin::search::build),
    ("get_current_time", builtin::time::build),
];

impl ToolRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            builders: HashMap::new(),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Registry with the builtin tool map installed
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for &(name, builder) in BUILTIN_TOOLS {
            registry.builders.insert(name, builder);
        }
        registry
    }

    /// Eagerly register a constructed tool (replaces any same-named entry)
    pub fn register(&self, tool: Tool) {
        let mut loaded = self.loaded.lock().expect("tool registry lock");
        debug!(tool = %tool.spec.name, "Registered tool");
        loaded.insert(tool.spec.name.clone(), tool);
    }

    /// Look up a tool, lazily building it on first access
    fn get(&self, name: &str) -> Option<Tool> {
        let mut loaded = self.loaded.lock().expect("tool registry lock");
        if let Some(tool) = loaded.get(name) {
            return Some(tool.clone());
        }
        let builder = self.builders.get(name)?;
        let tool = builder();
        debug!(tool = name, "Loaded builtin tool");
        loaded.insert(name.to_string(), tool.clone());
        Some(tool)
    }

    /// Get the spec for a tool, or `None` (with a log line) when unknown
    pub fn get_tool_spec(&self, name: &str) -> Option<ToolSpec> {
        match self.get(name) {
            Some(tool) => Some(tool.spec),
            None => {
                warn!(tool = name, "No specification found for tool");
                None
            }
        }
    }

    /// Resolve enabled tool names into specs; missing names are logged and
    /// skipped, never fatal.
    pub fn resolve_specs(&self, names: &[String]) -> Vec<ToolSpec> {
        names
            .iter()
            .filter_map(|name| self.get_tool_spec(name))
            .collect()
    }

    /// Execute a tool by name.
    ///
    /// Always returns a payload: handler failures and unknown tools come
    /// back as `{"error": "<message>"}` so the conversation can continue.
    pub async fn execute_tool(&self, name: &str, input: Value) -> Value {
        let tool = match self.get(name) {
            Some(tool) => tool,
            None => {
                warn!(tool = name, "Tool not found");
                return serde_json::json!({ "error": format!("Tool not found: {}", name) });
            }
        };

        match tool.handler.call(input).await {
            Ok(result) => result,
            Err(e) => {
                error!(tool = name, error = %e, "Tool execution failed");
                serde_json::json!({ "error": e.to_string() })
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
