// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool input schema helper
//!
//! Builds the JSON Schema objects adapters hand to the vendors.

use serde_json::Value;

/// Helper to create a tool input schema
pub struct SchemaBuilder {
    properties: serde_json::Map<String, Value>,
    required: Vec<String>,
}

impl SchemaBuilder {
    /// Create a new schema builder
    pub fn new() -> Self {
        Self {
            properties: serde_json::Map::new(),
            required: vec![],
        }
    }

    /// Add a string property
    pub fn string(mut self, name: &str, description: &str, required: bool) -> Self {
        self.properties.insert(
            name.to_string(),
            serde_json::json!({
                "type": "string",
                "description": description
            }),
        );
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    /// Add an integer property
    pub fn integer(mut self, name: &str, description: &str, required: bool) -> Self {
        self.properties.insert(
            name.to_string(),
            serde_json::json!({
                "type": "integer",
                "description": description
            }),
        );
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    /// Add a number property
    pub fn number(mut self, name: &str, description: &str, required: bool) -> Self {
        self.properties.insert(
            name.to_string(),
            serde_json::json!({
                "type": "number",
                "description": description
            }),
        );
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    /// Add a boolean property
    pub fn boolean(mut self, name: &str, description: &str, required: bool) -> Self {
        self.properties.insert(
            name.to_string(),
            serde_json::json!({
                "type": "boolean",
                "description": description
            }),
        );
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    /// Build the schema object
    pub fn build(self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": Value::Object(self.properties),
            "required": self.required,
        })
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_builder_empty() {
        let schema = SchemaBuilder::new().build();
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_schema_builder_string_required() {
        let schema = SchemaBuilder::new()
            .string("place", "City or region name", true)
            .build();
        assert_eq!(schema["properties"]["place"]["type"], "string");
        assert_eq!(schema["required"][0], "place");
    }

    #[test]
    fn test_schema_builder_optional_not_required() {
        let schema = SchemaBuilder::new()
            .integer("limit", "Max results", false)
            .build();
        assert!(schema["required"].as_array().unwrap().is_empty());
        assert_eq!(schema["properties"]["limit"]["type"], "integer");
    }

    #[test]
    fn test_schema_builder_mixed() {
        let schema = SchemaBuilder::new()
            .string("url", "Page to fetch", true)
            .boolean("raw", "Skip extraction", false)
            .number("timeout", "Seconds", false)
            .build();
        let props = schema["properties"].as_object().unwrap();
        assert_eq!(props.len(), 3);
        assert_eq!(schema["required"].as_array().unwrap().len(), 1);
    }
}
