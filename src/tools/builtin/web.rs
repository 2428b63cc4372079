// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Webpage-to-text tool
//!
//! Fetches a page through the Jina reader endpoint, which returns the
//! extracted title and readable content as JSON.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::error;

use crate::error::Result;
use crate::tools::{SchemaBuilder, Tool, ToolHandler, ToolSpec};

const READER_URL: &str = "https://r.jina.ai";
// Keep tool results bounded so they don't blow up the context window
const MAX_CONTENT_CHARS: usize = 12_000;

pub struct FetchUrlTool {
    client: reqwest::Client,
    reader_url: String,
}

impl FetchUrlTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("valid reqwest client config");
        Self {
            client,
            reader_url: READER_URL.to_string(),
        }
    }

    pub fn with_reader_url(mut self, reader_url: impl Into<String>) -> Self {
        self.reader_url = reader_url.into();
        self
    }

    fn truncate(content: &str) -> String {
        if content.len() <= MAX_CONTENT_CHARS {
            return content.to_string();
        }
        let mut end = MAX_CONTENT_CHARS;
        while !content.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &content[..end])
    }
}

impl Default for FetchUrlTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for FetchUrlTool {
    async fn call(&self, input: Value) -> Result<Value> {
        let Some(url) = input["url"].as_str().filter(|u| !u.trim().is_empty()) else {
            return Ok(json!({ "error": "URL is required" }));
        };

        let request_url = format!("{}/{}", self.reader_url.trim_end_matches('/'), url);
        let response = self
            .client
            .get(&request_url)
            .header("Accept", "application/json")
            .header("X-No-Cache", "true")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            error!(url, %status, "Webpage fetch failed");
            return Ok(json!({
                "error": format!("HTTP error occurred: {}", status)
            }));
        }

        let body: Value = response.json().await?;
        let data = &body["data"];
        let title = data["title"].as_str().unwrap_or_default();
        let content = data["content"].as_str().unwrap_or_default();

        Ok(json!({
            "title": title,
            "content": Self::truncate(content),
        }))
    }
}

/// Spec for the webpage tool
pub fn spec() -> ToolSpec {
    ToolSpec {
        name: "get_text_from_url".to_string(),
        description: "Extract readable text content from a webpage URL. Use this when asked to \
                      read, summarize, or analyze the content of a specific webpage. The URL \
                      should be a direct web address (e.g., 'https://example.com/article')."
            .to_string(),
        input_schema: SchemaBuilder::new()
            .string("url", "The webpage URL to convert to text", true)
            .build(),
    }
}

/// Build the registered tool
pub fn build() -> Tool {
    Tool::new(spec(), Arc::new(FetchUrlTool::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_shape() {
        let spec = spec();
        assert_eq!(spec.name, "get_text_from_url");
        assert_eq!(spec.input_schema["required"][0], "url");
    }

    #[test]
    fn test_truncate_short_content() {
        assert_eq!(FetchUrlTool::truncate("hello"), "hello");
    }

    #[test]
    fn test_truncate_long_content() {
        let long = "a".repeat(MAX_CONTENT_CHARS + 100);
        let truncated = FetchUrlTool::truncate(&long);
        assert!(truncated.len() < long.len());
        assert!(truncated.ends_with('…'));
    }

    #[tokio::test]
    async fn test_missing_url_is_soft_error() {
        let tool = FetchUrlTool::new();
        let result = tool.call(serde_json::json!({})).await.unwrap();
        assert_eq!(result["error"], "URL is required");
    }

    #[tokio::test]
    async fn test_fetch_against_mock() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "title": "Example", "content": "Readable body text" }
            })))
            .mount(&server)
            .await;

        let tool = FetchUrlTool::new().with_reader_url(server.uri());
        let result = tool
            .call(serde_json::json!({ "url": "https://example.com" }))
            .await
            .unwrap();
        assert_eq!(result["title"], "Example");
        assert_eq!(result["content"], "Readable body text");
    }

    #[tokio::test]
    async fn test_http_error_is_soft_error() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let tool = FetchUrlTool::new().with_reader_url(server.uri());
        let result = tool
            .call(serde_json::json!({ "url": "https://example.com" }))
            .await
            .unwrap();
        assert!(result["error"]
            .as_str()
            .unwrap()
            .contains("HTTP error occurred"));
    }
}
