// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Wikipedia search tool

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::tools::{SchemaBuilder, Tool, ToolHandler, ToolSpec};

const WIKIPEDIA_API_URL: &str = "https://en.wikipedia.org/w/api.php";
const MAX_SEARCH_RESULTS: u64 = 10;

pub struct WikipediaTool {
    client: reqwest::Client,
    api_url: String,
}

impl WikipediaTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("valid reqwest client config");
        Self {
            client,
            api_url: WIKIPEDIA_API_URL.to_string(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    fn strip_markup(snippet: &str) -> String {
        // Search snippets come back with <span class="searchmatch"> markers
        let mut out = String::with_capacity(snippet.len());
        let mut in_tag = false;
        for ch in snippet.chars() {
            match ch {
                '<' => in_tag = true,
                '>' => in_tag = false,
                c if !in_tag => out.push(c),
                _ => {}
            }
        }
        out
    }
}

impl Default for WikipediaTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for WikipediaTool {
    async fn call(&self, input: Value) -> Result<Value> {
        let Some(query) = input["query"].as_str().filter(|q| !q.trim().is_empty()) else {
            return Ok(json!({ "error": "query is required" }));
        };
        let limit = input["num_results"]
            .as_u64()
            .unwrap_or(3)
            .min(MAX_SEARCH_RESULTS)
            .to_string();

        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", limit.as_str()),
                ("format", "json"),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        let hits = body["query"]["search"].as_array().cloned().unwrap_or_default();

        if hits.is_empty() {
            return Ok(json!({
                "query": query,
                "results": [],
                "content": format!("No Wikipedia articles found for '{}'.", query),
            }));
        }

        let results: Vec<Value> = hits
            .iter()
            .map(|hit| {
                json!({
                    "title": hit["title"],
                    "snippet": Self::strip_markup(hit["snippet"].as_str().unwrap_or_default()),
                })
            })
            .collect();

        let content = results
            .iter()
            .map(|r| {
                format!(
                    "{}: {}",
                    r["title"].as_str().unwrap_or_default(),
                    r["snippet"].as_str().unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        Ok(json!({
            "query": query,
            "results": results,
            "content": content,
        }))
    }
}

/// Spec for the Wikipedia search tool
pub fn spec() -> ToolSpec {
    ToolSpec {
        name: "search_wikipedia".to_string(),
        description: "Search Wikipedia for articles matching a query and return titles with \
                      short snippets. Use this for factual questions about people, places, \
                      events or concepts."
            .to_string(),
        input_schema: SchemaBuilder::new()
            .string("query", "The search query", true)
            .integer("num_results", "Number of results to return (default 3)", false)
            .build(),
    }
}

/// Build the registered tool
pub fn build() -> Tool {
    Tool::new(spec(), Arc::new(WikipediaTool::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_shape() {
        let spec = spec();
        assert_eq!(spec.name, "search_wikipedia");
        assert_eq!(spec.input_schema["required"][0], "query");
    }

    #[test]
    fn test_strip_markup() {
        let snippet = r#"The <span class="searchmatch">Rust</span> language"#;
        assert_eq!(WikipediaTool::strip_markup(snippet), "The Rust language");
    }

    #[tokio::test]
    async fn test_missing_query_is_soft_error() {
        let tool = WikipediaTool::new();
        let result = tool.call(serde_json::json!({})).await.unwrap();
        assert_eq!(result["error"], "query is required");
    }

    #[tokio::test]
    async fn test_search_against_mock() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "query": { "search": [
                    { "title": "Rust (programming language)", "snippet": "A <span>systems</span> language" },
                    { "title": "Rust Belt", "snippet": "A region" }
                ]}
            })))
            .mount(&server)
            .await;

        let tool = WikipediaTool::new().with_api_url(server.uri());
        let result = tool
            .call(serde_json::json!({ "query": "rust", "num_results": 2 }))
            .await
            .unwrap();

        assert_eq!(result["results"].as_array().unwrap().len(), 2);
        assert_eq!(result["results"][0]["snippet"], "A systems language");
        assert!(result["content"].as_str().unwrap().contains("Rust Belt"));
    }

    #[tokio::test]
    async fn test_no_hits() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "query": { "search": [] }
            })))
            .mount(&server)
            .await;

        let tool = WikipediaTool::new().with_api_url(server.uri());
        let result = tool
            .call(serde_json::json!({ "query": "xyzzy" }))
            .await
            .unwrap();
        assert!(result["content"]
            .as_str()
            .unwrap()
            .contains("No Wikipedia articles found"));
    }
}
