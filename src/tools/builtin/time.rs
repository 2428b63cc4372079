// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Current time tool
//!
//! Pure handler, no network. Accepts an optional UTC offset like "+09:00".

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use serde_json::{json, Value};

use crate::error::Result;
use crate::tools::{SchemaBuilder, Tool, ToolHandler, ToolSpec};

pub struct CurrentTimeTool;

impl CurrentTimeTool {
    fn parse_offset(offset: &str) -> Option<FixedOffset> {
        let offset = offset.trim();
        let (sign, rest) = match offset.strip_prefix('+') {
            Some(rest) => (1, rest),
            None => (-1, offset.strip_prefix('-')?),
        };
        let (hours, minutes) = match rest.split_once(':') {
            Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
            None => (rest.parse::<i32>().ok()?, 0),
        };
        if hours > 14 || minutes > 59 {
            return None;
        }
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
    }
}

#[async_trait]
impl ToolHandler for CurrentTimeTool {
    async fn call(&self, input: Value) -> Result<Value> {
        let now_utc = Utc::now();

        let (now, zone) = match input["utc_offset"].as_str().filter(|s| !s.trim().is_empty()) {
            Some(offset_str) => match Self::parse_offset(offset_str) {
                Some(offset) => (
                    now_utc.with_timezone(&offset).naive_local(),
                    format!("UTC{}", offset_str.trim()),
                ),
                None => {
                    return Ok(json!({
                        "error": format!("Unknown UTC offset: {}", offset_str)
                    }));
                }
            },
            None => (now_utc.naive_utc(), "UTC".to_string()),
        };

        Ok(json!({
            "datetime": now.format("%Y-%m-%d %H:%M:%S").to_string(),
            "timezone": zone,
            "timestamp": now_utc.timestamp(),
        }))
    }
}

/// Spec for the current time tool
pub fn spec() -> ToolSpec {
    ToolSpec {
        name: "get_current_time".to_string(),
        description: "Returns the current date and time, optionally shifted to a UTC offset. \
                      If no offset is specified, UTC is used."
            .to_string(),
        input_schema: SchemaBuilder::new()
            .string(
                "utc_offset",
                "Optional UTC offset such as '+09:00' or '-05:30'",
                false,
            )
            .build(),
    }
}

/// Build the registered tool
pub fn build() -> Tool {
    Tool::new(spec(), Arc::new(CurrentTimeTool))
}
