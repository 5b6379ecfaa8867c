// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolOutput};

const DEFAULT_LINE_LIMIT: usize = 1000;
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

pub struct WebFetchTool;

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "webfetch"
    }

    fn description(&self) -> &str {
        "Fetches a URL over HTTP GET and returns its body, truncated to a line limit."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string" },
                "limit": { "type": "integer", "description": "Max lines to return (default 1000)" }
            },
            "required": ["url"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let url = match call.arguments.get("url").and_then(|v| v.as_str()) {
            Some(u) if !u.is_empty() => u.to_string(),
            _ => return ToolOutput::err(&call.call_id, "no URL provided"),
        };
        let limit = call.arguments.get("limit").and_then(|v| v.as_u64()).unwrap_or(DEFAULT_LINE_LIMIT as u64) as usize;

        debug!(url = %url, limit, "webfetch");

        let client = match reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(30))
            .build()
        {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.call_id, format!("building HTTP client: {e}")),
        };

        let response = match client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => return ToolOutput::err(&call.call_id, format!("fetching URL: {e}")),
        };

        if let Err(e) = response.error_for_status_ref() {
            return ToolOutput::err(&call.call_id, format!("fetching URL: {e}"));
        }

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return ToolOutput::err(&call.call_id, format!("reading response body: {e}")),
        };

        let content = truncate_body(&body, limit);
        ToolOutput::ok(&call.call_id, format!("Content from {url}:\n{content}"))
    }
}

fn truncate_body(body: &str, limit: usize) -> String {
    let lines: Vec<&str> = body.lines().collect();
    if lines.len() > limit {
        format!("{}\n\n[Content truncated at {limit} lines]", lines[..limit].join("\n"))
    } else {
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_url_is_an_error() {
        let out = WebFetchTool.execute(&ToolCall::new("c1", "builtin:webfetch", json!({}))).await;
        assert!(!out.ok);
        assert!(out.payload.contains("no URL"));
    }

    #[test]
    fn truncates_at_limit_with_marker() {
        let body = (0..20).map(|i| format!("line{i}")).collect::<Vec<_>>().join("\n");
        let out = truncate_body(&body, 10);
        assert_eq!(out.lines().filter(|l| l.starts_with("line")).count(), 10);
        assert!(out.contains("[Content truncated at 10 lines]"));
    }

    #[test]
    fn body_within_limit_is_untouched() {
        let body = "a\nb\nc";
        assert_eq!(truncate_body(body, 10), "a\nb\nc");
    }
}
