// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::borrow::Cow;
use std::fmt::Write as _;

use async_trait::async_trait;
use rmcp::model::{CallToolRequestParam, RawContent};
use rmcp::service::{Peer, RoleClient};
use serde_json::Value;
use tracing::{debug, warn};

use agentloop_tools::{Tool, ToolCall, ToolOutput};

/// Wraps a single tool exposed by a connected MCP server as an in-process
/// [`Tool`], so the registry and dispatcher never need to know the call is
/// actually going out over a child-process stdio transport.
pub struct McpProxyTool {
    peer: Peer<RoleClient>,
    server_name: String,
    tool_name: String,
    description: String,
    input_schema: Value,
}

impl McpProxyTool {
    pub fn new(
        peer: Peer<RoleClient>,
        server_name: impl Into<String>,
        tool_name: impl Into<String>,
        description: String,
        input_schema: Value,
    ) -> Self {
        Self { peer, server_name: server_name.into(), tool_name: tool_name.into(), description, input_schema }
    }
}

#[async_trait]
impl Tool for McpProxyTool {
    fn name(&self) -> &str {
        &self.tool_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.input_schema.clone()
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        debug!(server = %self.server_name, tool = %self.tool_name, "dispatching mcp tool call");

        let arguments = match call.arguments.clone() {
            Value::Object(map) => Some(map),
            Value::Null => None,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("input".to_string(), other);
                Some(map)
            }
        };

        let request = CallToolRequestParam { name: Cow::Owned(self.tool_name.clone()), arguments };

        let result = match self.peer.call_tool(request).await {
            Ok(r) => r,
            Err(e) => {
                warn!(server = %self.server_name, tool = %self.tool_name, error = %e, "mcp call failed");
                return ToolOutput::err(
                    &call.call_id,
                    format!("executing tool {}:{}: {e}", self.server_name, self.tool_name),
                );
            }
        };

        let is_error = result.is_error.unwrap_or(false);
        let mut text = String::new();
        for content in &result.content {
            if !text.is_empty() {
                text.push('\n');
            }
            match &content.raw {
                RawContent::Text(t) => text.push_str(&t.text),
                RawContent::Image(img) => {
                    let _ = write!(text, "[image: {} ({} bytes)]", img.mime_type, img.data.len());
                }
                RawContent::Audio(audio) => {
                    let _ = write!(text, "[audio: {} ({} bytes)]", audio.mime_type, audio.data.len());
                }
                _ => text.push_str("[unsupported content type]"),
            }
        }
        if text.is_empty() {
            text = "(no output)".to_string();
        }

        if is_error {
            ToolOutput::err(&call.call_id, text)
        } else {
            ToolOutput::ok(&call.call_id, text)
        }
    }
}
