// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct GetCurrentDirectoryTool;

#[async_trait]
impl Tool for GetCurrentDirectoryTool {
    fn name(&self) -> &str {
        "get_current_directory"
    }

    fn description(&self) -> &str {
        "Returns the process's current working directory."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "additionalProperties": false })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match std::env::current_dir() {
            Ok(p) => ToolOutput::ok(&call.call_id, format!("Current directory: {}", p.display())),
            Err(e) => ToolOutput::err(&call.call_id, format!("getting current directory: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_the_process_cwd() {
        let out =
            GetCurrentDirectoryTool.execute(&ToolCall::new("c1", "builtin:get_current_directory", json!({}))).await;
        assert!(out.ok);
        assert!(out.payload.starts_with("Current directory: "));
    }
}
