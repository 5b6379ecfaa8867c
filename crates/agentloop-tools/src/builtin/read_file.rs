// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Reads a file, returning each line prefixed with its 1-indexed line number."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string" },
                "offset": { "type": "integer", "description": "1-indexed line to start from (default 1)" },
                "limit": { "type": "integer", "description": "Maximum number of lines to return" }
            },
            "required": ["file_path"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let file_path = match call.arguments.get("file_path").and_then(|v| v.as_str()) {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => return ToolOutput::err(&call.call_id, "no file path provided"),
        };
        let offset = call.arguments.get("offset").and_then(|v| v.as_u64()).unwrap_or(1).max(1) as usize;
        let limit = call.arguments.get("limit").and_then(|v| v.as_u64()).map(|n| n as usize);

        debug!(file_path = %file_path, offset, ?limit, "read_file");

        let content = match tokio::fs::read_to_string(&file_path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ToolOutput::err(&call.call_id, format!("file not found: {file_path}"))
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return ToolOutput::err(&call.call_id, format!("permission denied reading file: {file_path}"))
            }
            Err(e) => return ToolOutput::err(&call.call_id, format!("reading file: {e}")),
        };

        let mut lines: Vec<&str> = content.lines().collect();
        let start = offset - 1;
        if start >= lines.len() {
            lines.clear();
        } else {
            lines = lines.split_off(start);
        }
        if let Some(limit) = limit {
            lines.truncate(limit);
        }

        let numbered: Vec<String> =
            lines.iter().enumerate().map(|(i, l)| format!("{:6}→{}", offset + i, l)).collect();

        ToolOutput::ok(&call.call_id, numbered.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn reads_lines_with_number_prefix() {
        let f = NamedTempFile::new().unwrap();
        tokio::fs::write(f.path(), "alpha\nbeta\ngamma\n").await.unwrap();
        let out = ReadFileTool
            .execute(&ToolCall::new(
                "c1",
                "builtin:read_file",
                json!({"file_path": f.path().to_str().unwrap()}),
            ))
            .await;
        assert!(out.ok);
        assert_eq!(out.payload, "     1→alpha\n     2→beta\n     3→gamma");
    }

    #[tokio::test]
    async fn offset_and_limit_are_applied() {
        let f = NamedTempFile::new().unwrap();
        tokio::fs::write(f.path(), "a\nb\nc\nd\n").await.unwrap();
        let out = ReadFileTool
            .execute(&ToolCall::new(
                "c1",
                "builtin:read_file",
                json!({"file_path": f.path().to_str().unwrap(), "offset": 2, "limit": 2}),
            ))
            .await;
        assert_eq!(out.payload, "     2→b\n     3→c");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let out = ReadFileTool
            .execute(&ToolCall::new("c1", "builtin:read_file", json!({"file_path": "/no/such/file"})))
            .await;
        assert!(!out.ok);
        assert!(out.payload.contains("not found"));
    }
}
