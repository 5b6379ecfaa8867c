// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Writes content to a file, creating parent directories as needed. Overwrites the whole file."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string" },
                "content": { "type": "string" }
            },
            "required": ["file_path", "content"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let file_path = match call.arguments.get("file_path").and_then(|v| v.as_str()) {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => return ToolOutput::err(&call.call_id, "no file path provided"),
        };
        let content = call.arguments.get("content").and_then(|v| v.as_str()).unwrap_or("").to_string();

        debug!(file_path = %file_path, bytes = content.len(), "write_file");

        if let Some(parent) = std::path::Path::new(&file_path).parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    return ToolOutput::err(&call.call_id, format!("creating parent directory: {e}"));
                }
            }
        }

        match tokio::fs::write(&file_path, &content).await {
            Ok(()) => ToolOutput::ok(
                &call.call_id,
                format!("Successfully wrote {} characters to {}", content.chars().count(), file_path),
            ),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                ToolOutput::err(&call.call_id, format!("permission denied writing to file: {file_path}"))
            }
            Err(e) => ToolOutput::err(&call.call_id, format!("writing to file: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn writes_content_and_reports_byte_count() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let out = WriteFileTool
            .execute(&ToolCall::new(
                "c1",
                "builtin:write_file",
                json!({"file_path": path.to_str().unwrap(), "content": "hello"}),
            ))
            .await;
        assert!(out.ok);
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn creates_missing_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/deeper/out.txt");
        let out = WriteFileTool
            .execute(&ToolCall::new(
                "c1",
                "builtin:write_file",
                json!({"file_path": path.to_str().unwrap(), "content": "x"}),
            ))
            .await;
        assert!(out.ok);
        assert!(path.exists());
    }
}
