// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct ListDirectoryTool;

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "Lists a directory's entries, sorted by name."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "directory_path": { "type": "string", "description": "Defaults to '.'" }
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let directory_path =
            call.arguments.get("directory_path").and_then(|v| v.as_str()).unwrap_or(".").to_string();

        debug!(directory_path = %directory_path, "list_directory");

        let path = std::path::Path::new(&directory_path);
        if !path.exists() {
            return ToolOutput::err(&call.call_id, format!("directory does not exist: {directory_path}"));
        }
        if !path.is_dir() {
            return ToolOutput::err(&call.call_id, format!("path is not a directory: {directory_path}"));
        }

        let mut entries = match tokio::fs::read_dir(path).await {
            Ok(r) => r,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return ToolOutput::err(
                    &call.call_id,
                    format!("permission denied accessing directory: {directory_path}"),
                )
            }
            Err(e) => return ToolOutput::err(&call.call_id, format!("listing directory: {e}")),
        };

        let mut items = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(e)) => e,
                Ok(None) => break,
                Err(e) => return ToolOutput::err(&call.call_id, format!("listing directory: {e}")),
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = match entry.metadata().await {
                Ok(m) => m,
                Err(_) => continue,
            };
            if meta.is_dir() {
                items.push((name.clone(), format!("📁 {name}/")));
            } else {
                items.push((name.clone(), format!("📄 {name} ({} bytes)", meta.len())));
            }
        }
        items.sort_by(|a, b| a.0.cmp(&b.0));

        if items.is_empty() {
            return ToolOutput::ok(&call.call_id, format!("Directory is empty: {directory_path}"));
        }

        let body: Vec<String> = items.into_iter().map(|(_, line)| line).collect();
        ToolOutput::ok(&call.call_id, format!("Contents of {directory_path}:\n{}", body.join("\n")))
    }
}
