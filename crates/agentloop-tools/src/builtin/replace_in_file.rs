// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct ReplaceInFileTool;

/// Collapse every run of whitespace to a single space, for the "found but
/// whitespace differs" diagnostic re-attempt.
fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl Tool for ReplaceInFileTool {
    fn name(&self) -> &str {
        "replace_in_file"
    }

    fn description(&self) -> &str {
        "Replaces the first literal occurrence of old_text with new_text in a file."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string" },
                "old_text": { "type": "string" },
                "new_text": { "type": "string" }
            },
            "required": ["file_path", "old_text", "new_text"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let file_path = match call.arguments.get("file_path").and_then(|v| v.as_str()) {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => return ToolOutput::err(&call.call_id, "no file path provided"),
        };
        let old_text = match call.arguments.get("old_text").and_then(|v| v.as_str()) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => return ToolOutput::err(&call.call_id, "no old text to replace provided"),
        };
        let new_text = call.arguments.get("new_text").and_then(|v| v.as_str()).unwrap_or("").to_string();

        debug!(file_path = %file_path, "replace_in_file");

        let content = match tokio::fs::read_to_string(&file_path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ToolOutput::err(&call.call_id, format!("file not found: {file_path}"))
            }
            Err(e) => return ToolOutput::err(&call.call_id, format!("reading file: {e}")),
        };

        if !content.contains(&old_text) {
            // Re-attempt with whitespace collapsed before concluding the text
            // is genuinely absent, so a close-but-not-exact match produces a
            // more actionable diagnostic than a flat "not found".
            let collapsed_old = collapse_whitespace(&old_text);
            let collapsed_content = collapse_whitespace(&content);
            if !collapsed_old.is_empty() && collapsed_content.contains(&collapsed_old) {
                return ToolOutput::err(
                    &call.call_id,
                    format!(
                        "text found but whitespace doesn't match in {file_path}. Check exact indentation, tabs vs spaces, and trailing whitespace."
                    ),
                );
            }
            return ToolOutput::err(&call.call_id, format!("text to replace not found in {file_path}"));
        }

        let new_content = content.replacen(&old_text, &new_text, 1);
        match tokio::fs::write(&file_path, &new_content).await {
            Ok(()) => ToolOutput::ok(&call.call_id, format!("Successfully replaced text in {file_path}")),
            Err(e) => ToolOutput::err(&call.call_id, format!("writing file: {e}")),
        }
    }
}
