// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::events::TodoItem;
use crate::tool::{Tool, ToolCall, ToolOutput};

fn todo_file_path(session_id: &str) -> std::path::PathBuf {
    let dir = dirs::home_dir().unwrap_or_default().join(".config").join("agent");
    dir.join(format!("todos_{session_id}.json"))
}

fn session_id_from(call: &ToolCall) -> String {
    call.arguments.get("session_id").and_then(|v| v.as_str()).unwrap_or("default").to_string()
}

pub struct TodoReadTool;

#[async_trait]
impl Tool for TodoReadTool {
    fn name(&self) -> &str {
        "todo_read"
    }

    fn description(&self) -> &str {
        "Reads the current session's todo list."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "session_id": { "type": "string" } },
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = todo_file_path(&session_id_from(call));
        debug!(path = %path.display(), "todo_read");
        match tokio::fs::read_to_string(&path).await {
            Ok(s) => ToolOutput::ok(&call.call_id, s),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ToolOutput::ok(&call.call_id, "[]"),
            Err(e) => ToolOutput::err(&call.call_id, format!("reading todo list: {e}")),
        }
    }
}

pub struct TodoWriteTool;

#[async_trait]
impl Tool for TodoWriteTool {
    fn name(&self) -> &str {
        "todo_write"
    }

    fn description(&self) -> &str {
        "Replaces the current session's todo list."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": { "type": "string" },
                "todos": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "content": { "type": "string" },
                            "status": { "type": "string", "enum": ["pending", "in_progress", "completed"] },
                            "priority": { "type": "string", "enum": ["low", "medium", "high"] }
                        },
                        "required": ["id", "content", "status", "priority"]
                    }
                }
            },
            "required": ["todos"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let todos: Vec<TodoItem> = match call.arguments.get("todos").cloned() {
            Some(v) => match serde_json::from_value(v) {
                Ok(t) => t,
                Err(e) => return ToolOutput::err(&call.call_id, format!("invalid todos: {e}")),
            },
            None => return ToolOutput::err(&call.call_id, "no todos provided"),
        };

        let path = todo_file_path(&session_id_from(call));
        debug!(path = %path.display(), count = todos.len(), "todo_write");

        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolOutput::err(&call.call_id, format!("creating todo directory: {e}"));
            }
        }

        let serialised = match serde_json::to_string_pretty(&todos) {
            Ok(s) => s,
            Err(e) => return ToolOutput::err(&call.call_id, format!("serialising todos: {e}")),
        };

        match tokio::fs::write(&path, &serialised).await {
            Ok(()) => ToolOutput::ok(
                &call.call_id,
                format!(
                    "Successfully updated todo list with {} items. Current todo list:\n{}",
                    todos.len(),
                    serialised
                ),
            ),
            Err(e) => ToolOutput::err(&call.call_id, format!("writing todo list: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_session() -> String {
        format!("test-{}", std::process::id())
    }

    #[tokio::test]
    async fn read_before_write_yields_empty_array() {
        let session = format!("{}-unwritten", unique_session());
        let out =
            TodoReadTool.execute(&ToolCall::new("c1", "builtin:todo_read", json!({"session_id": session}))).await;
        assert!(out.ok);
        assert_eq!(out.payload, "[]");
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let session = unique_session();
        let todos = json!([{"id": "1", "content": "ship it", "status": "pending", "priority": "high"}]);
        let write = TodoWriteTool
            .execute(&ToolCall::new("c1", "builtin:todo_write", json!({"session_id": session, "todos": todos})))
            .await;
        assert!(write.ok);

        let read =
            TodoReadTool.execute(&ToolCall::new("c2", "builtin:todo_read", json!({"session_id": session}))).await;
        let parsed: Vec<TodoItem> = serde_json::from_str(&read.payload).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].content, "ship it");

        // clean up so re-runs of this test start from an empty list again
        let path = todo_file_path(&session);
        let _ = tokio::fs::remove_file(path).await;
    }
}
