// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolOutput};

const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub struct BashExecuteTool;

#[async_trait]
impl Tool for BashExecuteTool {
    fn name(&self) -> &str {
        "bash_execute"
    }

    fn description(&self) -> &str {
        "Runs a command through the shell and returns its combined stdout/stderr plus exit code."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Shell command to run" },
                "timeout": { "type": "integer", "description": "Seconds to wait before aborting (default 120)" }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let command = match call.arguments.get("command").and_then(|v| v.as_str()) {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => return ToolOutput::err(&call.call_id, "no command provided"),
        };
        let timeout_secs =
            call.arguments.get("timeout").and_then(|v| v.as_u64()).unwrap_or(DEFAULT_TIMEOUT_SECS);

        debug!(command = %command, timeout_secs, "bash_execute");

        let mut child = match tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.call_id, format!("executing command: {e}")),
        };

        let output =
            tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), child.wait_with_output())
                .await;

        let output = match output {
            Ok(Ok(o)) => o,
            Ok(Err(e)) => return ToolOutput::err(&call.call_id, format!("executing command: {e}")),
            Err(_) => {
                return ToolOutput::err(&call.call_id, format!("command timed out after {timeout_secs} seconds"))
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let mut blob = String::new();
        blob.push_str(&stdout);
        if !stderr.is_empty() {
            if !blob.is_empty() {
                blob.push('\n');
            }
            blob.push_str("STDERR:\n");
            blob.push_str(&stderr);
        }
        let code = output.status.code().unwrap_or(-1);
        if !blob.is_empty() {
            blob.push('\n');
        }
        blob.push_str(&format!("Exit code: {code}"));

        ToolOutput::ok(&call.call_id, blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn success_reports_exit_code_zero() {
        let out = BashExecuteTool
            .execute(&ToolCall::new("c1", "builtin:bash_execute", json!({"command": "echo hi"})))
            .await;
        assert!(out.ok);
        assert!(out.payload.contains("hi"));
        assert!(out.payload.contains("Exit code: 0"));
    }

    #[tokio::test]
    async fn nonzero_exit_code_is_reported() {
        let out = BashExecuteTool
            .execute(&ToolCall::new("c1", "builtin:bash_execute", json!({"command": "exit 3"})))
            .await;
        assert!(out.ok);
        assert!(out.payload.contains("Exit code: 3"));
    }

    #[tokio::test]
    async fn missing_command_is_an_error() {
        let out = BashExecuteTool.execute(&ToolCall::new("c1", "builtin:bash_execute", json!({}))).await;
        assert!(!out.ok);
        assert!(out.payload.starts_with("Error: "));
    }

    #[tokio::test]
    async fn timeout_is_enforced() {
        let out = BashExecuteTool
            .execute(&ToolCall::new(
                "c1",
                "builtin:bash_execute",
                json!({"command": "sleep 5", "timeout": 1}),
            ))
            .await;
        assert!(!out.ok);
        assert!(out.payload.contains("timed out"));
    }
}
