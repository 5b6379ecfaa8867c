// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `task` / `task_status` / `task_results` / `emit_result` (§4.B, §4.I) —
//! the tool-shaped surface over [`SubagentSupervisor`] and, for a subagent
//! worker process, over its upstream control socket.
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use agentloop_tools::{Tool, ToolCall, ToolOutput};

use crate::dispatcher::SubagentUpstream;
use crate::protocol::ControlMessage;
use crate::subagent::supervisor::SubagentSupervisor;

pub struct TaskTool {
    supervisor: Arc<SubagentSupervisor>,
}

impl TaskTool {
    pub fn new(supervisor: Arc<SubagentSupervisor>) -> Self {
        Self { supervisor }
    }
}

#[async_trait]
impl Tool for TaskTool {
    fn name(&self) -> &str {
        "task"
    }

    fn description(&self) -> &str {
        "Spawn a subagent to investigate or perform a task in parallel, given a short description and a full prompt."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "description": {"type": "string", "description": "Short (3-5 word) summary of the task"},
                "prompt": {"type": "string", "description": "Full task prompt handed to the subagent"}
            },
            "required": ["description", "prompt"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let description = match call.arguments.get("description").and_then(|v| v.as_str()) {
            Some(d) => d.to_string(),
            None => return ToolOutput::err(&call.call_id, "missing required argument 'description'"),
        };
        let prompt = match call.arguments.get("prompt").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.call_id, "missing required argument 'prompt'"),
        };
        let ack = self.supervisor.spawn(description, prompt).await;
        ToolOutput::ok(&call.call_id, ack)
    }
}

pub struct TaskStatusTool {
    supervisor: Arc<SubagentSupervisor>,
}

impl TaskStatusTool {
    pub fn new(supervisor: Arc<SubagentSupervisor>) -> Self {
        Self { supervisor }
    }
}

#[async_trait]
impl Tool for TaskStatusTool {
    fn name(&self) -> &str {
        "task_status"
    }

    fn description(&self) -> &str {
        "Check whether a previously spawned subagent task has completed."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {"task_id": {"type": "string"}},
            "required": ["task_id"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(task_id) = call.arguments.get("task_id").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.call_id, "missing required argument 'task_id'");
        };
        ToolOutput::ok(&call.call_id, self.supervisor.task_status(task_id).await)
    }
}

pub struct TaskResultsTool {
    supervisor: Arc<SubagentSupervisor>,
}

impl TaskResultsTool {
    pub fn new(supervisor: Arc<SubagentSupervisor>) -> Self {
        Self { supervisor }
    }
}

#[async_trait]
impl Tool for TaskResultsTool {
    fn name(&self) -> &str {
        "task_results"
    }

    fn description(&self) -> &str {
        "Retrieve the final result of a completed subagent task, optionally clearing its record."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task_id": {"type": "string"},
                "clear_after_retrieval": {"type": "boolean", "default": false}
            },
            "required": ["task_id"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(task_id) = call.arguments.get("task_id").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.call_id, "missing required argument 'task_id'");
        };
        let clear = call.arguments.get("clear_after_retrieval").and_then(|v| v.as_bool()).unwrap_or(false);
        ToolOutput::ok(&call.call_id, self.supervisor.task_results(task_id, clear).await)
    }
}

/// Only meaningful inside a subagent worker process: transmits a `result`
/// control message upstream and exits. Calling it outside subagent role
/// (no upstream configured) is a tool-layer error, not a panic — the model
/// may call it speculatively.
pub struct EmitResultTool {
    upstream: Option<Arc<SubagentUpstream>>,
}

impl EmitResultTool {
    pub fn new(upstream: Option<Arc<SubagentUpstream>>) -> Self {
        Self { upstream }
    }
}

#[async_trait]
impl Tool for EmitResultTool {
    fn name(&self) -> &str {
        "emit_result"
    }

    fn description(&self) -> &str {
        "Deliver the final result of this subagent task to the parent and terminate. Only valid when running as a subagent."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "result": {"type": "string"},
                "summary": {"type": "string"}
            },
            "required": ["result"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(result) = call.arguments.get("result").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.call_id, "missing required argument 'result'");
        };
        let Some(upstream) = &self.upstream else {
            return ToolOutput::err(&call.call_id, "emit_result called outside subagent role");
        };

        let msg = ControlMessage::Result { payload: result.to_string() };
        if let Err(e) = upstream.send(&msg).await {
            return ToolOutput::err(&call.call_id, format!("failed to emit result upstream: {e}"));
        }
        std::process::exit(0);
    }
}

#[cfg(test)]
mod tests {
    use agentloop_tools::ToolRegistry;
    use serde_json::json;

    use super::*;
    use crate::dispatcher::ToolDispatcher;

    fn make_supervisor() -> Arc<SubagentSupervisor> {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let dispatcher = ToolDispatcher::new(Arc::new(ToolRegistry::new()));
        let exe = std::env::current_exe().unwrap();
        Arc::new(SubagentSupervisor::with_exe_path(dispatcher, tx, exe))
    }

    #[tokio::test]
    async fn task_tool_requires_description_and_prompt() {
        let tool = TaskTool::new(make_supervisor());
        let out = tool.execute(&ToolCall::new("c1", "core:task", json!({"prompt": "x"}))).await;
        assert!(!out.ok);
        assert!(out.payload.contains("description"));
    }

    #[tokio::test]
    async fn task_status_tool_reports_unknown_task() {
        let tool = TaskStatusTool::new(make_supervisor());
        let out = tool.execute(&ToolCall::new("c1", "core:task_status", json!({"task_id": "task_1"}))).await;
        assert!(out.ok);
        assert!(out.payload.contains("Error: no such task"));
    }

    #[tokio::test]
    async fn emit_result_without_upstream_is_an_error() {
        let tool = EmitResultTool::new(None);
        let out = tool.execute(&ToolCall::new("c1", "core:emit_result", json!({"result": "done"}))).await;
        assert!(!out.ok);
        assert!(out.payload.contains("outside subagent role"));
    }
}
