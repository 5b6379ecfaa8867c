// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Subagent worker entry point (§4.I), reached via the internal
//! `execute-task <file>` subcommand: load the task file, connect upstream if
//! possible, run a single-turn conversation, and deliver the result.
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use agentloop_config::McpServerConfig;
use agentloop_input::SlashRouter;
use agentloop_model::ModelProvider;
use agentloop_tools::ToolRegistry;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::controller::ConversationController;
use crate::dispatcher::{SubagentUpstream, ToolDispatcher};
use crate::protocol::{read_message, ControlMessage, ResultFile, TaskFile};
use crate::subagent::{EmitResultTool, SubagentSupervisor, TaskResultsTool, TaskStatusTool, TaskTool};

/// Run the subagent worker role for the task described by `task_file`.
/// `provider` and `registry` are already constructed by the caller (the CLI
/// entry point) since choosing a concrete model backend and pre-registering
/// built-in tools is outside this crate's scope.
pub async fn execute_task(
    task_file: &Path,
    provider: Arc<dyn ModelProvider>,
    registry: Arc<ToolRegistry>,
    mcp_servers: &HashMap<String, McpServerConfig>,
) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(task_file).await?;
    let task: TaskFile = serde_json::from_str(&raw)?;
    info!(task_id = %task.task_id, "subagent worker starting");

    let dispatcher = ToolDispatcher::new(registry.clone());

    let upstream = match task.comm_port {
        Some(port) => connect_upstream(port, &dispatcher).await,
        None => {
            debug!(task_id = %task.task_id, "no comm_port in task file, running in degraded standalone mode");
            None
        }
    };

    // Connections must stay alive for the worker's lifetime: dropping an
    // `McpConnection` tears down its transport task, which would orphan the
    // proxy tools just registered under its origin.
    let mut mcp_connections = Vec::new();
    for (name, cfg) in mcp_servers {
        match agentloop_mcp::connect(name, cfg, registry.as_ref()).await {
            Ok(conn) => mcp_connections.push(conn),
            Err(e) => warn!(server = %name, error = %e, "subagent failed to connect configured tool server"),
        }
    }

    let (display_tx, _display_rx) = tokio::sync::mpsc::unbounded_channel();
    let supervisor = Arc::new(SubagentSupervisor::new(dispatcher.clone(), display_tx)?);
    registry.register("builtin", Arc::new(TaskTool::new(supervisor.clone())));
    registry.register("builtin", Arc::new(TaskStatusTool::new(supervisor.clone())));
    registry.register("builtin", Arc::new(TaskResultsTool::new(supervisor)));
    registry.register("builtin", Arc::new(EmitResultTool::new(upstream.clone())));

    let router = SlashRouter::without_custom_commands();
    let mut controller = ConversationController::new(provider, dispatcher, router);
    controller.seed_user_message(task.prompt.clone());

    match controller.run_single_turn().await {
        Ok(text) => deliver_result(&task, task_file, upstream.as_deref(), text).await,
        Err(e) => deliver_result(&task, task_file, upstream.as_deref(), format!("Error: {e}")).await,
    }
}

async fn connect_upstream(port: u16, dispatcher: &ToolDispatcher) -> Option<Arc<SubagentUpstream>> {
    let stream = match TcpStream::connect(("127.0.0.1", port)).await {
        Ok(s) => s,
        Err(e) => {
            warn!(port, error = %e, "failed to connect to parent control socket, falling back to local tool execution");
            return None;
        }
    };

    let (mut read_half, write_half) = stream.into_split();
    let upstream = Arc::new(SubagentUpstream::new(Box::new(write_half)));
    dispatcher.set_subagent_upstream(upstream.clone()).await;

    let resolver = upstream.clone();
    tokio::spawn(async move {
        let mut reader = tokio::io::BufReader::new(&mut read_half);
        loop {
            match read_message(&mut reader).await {
                Ok(Some(msg)) => resolver.resolve(msg).await,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "upstream control socket read error");
                    break;
                }
            }
        }
    });

    Some(upstream)
}

/// If `emit_result` already delivered the result and exited the process,
/// this is never reached. Otherwise deliver the final assistant text the
/// same way `emit_result` would: a `result` control message if we have an
/// upstream, or a side-channel result file next to the task file.
async fn deliver_result(task: &TaskFile, task_file: &Path, upstream: Option<&SubagentUpstream>, payload: String) -> anyhow::Result<()> {
    if let Some(upstream) = upstream {
        let msg = ControlMessage::Result { payload };
        return upstream.send(&msg).await;
    }

    let result_stem = task_file.file_stem().and_then(|s| s.to_str()).unwrap_or("task");
    let result_path = task_file.with_file_name(format!("{result_stem}_result.json"));
    let result_file = ResultFile {
        task_id: task.task_id.clone(),
        description: task.description.clone(),
        status: "completed".to_string(),
        result: payload,
        timestamp: chrono::Utc::now().timestamp(),
    };
    tokio::fs::write(&result_path, serde_json::to_vec(&result_file)?).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn deliver_result_without_upstream_writes_side_channel_file() {
        let dir = tempdir().unwrap();
        let task_file = dir.path().join("agentloop_task_task_1.json");
        let task = TaskFile {
            task_id: "task_1".into(),
            description: "desc".into(),
            prompt: "prompt".into(),
            timestamp: 0,
            comm_port: None,
        };
        tokio::fs::write(&task_file, serde_json::to_vec(&task).unwrap()).await.unwrap();

        deliver_result(&task, &task_file, None, "final answer".to_string()).await.unwrap();

        let result_path = dir.path().join("agentloop_task_task_1_result.json");
        let contents = tokio::fs::read_to_string(&result_path).await.unwrap();
        let result_file: ResultFile = serde_json::from_str(&contents).unwrap();
        assert_eq!(result_file.result, "final answer");
        assert_eq!(result_file.task_id, "task_1");
    }
}
