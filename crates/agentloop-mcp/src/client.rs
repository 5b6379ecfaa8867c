// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::service::{RoleClient, RunningService};
use rmcp::transport::TokioChildProcess;
use rmcp::ServiceExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use agentloop_config::McpServerConfig;
use agentloop_tools::ToolRegistry;

use crate::proxy::McpProxyTool;

/// A live connection to one configured MCP server.
///
/// Holds the running rmcp service so the subprocess transport stays open,
/// plus the origin name so [`McpConnection::disconnect`] knows which
/// descriptors to remove from the registry.
pub struct McpConnection {
    server_name: String,
    client: RunningService<RoleClient, ()>,
}

impl McpConnection {
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Close the transport and remove every tool this server contributed
    /// from the registry. De-registration is mandatory: a dangling
    /// descriptor would point at a peer whose child process has exited.
    pub async fn disconnect(self, registry: &ToolRegistry) {
        registry.remove_origin(&self.server_name);
        if let Err(e) = self.client.cancel().await {
            warn!(server = %self.server_name, error = %e, "error shutting down mcp server");
        }
    }
}

/// Spawn `config`'s subprocess, perform the MCP handshake, call `list_tools`,
/// and register each returned tool under `<server_name>:<tool_name>` in
/// `registry`. Registering overwrites any prior descriptor sharing a key —
/// this is how a reconnect refreshes a server's tool list.
pub async fn connect(
    server_name: &str,
    config: &McpServerConfig,
    registry: &ToolRegistry,
) -> Result<McpConnection> {
    let argv = config.argv();
    let (program, args) =
        argv.split_first().context("mcp server config has an empty command")?;

    let mut cmd = Command::new(program);
    cmd.args(args);
    for (k, v) in &config.env {
        cmd.env(k, v);
    }
    cmd.stdin(std::process::Stdio::piped());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::inherit());

    let transport = TokioChildProcess::new(cmd)
        .with_context(|| format!("spawning mcp server '{server_name}'"))?;

    let client = ()
        .serve(transport)
        .await
        .with_context(|| format!("mcp handshake with server '{server_name}' failed"))?;

    let tools = client
        .peer()
        .list_all_tools()
        .await
        .with_context(|| format!("listing tools from mcp server '{server_name}'"))?;

    for tool in tools {
        let input_schema = serde_json::Value::Object((*tool.input_schema).clone());
        let description = tool.description.as_deref().unwrap_or_default().to_string();
        let proxy = McpProxyTool::new(
            client.peer().clone(),
            server_name,
            tool.name.to_string(),
            description,
            input_schema,
        );
        debug!(server = server_name, tool = %tool.name, "registering mcp tool");
        registry.register(server_name, Arc::new(proxy));
    }

    info!(server = server_name, "connected to mcp server");
    Ok(McpConnection { server_name: server_name.to_string(), client })
}
