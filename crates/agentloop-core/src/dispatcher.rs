// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The tool dispatcher (§4.D): the single entry point that resolves a tool
//! key to a builtin, a remote MCP tool, or — when this process is running
//! as a subagent — forwards the call upstream to the parent supervisor.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use agentloop_model::ToolSchema;
use agentloop_tools::{Tool, ToolCall, ToolOutput, ToolRegistry};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::protocol::ControlMessage;

/// Tools that always run locally, even in subagent role — the forwarding
/// gate in [`ToolDispatcher::execute`] never routes these upstream, since
/// `task_status`/`task_results` answer against *this* process's supervisor
/// and forwarding them would ask the wrong question.
const NEVER_FORWARDED: &[&str] =
    &["builtin:task", "builtin:task_status", "builtin:task_results", "builtin:emit_result"];

const FORWARD_TIMEOUT: Duration = Duration::from_secs(300);

/// The write half of a subagent's control socket, plus the table of
/// in-flight forwarded calls awaiting a matching response. Shared (via
/// [`ToolDispatcher`]'s internal `Arc`) between the forwarding call site and
/// the socket-reader task that resolves pending requests.
pub struct SubagentUpstream {
    writer: Mutex<Box<dyn tokio::io::AsyncWrite + Unpin + Send>>,
    pending: Mutex<HashMap<String, oneshot::Sender<ControlMessage>>>,
}

impl SubagentUpstream {
    pub fn new(writer: Box<dyn tokio::io::AsyncWrite + Unpin + Send>) -> Self {
        Self { writer: Mutex::new(writer), pending: Mutex::new(HashMap::new()) }
    }

    /// Route an inbound `tool_execution_response` to whichever forwarded
    /// call is waiting on it. Silently drops unmatched responses — their
    /// caller gave up (e.g. died while the request was outstanding).
    pub async fn resolve(&self, msg: ControlMessage) {
        if let ControlMessage::ToolExecutionResponse { ref request_id, .. } = msg {
            if let Some(tx) = self.pending.lock().await.remove(request_id) {
                let _ = tx.send(msg);
            }
        }
    }

    /// Send an arbitrary control message upstream (used directly by
    /// `emit_result`, and internally by [`ToolDispatcher::forward`]).
    pub(crate) async fn send(&self, msg: &ControlMessage) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(msg)?;
        line.push('\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

#[derive(Clone)]
enum DispatcherRole {
    Main,
    Subagent(Arc<SubagentUpstream>),
}

/// Single dispatch surface unifying builtins, remote MCP tools, and
/// subagent forwarding. Cheaply clonable — every field is an `Arc`.
#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    role: Arc<RwLock<DispatcherRole>>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry, role: Arc::new(RwLock::new(DispatcherRole::Main)) }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Switch this dispatcher into subagent role, forwarding everything
    /// except `{task, task_status, task_results, emit_result}` upstream.
    pub async fn set_subagent_upstream(&self, upstream: Arc<SubagentUpstream>) {
        *self.role.write().await = DispatcherRole::Subagent(upstream);
    }

    async fn upstream(&self) -> Option<Arc<SubagentUpstream>> {
        match &*self.role.read().await {
            DispatcherRole::Main => None,
            DispatcherRole::Subagent(up) => Some(up.clone()),
        }
    }

    /// Execute a tool call that already carries a resolved `<origin>:<name>`
    /// key (no name-normalisation applied).
    pub async fn execute(&self, call: &ToolCall) -> ToolOutput {
        if self.registry.lookup(&call.tool_key).is_none() {
            let available: Vec<String> = self.registry.enumerate().into_iter().take(10).map(|d| d.key).collect();
            return ToolOutput::err(
                &call.call_id,
                format!("Tool {} not found. Available: {:?}", call.tool_key, available),
            );
        }

        if !NEVER_FORWARDED.contains(&call.tool_key.as_str()) {
            if let Some(upstream) = self.upstream().await {
                return self.forward(&upstream, call).await;
            }
        }

        self.registry.execute(call).await
    }

    /// Execute a tool call whose name has been rewritten for the model's
    /// function-name alphabet (`:` → `_`); reverses that mapping first.
    pub async fn execute_normalized(&self, call_id: &str, normalized_name: &str, args: serde_json::Value) -> ToolOutput {
        let tool_key = self.denormalize(normalized_name);
        self.execute(&ToolCall::new(call_id, tool_key, args)).await
    }

    async fn forward(&self, upstream: &SubagentUpstream, call: &ToolCall) -> ToolOutput {
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        upstream.pending.lock().await.insert(request_id.clone(), tx);

        let (origin, name) = split_key(&call.tool_key);
        let request = ControlMessage::ToolExecutionRequest {
            request_id: request_id.clone(),
            tool_key: call.tool_key.clone(),
            tool_name: name,
            tool_args: call.arguments.clone(),
        };
        debug!(tool_key = %call.tool_key, origin = %origin, request_id = %request_id, "forwarding tool call upstream");

        if let Err(e) = upstream.send(&request).await {
            upstream.pending.lock().await.remove(&request_id);
            return ToolOutput::err(&call.call_id, format!("forwarding tool call: {e}"));
        }

        match tokio::time::timeout(FORWARD_TIMEOUT, rx).await {
            Ok(Ok(ControlMessage::ToolExecutionResponse { success, result, error, .. })) => {
                if success {
                    ToolOutput::ok(&call.call_id, result.unwrap_or_default())
                } else {
                    ToolOutput::err(&call.call_id, error.unwrap_or_else(|| "upstream tool call failed".into()))
                }
            }
            Ok(Ok(_)) => ToolOutput::err(&call.call_id, "malformed upstream response"),
            Ok(Err(_)) => ToolOutput::err(&call.call_id, "upstream connection closed before responding"),
            Err(_) => {
                upstream.pending.lock().await.remove(&request_id);
                ToolOutput::err(&call.call_id, format!("forwarding tool call timed out after {}s", FORWARD_TIMEOUT.as_secs()))
            }
        }
    }

    /// Build the tool schema list the model sees, with every key rewritten
    /// through [`normalize_key`].
    pub fn build_schemas(&self) -> Vec<ToolSchema> {
        self.registry
            .enumerate()
            .into_iter()
            .map(|d| ToolSchema {
                name: normalize_key(&d.key),
                description: d.description,
                parameters: d.input_schema,
            })
            .collect()
    }

    /// Reverse [`normalize_key`]: try every underscore position left to
    /// right and return the first candidate `origin:name` split that is
    /// actually registered. Falls back to treating the whole string as a
    /// builtin name if nothing matches — this keeps the mapping total even
    /// for names the registry doesn't recognise (the "not found" error then
    /// surfaces from [`Self::execute`] itself).
    pub fn denormalize(&self, normalized: &str) -> String {
        for (i, c) in normalized.char_indices() {
            if c == '_' {
                let candidate = format!("{}:{}", &normalized[..i], &normalized[i + 1..]);
                if self.registry.lookup(&candidate).is_some() {
                    return candidate;
                }
            }
        }
        format!("builtin:{normalized}")
    }

    /// Dispatch asynchronously, periodically emitting a keep-alive status
    /// line over `status_tx` while the call is still in flight. Aborts and
    /// returns a cancellation result if `input` observes the interrupt flag
    /// set between ticks.
    pub async fn execute_with_keepalive(
        &self,
        call: ToolCall,
        interval: Duration,
        interrupted: impl Fn() -> bool + Send + 'static,
        status_tx: mpsc::UnboundedSender<String>,
    ) -> ToolOutput {
        let dispatcher = self.clone();
        let call_for_task = call.clone();
        let mut handle = tokio::spawn(async move { dispatcher.execute(&call_for_task).await });
        let start = Instant::now();

        loop {
            tokio::select! {
                res = &mut handle => {
                    return match res {
                        Ok(output) => output,
                        Err(e) => ToolOutput::err(&call.call_id, format!("tool task failed: {e}")),
                    };
                }
                _ = tokio::time::sleep(interval) => {
                    if interrupted() {
                        handle.abort();
                        return ToolOutput::cancelled(&call.call_id);
                    }
                    let elapsed = start.elapsed().as_secs();
                    let line = format!(
                        "⏳ Tool {} still running… ({elapsed}s elapsed), press ESC to cancel",
                        call.tool_key
                    );
                    if status_tx.send(line).is_err() {
                        warn!(tool_key = %call.tool_key, "keep-alive status receiver dropped");
                    }
                }
            }
        }
    }
}

fn split_key(key: &str) -> (String, String) {
    match key.split_once(':') {
        Some((origin, name)) => (origin.to_string(), name.to_string()),
        None => (String::new(), key.to_string()),
    }
}

/// `:` → `_`; the model-visible projection of a tool key (some chat APIs
/// restrict function names to `[a-zA-Z0-9_-]`).
pub fn normalize_key(key: &str) -> String {
    key.replace(':', "_")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.call_id, call.arguments.to_string())
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "sleeps"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            tokio::time::sleep(Duration::from_secs(12)).await;
            ToolOutput::ok(&call.call_id, "done")
        }
    }

    fn dispatcher_with(tools: Vec<Arc<dyn Tool>>) -> ToolDispatcher {
        let registry = Arc::new(ToolRegistry::new());
        for t in tools {
            registry.register("builtin", t);
        }
        ToolDispatcher::new(registry)
    }

    #[tokio::test]
    async fn execute_unknown_key_reports_not_found() {
        let d = dispatcher_with(vec![]);
        let out = d.execute(&ToolCall::new("c1", "builtin:missing", json!({}))).await;
        assert!(!out.ok);
        assert!(out.payload.contains("not found"));
    }

    #[tokio::test]
    async fn execute_known_key_runs_the_tool() {
        let d = dispatcher_with(vec![Arc::new(EchoTool)]);
        let out = d.execute(&ToolCall::new("c1", "builtin:echo", json!({"a": 1}))).await;
        assert!(out.ok);
    }

    #[test]
    fn normalize_key_replaces_colon_with_underscore() {
        assert_eq!(normalize_key("builtin:read_file"), "builtin_read_file");
        assert_eq!(normalize_key("myserver:search"), "myserver_search");
    }

    #[tokio::test]
    async fn denormalize_recovers_registered_key_with_underscored_origin() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register("my_server", Arc::new(EchoTool));
        let d = ToolDispatcher::new(registry);
        // "my_server:echo" normalizes to "my_server_echo"; denormalize must
        // try every underscore, not just the first.
        assert_eq!(d.denormalize("my_server_echo"), "my_server:echo");
    }

    #[tokio::test]
    async fn denormalize_falls_back_to_builtin_when_unmatched() {
        let d = dispatcher_with(vec![]);
        assert_eq!(d.denormalize("totally_unknown"), "builtin:totally_unknown");
    }

    #[tokio::test]
    async fn normalize_then_denormalize_round_trips_for_every_registered_key() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register("builtin", Arc::new(EchoTool));
        registry.register("server_one", Arc::new(EchoTool));
        let d = ToolDispatcher::new(registry.clone());

        let keys: Vec<String> = registry.enumerate().into_iter().map(|t| t.key).collect();
        let normalized: Vec<String> = keys.iter().map(|k| normalize_key(k)).collect();
        // bijection: no two distinct keys collide after normalisation
        let mut sorted = normalized.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), normalized.len());

        for (key, norm) in keys.iter().zip(normalized.iter()) {
            assert_eq!(&d.denormalize(norm), key);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_emits_two_status_lines_for_a_twelve_second_tool() {
        let d = dispatcher_with(vec![Arc::new(SlowTool)]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let call = ToolCall::new("c1", "builtin:slow", json!({}));

        let handle = tokio::spawn(async move {
            d.execute_with_keepalive(call, Duration::from_secs(5), || false, tx).await
        });

        tokio::time::advance(Duration::from_secs(20)).await;
        let out = handle.await.unwrap();
        assert!(out.ok);

        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        assert_eq!(lines.len(), 2, "expected exactly 2 keep-alive lines, got {lines:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_cancels_when_interrupted() {
        let d = dispatcher_with(vec![Arc::new(SlowTool)]);
        let (tx, _rx) = mpsc::unbounded_channel();
        let call = ToolCall::new("c1", "builtin:slow", json!({}));
        let interrupted = Arc::new(AtomicBool::new(false));
        let flag = interrupted.clone();

        let handle = tokio::spawn(async move {
            d.execute_with_keepalive(call, Duration::from_secs(5), move || flag.load(Ordering::SeqCst), tx)
                .await
        });

        tokio::time::advance(Duration::from_secs(4)).await;
        interrupted.store(true, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(2)).await;

        let out = handle.await.unwrap();
        assert!(!out.ok);
        assert_eq!(out.payload, "Tool execution cancelled");
    }
}
