// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The subagent supervisor (§4.E): spawns `execute-task` child processes,
//! owns their control sockets, arbitrates tool calls on their behalf, and
//! consolidates batch completion.
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use agentloop_tools::{ToolCall, ToolOutput};

use crate::dispatcher::ToolDispatcher;
use crate::protocol::{read_message, write_message, ControlMessage, TaskFile};
use crate::subagent::batch::Batch;
use crate::subagent::record::SubagentRecord;

const ACCEPT_TIMEOUT: Duration = Duration::from_secs(10);

struct SupervisorState {
    records: HashMap<String, SubagentRecord>,
    batches: HashMap<String, Batch>,
    /// One kill switch per live child, so `shutdown()` can ask the exit
    /// watcher that exclusively owns each `Child` to kill it, instead of
    /// merely forgetting the record. The watcher alone calls `Child::wait`,
    /// so it never contends with `shutdown()` for access to the child.
    /// Removed once the child has actually terminated.
    children: HashMap<String, oneshot::Sender<()>>,
    current_batch_id: Option<String>,
    task_counter: u64,
    batch_counter: u64,
}

impl SupervisorState {
    fn new() -> Self {
        Self {
            records: HashMap::new(),
            batches: HashMap::new(),
            children: HashMap::new(),
            current_batch_id: None,
            task_counter: 0,
            batch_counter: 0,
        }
    }

    /// Decide which batch a freshly spawned task joins, opening a new one if
    /// the current batch's window has lapsed or none exists yet.
    fn assign_batch(&mut self, task_id: &str) -> String {
        if let Some(current) = self.current_batch_id.clone() {
            if let Some(batch) = self.batches.get_mut(&current) {
                if batch.accepts_now() {
                    batch.join(task_id);
                    return current;
                }
            }
        }
        self.batch_counter += 1;
        let batch_id = format!("batch_{}", self.batch_counter);
        self.batches.insert(batch_id.clone(), Batch::new(&batch_id, task_id));
        self.current_batch_id = Some(batch_id.clone());
        batch_id
    }
}

/// Spawns and supervises subagent child processes (§4.E).
pub struct SubagentSupervisor {
    state: Arc<Mutex<SupervisorState>>,
    /// Dispatcher used to run tool calls forwarded by children, with
    /// subagent-role forwarding disabled — forwarded calls always execute
    /// locally at the parent.
    dispatcher: ToolDispatcher,
    display_tx: mpsc::UnboundedSender<String>,
    /// Path to the same executable, re-invoked as `execute-task <file>`.
    exe_path: PathBuf,
    work_dir: PathBuf,
}

impl SubagentSupervisor {
    pub fn new(dispatcher: ToolDispatcher, display_tx: mpsc::UnboundedSender<String>) -> anyhow::Result<Self> {
        let exe_path = std::env::current_exe()?;
        let work_dir = std::env::temp_dir();
        Ok(Self { state: Arc::new(Mutex::new(SupervisorState::new())), dispatcher, display_tx, exe_path, work_dir })
    }

    #[cfg(test)]
    pub fn with_exe_path(dispatcher: ToolDispatcher, display_tx: mpsc::UnboundedSender<String>, exe_path: PathBuf) -> Self {
        Self { state: Arc::new(Mutex::new(SupervisorState::new())), dispatcher, display_tx, exe_path, work_dir: std::env::temp_dir() }
    }

    /// Spawn a subagent running `prompt`, returning an immediate
    /// acknowledgement naming the task id (§4.E step 6).
    pub async fn spawn(&self, description: impl Into<String>, prompt: impl Into<String>) -> String {
        let description = description.into();
        let prompt = prompt.into();

        let (task_id, batch_id) = {
            let mut state = self.state.lock().await;
            state.task_counter += 1;
            let task_id = format!("task_{}", state.task_counter);
            let batch_id = state.assign_batch(&task_id);
            let mut record = SubagentRecord::new(&task_id, &description, &prompt);
            record.batch_id = Some(batch_id.clone());
            state.records.insert(task_id.clone(), record);
            (task_id, batch_id)
        };

        match self.spawn_child(&task_id, &description, &prompt).await {
            Ok(()) => {
                info!(task_id = %task_id, batch_id = %batch_id, "spawned subagent");
                format!("Started subagent {task_id} (batch {batch_id}): {description}")
            }
            Err(e) => {
                error!(task_id = %task_id, error = %e, "failed to spawn subagent");
                let mut state = self.state.lock().await;
                if let Some(record) = state.records.get_mut(&task_id) {
                    record.mark_completed(format!("Error: subagent spawn failed: {e}"));
                }
                format!("Error: failed to spawn subagent {task_id}: {e}")
            }
        }
    }

    async fn spawn_child(&self, task_id: &str, description: &str, prompt: &str) -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        let task_file = self.work_dir.join(format!("agentloop_task_{task_id}_{}.json", Uuid::new_v4()));
        let task = TaskFile {
            task_id: task_id.to_string(),
            description: description.to_string(),
            prompt: prompt.to_string(),
            timestamp: Utc::now().timestamp(),
            comm_port: Some(port),
        };
        tokio::fs::write(&task_file, serde_json::to_vec(&task)?).await?;

        let mut child = Command::new(&self.exe_path)
            .arg("execute-task")
            .arg(&task_file)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let child_pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (kill_tx, kill_rx) = oneshot::channel();

        {
            let mut state = self.state.lock().await;
            if let Some(record) = state.records.get_mut(task_id) {
                record.comm_port = Some(port);
                record.child_pid = child_pid;
            }
            state.children.insert(task_id.to_string(), kill_tx);
        }

        if let Some(stdout) = stdout {
            self.spawn_output_pump(task_id.to_string(), stdout);
        }
        if let Some(stderr) = stderr {
            self.spawn_output_pump(task_id.to_string(), stderr);
        }

        self.spawn_control_handler(task_id.to_string(), listener);
        self.spawn_exit_watcher(task_id.to_string(), task_file, child, kill_rx);

        Ok(())
    }

    fn spawn_output_pump(&self, task_id: String, stream: impl tokio::io::AsyncRead + Unpin + Send + 'static) {
        let display_tx = self.display_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let _ = display_tx.send(format!("🤖 [SUBAGENT {task_id}] {line}"));
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(task_id = %task_id, error = %e, "subagent output pump read error");
                        break;
                    }
                }
            }
        });
    }

    fn spawn_control_handler(&self, task_id: String, listener: TcpListener) {
        let state = self.state.clone();
        let dispatcher = self.dispatcher.clone();
        let display_tx = self.display_tx.clone();

        tokio::spawn(async move {
            let accepted = tokio::time::timeout(ACCEPT_TIMEOUT, listener.accept()).await;
            let (socket, _) = match accepted {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => {
                    warn!(task_id = %task_id, error = %e, "control socket accept failed");
                    return;
                }
                Err(_) => {
                    warn!(task_id = %task_id, "control socket accept timed out; subagent will run tools locally");
                    return;
                }
            };

            let (read_half, write_half) = socket.into_split();
            let writer = Arc::new(Mutex::new(write_half));
            let mut reader = BufReader::new(read_half);

            loop {
                match read_message(&mut reader).await {
                    Ok(Some(msg)) => {
                        Self::handle_control_message(&task_id, msg, &state, &dispatcher, &display_tx, &writer).await;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(task_id = %task_id, error = %e, "control socket read error");
                        break;
                    }
                }
            }
        });
    }

    async fn handle_control_message(
        task_id: &str,
        msg: ControlMessage,
        state: &Arc<Mutex<SupervisorState>>,
        dispatcher: &ToolDispatcher,
        display_tx: &mpsc::UnboundedSender<String>,
        writer: &Arc<Mutex<tokio::net::tcp::OwnedWriteHalf>>,
    ) {
        match msg {
            ControlMessage::ToolExecutionRequest { request_id, tool_key, tool_args, .. } => {
                let task_id = task_id.to_string();
                let dispatcher = dispatcher.clone();
                let writer = writer.clone();
                tokio::spawn(async move {
                    debug!(task_id = %task_id, tool_key = %tool_key, request_id = %request_id, "dispatching subagent tool call");
                    let call = ToolCall::new(Uuid::new_v4().to_string(), tool_key.clone(), tool_args);
                    let output: ToolOutput = dispatcher.execute(&call).await;
                    let response = ControlMessage::ToolExecutionResponse {
                        request_id,
                        success: output.ok,
                        result: output.ok.then(|| output.payload.clone()),
                        error: (!output.ok).then(|| output.payload.clone()),
                    };
                    let mut w = writer.lock().await;
                    if let Err(e) = write_message(&mut *w, &response).await {
                        warn!(task_id = %task_id, error = %e, "failed to send tool_execution_response");
                    }
                });
            }
            ControlMessage::DisplayMessage { message } => {
                let _ = display_tx.send(format!("🤖 [SUBAGENT {task_id}] {message}"));
            }
            ControlMessage::Status { status } => {
                let _ = display_tx.send(format!("🤖 [SUBAGENT {task_id}] status: {status}"));
            }
            ControlMessage::Error { error } => {
                let _ = display_tx.send(format!("🤖 [SUBAGENT {task_id}] error: {error}"));
            }
            ControlMessage::Result { payload } => {
                // Record the result now; batch consolidation itself is left
                // to the exit watcher once the child process actually
                // terminates, since a child that has sent `result` may
                // still emit trailing display messages before exiting.
                let mut state = state.lock().await;
                if let Some(record) = state.records.get_mut(task_id) {
                    record.mark_completed(payload);
                }
            }
            ControlMessage::ToolExecutionResponse { .. } => {
                warn!(task_id = %task_id, "unexpected tool_execution_response received on parent side");
            }
        }
    }

    fn spawn_exit_watcher(
        &self,
        task_id: String,
        task_file: PathBuf,
        mut child: tokio::process::Child,
        mut kill_rx: oneshot::Receiver<()>,
    ) {
        let state = self.state.clone();
        let display_tx = self.display_tx.clone();

        tokio::spawn(async move {
            let status = tokio::select! {
                s = child.wait() => s,
                _ = &mut kill_rx => {
                    if let Err(e) = child.start_kill() {
                        warn!(task_id = %task_id, error = %e, "failed to kill subagent child on shutdown");
                    }
                    child.wait().await
                }
            };
            match status {
                Ok(s) if s.success() => debug!(task_id = %task_id, "subagent exited cleanly"),
                Ok(s) => warn!(task_id = %task_id, code = ?s.code(), "subagent exited with non-zero status"),
                Err(e) => warn!(task_id = %task_id, error = %e, "failed to wait on subagent child"),
            }

            let result_file = task_file.with_file_name(format!("{}_result.json", task_file.file_stem().and_then(|s| s.to_str()).unwrap_or("task")));

            let mut state_guard = state.lock().await;
            let needs_fallback = state_guard.records.get(&task_id).map(|r| !r.completed).unwrap_or(false);
            if needs_fallback {
                let fallback = match tokio::fs::read_to_string(&result_file).await {
                    Ok(contents) => serde_json::from_str::<crate::protocol::ResultFile>(&contents)
                        .map(|rf| rf.result)
                        .unwrap_or_else(|_| "Result file not found".to_string()),
                    Err(_) => "Result file not found".to_string(),
                };
                if let Some(record) = state_guard.records.get_mut(&task_id) {
                    record.mark_completed(fallback);
                }
            }

            let _ = tokio::fs::remove_file(&task_file).await;
            let _ = tokio::fs::remove_file(&result_file).await;

            let batch_id = state_guard.records.get(&task_id).and_then(|r| r.batch_id.clone());
            state_guard.children.remove(&task_id);
            drop(state_guard);

            if let Some(batch_id) = batch_id {
                Self::try_consolidate(&state, &display_tx, &batch_id).await;
            }
        });
    }

    /// If every record in `batch_id` is completed and it has ≥ 2 members,
    /// emit the consolidated report and drop those records (§4.E "Batch
    /// completion"). Records map and batches map are mutated under the same
    /// lock, so this is atomic with respect to concurrent exit watchers.
    async fn try_consolidate(state: &Arc<Mutex<SupervisorState>>, display_tx: &mpsc::UnboundedSender<String>, batch_id: &str) {
        let mut state = state.lock().await;
        let Some(batch) = state.batches.get(batch_id).cloned() else { return };
        let all_done = batch.task_ids.iter().all(|id| state.records.get(id).map(|r| r.completed).unwrap_or(false));
        if !all_done {
            return;
        }
        if batch.task_ids.len() < 2 {
            // Single-task batches are left for task_results to retrieve.
            return;
        }

        let sorted_ids = batch.sorted_task_ids();
        let mut min_start = None;
        let mut max_end = None;
        let mut body = String::new();
        for id in &sorted_ids {
            if let Some(record) = state.records.get(id) {
                min_start = Some(min_start.map_or(record.spawn_time, |m: chrono::DateTime<Utc>| m.min(record.spawn_time)));
                let end = record.end_time.unwrap_or_else(Utc::now);
                max_end = Some(max_end.map_or(end, |m: chrono::DateTime<Utc>| m.max(end)));
                body.push_str(&format!(
                    "\n- {id} ({}): {}s\n  {}\n",
                    record.description,
                    record.elapsed_secs(),
                    record.result.as_deref().unwrap_or("(no result)")
                ));
            }
        }
        let wall_time = match (min_start, max_end) {
            (Some(s), Some(e)) => (e - s).num_seconds().max(0),
            _ => 0,
        };

        let report = format!(
            "Batch {batch_id} complete ({} tasks, {wall_time}s wall time):{body}",
            sorted_ids.len()
        );
        let _ = display_tx.send(report);

        for id in &sorted_ids {
            state.records.remove(id);
        }
        state.batches.remove(batch_id);
        if state.current_batch_id.as_deref() == Some(batch_id) {
            state.current_batch_id = None;
        }
        info!(batch_id = %batch_id, tasks = sorted_ids.len(), "consolidated subagent batch");
    }

    /// `task_status(task_id)` — report whether a subagent is still running
    /// or has completed, without consuming its result.
    pub async fn task_status(&self, task_id: &str) -> String {
        let state = self.state.lock().await;
        match state.records.get(task_id) {
            Some(r) if r.completed => format!("Task {task_id} completed after {}s", r.elapsed_secs()),
            Some(r) => format!("Task {task_id} still running ({}s elapsed)", r.elapsed_secs()),
            None => format!("Error: no such task {task_id}"),
        }
    }

    /// `task_results(task_id, clear_after_retrieval)` — return a completed
    /// task's result, optionally dropping the record afterward.
    pub async fn task_results(&self, task_id: &str, clear_after_retrieval: bool) -> String {
        let mut state = self.state.lock().await;
        match state.records.get(task_id) {
            None => return format!("Error: no such task {task_id}"),
            Some(r) if !r.completed => return format!("Task {task_id} is still running"),
            Some(r) => {
                let payload = r.result.clone().unwrap_or_default();
                if clear_after_retrieval {
                    state.records.remove(task_id);
                }
                payload
            }
        }
    }

    /// Terminate every live subagent child immediately (`/quit`, §5
    /// "Cancellation"). Firing a child's kill switch asks its exit watcher —
    /// the sole owner of that `Child` — to `start_kill()` it, so a subagent
    /// mid-turn doesn't keep running as an orphan after the supervisor stops
    /// tracking it. A send failing means the watcher already exited (the
    /// child finished on its own first), which is fine.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        for (_task_id, kill_tx) in state.children.drain() {
            let _ = kill_tx.send(());
        }
        state.records.clear();
        state.batches.clear();
        state.current_batch_id = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agentloop_tools::ToolRegistry;

    use super::*;

    fn supervisor() -> (SubagentSupervisor, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = ToolDispatcher::new(Arc::new(ToolRegistry::new()));
        let exe = std::env::current_exe().unwrap();
        (SubagentSupervisor::with_exe_path(dispatcher, tx, exe), rx)
    }

    #[tokio::test]
    async fn task_status_on_unknown_task_is_an_error() {
        let (sup, _rx) = supervisor();
        let status = sup.task_status("task_999").await;
        assert!(status.starts_with("Error:"));
    }

    #[tokio::test]
    async fn task_results_on_unknown_task_is_an_error() {
        let (sup, _rx) = supervisor();
        let results = sup.task_results("task_999", false).await;
        assert!(results.starts_with("Error:"));
    }

    #[tokio::test]
    async fn shutdown_clears_all_state() {
        let (sup, _rx) = supervisor();
        {
            let mut state = sup.state.lock().await;
            state.records.insert("task_1".into(), SubagentRecord::new("task_1", "d", "p"));
        }
        sup.shutdown().await;
        let state = sup.state.lock().await;
        assert!(state.records.is_empty());
    }

    #[tokio::test]
    async fn shutdown_kills_tracked_children() {
        let (sup, _rx) = supervisor();
        let child = Command::new("sleep").arg("30").kill_on_drop(true).spawn().expect("spawn sleep");
        let pid = child.id().expect("child pid");
        let (kill_tx, kill_rx) = oneshot::channel();
        {
            let mut state = sup.state.lock().await;
            state.records.insert("task_1".into(), SubagentRecord::new("task_1", "d", "p"));
            state.children.insert("task_1".into(), kill_tx);
        }
        sup.spawn_exit_watcher("task_1".into(), PathBuf::from("/nonexistent/agentloop_test_task_1.json"), child, kill_rx);

        sup.shutdown().await;

        let proc_path = format!("/proc/{pid}");
        let mut gone = false;
        for _ in 0..50 {
            if !std::path::Path::new(&proc_path).exists() {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(gone, "subagent child should have been killed on shutdown");

        let state = sup.state.lock().await;
        assert!(state.children.is_empty());
    }

    #[test]
    fn assign_batch_opens_new_batch_when_none_current() {
        let mut state = SupervisorState::new();
        let batch_id = state.assign_batch("task_1");
        assert_eq!(batch_id, "batch_1");
        assert_eq!(state.current_batch_id.as_deref(), Some("batch_1"));
    }

    #[test]
    fn assign_batch_joins_current_batch_within_window() {
        let mut state = SupervisorState::new();
        let b1 = state.assign_batch("task_1");
        let b2 = state.assign_batch("task_2");
        assert_eq!(b1, b2);
        assert_eq!(state.batches.get(&b1).unwrap().task_ids.len(), 2);
    }
}
