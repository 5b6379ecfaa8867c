// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Control channel envelope (§3 "Control Message") and the newline-delimited
//! JSON framing used to carry it over the parent↔child TCP loopback socket.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// One envelope on the control socket. `type` is the wire discriminant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    ToolExecutionRequest { request_id: String, tool_key: String, tool_name: String, tool_args: Value },
    ToolExecutionResponse { request_id: String, success: bool, result: Option<String>, error: Option<String> },
    DisplayMessage { message: String },
    Status { status: String },
    Error { error: String },
    Result { payload: String },
}

/// Request file written by the supervisor and read by `execute-task` (§6
/// "Task file / result file").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFile {
    pub task_id: String,
    pub description: String,
    pub prompt: String,
    pub timestamp: i64,
    pub comm_port: Option<u16>,
}

/// Side-channel fallback result, written by a child that could not (or did
/// not) deliver a `result` control message before exiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultFile {
    pub task_id: String,
    pub description: String,
    pub status: String,
    pub result: String,
    pub timestamp: i64,
}

/// Serialise `msg` as one newline-delimited JSON line and write it.
/// Backpressure is unbuffered per §6: this flushes before returning.
pub async fn write_message(
    writer: &mut (impl AsyncWrite + Unpin),
    msg: &ControlMessage,
) -> anyhow::Result<()> {
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Read and parse one line from a buffered reader. `Ok(None)` means EOF
/// (the peer closed the socket).
pub async fn read_message(
    reader: &mut BufReader<impl tokio::io::AsyncRead + Unpin>,
) -> anyhow::Result<Option<ControlMessage>> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line.trim_end())?))
}
