// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

/// A single tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque identifier, model-assigned or synthesised.
    pub call_id: String,
    /// Fully qualified `<origin>:<name>` key.
    pub tool_key: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(call_id: impl Into<String>, tool_key: impl Into<String>, arguments: Value) -> Self {
        Self { call_id: call_id.into(), tool_key: tool_key.into(), arguments }
    }

    /// Synthesise a call id when the model backend doesn't assign one:
    /// `call_<tool>_<unix-epoch>`.
    pub fn synthesize_id(tool_name: &str) -> String {
        let epoch = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        format!("call_{tool_name}_{epoch}")
    }
}

/// The result of a tool invocation. `payload` is always string-valued — tool
/// outputs are normalised to text before being handed back to the model.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub ok: bool,
    pub payload: String,
    pub error: Option<String>,
}

impl ToolOutput {
    pub fn ok(call_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self { call_id: call_id.into(), ok: true, payload: payload.into(), error: None }
    }

    /// User-initiated cancellation (ESC during a keep-alive wrapped call).
    /// Surfaced verbatim per §7 `TOOL_CANCELLED`, without the `"Error: "`
    /// prefix other failures carry — this is not a tool malfunction.
    pub fn cancelled(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            ok: false,
            payload: "Tool execution cancelled".to_string(),
            error: Some("cancelled".to_string()),
        }
    }

    /// Every error payload starts with `"Error: "`.
    pub fn err(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let payload =
            if message.starts_with("Error: ") { message.clone() } else { format!("Error: {message}") };
        Self { call_id: call_id.into(), ok: false, payload, error: Some(message) }
    }
}

/// A single tool implementation, registered under a fully qualified key
/// (`<origin>:<name>`). Every executor is expected to be a pure function of
/// its arguments except for documented filesystem/process side effects;
/// errors are captured into [`ToolOutput::err`], never raised as panics.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    async fn execute(&self, call: &ToolCall) -> ToolOutput;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn err_prefixes_error_once() {
        let o = ToolOutput::err("c1", "file not found");
        assert_eq!(o.payload, "Error: file not found");
        assert!(!o.ok);
    }

    #[test]
    fn cancelled_has_no_error_prefix() {
        let o = ToolOutput::cancelled("c1");
        assert_eq!(o.payload, "Tool execution cancelled");
        assert!(!o.ok);
    }

    #[test]
    fn err_does_not_double_prefix() {
        let o = ToolOutput::err("c1", "Error: already prefixed");
        assert_eq!(o.payload, "Error: already prefixed");
    }

    #[test]
    fn ok_output_carries_no_error() {
        let o = ToolOutput::ok("c1", "done");
        assert!(o.ok);
        assert!(o.error.is_none());
    }

    #[test]
    fn synthesized_ids_are_namespaced_by_tool() {
        let id = ToolCall::synthesize_id("read_file");
        assert!(id.starts_with("call_read_file_"));
    }
}
