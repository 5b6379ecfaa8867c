// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::{Tool, ToolCall, ToolOutput};

/// Descriptor for a single registered tool.
///
/// `key` is the fully qualified `<origin>:<name>` identifier used by the
/// dispatcher and seen (in normalised form) by the model. `origin` is
/// `"builtin"` for in-process tools or a configured MCP server name.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub key: String,
    pub origin: String,
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub tool: Arc<dyn Tool>,
}

/// Tool-key → descriptor registry.
///
/// Writes happen only at construction (built-ins) and at remote-server
/// connect/disconnect; the registry is read-mostly in steady state, so a
/// `RwLock` is enough — no need for per-call locking on the dispatch path.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, ToolDescriptor>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: RwLock::new(HashMap::new()) }
    }

    /// Register a tool under `<origin>:<name>`. A second registration under
    /// the same key overwrites the prior descriptor — this is how a remote
    /// server's tool list is refreshed on reconnect.
    pub fn register(&self, origin: impl Into<String>, tool: Arc<dyn Tool>) {
        let origin = origin.into();
        let name = tool.name().to_string();
        let key = format!("{origin}:{name}");
        let descriptor = ToolDescriptor {
            key: key.clone(),
            origin,
            description: tool.description().to_string(),
            input_schema: tool.parameters_schema(),
            name,
            tool,
        };
        self.tools.write().unwrap().insert(key, descriptor);
    }

    pub fn lookup(&self, key: &str) -> Option<ToolDescriptor> {
        self.tools.read().unwrap().get(key).cloned()
    }

    /// Remove every descriptor belonging to `origin` (a disconnected remote
    /// server). Mandatory on disconnect to avoid dangling transport handles.
    pub fn remove_origin(&self, origin: &str) {
        self.tools.write().unwrap().retain(|_, d| d.origin != origin);
    }

    /// All registered descriptors, sorted by key for deterministic display.
    pub fn enumerate(&self) -> Vec<ToolDescriptor> {
        let mut all: Vec<ToolDescriptor> = self.tools.read().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    pub async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let descriptor = self.lookup(&call.tool_key);
        match descriptor {
            Some(d) => d.tool.execute(call).await,
            None => {
                let available: Vec<String> =
                    self.enumerate().into_iter().take(10).map(|d| d.key).collect();
                ToolOutput::err(
                    &call.call_id,
                    format!(
                        "Tool {} not found. Available: {:?}",
                        call.tool_key, available
                    ),
                )
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::tool::{Tool, ToolCall, ToolOutput};

    struct EchoTool {
        name: &'static str,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.call_id, format!("echo:{}", call.arguments))
        }
    }

    #[test]
    fn register_and_lookup_uses_origin_composite_key() {
        let reg = ToolRegistry::new();
        reg.register("builtin", Arc::new(EchoTool { name: "echo" }));
        assert!(reg.lookup("builtin:echo").is_some());
        assert!(reg.lookup("echo").is_none());
    }

    #[test]
    fn remove_origin_drops_only_that_origins_tools() {
        let reg = ToolRegistry::new();
        reg.register("builtin", Arc::new(EchoTool { name: "echo" }));
        reg.register("myserver", Arc::new(EchoTool { name: "remote_tool" }));
        reg.remove_origin("myserver");
        assert!(reg.lookup("builtin:echo").is_some());
        assert!(reg.lookup("myserver:remote_tool").is_none());
    }

    #[test]
    fn re_registering_same_key_overwrites() {
        let reg = ToolRegistry::new();
        reg.register("builtin", Arc::new(EchoTool { name: "echo" }));
        reg.register("builtin", Arc::new(EchoTool { name: "echo" }));
        assert_eq!(reg.enumerate().len(), 1);
    }

    #[tokio::test]
    async fn execute_known_tool_succeeds() {
        let reg = ToolRegistry::new();
        reg.register("builtin", Arc::new(EchoTool { name: "echo" }));
        let call = ToolCall::new("c1", "builtin:echo", json!({"x": 1}));
        let out = reg.execute(&call).await;
        assert!(out.ok);
        assert!(out.payload.starts_with("echo:"));
    }

    #[tokio::test]
    async fn execute_unknown_tool_lists_available_keys() {
        let reg = ToolRegistry::new();
        reg.register("builtin", Arc::new(EchoTool { name: "echo" }));
        let call = ToolCall::new("c1", "builtin:missing", json!({}));
        let out = reg.execute(&call).await;
        assert!(!out.ok);
        assert!(out.payload.contains("builtin:missing not found"));
        assert!(out.payload.contains("builtin:echo"));
    }
}
