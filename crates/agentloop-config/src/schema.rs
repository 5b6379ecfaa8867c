// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The four backend slots the slash-command router can switch between.
pub const CHAT_BACKEND: &str = "chat";
pub const REASONING_BACKEND: &str = "reasoning";
pub const GEMINI_BACKEND: &str = "gemini";
pub const GEMINI_PRO_BACKEND: &str = "gemini-pro";

/// Per-backend model selection and credentials. The concrete API client that
/// reads `provider`/`model`/`api_key*` lives outside this workspace; this
/// struct only carries the envelope the loader persists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    pub provider: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_temperature() -> f32 {
    0.7
}

impl BackendConfig {
    fn anthropic(model: &str) -> Self {
        Self {
            provider: "anthropic".into(),
            model: model.into(),
            temperature: default_temperature(),
            api_key_env: Some("ANTHROPIC_API_KEY".into()),
            api_key: None,
        }
    }

    fn gemini(model: &str) -> Self {
        Self {
            provider: "gemini".into(),
            model: model.into(),
            temperature: default_temperature(),
            api_key_env: Some("GEMINI_API_KEY".into()),
            api_key: None,
        }
    }
}

/// One configured MCP tool server: a subprocess command plus its argument
/// list and environment. `command` holds the executable and any arguments
/// baked into it (e.g. from `mcp add name:cmd:arg1:arg2`); `args` holds
/// arguments appended at connect time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct McpServerConfig {
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl McpServerConfig {
    /// The full argv this server should be spawned with.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = self.command.clone();
        argv.extend(self.args.iter().cloned());
        argv
    }
}

/// The persistent configuration document: `~/.mcp/config.json` by default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Name of the currently active entry in `backends`.
    pub active_backend: String,
    pub backends: HashMap<String, BackendConfig>,
    #[serde(default)]
    pub mcp_servers: HashMap<String, McpServerConfig>,
}

impl Config {
    pub fn active(&self) -> Option<&BackendConfig> {
        self.backends.get(&self.active_backend)
    }

    /// Point `active_backend` at `name`, failing if no such backend exists.
    pub fn switch_backend(&mut self, name: &str) -> Result<(), String> {
        if self.backends.contains_key(name) {
            self.active_backend = name.to_string();
            Ok(())
        } else {
            Err(format!("no backend named '{name}' configured"))
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut backends = HashMap::new();
        backends.insert(CHAT_BACKEND.to_string(), BackendConfig::anthropic("claude-sonnet"));
        backends.insert(REASONING_BACKEND.to_string(), BackendConfig::anthropic("claude-opus"));
        backends.insert(GEMINI_BACKEND.to_string(), BackendConfig::gemini("gemini-flash"));
        backends.insert(GEMINI_PRO_BACKEND.to_string(), BackendConfig::gemini("gemini-pro"));
        Self { active_backend: CHAT_BACKEND.to_string(), backends, mcp_servers: HashMap::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_all_four_backends() {
        let cfg = Config::default();
        assert!(cfg.backends.contains_key(CHAT_BACKEND));
        assert!(cfg.backends.contains_key(REASONING_BACKEND));
        assert!(cfg.backends.contains_key(GEMINI_BACKEND));
        assert!(cfg.backends.contains_key(GEMINI_PRO_BACKEND));
        assert_eq!(cfg.active_backend, CHAT_BACKEND);
    }

    #[test]
    fn switch_backend_to_known_name_succeeds() {
        let mut cfg = Config::default();
        cfg.switch_backend(REASONING_BACKEND).unwrap();
        assert_eq!(cfg.active_backend, REASONING_BACKEND);
    }

    #[test]
    fn switch_backend_to_unknown_name_fails() {
        let mut cfg = Config::default();
        assert!(cfg.switch_backend("nonexistent").is_err());
        assert_eq!(cfg.active_backend, CHAT_BACKEND);
    }

    #[test]
    fn mcp_server_argv_concatenates_command_and_args() {
        let server = McpServerConfig {
            command: vec!["node".into(), "server.js".into()],
            args: vec!["--verbose".into()],
            env: HashMap::new(),
        };
        assert_eq!(server.argv(), vec!["node", "server.js", "--verbose"]);
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = Config::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
