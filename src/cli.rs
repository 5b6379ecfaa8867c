// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "agentloop",
    about = "A terminal AI agent with sub-agent delegation and MCP tool servers",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the persistent config document (default: ~/.mcp/config.json).
    #[arg(long, short = 'c', global = true)]
    pub config_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write the default configuration document if none exists yet.
    Init,

    /// Start an interactive conversation.
    Chat {
        /// Additional tool server for this session only, as `name:cmd:arg...`.
        /// May be repeated. Not persisted — use `mcp add` for that.
        #[arg(long = "server", value_name = "NAME:CMD:ARG...")]
        server: Vec<String>,
    },

    /// Ask a single question and print the final answer.
    Ask {
        /// The message to send.
        message: String,
        /// Additional tool server for this run only, as `name:cmd:arg...`.
        #[arg(long = "server", value_name = "NAME:CMD:ARG...")]
        server: Vec<String>,
    },

    /// Switch the active backend to "chat" and persist the change.
    SwitchChat,
    /// Switch the active backend to "reasoning" and persist the change.
    SwitchReason,
    /// Switch the active backend to "gemini" and persist the change.
    SwitchGemini,
    /// Switch the active backend to "gemini-pro" and persist the change.
    SwitchGeminiPro,

    /// Manage configured MCP tool servers.
    Mcp {
        #[command(subcommand)]
        command: McpCommands,
    },

    /// Internal: run as a subagent worker for the task described in `file`.
    /// Invoked by the subagent supervisor, not meant to be run by hand.
    #[command(hide = true)]
    ExecuteTask { file: PathBuf },
}

#[derive(Subcommand, Debug)]
pub enum McpCommands {
    /// Add (or replace) a configured tool server.
    Add {
        /// `name:cmd:arg...` — the server name followed by its argv.
        server: String,
        /// Environment variable to set for the server subprocess, `KEY=VALUE`.
        /// May be repeated.
        #[arg(long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,
    },
    /// List every configured tool server.
    List,
    /// Remove a configured tool server by name.
    Remove { name: String },
}

/// Parse a `name:cmd:arg...` server spec into its name and argv.
pub fn parse_server_spec(spec: &str) -> anyhow::Result<(String, Vec<String>)> {
    let mut parts = spec.split(':');
    let name = parts.next().filter(|s| !s.is_empty()).ok_or_else(|| anyhow::anyhow!("empty server name in '{spec}'"))?;
    let command: Vec<String> = parts.map(str::to_string).collect();
    if command.is_empty() {
        anyhow::bail!("server spec '{spec}' is missing a command (expected name:cmd[:arg...])");
    }
    Ok((name.to_string(), command))
}

/// Parse a `KEY=VALUE` environment variable assignment.
pub fn parse_env_assignment(assignment: &str) -> anyhow::Result<(String, String)> {
    let (key, value) = assignment.split_once('=').ok_or_else(|| anyhow::anyhow!("expected KEY=VALUE, got '{assignment}'"))?;
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_server_spec_splits_name_and_argv() {
        let (name, argv) = parse_server_spec("filesystem:mcp-fs:--root:/tmp").unwrap();
        assert_eq!(name, "filesystem");
        assert_eq!(argv, vec!["mcp-fs", "--root", "/tmp"]);
    }

    #[test]
    fn parse_server_spec_rejects_missing_command() {
        assert!(parse_server_spec("filesystem").is_err());
    }

    #[test]
    fn parse_env_assignment_splits_on_first_equals() {
        let (k, v) = parse_env_assignment("API_KEY=abc=123").unwrap();
        assert_eq!(k, "API_KEY");
        assert_eq!(v, "abc=123");
    }
}
