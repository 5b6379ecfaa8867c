// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use agentloop_config::McpServerConfig;
use agentloop_mcp::connect;
use agentloop_tools::ToolRegistry;

#[tokio::test]
async fn connect_to_nonexistent_binary_fails_without_panicking() {
    let registry = ToolRegistry::new();
    let config = McpServerConfig {
        command: vec!["definitely-not-a-real-binary-xyz".into()],
        args: vec![],
        env: Default::default(),
    };
    let result = connect("broken", &config, &registry).await;
    assert!(result.is_err());
    // a failed connect must not leave any descriptors registered
    assert!(registry.enumerate().is_empty());
}

#[tokio::test]
async fn connect_with_empty_command_fails() {
    let registry = ToolRegistry::new();
    let config = McpServerConfig { command: vec![], args: vec![], env: Default::default() };
    let result = connect("empty", &config, &registry).await;
    assert!(result.is_err());
}
