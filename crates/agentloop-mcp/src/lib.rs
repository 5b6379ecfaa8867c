// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Remote tool client: one connection per configured MCP server.
//!
//! Each server is a subprocess speaking the MCP stdio transport. On connect
//! we call `list_tools` and register every tool it exposes under
//! `<server-name>:<tool-name>` in the shared [`ToolRegistry`]. Reconnection
//! is not automatic — callers decide when to [`McpConnection::disconnect`]
//! and reconnect.
mod client;
mod proxy;

pub use client::{connect, McpConnection};
pub use proxy::McpProxyTool;
