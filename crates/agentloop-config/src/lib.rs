// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Single-JSON-document persistent configuration.
//!
//! The document lives at `~/.mcp/config.json` by default, overridable by
//! `--config-file`. A missing file is not an error — defaults apply. A
//! malformed one is. No layered search path or deep-merge: this is one
//! document, loaded and saved whole.
pub mod loader;
pub mod schema;

pub use loader::{default_config_path, load, save, update};
pub use schema::{
    BackendConfig, Config, McpServerConfig, CHAT_BACKEND, GEMINI_BACKEND, GEMINI_PRO_BACKEND,
    REASONING_BACKEND,
};
