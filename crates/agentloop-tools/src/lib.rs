// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The tool registry and the fixed built-in tool catalog.
//!
//! This crate owns [`Tool`], [`ToolRegistry`], and every in-process
//! executor (filesystem, shell, web, todo-list). `task`/`task_status`/
//! `task_results`/`emit_result` live in `agentloop-core` instead, since they
//! need access to the subagent supervisor.
pub mod builtin;
pub mod events;
pub mod registry;
pub mod tool;

pub use builtin::register_all;
pub use events::{TodoItem, TodoPriority, TodoStatus};
pub use registry::{ToolDescriptor, ToolRegistry};
pub use tool::{Tool, ToolCall, ToolOutput};
