// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Subagent lifecycle (§4.E): records, batch coalescing, the supervisor
//! itself, and the `task`/`task_status`/`task_results`/`emit_result` tools.
pub mod batch;
pub mod record;
pub mod supervisor;
pub mod tools;

pub use batch::Batch;
pub use record::SubagentRecord;
pub use supervisor::SubagentSupervisor;
pub use tools::{EmitResultTool, TaskResultsTool, TaskStatusTool, TaskTool};
