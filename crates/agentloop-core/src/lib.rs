// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Dispatcher, subagent supervisor, and conversation controller: the runtime
//! core shared by the interactive host process and the `execute-task`
//! subagent worker process.
pub mod controller;
pub mod dispatcher;
pub mod protocol;
pub mod subagent;
pub mod subagent_worker;

pub use controller::{compact, CompactionOutcome, ConversationController, ProviderFactory, TokenReport, estimate_tokens, should_compact};
pub use dispatcher::{normalize_key, SubagentUpstream, ToolDispatcher};
pub use protocol::{read_message, write_message, ControlMessage, ResultFile, TaskFile};
pub use subagent::{Batch, EmitResultTool, SubagentRecord, SubagentSupervisor, TaskResultsTool, TaskStatusTool, TaskTool};
pub use subagent_worker::execute_task;
