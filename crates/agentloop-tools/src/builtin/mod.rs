// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod bash_execute;
mod get_current_directory;
mod list_directory;
mod read_file;
mod replace_in_file;
mod todo;
mod webfetch;
mod write_file;

pub use bash_execute::BashExecuteTool;
pub use get_current_directory::GetCurrentDirectoryTool;
pub use list_directory::ListDirectoryTool;
pub use read_file::ReadFileTool;
pub use replace_in_file::ReplaceInFileTool;
pub use todo::{TodoReadTool, TodoWriteTool};
pub use webfetch::WebFetchTool;
pub use write_file::WriteFileTool;

use std::sync::Arc;

use crate::registry::ToolRegistry;

/// Register every built-in tool under the `builtin` origin.
pub fn register_all(registry: &ToolRegistry) {
    registry.register("builtin", Arc::new(BashExecuteTool));
    registry.register("builtin", Arc::new(ReadFileTool));
    registry.register("builtin", Arc::new(WriteFileTool));
    registry.register("builtin", Arc::new(ListDirectoryTool));
    registry.register("builtin", Arc::new(GetCurrentDirectoryTool));
    registry.register("builtin", Arc::new(ReplaceInFileTool));
    registry.register("builtin", Arc::new(TodoReadTool));
    registry.register("builtin", Arc::new(TodoWriteTool));
    registry.register("builtin", Arc::new(WebFetchTool));
}
