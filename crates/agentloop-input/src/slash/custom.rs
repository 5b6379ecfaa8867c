// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, warn};

/// Where a slash command came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    Builtin,
    Project,
    Personal,
    Mcp,
}

/// A markdown-file-backed custom command. `body` has `$ARGUMENTS` substituted
/// with the command tail at invocation time.
#[derive(Debug, Clone)]
pub struct CustomCommand {
    pub name: String,
    pub body: String,
    pub scope: CommandScope,
}

impl CustomCommand {
    /// Substitute `$ARGUMENTS` in the body with `args` (the text following
    /// the command name, possibly empty).
    pub fn expand(&self, args: &str) -> String {
        self.body.replace("$ARGUMENTS", args)
    }
}

/// Load every `*.md` file under `dir` as a custom command. The file stem
/// becomes the command name (e.g. `review.md` → `/review`). Returns an
/// empty map if `dir` doesn't exist — custom commands are optional.
fn load_dir(dir: &Path, scope: CommandScope) -> HashMap<String, CustomCommand> {
    let mut out = HashMap::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return out,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
        match std::fs::read_to_string(&path) {
            Ok(body) => {
                debug!(path = %path.display(), name = stem, "loaded custom slash command");
                out.insert(stem.to_string(), CustomCommand { name: stem.to_string(), body, scope });
            }
            Err(e) => warn!(path = %path.display(), error = %e, "failed to read custom command"),
        }
    }
    out
}

/// Load custom commands from both the project (`<cwd>/.claude/commands/`)
/// and personal (`~/.claude/commands/`) directories. Project-scoped commands
/// take precedence on name collision, matching how a user would expect a
/// repo-local override to win.
///
/// A namespaced form `prefix:name` is recognised by the router, not here:
/// the loader keys purely on file stem.
pub fn load_custom_commands(cwd: &Path) -> HashMap<String, CustomCommand> {
    let mut commands = HashMap::new();
    if let Some(home) = dirs::home_dir() {
        commands.extend(load_dir(&home.join(".claude").join("commands"), CommandScope::Personal));
    }
    commands.extend(load_dir(&cwd.join(".claude").join("commands"), CommandScope::Project));
    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn loads_md_files_keyed_by_stem() {
        let dir = tempdir().unwrap();
        let commands_dir = dir.path().join(".claude").join("commands");
        std::fs::create_dir_all(&commands_dir).unwrap();
        std::fs::write(commands_dir.join("review.md"), "Review this: $ARGUMENTS").unwrap();
        std::fs::write(commands_dir.join("ignored.txt"), "not markdown").unwrap();

        let loaded = load_custom_commands(dir.path());
        assert!(loaded.contains_key("review"));
        assert!(!loaded.contains_key("ignored"));
    }

    #[test]
    fn missing_directory_yields_empty_map() {
        let dir = tempdir().unwrap();
        let loaded = load_custom_commands(dir.path());
        assert!(loaded.is_empty() || loaded.values().all(|c| c.scope == CommandScope::Personal));
    }

    #[test]
    fn expand_substitutes_arguments() {
        let cmd = CustomCommand { name: "review".into(), body: "Look at $ARGUMENTS please".into(), scope: CommandScope::Project };
        assert_eq!(cmd.expand("foo.rs"), "Look at foo.rs please");
    }

    #[test]
    fn expand_with_no_arguments_placeholder_leaves_body_unchanged() {
        let cmd = CustomCommand { name: "help".into(), body: "Static body".into(), scope: CommandScope::Project };
        assert_eq!(cmd.expand("anything"), "Static body");
    }
}
