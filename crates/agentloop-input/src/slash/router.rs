// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::path::Path;

use crate::slash::custom::{load_custom_commands, CustomCommand};

const REVIEW_TEMPLATE: &str = "Please review the following file for correctness, style, and potential bugs.\n\nFile: {path}\n\n```\n{contents}\n```\n";

/// What the conversation controller should do in response to a parsed slash
/// command. The router has no access to the message list, tool registry, or
/// live token counts — those live in the controller — so several variants
/// just name the *kind* of action and leave the controller to fill in state.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandDirective {
    /// Print `text` directly to the user; no model call, no state change.
    Print(String),
    /// Persist a backend switch and reload the host provider with it.
    ReloadHost(String),
    /// Report the current backend name; controller fills in the model name.
    ShowCurrentModel,
    /// Wipe the conversation back to just the system message.
    Clear,
    /// Summarise and compact the conversation now, regardless of token pressure.
    Compact,
    /// Report message count / token estimate / percentage of context window.
    Tokens,
    /// List every registered tool.
    Tools,
    /// Orderly shutdown.
    Quit,
    /// Inject a synthesized user turn, handled exactly like a normal prompt
    /// (used by `/review` and by custom markdown commands).
    InjectUserTurn(String),
    /// `mcp__<server>__<prompt>` — recognised but not yet wired to a real
    /// MCP prompt surface.
    McpPromptStub { server: String, prompt: String },
    /// Unrecognised slash command.
    Unknown(String),
}

/// Parses and executes in-process `/…` commands.
pub struct SlashRouter {
    custom: HashMap<String, CustomCommand>,
}

impl SlashRouter {
    /// Load custom commands from the project and personal directories
    /// relative to `cwd`.
    pub fn load(cwd: &Path) -> Self {
        Self { custom: load_custom_commands(cwd) }
    }

    /// Construct a router with no custom commands, for tests or environments
    /// without a filesystem to scan.
    pub fn without_custom_commands() -> Self {
        Self { custom: HashMap::new() }
    }

    /// `true` if `input` should be handed to this router rather than treated
    /// as a normal user turn.
    pub fn is_command(input: &str) -> bool {
        input.trim_start().starts_with('/')
    }

    /// Parse and execute `input` (which must satisfy [`Self::is_command`]).
    pub fn execute(&self, input: &str) -> CommandDirective {
        let trimmed = input.trim_start().trim_start_matches('/');
        let (name, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((n, r)) => (n, r.trim_start()),
            None => (trimmed, ""),
        };

        if let Some(directive) = self.builtin(name, rest) {
            return directive;
        }

        // Namespaced custom command form `prefix:name`.
        let lookup_name = name.rsplit(':').next().unwrap_or(name);
        if let Some(cmd) = self.custom.get(lookup_name) {
            return CommandDirective::InjectUserTurn(cmd.expand(rest));
        }

        if let Some(mcp) = parse_mcp_prompt(name) {
            return mcp;
        }

        CommandDirective::Unknown(name.to_string())
    }

    fn builtin(&self, name: &str, rest: &str) -> Option<CommandDirective> {
        Some(match name {
            "help" => CommandDirective::Print(HELP_TEXT.to_string()),
            "clear" => CommandDirective::Clear,
            "compact" => CommandDirective::Compact,
            "tokens" => CommandDirective::Tokens,
            "tools" => CommandDirective::Tools,
            "quit" | "exit" => CommandDirective::Quit,
            "model" => {
                if rest.is_empty() {
                    CommandDirective::ShowCurrentModel
                } else {
                    CommandDirective::ReloadHost(rest.to_string())
                }
            }
            "switch-chat" => CommandDirective::ReloadHost("chat".to_string()),
            "switch-reason" => CommandDirective::ReloadHost("reasoning".to_string()),
            "switch-gemini" => CommandDirective::ReloadHost("gemini".to_string()),
            "switch-gemini-pro" => CommandDirective::ReloadHost("gemini-pro".to_string()),
            "review" => return Some(expand_review(rest)),
            _ => return None,
        })
    }
}

fn expand_review(file_path: &str) -> CommandDirective {
    if file_path.is_empty() {
        return CommandDirective::Print("Error: /review requires a file path".to_string());
    }
    match std::fs::read_to_string(file_path) {
        Ok(contents) => {
            let prompt = REVIEW_TEMPLATE.replace("{path}", file_path).replace("{contents}", &contents);
            CommandDirective::InjectUserTurn(prompt)
        }
        Err(e) => CommandDirective::Print(format!("Error: could not read {file_path}: {e}")),
    }
}

/// `mcp__<server>__<prompt>` — double-underscore-delimited namespacing.
fn parse_mcp_prompt(name: &str) -> Option<CommandDirective> {
    let rest = name.strip_prefix("mcp__")?;
    let (server, prompt) = rest.split_once("__")?;
    Some(CommandDirective::McpPromptStub { server: server.to_string(), prompt: prompt.to_string() })
}

const HELP_TEXT: &str = "\
Available commands:
  /help                 show this message
  /clear                clear the conversation
  /compact              summarise the conversation now
  /tokens               show token usage for the active model
  /tools                list every registered tool
  /model [name]         show or switch the active model
  /switch-chat          switch to the chat backend
  /switch-reason        switch to the reasoning backend
  /switch-gemini        switch to the gemini backend
  /switch-gemini-pro    switch to the gemini-pro backend
  /review <file>        review a file
  /quit, /exit          exit the program";
