// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The conversation controller (§4.F): drives the interactive loop, scans
//! model output for tool calls, enforces the compaction budget, and mediates
//! ESC cancellation during streaming.
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use agentloop_config::Config;
use agentloop_input::{CommandDirective, InputHandler, InputOutcome, RawModeGuard, SlashRouter};
use agentloop_model::{CompletionRequest, FunctionCall, Message, MessageContent, ModelProvider, ResponseEvent, Role};
use agentloop_tools::ToolCall as DispatchCall;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::controller::compaction::compact;
use crate::controller::tokens::{estimate_tokens, should_compact, TokenReport};
use crate::dispatcher::ToolDispatcher;

/// Builds a fresh [`ModelProvider`] for a named backend after a `/switch-*`
/// or `/model <name>` directive. The concrete LLM API clients are out of
/// scope for this crate (§1); production wiring supplies a factory that
/// constructs the real provider, this crate only defines the seam.
pub type ProviderFactory = Arc<dyn Fn(&Config, &str) -> anyhow::Result<Arc<dyn ModelProvider>> + Send + Sync>;

const ESCAPE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Outcome of driving the model through zero or more tool-call rounds to a
/// final plain-text assistant message.
#[derive(Debug)]
enum TurnOutcome {
    Assistant(String),
    Cancelled,
}

#[derive(Default, Clone)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

pub struct ConversationController {
    messages: Vec<Message>,
    provider: Arc<dyn ModelProvider>,
    dispatcher: ToolDispatcher,
    input: InputHandler,
    router: SlashRouter,
    config_path: Option<PathBuf>,
    active_backend: String,
    provider_factory: Option<ProviderFactory>,
}

impl ConversationController {
    pub fn new(provider: Arc<dyn ModelProvider>, dispatcher: ToolDispatcher, router: SlashRouter) -> Self {
        Self {
            messages: Vec::new(),
            provider,
            dispatcher,
            input: InputHandler::new(),
            router,
            config_path: None,
            active_backend: agentloop_config::CHAT_BACKEND.to_string(),
            provider_factory: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.messages.push(Message::system(prompt));
        self
    }

    /// Install the subagent/background display channel. Forwarded straight
    /// to the input handler, which drains it live while blocked waiting for
    /// a keystroke at the prompt (§4.H), rather than only once per loop
    /// iteration before blocking on input.
    pub fn with_display_channel(self, rx: mpsc::UnboundedReceiver<String>) -> Self {
        self.input.set_display_channel(rx);
        self
    }

    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    pub fn with_provider_factory(mut self, factory: ProviderFactory) -> Self {
        self.provider_factory = Some(factory);
        self
    }

    /// Name the backend `provider` was built from, so `/model` and the
    /// reload-host flow report the right name before any `/switch-*` is run.
    pub fn with_active_backend(mut self, name: impl Into<String>) -> Self {
        self.active_backend = name.into();
        self
    }

    pub fn seed_user_message(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// §4.F's main loop, steps 1-6, run until `/quit`/EOF.
    pub async fn run_interactive(&mut self) -> anyhow::Result<()> {
        loop {
            let outcome = self.input.get_input("> ", false, false).await?;
            let input_text = match outcome {
                InputOutcome::Eof => return Ok(()),
                InputOutcome::Cancelled => {
                    self.input.clear_interrupt();
                    continue;
                }
                InputOutcome::Empty => continue,
                InputOutcome::Text(t) => t,
            };

            if SlashRouter::is_command(&input_text) {
                let directive = self.router.execute(&input_text);
                match self.apply_directive(directive).await {
                    DirectiveOutcome::Continue => continue,
                    DirectiveOutcome::Quit => {
                        self.shutdown().await;
                        return Ok(());
                    }
                    DirectiveOutcome::InjectedTurn(text) => self.messages.push(Message::user(text)),
                }
            } else {
                self.messages.push(Message::user(input_text));
            }

            match self.drive_to_completion(true).await {
                Ok(TurnOutcome::Assistant(text)) => {
                    println!("{text}");
                }
                Ok(TurnOutcome::Cancelled) => {
                    println!("(cancelled)");
                }
                Err(e) => {
                    // MODEL_BACKEND_FAILURE (§7): discard the turn, keep looping.
                    warn!(error = %e, "model backend failure");
                    println!("Error generating response: {e}");
                }
            }
        }
    }

    /// §4.I's degenerate single-turn loop for a subagent worker: no
    /// interactive input, no ESC handling, just drive tool rounds to a
    /// final assistant message and return its text.
    pub async fn run_single_turn(&mut self) -> anyhow::Result<String> {
        match self.drive_to_completion(false).await? {
            TurnOutcome::Assistant(text) => Ok(text),
            TurnOutcome::Cancelled => anyhow::bail!("single-turn conversation was unexpectedly cancelled"),
        }
    }

    async fn apply_directive(&mut self, directive: CommandDirective) -> DirectiveOutcome {
        match directive {
            CommandDirective::Print(text) => {
                println!("{text}");
                DirectiveOutcome::Continue
            }
            CommandDirective::Clear => {
                let system = self.messages.first().filter(|m| m.role == Role::System).cloned();
                self.messages.clear();
                if let Some(system) = system {
                    self.messages.push(system);
                }
                DirectiveOutcome::Continue
            }
            CommandDirective::Compact => {
                compact(&mut self.messages, self.provider.as_ref()).await;
                DirectiveOutcome::Continue
            }
            CommandDirective::Tokens => {
                let report = TokenReport::new(&self.messages, self.provider.context_limit());
                println!("{report}");
                DirectiveOutcome::Continue
            }
            CommandDirective::Tools => {
                for descriptor in self.dispatcher.registry().enumerate() {
                    println!("{}: {}", descriptor.key, descriptor.description);
                }
                DirectiveOutcome::Continue
            }
            CommandDirective::ShowCurrentModel => {
                println!("{} ({})", self.active_backend, self.provider.model_name());
                DirectiveOutcome::Continue
            }
            CommandDirective::ReloadHost(backend_name) => {
                self.reload_host(&backend_name).await;
                DirectiveOutcome::Continue
            }
            CommandDirective::Quit => DirectiveOutcome::Quit,
            CommandDirective::InjectUserTurn(text) => DirectiveOutcome::InjectedTurn(text),
            CommandDirective::McpPromptStub { server, prompt } => {
                println!("mcp prompt '{prompt}' on server '{server}' is not yet wired up");
                DirectiveOutcome::Continue
            }
            CommandDirective::Unknown(name) => {
                println!("Unknown command: /{name}");
                DirectiveOutcome::Continue
            }
        }
    }

    async fn reload_host(&mut self, backend_name: &str) {
        let Some(factory) = self.provider_factory.clone() else {
            println!("Error: no provider factory configured, cannot switch backend");
            return;
        };

        let path = self.config_path.clone();
        let result = agentloop_config::update(path.as_deref(), |cfg| {
            if let Err(e) = cfg.switch_backend(backend_name) {
                warn!(backend = backend_name, error = %e, "switch_backend failed");
            }
        });

        match result {
            Ok(config) => match factory(&config, backend_name) {
                Ok(provider) => {
                    self.active_backend = backend_name.to_string();
                    self.provider = provider;
                    println!("Switched to backend '{backend_name}' ({})", self.provider.model_name());
                }
                Err(e) => println!("Error: failed to initialise backend '{backend_name}': {e}"),
            },
            Err(e) => println!("Error: failed to persist backend switch: {e}"),
        }
    }

    async fn shutdown(&mut self) {
        // Remote tool transports and subagent children are owned by the
        // caller (the CLI layer holds the McpConnection/SubagentSupervisor
        // handles); the controller's contribution to orderly shutdown is
        // simply to stop driving further turns.
        debug!("conversation controller shutting down");
    }

    /// Steps 3-6 of §4.F: compact if necessary, ask the model, dispatch any
    /// tool calls, and repeat until a plain assistant message comes back or
    /// the user cancels via ESC.
    async fn drive_to_completion(&mut self, interactive: bool) -> anyhow::Result<TurnOutcome> {
        loop {
            if should_compact(&self.messages, self.provider.context_limit()) {
                compact(&mut self.messages, self.provider.as_ref()).await;
            }

            let request = CompletionRequest {
                messages: self.messages.clone(),
                tools: self.dispatcher.build_schemas(),
                stream: true,
                system_dynamic_suffix: None,
            };

            let (text, tool_calls, cancelled) = self.stream_completion(request, interactive).await?;

            if cancelled {
                self.input.clear_interrupt();
                return Ok(TurnOutcome::Cancelled);
            }

            if tool_calls.is_empty() {
                self.messages.push(Message::assistant(&text));
                return Ok(TurnOutcome::Assistant(text));
            }

            for (_, call) in tool_calls {
                self.messages.push(Message {
                    role: Role::Assistant,
                    content: MessageContent::ToolCall {
                        tool_call_id: call.id.clone(),
                        function: FunctionCall { name: call.name.clone(), arguments: call.arguments.clone() },
                    },
                });

                let args: serde_json::Value = serde_json::from_str(&call.arguments).unwrap_or(serde_json::Value::Null);
                let tool_key = self.dispatcher.denormalize(&call.name);
                let dispatch_call = DispatchCall::new(call.id.clone(), tool_key, args);
                let output = self.dispatcher.execute(&dispatch_call).await;
                self.messages.push(Message::tool_result(call.id, output.payload));
            }
        }
    }

    /// Consume one streamed completion, optionally watching for ESC
    /// cancellation (only while `interactive`, and only inside raw mode —
    /// see §4.H). Returns the accumulated text, the accumulated tool calls
    /// keyed by stream index, and whether the user cancelled.
    async fn stream_completion(
        &mut self,
        request: CompletionRequest,
        interactive: bool,
    ) -> anyhow::Result<(String, BTreeMap<u32, PartialToolCall>, bool)> {
        self.input.clear_interrupt();
        let mut stream = self.provider.complete(request).await?;

        let _raw_guard = if interactive { Some(RawModeGuard::enable()?) } else { None };
        let mut escape_poll = interactive.then(|| tokio::time::interval(ESCAPE_POLL_INTERVAL));

        let mut text = String::new();
        let mut tool_calls: BTreeMap<u32, PartialToolCall> = BTreeMap::new();
        let mut cancelled = false;

        'outer: loop {
            if let Some(poll) = escape_poll.as_mut() {
                tokio::select! {
                    _ = poll.tick() => {
                        if self.input.poll_escape()? {
                            cancelled = true;
                            break 'outer;
                        }
                        continue 'outer;
                    }
                    next = stream.next() => {
                        match self.apply_stream_event(next, &mut text, &mut tool_calls)? {
                            StreamStep::Continue => continue 'outer,
                            StreamStep::Done => break 'outer,
                        }
                    }
                }
            } else {
                let next = stream.next().await;
                match self.apply_stream_event(next, &mut text, &mut tool_calls)? {
                    StreamStep::Continue => continue 'outer,
                    StreamStep::Done => break 'outer,
                }
            }
        }

        Ok((text, tool_calls, cancelled))
    }

    fn apply_stream_event(
        &self,
        next: Option<anyhow::Result<ResponseEvent>>,
        text: &mut String,
        tool_calls: &mut BTreeMap<u32, PartialToolCall>,
    ) -> anyhow::Result<StreamStep> {
        match next {
            None => Ok(StreamStep::Done),
            Some(Err(e)) => Err(e),
            Some(Ok(ResponseEvent::TextDelta(delta))) => {
                text.push_str(&delta);
                Ok(StreamStep::Continue)
            }
            Some(Ok(ResponseEvent::ThinkingDelta(_))) => Ok(StreamStep::Continue),
            Some(Ok(ResponseEvent::ToolCall { index, id, name, arguments })) => {
                let entry = tool_calls.entry(index).or_default();
                if !id.is_empty() {
                    entry.id = id;
                }
                if !name.is_empty() {
                    entry.name = name;
                }
                entry.arguments = arguments;
                Ok(StreamStep::Continue)
            }
            Some(Ok(ResponseEvent::Usage { .. })) => Ok(StreamStep::Continue),
            Some(Ok(ResponseEvent::Error(e))) => {
                warn!(error = %e, "model stream reported a recoverable error");
                Ok(StreamStep::Continue)
            }
            Some(Ok(ResponseEvent::Done)) => Ok(StreamStep::Done),
        }
    }
}

enum StreamStep {
    Continue,
    Done,
}

#[derive(Debug, PartialEq)]
enum DirectiveOutcome {
    Continue,
    Quit,
    InjectedTurn(String),
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agentloop_model::{ResponseEvent, ScriptedMockProvider};
    use agentloop_tools::ToolRegistry;

    use super::*;

    fn controller(provider: Arc<dyn ModelProvider>) -> ConversationController {
        let dispatcher = ToolDispatcher::new(Arc::new(ToolRegistry::new()));
        let router = SlashRouter::without_custom_commands();
        ConversationController::new(provider, dispatcher, router).with_system_prompt("be helpful")
    }

    #[tokio::test]
    async fn with_active_backend_overrides_the_default_before_any_switch() {
        let provider = Arc::new(ScriptedMockProvider::always_text("ignored"));
        let mut c = controller(provider).with_active_backend("reasoning");
        let directive = c.apply_directive(CommandDirective::ShowCurrentModel).await;
        assert_eq!(directive, DirectiveOutcome::Continue);
        assert_eq!(c.active_backend, "reasoning");
    }

    #[tokio::test]
    async fn plain_text_reply_appends_one_assistant_message() {
        let provider = Arc::new(ScriptedMockProvider::always_text("hi there"));
        let mut c = controller(provider);
        c.seed_user_message("hello");
        let result = c.run_single_turn().await.unwrap();
        assert_eq!(result, "hi there");
        assert_eq!(c.messages().len(), 3); // system, user, assistant
        assert_eq!(c.messages().last().unwrap().as_text(), Some("hi there"));
    }

    #[tokio::test]
    async fn tool_call_round_trip_appends_call_and_result_before_final_text() {
        let provider = Arc::new(ScriptedMockProvider::tool_then_text("call-1", "builtin_echo", r#"{"x":1}"#, "done"));
        let registry = Arc::new(ToolRegistry::new());
        registry.register("builtin", Arc::new(EchoTool));
        let dispatcher = ToolDispatcher::new(registry);
        let router = SlashRouter::without_custom_commands();
        let mut c = ConversationController::new(provider, dispatcher, router).with_system_prompt("sys");
        c.seed_user_message("echo please");

        let result = c.run_single_turn().await.unwrap();
        assert_eq!(result, "done");

        let has_tool_call = c.messages().iter().any(|m| matches!(m.content, MessageContent::ToolCall { .. }));
        let has_tool_result = c.messages().iter().any(|m| matches!(m.content, MessageContent::ToolResult { .. }));
        assert!(has_tool_call && has_tool_result);
    }

    #[tokio::test]
    async fn model_error_event_does_not_abort_the_stream() {
        let provider = Arc::new(ScriptedMockProvider::new(vec![vec![
            ResponseEvent::Error("transient".into()),
            ResponseEvent::TextDelta("recovered".into()),
            ResponseEvent::Done,
        ]]));
        let mut c = controller(provider);
        c.seed_user_message("hi");
        let result = c.run_single_turn().await.unwrap();
        assert_eq!(result, "recovered");
    }

    struct EchoTool;

    #[async_trait::async_trait]
    impl agentloop_tools::Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, call: &agentloop_tools::ToolCall) -> agentloop_tools::ToolOutput {
            agentloop_tools::ToolOutput::ok(&call.call_id, format!("echoed {}", call.arguments))
        }
    }
}
