// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::warn;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use agentloop_config::{Config, McpServerConfig};
use agentloop_core::{ConversationController, ProviderFactory, SubagentSupervisor, TaskResultsTool, TaskStatusTool, TaskTool, ToolDispatcher};
use agentloop_mcp::McpConnection;
use agentloop_model::{CompletionRequest, ModelProvider, ResponseStream};
use agentloop_tools::ToolRegistry;

use cli::{Cli, Commands, McpCommands};

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI agent running in a terminal. You can read and write files, run shell commands, fetch web pages, and delegate independent subtasks to other agents with the task tool.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(matches!(cli.command, Commands::Chat { .. }));

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config_file.clone();

    match cli.command {
        Commands::Init => cmd_init(config_path.as_deref()),
        Commands::Chat { server } => cmd_chat(config_path, server).await,
        Commands::Ask { message, server } => cmd_ask(config_path, message, server).await,
        Commands::SwitchChat => cmd_switch(config_path.as_deref(), agentloop_config::CHAT_BACKEND),
        Commands::SwitchReason => cmd_switch(config_path.as_deref(), agentloop_config::REASONING_BACKEND),
        Commands::SwitchGemini => cmd_switch(config_path.as_deref(), agentloop_config::GEMINI_BACKEND),
        Commands::SwitchGeminiPro => cmd_switch(config_path.as_deref(), agentloop_config::GEMINI_PRO_BACKEND),
        Commands::Mcp { command } => cmd_mcp(config_path.as_deref(), command),
        Commands::ExecuteTask { file } => cmd_execute_task(config_path, file).await,
    }
}

fn cmd_init(config_path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let path = config_path.map(PathBuf::from).unwrap_or_else(agentloop_config::default_config_path);
    if path.exists() {
        println!("Configuration already exists at {}", path.display());
        return Ok(());
    }
    agentloop_config::save(&Config::default(), Some(&path))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn cmd_switch(config_path: Option<&std::path::Path>, backend_name: &str) -> anyhow::Result<()> {
    let config = agentloop_config::update(config_path, |cfg| {
        if let Err(e) = cfg.switch_backend(backend_name) {
            warn!(backend = backend_name, error = %e, "switch_backend failed");
        }
    })?;
    if config.active_backend == backend_name {
        println!("Switched to backend '{backend_name}'");
        Ok(())
    } else {
        anyhow::bail!("no backend named '{backend_name}' configured")
    }
}

fn cmd_mcp(config_path: Option<&std::path::Path>, command: McpCommands) -> anyhow::Result<()> {
    match command {
        McpCommands::Add { server, env } => {
            let (name, command) = cli::parse_server_spec(&server)?;
            let mut env_map = HashMap::new();
            for assignment in &env {
                let (k, v) = cli::parse_env_assignment(assignment)?;
                env_map.insert(k, v);
            }
            let server_config = McpServerConfig { command, args: Vec::new(), env: env_map };
            agentloop_config::update(config_path, |cfg| {
                cfg.mcp_servers.insert(name.clone(), server_config.clone());
            })?;
            println!("Added tool server '{name}'");
            Ok(())
        }
        McpCommands::List => {
            let config = agentloop_config::load(config_path)?;
            if config.mcp_servers.is_empty() {
                println!("No tool servers configured.");
                return Ok(());
            }
            let mut names: Vec<&String> = config.mcp_servers.keys().collect();
            names.sort();
            for name in names {
                let server = &config.mcp_servers[name];
                println!("{name}: {}", server.argv().join(" "));
            }
            Ok(())
        }
        McpCommands::Remove { name } => {
            let config = agentloop_config::update(config_path, |cfg| {
                cfg.mcp_servers.remove(&name);
            })?;
            if config.mcp_servers.contains_key(&name) {
                anyhow::bail!("failed to remove '{name}'");
            }
            println!("Removed tool server '{name}'");
            Ok(())
        }
    }
}

async fn cmd_chat(config_path: Option<PathBuf>, ad_hoc_servers: Vec<String>) -> anyhow::Result<()> {
    let config = agentloop_config::load(config_path.as_deref())?;
    let registry = Arc::new(ToolRegistry::new());
    agentloop_tools::register_all(&registry);

    let dispatcher = ToolDispatcher::new(registry.clone());
    let (display_tx, display_rx) = mpsc::unbounded_channel();
    let supervisor = Arc::new(SubagentSupervisor::new(dispatcher.clone(), display_tx)?);
    registry.register("builtin", Arc::new(TaskTool::new(supervisor.clone())));
    registry.register("builtin", Arc::new(TaskStatusTool::new(supervisor.clone())));
    registry.register("builtin", Arc::new(TaskResultsTool::new(supervisor.clone())));

    let mcp_connections = connect_all_servers(&config, &ad_hoc_servers, &registry).await?;

    let provider = build_provider(&config, &config.active_backend)?;
    let router = agentloop_input::SlashRouter::load(&std::env::current_dir().unwrap_or_default());
    let mut controller = ConversationController::new(provider, dispatcher, router)
        .with_system_prompt(DEFAULT_SYSTEM_PROMPT)
        .with_active_backend(config.active_backend.clone())
        .with_display_channel(display_rx)
        .with_provider_factory(provider_factory());
    if let Some(path) = config_path {
        controller = controller.with_config_path(path);
    }

    let result = controller.run_interactive().await;

    supervisor.shutdown().await;
    for conn in mcp_connections {
        conn.disconnect(registry.as_ref()).await;
    }

    result
}

async fn cmd_ask(config_path: Option<PathBuf>, message: String, ad_hoc_servers: Vec<String>) -> anyhow::Result<()> {
    let config = agentloop_config::load(config_path.as_deref())?;
    let registry = Arc::new(ToolRegistry::new());
    agentloop_tools::register_all(&registry);

    let dispatcher = ToolDispatcher::new(registry.clone());
    let (display_tx, _display_rx) = mpsc::unbounded_channel();
    let supervisor = Arc::new(SubagentSupervisor::new(dispatcher.clone(), display_tx)?);
    registry.register("builtin", Arc::new(TaskTool::new(supervisor.clone())));
    registry.register("builtin", Arc::new(TaskStatusTool::new(supervisor.clone())));
    registry.register("builtin", Arc::new(TaskResultsTool::new(supervisor.clone())));

    let mcp_connections = connect_all_servers(&config, &ad_hoc_servers, &registry).await?;

    let provider = build_provider(&config, &config.active_backend)?;
    let router = agentloop_input::SlashRouter::without_custom_commands();
    let mut controller = ConversationController::new(provider, dispatcher, router)
        .with_system_prompt(DEFAULT_SYSTEM_PROMPT)
        .with_active_backend(config.active_backend.clone());
    controller.seed_user_message(message);

    let answer = controller.run_single_turn().await;

    supervisor.shutdown().await;
    for conn in mcp_connections {
        conn.disconnect(registry.as_ref()).await;
    }

    println!("{}", answer?);
    Ok(())
}

async fn cmd_execute_task(config_path: Option<PathBuf>, file: PathBuf) -> anyhow::Result<()> {
    let config = agentloop_config::load(config_path.as_deref())?;
    let registry = Arc::new(ToolRegistry::new());
    agentloop_tools::register_all(&registry);
    let provider = build_provider(&config, &config.active_backend)?;
    agentloop_core::execute_task(&file, provider, registry, &config.mcp_servers).await
}

/// Connect every persisted tool server plus any ad-hoc `--server name:cmd:arg...`
/// specs given on the command line. Ad-hoc servers are session-only: they are
/// never written back to the config document.
async fn connect_all_servers(config: &Config, ad_hoc: &[String], registry: &Arc<ToolRegistry>) -> anyhow::Result<Vec<McpConnection>> {
    let mut connections = Vec::new();

    for (name, server_config) in &config.mcp_servers {
        match agentloop_mcp::connect(name, server_config, registry.as_ref()).await {
            Ok(conn) => connections.push(conn),
            Err(e) => warn!(server = %name, error = %e, "failed to connect configured tool server"),
        }
    }

    for spec in ad_hoc {
        let (name, command) = cli::parse_server_spec(spec)?;
        let server_config = McpServerConfig { command, args: Vec::new(), env: HashMap::new() };
        match agentloop_mcp::connect(&name, &server_config, registry.as_ref()).await {
            Ok(conn) => connections.push(conn),
            Err(e) => warn!(server = %name, error = %e, "failed to connect ad-hoc tool server"),
        }
    }

    Ok(connections)
}

fn provider_factory() -> ProviderFactory {
    Arc::new(|config: &Config, backend_name: &str| build_provider(config, backend_name))
}

/// Build the model backend for `backend_name`. The concrete LLM API clients
/// are out of scope for this workspace (§1); this stands in with a
/// deterministic echo provider that at least reflects the configured
/// provider/model names back through `/model` and logging, rather than a
/// single hardcoded name regardless of which backend is active.
fn build_provider(config: &Config, backend_name: &str) -> anyhow::Result<Arc<dyn ModelProvider>> {
    let backend = config.backends.get(backend_name).with_context(|| format!("no backend named '{backend_name}' configured"))?;
    Ok(Arc::new(NamedEchoProvider { name: backend_name.to_string(), model: backend.model.clone() }))
}

struct NamedEchoProvider {
    name: String,
    model: String,
}

#[async_trait]
impl ModelProvider for NamedEchoProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let reply = req
            .messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, agentloop_model::Role::User))
            .and_then(|m| m.as_text())
            .unwrap_or("[no input]")
            .to_string();

        let events: Vec<anyhow::Result<agentloop_model::ResponseEvent>> = vec![
            Ok(agentloop_model::ResponseEvent::TextDelta(reply)),
            Ok(agentloop_model::ResponseEvent::Done),
        ];
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

/// `interactive` is true only for `chat`, which puts the terminal into raw
/// mode (`agentloop_input`) while it reads keystrokes; tracing output
/// written to stderr in that window corrupts the prompt's rendering. Other
/// subcommands never enter raw mode, so they log to stderr as usual.
///
/// Set `AGENT_LOG_FILE=/path/to/file` to capture logs from an interactive
/// session without touching the terminal; otherwise interactive logging is
/// suppressed entirely.
fn init_logging(interactive: bool) {
    if interactive {
        if let Ok(log_path) = std::env::var("AGENT_LOG_FILE") {
            if let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(&log_path) {
                let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
                let _ = tracing_subscriber::registry()
                    .with(fmt::layer().with_target(true).with_ansi(false).with_writer(std::sync::Mutex::new(file)))
                    .with(filter)
                    .try_init();
                return;
            }
        }
        let _ = tracing_subscriber::registry().with(tracing_subscriber::filter::LevelFilter::OFF).try_init();
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry().with(fmt::layer().with_target(false).with_writer(std::io::stderr)).with(filter).try_init();
}
