// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::schema::Config;

/// Default config path: `~/.mcp/config.json`.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".mcp").join("config.json")
}

/// Load the single JSON configuration document at `path` (or the default
/// path when `None`). A missing file is not an error — the default
/// configuration applies. A malformed file is.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);

    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no config file found, using defaults");
            return Ok(Config::default());
        }
        Err(e) => return Err(e).with_context(|| format!("reading config file {}", path.display())),
    };

    serde_json::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
}

/// Persist `config` as the JSON document at `path` (or the default path).
/// Creates the parent directory if necessary and writes pretty-printed JSON.
pub fn save(config: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(config).context("serialising config")?;
    std::fs::write(&path, json).with_context(|| format!("writing config file {}", path.display()))?;
    Ok(())
}

/// Load, run `mutate`, then save back to the same path. Used by the
/// `switch-*` slash commands and the `mcp add/remove` subcommands, all of
/// which read-modify-write the same document.
pub fn update(path: Option<&Path>, mutate: impl FnOnce(&mut Config)) -> Result<Config> {
    let mut config = load(path)?;
    mutate(&mut config);
    if let Err(e) = save(&config, path) {
        warn!(error = %e, "failed to persist updated configuration");
        return Err(e);
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let cfg = load(Some(&path)).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not valid json").unwrap();
        assert!(load(Some(&path)).is_err());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut cfg = Config::default();
        cfg.switch_backend(crate::schema::REASONING_BACKEND).unwrap();
        save(&cfg, Some(&path)).unwrap();
        let loaded = load(Some(&path)).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn update_mutates_and_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        update(Some(&path), |cfg| {
            cfg.mcp_servers.insert(
                "filesystem".into(),
                crate::schema::McpServerConfig {
                    command: vec!["mcp-fs".into()],
                    args: vec![],
                    env: Default::default(),
                },
            );
        })
        .unwrap();
        let reloaded = load(Some(&path)).unwrap();
        assert!(reloaded.mcp_servers.contains_key("filesystem"));
    }

    #[test]
    fn save_creates_parent_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        save(&Config::default(), Some(&path)).unwrap();
        assert!(path.exists());
    }
}
