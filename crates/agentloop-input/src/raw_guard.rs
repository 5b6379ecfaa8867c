// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use crossterm::terminal;
use tracing::warn;

/// RAII guard around terminal raw mode.
///
/// The tty is a singleton resource — only one owner should hold it at a
/// time (see SPEC_FULL.md §9 on global-ish singletons). Construction enables
/// raw mode; `Drop` unconditionally attempts to restore cooked mode, even if
/// the code that held the guard is unwinding from a panic or an unrelated
/// error, since a terminal left in raw mode is a fatal side effect for the
/// user's shell.
pub struct RawModeGuard {
    was_raw: bool,
}

impl RawModeGuard {
    pub fn enable() -> anyhow::Result<Self> {
        let was_raw = terminal::is_raw_mode_enabled().unwrap_or(false);
        if !was_raw {
            terminal::enable_raw_mode()?;
        }
        Ok(Self { was_raw })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if !self.was_raw {
            if let Err(e) = terminal::disable_raw_mode() {
                warn!(error = %e, "failed to restore terminal attributes");
            }
        }
    }
}

/// Translate `\n` to `\r\n` in `text`. Any output written by other
/// components while raw mode is active must pass through this, since raw
/// mode disables the terminal driver's own newline translation.
pub fn crlf(text: &str) -> String {
    if !text.contains('\n') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        if ch == '\n' {
            out.push('\r');
        }
        out.push(ch);
    }
    out
}
