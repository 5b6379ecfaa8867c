// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use crossterm::cursor;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use tokio::sync::mpsc;
use tracing::debug;

use crate::raw_guard::{crlf, RawModeGuard};

/// How often `read_line_blocking` wakes up (even with no keystroke pending)
/// to drain the background display channel, so subagent/tool output appears
/// while the user is idle at the prompt instead of only after they submit a
/// line (SPEC_FULL.md §5 "Output display must preserve per-line atomicity").
const DISPLAY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Outcome of [`InputHandler::get_input`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputOutcome {
    /// A non-empty line was submitted.
    Text(String),
    /// The user submitted an empty line.
    Empty,
    /// End-of-file (^D). Never sets the interrupt flag.
    Eof,
    /// The user cancelled (^C, or Esc when `escape_interrupts`). Sets the
    /// interrupt flag.
    Cancelled,
}

/// Owns the single observable `interrupted` flag used across the input
/// layer, the conversation controller, and the dispatcher's keep-alive
/// wrapper (SPEC_FULL.md §5 "Cancellation"). There is no asynchronous signal
/// delivery into tool executors — every party polls this flag at its own
/// suspension points.
#[derive(Clone, Default)]
pub struct InputHandler {
    interrupted: Arc<AtomicBool>,
    /// Background display channel drained live by `read_line_blocking`
    /// while it waits for a keystroke. Shared across clones so the
    /// conversation controller can install it once via
    /// [`InputHandler::set_display_channel`] and every clone sees it.
    display_rx: Arc<StdMutex<Option<mpsc::UnboundedReceiver<String>>>>,
}

impl InputHandler {
    pub fn new() -> Self {
        Self { interrupted: Arc::new(AtomicBool::new(false)), display_rx: Arc::new(StdMutex::new(None)) }
    }

    pub fn interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub fn clear_interrupt(&self) {
        self.interrupted.store(false, Ordering::SeqCst);
    }

    fn set_interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    /// Install the channel that `read_line_blocking` drains to the terminal
    /// while idle at the prompt. Call once at startup; later calls replace
    /// the previously installed channel.
    pub fn set_display_channel(&self, rx: mpsc::UnboundedReceiver<String>) {
        *self.display_rx.lock().unwrap() = Some(rx);
    }

    /// Print every pending background line, clearing and redrawing the
    /// current input line around them so they don't get interleaved with
    /// whatever the user has typed so far. Returns whether anything printed.
    fn drain_display<W: Write>(&self, stdout: &mut W, prompt: &str, buffer: &str) -> anyhow::Result<bool> {
        let mut guard = self.display_rx.lock().unwrap();
        let Some(rx) = guard.as_mut() else { return Ok(false) };
        let mut printed = false;
        while let Ok(line) = rx.try_recv() {
            execute!(stdout, cursor::MoveToColumn(0), Clear(ClearType::CurrentLine))?;
            write!(stdout, "{}\r\n", crlf(&line))?;
            printed = true;
        }
        if printed {
            write!(stdout, "{}{buffer}", crlf(prompt))?;
            stdout.flush()?;
        }
        Ok(printed)
    }

    /// Read one line from the terminal. Runs on a dedicated OS thread (via
    /// `spawn_blocking`) so it never blocks the tokio scheduler that also
    /// drives subagent supervision and dispatcher keep-alive.
    ///
    /// `multiline`: Shift+Enter inserts a newline instead of submitting.
    /// `escape_interrupts`: whether a bare Esc cancels the prompt (normally
    /// false for the main prompt; Esc there is reserved for cancelling an
    /// in-flight model stream, not cancelling an empty prompt).
    pub async fn get_input(
        &self,
        prompt: &str,
        multiline: bool,
        escape_interrupts: bool,
    ) -> anyhow::Result<InputOutcome> {
        let this = self.clone();
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || this.read_line_blocking(&prompt, multiline, escape_interrupts))
            .await?
    }

    fn read_line_blocking(
        &self,
        prompt: &str,
        multiline: bool,
        escape_interrupts: bool,
    ) -> anyhow::Result<InputOutcome> {
        let _guard = RawModeGuard::enable()?;
        let mut stdout = std::io::stdout();
        write!(stdout, "{}", crlf(prompt))?;
        stdout.flush()?;

        let mut buffer = String::new();
        loop {
            self.drain_display(&mut stdout, prompt, &buffer)?;

            if !event::poll(DISPLAY_POLL_INTERVAL)? {
                continue;
            }

            let event = event::read()?;
            let Event::Key(key) = event else { continue };
            if key.kind == event::KeyEventKind::Release {
                continue;
            }
            match classify(key, multiline, escape_interrupts) {
                Keystroke::Char(c) => {
                    buffer.push(c);
                    write!(stdout, "{c}")?;
                    stdout.flush()?;
                }
                Keystroke::Newline => {
                    buffer.push('\n');
                    write!(stdout, "\r\n")?;
                    stdout.flush()?;
                }
                Keystroke::Backspace => {
                    if buffer.pop().is_some() {
                        write!(stdout, "\u{8} \u{8}")?;
                        stdout.flush()?;
                    }
                }
                Keystroke::Submit => {
                    write!(stdout, "\r\n")?;
                    stdout.flush()?;
                    return Ok(if buffer.is_empty() { InputOutcome::Empty } else { InputOutcome::Text(buffer) });
                }
                Keystroke::Eof => {
                    write!(stdout, "\r\n")?;
                    stdout.flush()?;
                    debug!("input handler saw eof");
                    return Ok(InputOutcome::Eof);
                }
                Keystroke::Cancel => {
                    self.set_interrupt();
                    write!(stdout, "\r\n")?;
                    stdout.flush()?;
                    return Ok(InputOutcome::Cancelled);
                }
                Keystroke::Ignored => {}
            }
        }
    }

    /// Non-blocking check for an Esc keypress, used while streaming a model
    /// response. The caller is responsible for already holding raw mode
    /// (see [`RawModeGuard`]); this only samples the event queue once and
    /// returns immediately either way.
    pub fn poll_escape(&self) -> anyhow::Result<bool> {
        if !event::poll(Duration::from_millis(0))? {
            return Ok(false);
        }
        if let Event::Key(KeyEvent { code: KeyCode::Esc, kind, .. }) = event::read()? {
            if kind != event::KeyEventKind::Release {
                self.set_interrupt();
                return Ok(true);
            }
        }
        Ok(false)
    }
}

enum Keystroke {
    Char(char),
    Newline,
    Backspace,
    Submit,
    Eof,
    Cancel,
    Ignored,
}

fn classify(key: KeyEvent, multiline: bool, escape_interrupts: bool) -> Keystroke {
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Keystroke::Cancel,
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => Keystroke::Eof,
        KeyCode::Esc if escape_interrupts => Keystroke::Cancel,
        KeyCode::Esc => Keystroke::Ignored,
        KeyCode::Enter if multiline && key.modifiers.contains(KeyModifiers::SHIFT) => Keystroke::Newline,
        KeyCode::Enter => Keystroke::Submit,
        KeyCode::Backspace => Keystroke::Backspace,
        KeyCode::Char(c) => Keystroke::Char(c),
        _ => Keystroke::Ignored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn ctrl_c_classifies_as_cancel() {
        assert!(matches!(
            classify(key(KeyCode::Char('c'), KeyModifiers::CONTROL), false, false),
            Keystroke::Cancel
        ));
    }

    #[test]
    fn ctrl_d_classifies_as_eof() {
        assert!(matches!(
            classify(key(KeyCode::Char('d'), KeyModifiers::CONTROL), false, false),
            Keystroke::Eof
        ));
    }

    #[test]
    fn bare_esc_is_ignored_unless_escape_interrupts() {
        assert!(matches!(classify(key(KeyCode::Esc, KeyModifiers::NONE), false, false), Keystroke::Ignored));
        assert!(matches!(classify(key(KeyCode::Esc, KeyModifiers::NONE), false, true), Keystroke::Cancel));
    }

    #[test]
    fn plain_enter_submits() {
        assert!(matches!(classify(key(KeyCode::Enter, KeyModifiers::NONE), false, false), Keystroke::Submit));
    }

    #[test]
    fn shift_enter_inserts_newline_when_multiline() {
        assert!(matches!(
            classify(key(KeyCode::Enter, KeyModifiers::SHIFT), true, false),
            Keystroke::Newline
        ));
    }

    #[test]
    fn shift_enter_submits_when_not_multiline() {
        assert!(matches!(
            classify(key(KeyCode::Enter, KeyModifiers::SHIFT), false, false),
            Keystroke::Submit
        ));
    }

    #[test]
    fn drain_display_prints_pending_lines_and_redraws_prompt() {
        let handler = InputHandler::new();
        let (tx, rx) = mpsc::unbounded_channel();
        handler.set_display_channel(rx);
        tx.send("subagent said hi".to_string()).unwrap();

        let mut out = Vec::new();
        let printed = handler.drain_display(&mut out, "> ", "partial").unwrap();
        assert!(printed);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("subagent said hi"));
        assert!(text.ends_with("> partial"));
    }

    #[test]
    fn drain_display_is_a_no_op_with_no_channel_installed() {
        let handler = InputHandler::new();
        let mut out = Vec::new();
        let printed = handler.drain_display(&mut out, "> ", "").unwrap();
        assert!(!printed);
        assert!(out.is_empty());
    }

    #[test]
    fn interrupted_flag_starts_clear_and_can_be_cleared_again() {
        let handler = InputHandler::new();
        assert!(!handler.interrupted());
        handler.set_interrupt();
        assert!(handler.interrupted());
        handler.clear_interrupt();
        assert!(!handler.interrupted());
    }
}
