// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Interruptible raw-mode line input and the slash-command router.
//!
//! [`InputHandler`] provides `get_input` (§4.H): a line editor that runs on
//! its own OS thread so it never blocks the tokio runtime, exposes a single
//! observable `interrupted` flag that the conversation controller polls
//! during model-response streaming, and puts the terminal in raw mode only
//! while actually reading a line or watching for a cancel key.
//!
//! [`slash`] is the command router (§4.G): built-in commands plus markdown
//! files loaded from the project and personal command directories.
pub mod handler;
pub mod raw_guard;
pub mod slash;

pub use handler::{InputHandler, InputOutcome};
pub use raw_guard::RawModeGuard;
pub use slash::{CommandDirective, CommandScope, CustomCommand, SlashRouter};
