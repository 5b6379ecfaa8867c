// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod custom;
mod router;

pub use custom::{load_custom_commands, CommandScope, CustomCommand};
pub use router::{CommandDirective, SlashRouter};
