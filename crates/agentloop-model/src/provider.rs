// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::{catalog, CompletionRequest, ResponseEvent};

pub type ResponseStream = Pin<Box<dyn Stream<Item = anyhow::Result<ResponseEvent>> + Send>>;

#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Human-readable provider name for status display.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// Send a completion request and return a streaming response.
    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream>;

    /// Coarse context-window budget for this model, used by the conversation
    /// controller to decide when to compact (see [`catalog::context_limit`]).
    fn context_limit(&self) -> u32 {
        catalog::context_limit(self.model_name())
    }

    /// `true` if this model is expected to tolerate very long single turns
    /// (reasoning-class models) rather than needing frequent compaction.
    fn is_reasoning_model(&self) -> bool {
        matches!(catalog::classify(self.model_name()), catalog::ContextTier::Reasoning)
    }
}
