// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Conversation compaction (§4.F "Compaction"): summarise the middle of a
//! conversation that has grown past the token budget, keeping the system
//! message and the last two turns verbatim.
use agentloop_model::{CompletionRequest, Message, ModelProvider, ResponseEvent, Role};
use futures::StreamExt;
use tracing::warn;

const SUMMARY_PROMPT: &str = "Summarise the following conversation concisely, preserving any facts, decisions, file paths, or identifiers a continuation would need. Respond with the summary text only.";

/// Outcome of a compaction attempt, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionOutcome {
    Compacted,
    /// The summarisation call failed; fell back to `[system, ...last 5]`.
    Fallback,
}

/// Compact `messages` in place. Preserves `messages[0]` verbatim if it is a
/// system message, and the last two messages verbatim; replaces everything
/// in between with a single synthesised summary message.
pub async fn compact(messages: &mut Vec<Message>, provider: &dyn ModelProvider) -> CompactionOutcome {
    let before_tokens = super::tokens::estimate_tokens(messages);

    let has_system = messages.first().map(|m| m.role == Role::System).unwrap_or(false);
    let head_len = if has_system { 1 } else { 0 };
    let tail_len = 2.min(messages.len().saturating_sub(head_len));

    if messages.len() <= head_len + tail_len {
        // Nothing in the middle to compact.
        return CompactionOutcome::Compacted;
    }

    let middle = &messages[head_len..messages.len() - tail_len];
    let transcript = render_transcript(middle);

    let request = CompletionRequest {
        messages: vec![Message::system(SUMMARY_PROMPT), Message::user(transcript)],
        tools: vec![],
        stream: false,
        system_dynamic_suffix: None,
    };

    match summarize(provider, request).await {
        Ok(summary) => {
            let mut compacted = Vec::with_capacity(head_len + 1 + tail_len);
            if has_system {
                compacted.push(messages[0].clone());
            }
            compacted.push(Message::system(format!("[CONVERSATION SUMMARY] {summary}")));
            compacted.extend_from_slice(&messages[messages.len() - tail_len..]);
            *messages = compacted;
            let after_tokens = super::tokens::estimate_tokens(messages);
            debug_assert!(after_tokens <= before_tokens, "compaction must not grow the conversation");
            CompactionOutcome::Compacted
        }
        Err(e) => {
            warn!(error = %e, "compaction summarisation failed, falling back to trailing window");
            let keep = 5.min(messages.len());
            let mut fallback = Vec::with_capacity(head_len + keep);
            if has_system {
                fallback.push(messages[0].clone());
            }
            fallback.extend(messages[messages.len() - keep..].iter().cloned());
            *messages = fallback;
            CompactionOutcome::Fallback
        }
    }
}

async fn summarize(provider: &dyn ModelProvider, request: CompletionRequest) -> anyhow::Result<String> {
    let mut stream = provider.complete(request).await?;
    let mut summary = String::new();
    while let Some(event) = stream.next().await {
        match event? {
            ResponseEvent::TextDelta(text) => summary.push_str(&text),
            ResponseEvent::Error(e) => anyhow::bail!("model reported error during summarisation: {e}"),
            ResponseEvent::Done => break,
            _ => {}
        }
    }
    if summary.trim().is_empty() {
        anyhow::bail!("summarisation produced empty text");
    }
    Ok(summary)
}

fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };
            let text = m.as_text().map(str::to_string).unwrap_or_else(|| "[non-text content]".to_string());
            format!("{role}: {text}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use agentloop_model::ScriptedMockProvider;

    use super::*;

    fn long_message(role_text: &str) -> Message {
        Message::user(format!("{role_text} {}", "x".repeat(200)))
    }

    #[tokio::test]
    async fn compact_preserves_system_and_last_two_messages() {
        let mut messages = vec![
            Message::system("sys"),
            long_message("a"),
            long_message("b"),
            long_message("c"),
            Message::user("second to last"),
            Message::assistant("last"),
        ];
        let provider = ScriptedMockProvider::always_text("summary of a b c");

        let outcome = compact(&mut messages, &provider).await;
        assert_eq!(outcome, CompactionOutcome::Compacted);
        assert_eq!(messages[0].as_text(), Some("sys"));
        assert_eq!(messages.last().unwrap().as_text(), Some("last"));
        assert_eq!(messages[messages.len() - 2].as_text(), Some("second to last"));
        assert!(messages.iter().any(|m| m.as_text().unwrap_or("").contains("[CONVERSATION SUMMARY]")));
    }

    #[tokio::test]
    async fn compact_strictly_reduces_token_estimate() {
        let mut messages = vec![Message::system("sys")];
        for i in 0..10 {
            messages.push(long_message(&format!("turn-{i}")));
        }
        messages.push(Message::user("second to last"));
        messages.push(Message::assistant("last"));

        let before = super::super::tokens::estimate_tokens(&messages);
        let provider = ScriptedMockProvider::always_text("short summary");
        compact(&mut messages, &provider).await;
        let after = super::super::tokens::estimate_tokens(&messages);
        assert!(after < before);
    }

    #[tokio::test]
    async fn compact_falls_back_to_last_five_on_summarisation_failure() {
        let mut messages = vec![Message::system("sys")];
        for i in 0..10 {
            messages.push(long_message(&format!("turn-{i}")));
        }
        // ScriptedMockProvider with an Error event simulates backend failure.
        let provider = ScriptedMockProvider::new(vec![vec![ResponseEvent::Error("boom".into())]]);

        let outcome = compact(&mut messages, &provider).await;
        assert_eq!(outcome, CompactionOutcome::Fallback);
        assert_eq!(messages[0].as_text(), Some("sys"));
        assert_eq!(messages.len(), 6); // system + last 5
    }

    #[tokio::test]
    async fn compact_on_short_conversation_is_a_no_op() {
        let mut messages = vec![Message::system("sys"), Message::user("hi"), Message::assistant("hello")];
        let provider = ScriptedMockProvider::always_text("unused");
        let before = messages.clone();
        compact(&mut messages, &provider).await;
        assert_eq!(messages.len(), before.len());
    }
}
