// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Bookkeeping for a single spawned subagent (§4.E "Subagent record").
use chrono::{DateTime, Utc};

/// Lifecycle state of one spawned subagent child process.
#[derive(Debug, Clone)]
pub struct SubagentRecord {
    pub task_id: String,
    pub description: String,
    pub prompt: String,
    pub spawn_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub completed: bool,
    pub result: Option<String>,
    /// Batch this record was opened under, if spawned inside the 5s
    /// coalescing window of other `task` calls in the same turn.
    pub batch_id: Option<String>,
    /// Port the child's control socket is listening on, once known.
    pub comm_port: Option<u16>,
    pub child_pid: Option<u32>,
}

impl SubagentRecord {
    pub fn new(task_id: impl Into<String>, description: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            description: description.into(),
            prompt: prompt.into(),
            spawn_time: Utc::now(),
            end_time: None,
            completed: false,
            result: None,
            batch_id: None,
            comm_port: None,
            child_pid: None,
        }
    }

    /// Transition to completed, recording `result` and the end time. A
    /// record is immutable once `completed=true` (§3 invariant), so a
    /// second call — e.g. a child that emits `result` twice, or an exit
    /// watcher racing the control handler — is a no-op.
    pub fn mark_completed(&mut self, result: impl Into<String>) {
        if self.completed {
            return;
        }
        self.completed = true;
        self.result = Some(result.into());
        self.end_time = Some(Utc::now());
    }

    pub fn elapsed_secs(&self) -> i64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.spawn_time).num_seconds().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_starts_incomplete() {
        let r = SubagentRecord::new("t1", "desc", "prompt");
        assert!(!r.completed);
        assert!(r.result.is_none());
        assert!(r.end_time.is_none());
    }

    #[test]
    fn mark_completed_sets_result_and_end_time() {
        let mut r = SubagentRecord::new("t1", "desc", "prompt");
        r.mark_completed("done");
        assert!(r.completed);
        assert_eq!(r.result.as_deref(), Some("done"));
        assert!(r.end_time.is_some());
    }

    #[test]
    fn mark_completed_is_a_no_op_once_already_completed() {
        let mut r = SubagentRecord::new("t1", "desc", "prompt");
        r.mark_completed("first");
        let end_time = r.end_time;
        r.mark_completed("second");
        assert_eq!(r.result.as_deref(), Some("first"));
        assert_eq!(r.end_time, end_time);
    }
}
