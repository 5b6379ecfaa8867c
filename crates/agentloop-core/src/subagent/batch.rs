// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Batch coalescing (§4.E "Batch consolidation"): `task` calls issued within
//! a short window of each other are grouped so their completions are
//! reported to the model as one consolidated summary instead of N separate
//! messages trickling in.
use chrono::{DateTime, Utc};

/// Subagent `task` calls are grouped into a batch if they're spawned within
/// this long of each other; the window restarts each membership, not just
/// at batch creation.
pub const COALESCING_WINDOW_SECS: i64 = 5;

#[derive(Debug, Clone)]
pub struct Batch {
    pub batch_id: String,
    pub task_ids: Vec<String>,
    pub opened_at: DateTime<Utc>,
    pub last_joined_at: DateTime<Utc>,
}

impl Batch {
    pub fn new(batch_id: impl Into<String>, first_task_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self { batch_id: batch_id.into(), task_ids: vec![first_task_id.into()], opened_at: now, last_joined_at: now }
    }

    /// Whether a newly spawned task is still within this batch's coalescing
    /// window and should join rather than start a new batch.
    pub fn accepts_now(&self) -> bool {
        (Utc::now() - self.last_joined_at).num_seconds() < COALESCING_WINDOW_SECS
    }

    pub fn join(&mut self, task_id: impl Into<String>) {
        self.task_ids.push(task_id.into());
        self.last_joined_at = Utc::now();
    }

    /// All member tasks present in `completed`, i.e. this batch is ready to
    /// be consolidated and removed.
    pub fn is_fully_completed(&self, completed: impl Fn(&str) -> bool) -> bool {
        self.task_ids.iter().all(|id| completed(id))
    }

    /// Task ids in a stable, display-ready order.
    ///
    /// Task ids are minted as `task_<n>` (see `SupervisorState::spawn`), so a
    /// plain lexicographic sort would put `task_10` before `task_2` once a
    /// batch grows past nine members. Sort by the numeric suffix instead,
    /// falling back to a lexicographic comparison for ids that don't carry
    /// one (there are none in production, but this keeps the method total).
    pub fn sorted_task_ids(&self) -> Vec<String> {
        let mut ids = self.task_ids.clone();
        ids.sort_by_key(|id| task_sort_key(id));
        ids
    }
}

/// `(numeric suffix, original id)` — ids without a parseable numeric suffix
/// sort after every id that has one, ordered lexicographically among
/// themselves via the `id` component.
fn task_sort_key(id: &str) -> (u64, &str) {
    match id.rsplit_once('_').and_then(|(_, n)| n.parse::<u64>().ok()) {
        Some(n) => (n, ""),
        None => (u64::MAX, id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_batch_contains_only_the_first_task() {
        let b = Batch::new("b1", "t1");
        assert_eq!(b.task_ids, vec!["t1".to_string()]);
    }

    #[test]
    fn accepts_now_is_true_immediately_after_creation() {
        let b = Batch::new("b1", "t1");
        assert!(b.accepts_now());
    }

    #[test]
    fn join_adds_task_and_resets_window() {
        let mut b = Batch::new("b1", "t1");
        b.join("t2");
        assert_eq!(b.task_ids, vec!["t1".to_string(), "t2".to_string()]);
    }

    #[test]
    fn is_fully_completed_requires_every_member() {
        let mut b = Batch::new("b1", "t1");
        b.join("t2");
        assert!(!b.is_fully_completed(|id| id == "t1"));
        assert!(b.is_fully_completed(|_| true));
    }

    #[test]
    fn sorted_task_ids_are_lexicographic_without_a_numeric_suffix() {
        let mut b = Batch::new("b1", "t2");
        b.join("t1");
        b.join("t3");
        assert_eq!(b.sorted_task_ids(), vec!["t1".to_string(), "t2".to_string(), "t3".to_string()]);
    }

    #[test]
    fn sorted_task_ids_use_numeric_order_past_nine_members() {
        let mut b = Batch::new("b1", "task_1");
        for n in 2..=10 {
            b.join(format!("task_{n}"));
        }
        let expected: Vec<String> = (1..=10).map(|n| format!("task_{n}")).collect();
        assert_eq!(b.sorted_task_ids(), expected);
    }
}
