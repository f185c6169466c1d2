//! Per-conversation summarization lifecycle.
//!
//! ```text
//!   NONE ──drop ≥ threshold──▶ PENDING ──summary produced──▶ APPLIED
//!                               │   ▲                          │
//!                               └───┘ failure (attempts += 1)  │
//!                                     ▲                        │
//!                                     └──summary itself dropped┘ (policy: on_drop)
//! ```
//!
//! While APPLIED, [`SummaryTracker::project`] replaces every turn up to
//! `covered_through` with a single system turn carrying the summary. A
//! re-trigger keeps projecting the previous summary until the new one lands.
//! Nothing here calls the inference service; the chat layer drives it.

use std::collections::HashMap;

use parley_core::{ConversationId, ResummarizePolicy, Turn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::window::HistoryDrop;

/// Text prepended to every summary turn.
pub const SUMMARY_PREFIX: &str = "Summary of earlier conversation: ";

/// Default number of dropped turns that triggers summarization.
pub const DEFAULT_DROP_THRESHOLD: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryPolicy {
    /// 0 disables summarization entirely.
    pub drop_threshold: usize,
    pub resummarize: ResummarizePolicy,
}

impl Default for SummaryPolicy {
    fn default() -> Self {
        Self {
            drop_threshold: DEFAULT_DROP_THRESHOLD,
            resummarize: ResummarizePolicy::default(),
        }
    }
}

/// Inclusive range of sequence numbers awaiting summarization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedRange {
    pub first_sequence: u64,
    pub last_sequence: u64,
}

impl DroppedRange {
    pub fn contains(&self, sequence_number: u64) -> bool {
        (self.first_sequence..=self.last_sequence).contains(&sequence_number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedSummary {
    /// System turn positioned at the earliest summarized sequence number.
    pub summary: Turn,
    pub covered_through: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SummaryState {
    #[default]
    None,
    Pending {
        range: DroppedRange,
        attempts: u32,
        /// Summary still projected while its replacement is produced.
        previous: Option<AppliedSummary>,
    },
    Applied(AppliedSummary),
}

/// Flat view of [`SummaryState`] for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStatus {
    None,
    Pending,
    Applied,
}

impl std::fmt::Display for SummaryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SummaryStatus::None => "none",
            SummaryStatus::Pending => "pending",
            SummaryStatus::Applied => "applied",
        };
        f.write_str(s)
    }
}

/// Outcome of reporting a history drop to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    /// Entered PENDING for this range.
    Requested(DroppedRange),
    /// Already PENDING; the range grew to cover more turns.
    Extended(DroppedRange),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SummaryError {
    #[error("No summarization is pending")]
    NotPending,

    #[error("Summary text is empty")]
    EmptySummary,
}

#[derive(Debug, Clone, Default)]
pub struct SummaryTracker {
    policy: SummaryPolicy,
    state: SummaryState,
}

impl SummaryTracker {
    pub fn new(policy: SummaryPolicy) -> Self {
        Self {
            policy,
            state: SummaryState::None,
        }
    }

    pub fn state(&self) -> &SummaryState {
        &self.state
    }

    pub fn status(&self) -> SummaryStatus {
        match self.state {
            SummaryState::None => SummaryStatus::None,
            SummaryState::Pending { .. } => SummaryStatus::Pending,
            SummaryState::Applied(_) => SummaryStatus::Applied,
        }
    }

    pub fn pending_range(&self) -> Option<DroppedRange> {
        match self.state {
            SummaryState::Pending { range, .. } => Some(range),
            _ => None,
        }
    }

    /// The summary currently projected into history, if any.
    pub fn active_summary(&self) -> Option<&AppliedSummary> {
        match &self.state {
            SummaryState::Applied(applied) => Some(applied),
            SummaryState::Pending { previous, .. } => previous.as_ref(),
            SummaryState::None => None,
        }
    }

    /// Record that the windower dropped turns from the projected history.
    pub fn observe_drop(&mut self, drop: &HistoryDrop) -> Transition {
        let threshold = self.policy.drop_threshold;
        if threshold == 0 || drop.dropped_count < threshold {
            return Transition::Unchanged;
        }

        let state = std::mem::take(&mut self.state);
        let (next, transition) = match state {
            SummaryState::None => {
                let range = DroppedRange {
                    first_sequence: drop.first_dropped_sequence,
                    last_sequence: drop.last_dropped_sequence,
                };
                (
                    SummaryState::Pending {
                        range,
                        attempts: 0,
                        previous: None,
                    },
                    Transition::Requested(range),
                )
            }
            SummaryState::Pending {
                mut range,
                attempts,
                previous,
            } => {
                let transition = if drop.last_dropped_sequence > range.last_sequence {
                    range.last_sequence = drop.last_dropped_sequence;
                    Transition::Extended(range)
                } else {
                    Transition::Unchanged
                };
                (
                    SummaryState::Pending {
                        range,
                        attempts,
                        previous,
                    },
                    transition,
                )
            }
            SummaryState::Applied(applied) => {
                // Dropping only the summary turn leaves nothing new to fold in.
                if self.policy.resummarize == ResummarizePolicy::Never
                    || drop.last_dropped_sequence <= applied.covered_through
                {
                    (SummaryState::Applied(applied), Transition::Unchanged)
                } else {
                    let range = DroppedRange {
                        first_sequence: applied
                            .summary
                            .sequence_number
                            .min(drop.first_dropped_sequence),
                        last_sequence: drop.last_dropped_sequence,
                    };
                    (
                        SummaryState::Pending {
                            range,
                            attempts: 0,
                            previous: Some(applied),
                        },
                        Transition::Requested(range),
                    )
                }
            }
        };

        self.state = next;
        if transition != Transition::Unchanged {
            debug!(?transition, "Summary tracker advanced");
        }
        transition
    }

    /// History as the prompt should see it.
    ///
    /// With an active summary: the summary turn, then every turn after
    /// `covered_through`. Otherwise the history unchanged.
    pub fn project(&self, history: &[Turn]) -> Vec<Turn> {
        match self.active_summary() {
            None => history.to_vec(),
            Some(applied) => std::iter::once(applied.summary.clone())
                .chain(
                    history
                        .iter()
                        .filter(|t| t.sequence_number > applied.covered_through)
                        .cloned(),
                )
                .collect(),
        }
    }

    /// Projected turns inside the pending range, oldest first.
    ///
    /// Includes the previous summary when one is being replaced.
    pub fn pending_turns(&self, history: &[Turn]) -> Vec<Turn> {
        let Some(range) = self.pending_range() else {
            return Vec::new();
        };
        self.project(history)
            .into_iter()
            .filter(|t| range.contains(t.sequence_number))
            .collect()
    }

    /// Move PENDING to APPLIED with the produced summary text.
    pub fn apply_summary(&mut self, text: &str) -> Result<AppliedSummary, SummaryError> {
        let Some(range) = self.pending_range() else {
            return Err(SummaryError::NotPending);
        };
        let text = text.trim();
        if text.is_empty() {
            return Err(SummaryError::EmptySummary);
        }

        let applied = AppliedSummary {
            summary: Turn::system(range.first_sequence, format!("{SUMMARY_PREFIX}{text}")),
            covered_through: range.last_sequence,
        };
        self.state = SummaryState::Applied(applied.clone());
        Ok(applied)
    }

    /// Record a failed summarization attempt. Stays PENDING.
    ///
    /// Returns the attempt count, or `None` when nothing was pending.
    pub fn record_failure(&mut self) -> Option<u32> {
        match &mut self.state {
            SummaryState::Pending { attempts, .. } => {
                *attempts += 1;
                Some(*attempts)
            }
            _ => None,
        }
    }
}

/// Trackers for every live conversation.
#[derive(Debug, Default)]
pub struct SummaryRegistry {
    policy: SummaryPolicy,
    trackers: HashMap<ConversationId, SummaryTracker>,
}

impl SummaryRegistry {
    pub fn new(policy: SummaryPolicy) -> Self {
        Self {
            policy,
            trackers: HashMap::new(),
        }
    }

    pub fn get(&self, id: &ConversationId) -> Option<&SummaryTracker> {
        self.trackers.get(id)
    }

    /// Tracker for `id`, created in NONE on first use.
    pub fn tracker_mut(&mut self, id: &ConversationId) -> &mut SummaryTracker {
        let policy = self.policy;
        self.trackers
            .entry(id.clone())
            .or_insert_with(|| SummaryTracker::new(policy))
    }

    pub fn status(&self, id: &ConversationId) -> SummaryStatus {
        self.get(id).map_or(SummaryStatus::None, SummaryTracker::status)
    }

    pub fn remove(&mut self, id: &ConversationId) -> Option<SummaryTracker> {
        self.trackers.remove(id)
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drop_of(first: u64, last: u64) -> HistoryDrop {
        HistoryDrop {
            dropped_count: (last - first + 1) as usize,
            first_dropped_sequence: first,
            last_dropped_sequence: last,
            dropped_tokens: 10,
        }
    }

    fn history(n: u64) -> Vec<Turn> {
        (1..=n)
            .map(|i| {
                if i % 2 == 1 {
                    Turn::user(i, format!("question {i}"))
                } else {
                    Turn::assistant(i, format!("answer {i}"))
                }
            })
            .collect()
    }

    #[test]
    fn first_drop_requests_summary() {
        let mut tracker = SummaryTracker::default();
        let t = tracker.observe_drop(&drop_of(1, 3));
        assert_eq!(
            t,
            Transition::Requested(DroppedRange { first_sequence: 1, last_sequence: 3 })
        );
        assert_eq!(tracker.status(), SummaryStatus::Pending);
    }

    #[test]
    fn below_threshold_is_ignored() {
        let mut tracker = SummaryTracker::new(SummaryPolicy {
            drop_threshold: 4,
            ..Default::default()
        });
        assert_eq!(tracker.observe_drop(&drop_of(1, 3)), Transition::Unchanged);
        assert_eq!(tracker.status(), SummaryStatus::None);
    }

    #[test]
    fn zero_threshold_disables() {
        let mut tracker = SummaryTracker::new(SummaryPolicy {
            drop_threshold: 0,
            ..Default::default()
        });
        assert_eq!(tracker.observe_drop(&drop_of(1, 9)), Transition::Unchanged);
        assert_eq!(tracker.status(), SummaryStatus::None);
    }

    #[test]
    fn pending_range_extends_forward_only() {
        let mut tracker = SummaryTracker::default();
        tracker.observe_drop(&drop_of(1, 2));
        assert_eq!(
            tracker.observe_drop(&drop_of(1, 4)),
            Transition::Extended(DroppedRange { first_sequence: 1, last_sequence: 4 })
        );
        assert_eq!(tracker.observe_drop(&drop_of(1, 3)), Transition::Unchanged);
        assert_eq!(tracker.pending_range().unwrap().last_sequence, 4);
    }

    #[test]
    fn applied_summary_replaces_covered_turns() {
        let mut tracker = SummaryTracker::default();
        tracker.observe_drop(&drop_of(1, 2));
        tracker.apply_summary("User asked about Rust.").unwrap();

        let projected = tracker.project(&history(5));
        let seqs: Vec<u64> = projected.iter().map(|t| t.sequence_number).collect();
        assert_eq!(seqs, vec![1, 3, 4, 5]);
        assert_eq!(projected[0].role, parley_core::Role::System);
        assert!(projected[0].text.starts_with(SUMMARY_PREFIX));
        assert!(projected[0].text.ends_with("User asked about Rust."));
    }

    #[test]
    fn apply_returns_the_stored_summary() {
        let mut tracker = SummaryTracker::default();
        tracker.observe_drop(&drop_of(2, 5));
        let applied = tracker.apply_summary("  They met.  ").unwrap();
        assert_eq!(applied.covered_through, 5);
        assert_eq!(applied.summary.sequence_number, 2);
        assert_eq!(applied.summary.text, format!("{SUMMARY_PREFIX}They met."));
        assert_eq!(tracker.active_summary(), Some(&applied));
        assert_eq!(tracker.state(), &SummaryState::Applied(applied));
    }

    #[test]
    fn no_summary_projects_unchanged() {
        let tracker = SummaryTracker::default();
        assert_eq!(tracker.project(&history(3)), history(3));
    }

    #[test]
    fn failure_stays_pending_and_counts() {
        let mut tracker = SummaryTracker::default();
        assert_eq!(tracker.record_failure(), None);
        tracker.observe_drop(&drop_of(1, 2));
        assert_eq!(tracker.record_failure(), Some(1));
        assert_eq!(tracker.record_failure(), Some(2));
        assert_eq!(tracker.status(), SummaryStatus::Pending);
        // Pending without a previous summary projects history unchanged.
        assert_eq!(tracker.project(&history(3)), history(3));
    }

    #[test]
    fn apply_requires_pending_and_text() {
        let mut tracker = SummaryTracker::default();
        assert_eq!(tracker.apply_summary("x").unwrap_err(), SummaryError::NotPending);
        tracker.observe_drop(&drop_of(1, 1));
        assert_eq!(tracker.apply_summary("   ").unwrap_err(), SummaryError::EmptySummary);
        assert_eq!(tracker.status(), SummaryStatus::Pending);
    }

    #[test]
    fn dropping_only_the_summary_does_not_retrigger() {
        let mut tracker = SummaryTracker::default();
        tracker.observe_drop(&drop_of(1, 2));
        tracker.apply_summary("s").unwrap();
        // Projected history starts with the summary at seq 1.
        assert_eq!(tracker.observe_drop(&drop_of(1, 1)), Transition::Unchanged);
        assert_eq!(tracker.status(), SummaryStatus::Applied);
    }

    #[test]
    fn resummarize_keeps_previous_summary_projected() {
        let mut tracker = SummaryTracker::default();
        tracker.observe_drop(&drop_of(1, 2));
        tracker.apply_summary("first").unwrap();

        // Summary (seq 1) plus turns 3 and 4 dropped from the projection.
        let drop = HistoryDrop {
            dropped_count: 3,
            first_dropped_sequence: 1,
            last_dropped_sequence: 4,
            dropped_tokens: 12,
        };
        assert_eq!(
            tracker.observe_drop(&drop),
            Transition::Requested(DroppedRange { first_sequence: 1, last_sequence: 4 })
        );

        let projected = tracker.project(&history(6));
        assert!(projected[0].text.ends_with("first"));

        let pending = tracker.pending_turns(&history(6));
        let seqs: Vec<u64> = pending.iter().map(|t| t.sequence_number).collect();
        assert_eq!(seqs, vec![1, 3, 4]);

        tracker.apply_summary("second").unwrap();
        let projected = tracker.project(&history(6));
        let seqs: Vec<u64> = projected.iter().map(|t| t.sequence_number).collect();
        assert_eq!(seqs, vec![1, 5, 6]);
        assert!(projected[0].text.ends_with("second"));
    }

    #[test]
    fn never_policy_keeps_first_summary() {
        let mut tracker = SummaryTracker::new(SummaryPolicy {
            drop_threshold: 1,
            resummarize: ResummarizePolicy::Never,
        });
        tracker.observe_drop(&drop_of(1, 2));
        tracker.apply_summary("only").unwrap();
        assert_eq!(tracker.observe_drop(&drop_of(1, 6)), Transition::Unchanged);
        assert_eq!(tracker.status(), SummaryStatus::Applied);
    }

    #[test]
    fn registry_creates_trackers_lazily() {
        let mut registry = SummaryRegistry::default();
        let id = ConversationId::from("c1");
        assert_eq!(registry.status(&id), SummaryStatus::None);
        assert!(registry.is_empty());

        registry.tracker_mut(&id).observe_drop(&drop_of(1, 1));
        assert_eq!(registry.status(&id), SummaryStatus::Pending);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.status(&ConversationId::from("c2")), SummaryStatus::None);

        assert!(registry.remove(&id).is_some());
        assert!(registry.is_empty());
    }
}
