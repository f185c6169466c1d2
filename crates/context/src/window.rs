//! Sliding history window.
//!
//! Keeps the newest contiguous run of turns whose summed tokens fit a budget.
//! The walk goes newest to oldest and stops at the first turn that would
//! overflow, so an older small turn is never kept behind a dropped larger one.

use parley_core::Turn;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The contiguous prefix of history that did not make it into the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryDrop {
    pub dropped_count: usize,
    pub first_dropped_sequence: u64,
    pub last_dropped_sequence: u64,
    pub dropped_tokens: usize,
}

impl HistoryDrop {
    pub fn from_turn(turn: &Turn) -> Self {
        Self {
            dropped_count: 1,
            first_dropped_sequence: turn.sequence_number,
            last_dropped_sequence: turn.sequence_number,
            dropped_tokens: turn.token_count(),
        }
    }

    /// Extend the drop with the next-oldest surviving turn.
    pub fn extend(&mut self, turn: &Turn) {
        self.dropped_count += 1;
        self.last_dropped_sequence = turn.sequence_number;
        self.dropped_tokens += turn.token_count();
    }

    fn from_prefix(prefix: &[Turn]) -> Option<Self> {
        let (first, rest) = prefix.split_first()?;
        let mut drop = Self::from_turn(first);
        for turn in rest {
            drop.extend(turn);
        }
        Some(drop)
    }
}

/// The retained suffix of history plus what was cut.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryWindow {
    pub turns: Vec<Turn>,
    pub tokens: usize,
    pub dropped: Option<HistoryDrop>,
}

#[derive(Debug, Clone, Copy)]
pub struct HistoryWindower {
    budget: usize,
}

impl HistoryWindower {
    pub fn new(budget: usize) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn apply(&self, history: &[Turn]) -> HistoryWindow {
        let mut used = 0usize;
        let mut keep_from = history.len();

        for (i, turn) in history.iter().enumerate().rev() {
            let next = used.saturating_add(turn.token_count());
            if next > self.budget {
                break;
            }
            used = next;
            keep_from = i;
        }

        let dropped = HistoryDrop::from_prefix(&history[..keep_from]);
        if let Some(ref d) = dropped {
            debug!(
                dropped = d.dropped_count,
                first = d.first_dropped_sequence,
                last = d.last_dropped_sequence,
                budget = self.budget,
                "History window dropped oldest turns"
            );
        }

        HistoryWindow {
            turns: history[keep_from..].to_vec(),
            tokens: used,
            dropped,
        }
    }
}

/// Check that sequence numbers strictly increase through `history` and on to `next`.
///
/// Returns the first offending `(previous, next)` pair.
pub fn check_sequence(history: &[Turn], next: &Turn) -> Result<(), (u64, u64)> {
    history
        .iter()
        .chain(std::iter::once(next))
        .map(|t| t.sequence_number)
        .try_fold(None::<u64>, |prev, seq| match prev {
            Some(p) if seq <= p => Err((p, seq)),
            _ => Ok(Some(seq)),
        })
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Turn whose text estimates to exactly `tokens`.
    fn turn(seq: u64, tokens: usize) -> Turn {
        Turn::user(seq, "x".repeat(tokens * 4))
    }

    #[test]
    fn everything_fits() {
        let history = vec![turn(1, 10), turn(2, 10)];
        let window = HistoryWindower::new(100).apply(&history);
        assert_eq!(window.turns, history);
        assert_eq!(window.tokens, 20);
        assert!(window.dropped.is_none());
    }

    #[test]
    fn drops_oldest_first() {
        let history = vec![turn(1, 10), turn(2, 10), turn(3, 10)];
        let window = HistoryWindower::new(25).apply(&history);
        let seqs: Vec<u64> = window.turns.iter().map(|t| t.sequence_number).collect();
        assert_eq!(seqs, vec![2, 3]);
        let drop = window.dropped.unwrap();
        assert_eq!(drop.dropped_count, 1);
        assert_eq!(drop.first_dropped_sequence, 1);
        assert_eq!(drop.last_dropped_sequence, 1);
        assert_eq!(drop.dropped_tokens, 10);
    }

    #[test]
    fn keeps_last_exchange_of_four() {
        let history = vec![
            Turn::user(1, "x".repeat(40)),
            Turn::assistant(2, "x".repeat(40)),
            Turn::user(3, "x".repeat(40)),
            Turn::assistant(4, "x".repeat(40)),
        ];
        let window = HistoryWindower::new(25).apply(&history);
        assert_eq!(window.turns, history[2..].to_vec());
        assert_eq!(window.tokens, 20);
        let drop = window.dropped.unwrap();
        assert_eq!(drop.dropped_count, 2);
        assert_eq!(drop.first_dropped_sequence, 1);
        assert_eq!(drop.last_dropped_sequence, 2);
        assert_eq!(drop.dropped_tokens, 20);
    }

    #[test]
    fn stops_at_first_overflow_without_skipping() {
        // seq 1 is small enough to fit on its own, but seq 2 blocks it.
        let history = vec![turn(1, 1), turn(2, 50), turn(3, 10)];
        let window = HistoryWindower::new(20).apply(&history);
        let seqs: Vec<u64> = window.turns.iter().map(|t| t.sequence_number).collect();
        assert_eq!(seqs, vec![3]);
        let drop = window.dropped.unwrap();
        assert_eq!(drop.dropped_count, 2);
        assert_eq!(drop.first_dropped_sequence, 1);
        assert_eq!(drop.last_dropped_sequence, 2);
    }

    #[test]
    fn newest_turn_too_large_drops_everything() {
        let history = vec![turn(1, 5), turn(2, 30)];
        let window = HistoryWindower::new(20).apply(&history);
        assert!(window.turns.is_empty());
        assert_eq!(window.dropped.unwrap().dropped_count, 2);
    }

    #[test]
    fn zero_budget_and_empty_history() {
        let window = HistoryWindower::new(0).apply(&[]);
        assert!(window.turns.is_empty());
        assert!(window.dropped.is_none());

        let window = HistoryWindower::new(0).apply(&[turn(1, 1)]);
        assert!(window.turns.is_empty());
        assert_eq!(window.dropped.unwrap().dropped_count, 1);
    }

    #[test]
    fn extend_moves_last_sequence() {
        let mut drop = HistoryDrop::from_turn(&turn(4, 2));
        drop.extend(&turn(5, 3));
        assert_eq!(drop.dropped_count, 2);
        assert_eq!(drop.first_dropped_sequence, 4);
        assert_eq!(drop.last_dropped_sequence, 5);
        assert_eq!(drop.dropped_tokens, 5);
    }

    #[test]
    fn sequence_check() {
        let history = vec![turn(1, 1), turn(2, 1)];
        assert!(check_sequence(&history, &turn(3, 1)).is_ok());
        assert_eq!(check_sequence(&history, &turn(2, 1)), Err((2, 2)));
        assert_eq!(check_sequence(&[turn(5, 1), turn(3, 1)], &turn(9, 1)), Err((5, 3)));
        assert!(check_sequence(&[], &turn(0, 1)).is_ok());
    }

    proptest! {
        #[test]
        fn window_is_a_fitting_suffix(
            sizes in proptest::collection::vec(0usize..40, 0..30),
            budget in 0usize..300,
        ) {
            let history: Vec<Turn> = sizes
                .iter()
                .enumerate()
                .map(|(i, &s)| turn(i as u64 + 1, s))
                .collect();
            let window = HistoryWindower::new(budget).apply(&history);

            prop_assert!(window.tokens <= budget);
            let kept = window.turns.len();
            prop_assert_eq!(&window.turns[..], &history[history.len() - kept..]);

            let dropped = window.dropped.as_ref().map_or(0, |d| d.dropped_count);
            prop_assert_eq!(dropped + kept, history.len());

            // Maximal: the next-older turn would not have fit.
            if kept < history.len() {
                let blocker = &history[history.len() - kept - 1];
                prop_assert!(window.tokens + blocker.token_count() > budget);
            }
        }
    }
}
