//! Auto-correction bookkeeping
//!
//! One correction per distinct error signature per streak, and at most
//! `max_per_streak` corrections between two human interventions.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

#[allow(clippy::expect_used)]
static POSITION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\d+:\d+\)").expect("static position pattern"));

/// Normalized error text used to recognise a repeated failure
///
/// Positions and whitespace differences do not make two errors distinct.
#[must_use]
pub fn error_signature(error: &str) -> String {
    let first_line = error.lines().next().unwrap_or_default();
    let without_position = POSITION.replace_all(first_line, "");
    without_position
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// What to do about a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionDecision {
    /// Request a correction; `attempt` is 1-based within the streak
    Fire {
        /// Attempt number
        attempt: u32,
    },
    /// This error was already sent for correction in the current streak
    AlreadyTried,
    /// The streak used up its corrections
    StreakExhausted,
}

impl CorrectionDecision {
    /// Check if a correction should be requested
    #[inline]
    #[must_use]
    pub fn fires(self) -> bool {
        matches!(self, Self::Fire { .. })
    }
}

/// Per-streak correction state
#[derive(Debug, Clone)]
pub struct CorrectionTracker {
    max_per_streak: u32,
    tried: HashSet<String>,
    used: u32,
}

impl CorrectionTracker {
    /// Tracker allowing `max_per_streak` corrections per streak
    #[must_use]
    pub fn new(max_per_streak: u32) -> Self {
        Self {
            max_per_streak,
            tried: HashSet::new(),
            used: 0,
        }
    }

    /// Decide on `error` and record it when a correction fires
    pub fn check_and_record(&mut self, error: &str) -> CorrectionDecision {
        let signature = error_signature(error);
        if self.tried.contains(&signature) {
            return CorrectionDecision::AlreadyTried;
        }
        if self.used >= self.max_per_streak {
            return CorrectionDecision::StreakExhausted;
        }
        self.tried.insert(signature);
        self.used += 1;
        CorrectionDecision::Fire { attempt: self.used }
    }

    /// Give back a correction whose request never reached the service
    pub fn refund(&mut self, error: &str) {
        if self.tried.remove(&error_signature(error)) {
            self.used = self.used.saturating_sub(1);
        }
    }

    /// Start a new streak
    pub fn reset(&mut self) {
        self.tried.clear();
        self.used = 0;
    }

    /// Corrections fired in the current streak
    #[inline]
    #[must_use]
    pub fn used(&self) -> u32 {
        self.used
    }

    /// Streak cap
    #[inline]
    #[must_use]
    pub fn max_per_streak(&self) -> u32 {
        self.max_per_streak
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn same_error_fires_once_per_streak() {
        let mut tracker = CorrectionTracker::new(3);
        assert_eq!(tracker.check_and_record("ReferenceError: Bogus is not defined"), CorrectionDecision::Fire { attempt: 1 });
        assert_eq!(tracker.check_and_record("ReferenceError: Bogus is not defined"), CorrectionDecision::AlreadyTried);
        tracker.reset();
        assert!(tracker.check_and_record("ReferenceError: Bogus is not defined").fires());
    }

    #[test]
    fn streak_cap_applies_across_signatures() {
        let mut tracker = CorrectionTracker::new(2);
        assert!(tracker.check_and_record("a").fires());
        assert!(tracker.check_and_record("b").fires());
        assert_eq!(tracker.check_and_record("c"), CorrectionDecision::StreakExhausted);
        assert_eq!(tracker.used(), 2);
    }

    #[test]
    fn refund_returns_the_slot() {
        let mut tracker = CorrectionTracker::new(1);
        assert!(tracker.check_and_record("a").fires());
        tracker.refund("a");
        assert_eq!(tracker.used(), 0);
        assert!(tracker.check_and_record("a").fires());
    }

    #[test]
    fn signature_ignores_positions_and_spacing() {
        assert_eq!(
            error_signature("syntax error: expected `)`  (3:14)\n  |\n3 | foo("),
            error_signature("Syntax error: expected `)` (7:2)")
        );
    }

    proptest! {
        #[test]
        fn never_exceeds_the_cap(errors in proptest::collection::vec("[a-c]{1,2}", 0..20), cap in 0u32..5) {
            let mut tracker = CorrectionTracker::new(cap);
            let fired = errors.iter().filter(|e| tracker.check_and_record(e).fires()).count();
            prop_assert!(fired as u32 <= cap);
            prop_assert_eq!(fired as u32, tracker.used());
        }
    }
}
