//! Acceptance policy for matched candidates.

use serde::{Deserialize, Serialize};

use crate::config::MatcherConfig;
use crate::types::MatchScores;

/// Immutable thresholds deciding whether a scored candidate becomes a label.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcceptancePolicy {
    /// The best positive prompt must score strictly above this.
    pub positive_threshold: f32,
    /// Carried for configuration parity; `accepts` does not consult it.
    pub negative_threshold: f32,
}

impl Default for AcceptancePolicy {
    fn default() -> Self {
        Self::from(&MatcherConfig::default())
    }
}

impl From<&MatcherConfig> for AcceptancePolicy {
    fn from(config: &MatcherConfig) -> Self {
        Self {
            positive_threshold: config.positive_threshold,
            negative_threshold: config.negative_threshold,
        }
    }
}

impl AcceptancePolicy {
    /// Accept iff the best positive clears the threshold AND beats the best
    /// negative. Both comparisons are strict: ties reject.
    pub fn accepts(&self, scores: &MatchScores) -> bool {
        let max_positive = scores.max_positive();
        max_positive > self.positive_threshold && max_positive > scores.max_negative()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pos: f32, neg: f32) -> MatchScores {
        MatchScores {
            positive: vec![0.0, pos],
            negative: vec![neg, 0.0],
        }
    }

    #[test]
    fn test_accepts_clear_winner() {
        assert!(AcceptancePolicy::default().accepts(&scores(0.85, 0.2)));
    }

    #[test]
    fn test_rejects_at_exact_threshold() {
        let policy = AcceptancePolicy::default();
        assert!(!policy.accepts(&scores(0.7, 0.0)));
        assert!(policy.accepts(&scores(0.700_001, 0.0)));
    }

    #[test]
    fn test_rejects_tie_with_negative() {
        let policy = AcceptancePolicy {
            positive_threshold: 0.3,
            negative_threshold: 0.3,
        };
        assert!(!policy.accepts(&scores(0.45, 0.45)));
    }

    #[test]
    fn test_rejects_when_negative_beats_positive() {
        // Only reachable with an independently produced score pair, but the
        // rule must hold regardless of how scores were normalized.
        assert!(!AcceptancePolicy::default().accepts(&scores(0.75, 0.8)));
    }

    #[test]
    fn test_negative_threshold_not_consulted() {
        // 0.25 negative is under the 0.3 ceiling, 0.28 is over it; the
        // decision is the same either way.
        let policy = AcceptancePolicy::default();
        assert!(policy.accepts(&scores(0.71, 0.25)));
        assert!(policy.accepts(&scores(0.71, 0.28)));
        let strict = AcceptancePolicy {
            negative_threshold: 0.0,
            ..policy
        };
        assert!(strict.accepts(&scores(0.71, 0.28)));
    }

    #[test]
    fn test_monotonic_in_max_positive() {
        let policy = AcceptancePolicy::default();
        let neg = 0.1;
        let mut was_accepted = false;
        for step in 0..=100 {
            let pos = step as f32 / 100.0;
            let accepted = policy.accepts(&scores(pos, neg));
            assert!(!(was_accepted && !accepted), "flipped back at {pos}");
            was_accepted = accepted;
        }
        assert!(was_accepted);
    }
}
