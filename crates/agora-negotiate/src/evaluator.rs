//! Scoring of delivered work.

use agora_core::Evaluation;

/// Scores a delivered result. Implementations must depend only on the content.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, result: &str) -> Evaluation;
}

/// Deterministic length heuristic: longer answers score higher.
#[derive(Debug, Clone, Copy, Default)]
pub struct LengthHeuristic;

impl Evaluator for LengthHeuristic {
    fn evaluate(&self, result: &str) -> Evaluation {
        let length = result.trim().chars().count();
        let (score, summary) = if length > 600 {
            (9.0, "detailed/high-signal")
        } else if length > 200 {
            (7.0, "reasonable detail")
        } else {
            (5.0, "short, could be expanded")
        };

        Evaluation {
            score,
            summary: summary.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_bands() {
        let eval = LengthHeuristic;
        assert_eq!(eval.evaluate(&"x".repeat(601)).score, 9.0);
        assert_eq!(eval.evaluate(&"x".repeat(600)).score, 7.0);
        assert_eq!(eval.evaluate(&"x".repeat(201)).score, 7.0);
        assert_eq!(eval.evaluate(&"x".repeat(200)).score, 5.0);
        assert_eq!(eval.evaluate("").score, 5.0);
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        let padded = format!("   {}   \n", "y".repeat(200));
        let evaluation = LengthHeuristic.evaluate(&padded);
        assert_eq!(evaluation.score, 5.0);
        assert_eq!(evaluation.summary, "short, could be expanded");
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        // 250 two-byte characters: 500 bytes but only 250 characters.
        assert_eq!(LengthHeuristic.evaluate(&"é".repeat(250)).score, 7.0);
    }
}
