//! Token estimation for segmentation and pre-flight budgeting.
//!
//! Correction backends tokenize differently and none of them expose their
//! tokenizer for local counting, so segmentation runs on an estimate. Both
//! strategies here are deliberately conservative (they over-count a little),
//! which keeps real chunk sizes under the backend's context limit.
//!
//! Whichever strategy is configured must be used consistently for every
//! segmentation decision within one run; mixing estimators mid-run can
//! produce chunks that satisfied one estimator's budget but not the other's.

use serde::{Deserialize, Serialize};

/// Strategy for estimating the token count of a piece of text.
///
/// Estimates are monotonically non-decreasing in text length for practical
/// purposes. Estimation is never skipped: there is no "exact" variant
/// because exact counts are a backend implementation detail.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TokenEstimator {
    /// `word_count / words_per_token`, the classic budgeting heuristic.
    ///
    /// English prose averages roughly 0.6–0.75 words per token; 0.6 is the
    /// conservative end and the default.
    WordRatio {
        words_per_token: f64,
    },
    /// `ceil(char_count / chars)`. Cheaper and language-neutral; ~4 chars
    /// per token is the usual rule of thumb.
    CharsPerToken {
        chars: usize,
    },
}

impl Default for TokenEstimator {
    fn default() -> Self {
        TokenEstimator::WordRatio { words_per_token: 0.6 }
    }
}

impl TokenEstimator {
    /// Estimated token count of `text`.
    pub fn estimate(&self, text: &str) -> usize {
        match *self {
            TokenEstimator::WordRatio { words_per_token } => {
                let words = text.split_whitespace().count();
                if words_per_token <= 0.0 {
                    return words;
                }
                (words as f64 / words_per_token) as usize
            }
            TokenEstimator::CharsPerToken { chars } => {
                let n = chars.max(1);
                text.chars().count().div_ceil(n)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_zero() {
        assert_eq!(TokenEstimator::default().estimate(""), 0);
        assert_eq!(TokenEstimator::CharsPerToken { chars: 4 }.estimate(""), 0);
    }

    #[test]
    fn word_ratio_matches_reference_arithmetic() {
        // 6 words / 0.6 words-per-token = 10 tokens.
        let est = TokenEstimator::WordRatio { words_per_token: 0.6 };
        assert_eq!(est.estimate("one two three four five six"), 10);
    }

    #[test]
    fn chars_per_token_rounds_up() {
        let est = TokenEstimator::CharsPerToken { chars: 4 };
        assert_eq!(est.estimate("abcd"), 1);
        assert_eq!(est.estimate("abcde"), 2);
    }

    #[test]
    fn longer_text_never_estimates_lower() {
        let est = TokenEstimator::default();
        let short = "a few words here";
        let long = format!("{short} and then considerably more words after that");
        assert!(est.estimate(&long) >= est.estimate(short));
    }

    #[test]
    fn degenerate_ratio_falls_back_to_word_count() {
        let est = TokenEstimator::WordRatio { words_per_token: 0.0 };
        assert_eq!(est.estimate("three little words"), 3);
    }
}
