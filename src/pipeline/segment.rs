//! Segmentation: split normalized text into token-budgeted chunks.
//!
//! Chunks accumulate whole paragraphs until the budget would overflow; a
//! paragraph that alone exceeds the budget is split at sentence boundaries
//! with the same accumulate/flush logic. A single sentence larger than the
//! budget is emitted as its own oversized chunk — content is never
//! truncated to fit.
//!
//! Indices are assigned in source order and are contiguous; joining all
//! chunk contents (paragraph-joined with a blank line) reproduces the
//! input's paragraphs without loss or reordering.

use crate::pipeline::tokens::TokenEstimator;
use serde::{Deserialize, Serialize};

/// One bounded, ordered unit of text dispatched as a single correction call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position in source order; unique and contiguous from 0.
    pub index: usize,
    /// Chunk text: one or more paragraphs, or a run of sentences from one
    /// oversized paragraph.
    pub content: String,
    /// Estimated token count of `content` under the run's estimator.
    pub estimated_tokens: usize,
}

/// Split `text` into an ordered sequence of token-budgeted chunks.
pub fn segment(text: &str, budget: usize, estimator: &TokenEstimator) -> Vec<Chunk> {
    let mut builder = ChunkBuilder::new(budget, estimator);

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        let para_tokens = estimator.estimate(paragraph);

        if para_tokens > budget {
            // Oversized paragraph: flush whatever is pending, then refill at
            // sentence granularity so the paragraph still lands in order.
            builder.flush();
            for sentence in split_sentences(paragraph) {
                builder.push(sentence, " ");
            }
            builder.flush();
        } else {
            builder.push(paragraph, "\n\n");
        }
    }

    builder.finish()
}

/// Accumulates text pieces into chunks, flushing when the budget would
/// overflow. The overflow check estimates the would-be joined text, not a
/// running sum of per-piece estimates, so the budget invariant holds under
/// any estimator.
struct ChunkBuilder<'a> {
    budget: usize,
    estimator: &'a TokenEstimator,
    current: String,
    current_tokens: usize,
    chunks: Vec<Chunk>,
}

impl<'a> ChunkBuilder<'a> {
    fn new(budget: usize, estimator: &'a TokenEstimator) -> Self {
        Self {
            budget,
            estimator,
            current: String::new(),
            current_tokens: 0,
            chunks: Vec::new(),
        }
    }

    fn push(&mut self, piece: &str, separator: &str) {
        if self.current.is_empty() {
            // First piece always goes in, even when it alone exceeds the
            // budget (indivisible sentence case).
            self.current.push_str(piece);
            self.current_tokens = self.estimator.estimate(&self.current);
            return;
        }

        let mut candidate = String::with_capacity(self.current.len() + separator.len() + piece.len());
        candidate.push_str(&self.current);
        candidate.push_str(separator);
        candidate.push_str(piece);

        let candidate_tokens = self.estimator.estimate(&candidate);
        if candidate_tokens > self.budget {
            self.flush();
            self.current.push_str(piece);
            self.current_tokens = self.estimator.estimate(&self.current);
        } else {
            self.current = candidate;
            self.current_tokens = candidate_tokens;
        }
    }

    fn flush(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let content = std::mem::take(&mut self.current);
        self.chunks.push(Chunk {
            index: self.chunks.len(),
            content,
            estimated_tokens: self.current_tokens,
        });
        self.current_tokens = 0;
    }

    fn finish(mut self) -> Vec<Chunk> {
        self.flush();
        self.chunks
    }
}

/// Split a paragraph into sentences at terminal-punctuation-plus-whitespace
/// boundaries, keeping the punctuation with its sentence.
///
/// Only ASCII terminal punctuation (`.`, `!`, `?`) ends a sentence, which is
/// what the normalizer produces after typography normalization. Runs of
/// punctuation ("?!", "...") stay with the preceding sentence.
pub(crate) fn split_sentences(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        if matches!(bytes[i], b'.' | b'!' | b'?') {
            let mut end = i + 1;
            while end < bytes.len() && matches!(bytes[end], b'.' | b'!' | b'?') {
                end += 1;
            }
            if end < bytes.len() && bytes[end].is_ascii_whitespace() {
                let mut next = end;
                while next < bytes.len() && bytes[next].is_ascii_whitespace() {
                    next += 1;
                }
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = next;
                i = next;
                continue;
            }
            i = end;
        } else {
            i += 1;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}
