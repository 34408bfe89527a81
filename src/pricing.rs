//! Per-model pricing and cost calculation.
//!
//! Prices are expressed in dollars per 1 000 tokens, split into input
//! (prompt) and output (completion) rates. Unknown model identifiers fall
//! back to a designated default entry rather than erroring: a price lookup
//! must never abort a run that is otherwise healthy.
//!
//! The built-in table reflects public list prices at the time of writing.
//! Prices change; override entries via [`PriceTable::insert`] or replace the
//! whole table in [`crate::config::RefineConfig`] when accuracy matters.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Dollar price per 1 000 tokens for one model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceEntry {
    /// Dollars per 1 000 input (prompt) tokens.
    pub input_per_1k: f64,
    /// Dollars per 1 000 output (completion) tokens.
    pub output_per_1k: f64,
}

impl PriceEntry {
    /// Cost in dollars for the given token counts.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        input_tokens as f64 / 1000.0 * self.input_per_1k
            + output_tokens as f64 / 1000.0 * self.output_per_1k
    }
}

/// Model-id → [`PriceEntry`] mapping with a default entry for unknown ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTable {
    entries: HashMap<String, PriceEntry>,
    default: PriceEntry,
}

impl Default for PriceTable {
    fn default() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            "gpt-4".to_string(),
            PriceEntry { input_per_1k: 0.03, output_per_1k: 0.06 },
        );
        entries.insert(
            "gpt-4.1".to_string(),
            PriceEntry { input_per_1k: 0.002, output_per_1k: 0.008 },
        );
        entries.insert(
            "gpt-4o".to_string(),
            PriceEntry { input_per_1k: 0.005, output_per_1k: 0.015 },
        );
        entries.insert(
            "claude-sonnet-4-20250514".to_string(),
            PriceEntry { input_per_1k: 0.003, output_per_1k: 0.015 },
        );
        entries.insert(
            "claude-3-7-sonnet-20250219".to_string(),
            PriceEntry { input_per_1k: 0.003, output_per_1k: 0.015 },
        );
        entries.insert(
            "claude-3-5-sonnet-20240620".to_string(),
            PriceEntry { input_per_1k: 0.003, output_per_1k: 0.015 },
        );
        entries.insert(
            "claude-3-5-haiku-20241022".to_string(),
            PriceEntry { input_per_1k: 0.0008, output_per_1k: 0.004 },
        );
        entries.insert(
            "claude-3-opus-20240229".to_string(),
            PriceEntry { input_per_1k: 0.015, output_per_1k: 0.075 },
        );

        // Conservative default: bill unknown models at the highest OpenAI
        // rate so a typo in a model id over-estimates rather than
        // under-estimates the pre-flight projection.
        Self {
            default: PriceEntry { input_per_1k: 0.03, output_per_1k: 0.06 },
            entries,
        }
    }
}

impl PriceTable {
    /// Add or replace the entry for `model`.
    pub fn insert(&mut self, model: impl Into<String>, entry: PriceEntry) {
        self.entries.insert(model.into(), entry);
    }

    /// Replace the default entry used for unrecognised model ids.
    pub fn set_default(&mut self, entry: PriceEntry) {
        self.default = entry;
    }

    /// Price entry for `model`, or the default entry when unknown.
    pub fn resolve(&self, model: &str) -> &PriceEntry {
        self.entries.get(model).unwrap_or(&self.default)
    }

    /// Cost in dollars of one call against `model`.
    pub fn cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        self.resolve(model).cost(input_tokens, output_tokens)
    }
}
