//! Morpher run metrics.
//!
//! The intended usage is:
//!
//! - `Morpher::synthesize` / `Morpher::analyze` for normal operation.
//! - `Morpher::synthesize_with_metrics` / `Morpher::analyze_with_metrics` for profiling and for
//!   inspecting how many words each rule pass produced.
//!
//! Metrics are opt-in; the plain entry points never read the clock.

use crate::word::Word;
use std::time::Duration;

// --- Metrics -----------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct RunMetrics {
    /// Total elapsed time for the run.
    pub total: Duration,
    /// One entry per rule pass, in the order the passes ran.
    pub passes: Vec<PassMetrics>,
}

impl RunMetrics {
    /// The slowest pass, if any ran.
    pub fn slowest(&self) -> Option<&PassMetrics> {
        self.passes.iter().max_by_key(|p| p.duration)
    }
}

/// Timing and output size for one rule pass over every live word.
#[derive(Debug, Default, Clone)]
pub struct PassMetrics {
    /// Name of the rule that ran.
    pub rule: String,
    /// Elapsed time for the pass.
    pub duration: Duration,
    /// Words entering the pass.
    pub inputs: usize,
    /// Words leaving the pass.
    pub produced: usize,
}

/// Morpher output bundled with timing information.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub words: Vec<Word>,
    pub metrics: RunMetrics,
}
