//! Bidirectional morphological and phonological rule engine.
//!
//! The same rule definitions drive both directions: synthesis builds surface words from an
//! underlying form plus a schedule of morphological rules, analysis recovers candidate underlying
//! forms from a surface word.
//!
//! ```text
//!   Word (root + schedule) ──► synthesis executors ──► surface Words
//!   Word (surface)         ──► analysis executors  ──► candidate underlying Words
//! ```
//!
//! Set `HERMIT_DEBUG_RULES=1` to print rule activity to stderr.

use once_cell::sync::Lazy;

#[macro_use]
mod macros;
mod api;
pub mod char_table;
pub mod engine;
pub mod error;
pub mod feature;
pub mod pattern;
pub mod rules;
pub mod shape;
pub mod word;

#[cfg(test)]
mod test_support;

pub use api::{Morpher, Options};
pub use engine::{
    CascadeMode, FailureReason, NoTrace, Rule, RuleCascade, RuleDef, TraceEvent, TraceKind, TraceLog, Tracer,
    compile_analysis_rule, compile_synthesis_rule,
};
pub use error::{CompileError, FeatureError, MorphError, ShapeError};

static DEBUG_RULES: Lazy<bool> = Lazy::new(|| std::env::var_os("HERMIT_DEBUG_RULES").is_some());

/// Whether `HERMIT_DEBUG_RULES` was set when the flag was first read.
pub fn debug_enabled() -> bool {
    *DEBUG_RULES
}
