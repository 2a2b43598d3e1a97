//! Rule execution engine.
//!
//! This module is the *public entry point* for running rules. Rule definitions live in
//! `src/rules/`; everything that turns them into executors and runs those executors over words lives
//! in focused submodules under `src/engine/`.
//!
//! ## How the parts work together
//!
//! ```text
//! RuleDef (data) ──┐
//!                  │  compile_synthesis_rule / compile_analysis_rule     (compile.rs)
//!                  └───────────────┬──────────────
//!                                  │
//!                          Box<dyn Rule>                                 (rule.rs)
//!                                  │
//!      phonological rules ─────────┼─ PhonologicalPatternRule            (pattern_rule.rs)
//!                                  │    - target matcher + subrules
//!                                  │    - Iterative | Simultaneous
//!                                  v
//!                      RuleCascade (First | All | Linear)                (rule.rs)
//!                                  │
//!                                  │  events ──► Tracer                  (trace.rs)
//!                                  v
//!                              Vec<Word>
//! ```
//!
//! Every executor takes its input by reference and returns fresh words. A rule that does not apply
//! returns an empty vector; a rule that hits a derivation-fatal error returns `Err`, which a cascade
//! turns into a recorded branch abort.
//!
//! ## Responsibilities by module
//!
//! - `compile.rs`: the closed [`RuleDef`] set and the two compile entry points.
//! - `rule.rs`: the [`Rule`] contract and [`RuleCascade`].
//! - `pattern_rule.rs`: target/subrule matching shared by rewrite and metathesis rules, plus subrule
//!   environments.
//! - `trace.rs`: [`Tracer`] sinks and the event vocabulary.
//! - `metrics.rs`: optional per-pass timing for [`crate::Morpher`] runs.
//!
//! ## Public surface
//!
//! Most code interacts with the engine via:
//!
//! - [`RuleDef`], [`compile_synthesis_rule`], [`compile_analysis_rule`]
//! - [`Rule`] and [`RuleCascade`]
//! - [`TraceLog`] (or [`NoTrace`]) to observe what happened
//!
//! ## Adding a rule type
//!
//! - Add the definition under `src/rules/` with `compile_synthesis` / `compile_analysis` methods.
//! - Add a [`RuleDef`] variant and wire it through both compile functions.
//! - Phonological rules should implement `PatternSubrule` and let `PhonologicalPatternRule` drive
//!   scanning instead of rolling their own loop.
//!
//! ## Debugging
//!
//! Set `HERMIT_DEBUG_RULES=1` to print compilation and application traces to stderr.

#[path = "engine/compile.rs"]
mod compile;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/pattern_rule.rs"]
mod pattern_rule;
#[path = "engine/rule.rs"]
mod rule;
#[path = "engine/trace.rs"]
mod trace;

#[allow(unused_imports)]
pub use compile::{RuleDef, compile_analysis_rule, compile_synthesis_rule};
#[allow(unused_imports)]
pub use metrics::{PassMetrics, RunMetrics, RunResult};
#[allow(unused_imports)]
pub use pattern_rule::ApplicationMode;
#[allow(unused_imports)]
pub(crate) use pattern_rule::{Environment, PatternSubrule, PhonologicalPatternRule};
#[allow(unused_imports)]
pub use rule::{CascadeMode, Rule, RuleCascade};
#[allow(unused_imports)]
pub use trace::{FailureReason, NoTrace, TraceEvent, TraceKind, TraceLog, Tracer};
#[allow(unused_imports)]
pub(crate) use trace::snapshot;
