//! Rule definitions and their synthesis/analysis executors.
//!
//! Every definition in this module is plain, immutable data. Compiling one (see
//! [`crate::engine::compile_synthesis_rule`]) yields an executor for one direction; the two executors
//! of a rule share nothing but the definition they were built from.
//!
//! ## Layout
//!
//! - `output_action.rs`: the right-hand-side actions shared by affix processes and compounding, and
//!   their inversion into analysis patterns.
//! - `affix_process.rs`: affixation, reduplication and truncation, plus the allomorph machinery that
//!   `realizational.rs` reuses.
//! - `compounding.rs`: head/non-head rules.
//! - `rewrite.rs`: feature change, epenthesis and deletion.
//! - `metathesis.rs`: two named groups trading places.

#[path = "rules/affix_process.rs"]
mod affix_process;
#[path = "rules/compounding.rs"]
mod compounding;
#[path = "rules/metathesis.rs"]
mod metathesis;
#[path = "rules/output_action.rs"]
mod output_action;
#[path = "rules/realizational.rs"]
mod realizational;
#[path = "rules/rewrite.rs"]
mod rewrite;


#[allow(unused_imports)]
pub use affix_process::{AffixProcessAllomorph, AffixProcessRule, AllomorphEnvironment, ReduplicationHint};
#[allow(unused_imports)]
pub use compounding::{CompoundingRule, CompoundingSubrule, Headedness};
#[allow(unused_imports)]
pub use metathesis::MetathesisRule;
#[allow(unused_imports)]
pub use output_action::OutputAction;
#[allow(unused_imports)]
pub use realizational::RealizationalAffixProcessRule;
#[allow(unused_imports)]
pub use rewrite::{RewriteRule, RewriteSubrule};
