//! Rule compilation: one definition in, one executor per direction out.
//!
//! ```text
//!   RuleDef ──compile_synthesis_rule──► Box<dyn Rule>   (generation)
//!           └─compile_analysis_rule───► Box<dyn Rule>   (parsing)
//! ```
//!
//! ## Invariants
//!
//! - Definition errors (an output action naming an unknown part, a metathesis group that is missing
//!   or declared twice, a rule with nothing to apply) surface here as [`CompileError`], never at
//!   apply time.
//! - Compilation clones what it needs; the definition can be dropped afterwards.

use super::rule::Rule;
use crate::api::Options;
use crate::error::CompileError;
use crate::rules::{AffixProcessRule, CompoundingRule, MetathesisRule, RealizationalAffixProcessRule, RewriteRule};

/// The closed set of rule definitions the engine knows how to compile.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleDef {
    AffixProcess(AffixProcessRule),
    Realizational(RealizationalAffixProcessRule),
    Compounding(CompoundingRule),
    Rewrite(RewriteRule),
    Metathesis(MetathesisRule),
}

impl RuleDef {
    pub fn name(&self) -> &str {
        match self {
            RuleDef::AffixProcess(r) => &r.name,
            RuleDef::Realizational(r) => &r.name,
            RuleDef::Compounding(r) => &r.name,
            RuleDef::Rewrite(r) => &r.name,
            RuleDef::Metathesis(r) => &r.name,
        }
    }

    /// Morphological rules consume a scheduled rule slot; phonological ones apply wherever they match.
    pub fn is_morphological(&self) -> bool {
        matches!(self, RuleDef::AffixProcess(_) | RuleDef::Realizational(_) | RuleDef::Compounding(_))
    }
}

impl From<AffixProcessRule> for RuleDef {
    fn from(rule: AffixProcessRule) -> Self {
        RuleDef::AffixProcess(rule)
    }
}

impl From<RealizationalAffixProcessRule> for RuleDef {
    fn from(rule: RealizationalAffixProcessRule) -> Self {
        RuleDef::Realizational(rule)
    }
}

impl From<CompoundingRule> for RuleDef {
    fn from(rule: CompoundingRule) -> Self {
        RuleDef::Compounding(rule)
    }
}

impl From<RewriteRule> for RuleDef {
    fn from(rule: RewriteRule) -> Self {
        RuleDef::Rewrite(rule)
    }
}

impl From<MetathesisRule> for RuleDef {
    fn from(rule: MetathesisRule) -> Self {
        RuleDef::Metathesis(rule)
    }
}

/// Build the generation executor for `def`.
pub fn compile_synthesis_rule(def: &RuleDef, options: &Options) -> Result<Box<dyn Rule>, CompileError> {
    let rule: Box<dyn Rule> = match def {
        RuleDef::AffixProcess(r) => Box::new(r.compile_synthesis(options)?),
        RuleDef::Realizational(r) => Box::new(r.compile_synthesis(options)?),
        RuleDef::Compounding(r) => Box::new(r.compile_synthesis(options)?),
        RuleDef::Rewrite(r) => Box::new(r.compile_synthesis(options)?),
        RuleDef::Metathesis(r) => Box::new(r.compile_synthesis(options)?),
    };
    debug_log!("compile", "synthesis rule={}", def.name());
    Ok(rule)
}

/// Build the parsing executor for `def`.
pub fn compile_analysis_rule(def: &RuleDef, options: &Options) -> Result<Box<dyn Rule>, CompileError> {
    let rule: Box<dyn Rule> = match def {
        RuleDef::AffixProcess(r) => Box::new(r.compile_analysis(options)?),
        RuleDef::Realizational(r) => Box::new(r.compile_analysis(options)?),
        RuleDef::Compounding(r) => Box::new(r.compile_analysis(options)?),
        RuleDef::Rewrite(r) => Box::new(r.compile_analysis(options)?),
        RuleDef::Metathesis(r) => Box::new(r.compile_analysis(options)?),
    };
    debug_log!("compile", "analysis rule={}", def.name());
    Ok(rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::NoTrace;
    use crate::pattern::{Pattern, PatternNode};
    use crate::rules::{AffixProcessAllomorph, OutputAction, RewriteSubrule};
    use crate::test_support::phonology;

    #[test]
    fn executors_keep_the_definition_name() {
        let ph = phonology();
        let voicing = RewriteRule::new(
            "voicing",
            ph.segs(&["-son"]),
            vec![RewriteSubrule::new(ph.segs(&["+voice"]), Pattern::default(), ph.segs(&["+voice -son"]))],
        );
        let def = RuleDef::from(voicing);
        assert_eq!(def.name(), "voicing");
        assert!(!def.is_morphological());
        assert_eq!(compile_synthesis_rule(&def, &Options::default()).unwrap().name(), "voicing");
        assert_eq!(compile_analysis_rule(&def, &Options::default()).unwrap().name(), "voicing");
    }

    #[test]
    fn definition_errors_surface_at_compile_time() {
        let ph = phonology();
        let table = [
            (
                RuleDef::from(AffixProcessRule::new(
                    "PL",
                    vec![AffixProcessAllomorph::new(
                        "pl",
                        vec![Pattern::named("stem", vec![PatternNode::repeat(ph.seg(""), 1, None)])],
                        vec![OutputAction::copy("root")],
                    )],
                )),
                CompileError::UnknownPart { rule: "PL".into(), part: "root".into() },
            ),
            (
                RuleDef::from(MetathesisRule::new(
                    "swap",
                    Pattern::new(vec![PatternNode::group("L", vec![ph.seg("+cons")])]),
                    "L",
                    "R",
                )),
                CompileError::MissingGroup { rule: "swap".into(), group: "R".into() },
            ),
            (RuleDef::from(RewriteRule::new("empty", ph.segs(&["+cons"]), vec![])), CompileError::Empty {
                rule: "empty".into(),
            }),
        ];
        for (def, expected) in table {
            assert_eq!(compile_synthesis_rule(&def, &Options::default()).err(), Some(expected.clone()), "{}", def.name());
            assert_eq!(compile_analysis_rule(&def, &Options::default()).err(), Some(expected), "{}", def.name());
        }
    }

    #[test]
    fn unscheduled_words_pass_morphological_executors_untouched() {
        let ph = phonology();
        let def = RuleDef::from(AffixProcessRule::new(
            "PL",
            vec![AffixProcessAllomorph::new(
                "pl",
                vec![Pattern::named("stem", vec![PatternNode::repeat(ph.seg(""), 1, None)])],
                vec![OutputAction::copy("stem"), OutputAction::InsertShape(ph.shape("s"))],
            )],
        ));
        assert!(def.is_morphological());
        let rule = compile_synthesis_rule(&def, &Options::default()).unwrap();
        assert!(rule.apply(&ph.word("bat"), &mut NoTrace).unwrap().is_empty());
    }
}
