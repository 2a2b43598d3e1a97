//! Realizational (inflectional) affix rules.
//!
//! These reuse the affix-process allomorph machinery but are gated by a realizational feature
//! structure instead of the current-rule pointer. A realizational rule only fires when the features it
//! spells out are still unexpressed in the word's syntax.

use crate::api::Options;
use crate::engine::{FailureReason, Rule, Tracer};
use crate::error::{CompileError, MorphError};
use crate::feature::{FeatureStruct, FeatureValue};
use crate::word::Word;
use std::collections::HashSet;

use super::affix_process::{AffixProcessAllomorph, AnalysisAllomorphs, SynthesisAllomorphs};

#[derive(Debug, Clone, PartialEq)]
pub struct RealizationalAffixProcessRule {
    pub name: String,
    pub allomorphs: Vec<AffixProcessAllomorph>,
    pub realizational_fs: FeatureStruct,
    pub required_syntactic_fs: FeatureStruct,
    pub blockable: bool,
}

impl RealizationalAffixProcessRule {
    pub fn new(name: impl Into<String>, realizational_fs: FeatureStruct, allomorphs: Vec<AffixProcessAllomorph>) -> Self {
        Self {
            name: name.into(),
            allomorphs,
            realizational_fs,
            required_syntactic_fs: FeatureStruct::new(),
            blockable: true,
        }
    }

    pub(crate) fn compile_synthesis(&self, options: &Options) -> Result<RealizationalSynthesis, CompileError> {
        Ok(RealizationalSynthesis {
            allomorphs: SynthesisAllomorphs::compile(&self.name, &self.allomorphs, self.blockable, true, options)?,
            rule: self.clone(),
        })
    }

    pub(crate) fn compile_analysis(&self, options: &Options) -> Result<RealizationalAnalysis, CompileError> {
        Ok(RealizationalAnalysis {
            allomorphs: AnalysisAllomorphs::compile(&self.name, &self.allomorphs, true, options)?,
            rule: self.clone(),
        })
    }
}

/// True when every feature of `realizational` is already present in `syntactic`, recursing into
/// complex values. A pair seen twice counts as blocked.
pub(crate) fn is_blocked(
    realizational: &FeatureStruct,
    syntactic: &FeatureStruct,
    visited: &mut HashSet<(FeatureStruct, FeatureStruct)>,
) -> bool {
    if !visited.insert((realizational.clone(), syntactic.clone())) {
        return true;
    }
    realizational.iter().all(|(feature, value)| match (value, syntactic.get(feature)) {
        (_, None) => false,
        (FeatureValue::Complex(real), Some(FeatureValue::Complex(syn))) => is_blocked(real, syn, visited),
        _ => true,
    })
}

pub(crate) struct RealizationalSynthesis {
    rule: RealizationalAffixProcessRule,
    allomorphs: SynthesisAllomorphs,
}

impl Rule for RealizationalSynthesis {
    fn name(&self) -> &str {
        &self.rule.name
    }

    fn apply(&self, input: &Word, trace: &mut dyn Tracer) -> Result<Vec<Word>, MorphError> {
        let rule = &self.rule;
        if !rule.realizational_fs.subsumes(&input.realizational_fs) {
            return Ok(self.allomorphs.not_applied(input, None, FailureReason::RealizationalFeatureStruct, trace));
        }
        if !rule.realizational_fs.is_empty()
            && is_blocked(&rule.realizational_fs, &input.syntactic_fs, &mut HashSet::new())
        {
            return Ok(self.allomorphs.not_applied(input, None, FailureReason::RealizationalFeatureStruct, trace));
        }
        let Some(mut syntactic_fs) = rule.required_syntactic_fs.unify(&input.syntactic_fs) else {
            return Ok(self.allomorphs.not_applied(input, None, FailureReason::RequiredSyntacticFeatureStruct, trace));
        };
        syntactic_fs.priority_union(&rule.realizational_fs);

        self.allomorphs.run(input, trace, &|word: &mut Word| word.syntactic_fs = syntactic_fs.clone())
    }
}

pub(crate) struct RealizationalAnalysis {
    rule: RealizationalAffixProcessRule,
    allomorphs: AnalysisAllomorphs,
}

impl Rule for RealizationalAnalysis {
    fn name(&self) -> &str {
        &self.rule.name
    }

    fn apply(&self, input: &Word, trace: &mut dyn Tracer) -> Result<Vec<Word>, MorphError> {
        let rule = &self.rule;
        let Some(realizational_fs) = input.realizational_fs.unify(&rule.realizational_fs) else {
            return Ok(self.allomorphs.not_unapplied(input, FailureReason::RealizationalFeatureStruct, trace));
        };
        let Some(syntactic_fs) = input.syntactic_fs.unify(&rule.required_syntactic_fs) else {
            return Ok(self.allomorphs.not_unapplied(input, FailureReason::RequiredSyntacticFeatureStruct, trace));
        };

        Ok(self.allomorphs.run(input, trace, &|word: &mut Word| {
            word.realizational_fs = realizational_fs.clone();
            word.syntactic_fs = syntactic_fs.clone();
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::phonology;

    #[test]
    fn features_already_in_the_syntax_block_realization() {
        let ph = phonology();
        let real = ph.fs("+pl");
        assert!(is_blocked(&real, &ph.fs("+pl pos=n"), &mut HashSet::new()));
        assert!(!is_blocked(&real, &ph.fs("pos=n"), &mut HashSet::new()));
    }

    #[test]
    fn complex_values_are_walked_recursively() {
        let ph = phonology();
        let real = FeatureStruct::new().with("agr", FeatureValue::Complex(ph.fs("+pl +past")));
        let partial = FeatureStruct::new().with("agr", FeatureValue::Complex(ph.fs("+pl")));
        let full = FeatureStruct::new().with("agr", FeatureValue::Complex(ph.fs("-pl -past")));
        assert!(!is_blocked(&real, &partial, &mut HashSet::new()));
        assert!(is_blocked(&real, &full, &mut HashSet::new()));
    }
}
