//! Compounding rules: a head word and a non-head word combined into one shape.
//!
//! Synthesis takes the head from the input word and the non-head from the word's current non-head
//! slot, matches one pattern against each, then builds the compound from output actions that may read
//! parts of either. Analysis splits a surface word back into a head and a non-head candidate.

use crate::api::Options;
use crate::engine::{FailureReason, Rule, TraceEvent, Tracer, snapshot};
use crate::error::{CompileError, MorphError};
use crate::feature::FeatureStruct;
use crate::pattern::{Match, Matcher, MatcherSettings, Pattern, PatternNode};
use crate::shape::{NodeKinds, Shape};
use crate::word::{MprFeatureSet, ROOT_MORPH_ID, Word, remove_duplicates};
use std::collections::BTreeSet;

use super::affix_process::{block_or_freeze, captures_agree, reconstruct, repeated_parts, strips_material};
use super::output_action::OutputAction;

/// Which constituent comes first in a default compound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Headedness {
    #[default]
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompoundingSubrule {
    pub head_lhs: Vec<Pattern>,
    pub non_head_lhs: Vec<Pattern>,
    pub rhs: Vec<OutputAction>,
    pub required_mpr: MprFeatureSet,
    pub excluded_mpr: MprFeatureSet,
    pub out_mpr: MprFeatureSet,
}

impl CompoundingSubrule {
    pub fn new(head_lhs: Vec<Pattern>, non_head_lhs: Vec<Pattern>, rhs: Vec<OutputAction>) -> Self {
        Self { head_lhs, non_head_lhs, rhs, ..Default::default() }
    }

    /// Copy every head part and every non-head part, head first for left-headed compounds.
    pub fn concatenating(head_lhs: Vec<Pattern>, non_head_lhs: Vec<Pattern>, headedness: Headedness) -> Self {
        let copies = |parts: &Vec<Pattern>| parts.iter().map(|p| OutputAction::copy(p.name.clone())).collect::<Vec<_>>();
        let rhs = match headedness {
            Headedness::Left => [copies(&head_lhs), copies(&non_head_lhs)].concat(),
            Headedness::Right => [copies(&non_head_lhs), copies(&head_lhs)].concat(),
        };
        Self::new(head_lhs, non_head_lhs, rhs)
    }

    fn validate(&self, rule: &str) -> Result<(), CompileError> {
        let mut seen = BTreeSet::new();
        for part in self.head_lhs.iter().chain(&self.non_head_lhs) {
            if !seen.insert(part.name.as_str()) {
                return Err(CompileError::DuplicatePart { rule: rule.to_string(), part: part.name.clone() });
            }
        }
        match self.rhs.iter().filter_map(OutputAction::part).find(|p| !seen.contains(p)) {
            Some(part) => Err(CompileError::UnknownPart { rule: rule.to_string(), part: part.to_string() }),
            None => Ok(()),
        }
    }

    fn is_non_head_part(&self, name: &str) -> bool {
        self.non_head_lhs.iter().any(|p| p.name == name)
    }

    fn part(&self, name: &str) -> Option<&Pattern> {
        self.head_lhs.iter().chain(&self.non_head_lhs).find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompoundingRule {
    pub name: String,
    pub subrules: Vec<CompoundingSubrule>,
    pub max_application_count: usize,
    pub blockable: bool,
    pub head_required_syntactic_fs: FeatureStruct,
    pub non_head_required_syntactic_fs: FeatureStruct,
    pub out_syntactic_fs: FeatureStruct,
    /// Features the finished compound must carry in its syntactic feature structure.
    pub obligatory_features: Vec<String>,
}

impl CompoundingRule {
    pub fn new(name: impl Into<String>, subrules: Vec<CompoundingSubrule>) -> Self {
        Self {
            name: name.into(),
            subrules,
            max_application_count: 1,
            blockable: true,
            head_required_syntactic_fs: FeatureStruct::new(),
            non_head_required_syntactic_fs: FeatureStruct::new(),
            out_syntactic_fs: FeatureStruct::new(),
            obligatory_features: Vec::new(),
        }
    }

    pub(crate) fn compile_synthesis(&self, options: &Options) -> Result<CompoundingSynthesis, CompileError> {
        if self.subrules.is_empty() {
            return Err(CompileError::Empty { rule: self.name.clone() });
        }
        let settings = MatcherSettings {
            anchored_to_start: true,
            anchored_to_end: true,
            filter: NodeKinds::SEGMENT | NodeKinds::BOUNDARY,
            ..Default::default()
        };
        let groups = |parts: &Vec<Pattern>| {
            let nodes: Vec<PatternNode> =
                parts.iter().map(|p| PatternNode::group(p.name.clone(), p.children.clone())).collect();
            Matcher::from_nodes(&nodes, settings)
        };
        let mut subrules = Vec::with_capacity(self.subrules.len());
        for def in &self.subrules {
            def.validate(&self.name)?;
            subrules.push(SynthesisSubrule {
                head: groups(&def.head_lhs),
                non_head: groups(&def.non_head_lhs),
                def: def.clone(),
            });
        }
        Ok(CompoundingSynthesis { rule: self.clone(), subrules, trace_words: options.trace_words })
    }

    pub(crate) fn compile_analysis(&self, options: &Options) -> Result<CompoundingAnalysis, CompileError> {
        if self.subrules.is_empty() {
            return Err(CompileError::Empty { rule: self.name.clone() });
        }
        let settings = MatcherSettings {
            anchored_to_start: true,
            anchored_to_end: true,
            nondeterministic: true,
            ..Default::default()
        };
        let mut subrules = Vec::with_capacity(self.subrules.len());
        for def in &self.subrules {
            def.validate(&self.name)?;
            let nodes: Vec<PatternNode> = def
                .rhs
                .iter()
                .flat_map(|action| action.analysis_lhs(action.part().and_then(|p| def.part(p))))
                .collect();
            subrules.push(AnalysisSubrule {
                matcher: Matcher::from_nodes(&nodes, settings),
                repeated: repeated_parts(&def.rhs),
                def: def.clone(),
            });
        }
        Ok(CompoundingAnalysis { rule: self.clone(), subrules, trace_words: options.trace_words })
    }
}

// --- Synthesis -------------------------------------------------------------------

struct SynthesisSubrule {
    def: CompoundingSubrule,
    head: Matcher,
    non_head: Matcher,
}

pub(crate) struct CompoundingSynthesis {
    rule: CompoundingRule,
    subrules: Vec<SynthesisSubrule>,
    trace_words: bool,
}

impl CompoundingSynthesis {
    fn not_applied(&self, input: &Word, subrule: Option<usize>, reason: FailureReason, trace: &mut dyn Tracer) {
        if trace.is_tracing() {
            trace.record(TraceEvent::MorphologicalRuleNotApplied {
                rule: self.rule.name.clone(),
                allomorph: subrule,
                reason,
                input: snapshot(input, self.trace_words),
            });
        }
    }

    /// Build the compound shape. Head material keeps its morphs; non-head material becomes the
    /// non-head root morph.
    fn rebuild(
        &self,
        subrule: &SynthesisSubrule,
        head: &Word,
        head_match: &Match,
        non_head: &Word,
        non_head_match: &Match,
        non_head_root: &str,
    ) -> Result<Shape, MorphError> {
        let mut shape = Shape::new();
        let mut non_head_nodes = Vec::new();
        let mut carried = Vec::new();
        for action in &subrule.def.rhs {
            let from_non_head = action.part().is_some_and(|p| subrule.def.is_non_head_part(p));
            let mapping = if from_non_head {
                action.apply(&self.rule.name, &subrule.non_head, non_head_match, &non_head.shape, &mut shape)?
            } else {
                action.apply(&self.rule.name, &subrule.head, head_match, &head.shape, &mut shape)?
            };
            for (source, node) in mapping {
                match source {
                    Some(_) if from_non_head => non_head_nodes.push(node),
                    Some(source) => carried.push((source, node)),
                    None => {}
                }
            }
        }

        for (index, morph) in head.shape.morphs().iter().enumerate() {
            let nodes: Vec<_> =
                carried.iter().filter(|(s, _)| head.shape.morph_of(*s) == Some(index)).map(|(_, n)| *n).collect();
            if let Some(copy) = shape.mark_morph(nodes, &morph.allomorph, &morph.morph_id) {
                for child in &morph.subsumed {
                    shape.subsume_morph(copy, child.clone());
                }
            }
        }
        shape.mark_contiguous_morphs(&non_head_nodes, non_head_root, ROOT_MORPH_ID);
        shape.reorder_morphs();
        Ok(shape)
    }
}

impl Rule for CompoundingSynthesis {
    fn name(&self) -> &str {
        &self.rule.name
    }

    fn apply(&self, input: &Word, trace: &mut dyn Tracer) -> Result<Vec<Word>, MorphError> {
        let rule = &self.rule;
        if !input.is_morphological_rule_applicable(&rule.name, true) {
            self.not_applied(input, None, FailureReason::NotCurrentRule, trace);
            return Ok(Vec::new());
        }
        if input.application_count(&rule.name) >= rule.max_application_count {
            self.not_applied(input, None, FailureReason::MaxApplicationCount, trace);
            return Ok(Vec::new());
        }
        let Some(non_head) = input.current_non_head() else {
            self.not_applied(input, None, FailureReason::NoNonHead, trace);
            return Ok(Vec::new());
        };
        if !rule.non_head_required_syntactic_fs.is_unifiable(&non_head.syntactic_fs) {
            self.not_applied(input, None, FailureReason::NonHeadRequiredSyntacticFeatureStruct, trace);
            return Ok(Vec::new());
        }
        let Some(mut syntactic_fs) = rule.head_required_syntactic_fs.unify(&input.syntactic_fs) else {
            self.not_applied(input, None, FailureReason::HeadRequiredSyntacticFeatureStruct, trace);
            return Ok(Vec::new());
        };
        syntactic_fs.priority_union(&rule.out_syntactic_fs);
        let non_head_root = non_head.allomorphs().first().cloned().unwrap_or_default();

        for (i, subrule) in self.subrules.iter().enumerate() {
            if !input.mpr_features.is_match_required(&subrule.def.required_mpr) {
                self.not_applied(input, Some(i), FailureReason::RequiredMprFeatures, trace);
                continue;
            }
            if !input.mpr_features.is_match_excluded(&subrule.def.excluded_mpr) {
                self.not_applied(input, Some(i), FailureReason::ExcludedMprFeatures, trace);
                continue;
            }
            let Some(head_match) = subrule.head.find(&input.shape, &mut |_| true).into_iter().next() else {
                self.not_applied(input, Some(i), FailureReason::HeadPattern, trace);
                continue;
            };
            let Some(non_head_match) = subrule.non_head.find(&non_head.shape, &mut |_| true).into_iter().next() else {
                self.not_applied(input, Some(i), FailureReason::NonHeadPattern, trace);
                continue;
            };

            let mut word = input.derive();
            word.shape = self.rebuild(subrule, input, &head_match, non_head, &non_head_match, &non_head_root)?;
            word.syntactic_fs = syntactic_fs.clone();
            word.mpr_features.add_output(&subrule.def.out_mpr);
            word.add_obligatory_features(&rule.obligatory_features);
            word.non_head_applied();
            word.push_allomorph(&non_head_root);
            word.morphological_rule_applied(&rule.name, false, &[]);
            debug_log!("compound", "rule={} subrule={} applied", rule.name, i);
            if trace.is_tracing() {
                trace.record(TraceEvent::MorphologicalRuleApplied {
                    rule: rule.name.clone(),
                    allomorph: i,
                    input: snapshot(input, self.trace_words),
                    output: snapshot(&word, self.trace_words),
                });
            }
            return Ok(vec![block_or_freeze(&rule.name, rule.blockable, self.trace_words, word, trace)]);
        }
        Ok(Vec::new())
    }
}

// --- Analysis --------------------------------------------------------------------

struct AnalysisSubrule {
    def: CompoundingSubrule,
    matcher: Matcher,
    repeated: Vec<String>,
}

pub(crate) struct CompoundingAnalysis {
    rule: CompoundingRule,
    subrules: Vec<AnalysisSubrule>,
    trace_words: bool,
}

impl CompoundingAnalysis {
    fn not_unapplied(&self, input: &Word, reason: FailureReason, trace: &mut dyn Tracer) -> Vec<Word> {
        if trace.is_tracing() {
            trace.record(TraceEvent::MorphologicalRuleNotUnapplied {
                rule: self.rule.name.clone(),
                reason,
                input: snapshot(input, self.trace_words),
            });
        }
        Vec::new()
    }
}

impl Rule for CompoundingAnalysis {
    fn name(&self) -> &str {
        &self.rule.name
    }

    fn apply(&self, input: &Word, trace: &mut dyn Tracer) -> Result<Vec<Word>, MorphError> {
        let rule = &self.rule;
        if input.unapplication_count(&rule.name) >= rule.max_application_count {
            return Ok(self.not_unapplied(input, FailureReason::MaxApplicationCount, trace));
        }
        if !input.syntactic_fs.is_unifiable(&rule.out_syntactic_fs) {
            return Ok(self.not_unapplied(input, FailureReason::HeadRequiredSyntacticFeatureStruct, trace));
        }
        let mut stripped = input.syntactic_fs.clone();
        for (feature, _) in rule.out_syntactic_fs.iter() {
            stripped.remove(feature);
        }
        let Some(syntactic_fs) = stripped.unify(&rule.head_required_syntactic_fs) else {
            return Ok(self.not_unapplied(input, FailureReason::HeadRequiredSyntacticFeatureStruct, trace));
        };

        let mut out = Vec::new();
        for (i, subrule) in self.subrules.iter().enumerate() {
            let parts: Vec<Pattern> = subrule.def.head_lhs.iter().chain(&subrule.def.non_head_lhs).cloned().collect();
            let matches = subrule.matcher.find(&input.shape, &mut |m: &Match| {
                captures_agree(&subrule.matcher, &subrule.repeated, &input.shape, m)
                    && strips_material(&subrule.matcher, &parts, &input.shape, m)
            });
            for m in matches {
                let mut non_head =
                    Word::surface(reconstruct(&subrule.def.non_head_lhs, &subrule.def.rhs, &subrule.matcher, &input.shape, &m));
                non_head.syntactic_fs = rule.non_head_required_syntactic_fs.clone();

                let mut word = input.derive();
                word.shape = reconstruct(&subrule.def.head_lhs, &subrule.def.rhs, &subrule.matcher, &input.shape, &m);
                word.syntactic_fs = syntactic_fs.clone();
                word.mpr_features.union_with(&subrule.def.required_mpr);
                word.non_head_unapplied(non_head);
                word.morphological_rule_unapplied(&rule.name, false);
                if trace.is_tracing() {
                    trace.record(TraceEvent::MorphologicalRuleUnapplied {
                        rule: rule.name.clone(),
                        allomorph: i,
                        input: snapshot(input, self.trace_words),
                        output: snapshot(&word, self.trace_words),
                    });
                }
                out.push(word);
            }
        }
        if out.is_empty() {
            return Ok(self.not_unapplied(input, FailureReason::Pattern, trace));
        }
        Ok(remove_duplicates(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{NoTrace, TraceKind, TraceLog};
    use crate::test_support::phonology;

    fn any_segments(name: &str) -> Pattern {
        let ph = phonology();
        Pattern::named(name, vec![PatternNode::repeat(ph.seg(""), 1, None)])
    }

    fn rule(headedness: Headedness) -> CompoundingRule {
        CompoundingRule::new(
            "CMP",
            vec![CompoundingSubrule::concatenating(vec![any_segments("head")], vec![any_segments("nonhead")], headedness)],
        )
    }

    fn compound_input(head: &str, non_head: &str) -> Word {
        let ph = phonology();
        let mut word = ph.word(head);
        word.non_head_unapplied(ph.word(non_head));
        word.schedule_rules(&["CMP"]);
        word
    }

    #[test]
    fn headedness_orders_the_constituents() {
        let ph = phonology();
        let options = Options::default();
        let input = compound_input("bat", "mod");

        let left = rule(Headedness::Left).compile_synthesis(&options).unwrap();
        let out = left.apply(&input, &mut NoTrace).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(ph.render(&out[0].shape), "batmod");
        assert_eq!(out[0].shape.morphs().iter().map(|m| m.allomorph.as_str()).collect::<Vec<_>>(), vec!["bat", "mod"]);
        assert!(out[0].current_non_head().is_none());

        let right = rule(Headedness::Right).compile_synthesis(&options).unwrap();
        let out = right.apply(&input, &mut NoTrace).unwrap();
        assert_eq!(ph.render(&out[0].shape), "modbat");
        assert_eq!(out[0].allomorphs(), ["bat", "mod"].map(String::from));
    }

    #[test]
    fn obligatory_features_pass_to_the_compound() {
        let mut rule = rule(Headedness::Left);
        rule.obligatory_features = vec!["pos".to_string()];
        let out = rule.compile_synthesis(&Options::default()).unwrap().apply(&compound_input("bat", "mod"), &mut NoTrace).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].obligatory_features().contains("pos"));
    }

    #[test]
    fn missing_non_head_is_reported() {
        let ph = phonology();
        let mut input = ph.word("bat");
        input.schedule_rules(&["CMP"]);
        let synthesis = rule(Headedness::Left).compile_synthesis(&Options::default()).unwrap();
        let mut log = TraceLog::new();
        assert!(synthesis.apply(&input, &mut log).unwrap().is_empty());
        assert_eq!(log.reasons(), vec![FailureReason::NoNonHead]);
    }

    #[test]
    fn analysis_splits_off_a_non_head() {
        let ph = phonology();
        let mut rule = rule(Headedness::Left);
        rule.subrules[0].head_lhs[0] = Pattern::named("head", ph.literal("bat"));
        let analysis = rule.compile_analysis(&Options::default()).unwrap();
        let out = analysis.apply(&Word::surface(ph.shape("batmod")), &mut NoTrace).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(ph.render(&out[0].shape), "bat");
        let non_head = out[0].current_non_head().unwrap();
        assert_eq!(ph.render(&non_head.shape), "mod");
        assert!(out[0].is_morphological_rule_applicable("CMP", true));
    }

    #[test]
    fn unknown_parts_fail_to_compile() {
        let ph = phonology();
        let bad = CompoundingRule::new(
            "CMP",
            vec![CompoundingSubrule::new(
                vec![Pattern::named("head", vec![ph.seg("+cons")])],
                vec![],
                vec![OutputAction::copy("stem")],
            )],
        );
        assert_eq!(
            bad.compile_synthesis(&Options::default()).err(),
            Some(CompileError::UnknownPart { rule: "CMP".into(), part: "stem".into() })
        );
        let mut log = TraceLog::new();
        let _ = rule(Headedness::Left).compile_synthesis(&Options::default()).unwrap().apply(&Word::default(), &mut log);
        assert_eq!(log.count(TraceKind::MorphologicalRuleNotApplied), 1);
    }
}
