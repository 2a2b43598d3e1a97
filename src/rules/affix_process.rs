//! Affix-process rules: prefixes, suffixes, infixes, circumfixes, simulfixes, reduplication and
//! truncation, all expressed as "match these parts, rebuild the word from these actions".
//!
//! ```text
//!   lhs:  [stem]                      rhs: [InsertShape(un), Copy(stem)]
//!
//!   synthesis   b a t  ──match──►  stem=bat  ──rhs──►  u n b a t
//!                                                      └─┘ └───┘
//!                                                      new  carried (keeps the root morph)
//!
//!   analysis    u n b a t  ──pattern [u n (stem: C* ...)]──►  b a t
//! ```
//!
//! ## Key concepts
//!
//! - **Carried vs new material**: output nodes copied from the input keep the morph they came from.
//!   Everything else belongs to the allomorph being applied. When a part is copied more than once
//!   (reduplication) only one window of copies is carried; see [`reduplication_window`].
//! - **Disjunctive allomorphs**: allomorphs are tried in order and the first success normally ends the
//!   search. Environments, free fluctuation and syntactic requirements keep it going, because those
//!   can only be settled once the whole word exists.
//! - **Blocking**: a blockable rule may hand back a word built from a competing lexical entry instead
//!   of the one it just derived.

use crate::api::Options;
use crate::engine::{Environment, FailureReason, Rule, TraceEvent, Tracer, snapshot};
use crate::error::{CompileError, MorphError};
use crate::feature::{FeatureStruct, VariableBindings};
use crate::pattern::{Match, Matcher, MatcherSettings, Pattern, PatternNode};
use crate::shape::{NodeId, NodeKind, NodeKinds, Shape};
use crate::word::{MprFeatureSet, Word, remove_duplicates};
use std::collections::{BTreeMap, BTreeSet};

use super::output_action::{OutputAction, untruncate};

// --- Definitions ---------------------------------------------------------------

/// Which end of the right-hand side holds the reduplicated copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReduplicationHint {
    #[default]
    Implicit,
    Prefix,
    Suffix,
}

/// Phonological context an allomorph requires around its own material in the finished word.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AllomorphEnvironment {
    pub left: Pattern,
    pub right: Pattern,
}

impl AllomorphEnvironment {
    pub fn new(left: Pattern, right: Pattern) -> Self {
        Self { left, right }
    }

    /// True when every morph of `allomorph` in `word` sits in this environment. Words that do not
    /// contain the allomorph as a top-level morph pass.
    pub fn is_match(&self, word: &Word, allomorph: &str) -> bool {
        let env = Environment::new(&self.left, &self.right, MatcherSettings::default());
        let visible: Vec<NodeId> =
            word.shape.live().filter(|&id| word.shape.node(id).kind == NodeKind::Segment).collect();
        word.shape.morphs().iter().filter(|m| m.allomorph == allomorph).all(|morph| {
            let gaps: Vec<usize> =
                morph.nodes.iter().filter_map(|id| visible.iter().position(|v| v == id)).collect();
            match (gaps.iter().min(), gaps.iter().max()) {
                (Some(&start), Some(&last)) => {
                    env.is_match_at(&word.shape, start, last + 1, &VariableBindings::default()).is_some()
                }
                _ => true,
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AffixProcessAllomorph {
    pub id: String,
    /// Named left-hand-side parts, matched in order against the whole word.
    pub lhs: Vec<Pattern>,
    pub rhs: Vec<OutputAction>,
    pub reduplication_hint: ReduplicationHint,
    pub required_mpr: MprFeatureSet,
    pub excluded_mpr: MprFeatureSet,
    pub out_mpr: MprFeatureSet,
    pub required_syntactic_fs: FeatureStruct,
    pub environments: Vec<AllomorphEnvironment>,
}

impl AffixProcessAllomorph {
    pub fn new(id: impl Into<String>, lhs: Vec<Pattern>, rhs: Vec<OutputAction>) -> Self {
        Self { id: id.into(), lhs, rhs, ..Default::default() }
    }

    /// Same applicability constraints. Consecutive allomorphs with equal constraints fluctuate freely.
    pub fn constraints_equal(&self, other: &AffixProcessAllomorph) -> bool {
        self.lhs == other.lhs
            && self.required_mpr == other.required_mpr
            && self.excluded_mpr == other.excluded_mpr
            && self.required_syntactic_fs == other.required_syntactic_fs
            && self.environments == other.environments
    }

    /// Does `word` satisfy every environment of this allomorph?
    pub fn is_word_valid(&self, word: &Word) -> bool {
        self.environments.iter().all(|env| env.is_match(word, &self.id))
    }

    fn part(&self, name: &str) -> Option<&Pattern> {
        self.lhs.iter().find(|p| p.name == name)
    }

    fn validate(&self, rule: &str) -> Result<(), CompileError> {
        let mut seen = BTreeSet::new();
        for part in &self.lhs {
            if !seen.insert(part.name.as_str()) {
                return Err(CompileError::DuplicatePart { rule: rule.to_string(), part: part.name.clone() });
            }
        }
        match self.rhs.iter().filter_map(OutputAction::part).find(|p| !seen.contains(p)) {
            Some(part) => Err(CompileError::UnknownPart { rule: rule.to_string(), part: part.to_string() }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AffixProcessRule {
    pub name: String,
    pub allomorphs: Vec<AffixProcessAllomorph>,
    pub max_application_count: usize,
    pub blockable: bool,
    pub required_syntactic_fs: FeatureStruct,
    pub out_syntactic_fs: FeatureStruct,
    pub obligatory_features: Vec<String>,
}

impl AffixProcessRule {
    pub fn new(name: impl Into<String>, allomorphs: Vec<AffixProcessAllomorph>) -> Self {
        Self {
            name: name.into(),
            allomorphs,
            max_application_count: 1,
            blockable: true,
            required_syntactic_fs: FeatureStruct::new(),
            out_syntactic_fs: FeatureStruct::new(),
            obligatory_features: Vec::new(),
        }
    }

    pub(crate) fn compile_synthesis(&self, options: &Options) -> Result<AffixProcessSynthesis, CompileError> {
        Ok(AffixProcessSynthesis {
            allomorphs: SynthesisAllomorphs::compile(&self.name, &self.allomorphs, self.blockable, false, options)?,
            rule: self.clone(),
        })
    }

    pub(crate) fn compile_analysis(&self, options: &Options) -> Result<AffixProcessAnalysis, CompileError> {
        Ok(AffixProcessAnalysis {
            allomorphs: AnalysisAllomorphs::compile(&self.name, &self.allomorphs, false, options)?,
            rule: self.clone(),
        })
    }
}

// --- Reduplication -------------------------------------------------------------

/// Start of the run of right-hand-side actions that reads the left-hand-side parts in order.
///
/// With a `Prefix` hint the copy sits at the front, so the base is the run closest to the end.
/// Otherwise the base is the run closest to the start.
pub(crate) fn reduplication_window(lhs: &[&str], rhs: &[Option<&str>], hint: ReduplicationHint) -> Option<usize> {
    if lhs.is_empty() || rhs.len() < lhs.len() {
        return None;
    }
    let mut starts = (0..=rhs.len() - lhs.len())
        .filter(|&s| rhs[s..s + lhs.len()].iter().zip(lhs).all(|(r, l)| *r == Some(*l)));
    match hint {
        ReduplicationHint::Prefix => starts.last(),
        ReduplicationHint::Implicit | ReduplicationHint::Suffix => starts.next(),
    }
}

/// For each action, whether the nodes it copies stay with the morph they came from.
pub(crate) fn carried_actions(allomorph: &AffixProcessAllomorph) -> Vec<bool> {
    let lhs: Vec<&str> = allomorph.lhs.iter().map(|p| p.name.as_str()).collect();
    let parts: Vec<Option<&str>> = allomorph.rhs.iter().map(OutputAction::part).collect();
    let occurrences = |name: &str| parts.iter().filter(|p| **p == Some(name)).count();
    let repeated = parts.iter().flatten().any(|name| occurrences(*name) > 1);
    let window = if repeated { reduplication_window(&lhs, &parts, allomorph.reduplication_hint) } else { None };

    allomorph
        .rhs
        .iter()
        .enumerate()
        .map(|(i, action)| {
            let Some(name) = action.part() else {
                return false;
            };
            if occurrences(name) == 1 {
                return matches!(action, OutputAction::CopyFromInput { .. });
            }
            match window {
                Some(start) => (start..start + lhs.len()).contains(&i),
                None => {
                    let mut same = parts.iter().enumerate().filter(|(_, p)| **p == Some(name)).map(|(j, _)| j);
                    let chosen = match allomorph.reduplication_hint {
                        ReduplicationHint::Prefix => same.last(),
                        _ => same.next(),
                    };
                    chosen == Some(i)
                }
            }
        })
        .collect()
}

// --- Synthesis -------------------------------------------------------------------

struct SynthesisAllomorph {
    index: usize,
    def: AffixProcessAllomorph,
    matcher: Matcher,
    carried: Vec<bool>,
}

/// Compiled allomorph list shared by plain and realizational affix synthesis.
pub(crate) struct SynthesisAllomorphs {
    rule: String,
    allomorphs: Vec<SynthesisAllomorph>,
    blockable: bool,
    realizational: bool,
    trace_words: bool,
}

impl SynthesisAllomorphs {
    pub(crate) fn compile(
        rule: &str,
        allomorphs: &[AffixProcessAllomorph],
        blockable: bool,
        realizational: bool,
        options: &Options,
    ) -> Result<Self, CompileError> {
        if allomorphs.is_empty() {
            return Err(CompileError::Empty { rule: rule.to_string() });
        }
        let settings = MatcherSettings {
            anchored_to_start: true,
            anchored_to_end: true,
            filter: NodeKinds::SEGMENT | NodeKinds::BOUNDARY,
            ..Default::default()
        };
        let mut compiled = Vec::with_capacity(allomorphs.len());
        for (index, def) in allomorphs.iter().enumerate() {
            def.validate(rule)?;
            let nodes: Vec<PatternNode> =
                def.lhs.iter().map(|p| PatternNode::group(p.name.clone(), p.children.clone())).collect();
            compiled.push(SynthesisAllomorph {
                index,
                matcher: Matcher::from_nodes(&nodes, settings),
                carried: carried_actions(def),
                def: def.clone(),
            });
        }
        Ok(Self { rule: rule.to_string(), allomorphs: compiled, blockable, realizational, trace_words: options.trace_words })
    }

    pub(crate) fn not_applied(
        &self,
        input: &Word,
        allomorph: Option<usize>,
        reason: FailureReason,
        trace: &mut dyn Tracer,
    ) -> Vec<Word> {
        if trace.is_tracing() {
            trace.record(TraceEvent::MorphologicalRuleNotApplied {
                rule: self.rule.clone(),
                allomorph,
                reason,
                input: snapshot(input, self.trace_words),
            });
        }
        Vec::new()
    }

    /// Whether a success at allomorph `i` leaves later allomorphs in play.
    fn continues_after(&self, i: usize) -> bool {
        let current = &self.allomorphs[i].def;
        if !current.environments.is_empty() || !current.required_syntactic_fs.is_empty() {
            return true;
        }
        self.allomorphs
            .get(i + 1)
            .is_some_and(|next| !next.def.environments.is_empty() || current.constraints_equal(&next.def))
    }

    /// Try each allomorph in order. `finish` applies the rule's syntactic bookkeeping to every output.
    pub(crate) fn run(
        &self,
        input: &Word,
        trace: &mut dyn Tracer,
        finish: &dyn Fn(&mut Word),
    ) -> Result<Vec<Word>, MorphError> {
        let mut out = Vec::new();
        let mut applied = Vec::new();
        for allo in &self.allomorphs {
            let i = allo.index;
            if !input.mpr_features.is_match_required(&allo.def.required_mpr) {
                self.not_applied(input, Some(i), FailureReason::RequiredMprFeatures, trace);
                continue;
            }
            if !input.mpr_features.is_match_excluded(&allo.def.excluded_mpr) {
                self.not_applied(input, Some(i), FailureReason::ExcludedMprFeatures, trace);
                continue;
            }
            if !allo.def.required_syntactic_fs.is_unifiable(&input.syntactic_fs) {
                self.not_applied(input, Some(i), FailureReason::RequiredSyntacticFeatureStruct, trace);
                continue;
            }
            let Some(m) = allo.matcher.find(&input.shape, &mut |_| true).into_iter().next() else {
                self.not_applied(input, Some(i), FailureReason::Pattern, trace);
                continue;
            };

            let mut word = input.derive();
            word.shape = self.rebuild(allo, input, &m)?;
            word.mpr_features.add_output(&allo.def.out_mpr);
            finish(&mut word);
            word.push_allomorph(&allo.def.id);
            word.morphological_rule_applied(&self.rule, self.realizational, &applied);
            debug_log!("affix", "rule={} allomorph={} applied", self.rule, allo.def.id);
            if trace.is_tracing() {
                trace.record(TraceEvent::MorphologicalRuleApplied {
                    rule: self.rule.clone(),
                    allomorph: i,
                    input: snapshot(input, self.trace_words),
                    output: snapshot(&word, self.trace_words),
                });
            }
            out.push(block_or_freeze(&self.rule, self.blockable, self.trace_words, word, trace));
            applied.push(i);

            if !self.continues_after(i) {
                break;
            }
        }
        Ok(out)
    }

    /// Run the right-hand side into a fresh shape and re-derive its morphs.
    fn rebuild(&self, allo: &SynthesisAllomorph, input: &Word, m: &Match) -> Result<Shape, MorphError> {
        let mut shape = Shape::new();
        let mut new_nodes = Vec::new();
        let mut carried: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
        for (action, &is_carried) in allo.def.rhs.iter().zip(&allo.carried) {
            for (source, node) in action.apply(&self.rule, &allo.matcher, m, &input.shape, &mut shape)? {
                match source {
                    Some(source) if is_carried => {
                        if let Some(morph) = input.shape.morph_of(source) {
                            carried.entry(morph).or_default().push(node);
                        }
                    }
                    _ => new_nodes.push(node),
                }
            }
        }

        let mut kept = BTreeSet::new();
        for (&index, nodes) in &carried {
            let morph = &input.shape.morphs()[index];
            kept.insert(morph.allomorph.as_str());
            if let Some(copy) = shape.mark_morph(nodes.clone(), &morph.allomorph, &morph.morph_id) {
                for child in &morph.subsumed {
                    shape.subsume_morph(copy, child.clone());
                }
            }
        }

        let morph_id = input.morph_counter().to_string();
        let truncated = new_nodes.is_empty();
        let new_morph = if truncated {
            shape.last().and_then(|last| shape.mark_morph(vec![last], &allo.def.id, &morph_id))
        } else {
            shape.mark_contiguous_morphs(&new_nodes, &allo.def.id, &morph_id)
        };

        for (index, morph) in input.shape.morphs().iter().enumerate() {
            if carried.contains_key(&index) || !kept.insert(morph.allomorph.as_str()) {
                continue;
            }
            match (truncated, new_morph) {
                (false, Some(parent)) => shape.subsume_morph(parent, morph.as_subsumed()),
                _ => {
                    let first = shape.first();
                    if let Some(copy) = first.and_then(|f| shape.mark_morph(vec![f], &morph.allomorph, &morph.morph_id)) {
                        for child in &morph.subsumed {
                            shape.subsume_morph(copy, child.as_subsumed());
                        }
                    }
                }
            }
        }
        shape.reorder_morphs();
        Ok(shape)
    }
}

pub(crate) struct AffixProcessSynthesis {
    rule: AffixProcessRule,
    allomorphs: SynthesisAllomorphs,
}

impl Rule for AffixProcessSynthesis {
    fn name(&self) -> &str {
        &self.rule.name
    }

    fn apply(&self, input: &Word, trace: &mut dyn Tracer) -> Result<Vec<Word>, MorphError> {
        let rule = &self.rule;
        if !input.is_morphological_rule_applicable(&rule.name, false) {
            return Ok(self.allomorphs.not_applied(input, None, FailureReason::NotCurrentRule, trace));
        }
        if input.application_count(&rule.name) >= rule.max_application_count {
            return Ok(self.allomorphs.not_applied(input, None, FailureReason::MaxApplicationCount, trace));
        }
        let Some(mut syntactic_fs) = rule.required_syntactic_fs.unify(&input.syntactic_fs) else {
            return Ok(self.allomorphs.not_applied(input, None, FailureReason::RequiredSyntacticFeatureStruct, trace));
        };
        syntactic_fs.priority_union(&rule.out_syntactic_fs);

        self.allomorphs.run(input, trace, &|word: &mut Word| {
            word.syntactic_fs = syntactic_fs.clone();
            word.add_obligatory_features(&rule.obligatory_features);
        })
    }
}

// --- Analysis --------------------------------------------------------------------

struct AnalysisAllomorph {
    index: usize,
    def: AffixProcessAllomorph,
    matcher: Matcher,
    /// Part names read by more than one action.
    repeated: Vec<String>,
}

/// Compiled allomorph list shared by plain and realizational affix analysis.
pub(crate) struct AnalysisAllomorphs {
    rule: String,
    allomorphs: Vec<AnalysisAllomorph>,
    realizational: bool,
    trace_words: bool,
}

impl AnalysisAllomorphs {
    pub(crate) fn compile(
        rule: &str,
        allomorphs: &[AffixProcessAllomorph],
        realizational: bool,
        options: &Options,
    ) -> Result<Self, CompileError> {
        if allomorphs.is_empty() {
            return Err(CompileError::Empty { rule: rule.to_string() });
        }
        let settings = MatcherSettings {
            anchored_to_start: true,
            anchored_to_end: true,
            nondeterministic: true,
            ..Default::default()
        };
        let mut compiled = Vec::with_capacity(allomorphs.len());
        for (index, def) in allomorphs.iter().enumerate() {
            def.validate(rule)?;
            let nodes: Vec<PatternNode> = def
                .rhs
                .iter()
                .flat_map(|action| action.analysis_lhs(action.part().and_then(|p| def.part(p))))
                .collect();
            let repeated = repeated_parts(&def.rhs);
            compiled.push(AnalysisAllomorph {
                index,
                matcher: Matcher::from_nodes(&nodes, settings),
                repeated,
                def: def.clone(),
            });
        }
        Ok(Self { rule: rule.to_string(), allomorphs: compiled, realizational, trace_words: options.trace_words })
    }

    pub(crate) fn not_unapplied(&self, input: &Word, reason: FailureReason, trace: &mut dyn Tracer) -> Vec<Word> {
        if trace.is_tracing() {
            trace.record(TraceEvent::MorphologicalRuleNotUnapplied {
                rule: self.rule.clone(),
                reason,
                input: snapshot(input, self.trace_words),
            });
        }
        Vec::new()
    }

    /// Un-apply every allomorph that matches. `finish` sets the rule's syntactic view on each output.
    pub(crate) fn run(&self, input: &Word, trace: &mut dyn Tracer, finish: &dyn Fn(&mut Word)) -> Vec<Word> {
        let mut out = Vec::new();
        for allo in &self.allomorphs {
            let matches = allo.matcher.find(&input.shape, &mut |m: &Match| {
                captures_agree(&allo.matcher, &allo.repeated, &input.shape, m)
                    && strips_material(&allo.matcher, &allo.def.lhs, &input.shape, m)
            });
            for m in matches {
                let mut word = input.derive();
                word.shape = reconstruct(&allo.def.lhs, &allo.def.rhs, &allo.matcher, &input.shape, &m);
                word.mpr_features.union_with(&allo.def.required_mpr);
                finish(&mut word);
                word.morphological_rule_unapplied(&self.rule, self.realizational);
                if trace.is_tracing() {
                    trace.record(TraceEvent::MorphologicalRuleUnapplied {
                        rule: self.rule.clone(),
                        allomorph: allo.index,
                        input: snapshot(input, self.trace_words),
                        output: snapshot(&word, self.trace_words),
                    });
                }
                out.push(word);
            }
        }
        if out.is_empty() {
            return self.not_unapplied(input, FailureReason::Pattern, trace);
        }
        debug_log!("affix", "rule={} unapplied candidates={}", self.rule, out.len());
        remove_duplicates(out)
    }
}

pub(crate) struct AffixProcessAnalysis {
    rule: AffixProcessRule,
    allomorphs: AnalysisAllomorphs,
}

impl Rule for AffixProcessAnalysis {
    fn name(&self) -> &str {
        &self.rule.name
    }

    fn apply(&self, input: &Word, trace: &mut dyn Tracer) -> Result<Vec<Word>, MorphError> {
        let rule = &self.rule;
        if input.unapplication_count(&rule.name) >= rule.max_application_count {
            return Ok(self.allomorphs.not_unapplied(input, FailureReason::MaxApplicationCount, trace));
        }
        if !input.syntactic_fs.is_unifiable(&rule.out_syntactic_fs) {
            return Ok(self.allomorphs.not_unapplied(input, FailureReason::RequiredSyntacticFeatureStruct, trace));
        }
        let mut stripped = input.syntactic_fs.clone();
        for (feature, _) in rule.out_syntactic_fs.iter() {
            stripped.remove(feature);
        }
        let Some(syntactic_fs) = stripped.unify(&rule.required_syntactic_fs) else {
            return Ok(self.allomorphs.not_unapplied(input, FailureReason::RequiredSyntacticFeatureStruct, trace));
        };

        Ok(self.allomorphs.run(input, trace, &|word: &mut Word| word.syntactic_fs = syntactic_fs.clone()))
    }
}

// --- Analysis helpers ------------------------------------------------------------

/// Part names read by more than one action.
pub(crate) fn repeated_parts(rhs: &[OutputAction]) -> Vec<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for part in rhs.iter().filter_map(OutputAction::part) {
        *counts.entry(part).or_default() += 1;
    }
    counts.into_iter().filter(|(_, n)| *n > 1).map(|(p, _)| p.to_string()).collect()
}

/// Every capture of a repeated part must have the same length and unify node by node.
pub(crate) fn captures_agree(matcher: &Matcher, repeated: &[String], shape: &Shape, m: &Match) -> bool {
    repeated.iter().all(|name| {
        let captures: Vec<&[NodeId]> =
            matcher.groups_named(name).into_iter().filter_map(|g| m.capture(g)).map(|c| c.nodes.as_slice()).collect();
        let Some((first, rest)) = captures.split_first() else {
            return true;
        };
        rest.iter().all(|other| {
            other.len() == first.len()
                && first.iter().zip(other.iter()).all(|(&a, &b)| shape.node(a).fs.is_unifiable(&shape.node(b).fs))
        })
    })
}

/// False when the material outside every part capture consists only of optional nodes, which would
/// make the un-application vacuous.
pub(crate) fn strips_material(matcher: &Matcher, parts: &[Pattern], shape: &Shape, m: &Match) -> bool {
    let captured: BTreeSet<NodeId> = parts
        .iter()
        .flat_map(|p| matcher.groups_named(&p.name))
        .filter_map(|g| m.capture(g))
        .flat_map(|c| c.nodes.iter().copied())
        .collect();
    let stripped: Vec<NodeId> = m.whole.nodes.iter().copied().filter(|id| !captured.contains(id)).collect();
    stripped.is_empty() || !stripped.iter().all(|&id| shape.node(id).is_optional())
}

/// Rebuild the underlying shape for `parts`. Captured parts are copied with the features the rule
/// modified widened back out; parts the surface lost are untruncated from their patterns.
pub(crate) fn reconstruct(parts: &[Pattern], rhs: &[OutputAction], matcher: &Matcher, input: &Shape, m: &Match) -> Shape {
    let mut shape = Shape::new();
    for part in parts {
        match matcher.group(&part.name).and_then(|g| m.capture(g)) {
            Some(capture) => {
                for &id in &capture.nodes {
                    let mut node = input.node(id).detached();
                    for action in rhs {
                        if let OutputAction::ModifyFromInput { part: p, fs } = action {
                            if *p == part.name {
                                node.fs.widen(fs);
                            }
                        }
                    }
                    shape.push_node(node);
                }
            }
            None => {
                let mut nodes = Vec::new();
                untruncate(&part.children, &m.bindings, false, &mut nodes);
                for node in nodes {
                    shape.push_node(node);
                }
            }
        }
    }
    shape
}

/// Swap in a competing word when the rule is blockable and one exists, otherwise freeze.
pub(crate) fn block_or_freeze(
    rule: &str,
    blockable: bool,
    trace_words: bool,
    mut word: Word,
    trace: &mut dyn Tracer,
) -> Word {
    if blockable {
        if let Some(blocker) = word.check_blocking() {
            debug_log!("affix", "rule={} blocked by {:?}", rule, blocker.root_entry().map(|e| &e.id));
            if trace.is_tracing() {
                trace.record(TraceEvent::Blocked { rule: rule.to_string(), output: snapshot(&blocker, trace_words) });
            }
            return blocker;
        }
    }
    word.freeze();
    word
}
