//! Phonological rewrite rules: feature change, epenthesis and deletion.
//!
//! A rewrite rule pairs one target pattern with a disjunctive list of subrules. Each subrule gives a
//! replacement and the environments it applies in. How the target and replacement compare decides what
//! a rewrite does in each direction:
//!
//! ```text
//!   target vs replacement    synthesis                          analysis
//!   same length              priority-union rhs onto target     priority-union anti(rhs) - anti(lhs)
//!   empty target             insert rhs at the match point      mark the inserted nodes optional
//!   otherwise (narrow)       tombstone target, insert rhs       re-insert target as optional nodes
//! ```
//!
//! ## Key concepts
//!
//! - **Self-opaquing**: a feature change whose replacement does not unify with its own environment
//!   can destroy the context of the next match. Such rules, and every narrow rule, run simultaneously.
//! - **Reapplication**: analysis of a deletion runs up to `Options::deletion_reapplications` extra
//!   times; analysis of a self-opaquing rule runs until nothing changes, at most once per node.

use crate::api::Options;
use crate::engine::{
    ApplicationMode, Environment, FailureReason, PatternSubrule, PhonologicalPatternRule, Rule, TraceEvent, Tracer,
    snapshot,
};
use crate::error::{CompileError, MorphError};
use crate::feature::{FeatureStruct, VariableBindings};
use crate::pattern::{Direction, Match, Matcher, MatcherSettings, Pattern, PatternNode};
use crate::shape::{NodeFlags, NodeId, NodeKind, Shape, ShapeNode};
use crate::word::{MprFeatureSet, Word};
use std::collections::BTreeSet;

use super::output_action::{instantiate, untruncate};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RewriteSubrule {
    pub rhs: Pattern,
    pub left_env: Pattern,
    pub right_env: Pattern,
    pub required_syntactic_fs: FeatureStruct,
    pub required_mpr: MprFeatureSet,
    pub excluded_mpr: MprFeatureSet,
}

impl RewriteSubrule {
    pub fn new(rhs: Pattern, left_env: Pattern, right_env: Pattern) -> Self {
        Self { rhs, left_env, right_env, ..Default::default() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewriteRule {
    pub name: String,
    pub lhs: Pattern,
    pub subrules: Vec<RewriteSubrule>,
    pub mode: ApplicationMode,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RewriteKind {
    FeatureChange,
    Epenthesis,
    Narrow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reapply {
    Once,
    Deletion,
    SelfOpaquing,
}

fn segments(pattern: &Pattern) -> Vec<FeatureStruct> {
    pattern.constraints().filter(|c| c.kind == NodeKind::Segment).map(|c| c.fs.clone()).collect()
}

impl RewriteRule {
    pub fn new(name: impl Into<String>, lhs: Pattern, subrules: Vec<RewriteSubrule>) -> Self {
        Self {
            name: name.into(),
            lhs,
            subrules,
            mode: ApplicationMode::Iterative,
            direction: Direction::LeftToRight,
        }
    }

    fn kind(&self, subrule: &RewriteSubrule) -> RewriteKind {
        let lhs = segments(&self.lhs).len();
        if lhs == 0 {
            RewriteKind::Epenthesis
        } else if lhs == segments(&subrule.rhs).len() {
            RewriteKind::FeatureChange
        } else {
            RewriteKind::Narrow
        }
    }

    /// A feature change whose replacement clashes with a segment of its own environment.
    fn is_self_opaquing(&self, subrule: &RewriteSubrule) -> bool {
        if self.kind(subrule) != RewriteKind::FeatureChange {
            return false;
        }
        let env: Vec<FeatureStruct> =
            segments(&subrule.left_env).into_iter().chain(segments(&subrule.right_env)).collect();
        segments(&subrule.rhs).iter().any(|rhs| env.iter().any(|e| !rhs.is_unifiable(e)))
    }

    /// The declared mode, upgraded to simultaneous for narrow and self-opaquing subrules.
    pub(crate) fn effective_mode(&self) -> ApplicationMode {
        let forced = self
            .subrules
            .iter()
            .any(|s| self.kind(s) == RewriteKind::Narrow || self.is_self_opaquing(s));
        if forced { ApplicationMode::Simultaneous } else { self.mode }
    }

    fn reapply(&self, subrule: &RewriteSubrule) -> Reapply {
        let kind = self.kind(subrule);
        if kind == RewriteKind::Narrow && segments(&self.lhs).len() > segments(&subrule.rhs).len() {
            Reapply::Deletion
        } else if self.mode == ApplicationMode::Simultaneous
            && (kind == RewriteKind::Epenthesis || self.is_self_opaquing(subrule))
        {
            Reapply::SelfOpaquing
        } else {
            Reapply::Once
        }
    }

    pub(crate) fn compile_synthesis(&self, options: &Options) -> Result<RewriteSynthesis, CompileError> {
        if self.subrules.is_empty() {
            return Err(CompileError::Empty { rule: self.name.clone() });
        }
        let target = Matcher::new(&self.lhs, MatcherSettings { direction: self.direction, ..Default::default() });
        let subrules: Vec<Box<dyn PatternSubrule>> = self
            .subrules
            .iter()
            .map(|s| {
                Box::new(SynthesisSubrule {
                    rule: self.name.clone(),
                    kind: self.kind(s),
                    rhs: segments(&s.rhs),
                    env: Environment::new(&s.left_env, &s.right_env, MatcherSettings::default()),
                }) as Box<dyn PatternSubrule>
            })
            .collect();
        let mode = self.effective_mode();
        debug_log!("rewrite", "rule={} synthesis mode={:?}", self.name, mode);
        Ok(RewriteSynthesis {
            rule: self.clone(),
            pattern: PhonologicalPatternRule::new(target, subrules, mode).reject_dirty(true),
            trace_words: options.trace_words,
        })
    }

    pub(crate) fn compile_analysis(&self, options: &Options) -> Result<RewriteAnalysis, CompileError> {
        if self.subrules.is_empty() {
            return Err(CompileError::Empty { rule: self.name.clone() });
        }
        let settings =
            MatcherSettings { direction: self.direction.reverse(), nondeterministic: true, ..Default::default() };
        let lhs = segments(&self.lhs);
        let mode = self.effective_mode();
        let mut subrules = Vec::with_capacity(self.subrules.len());
        for s in &self.subrules {
            let kind = self.kind(s);
            let rhs = segments(&s.rhs);
            let (target, deltas) = match kind {
                RewriteKind::FeatureChange => {
                    let target = lhs
                        .iter()
                        .zip(&rhs)
                        .map(|(l, r)| {
                            let mut fs = l.clone();
                            fs.priority_union(r);
                            fs
                        })
                        .collect::<Vec<_>>();
                    let deltas = lhs
                        .iter()
                        .zip(&rhs)
                        .map(|(l, r)| {
                            let mut delta = r.anti();
                            delta.subtract(&l.anti());
                            delta
                        })
                        .collect();
                    (target, deltas)
                }
                RewriteKind::Epenthesis | RewriteKind::Narrow => (rhs, Vec::new()),
            };
            let nodes: Vec<PatternNode> = target.into_iter().map(PatternNode::segment).collect();
            let subrule = AnalysisSubrule {
                rule: self.name.clone(),
                kind,
                lhs: self.lhs.children.clone(),
                deltas,
                env: Environment::new(&s.left_env, &s.right_env, settings),
            };
            let pattern = PhonologicalPatternRule::new(
                Matcher::from_nodes(&nodes, settings),
                vec![Box::new(subrule) as Box<dyn PatternSubrule>],
                mode,
            );
            subrules.push((pattern, self.reapply(s)));
        }
        Ok(RewriteAnalysis {
            rule: self.clone(),
            subrules,
            deletion_reapplications: options.deletion_reapplications,
            trace_words: options.trace_words,
        })
    }
}

/// Insert `nodes` as a run right after `after`. Returns the new ids in order.
fn insert_run(shape: &mut Shape, after: NodeId, nodes: Vec<ShapeNode>) -> Vec<NodeId> {
    let mut after = after;
    let mut ids = Vec::with_capacity(nodes.len());
    for node in nodes {
        after = shape.insert_node_after(after, node);
        ids.push(after);
    }
    ids
}

// --- Synthesis -------------------------------------------------------------------

struct SynthesisSubrule {
    rule: String,
    kind: RewriteKind,
    rhs: Vec<FeatureStruct>,
    env: Environment,
}

impl SynthesisSubrule {
    fn replacement(&self, bindings: &VariableBindings) -> Result<Vec<ShapeNode>, MorphError> {
        let mut nodes = Vec::with_capacity(self.rhs.len());
        for fs in &self.rhs {
            let mut node = ShapeNode::new(NodeKind::Segment, instantiate(&self.rule, fs, bindings)?);
            node.flags.insert(NodeFlags::DIRTY);
            nodes.push(node);
        }
        Ok(nodes)
    }
}

impl PatternSubrule for SynthesisSubrule {
    fn matches(&self, word: &Word, target: &Match) -> Option<VariableBindings> {
        self.env.is_match(&word.shape, target)
    }

    fn apply(&self, word: &mut Word, target: &Match, bindings: &VariableBindings) -> Result<Vec<NodeId>, MorphError> {
        match self.kind {
            RewriteKind::FeatureChange => {
                for (&id, fs) in target.whole.nodes.iter().zip(&self.rhs) {
                    let fs = instantiate(&self.rule, fs, bindings)?;
                    let node = word.shape.node_mut(id);
                    node.fs.priority_union(&fs);
                    node.flags.insert(NodeFlags::DIRTY);
                }
                Ok(target.whole.nodes.clone())
            }
            RewriteKind::Epenthesis => {
                let nodes = self.replacement(bindings)?;
                Ok(insert_run(&mut word.shape, target.whole.left, nodes))
            }
            RewriteKind::Narrow => {
                let nodes = self.replacement(bindings)?;
                for &id in &target.whole.nodes {
                    word.shape.node_mut(id).flags.insert(NodeFlags::DELETED | NodeFlags::DIRTY);
                }
                Ok(insert_run(&mut word.shape, target.whole.left, nodes))
            }
        }
    }
}

pub(crate) struct RewriteSynthesis {
    rule: RewriteRule,
    pattern: PhonologicalPatternRule,
    trace_words: bool,
}

impl RewriteSynthesis {
    /// Subrules whose word-level gates pass.
    fn enabled(&self, input: &Word, trace: &mut dyn Tracer) -> Vec<usize> {
        let mut enabled = Vec::with_capacity(self.rule.subrules.len());
        for (i, subrule) in self.rule.subrules.iter().enumerate() {
            let reason = if !subrule.required_syntactic_fs.is_unifiable(&input.syntactic_fs) {
                Some(FailureReason::RequiredSyntacticFeatureStruct)
            } else if !input.mpr_features.is_match_required(&subrule.required_mpr) {
                Some(FailureReason::RequiredMprFeatures)
            } else if !input.mpr_features.is_match_excluded(&subrule.excluded_mpr) {
                Some(FailureReason::ExcludedMprFeatures)
            } else {
                None
            };
            match reason {
                None => enabled.push(i),
                Some(reason) if trace.is_tracing() => trace.record(TraceEvent::PhonologicalRuleNotApplied {
                    rule: self.rule.name.clone(),
                    subrule: i,
                    reason,
                    input: snapshot(input, self.trace_words),
                }),
                Some(_) => {}
            }
        }
        enabled
    }
}

impl Rule for RewriteSynthesis {
    fn name(&self) -> &str {
        &self.rule.name
    }

    fn apply(&self, input: &Word, trace: &mut dyn Tracer) -> Result<Vec<Word>, MorphError> {
        let enabled = self.enabled(input, trace);
        if enabled.is_empty() {
            return Ok(Vec::new());
        }
        let mut word = input.derive();
        word.reset_dirty();
        let applied = self.pattern.apply(&mut word, &enabled)?;
        if applied.is_empty() {
            return Ok(Vec::new());
        }
        word.reset_dirty();
        debug_log!("rewrite", "rule={} mode={:?} rewrites={}", self.rule.name, self.pattern.mode(), applied.len());

        if trace.is_tracing() {
            let distinct: BTreeSet<usize> = applied.into_iter().collect();
            for subrule in distinct {
                trace.record(TraceEvent::PhonologicalRuleApplied {
                    rule: self.rule.name.clone(),
                    subrule,
                    input: snapshot(input, self.trace_words),
                    output: snapshot(&word, self.trace_words),
                });
            }
        }
        Ok(vec![word])
    }
}

// --- Analysis --------------------------------------------------------------------

struct AnalysisSubrule {
    rule: String,
    kind: RewriteKind,
    lhs: Vec<PatternNode>,
    deltas: Vec<FeatureStruct>,
    env: Environment,
}

impl AnalysisSubrule {
    fn delta(&self, i: usize, bindings: &VariableBindings) -> FeatureStruct {
        let mut delta = self.deltas.get(i).cloned().unwrap_or_default();
        delta.replace_variables(bindings);
        delta.underspecify_variables();
        delta
    }
}

impl PatternSubrule for AnalysisSubrule {
    fn matches(&self, word: &Word, target: &Match) -> Option<VariableBindings> {
        let bindings = self.env.is_match(&word.shape, target)?;
        let shape = &word.shape;
        let accepted = match self.kind {
            // Undoing must change at least one node.
            RewriteKind::FeatureChange => target
                .whole
                .nodes
                .iter()
                .enumerate()
                .any(|(i, &id)| !shape.node(id).fs.is_unifiable(&self.delta(i, &bindings))),
            RewriteKind::Epenthesis => target.whole.nodes.iter().any(|&id| !shape.node(id).is_optional()),
            RewriteKind::Narrow => true,
        };
        accepted.then_some(bindings)
    }

    fn apply(&self, word: &mut Word, target: &Match, bindings: &VariableBindings) -> Result<Vec<NodeId>, MorphError> {
        let mut written = Vec::new();
        match self.kind {
            RewriteKind::FeatureChange => {
                for (i, &id) in target.whole.nodes.iter().enumerate() {
                    let delta = self.delta(i, bindings);
                    word.shape.node_mut(id).fs.priority_union(&delta);
                    written.push(id);
                }
            }
            RewriteKind::Epenthesis => {
                for &id in &target.whole.nodes {
                    word.shape.node_mut(id).flags.insert(NodeFlags::OPTIONAL);
                    written.push(id);
                }
            }
            RewriteKind::Narrow => {
                let mut nodes = Vec::new();
                untruncate(&self.lhs, bindings, true, &mut nodes);
                written.extend(insert_run(&mut word.shape, target.whole.left, nodes));
                for &id in &target.whole.nodes {
                    word.shape.node_mut(id).flags.insert(NodeFlags::OPTIONAL);
                    written.push(id);
                }
            }
        }
        debug_log!("rewrite", "rule={} unapplied {:?} over {} nodes", self.rule, self.kind, written.len());
        Ok(written)
    }
}

pub(crate) struct RewriteAnalysis {
    rule: RewriteRule,
    subrules: Vec<(PhonologicalPatternRule, Reapply)>,
    deletion_reapplications: usize,
    trace_words: bool,
}

impl Rule for RewriteAnalysis {
    fn name(&self) -> &str {
        &self.rule.name
    }

    fn apply(&self, input: &Word, trace: &mut dyn Tracer) -> Result<Vec<Word>, MorphError> {
        let mut word = input.derive();
        let mut unapplied = false;
        for (i, (pattern, reapply)) in self.subrules.iter().enumerate() {
            let before = if trace.is_tracing() { snapshot(&word, self.trace_words) } else { None };
            let limit = match reapply {
                Reapply::Once => 1,
                Reapply::Deletion => 1 + self.deletion_reapplications,
                Reapply::SelfOpaquing => word.shape.len() + 1,
            };
            let mut changed = false;
            for _ in 0..limit {
                if pattern.apply(&mut word, &[0])?.is_empty() {
                    break;
                }
                changed = true;
            }
            if !changed {
                continue;
            }
            unapplied = true;
            if trace.is_tracing() {
                trace.record(TraceEvent::PhonologicalRuleUnapplied {
                    rule: self.rule.name.clone(),
                    subrule: i,
                    input: before,
                    output: snapshot(&word, self.trace_words),
                });
            }
        }
        if !unapplied {
            if trace.is_tracing() {
                trace.record(TraceEvent::PhonologicalRuleNotUnapplied {
                    rule: self.rule.name.clone(),
                    reason: FailureReason::Pattern,
                    input: snapshot(input, self.trace_words),
                });
            }
            return Ok(Vec::new());
        }
        Ok(vec![word])
    }
}
