//! Metathesis: two named groups of a pattern trade places.
//!
//! ```text
//!   pattern   (L: [+cons]) (R: [+voc])
//!
//!   synthesis   k a t  ──relocate nodes──►  a k t     morph spans re-sorted
//!   analysis    a k t  ──swap features────►  k a t     node order untouched
//! ```
//!
//! Synthesis moves the nodes themselves, so every node keeps its features and morph while the surface
//! order changes. Analysis only needs to recognize the underlying form and swaps features in place,
//! falling back to relocation when the groups differ in length.

use crate::api::Options;
use crate::engine::{
    ApplicationMode, FailureReason, PatternSubrule, PhonologicalPatternRule, Rule, TraceEvent, Tracer, snapshot,
};
use crate::error::{CompileError, MorphError};
use crate::feature::VariableBindings;
use crate::pattern::{Direction, GroupId, Match, Matcher, MatcherSettings, Pattern, PatternNode};
use crate::shape::{NodeFlags, NodeId, Shape};
use crate::word::Word;

#[derive(Debug, Clone, PartialEq)]
pub struct MetathesisRule {
    pub name: String,
    pub pattern: Pattern,
    pub left_group: String,
    pub right_group: String,
    pub direction: Direction,
}

impl MetathesisRule {
    pub fn new(
        name: impl Into<String>,
        pattern: Pattern,
        left_group: impl Into<String>,
        right_group: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            pattern,
            left_group: left_group.into(),
            right_group: right_group.into(),
            direction: Direction::LeftToRight,
        }
    }

    /// Both groups must appear exactly once among the pattern's top-level nodes.
    fn validate(&self) -> Result<(), CompileError> {
        if self.left_group == self.right_group {
            return Err(CompileError::DuplicateGroup { rule: self.name.clone(), group: self.left_group.clone() });
        }
        for group in [&self.left_group, &self.right_group] {
            let count = self
                .pattern
                .children
                .iter()
                .filter(|n| matches!(n, PatternNode::Group { name, .. } if name == group))
                .count();
            match count {
                0 => return Err(CompileError::MissingGroup { rule: self.name.clone(), group: group.clone() }),
                1 => {}
                _ => return Err(CompileError::DuplicateGroup { rule: self.name.clone(), group: group.clone() }),
            }
        }
        Ok(())
    }

    /// The pattern with the two groups exchanged, as the surface shows them after synthesis.
    fn swapped_pattern(&self) -> Pattern {
        let position = |group: &str| {
            self.pattern.children.iter().position(|n| matches!(n, PatternNode::Group { name, .. } if name == group))
        };
        let mut swapped = self.pattern.clone();
        if let (Some(l), Some(r)) = (position(&self.left_group), position(&self.right_group)) {
            swapped.children.swap(l, r);
        }
        swapped
    }

    pub(crate) fn compile_synthesis(&self, options: &Options) -> Result<MetathesisSynthesis, CompileError> {
        self.validate()?;
        let matcher = Matcher::new(&self.pattern, MatcherSettings { direction: self.direction, ..Default::default() });
        let subrule = Swap {
            left: matcher.group(&self.left_group),
            right: matcher.group(&self.right_group),
            relocate: true,
        };
        Ok(MetathesisSynthesis {
            rule: self.clone(),
            pattern: PhonologicalPatternRule::new(matcher, vec![Box::new(subrule)], ApplicationMode::Iterative)
                .reject_dirty(true),
            trace_words: options.trace_words,
        })
    }

    pub(crate) fn compile_analysis(&self, options: &Options) -> Result<MetathesisAnalysis, CompileError> {
        self.validate()?;
        let settings =
            MatcherSettings { direction: self.direction.reverse(), nondeterministic: true, ..Default::default() };
        let matcher = Matcher::new(&self.swapped_pattern(), settings);
        let subrule = Swap {
            left: matcher.group(&self.left_group),
            right: matcher.group(&self.right_group),
            relocate: false,
        };
        Ok(MetathesisAnalysis {
            rule: self.clone(),
            pattern: PhonologicalPatternRule::new(matcher, vec![Box::new(subrule)], ApplicationMode::Iterative),
            trace_words: options.trace_words,
        })
    }
}

/// Exchange the two runs `first` and `second`, where `first` precedes `second`. Whatever lies between
/// them, boundaries and tombstones included, stays in the middle.
fn relocate(shape: &mut Shape, first: &[NodeId], second: &[NodeId]) {
    let (Some(&head), Some(&first_last), Some(&second_first)) = (first.first(), first.last(), second.first()) else {
        return;
    };
    let Some(before) = shape.prev(head) else {
        return;
    };
    let mut middle = Vec::new();
    let mut cur = shape.next(first_last);
    while let Some(id) = cur.filter(|&id| id != second_first && !shape.is_anchor(id)) {
        middle.push(id);
        cur = shape.next(id);
    }
    let mut after = before;
    for &id in second.iter().chain(&middle).chain(first) {
        shape.move_after(id, after);
        after = id;
    }
}

struct Swap {
    left: Option<GroupId>,
    right: Option<GroupId>,
    relocate: bool,
}

impl Swap {
    /// The two captured runs in surface order.
    fn runs(&self, shape: &Shape, target: &Match) -> (Vec<NodeId>, Vec<NodeId>) {
        let nodes = |group: Option<GroupId>| {
            group.and_then(|g| target.capture(g)).map(|c| c.nodes.clone()).unwrap_or_default()
        };
        let (a, b) = (nodes(self.left), nodes(self.right));
        let pos = shape.positions();
        let start = |run: &[NodeId]| run.first().and_then(|id| pos.get(id).copied()).unwrap_or(usize::MAX);
        if start(&a) <= start(&b) { (a, b) } else { (b, a) }
    }
}

impl PatternSubrule for Swap {
    fn matches(&self, _word: &Word, target: &Match) -> Option<VariableBindings> {
        Some(target.bindings.clone())
    }

    fn apply(&self, word: &mut Word, target: &Match, _bindings: &VariableBindings) -> Result<Vec<NodeId>, MorphError> {
        let (first, second) = self.runs(&word.shape, target);
        if self.relocate || first.len() != second.len() {
            relocate(&mut word.shape, &first, &second);
            word.shape.reorder_morphs();
        } else {
            for (&a, &b) in first.iter().zip(&second) {
                let fs_a = word.shape.node(a).fs.clone();
                let fs_b = std::mem::replace(&mut word.shape.node_mut(b).fs, fs_a);
                word.shape.node_mut(a).fs = fs_b;
            }
        }
        for &id in first.iter().chain(&second) {
            word.shape.node_mut(id).flags.insert(NodeFlags::DIRTY);
        }
        Ok(target.whole.nodes.clone())
    }
}

pub(crate) struct MetathesisSynthesis {
    rule: MetathesisRule,
    pattern: PhonologicalPatternRule,
    trace_words: bool,
}

impl Rule for MetathesisSynthesis {
    fn name(&self) -> &str {
        &self.rule.name
    }

    fn apply(&self, input: &Word, trace: &mut dyn Tracer) -> Result<Vec<Word>, MorphError> {
        let mut word = input.derive();
        word.reset_dirty();
        if self.pattern.apply(&mut word, &[0])?.is_empty() {
            return Ok(Vec::new());
        }
        word.reset_dirty();
        debug_log!("metathesis", "rule={} applied", self.rule.name);
        if trace.is_tracing() {
            trace.record(TraceEvent::PhonologicalRuleApplied {
                rule: self.rule.name.clone(),
                subrule: 0,
                input: snapshot(input, self.trace_words),
                output: snapshot(&word, self.trace_words),
            });
        }
        Ok(vec![word])
    }
}

pub(crate) struct MetathesisAnalysis {
    rule: MetathesisRule,
    pattern: PhonologicalPatternRule,
    trace_words: bool,
}

impl Rule for MetathesisAnalysis {
    fn name(&self) -> &str {
        &self.rule.name
    }

    fn apply(&self, input: &Word, trace: &mut dyn Tracer) -> Result<Vec<Word>, MorphError> {
        let mut word = input.derive();
        if self.pattern.apply(&mut word, &[0])?.is_empty() {
            if trace.is_tracing() {
                trace.record(TraceEvent::PhonologicalRuleNotUnapplied {
                    rule: self.rule.name.clone(),
                    reason: FailureReason::Pattern,
                    input: snapshot(input, self.trace_words),
                });
            }
            return Ok(Vec::new());
        }
        word.reset_dirty();
        if trace.is_tracing() {
            trace.record(TraceEvent::PhonologicalRuleUnapplied {
                rule: self.rule.name.clone(),
                subrule: 0,
                input: snapshot(input, self.trace_words),
                output: snapshot(&word, self.trace_words),
            });
        }
        Ok(vec![word])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::phonology;

    #[test]
    fn groups_must_exist_once() {
        let ph = phonology();
        let pattern = Pattern::new(vec![
            PatternNode::group("L", vec![ph.seg("+cons")]),
            PatternNode::group("R", vec![ph.seg("+voc")]),
        ]);
        let missing = MetathesisRule::new("m", pattern.clone(), "L", "X");
        assert_eq!(
            missing.compile_synthesis(&Options::default()).err(),
            Some(CompileError::MissingGroup { rule: "m".into(), group: "X".into() })
        );
        let same = MetathesisRule::new("m", pattern, "L", "L");
        assert!(matches!(same.compile_analysis(&Options::default()), Err(CompileError::DuplicateGroup { .. })));
    }

    #[test]
    fn relocation_keeps_the_middle_in_place() {
        let ph = phonology();
        let mut shape = ph.shape("kmat");
        let ids: Vec<NodeId> = shape.live().collect();
        relocate(&mut shape, &ids[0..1], &ids[2..3]);
        assert_eq!(ph.render(&shape), "amkt");
    }

    #[test]
    fn unequal_groups_fall_back_to_relocation_in_analysis() {
        let ph = phonology();
        let pattern = Pattern::new(vec![
            PatternNode::group("L", vec![ph.seg("+cons")]),
            PatternNode::group("R", vec![ph.seg("+voc"), ph.seg("+voc")]),
        ]);
        let rule = MetathesisRule::new("m", pattern, "L", "R");
        let analysis = rule.compile_analysis(&Options::default()).unwrap();
        let out = analysis.apply(&ph.word("aik"), &mut crate::engine::NoTrace).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(ph.render(&out[0].shape), "kai");
    }
}
