//! Pattern trees and the backtracking matcher.
//!
//! A [`Pattern`] is a tree of constraints, named groups, quantifiers, alternations and margin anchors. A
//! [`Matcher`] compiles it once into a flat instruction list and then runs a depth-first search over the
//! *visible* nodes of a shape (the nodes admitted by the filter, never tombstones).
//!
//! ```text
//! pattern:   Group("stem", [C, V])  Quantifier(0..1, C)
//! program:   Open(0) Node(C) Node(V) Close(0) Repeat{0,1,[Node(C)]}
//!
//! visible:   b  a  t          gaps: 0 b 1 a 2 t 3
//! match:     ^^^^  ^          stem = gap 0..2, whole = gap 0..3
//! ```
//!
//! ## Key concepts
//!
//! - **Gaps**: positions between visible nodes, `0..=len`, always counted left to right. Matches and
//!   captures are reported as node ids so they stay valid after the shape is edited.
//! - **Direction**: a right-to-left matcher runs the reversed program over the reversed node list. Group
//!   ids are assigned in left-to-right order either way.
//! - **Non-determinism**: in non-deterministic mode every acceptable match at the first matching
//!   position is returned, and optional nodes may be skipped.
//! - **Acceptance**: callers pass a predicate evaluated on each complete match; a rejected match lets the
//!   search backtrack into further alternatives.
//!
//! ## Invariants
//!
//! - `GroupId`s are indices into `Matcher::groups`, fixed at compile time.
//! - Quantifier bodies must consume at least one node per iteration; zero-width iterations are not
//!   repeated.

use crate::feature::{FeatureStruct, VariableBindings};
use crate::shape::{NodeId, NodeKind, NodeKinds, Shape, ShapeNode};

// --- Pattern trees -------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    LeftToRight,
    RightToLeft,
}

impl Direction {
    pub fn reverse(self) -> Direction {
        match self {
            Direction::LeftToRight => Direction::RightToLeft,
            Direction::RightToLeft => Direction::LeftToRight,
        }
    }
}

/// Word margin asserted by [`PatternNode::Anchor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Margin {
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub kind: NodeKind,
    pub fs: FeatureStruct,
}

impl Constraint {
    pub fn segment(fs: FeatureStruct) -> Self {
        Self { kind: NodeKind::Segment, fs }
    }

    pub fn boundary(fs: FeatureStruct) -> Self {
        Self { kind: NodeKind::Boundary, fs }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatternNode {
    Constraint(Constraint),
    Group { name: String, children: Vec<PatternNode> },
    Quantifier { min: usize, max: Option<usize>, child: Box<PatternNode> },
    Alternation(Vec<PatternNode>),
    Anchor(Margin),
}

impl PatternNode {
    pub fn segment(fs: FeatureStruct) -> Self {
        PatternNode::Constraint(Constraint::segment(fs))
    }

    pub fn group(name: impl Into<String>, children: Vec<PatternNode>) -> Self {
        PatternNode::Group { name: name.into(), children }
    }

    pub fn repeat(child: PatternNode, min: usize, max: Option<usize>) -> Self {
        PatternNode::Quantifier { min, max, child: Box::new(child) }
    }

    pub fn optional(child: PatternNode) -> Self {
        Self::repeat(child, 0, Some(1))
    }

    pub fn for_each_constraint_mut(&mut self, f: &mut dyn FnMut(&mut Constraint)) {
        match self {
            PatternNode::Constraint(c) => f(c),
            PatternNode::Group { children, .. } => children.iter_mut().for_each(|c| c.for_each_constraint_mut(f)),
            PatternNode::Quantifier { child, .. } => child.for_each_constraint_mut(f),
            PatternNode::Alternation(branches) => branches.iter_mut().for_each(|b| b.for_each_constraint_mut(f)),
            PatternNode::Anchor(_) => {}
        }
    }

    /// Deep clone that drops boundary constraints. Returns `None` when nothing but boundaries remained.
    pub fn clone_except_boundaries(&self) -> Option<PatternNode> {
        match self {
            PatternNode::Constraint(c) if c.kind == NodeKind::Boundary => None,
            PatternNode::Group { name, children } => {
                Some(PatternNode::Group { name: name.clone(), children: clone_except_boundaries(children) })
            }
            PatternNode::Quantifier { min, max, child } => child
                .clone_except_boundaries()
                .map(|child| PatternNode::Quantifier { min: *min, max: *max, child: Box::new(child) }),
            PatternNode::Alternation(branches) => {
                let branches: Vec<_> = branches.iter().filter_map(PatternNode::clone_except_boundaries).collect();
                (!branches.is_empty()).then_some(PatternNode::Alternation(branches))
            }
            other => Some(other.clone()),
        }
    }
}

pub fn clone_except_boundaries(nodes: &[PatternNode]) -> Vec<PatternNode> {
    nodes.iter().filter_map(PatternNode::clone_except_boundaries).collect()
}

/// A named sequence of pattern nodes. Named patterns serve as the left-hand-side parts of morphological
/// rules.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pattern {
    pub name: String,
    pub children: Vec<PatternNode>,
}

impl Pattern {
    pub fn new(children: Vec<PatternNode>) -> Self {
        Self { name: String::new(), children }
    }

    pub fn named(name: impl Into<String>, children: Vec<PatternNode>) -> Self {
        Self { name: name.into(), children }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Top-level constraints, in order. Rewrite targets and replacements are flat constraint lists.
    pub fn constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.children.iter().filter_map(|n| match n {
            PatternNode::Constraint(c) => Some(c),
            _ => None,
        })
    }

    pub fn for_each_constraint_mut(&mut self, f: &mut dyn FnMut(&mut Constraint)) {
        self.children.iter_mut().for_each(|c| c.for_each_constraint_mut(f));
    }
}

// --- Matcher -------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMethod {
    #[default]
    Unification,
    Subsumption,
}

#[derive(Debug, Clone, Copy)]
pub struct MatcherSettings {
    pub direction: Direction,
    pub anchored_to_start: bool,
    pub anchored_to_end: bool,
    pub filter: NodeKinds,
    pub nondeterministic: bool,
    pub method: MatchMethod,
}

impl Default for MatcherSettings {
    fn default() -> Self {
        Self {
            direction: Direction::LeftToRight,
            anchored_to_start: false,
            anchored_to_end: false,
            filter: NodeKinds::SEGMENT,
            nondeterministic: false,
            method: MatchMethod::Unification,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(usize);

/// A matched stretch of visible nodes plus its visible neighbours (anchors at the margins).
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub nodes: Vec<NodeId>,
    pub left: NodeId,
    pub right: NodeId,
}

impl Capture {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Match {
    pub whole: Capture,
    pub bindings: VariableBindings,
    captures: Vec<Option<Capture>>,
    pub(crate) start_gap: usize,
    pub(crate) end_gap: usize,
}

impl Match {
    /// Capture for `group`, or `None` if the group did not take part in the match.
    pub fn capture(&self, group: GroupId) -> Option<&Capture> {
        self.captures.get(group.0).and_then(Option::as_ref)
    }
}

#[derive(Debug, Clone)]
enum Instr {
    Node(Constraint),
    Open(usize),
    Close(usize),
    Anchor(Margin),
    Alt(Vec<Vec<Instr>>),
    Repeat { min: usize, max: Option<usize>, body: Vec<Instr> },
}

fn compile(nodes: &[PatternNode], groups: &mut Vec<String>, out: &mut Vec<Instr>) {
    for node in nodes {
        match node {
            PatternNode::Constraint(c) => out.push(Instr::Node(c.clone())),
            PatternNode::Group { name, children } => {
                let g = groups.len();
                groups.push(name.clone());
                out.push(Instr::Open(g));
                compile(children, groups, out);
                out.push(Instr::Close(g));
            }
            PatternNode::Quantifier { min, max, child } => {
                let mut body = Vec::new();
                compile(std::slice::from_ref(child.as_ref()), groups, &mut body);
                out.push(Instr::Repeat { min: *min, max: *max, body });
            }
            PatternNode::Alternation(branches) => {
                let branches = branches
                    .iter()
                    .map(|b| {
                        let mut body = Vec::new();
                        compile(std::slice::from_ref(b), groups, &mut body);
                        body
                    })
                    .collect();
                out.push(Instr::Alt(branches));
            }
            PatternNode::Anchor(m) => out.push(Instr::Anchor(*m)),
        }
    }
}

fn reverse(program: Vec<Instr>) -> Vec<Instr> {
    program
        .into_iter()
        .rev()
        .map(|instr| match instr {
            Instr::Open(g) => Instr::Close(g),
            Instr::Close(g) => Instr::Open(g),
            Instr::Alt(branches) => Instr::Alt(branches.into_iter().map(reverse).collect()),
            Instr::Repeat { min, max, body } => Instr::Repeat { min, max, body: reverse(body) },
            other => other,
        })
        .collect()
}

#[derive(Debug, Clone)]
struct State {
    open: Vec<Option<usize>>,
    spans: Vec<Option<(usize, usize)>>,
    bindings: VariableBindings,
}

/// A compiled pattern plus its settings.
#[derive(Debug, Clone)]
pub struct Matcher {
    program: Vec<Instr>,
    groups: Vec<String>,
    settings: MatcherSettings,
}

impl Matcher {
    pub fn new(pattern: &Pattern, settings: MatcherSettings) -> Self {
        Self::from_nodes(&pattern.children, settings)
    }

    pub fn from_nodes(nodes: &[PatternNode], settings: MatcherSettings) -> Self {
        let mut groups = Vec::new();
        let mut program = Vec::new();
        compile(nodes, &mut groups, &mut program);
        if settings.direction == Direction::RightToLeft {
            program = reverse(program);
        }
        Self { program, groups, settings }
    }

    pub fn settings(&self) -> &MatcherSettings {
        &self.settings
    }

    pub fn is_empty(&self) -> bool {
        self.program.is_empty()
    }

    /// First group with this name, in left-to-right order.
    pub fn group(&self, name: &str) -> Option<GroupId> {
        self.groups.iter().position(|g| g == name).map(GroupId)
    }

    /// Every group with this name, in left-to-right order.
    pub fn groups_named(&self, name: &str) -> Vec<GroupId> {
        self.groups.iter().enumerate().filter(|(_, g)| *g == name).map(|(i, _)| GroupId(i)).collect()
    }

    pub fn group_name(&self, group: GroupId) -> &str {
        &self.groups[group.0]
    }

    /// Nodes this matcher can see, left to right.
    pub fn visible(&self, shape: &Shape) -> Vec<NodeId> {
        shape
            .iter()
            .filter(|&id| {
                let node = shape.node(id);
                !node.is_deleted() && self.settings.filter.admits(node.kind)
            })
            .collect()
    }

    /// Matches over the whole shape, scanning from the start of the matcher's direction.
    pub fn find(&self, shape: &Shape, accept: &mut dyn FnMut(&Match) -> bool) -> Vec<Match> {
        let gap = match self.settings.direction {
            Direction::LeftToRight => 0,
            Direction::RightToLeft => self.visible(shape).len(),
        };
        self.find_from(shape, gap, &VariableBindings::default(), accept)
    }

    /// Scan from `gap` in the matcher's direction and return the matches found at the first position that
    /// yields any. Deterministic matchers return at most one match.
    pub fn find_from(
        &self,
        shape: &Shape,
        gap: usize,
        bindings: &VariableBindings,
        accept: &mut dyn FnMut(&Match) -> bool,
    ) -> Vec<Match> {
        let seq = self.visible(shape);
        let len = seq.len();
        let gaps: Box<dyn Iterator<Item = usize>> = match self.settings.direction {
            Direction::LeftToRight if self.settings.anchored_to_start => Box::new((gap == 0).then_some(0).into_iter()),
            Direction::LeftToRight => Box::new(gap.min(len + 1)..=len),
            Direction::RightToLeft if self.settings.anchored_to_end => {
                Box::new((gap == len).then_some(len).into_iter())
            }
            Direction::RightToLeft => Box::new((0..=gap.min(len)).rev()),
        };
        for g in gaps {
            let found = self.match_at_seq(shape, &seq, g, bindings, accept);
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    /// Matches that start exactly at `gap` (the right edge of the match for right-to-left matchers).
    pub fn match_at(
        &self,
        shape: &Shape,
        gap: usize,
        bindings: &VariableBindings,
        accept: &mut dyn FnMut(&Match) -> bool,
    ) -> Vec<Match> {
        let seq = self.visible(shape);
        if gap > seq.len() {
            return Vec::new();
        }
        self.match_at_seq(shape, &seq, gap, bindings, accept)
    }

    fn match_at_seq(
        &self,
        shape: &Shape,
        seq: &[NodeId],
        gap: usize,
        bindings: &VariableBindings,
        accept: &mut dyn FnMut(&Match) -> bool,
    ) -> Vec<Match> {
        let rtl = self.settings.direction == Direction::RightToLeft;
        let oriented: Vec<NodeId> = if rtl { seq.iter().rev().copied().collect() } else { seq.to_vec() };
        let run = Run { matcher: self, shape, seq: &oriented, rtl };
        let len = seq.len();
        let start = if rtl { len - gap } else { gap };
        let state = State {
            open: vec![None; self.groups.len()],
            spans: vec![None; self.groups.len()],
            bindings: bindings.clone(),
        };

        let mut out = Vec::new();
        let nondeterministic = self.settings.nondeterministic;
        run.run(&self.program, start, state, &mut |end, st| {
            let (s, e) = run.ltr_span(start.min(end), start.max(end));
            if self.settings.anchored_to_start && !run.skippable(0, s) {
                return false;
            }
            if self.settings.anchored_to_end && !run.skippable(e, len) {
                return false;
            }
            let captures = st.spans.iter().map(|span| span.map(|(a, b)| run.capture(seq, a, b))).collect();
            let m = Match {
                whole: run.capture(seq, start.min(end), start.max(end)),
                bindings: st.bindings,
                captures,
                start_gap: s,
                end_gap: e,
            };
            if accept(&m) {
                out.push(m);
                !nondeterministic
            } else {
                false
            }
        });
        out
    }
}

struct Run<'a> {
    matcher: &'a Matcher,
    shape: &'a Shape,
    /// Visible nodes in matching order.
    seq: &'a [NodeId],
    rtl: bool,
}

impl Run<'_> {
    /// Convert an oriented span into left-to-right gaps.
    fn ltr_span(&self, a: usize, b: usize) -> (usize, usize) {
        let len = self.seq.len();
        if self.rtl { (len - b, len - a) } else { (a, b) }
    }

    fn capture(&self, seq: &[NodeId], a: usize, b: usize) -> Capture {
        let (s, e) = self.ltr_span(a, b);
        Capture {
            nodes: seq[s..e].to_vec(),
            left: if s == 0 { self.shape.begin() } else { seq[s - 1] },
            right: seq.get(e).copied().unwrap_or_else(|| self.shape.end()),
        }
    }

    /// True when the left-to-right gap range `s..e` holds nothing the match would have to consume.
    fn skippable(&self, s: usize, e: usize) -> bool {
        if s >= e {
            return true;
        }
        let (a, b) = if self.rtl { (self.seq.len() - e, self.seq.len() - s) } else { (s, e) };
        self.matcher.settings.nondeterministic && self.seq[a..b].iter().all(|&id| self.shape.node(id).is_optional())
    }

    fn node(&self, pos: usize) -> Option<&ShapeNode> {
        self.seq.get(pos).map(|&id| self.shape.node(id))
    }

    fn accept(&self, c: &Constraint, node: &ShapeNode, bindings: &VariableBindings) -> Option<VariableBindings> {
        if node.kind != c.kind {
            return None;
        }
        let mut b = bindings.clone();
        let ok = match self.matcher.settings.method {
            MatchMethod::Unification => c.fs.unify_with(&node.fs, &mut b).is_some(),
            MatchMethod::Subsumption => c.fs.subsumes_with(&node.fs, &mut b),
        };
        ok.then_some(b)
    }

    /// Depth-first search. `k` is the continuation; returning `true` from it stops the search.
    fn run(&self, program: &[Instr], pos: usize, st: State, k: &mut dyn FnMut(usize, State) -> bool) -> bool {
        let Some((first, rest)) = program.split_first() else {
            return k(pos, st);
        };
        match first {
            Instr::Node(c) => {
                let Some(node) = self.node(pos) else {
                    return false;
                };
                if let Some(bindings) = self.accept(c, node, &st.bindings) {
                    let next = State { bindings, ..st.clone() };
                    if self.run(rest, pos + 1, next, k) {
                        return true;
                    }
                }
                if self.matcher.settings.nondeterministic && node.is_optional() {
                    return self.run(program, pos + 1, st, k);
                }
                false
            }
            Instr::Open(g) => {
                let mut st = st;
                st.open[*g] = Some(pos);
                self.run(rest, pos, st, k)
            }
            Instr::Close(g) => {
                let mut st = st;
                if let Some(start) = st.open[*g] {
                    st.spans[*g] = Some((start, pos));
                }
                self.run(rest, pos, st, k)
            }
            Instr::Anchor(margin) => {
                let len = self.seq.len();
                let gap = if self.rtl { len - pos } else { pos };
                let at = match margin {
                    Margin::Start => self.skippable(0, gap),
                    Margin::End => self.skippable(gap, len),
                };
                at && self.run(rest, pos, st, k)
            }
            Instr::Alt(branches) => {
                for branch in branches {
                    if self.run(branch, pos, st.clone(), &mut |p, s| self.run(rest, p, s, k)) {
                        return true;
                    }
                }
                false
            }
            Instr::Repeat { min, max, body } => {
                self.repeat(body, *min, *max, 0, pos, st, &mut |p, s| self.run(rest, p, s, k))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn repeat(
        &self,
        body: &[Instr],
        min: usize,
        max: Option<usize>,
        count: usize,
        pos: usize,
        st: State,
        k: &mut dyn FnMut(usize, State) -> bool,
    ) -> bool {
        if max.is_none_or(|m| count < m) {
            let more =
                self.run(body, pos, st.clone(), &mut |p, s| p > pos && self.repeat(body, min, max, count + 1, p, s, k));
            if more {
                return true;
            }
        }
        count >= min && k(pos, st)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::NodeFlags;
    use crate::test_support::phonology;

    fn accept_all(_: &Match) -> bool {
        true
    }

    #[test]
    fn groups_capture_spans_and_neighbours() {
        let ph = phonology();
        let shape = ph.shape("bat");
        let pattern = Pattern::new(vec![
            PatternNode::group("onset", vec![ph.seg("+cons")]),
            PatternNode::group("nucleus", vec![ph.seg("+voc")]),
        ]);
        let matcher = Matcher::new(&pattern, MatcherSettings::default());
        let found = matcher.find(&shape, &mut accept_all);
        assert_eq!(found.len(), 1);
        let ids: Vec<_> = shape.iter().collect();
        let onset = found[0].capture(matcher.group("onset").unwrap()).unwrap();
        assert_eq!(onset.nodes, vec![ids[0]]);
        assert_eq!(onset.left, shape.begin());
        assert_eq!(onset.right, ids[1]);
        assert_eq!(found[0].whole.nodes, vec![ids[0], ids[1]]);
    }

    #[test]
    fn right_to_left_scan_finds_the_rightmost_match() {
        let ph = phonology();
        let shape = ph.shape("tapak");
        let settings = MatcherSettings { direction: Direction::RightToLeft, ..Default::default() };
        let matcher = Matcher::new(&Pattern::new(vec![ph.seg("+voc"), ph.seg("+cons")]), settings);
        let found = matcher.find(&shape, &mut accept_all);
        let ids: Vec<_> = shape.iter().collect();
        assert_eq!(found[0].whole.nodes, vec![ids[3], ids[4]]);
        assert_eq!((found[0].start_gap, found[0].end_gap), (3, 5));
    }

    #[test]
    fn quantifiers_are_greedy_and_anchoring_is_enforced() {
        let ph = phonology();
        let shape = ph.shape("strak");
        let settings = MatcherSettings { anchored_to_start: true, ..Default::default() };
        let pattern = Pattern::new(vec![PatternNode::group(
            "cluster",
            vec![PatternNode::repeat(ph.seg("+cons"), 1, None)],
        )]);
        let matcher = Matcher::new(&pattern, settings);
        let found = matcher.find(&shape, &mut accept_all);
        assert_eq!(found[0].capture(matcher.group("cluster").unwrap()).unwrap().nodes.len(), 3);

        let anchored = MatcherSettings { anchored_to_start: true, anchored_to_end: true, ..Default::default() };
        assert!(Matcher::new(&pattern, anchored).find(&shape, &mut accept_all).is_empty());
    }

    #[test]
    fn variables_enforce_agreement_across_nodes() {
        let ph = phonology();
        let pattern = Pattern::new(vec![ph.seg("-son αvoice"), ph.seg("-son αvoice")]);
        let matcher = Matcher::new(&pattern, MatcherSettings::default());
        assert_eq!(matcher.find(&ph.shape("sd"), &mut accept_all).len(), 0);
        let found = matcher.find(&ph.shape("zd"), &mut accept_all);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].bindings.get("α"), Some(ph.sys.value("voice", &["+"]).unwrap()));
    }

    #[test]
    fn alternation_and_margins() {
        let ph = phonology();
        let pattern = Pattern::new(vec![
            PatternNode::Alternation(vec![ph.seg("place=lab"), ph.seg("place=dor")]),
            PatternNode::Anchor(Margin::End),
        ]);
        let matcher = Matcher::new(&pattern, MatcherSettings::default());
        let found = matcher.find(&ph.shape("kap"), &mut accept_all);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].start_gap, 2);
        assert!(matcher.find(&ph.shape("kat"), &mut accept_all).is_empty());
    }

    #[test]
    fn nondeterministic_matching_returns_every_alternative_and_skips_optional_nodes() {
        let ph = phonology();
        let settings = MatcherSettings {
            anchored_to_start: true,
            anchored_to_end: true,
            nondeterministic: true,
            ..Default::default()
        };
        let pattern = Pattern::new(vec![
            PatternNode::group("a", vec![PatternNode::repeat(ph.seg("+cons"), 0, None)]),
            PatternNode::group("b", vec![PatternNode::repeat(ph.seg("+cons"), 0, None)]),
        ]);
        let matcher = Matcher::new(&pattern, settings);
        assert_eq!(matcher.find(&ph.shape("tk"), &mut accept_all).len(), 3);

        let mut shape = ph.shape("tak");
        let a = shape.iter().nth(1).unwrap();
        shape.node_mut(a).flags.insert(NodeFlags::OPTIONAL);
        assert!(!matcher.find(&shape, &mut accept_all).is_empty());
    }

    #[test]
    fn rejected_matches_let_the_search_continue() {
        let ph = phonology();
        let shape = ph.shape("tata");
        let matcher = Matcher::new(&Pattern::new(vec![ph.seg("+cons")]), MatcherSettings::default());
        let second = shape.iter().nth(2).unwrap();
        let found = matcher.find(&shape, &mut |m: &Match| m.whole.nodes[0] == second);
        assert_eq!(found[0].whole.nodes, vec![second]);
    }

    #[test]
    fn boundaries_are_dropped_from_cloned_parts() {
        let ph = phonology();
        let part = vec![ph.seg("+cons"), PatternNode::Constraint(Constraint::boundary(FeatureStruct::new()))];
        assert_eq!(clone_except_boundaries(&part), vec![ph.seg("+cons")]);
    }
}
