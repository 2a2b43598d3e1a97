//! Morphological output actions and their inverses.
//!
//! An affix-process allomorph pairs a list of named left-hand-side parts with a list of output actions.
//! Synthesis runs the actions in order to rebuild the shape from a match; analysis turns each action into
//! a fragment of the pattern that recognizes its output.
//!
//! ```text
//!   action              synthesis                        analysis pattern
//!   CopyFromInput(p)    copy the nodes captured by p     Group(p, p's constraints)
//!   ModifyFromInput(p)  copy p, priority-union fs        Group(p, p's constraints ⊕ fs)
//!   InsertShape(s)      append the segments of s         one constraint per segment of s
//!   InsertShapeNode(f)  append one segment, variables    Constraint(f)
//!                       bound from the match
//! ```

use crate::error::MorphError;
use crate::feature::{FeatureStruct, VariableBindings};
use crate::pattern::{Constraint, Match, Matcher, Pattern, PatternNode, clone_except_boundaries};
use crate::shape::{NodeFlags, NodeId, NodeKind, Shape, ShapeNode};

#[derive(Debug, Clone, PartialEq)]
pub enum OutputAction {
    CopyFromInput { part: String },
    ModifyFromInput { part: String, fs: FeatureStruct },
    InsertShape(Shape),
    InsertShapeNode(FeatureStruct),
}

impl OutputAction {
    pub fn copy(part: impl Into<String>) -> Self {
        OutputAction::CopyFromInput { part: part.into() }
    }

    pub fn modify(part: impl Into<String>, fs: FeatureStruct) -> Self {
        OutputAction::ModifyFromInput { part: part.into(), fs }
    }

    /// The left-hand-side part this action reads, if any.
    pub fn part(&self) -> Option<&str> {
        match self {
            OutputAction::CopyFromInput { part } | OutputAction::ModifyFromInput { part, .. } => Some(part),
            OutputAction::InsertShape(_) | OutputAction::InsertShapeNode(_) => None,
        }
    }

    /// Append this action's output to `output`. Returns `(input node, output node)` pairs; inserted
    /// material has no input node.
    pub(crate) fn apply(
        &self,
        rule: &str,
        matcher: &Matcher,
        m: &Match,
        input: &Shape,
        output: &mut Shape,
    ) -> Result<Vec<(Option<NodeId>, NodeId)>, MorphError> {
        let mut mapping = Vec::new();
        match self {
            OutputAction::CopyFromInput { part } => {
                for &id in captured(matcher, m, part) {
                    mapping.push((Some(id), output.push_node(input.node(id).detached())));
                }
            }
            OutputAction::ModifyFromInput { part, fs } => {
                let fs = instantiate(rule, fs, &m.bindings)?;
                for &id in captured(matcher, m, part) {
                    let mut node = input.node(id).detached();
                    node.fs.priority_union(&fs);
                    mapping.push((Some(id), output.push_node(node)));
                }
            }
            OutputAction::InsertShape(shape) => {
                for id in shape.live() {
                    mapping.push((None, output.push_node(shape.node(id).detached())));
                }
            }
            OutputAction::InsertShapeNode(fs) => {
                let fs = instantiate(rule, fs, &m.bindings)?;
                mapping.push((None, output.push(NodeKind::Segment, fs)));
            }
        }
        Ok(mapping)
    }

    /// Pattern fragment recognizing this action's output. `part` is the left-hand-side part the action
    /// reads, when it reads one.
    pub(crate) fn analysis_lhs(&self, part: Option<&Pattern>) -> Vec<PatternNode> {
        match (self, part) {
            (OutputAction::CopyFromInput { part: name }, Some(part)) => {
                vec![PatternNode::group(name.clone(), clone_except_boundaries(&part.children))]
            }
            (OutputAction::ModifyFromInput { part: name, fs }, Some(part)) => {
                let mut children = clone_except_boundaries(&part.children);
                for child in &mut children {
                    child.for_each_constraint_mut(&mut |c: &mut Constraint| {
                        if c.kind == NodeKind::Segment {
                            c.fs.priority_union(fs);
                        }
                    });
                }
                vec![PatternNode::group(name.clone(), children)]
            }
            (OutputAction::InsertShape(shape), _) => shape
                .live()
                .map(|id| shape.node(id))
                .filter(|n| n.kind == NodeKind::Segment)
                .map(|n| PatternNode::segment(n.fs.clone()))
                .collect(),
            (OutputAction::InsertShapeNode(fs), _) => vec![PatternNode::segment(fs.clone())],
            _ => Vec::new(),
        }
    }
}

fn captured<'m>(matcher: &Matcher, m: &'m Match, part: &str) -> &'m [NodeId] {
    matcher.group(part).and_then(|g| m.capture(g)).map_or(&[], |c| c.nodes.as_slice())
}

/// Replace bound variables; any variable left over is a derivation error.
pub(crate) fn instantiate(rule: &str, fs: &FeatureStruct, bindings: &VariableBindings) -> Result<FeatureStruct, MorphError> {
    let mut fs = fs.clone();
    fs.replace_variables(bindings);
    match fs.first_variable() {
        Some(feature) => Err(MorphError::UninstantiatedFeature { rule: rule.to_string(), feature: feature.to_string() }),
        None => Ok(fs),
    }
}

/// Re-materialize the material a pattern stands for, as analysis does for parts the surface no longer
/// shows. Quantified positions get up to `max` copies (`max(min, 1)` when unbounded); copies beyond
/// `min` are optional. Alternations take their first branch, marked optional.
pub(crate) fn untruncate(nodes: &[PatternNode], bindings: &VariableBindings, optional: bool, out: &mut Vec<ShapeNode>) {
    for node in nodes {
        match node {
            PatternNode::Constraint(c) => {
                if c.kind != NodeKind::Segment {
                    continue;
                }
                let mut fs = c.fs.clone();
                fs.replace_variables(bindings);
                fs.underspecify_variables();
                let mut shape_node = ShapeNode::new(NodeKind::Segment, fs);
                if optional {
                    shape_node.flags.insert(NodeFlags::OPTIONAL);
                }
                out.push(shape_node);
            }
            PatternNode::Group { children, .. } => untruncate(children, bindings, optional, out),
            PatternNode::Quantifier { min, max, child } => {
                let copies = max.unwrap_or((*min).max(1));
                for i in 0..copies {
                    untruncate(std::slice::from_ref(child.as_ref()), bindings, optional || i >= *min, out);
                }
            }
            PatternNode::Alternation(branches) => {
                if let Some(first) = branches.first() {
                    untruncate(std::slice::from_ref(first), bindings, true, out);
                }
            }
            PatternNode::Anchor(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::MatcherSettings;
    use crate::test_support::phonology;

    #[test]
    fn insert_node_requires_bound_variables() {
        let ph = phonology();
        let shape = ph.shape("ba");
        let matcher = Matcher::new(
            &Pattern::new(vec![PatternNode::group("stem", vec![ph.seg("+cons αvoice"), ph.seg("+voc")])]),
            MatcherSettings::default(),
        );
        let m = matcher.find(&shape, &mut |_| true).remove(0);
        let mut out = Shape::new();

        let agreeing = OutputAction::InsertShapeNode(ph.fs("+cons -son +cont place=cor αvoice"));
        agreeing.apply("r", &matcher, &m, &shape, &mut out).unwrap();
        assert_eq!(ph.render(&out), "z");

        let unbound = OutputAction::InsertShapeNode(ph.fs("+cons βvoice"));
        assert_eq!(
            unbound.apply("r", &matcher, &m, &shape, &mut out),
            Err(MorphError::UninstantiatedFeature { rule: "r".into(), feature: "voice".into() })
        );
    }

    #[test]
    fn modify_copies_and_overrides() {
        let ph = phonology();
        let shape = ph.shape("sa");
        let matcher =
            Matcher::new(&Pattern::new(vec![PatternNode::group("c", vec![ph.seg("+cons")])]), MatcherSettings::default());
        let m = matcher.find(&shape, &mut |_| true).remove(0);
        let mut out = Shape::new();
        let mapping = OutputAction::modify("c", ph.fs("+voice")).apply("r", &matcher, &m, &shape, &mut out).unwrap();
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping[0].0, shape.first());
        assert_eq!(ph.render(&out), "z");
    }

    #[test]
    fn untruncation_marks_copies_beyond_the_minimum_optional() {
        let ph = phonology();
        let pattern = vec![ph.seg("+cons"), PatternNode::repeat(ph.seg("+voc"), 1, Some(2))];
        let mut nodes = Vec::new();
        untruncate(&pattern, &VariableBindings::default(), false, &mut nodes);
        let optional: Vec<bool> = nodes.iter().map(ShapeNode::is_optional).collect();
        assert_eq!(optional, vec![false, false, true]);

        let mut unbounded = Vec::new();
        untruncate(&[PatternNode::repeat(ph.seg("+voc"), 0, None)], &VariableBindings::default(), false, &mut unbounded);
        assert_eq!(unbounded.len(), 1);
        assert!(unbounded[0].is_optional());
    }

    #[test]
    fn analysis_lhs_strips_boundaries_and_spells_out_inserts() {
        let ph = phonology();
        let part = Pattern::named(
            "stem",
            vec![ph.seg("+cons"), PatternNode::Constraint(Constraint::boundary(FeatureStruct::new()))],
        );
        let copy = OutputAction::copy("stem").analysis_lhs(Some(&part));
        assert_eq!(copy, vec![PatternNode::group("stem", vec![ph.seg("+cons")])]);
        let insert = OutputAction::InsertShape(ph.shape("iz")).analysis_lhs(None);
        assert_eq!(insert.len(), 2);
    }
}
