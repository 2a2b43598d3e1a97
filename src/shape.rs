//! Shapes: arena-backed, doubly linked sequences of feature-annotated nodes.
//!
//! ```text
//!   nodes (arena, never shrinks except on clear)
//!   ┌──────┬──────┬──────┬──────┬──────┐
//!   │ BEG  │ END  │  b   │  r   │  e   │ ...
//!   └──────┴──────┴──────┴──────┴──────┘
//!   linked order:  BEG ⇄ b ⇄ r ⇄ e ⇄ ... ⇄ END
//! ```
//!
//! ## Key concepts
//!
//! - **NodeId**: a stable index into the arena. Ids survive insertion, deletion (tombstoning) and
//!   relocation, which is what lets matches be collected first and applied later.
//! - **Anchors**: every shape is bracketed by a begin and an end anchor. They never carry content and are
//!   never yielded by [`Shape::iter`].
//! - **Morphs**: annotations recording which nodes realize which allomorph. A morph may subsume other
//!   morphs whose material it fully absorbed.
//!
//! ## Invariants
//!
//! - `nodes[0]` is the begin anchor and `nodes[1]` the end anchor.
//! - Cloning a shape deep-copies every node; ids stay valid in the clone.

use crate::feature::FeatureStruct;
use std::collections::HashMap;

// --- Nodes -------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Segment,
    Boundary,
    Anchor,
}

bitflags::bitflags! {
    /// Per-node state flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NodeFlags: u8 {
        /// Hypothesized position introduced by analysis.
        const OPTIONAL = 1 << 0;
        /// Touched by the rule currently being applied.
        const DIRTY    = 1 << 1;
        /// Tombstone left by synthesis deletion.
        const DELETED  = 1 << 2;
    }
}

bitflags::bitflags! {
    /// Node kinds visible to a matcher.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NodeKinds: u8 {
        const SEGMENT  = 1 << 0;
        const BOUNDARY = 1 << 1;
    }
}

impl NodeKinds {
    pub fn admits(self, kind: NodeKind) -> bool {
        match kind {
            NodeKind::Segment => self.contains(NodeKinds::SEGMENT),
            NodeKind::Boundary => self.contains(NodeKinds::BOUNDARY),
            NodeKind::Anchor => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeNode {
    pub kind: NodeKind,
    pub fs: FeatureStruct,
    pub flags: NodeFlags,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

impl ShapeNode {
    pub fn new(kind: NodeKind, fs: FeatureStruct) -> Self {
        Self { kind, fs, flags: NodeFlags::empty(), prev: None, next: None }
    }

    pub fn is_optional(&self) -> bool {
        self.flags.contains(NodeFlags::OPTIONAL)
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.contains(NodeFlags::DIRTY)
    }

    pub fn is_deleted(&self) -> bool {
        self.flags.contains(NodeFlags::DELETED)
    }

    /// Copy of the node's content, unlinked from any shape. The dirty flag does not travel.
    pub fn detached(&self) -> ShapeNode {
        ShapeNode { kind: self.kind, fs: self.fs.clone(), flags: self.flags - NodeFlags::DIRTY, prev: None, next: None }
    }
}

// --- Morph annotations -------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Morph {
    pub allomorph: String,
    pub morph_id: String,
    /// Member nodes in shape order. Subsumed morphs share their parent's nodes and leave this empty.
    pub nodes: Vec<NodeId>,
    pub subsumed: Vec<Morph>,
}

impl Morph {
    /// Copy of this morph's subsumption tree with node lists dropped.
    pub fn as_subsumed(&self) -> Morph {
        Morph {
            allomorph: self.allomorph.clone(),
            morph_id: self.morph_id.clone(),
            nodes: Vec::new(),
            subsumed: self.subsumed.iter().map(Morph::as_subsumed).collect(),
        }
    }

    /// Allomorph ids of this morph and everything it subsumes, depth first.
    pub fn allomorphs(&self) -> Vec<&str> {
        let mut out = vec![self.allomorph.as_str()];
        for child in &self.subsumed {
            out.extend(child.allomorphs());
        }
        out
    }
}

// --- Shape -------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    nodes: Vec<ShapeNode>,
    morphs: Vec<Morph>,
}

impl Default for Shape {
    fn default() -> Self {
        Self::new()
    }
}

impl Shape {
    const BEGIN: NodeId = NodeId(0);
    const END: NodeId = NodeId(1);

    pub fn new() -> Self {
        let mut begin = ShapeNode::new(NodeKind::Anchor, FeatureStruct::new());
        let mut end = ShapeNode::new(NodeKind::Anchor, FeatureStruct::new());
        begin.next = Some(Self::END);
        end.prev = Some(Self::BEGIN);
        Self { nodes: vec![begin, end], morphs: Vec::new() }
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = (NodeKind, FeatureStruct)>) -> Self {
        let mut shape = Self::new();
        for (kind, fs) in nodes {
            shape.push(kind, fs);
        }
        shape
    }

    pub fn begin(&self) -> NodeId {
        Self::BEGIN
    }

    pub fn end(&self) -> NodeId {
        Self::END
    }

    pub fn is_anchor(&self, id: NodeId) -> bool {
        id == Self::BEGIN || id == Self::END
    }

    pub fn node(&self, id: NodeId) -> &ShapeNode {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut ShapeNode {
        &mut self.nodes[id.index()]
    }

    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).next
    }

    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).prev
    }

    /// Append a node before the end anchor.
    pub fn push(&mut self, kind: NodeKind, fs: FeatureStruct) -> NodeId {
        self.push_node(ShapeNode::new(kind, fs))
    }

    pub fn push_node(&mut self, node: ShapeNode) -> NodeId {
        let last = self.prev(Self::END).unwrap_or(Self::BEGIN);
        self.insert_node_after(last, node)
    }

    pub fn insert_after(&mut self, after: NodeId, kind: NodeKind, fs: FeatureStruct) -> NodeId {
        self.insert_node_after(after, ShapeNode::new(kind, fs))
    }

    /// Link a fresh node after `after`. Inserting after the end anchor inserts before it instead.
    pub fn insert_node_after(&mut self, after: NodeId, mut node: ShapeNode) -> NodeId {
        let after = if after == Self::END { self.prev(Self::END).unwrap_or(Self::BEGIN) } else { after };
        let id = NodeId(self.nodes.len() as u32);
        let next = self.next(after);
        node.prev = Some(after);
        node.next = next;
        self.nodes.push(node);
        self.nodes[after.index()].next = Some(id);
        if let Some(next) = next {
            self.nodes[next.index()].prev = Some(id);
        }
        id
    }

    /// Unlink `id` and relink it directly after `after`.
    pub fn move_after(&mut self, id: NodeId, after: NodeId) {
        if id == after || self.is_anchor(id) || self.next(after) == Some(id) {
            return;
        }
        let (prev, next) = (self.prev(id), self.next(id));
        if let Some(p) = prev {
            self.nodes[p.index()].next = next;
        }
        if let Some(n) = next {
            self.nodes[n.index()].prev = prev;
        }
        let after = if after == Self::END { self.prev(Self::END).unwrap_or(Self::BEGIN) } else { after };
        let following = self.next(after);
        self.nodes[id.index()].prev = Some(after);
        self.nodes[id.index()].next = following;
        self.nodes[after.index()].next = Some(id);
        if let Some(f) = following {
            self.nodes[f.index()].prev = Some(id);
        }
    }

    /// Drop all content nodes and morphs, keeping only the anchors.
    pub fn clear(&mut self) {
        *self = Shape::new();
    }

    /// Content nodes in order, anchors excluded, tombstones included.
    pub fn iter(&self) -> ShapeIter<'_> {
        ShapeIter { shape: self, cur: self.next(Self::BEGIN) }
    }

    /// Content nodes that are not tombstoned.
    pub fn live(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.iter().filter(move |&id| !self.node(id).is_deleted())
    }

    pub fn len(&self) -> usize {
        self.live().count()
    }

    pub fn is_empty(&self) -> bool {
        self.live().next().is_none()
    }

    pub fn first(&self) -> Option<NodeId> {
        self.iter().next()
    }

    pub fn last(&self) -> Option<NodeId> {
        self.prev(Self::END).filter(|&id| id != Self::BEGIN)
    }

    /// Position of each node in linked order; the begin anchor is 0 and the end anchor is last.
    pub fn positions(&self) -> HashMap<NodeId, usize> {
        let mut out = HashMap::with_capacity(self.nodes.len());
        let mut cur = Some(Self::BEGIN);
        let mut i = 0;
        while let Some(id) = cur {
            out.insert(id, i);
            i += 1;
            cur = self.next(id);
        }
        out
    }

    pub fn reset_dirty(&mut self) {
        for node in &mut self.nodes {
            node.flags.remove(NodeFlags::DIRTY);
        }
    }

    /// True when both shapes carry the same non-optional, non-deleted content.
    pub fn duplicates(&self, other: &Shape) -> bool {
        let content = |s: &'_ Shape| -> Vec<(NodeKind, FeatureStruct)> {
            s.live()
                .map(|id| s.node(id))
                .filter(|n| !n.is_optional())
                .map(|n| (n.kind, n.fs.clone()))
                .collect()
        };
        content(self) == content(other)
    }

    // --- Morphs ---------------------------------------------------------------

    pub fn morphs(&self) -> &[Morph] {
        &self.morphs
    }

    /// Record a morph over `nodes`. Returns its index among top-level morphs, or `None` for an empty run.
    pub fn mark_morph(&mut self, nodes: Vec<NodeId>, allomorph: &str, morph_id: &str) -> Option<usize> {
        if nodes.is_empty() {
            return None;
        }
        self.morphs.push(Morph {
            allomorph: allomorph.to_string(),
            morph_id: morph_id.to_string(),
            nodes,
            subsumed: Vec::new(),
        });
        Some(self.morphs.len() - 1)
    }

    /// Mark `nodes` as one morph per contiguous run. Returns the index of the longest run.
    pub fn mark_contiguous_morphs(&mut self, nodes: &[NodeId], allomorph: &str, morph_id: &str) -> Option<usize> {
        let mut longest: Option<(usize, usize)> = None;
        let mut run = Vec::new();
        for (i, &id) in nodes.iter().enumerate() {
            run.push(id);
            if nodes.get(i + 1).is_some_and(|&next| self.next(id) == Some(next)) {
                continue;
            }
            let len = run.len();
            if let Some(idx) = self.mark_morph(std::mem::take(&mut run), allomorph, morph_id) {
                if longest.is_none_or(|(_, l)| len > l) {
                    longest = Some((idx, len));
                }
            }
        }
        longest.map(|(idx, _)| idx)
    }

    pub fn subsume_morph(&mut self, parent: usize, morph: Morph) {
        if let Some(p) = self.morphs.get_mut(parent) {
            p.subsumed.push(morph);
        }
    }

    /// Index of the top-level morph containing `id`.
    pub fn morph_of(&self, id: NodeId) -> Option<usize> {
        self.morphs.iter().position(|m| m.nodes.contains(&id))
    }

    /// Re-sort every morph's members by their current linked position.
    pub fn reorder_morphs(&mut self) {
        let pos = self.positions();
        for morph in &mut self.morphs {
            morph.nodes.sort_by_key(|id| pos.get(id).copied().unwrap_or(usize::MAX));
        }
        self.morphs.sort_by_key(|m| m.nodes.first().and_then(|id| pos.get(id).copied()).unwrap_or(usize::MAX));
    }
}

pub struct ShapeIter<'a> {
    shape: &'a Shape,
    cur: Option<NodeId>,
}

impl Iterator for ShapeIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.cur.filter(|&id| id != Shape::END)?;
        self.cur = self.shape.next(id);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg() -> (NodeKind, FeatureStruct) {
        (NodeKind::Segment, FeatureStruct::new())
    }

    #[test]
    fn new_shape_has_only_anchors() {
        let shape = Shape::new();
        assert!(shape.is_empty());
        assert_eq!(shape.next(shape.begin()), Some(shape.end()));
        assert_eq!(shape.first(), None);
        assert_eq!(shape.last(), None);
    }

    #[test]
    fn insert_after_links_both_directions() {
        let mut shape = Shape::from_nodes([seg(), seg()]);
        let ids: Vec<_> = shape.iter().collect();
        let mid = shape.insert_after(ids[0], NodeKind::Boundary, FeatureStruct::new());
        assert_eq!(shape.iter().collect::<Vec<_>>(), vec![ids[0], mid, ids[1]]);
        assert_eq!(shape.prev(ids[1]), Some(mid));
        let tail = shape.insert_after(shape.end(), NodeKind::Segment, FeatureStruct::new());
        assert_eq!(shape.last(), Some(tail));
    }

    #[test]
    fn move_after_relocates_without_changing_ids() {
        let mut shape = Shape::from_nodes([seg(), seg(), seg()]);
        let ids: Vec<_> = shape.iter().collect();
        shape.move_after(ids[0], ids[1]);
        assert_eq!(shape.iter().collect::<Vec<_>>(), vec![ids[1], ids[0], ids[2]]);
        assert_eq!(shape.prev(ids[1]), Some(shape.begin()));
        assert_eq!(shape.next(ids[0]), Some(ids[2]));
    }

    #[test]
    fn tombstones_are_skipped_by_live_but_kept_in_iter() {
        let mut shape = Shape::from_nodes([seg(), seg()]);
        let first = shape.first().unwrap();
        shape.node_mut(first).flags.insert(NodeFlags::DELETED);
        assert_eq!(shape.iter().count(), 2);
        assert_eq!(shape.len(), 1);
    }

    #[test]
    fn duplicates_ignores_optional_nodes() {
        let a = Shape::from_nodes([seg()]);
        let mut b = Shape::from_nodes([seg(), seg()]);
        let last = b.last().unwrap();
        b.node_mut(last).flags.insert(NodeFlags::OPTIONAL);
        assert!(a.duplicates(&b));
    }

    #[test]
    fn contiguous_runs_become_separate_morphs() {
        let mut shape = Shape::from_nodes([seg(), seg(), seg(), seg()]);
        let ids: Vec<_> = shape.iter().collect();
        let longest = shape.mark_contiguous_morphs(&[ids[0], ids[2], ids[3]], "circ", "1");
        assert_eq!(shape.morphs().len(), 2);
        assert_eq!(longest, Some(1));
        assert_eq!(shape.morphs()[1].nodes, vec![ids[2], ids[3]]);
    }

    #[test]
    fn reorder_morphs_follows_node_positions() {
        let mut shape = Shape::from_nodes([seg(), seg(), seg()]);
        let ids: Vec<_> = shape.iter().collect();
        shape.mark_morph(vec![ids[0]], "a", "0");
        shape.mark_morph(vec![ids[1], ids[2]], "b", "1");
        shape.move_after(ids[0], ids[2]);
        shape.reorder_morphs();
        assert_eq!(shape.morphs()[0].allomorph, "b");
        assert_eq!(shape.morph_of(ids[0]), Some(1));
    }
}
