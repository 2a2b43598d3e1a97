//! Character definition tables: the bridge between strings and shapes.
//!
//! Each definition maps one or more string representations to a segment or boundary feature structure.
//! Tokenization is longest-first: representations are joined into one alternation, sorted by length,
//! and compiled lazily the first time the table is used.

use crate::error::ShapeError;
use crate::feature::FeatureStruct;
use crate::shape::{NodeKind, Shape, ShapeNode};
use once_cell::sync::OnceCell;
use regex::Regex;

#[derive(Debug, Clone)]
pub struct CharDef {
    pub reps: Vec<String>,
    pub kind: NodeKind,
    pub fs: FeatureStruct,
}

#[derive(Debug, Clone)]
pub struct CharacterDefinitionTable {
    pub name: String,
    defs: Vec<CharDef>,
    tokenizer: OnceCell<Regex>,
}

impl CharacterDefinitionTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), defs: Vec::new(), tokenizer: OnceCell::new() }
    }

    pub fn add_segment(&mut self, reps: &[&str], fs: FeatureStruct) -> &mut Self {
        self.add(reps, NodeKind::Segment, fs)
    }

    pub fn add_boundary(&mut self, reps: &[&str]) -> &mut Self {
        self.add(reps, NodeKind::Boundary, FeatureStruct::new())
    }

    fn add(&mut self, reps: &[&str], kind: NodeKind, fs: FeatureStruct) -> &mut Self {
        self.defs.push(CharDef { reps: reps.iter().map(|r| r.to_string()).collect(), kind, fs });
        self.tokenizer = OnceCell::new();
        self
    }

    pub fn lookup(&self, rep: &str) -> Option<&CharDef> {
        self.defs.iter().find(|d| d.reps.iter().any(|r| r == rep))
    }

    fn tokenizer(&self) -> Result<&Regex, ShapeError> {
        self.tokenizer.get_or_try_init(|| {
            let mut reps: Vec<&str> = self.defs.iter().flat_map(|d| d.reps.iter().map(String::as_str)).collect();
            reps.sort_by_key(|r| std::cmp::Reverse(r.chars().count()));
            let alternation: Vec<String> = reps.iter().map(|r| regex::escape(r)).collect();
            Regex::new(&alternation.join("|"))
                .map_err(|e| ShapeError::Tokenizer { table: self.name.clone(), reason: e.to_string() })
        })
    }

    /// Split `text` into a shape, longest representation first.
    pub fn segment(&self, text: &str) -> Result<Shape, ShapeError> {
        let re = self.tokenizer()?;
        let mut shape = Shape::new();
        let mut pos = 0;
        for m in re.find_iter(text) {
            if m.start() != pos || m.is_empty() {
                break;
            }
            let def = self.lookup(m.as_str()).ok_or_else(|| unknown(text, pos))?;
            shape.push_node(ShapeNode::new(def.kind, def.fs.clone()));
            pos = m.end();
        }
        if pos != text.len() {
            return Err(unknown(text, pos));
        }
        Ok(shape)
    }

    /// Representations of every definition compatible with `node`.
    fn matching_reps(&self, node: &ShapeNode) -> Vec<&str> {
        self.defs
            .iter()
            .filter(|d| d.kind == node.kind && d.fs.is_unifiable(&node.fs))
            .filter_map(|d| d.reps.first().map(String::as_str))
            .collect()
    }

    /// Render a shape. Optional nodes are parenthesized; nodes with no definition render as `?`.
    pub fn to_string(&self, shape: &Shape, include_boundaries: bool) -> String {
        let mut out = String::new();
        for id in shape.live() {
            let node = shape.node(id);
            if node.kind == NodeKind::Boundary && !include_boundaries {
                continue;
            }
            let rep = self.matching_reps(node).first().copied().unwrap_or("?");
            if node.is_optional() {
                out.push('(');
                out.push_str(rep);
                out.push(')');
            } else {
                out.push_str(rep);
            }
        }
        out
    }

    /// An anchored regex accepting every string the shape could stand for. Underspecified nodes become
    /// alternations and optional nodes are marked `?`.
    pub fn to_regex_string(&self, shape: &Shape) -> String {
        let mut out = String::from("^");
        for id in shape.live() {
            let node = shape.node(id);
            if node.kind == NodeKind::Boundary {
                continue;
            }
            let reps: Vec<String> = self.matching_reps(node).into_iter().map(regex::escape).collect();
            match reps.len() {
                0 => continue,
                1 if !node.is_optional() => out.push_str(&reps[0]),
                _ => {
                    out.push_str("(?:");
                    out.push_str(&reps.join("|"));
                    out.push(')');
                    if node.is_optional() {
                        out.push('?');
                    }
                }
            }
        }
        out.push('$');
        out
    }
}

fn unknown(text: &str, position: usize) -> ShapeError {
    ShapeError::UnknownSegment { text: text.to_string(), position }
}
