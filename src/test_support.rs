//! Shared fixtures for unit tests: a small feature system and character table.

use crate::char_table::CharacterDefinitionTable;
use crate::feature::{FeatureStruct, FeatureSystem};
use crate::pattern::{Pattern, PatternNode};
use crate::shape::Shape;
use crate::word::Word;

pub struct Phonology {
    pub sys: FeatureSystem,
    pub table: CharacterDefinitionTable,
}

const CONSONANTS: &[(&str, &str)] = &[
    ("p", "-son -voice -cont -nasal -delrel place=lab"),
    ("b", "-son +voice -cont -nasal -delrel place=lab"),
    ("t", "-son -voice -cont -nasal -delrel place=cor"),
    ("tʃ", "-son -voice -cont -nasal +delrel place=cor"),
    ("d", "-son +voice -cont -nasal -delrel place=cor"),
    ("k", "-son -voice -cont -nasal -delrel place=dor"),
    ("g", "-son +voice -cont -nasal -delrel place=dor"),
    ("s", "-son -voice +cont -nasal -delrel place=cor"),
    ("z", "-son +voice +cont -nasal -delrel place=cor"),
    ("m", "+son +voice -cont +nasal -delrel place=lab"),
    ("n", "+son +voice -cont +nasal -delrel place=cor"),
    ("r", "+son +voice +cont -nasal -delrel place=cor"),
];

const VOWELS: &[(&str, &str)] = &[
    ("a", "-high +low +back"),
    ("e", "-high -low -back"),
    ("i", "+high -low -back"),
    ("o", "-high -low +back"),
    ("u", "+high -low +back"),
];

pub fn phonology() -> Phonology {
    let mut sys = FeatureSystem::new();
    for name in ["cons", "voc", "son", "voice", "cont", "nasal", "delrel", "high", "low", "back", "past", "pl"] {
        sys.add_binary(name).unwrap();
    }
    sys.add_symbolic("place", &["lab", "cor", "dor"]).unwrap();
    sys.add_symbolic("pos", &["n", "v", "adj"]).unwrap();

    let mut table = CharacterDefinitionTable::new("test");
    for (rep, notation) in CONSONANTS {
        table.add_segment(&[*rep], sys.parse(&format!("+cons -voc {notation}")).unwrap());
    }
    for (rep, notation) in VOWELS {
        table.add_segment(&[*rep], sys.parse(&format!("-cons +voc +son +voice {notation}")).unwrap());
    }
    table.add_boundary(&["+"]);
    Phonology { sys, table }
}

impl Phonology {
    pub fn fs(&self, notation: &str) -> FeatureStruct {
        self.sys.parse(notation).unwrap()
    }

    pub fn seg(&self, notation: &str) -> PatternNode {
        PatternNode::segment(self.fs(notation))
    }

    /// A flat pattern of segment constraints.
    pub fn segs(&self, notations: &[&str]) -> Pattern {
        Pattern::new(notations.iter().map(|n| self.seg(n)).collect())
    }

    /// Constraints spelling out `text` exactly.
    pub fn literal(&self, text: &str) -> Vec<PatternNode> {
        let shape = self.shape(text);
        shape.live().map(|id| PatternNode::segment(shape.node(id).fs.clone())).collect()
    }

    pub fn shape(&self, text: &str) -> Shape {
        self.table.segment(text).unwrap()
    }

    pub fn word(&self, text: &str) -> Word {
        Word::root(text, self.shape(text), FeatureStruct::new())
    }

    pub fn render(&self, shape: &Shape) -> String {
        self.table.to_string(shape, false)
    }
}
