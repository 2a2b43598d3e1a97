//! Words: the unit of ownership passed between rules.
//!
//! A [`Word`] owns its shape outright. Rules never mutate their input; they call [`Word::derive`] to get
//! an unfrozen deep copy and edit that. This is what makes alternative derivation branches independent.
//!
//! ## Key concepts
//!
//! - **Pending rule stack**: analysis records each un-applied morphological rule on a stack. Synthesis
//!   re-applies them innermost first. The cursor (`rule_app_index`) counts entries not yet re-applied,
//!   so the current rule is `rule_apps[rule_app_index - 1]`. `None` entries stand for a compounding rule
//!   that is not yet known.
//! - **Non-heads**: compounding analysis splits off non-head words. They live on their own stack with a
//!   cursor.
//! - **Freezing**: a word accepted as a final rule output is frozen. A blockable rule may still swap it
//!   for a word built from a competing lexical entry.

use crate::feature::FeatureStruct;
use crate::shape::Shape;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

// --- MPR features ----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MprMatchType {
    #[default]
    All,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MprOutputType {
    #[default]
    Append,
    Overwrite,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MprFeatureGroup {
    pub name: String,
    pub match_type: MprMatchType,
    pub output: MprOutputType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MprFeature {
    pub name: String,
    pub group: Option<Arc<MprFeatureGroup>>,
}

impl MprFeature {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), group: None }
    }

    pub fn grouped(name: impl Into<String>, group: &Arc<MprFeatureGroup>) -> Self {
        Self { name: name.into(), group: Some(Arc::clone(group)) }
    }

    fn group_name(&self) -> Option<&str> {
        self.group.as_ref().map(|g| g.name.as_str())
    }
}

/// Set of MPR features, unique by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MprFeatureSet {
    features: Vec<MprFeature>,
}

impl MprFeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(names: &[&str]) -> Self {
        let mut set = Self::new();
        for name in names {
            set.insert(MprFeature::new(*name));
        }
        set
    }

    pub fn insert(&mut self, feature: MprFeature) {
        if !self.contains(&feature.name) {
            self.features.push(feature);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.features.iter().any(|f| f.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MprFeature> {
        self.features.iter()
    }

    pub fn union_with(&mut self, other: &MprFeatureSet) {
        for f in &other.features {
            self.insert(f.clone());
        }
    }

    /// Features partitioned by group. Ungrouped features each form their own `All` group.
    fn partitions(&self) -> Vec<(MprMatchType, Vec<&MprFeature>)> {
        let mut grouped: BTreeMap<&str, (MprMatchType, Vec<&MprFeature>)> = BTreeMap::new();
        let mut out = Vec::new();
        for f in &self.features {
            match &f.group {
                Some(g) => grouped.entry(g.name.as_str()).or_insert_with(|| (g.match_type, Vec::new())).1.push(f),
                None => out.push((MprMatchType::All, vec![f])),
            }
        }
        out.extend(grouped.into_values());
        out
    }

    /// Does this (word) set satisfy `required`?
    pub fn is_match_required(&self, required: &MprFeatureSet) -> bool {
        required.partitions().into_iter().all(|(match_type, features)| match match_type {
            MprMatchType::All => features.iter().all(|f| self.contains(&f.name)),
            MprMatchType::Any => features.iter().any(|f| self.contains(&f.name)),
        })
    }

    /// Does this (word) set avoid `excluded`?
    pub fn is_match_excluded(&self, excluded: &MprFeatureSet) -> bool {
        excluded.partitions().into_iter().all(|(match_type, features)| match match_type {
            MprMatchType::All => !features.iter().all(|f| self.contains(&f.name)),
            MprMatchType::Any => !features.iter().any(|f| self.contains(&f.name)),
        })
    }

    /// Merge a rule's output features. Overwrite groups first drop the word's features in that group.
    pub fn add_output(&mut self, output: &MprFeatureSet) {
        let overwritten: BTreeSet<&str> = output
            .features
            .iter()
            .filter(|f| f.group.as_ref().is_some_and(|g| g.output == MprOutputType::Overwrite))
            .filter_map(MprFeature::group_name)
            .collect();
        self.features.retain(|f| f.group_name().is_none_or(|g| !overwritten.contains(g)));
        self.union_with(output);
    }
}

// --- Lexical data ----------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct LexEntry {
    pub id: String,
    pub shape: Shape,
    pub syntactic_fs: FeatureStruct,
    pub mpr_features: MprFeatureSet,
}

/// Entries that compete for the same content; used for blocking.
#[derive(Debug, Clone, PartialEq)]
pub struct LexFamily {
    pub name: String,
    pub entries: Vec<Arc<LexEntry>>,
}

// --- Word ------------------------------------------------------------------------

/// Morph id given to the root morph of a word built from a lexical entry.
pub const ROOT_MORPH_ID: &str = "ROOT";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Word {
    pub shape: Shape,
    pub syntactic_fs: FeatureStruct,
    pub realizational_fs: FeatureStruct,
    pub mpr_features: MprFeatureSet,
    allomorphs: Vec<String>,
    rule_apps: Vec<Option<String>>,
    rule_app_index: usize,
    applied: BTreeMap<String, usize>,
    unapplied: BTreeMap<String, usize>,
    non_heads: Vec<Word>,
    non_head_index: usize,
    obligatory_features: BTreeSet<String>,
    disjunctive_allomorphs: BTreeMap<String, Vec<usize>>,
    app_count: usize,
    frozen: bool,
    root: Option<Arc<LexEntry>>,
    family: Option<Arc<LexFamily>>,
}

impl Word {
    /// A surface word with no morph structure, as handed to analysis.
    pub fn surface(shape: Shape) -> Self {
        Self { shape, ..Default::default() }
    }

    /// A root word whose whole shape realizes `root_allomorph`.
    pub fn root(root_allomorph: &str, shape: Shape, syntactic_fs: FeatureStruct) -> Self {
        let mut word = Self { shape, syntactic_fs, ..Default::default() };
        let nodes: Vec<_> = word.shape.live().collect();
        word.shape.mark_morph(nodes, root_allomorph, ROOT_MORPH_ID);
        word.allomorphs.push(root_allomorph.to_string());
        word
    }

    pub fn from_entry(entry: Arc<LexEntry>, family: Option<Arc<LexFamily>>) -> Self {
        let mut word = Self::root(&entry.id, entry.shape.clone(), entry.syntactic_fs.clone());
        word.mpr_features = entry.mpr_features.clone();
        word.root = Some(entry);
        word.family = family;
        word
    }

    /// Unfrozen deep copy for a new derivation branch.
    pub fn derive(&self) -> Word {
        let mut word = self.clone();
        word.frozen = false;
        word
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn root_entry(&self) -> Option<&Arc<LexEntry>> {
        self.root.as_ref()
    }

    /// Allomorph ids in the order they were applied.
    pub fn allomorphs(&self) -> &[String] {
        &self.allomorphs
    }

    pub(crate) fn push_allomorph(&mut self, id: &str) {
        self.allomorphs.push(id.to_string());
    }

    /// Number of morphological rules applied so far; doubles as the next morph id.
    pub fn morph_counter(&self) -> usize {
        self.app_count
    }

    pub fn reset_dirty(&mut self) {
        self.shape.reset_dirty();
    }

    // --- Morphological rule bookkeeping -------------------------------------------

    /// Queue rules for synthesis, given in the order they should apply.
    pub fn schedule_rules(&mut self, names: &[&str]) {
        for name in names.iter().rev() {
            self.rule_apps.push(Some(name.to_string()));
        }
        self.rule_app_index = self.rule_apps.len();
    }

    /// Queue a compounding step whose rule is not known in advance.
    pub fn schedule_compounding(&mut self) {
        self.rule_apps.push(None);
        self.rule_app_index = self.rule_apps.len();
    }

    pub fn current_rule(&self) -> Option<Option<&str>> {
        self.rule_app_index.checked_sub(1).map(|i| self.rule_apps[i].as_deref())
    }

    pub fn is_morphological_rule_applicable(&self, name: &str, compounding: bool) -> bool {
        match self.current_rule() {
            Some(Some(current)) => current == name,
            Some(None) => compounding,
            None => false,
        }
    }

    pub fn morphological_rule_unapplied(&mut self, name: &str, realizational: bool) {
        *self.unapplied.entry(name.to_string()).or_default() += 1;
        if !realizational {
            self.rule_apps.push(Some(name.to_string()));
            self.rule_app_index = self.rule_apps.len();
        }
    }

    pub fn morphological_rule_applied(&mut self, name: &str, realizational: bool, allomorph_indices: &[usize]) {
        let morph_id = self.app_count.to_string();
        *self.applied.entry(name.to_string()).or_default() += 1;
        self.app_count += 1;
        if !realizational && self.rule_app_index > 0 {
            self.rule_app_index -= 1;
        }
        if !allomorph_indices.is_empty() {
            self.disjunctive_allomorphs.insert(morph_id, allomorph_indices.to_vec());
        }
    }

    pub fn application_count(&self, name: &str) -> usize {
        self.applied.get(name).copied().unwrap_or(0)
    }

    pub fn unapplication_count(&self, name: &str) -> usize {
        self.unapplied.get(name).copied().unwrap_or(0)
    }

    /// Allomorph indices tried before the one that produced morph `morph_id`.
    pub fn disjunctive_allomorph_indices(&self, morph_id: &str) -> Option<&[usize]> {
        self.disjunctive_allomorphs.get(morph_id).map(Vec::as_slice)
    }

    // --- Compounding --------------------------------------------------------------

    pub fn current_non_head(&self) -> Option<&Word> {
        self.non_head_index.checked_sub(1).map(|i| &self.non_heads[i])
    }

    pub fn non_head_unapplied(&mut self, non_head: Word) {
        self.non_heads.push(non_head);
        self.non_head_index = self.non_heads.len();
    }

    pub fn non_head_applied(&mut self) {
        self.non_head_index = self.non_head_index.saturating_sub(1);
    }

    pub fn non_heads(&self) -> &[Word] {
        &self.non_heads
    }

    // --- Syntax -------------------------------------------------------------------

    pub fn add_obligatory_features<'a>(&mut self, names: impl IntoIterator<Item = &'a String>) {
        self.obligatory_features.extend(names.into_iter().cloned());
    }

    pub fn obligatory_features(&self) -> &BTreeSet<String> {
        &self.obligatory_features
    }

    /// A word built from a sibling lexical entry that expresses this word's syntax, if any.
    pub fn check_blocking(&self) -> Option<Word> {
        let (root, family) = (self.root.as_ref()?, self.family.as_ref()?);
        let entry = family.entries.iter().find(|e| e.id != root.id && self.syntactic_fs.subsumes(&e.syntactic_fs))?;
        let mut blocker = Word::from_entry(Arc::clone(entry), Some(Arc::clone(family)));
        blocker.realizational_fs = self.realizational_fs.clone();
        blocker.freeze();
        Some(blocker)
    }
}

/// Drop words whose shape, syntax and pending rules duplicate an earlier word.
pub fn remove_duplicates(words: Vec<Word>) -> Vec<Word> {
    let mut out: Vec<Word> = Vec::with_capacity(words.len());
    for word in words {
        let dup = out.iter().any(|w| {
            w.shape.duplicates(&word.shape)
                && w.syntactic_fs == word.syntactic_fs
                && w.rule_apps[..w.rule_app_index] == word.rule_apps[..word.rule_app_index]
        });
        if !dup {
            out.push(word);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::phonology;

    #[test]
    fn rule_stack_replays_unapplied_rules_innermost_first() {
        let mut word = Word::surface(Shape::new());
        word.morphological_rule_unapplied("OUTER", false);
        word.morphological_rule_unapplied("INNER", false);
        word.morphological_rule_unapplied("AGR", true);
        assert!(word.is_morphological_rule_applicable("INNER", false));
        word.morphological_rule_applied("INNER", false, &[]);
        assert!(word.is_morphological_rule_applicable("OUTER", false));
        word.morphological_rule_applied("AGR", true, &[]);
        assert!(word.is_morphological_rule_applicable("OUTER", false));
        assert_eq!(word.unapplication_count("AGR"), 1);
        assert_eq!(word.morph_counter(), 2);
    }

    #[test]
    fn scheduled_compounding_accepts_any_compounding_rule() {
        let mut word = Word::surface(Shape::new());
        word.schedule_compounding();
        assert!(word.is_morphological_rule_applicable("CMP", true));
        assert!(!word.is_morphological_rule_applicable("PL", false));
    }

    #[test]
    fn derive_unfreezes_without_touching_the_original() {
        let ph = phonology();
        let mut word = ph.word("bat");
        word.freeze();
        let mut copy = word.derive();
        assert!(!copy.is_frozen());
        copy.shape.clear();
        assert_eq!(word.shape.len(), 3);
        assert_eq!(word.allomorphs(), ["bat".to_string()]);
    }

    #[test]
    fn mpr_groups_control_matching_and_output() {
        let any = Arc::new(MprFeatureGroup { name: "class".into(), match_type: MprMatchType::Any, output: MprOutputType::Overwrite });
        let mut word = MprFeatureSet::new();
        word.insert(MprFeature::grouped("c1", &any));
        word.insert(MprFeature::new("irregular"));

        let mut required = MprFeatureSet::new();
        required.insert(MprFeature::grouped("c1", &any));
        required.insert(MprFeature::grouped("c2", &any));
        assert!(word.is_match_required(&required));
        assert!(!word.is_match_required(&MprFeatureSet::of(&["c3"])));
        assert!(!word.is_match_excluded(&MprFeatureSet::of(&["irregular"])));
        assert!(word.is_match_excluded(&MprFeatureSet::of(&["c2"])));

        let mut out = MprFeatureSet::new();
        out.insert(MprFeature::grouped("c2", &any));
        word.add_output(&out);
        assert!(word.contains("c2") && !word.contains("c1") && word.contains("irregular"));
    }

    #[test]
    fn blocking_substitutes_a_sibling_entry() {
        let ph = phonology();
        let go = Arc::new(LexEntry {
            id: "go".into(),
            shape: ph.shape("gu"),
            syntactic_fs: ph.fs("-past"),
            mpr_features: MprFeatureSet::new(),
        });
        let went = Arc::new(LexEntry {
            id: "went".into(),
            shape: ph.shape("ment"),
            syntactic_fs: ph.fs("+past"),
            mpr_features: MprFeatureSet::new(),
        });
        let family = Arc::new(LexFamily { name: "GO".into(), entries: vec![go.clone(), went] });
        let mut word = Word::from_entry(go, Some(family));
        assert!(word.check_blocking().is_none());
        word.syntactic_fs = ph.fs("+past");
        let blocker = word.check_blocking().unwrap();
        assert_eq!(blocker.allomorphs(), ["went".to_string()]);
        assert!(blocker.is_frozen());
    }

    #[test]
    fn duplicates_are_removed_in_order() {
        let ph = phonology();
        let words = vec![ph.word("bat"), ph.word("bat"), ph.word("tab")];
        assert_eq!(remove_duplicates(words).len(), 2);
    }
}
