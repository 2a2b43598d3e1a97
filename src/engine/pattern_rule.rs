//! Phonological pattern rules: a target matcher plus a disjunctive list of subrules.
//!
//! Both rule directions of every phonological rule run through [`PhonologicalPatternRule`]. The rule
//! finds a target, asks each subrule in turn whether it accepts the match (environments, vacuity
//! checks), and lets the first taker rewrite the word.
//!
//! ```text
//!   Iterative      scan ─► match ─► rewrite ─► resume after it ─► scan ...
//!   Simultaneous   scan ─► match ─► scan ─► match ─► ... ─► rewrite all
//! ```
//!
//! ## Invariants
//!
//! - Iterative scanning always makes progress: the next match must start strictly past the first
//!   untouched node of the previous one, in scan direction. Touched nodes are dirty and cannot be the
//!   target of another synthesis match, so the loop runs at most once per original node.
//! - Simultaneous scanning computes every match against the pre-rewrite shape. Matches are
//!   non-overlapping and applied through node ids, which survive the edits.

use crate::error::MorphError;
use crate::feature::VariableBindings;
use crate::pattern::{Direction, Match, Matcher, MatcherSettings, Pattern};
use crate::shape::{NodeId, Shape};
use crate::word::Word;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ApplicationMode {
    #[default]
    Iterative,
    Simultaneous,
}

/// Left and right environments of a subrule, compiled into matchers that start at the target's edges.
#[derive(Debug, Clone, Default)]
pub(crate) struct Environment {
    left: Option<Matcher>,
    right: Option<Matcher>,
}

impl Environment {
    pub(crate) fn new(left: &Pattern, right: &Pattern, settings: MatcherSettings) -> Self {
        let build = |pattern: &Pattern, direction| {
            (!pattern.is_empty()).then(|| {
                let settings = MatcherSettings { direction, anchored_to_start: false, anchored_to_end: false, ..settings };
                Matcher::new(pattern, settings)
            })
        };
        Self {
            left: build(left, Direction::RightToLeft),
            right: build(right, Direction::LeftToRight),
        }
    }

    /// Check both environments around `target`, threading variable bindings from the target into the
    /// left environment and on into the right one.
    pub(crate) fn is_match(&self, shape: &Shape, target: &Match) -> Option<VariableBindings> {
        self.is_match_at(shape, target.start_gap, target.end_gap, &target.bindings)
    }

    /// Check both environments around the visible span `start_gap..end_gap`.
    pub(crate) fn is_match_at(
        &self,
        shape: &Shape,
        start_gap: usize,
        end_gap: usize,
        bindings: &VariableBindings,
    ) -> Option<VariableBindings> {
        let mut bindings = bindings.clone();
        if let Some(left) = &self.left {
            bindings = left.match_at(shape, start_gap, &bindings, &mut |_| true).into_iter().next()?.bindings;
        }
        if let Some(right) = &self.right {
            bindings = right.match_at(shape, end_gap, &bindings, &mut |_| true).into_iter().next()?.bindings;
        }
        Some(bindings)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// One alternative of a phonological pattern rule.
pub(crate) trait PatternSubrule: Send + Sync {
    /// Accept `target` and return the bindings to rewrite with, or `None` to let the next subrule try.
    fn matches(&self, word: &Word, target: &Match) -> Option<VariableBindings>;

    /// Rewrite the word at `target`. Returns the visible nodes written, used to resume scanning.
    fn apply(&self, word: &mut Word, target: &Match, bindings: &VariableBindings) -> Result<Vec<NodeId>, MorphError>;
}

pub(crate) struct PhonologicalPatternRule {
    target: Matcher,
    subrules: Vec<Box<dyn PatternSubrule>>,
    mode: ApplicationMode,
    reject_dirty: bool,
}

struct Chosen {
    target: Match,
    subrule: usize,
    bindings: VariableBindings,
}

impl PhonologicalPatternRule {
    pub(crate) fn new(target: Matcher, subrules: Vec<Box<dyn PatternSubrule>>, mode: ApplicationMode) -> Self {
        Self { target, subrules, mode, reject_dirty: false }
    }

    /// Reject targets that contain nodes already rewritten in this application (synthesis).
    pub(crate) fn reject_dirty(mut self, reject: bool) -> Self {
        self.reject_dirty = reject;
        self
    }

    pub(crate) fn mode(&self) -> ApplicationMode {
        self.mode
    }

    fn rtl(&self) -> bool {
        self.target.settings().direction == Direction::RightToLeft
    }

    /// Visible nodes keyed by their position in scan order.
    fn oriented_positions(&self, shape: &Shape) -> (usize, HashMap<NodeId, usize>) {
        let seq = self.target.visible(shape);
        let len = seq.len();
        let rtl = self.rtl();
        let pos = seq.into_iter().enumerate().map(|(i, id)| (id, if rtl { len - 1 - i } else { i })).collect();
        (len, pos)
    }

    /// First acceptable match at or after oriented gap `from`, with the subrule that took it.
    fn next_match(&self, word: &Word, from: usize, enabled: &[usize]) -> Option<Chosen> {
        let len = self.target.visible(&word.shape).len();
        if from > len {
            return None;
        }
        let gap = if self.rtl() { len - from } else { from };
        let mut chosen = None;
        let found = self.target.find_from(&word.shape, gap, &VariableBindings::default(), &mut |m: &Match| {
            if chosen.is_some() {
                return false;
            }
            if self.reject_dirty && m.whole.nodes.iter().any(|&id| word.shape.node(id).is_dirty()) {
                return false;
            }
            let taken = enabled.iter().find_map(|&i| self.subrules[i].matches(word, m).map(|b| (i, b)));
            match taken {
                Some(t) => {
                    chosen = Some(t);
                    true
                }
                None => false,
            }
        });
        let target = found.into_iter().next()?;
        let (subrule, bindings) = chosen?;
        Some(Chosen { target, subrule, bindings })
    }

    /// Oriented gap where the match ends.
    fn oriented_end(&self, m: &Match, len: usize) -> usize {
        if self.rtl() { len - m.start_gap } else { m.end_gap }
    }

    /// Apply to `word` in place, trying only the `enabled` subrules. Returns the subrule behind each
    /// rewrite, in application order. `word` must come from [`Word::derive`].
    pub(crate) fn apply(&self, word: &mut Word, enabled: &[usize]) -> Result<Vec<usize>, MorphError> {
        debug_assert!(!word.is_frozen(), "phonological rule applied to a frozen word");
        match self.mode {
            ApplicationMode::Iterative => self.apply_iterative(word, enabled),
            ApplicationMode::Simultaneous => self.apply_simultaneous(word, enabled),
        }
    }

    fn apply_iterative(&self, word: &mut Word, enabled: &[usize]) -> Result<Vec<usize>, MorphError> {
        let rtl = self.rtl();
        let mut from = 0;
        let mut applied = Vec::new();
        while let Some(Chosen { target, subrule, bindings }) = self.next_match(word, from, enabled) {
            let first = if rtl { target.whole.nodes.last() } else { target.whole.nodes.first() };
            let progress = first.copied().unwrap_or(if rtl { target.whole.left } else { target.whole.right });
            let before = if rtl { target.whole.right } else { target.whole.left };
            let written = self.subrules[subrule].apply(word, &target, &bindings)?;
            applied.push(subrule);

            let (len, pos) = self.oriented_positions(&word.shape);
            let start = if word.shape.is_anchor(before) { 0 } else { pos.get(&before).map_or(0, |p| p + 1) };
            from = match pos.get(&progress) {
                Some(p) => p + 1,
                None if word.shape.is_anchor(progress) => len + 1,
                None => start,
            };
            for id in written {
                if let Some(p) = pos.get(&id) {
                    from = from.max(p + 1);
                }
            }
        }
        Ok(applied)
    }

    fn apply_simultaneous(&self, word: &mut Word, enabled: &[usize]) -> Result<Vec<usize>, MorphError> {
        let len = self.target.visible(&word.shape).len();
        let mut chosen = Vec::new();
        let mut from = 0;
        while let Some(c) = self.next_match(word, from, enabled) {
            let end = self.oriented_end(&c.target, len);
            from = if c.target.whole.nodes.is_empty() { end + 1 } else { end };
            chosen.push(c);
        }
        let mut applied = Vec::with_capacity(chosen.len());
        for Chosen { target, subrule, bindings } in &chosen {
            self.subrules[*subrule].apply(word, target, bindings)?;
            applied.push(*subrule);
        }
        Ok(applied)
    }
}
