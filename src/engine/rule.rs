//! The executor contract and rule cascades.
//!
//! ```text
//!   First    r1 ──► out? ──yes──► return
//!                    └─no─► r2 ──► ...
//!
//!   All      r1 ─┐
//!            r2 ─┼─► concatenate
//!            r3 ─┘
//!
//!   Linear   w ──► r1 ──► r2 ──► r3      (a rule that does not apply passes the word through)
//! ```
//!
//! A rule returning `Err` aborts only the branch it was working on. The cascade records a
//! `BranchAborted` event and carries on with the siblings.

use super::trace::{TraceEvent, Tracer};
use crate::error::MorphError;
use crate::word::{Word, remove_duplicates};

/// A compiled executor, one per rule and direction.
pub trait Rule: Send + Sync {
    fn name(&self) -> &str;

    /// Apply to `input` without mutating it. An empty result means the rule does not apply.
    fn apply(&self, input: &Word, trace: &mut dyn Tracer) -> Result<Vec<Word>, MorphError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CascadeMode {
    /// Stop after the first rule that produces output.
    First,
    /// Branch: every rule sees the input, outputs are concatenated.
    #[default]
    All,
    /// Feed each rule's output into the next.
    Linear,
}

pub struct RuleCascade {
    name: String,
    rules: Vec<Box<dyn Rule>>,
    mode: CascadeMode,
    keep_input: bool,
}

impl RuleCascade {
    pub fn new(name: impl Into<String>, rules: Vec<Box<dyn Rule>>, mode: CascadeMode) -> Self {
        Self { name: name.into(), rules, mode, keep_input: false }
    }

    /// Also return the unchanged input, which makes every rule optional. Analysis uses this.
    pub fn keep_input(mut self, keep: bool) -> Self {
        self.keep_input = keep;
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn try_rule(rule: &dyn Rule, input: &Word, trace: &mut dyn Tracer) -> Option<Vec<Word>> {
        match rule.apply(input, trace) {
            Ok(words) => Some(words),
            Err(err) => {
                debug_log!("cascade", "rule {} aborted a branch: {err}", rule.name());
                if trace.is_tracing() {
                    trace.record(TraceEvent::BranchAborted { rule: rule.name().to_string(), error: err.to_string() });
                }
                None
            }
        }
    }

    fn apply_linear(&self, input: &Word, trace: &mut dyn Tracer) -> Vec<Word> {
        let mut words = vec![input.clone()];
        for rule in &self.rules {
            let mut next = Vec::with_capacity(words.len());
            for word in words {
                match Self::try_rule(rule.as_ref(), &word, trace) {
                    Some(out) if !out.is_empty() => {
                        if self.keep_input {
                            next.push(word);
                        }
                        next.extend(out);
                    }
                    Some(_) => next.push(word),
                    None if self.keep_input => next.push(word),
                    None => {}
                }
            }
            words = if self.keep_input { remove_duplicates(next) } else { next };
        }
        words
    }
}

impl Rule for RuleCascade {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, input: &Word, trace: &mut dyn Tracer) -> Result<Vec<Word>, MorphError> {
        if self.mode == CascadeMode::Linear {
            return Ok(self.apply_linear(input, trace));
        }
        let mut out = Vec::new();
        for rule in &self.rules {
            let Some(words) = Self::try_rule(rule.as_ref(), input, trace) else {
                continue;
            };
            let produced = !words.is_empty();
            out.extend(words);
            if produced && self.mode == CascadeMode::First {
                break;
            }
        }
        if self.keep_input {
            out.push(input.clone());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::trace::{NoTrace, TraceKind, TraceLog};
    use crate::test_support::phonology;

    struct Append(&'static str, Vec<&'static str>);

    impl Rule for Append {
        fn name(&self) -> &str {
            self.0
        }

        fn apply(&self, input: &Word, _trace: &mut dyn Tracer) -> Result<Vec<Word>, MorphError> {
            Ok(self
                .1
                .iter()
                .map(|id| {
                    let mut w = input.derive();
                    w.push_allomorph(id);
                    w
                })
                .collect())
        }
    }

    struct Fails;

    impl Rule for Fails {
        fn name(&self) -> &str {
            "fails"
        }

        fn apply(&self, _input: &Word, _trace: &mut dyn Tracer) -> Result<Vec<Word>, MorphError> {
            Err(MorphError::UninstantiatedFeature { rule: "fails".into(), feature: "voice".into() })
        }
    }

    fn last_allomorphs(words: &[Word]) -> Vec<&str> {
        words.iter().map(|w| w.allomorphs().last().map(String::as_str).unwrap_or("")).collect()
    }

    #[test]
    fn first_mode_short_circuits() {
        let ph = phonology();
        let cascade = RuleCascade::new(
            "c",
            vec![Box::new(Append("a", vec![])), Box::new(Append("b", vec!["b"])), Box::new(Append("c", vec!["c"]))],
            CascadeMode::First,
        );
        let out = cascade.apply(&ph.word("bat"), &mut NoTrace).unwrap();
        assert_eq!(last_allomorphs(&out), vec!["b"]);
    }

    #[test]
    fn aborted_branches_do_not_stop_siblings() {
        let ph = phonology();
        let cascade = RuleCascade::new(
            "c",
            vec![Box::new(Append("a", vec!["a1", "a2"])), Box::new(Fails), Box::new(Append("c", vec!["c"]))],
            CascadeMode::All,
        );
        let mut log = TraceLog::new();
        let out = cascade.apply(&ph.word("bat"), &mut log).unwrap();
        assert_eq!(last_allomorphs(&out), vec!["a1", "a2", "c"]);
        assert_eq!(log.count(TraceKind::BranchAborted), 1);
    }

    #[test]
    fn linear_mode_passes_words_through_rules_that_do_not_apply() {
        let ph = phonology();
        let cascade = RuleCascade::new(
            "c",
            vec![Box::new(Append("a", vec!["a"])), Box::new(Append("none", vec![])), Box::new(Append("c", vec!["c"]))],
            CascadeMode::Linear,
        );
        let out = cascade.apply(&ph.word("bat"), &mut NoTrace).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].allomorphs(), ["bat", "a", "c"].map(String::from));
    }

    #[test]
    fn keep_input_returns_the_untouched_word() {
        let ph = phonology();
        let input = ph.word("bat");
        let cascade =
            RuleCascade::new("c", vec![Box::new(Append("a", vec!["a"]))], CascadeMode::All).keep_input(true);
        let out = cascade.apply(&input, &mut NoTrace).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1], input);
    }
}
