use crate::engine::{
    CascadeMode, NoTrace, PassMetrics, Rule, RuleCascade, RuleDef, RunMetrics, RunResult, Tracer,
    compile_analysis_rule, compile_synthesis_rule,
};
use crate::error::CompileError;
use crate::rules::AffixProcessAllomorph;
use crate::word::{Word, remove_duplicates};
use std::collections::HashMap;
use std::time::Instant;

/// Options that affect how rules are compiled.
#[derive(Debug, Clone)]
pub struct Options {
    /// Extra passes deletion analysis may take beyond the first, each re-inserting optional copies of
    /// the deleted material.
    pub deletion_reapplications: usize,
    /// Include word snapshots in trace events.
    pub trace_words: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self { deletion_reapplications: 0, trace_words: true }
    }
}

/// A fixed list of rules compiled in both directions.
///
/// This is a thin convenience pipeline, not a stratum driver: synthesis runs every rule once in
/// declared order, analysis runs them once in reverse order. Words must schedule their
/// morphological rules in the same order the rules are declared.
pub struct Morpher {
    options: Options,
    synthesis: Vec<RuleCascade>,
    analysis: Vec<RuleCascade>,
    /// Affix allomorphs by id, for the environment check on finished words.
    allomorphs: HashMap<String, AffixProcessAllomorph>,
}

impl Morpher {
    pub fn new(rules: Vec<RuleDef>, options: Options) -> Result<Self, CompileError> {
        let mut synthesis = Vec::with_capacity(rules.len());
        let mut analysis = Vec::with_capacity(rules.len());
        let mut allomorphs = HashMap::new();
        for def in &rules {
            // Each pass is a one-rule linear cascade so a rule that does not apply lets the word through.
            synthesis.push(RuleCascade::new(def.name(), vec![compile_synthesis_rule(def, &options)?], CascadeMode::Linear));
            analysis.push(
                RuleCascade::new(def.name(), vec![compile_analysis_rule(def, &options)?], CascadeMode::Linear)
                    .keep_input(true),
            );
            let defs = match def {
                RuleDef::AffixProcess(r) => r.allomorphs.as_slice(),
                RuleDef::Realizational(r) => r.allomorphs.as_slice(),
                _ => &[],
            };
            for allomorph in defs {
                allomorphs.insert(allomorph.id.clone(), allomorph.clone());
            }
        }
        analysis.reverse();
        debug_log!("morpher", "compiled rules={} allomorphs={}", rules.len(), allomorphs.len());
        Ok(Self { options, synthesis, analysis, allomorphs })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Rule names in synthesis order.
    pub fn rule_names(&self) -> Vec<&str> {
        self.synthesis.iter().map(|c| c.name()).collect()
    }

    /// Generate surface words from `input`.
    pub fn synthesize(&self, input: &Word) -> Vec<Word> {
        self.synthesize_with(input, &mut NoTrace)
    }

    pub fn synthesize_with(&self, input: &Word, trace: &mut dyn Tracer) -> Vec<Word> {
        let words = run(&self.synthesis, input, trace, None);
        self.finish_synthesis(words)
    }

    /// Like [`Morpher::synthesize_with`], with per-pass timing.
    pub fn synthesize_with_metrics(&self, input: &Word, trace: &mut dyn Tracer) -> RunResult {
        let total_start = Instant::now();
        let mut metrics = RunMetrics::default();
        let words = run(&self.synthesis, input, trace, Some(&mut metrics));
        let words = self.finish_synthesis(words);
        metrics.total = total_start.elapsed();
        RunResult { words, metrics }
    }

    /// Recover candidate underlying words from the surface word `input`. The input itself is always
    /// among the candidates.
    pub fn analyze(&self, input: &Word) -> Vec<Word> {
        self.analyze_with(input, &mut NoTrace)
    }

    pub fn analyze_with(&self, input: &Word, trace: &mut dyn Tracer) -> Vec<Word> {
        remove_duplicates(run(&self.analysis, input, trace, None))
    }

    /// Like [`Morpher::analyze_with`], with per-pass timing.
    pub fn analyze_with_metrics(&self, input: &Word, trace: &mut dyn Tracer) -> RunResult {
        let total_start = Instant::now();
        let mut metrics = RunMetrics::default();
        let words = remove_duplicates(run(&self.analysis, input, trace, Some(&mut metrics)));
        metrics.total = total_start.elapsed();
        RunResult { words, metrics }
    }

    fn finish_synthesis(&self, words: Vec<Word>) -> Vec<Word> {
        let total = words.len();
        let valid: Vec<Word> = words.into_iter().filter(|w| self.is_valid_surface(w)).collect();
        debug_log!("morpher", "synthesis candidates={} valid={}", total, valid.len());
        remove_duplicates(valid)
    }

    /// A finished word has used up its schedule, expresses its realizational features and obligatory
    /// features, and places every allomorph in one of its environments.
    fn is_valid_surface(&self, word: &Word) -> bool {
        word.current_rule().is_none()
            && word.realizational_fs.is_unifiable(&word.syntactic_fs)
            && word.obligatory_features().iter().all(|f| word.syntactic_fs.contains(f))
            && word.allomorphs().iter().all(|id| self.allomorphs.get(id).is_none_or(|a| a.is_word_valid(word)))
    }
}

/// Feed `input` through every pass in order.
fn run(passes: &[RuleCascade], input: &Word, trace: &mut dyn Tracer, mut metrics: Option<&mut RunMetrics>) -> Vec<Word> {
    let mut words = vec![input.clone()];
    for pass in passes {
        let start = metrics.is_some().then(Instant::now);
        let inputs = words.len();
        let mut next = Vec::with_capacity(inputs);
        for word in &words {
            // Linear cascades record branch aborts themselves and never fail.
            next.extend(pass.apply(word, trace).unwrap_or_default());
        }
        words = next;
        if let (Some(metrics), Some(start)) = (metrics.as_deref_mut(), start) {
            metrics.passes.push(PassMetrics {
                rule: pass.name().to_string(),
                duration: start.elapsed(),
                inputs,
                produced: words.len(),
            });
        }
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{TraceKind, TraceLog};
    use crate::pattern::{Pattern, PatternNode};
    use crate::rules::{
        AffixProcessRule, AllomorphEnvironment, CompoundingRule, CompoundingSubrule, Headedness, OutputAction,
        RewriteRule, RewriteSubrule,
    };
    use crate::test_support::{Phonology, phonology};

    fn suffix(ph: &Phonology, id: &str) -> AffixProcessAllomorph {
        AffixProcessAllomorph::new(
            id,
            vec![Pattern::named("stem", vec![PatternNode::repeat(ph.seg(""), 1, None)])],
            vec![OutputAction::copy("stem"), OutputAction::InsertShape(ph.shape(id))],
        )
    }

    /// Voice an obstruent before a voiced obstruent.
    fn voicing(ph: &Phonology) -> RewriteRule {
        RewriteRule::new(
            "voicing",
            ph.segs(&["-son"]),
            vec![RewriteSubrule::new(ph.segs(&["+voice"]), Pattern::default(), ph.segs(&["+voice -son"]))],
        )
    }

    fn scheduled(ph: &Phonology, text: &str, rules: &[&str]) -> Word {
        let mut word = ph.word(text);
        word.schedule_rules(rules);
        word
    }

    fn rendered(ph: &Phonology, words: &[Word]) -> Vec<String> {
        words.iter().map(|w| ph.render(&w.shape)).collect()
    }

    fn past_morpher(ph: &Phonology) -> Morpher {
        let past = AffixProcessRule::new("PAST", vec![suffix(ph, "d")]);
        Morpher::new(vec![past.into(), voicing(ph).into()], Options::default()).unwrap()
    }

    #[test]
    fn synthesis_feeds_morphology_into_phonology() {
        let ph = phonology();
        let morpher = past_morpher(&ph);
        assert_eq!(morpher.rule_names(), vec!["PAST", "voicing"]);
        let out = morpher.synthesize(&scheduled(&ph, "tas", &["PAST"]));
        assert_eq!(rendered(&ph, &out), vec!["tazd"]);
    }

    #[test]
    fn analysis_unwinds_in_reverse_order() {
        let ph = phonology();
        let morpher = past_morpher(&ph);
        let out = morpher.analyze(&Word::surface(ph.shape("tazd")));
        let forms = rendered(&ph, &out);
        assert_eq!(forms[0], "tazd");
        assert!(forms.contains(&"tas".to_string()), "{forms:?}");
        let stem = out.iter().find(|w| ph.render(&w.shape) == "tas").unwrap();
        assert!(stem.is_morphological_rule_applicable("PAST", false));
    }

    #[test]
    fn unfinished_schedules_are_not_surface_words() {
        let ph = phonology();
        let morpher = past_morpher(&ph);
        assert!(morpher.synthesize(&scheduled(&ph, "tas", &["PAST", "PL"])).is_empty());
    }

    #[test]
    fn obligatory_features_must_be_expressed() {
        let ph = phonology();
        let table = [(None, 0), (Some("+past"), 1)];
        for (out_fs, expected) in table {
            let mut past = AffixProcessRule::new("PAST", vec![suffix(&ph, "d")]);
            past.obligatory_features = vec!["past".to_string()];
            if let Some(notation) = out_fs {
                past.out_syntactic_fs = ph.fs(notation);
            }
            let morpher = Morpher::new(vec![past.into()], Options::default()).unwrap();
            assert_eq!(morpher.synthesize(&scheduled(&ph, "tas", &["PAST"])).len(), expected, "{out_fs:?}");
        }
    }

    #[test]
    fn compounds_must_express_their_obligatory_features() {
        let ph = phonology();
        let any = |name: &str| Pattern::named(name, vec![PatternNode::repeat(ph.seg(""), 1, None)]);
        let table = [(None, Vec::<&str>::new()), (Some("+past"), vec!["batmod"])];
        for (out_fs, expected) in table {
            let mut compound = CompoundingRule::new(
                "CMP",
                vec![CompoundingSubrule::concatenating(vec![any("head")], vec![any("nonhead")], Headedness::Left)],
            );
            compound.obligatory_features = vec!["past".to_string()];
            if let Some(notation) = out_fs {
                compound.out_syntactic_fs = ph.fs(notation);
            }
            let morpher = Morpher::new(vec![compound.into()], Options::default()).unwrap();
            let mut input = scheduled(&ph, "bat", &["CMP"]);
            input.non_head_unapplied(ph.word("mod"));
            assert_eq!(rendered(&ph, &morpher.synthesize(&input)), expected, "{out_fs:?}");
        }
    }

    #[test]
    fn allomorph_environments_filter_finished_words() {
        let ph = phonology();
        let mut voiceless = suffix(&ph, "s");
        voiceless.environments = vec![AllomorphEnvironment::new(ph.segs(&["-voice"]), Pattern::default())];
        let mut voiced = suffix(&ph, "z");
        voiced.environments = vec![AllomorphEnvironment::new(ph.segs(&["+voice"]), Pattern::default())];
        let plural = AffixProcessRule::new("PL", vec![voiceless, voiced]);
        let morpher = Morpher::new(vec![plural.into()], Options::default()).unwrap();

        let cases = [("bat", "bats"), ("mod", "modz")];
        for (stem, surface) in cases {
            let out = morpher.synthesize(&scheduled(&ph, stem, &["PL"]));
            assert_eq!(rendered(&ph, &out), vec![surface], "{stem}");
        }
    }

    #[test]
    fn metrics_cover_every_pass() {
        let ph = phonology();
        let morpher = past_morpher(&ph);
        let mut log = TraceLog::new();
        let run = morpher.synthesize_with_metrics(&scheduled(&ph, "tas", &["PAST"]), &mut log);
        assert_eq!(rendered(&ph, &run.words), vec!["tazd"]);
        let passes: Vec<(&str, usize, usize)> =
            run.metrics.passes.iter().map(|p| (p.rule.as_str(), p.inputs, p.produced)).collect();
        assert_eq!(passes, vec![("PAST", 1, 1), ("voicing", 1, 1)]);
        assert!(run.metrics.slowest().is_some());
        assert_eq!(log.count(TraceKind::MorphologicalRuleApplied), 1);
        assert_eq!(log.count(TraceKind::PhonologicalRuleApplied), 1);
    }

    #[test]
    fn compile_errors_stop_construction() {
        let ph = phonology();
        let empty = RewriteRule::new("empty", ph.segs(&["+cons"]), vec![]);
        assert_eq!(
            Morpher::new(vec![empty.into()], Options::default()).err().map(|e| e.to_string()),
            Some("rule `empty` has no allomorphs or subrules".to_string())
        );
    }
}
