//! Trace sinks.
//!
//! Rules report what they did through a [`Tracer`] passed explicitly into `apply`. The default sink,
//! [`NoTrace`], drops everything; [`TraceLog`] keeps every event for inspection.
//!
//! Executors build events only when `is_tracing()` is true, so the hot path never clones words for
//! snapshots nobody reads.

use crate::word::Word;

/// Gate that rejected a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    MaxApplicationCount,
    RequiredSyntacticFeatureStruct,
    HeadRequiredSyntacticFeatureStruct,
    NonHeadRequiredSyntacticFeatureStruct,
    RequiredMprFeatures,
    ExcludedMprFeatures,
    Pattern,
    HeadPattern,
    NonHeadPattern,
    RealizationalFeatureStruct,
    NoNonHead,
    NotCurrentRule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceKind {
    MorphologicalRuleApplied,
    MorphologicalRuleNotApplied,
    MorphologicalRuleUnapplied,
    MorphologicalRuleNotUnapplied,
    PhonologicalRuleApplied,
    PhonologicalRuleNotApplied,
    PhonologicalRuleUnapplied,
    PhonologicalRuleNotUnapplied,
    Blocked,
    BranchAborted,
}

/// One observation. Word snapshots are `None` when the rule was compiled with `trace_words` off.
#[derive(Debug, Clone)]
pub enum TraceEvent {
    MorphologicalRuleApplied { rule: String, allomorph: usize, input: Option<Word>, output: Option<Word> },
    MorphologicalRuleNotApplied { rule: String, allomorph: Option<usize>, reason: FailureReason, input: Option<Word> },
    MorphologicalRuleUnapplied { rule: String, allomorph: usize, input: Option<Word>, output: Option<Word> },
    MorphologicalRuleNotUnapplied { rule: String, reason: FailureReason, input: Option<Word> },
    PhonologicalRuleApplied { rule: String, subrule: usize, input: Option<Word>, output: Option<Word> },
    PhonologicalRuleNotApplied { rule: String, subrule: usize, reason: FailureReason, input: Option<Word> },
    PhonologicalRuleUnapplied { rule: String, subrule: usize, input: Option<Word>, output: Option<Word> },
    PhonologicalRuleNotUnapplied { rule: String, reason: FailureReason, input: Option<Word> },
    Blocked { rule: String, output: Option<Word> },
    BranchAborted { rule: String, error: String },
}

impl TraceEvent {
    pub fn kind(&self) -> TraceKind {
        match self {
            TraceEvent::MorphologicalRuleApplied { .. } => TraceKind::MorphologicalRuleApplied,
            TraceEvent::MorphologicalRuleNotApplied { .. } => TraceKind::MorphologicalRuleNotApplied,
            TraceEvent::MorphologicalRuleUnapplied { .. } => TraceKind::MorphologicalRuleUnapplied,
            TraceEvent::MorphologicalRuleNotUnapplied { .. } => TraceKind::MorphologicalRuleNotUnapplied,
            TraceEvent::PhonologicalRuleApplied { .. } => TraceKind::PhonologicalRuleApplied,
            TraceEvent::PhonologicalRuleNotApplied { .. } => TraceKind::PhonologicalRuleNotApplied,
            TraceEvent::PhonologicalRuleUnapplied { .. } => TraceKind::PhonologicalRuleUnapplied,
            TraceEvent::PhonologicalRuleNotUnapplied { .. } => TraceKind::PhonologicalRuleNotUnapplied,
            TraceEvent::Blocked { .. } => TraceKind::Blocked,
            TraceEvent::BranchAborted { .. } => TraceKind::BranchAborted,
        }
    }

    /// The failure reason carried by "not applied" events.
    pub fn reason(&self) -> Option<FailureReason> {
        match self {
            TraceEvent::MorphologicalRuleNotApplied { reason, .. }
            | TraceEvent::MorphologicalRuleNotUnapplied { reason, .. }
            | TraceEvent::PhonologicalRuleNotApplied { reason, .. }
            | TraceEvent::PhonologicalRuleNotUnapplied { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

pub trait Tracer {
    fn is_tracing(&self) -> bool;
    fn record(&mut self, event: TraceEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTrace;

impl Tracer for NoTrace {
    fn is_tracing(&self) -> bool {
        false
    }

    fn record(&mut self, _event: TraceEvent) {}
}

/// Collects events in order.
#[derive(Debug, Default, Clone)]
pub struct TraceLog {
    events: Vec<TraceEvent>,
}

impl TraceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn count(&self, kind: TraceKind) -> usize {
        self.events.iter().filter(|e| e.kind() == kind).count()
    }

    /// Failure reasons recorded so far, in order.
    pub fn reasons(&self) -> Vec<FailureReason> {
        self.events.iter().filter_map(TraceEvent::reason).collect()
    }
}

impl Tracer for TraceLog {
    fn is_tracing(&self) -> bool {
        true
    }

    fn record(&mut self, event: TraceEvent) {
        self.events.push(event);
    }
}

/// Word snapshot for an event, honouring the `trace_words` option.
pub(crate) fn snapshot(word: &Word, trace_words: bool) -> Option<Word> {
    trace_words.then(|| word.clone())
}
