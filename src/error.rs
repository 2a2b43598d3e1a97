//! Error types.
//!
//! The engine distinguishes three outcomes when a rule is tried:
//!
//! - *Inapplicable*: the rule does not apply. This is not an error at all; executors return an empty
//!   `Vec<Word>` and (optionally) record a `FailureReason` on the tracer.
//! - *Derivation-fatal*: a [`MorphError`] aborts the current derivation branch only. Cascades record it
//!   and keep going with sibling branches.
//! - *Definition errors*: a [`CompileError`] or [`FeatureError`] is raised while turning declarative
//!   rule data into executors, before any word is touched.

use thiserror::Error;

/// Raised while applying a compiled rule to a word.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MorphError {
    /// An output action needed a fully instantiated feature value but a variable was left unbound.
    #[error("rule `{rule}` left feature `{feature}` uninstantiated")]
    UninstantiatedFeature { rule: String, feature: String },
}

/// Raised while compiling a rule definition into an executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("rule `{rule}`: output action refers to unknown part `{part}`")]
    UnknownPart { rule: String, part: String },
    #[error("rule `{rule}`: part `{part}` is declared more than once")]
    DuplicatePart { rule: String, part: String },
    #[error("metathesis rule `{rule}`: group `{group}` is not a top-level group of the pattern")]
    MissingGroup { rule: String, group: String },
    #[error("metathesis rule `{rule}`: group `{group}` is declared more than once")]
    DuplicateGroup { rule: String, group: String },
    #[error("rule `{rule}` has no allomorphs or subrules")]
    Empty { rule: String },
}

/// Raised by the feature system while declaring features or parsing feature notation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeatureError {
    #[error("unknown feature `{0}`")]
    UnknownFeature(String),
    #[error("feature `{feature}` has no symbol `{symbol}`")]
    UnknownSymbol { feature: String, symbol: String },
    #[error("feature `{0}` is declared twice")]
    DuplicateFeature(String),
    #[error("feature `{0}` declares more than 64 symbols")]
    TooManySymbols(String),
    #[error("cannot parse feature token `{0}`")]
    InvalidToken(String),
}

/// Raised by the character definition table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("no character definition matches `{text}` at byte {position}")]
    UnknownSegment { text: String, position: usize },
    #[error("character table `{table}` cannot build its tokenizer: {reason}")]
    Tokenizer { table: String, reason: String },
    #[error(transparent)]
    Feature(#[from] FeatureError),
}
