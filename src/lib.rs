//! ccg-chart: a CKY chart parser for Combinatory Categorial Grammar.
//!
//! This crate provides:
//! - Syntactic categories with attributes and attribute variables
//! - Lambda-calculus semantics (`Term`) with beta reduction
//! - Lexicons read from `tokens :- category` lines
//! - Combinatory rules: application, composition, type shifting, type
//!   raising, word skipping and reversible application
//! - A beam-pruned CKY parser building a packed derivation forest, scored
//!   by a pluggable model (Viterbi, inside and parse counts per cell)

pub mod category;
pub mod cell;
pub mod chart;
pub mod lexicon;
pub mod model;
pub mod parser;
pub mod reader;
pub mod registry;
pub mod rules;
pub mod semiring;
pub mod step;
pub mod subst;
pub mod syntax;
pub mod term;


// Re-exports for convenience
pub use category::{Category, CategoryError, CategoryServices, InvertibleSemantics, Semantics};
pub use cell::Cell;
pub use chart::{BeamQueue, Chart, ChartStats};
pub use lexicon::{
    CompositeLexicon, ImmutableLexicon, LexicalEntry, Lexicon, LexiconError, MutableLexicon,
    SentenceLexiconGenerator, SkippingLexiconGenerator, TokenSeq,
};
pub use model::{FeatureSet, FeatureVector, LinearModel, Model, Pruner};
pub use parser::{
    CkyParser, CkyParserBuilder, Derivation, ParseOptions, ParseStats, ParserConfig, ParserError,
    ParserOutput,
};
pub use registry::SyntaxRegistry;
pub use rules::{
    BinaryRule, Direction, ParseRuleResult, ReversibleBinaryRule, RuleName, SentenceSpan,
    UnaryRule,
};
pub use semiring::{Count, LogReal, MaxPlus, Semiring};
pub use step::{Step, StepError};
pub use syntax::{Slash, Syntax, SyntaxError};
pub use term::Term;
