//! Combinatory rules.
//!
//! Every rule maps one or two categories to at most one result:
//! - Binary rules: application, composition, word skipping, and the
//!   reversible application used to hypothesize missing children
//! - Unary rules: application type shifting and type raising
//! - The lexical rule, which attaches lexicon entries to token spans
//!
//! Binary rules are wrapped in [`CkyBinaryRule`] for the chart, which adds an
//! optional normal-form check over the children's derivation history.

pub mod application;
pub mod composition;
pub mod lexical;
pub mod normal_form;
pub mod reversible;
pub mod shifting;
pub mod skipping;

pub use application::Application;
pub use composition::Composition;
pub use lexical::{LexicalResult, LexicalRule};
pub use normal_form::{CkyBinaryRule, EisnerNormalForm, NormalFormValidator};
pub use reversible::ReversibleApplication;
pub use shifting::{ApplicationTypeShifting, TypeRaising};
pub use skipping::SkippingRule;

use crate::category::{Category, InvertibleSemantics, Semantics};
use indexmap::IndexSet;
use std::fmt;
use std::sync::Arc;

/// Separator between fused rule labels.
pub const RULE_ADD: &str = "+";

/// Label suffix of type-raising rules.
pub const TYPE_RAISING_LABEL: &str = "T";

/// Label of the lexical rule.
pub const LEXICAL_LABEL: &str = "lex";

/// Direction of a binary rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Forward => ">",
            Direction::Backward => "<",
        }
    }

    pub fn parse(s: &str) -> Option<Direction> {
        match s {
            ">" => Some(Direction::Forward),
            "<" => Some(Direction::Backward),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of a unary rule: a bare label.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UnaryRuleName {
    label: Arc<str>,
}

impl UnaryRuleName {
    pub fn new(label: &str) -> Self {
        UnaryRuleName {
            label: Arc::from(label),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for UnaryRuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// A rule name fused with the unary rule applied right after it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OverloadedRuleName {
    base: Box<RuleName>,
    unary: UnaryRuleName,
    label: Arc<str>,
}

impl OverloadedRuleName {
    pub fn base(&self) -> &RuleName {
        &self.base
    }

    pub fn unary(&self) -> &UnaryRuleName {
        &self.unary
    }
}

/// Structured rule identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RuleName {
    /// A binary or lexical rule: `(label, direction?, order)`.
    Base {
        label: Arc<str>,
        direction: Option<Direction>,
        order: usize,
    },
    Unary(UnaryRuleName),
    Overloaded(OverloadedRuleName),
}

impl RuleName {
    pub fn new(label: &str, direction: Option<Direction>, order: usize) -> Self {
        RuleName::Base {
            label: Arc::from(label),
            direction,
            order,
        }
    }

    pub fn directed(label: &str, direction: Direction) -> Self {
        Self::new(label, Some(direction), 0)
    }

    /// Name of steps that attach lexical entries.
    pub fn lexical() -> Self {
        Self::new(LEXICAL_LABEL, None, 0)
    }

    pub fn label(&self) -> &str {
        match self {
            RuleName::Base { label, .. } => label,
            RuleName::Unary(unary) => unary.label(),
            RuleName::Overloaded(overloaded) => &overloaded.label,
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        match self {
            RuleName::Base { direction, .. } => *direction,
            RuleName::Unary(_) => None,
            RuleName::Overloaded(overloaded) => overloaded.base.direction(),
        }
    }

    pub fn order(&self) -> usize {
        match self {
            RuleName::Base { order, .. } => *order,
            RuleName::Unary(_) => 0,
            RuleName::Overloaded(overloaded) => overloaded.base.order(),
        }
    }

    pub fn is_unary(&self) -> bool {
        matches!(self, RuleName::Unary(_))
    }

    pub fn is_overloaded(&self) -> bool {
        matches!(self, RuleName::Overloaded(_))
    }

    pub fn is_lexical(&self) -> bool {
        match self {
            RuleName::Base { label, .. } => label.as_ref() == LEXICAL_LABEL,
            RuleName::Overloaded(overloaded) => overloaded.base.is_lexical(),
            RuleName::Unary(_) => false,
        }
    }

    /// Fuse `unary` onto this name. Overloading is single-level, so an
    /// overloaded name returns `None`.
    pub fn overload(&self, unary: &UnaryRuleName) -> Option<RuleName> {
        if self.is_overloaded() {
            return None;
        }
        let label = format!("{}{}{}", self.label(), RULE_ADD, unary.label());
        Some(RuleName::Overloaded(OverloadedRuleName {
            base: Box::new(self.clone()),
            unary: unary.clone(),
            label: Arc::from(label),
        }))
    }
}

impl From<UnaryRuleName> for RuleName {
    fn from(name: UnaryRuleName) -> Self {
        RuleName::Unary(name)
    }
}

impl fmt::Display for RuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleName::Base {
                label,
                direction,
                order,
            } => {
                if let Some(direction) = direction {
                    write!(f, "{}", direction)?;
                }
                write!(f, "{}", label)?;
                if *order != 0 {
                    write!(f, "{}", order)?;
                }
                Ok(())
            }
            RuleName::Unary(unary) => write!(f, "{}", unary),
            RuleName::Overloaded(overloaded) => {
                write!(f, "{}{}{}", overloaded.base, RULE_ADD, overloaded.unary)
            }
        }
    }
}

/// Split a fused label into its parts.
pub fn split_rule_label(label: &str) -> Vec<&str> {
    label.split(RULE_ADD).collect()
}

/// Name of the type-raising rule in `direction`, e.g. `>T`.
pub fn type_raising_name(direction: Direction) -> UnaryRuleName {
    UnaryRuleName::new(&format!("{}{}", direction, TYPE_RAISING_LABEL))
}

/// Direction of a type-raising rule name.
pub fn type_raising_direction(name: &RuleName) -> Option<Direction> {
    match name {
        RuleName::Unary(unary) => unary
            .label()
            .strip_suffix(TYPE_RAISING_LABEL)
            .and_then(Direction::parse),
        _ => None,
    }
}

pub fn is_type_raising(name: &RuleName) -> bool {
    type_raising_direction(name).is_some()
}

/// A span of the sentence, with inclusive `end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SentenceSpan {
    pub start: usize,
    pub end: usize,
    pub sentence_length: usize,
}

impl SentenceSpan {
    pub fn new(start: usize, end: usize, sentence_length: usize) -> Self {
        debug_assert!(start <= end && end < sentence_length, "invalid span");
        SentenceSpan {
            start,
            end,
            sentence_length,
        }
    }

    pub fn is_start(&self) -> bool {
        self.start == 0
    }

    pub fn is_end(&self) -> bool {
        self.end + 1 == self.sentence_length
    }

    pub fn is_complete(&self) -> bool {
        self.is_start() && self.is_end()
    }

    /// Number of tokens covered.
    pub fn width(&self) -> usize {
        self.end - self.start + 1
    }
}

impl fmt::Display for SentenceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}-{}]", self.start, self.end)
    }
}

/// The output of a rule application.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ParseRuleResult<MR> {
    pub rule_name: RuleName,
    pub result: Category<MR>,
}

impl<MR: Semantics> ParseRuleResult<MR> {
    pub fn new(rule_name: RuleName, result: Category<MR>) -> Self {
        ParseRuleResult { rule_name, result }
    }
}

/// A rule combining two adjacent categories.
pub trait BinaryRule<MR: Semantics>: Send + Sync {
    fn apply(
        &self,
        left: &Category<MR>,
        right: &Category<MR>,
        span: &SentenceSpan,
    ) -> Option<ParseRuleResult<MR>>;

    fn name(&self) -> &RuleName;
}

/// A binary rule that can hypothesize a missing child from the other child
/// and the result.
pub trait ReversibleBinaryRule<MR: InvertibleSemantics>: BinaryRule<MR> {
    /// Candidate right children given the left child and the result.
    fn reverse_apply_left(
        &self,
        left: &Category<MR>,
        result: &Category<MR>,
        span: &SentenceSpan,
    ) -> IndexSet<Category<MR>>;

    /// Candidate left children given the right child and the result.
    fn reverse_apply_right(
        &self,
        right: &Category<MR>,
        result: &Category<MR>,
        span: &SentenceSpan,
    ) -> IndexSet<Category<MR>>;
}

/// A rule rewriting a single category.
///
/// `is_valid_argument` is a pre-filter: when it returns `false`, `apply`
/// must return `None`.
pub trait UnaryRule<MR: Semantics>: Send + Sync {
    fn apply(&self, category: &Category<MR>, span: &SentenceSpan) -> Option<ParseRuleResult<MR>>;

    fn is_valid_argument(&self, category: &Category<MR>, span: &SentenceSpan) -> bool;

    fn name(&self) -> &UnaryRuleName;
}
