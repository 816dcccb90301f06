//! Derivation steps.
//!
//! A step is one way of deriving a category over a span: a rule applied to
//! zero (lexical), or one or two (binary) child cells. Its scores are fixed
//! at construction because children are always cells of already sealed,
//! strictly smaller spans.

use crate::category::{Category, Semantics};
use crate::cell::Cell;
use crate::lexicon::LexicalEntry;
use crate::model::{FeatureVector, Model};
use crate::rules::{LexicalResult, ParseRuleResult, RuleName};
use crate::semiring::{Count, LogReal, MaxPlus, Semiring};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;
use thiserror::Error;

/// Misuse of step overloading. These are programming errors and abort the
/// parse.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StepError {
    #[error("step {rule} is already overloaded")]
    AlreadyOverloaded { rule: String },
    #[error("rule {rule} is not unary and cannot overload a step")]
    NotUnary { rule: String },
}

pub type StepResult<T> = Result<T, StepError>;

#[derive(Debug)]
pub struct Step<MR> {
    root: Category<MR>,
    children: Vec<Rc<Cell<MR>>>,
    rule_name: RuleName,
    lexical_entry: Option<Arc<LexicalEntry<MR>>>,
    start: usize,
    end: usize,
    full_parse: bool,
    local_features: FeatureVector,
    local_score: f64,
    viterbi: MaxPlus,
    inside: LogReal,
    num_parses: Count,
    num_viterbi_parses: Count,
}

impl<MR: Semantics> Step<MR> {
    /// A step attaching a lexical entry to `[start, end]`.
    pub fn lexical(
        result: LexicalResult<MR>,
        start: usize,
        end: usize,
        full_parse: bool,
        model: &dyn Model<MR>,
    ) -> Self {
        let mut step = Self::unscored(
            result.category().clone(),
            result.rule_name().clone(),
            start,
            end,
            full_parse,
        );
        step.lexical_entry = Some(result.entry().clone());
        step.scored(model)
    }

    /// A step combining two adjacent cells.
    pub fn binary(
        result: ParseRuleResult<MR>,
        left: Rc<Cell<MR>>,
        right: Rc<Cell<MR>>,
        full_parse: bool,
        model: &dyn Model<MR>,
    ) -> Self {
        debug_assert_eq!(left.end() + 1, right.start(), "children must be adjacent");
        let mut step = Self::unscored(
            result.result,
            result.rule_name,
            left.start(),
            right.end(),
            full_parse,
        );
        step.children = vec![left, right];
        step.scored(model)
    }

    fn unscored(
        root: Category<MR>,
        rule_name: RuleName,
        start: usize,
        end: usize,
        full_parse: bool,
    ) -> Self {
        Step {
            root,
            children: Vec::new(),
            rule_name,
            lexical_entry: None,
            start,
            end,
            full_parse,
            local_features: FeatureVector::new(),
            local_score: 0.0,
            viterbi: MaxPlus::one(),
            inside: LogReal::one(),
            num_parses: Count::one(),
            num_viterbi_parses: Count::one(),
        }
    }

    fn scored(mut self, model: &dyn Model<MR>) -> Self {
        self.local_features = model.compute_features(&self);
        self.local_score = model.score(&self.local_features);
        let local = self.local_score;
        self.viterbi = MaxPlus::product(
            std::iter::once(MaxPlus::new(local)).chain(self.children.iter().map(|c| c.viterbi())),
        );
        self.inside = LogReal::product(
            std::iter::once(LogReal::new(local)).chain(self.children.iter().map(|c| c.inside())),
        );
        self.num_parses = Count::product(self.children.iter().map(|c| c.num_parses()));
        self.num_viterbi_parses =
            Count::product(self.children.iter().map(|c| c.num_viterbi_parses()));
        self
    }

    /// Replace the root by the output of a unary rule, fusing the rule
    /// names. Overloading is single-level.
    pub fn overload_with_unary(
        &self,
        unary: &ParseRuleResult<MR>,
        full_parse: bool,
        model: &dyn Model<MR>,
    ) -> StepResult<Step<MR>> {
        let unary_name = match &unary.rule_name {
            RuleName::Unary(name) => name,
            other => {
                return Err(StepError::NotUnary {
                    rule: other.to_string(),
                })
            }
        };
        let rule_name = self
            .rule_name
            .overload(unary_name)
            .ok_or_else(|| StepError::AlreadyOverloaded {
                rule: self.rule_name.to_string(),
            })?;
        let mut step = Self::unscored(
            unary.result.clone(),
            rule_name,
            self.start,
            self.end,
            full_parse,
        );
        step.lexical_entry = self.lexical_entry.clone();
        step.children = self.children.clone();
        Ok(step.scored(model))
    }

    pub fn root(&self) -> &Category<MR> {
        &self.root
    }

    pub fn children(&self) -> &[Rc<Cell<MR>>] {
        &self.children
    }

    pub fn rule_name(&self) -> &RuleName {
        &self.rule_name
    }

    pub fn lexical_entry(&self) -> Option<&Arc<LexicalEntry<MR>>> {
        self.lexical_entry.as_ref()
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn is_full_parse(&self) -> bool {
        self.full_parse
    }

    pub fn is_lexical(&self) -> bool {
        self.lexical_entry.is_some()
    }

    pub fn is_overloaded(&self) -> bool {
        self.rule_name.is_overloaded()
    }

    pub fn local_features(&self) -> &FeatureVector {
        &self.local_features
    }

    pub fn local_score(&self) -> f64 {
        self.local_score
    }

    /// Local score plus the Viterbi scores of the children.
    pub fn viterbi(&self) -> MaxPlus {
        self.viterbi
    }

    /// Local score plus the log inside scores of the children.
    pub fn inside(&self) -> LogReal {
        self.inside
    }

    pub fn num_parses(&self) -> Count {
        self.num_parses
    }

    pub fn num_viterbi_parses(&self) -> Count {
        self.num_viterbi_parses
    }
}

impl<MR: Semantics> PartialEq for Step<MR> {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start
            && self.end == other.end
            && self.full_parse == other.full_parse
            && self.rule_name == other.rule_name
            && self.root == other.root
            && self.lexical_entry == other.lexical_entry
            && self.children == other.children
    }
}

impl<MR: Semantics> Eq for Step<MR> {}

impl<MR: Semantics> Hash for Step<MR> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.start.hash(state);
        self.end.hash(state);
        self.rule_name.hash(state);
        self.root.hash(state);
        self.lexical_entry.hash(state);
        for child in &self.children {
            child.hash(state);
        }
    }
}

impl<MR: Semantics> fmt::Display for Step<MR> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}-{} :: {} :: {}", self.start, self.end, self.root, self.rule_name)?;
        for child in &self.children {
            write!(f, " [{}-{} {}]", child.start(), child.end(), child.category())?;
        }
        if let Some(entry) = &self.lexical_entry {
            write!(f, " {{{}}}", entry)?;
        }
        write!(f, " ; {}]", self.local_score)
    }
}
