//! Normal-form constraints on binary rules, checked against the derivation
//! history of the child cells.

use super::composition::{COMPOSITION_LABEL, CROSSING_COMPOSITION_LABEL};
use super::{BinaryRule, Direction, ParseRuleResult, RuleName, SentenceSpan};
use crate::category::Semantics;
use crate::cell::Cell;
use std::sync::Arc;

/// Decides whether a rule may combine two cells.
pub trait NormalFormValidator<MR: Semantics>: Send + Sync {
    fn is_valid(&self, left: &Cell<MR>, right: &Cell<MR>, rule: &RuleName) -> bool;
}

/// Eisner (1996) normal form for composition: the output of forward
/// composition may not be the primary of a forward rule, and symmetrically
/// for backward composition.
#[derive(Clone, Copy, Debug, Default)]
pub struct EisnerNormalForm;

fn is_composition(name: &RuleName, direction: Direction) -> bool {
    match name {
        RuleName::Base {
            label,
            direction: Some(d),
            ..
        } => {
            *d == direction
                && (label.as_ref() == COMPOSITION_LABEL || label.as_ref() == CROSSING_COMPOSITION_LABEL)
        }
        _ => false,
    }
}

fn built_by_composition<MR: Semantics>(cell: &Cell<MR>, direction: Direction) -> bool {
    cell.num_steps() > 0 && cell.steps().all(|step| is_composition(step.rule_name(), direction))
}

impl<MR: Semantics> NormalFormValidator<MR> for EisnerNormalForm {
    fn is_valid(&self, left: &Cell<MR>, right: &Cell<MR>, rule: &RuleName) -> bool {
        let label = rule.label();
        if rule.is_overloaded()
            || rule.is_unary()
            || (label != super::application::APPLICATION_LABEL
                && label != COMPOSITION_LABEL
                && label != CROSSING_COMPOSITION_LABEL)
        {
            return true;
        }
        match rule.direction() {
            Some(Direction::Forward) => !built_by_composition(left, Direction::Forward),
            Some(Direction::Backward) => !built_by_composition(right, Direction::Backward),
            None => true,
        }
    }
}

/// A binary rule as used by the chart: applied to cells, optionally gated
/// by a normal-form validator.
#[derive(Clone)]
pub struct CkyBinaryRule<MR: Semantics> {
    rule: Arc<dyn BinaryRule<MR>>,
    validator: Option<Arc<dyn NormalFormValidator<MR>>>,
}

impl<MR: Semantics> CkyBinaryRule<MR> {
    pub fn new(rule: Arc<dyn BinaryRule<MR>>) -> Self {
        CkyBinaryRule {
            rule,
            validator: None,
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn NormalFormValidator<MR>>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn name(&self) -> &RuleName {
        self.rule.name()
    }

    pub fn apply(
        &self,
        left: &Cell<MR>,
        right: &Cell<MR>,
        span: &SentenceSpan,
    ) -> Option<ParseRuleResult<MR>> {
        if let Some(validator) = &self.validator {
            if !validator.is_valid(left, right, self.rule.name()) {
                return None;
            }
        }
        self.rule.apply(left.category(), right.category(), span)
    }
}
