//! Forward and backward composition, optionally crossed.
//!
//! First order: `X/Y Y/Z => X/Z` and `Y\Z X\Y => X\Z`. Crossed composition
//! lets the secondary lean the other way (`X/Y Y\Z => X\Z`). Higher orders
//! pass `order` arguments of the secondary through.

use super::{BinaryRule, Direction, ParseRuleResult, RuleName, SentenceSpan};
use crate::category::{Category, CategoryServices, Semantics};
use crate::syntax::Slash;
use tracing::trace;

pub const COMPOSITION_LABEL: &str = "comp";
pub const CROSSING_COMPOSITION_LABEL: &str = "xcomp";

/// Composition of a given order in one direction.
#[derive(Debug, Clone)]
pub struct Composition<MR> {
    name: RuleName,
    direction: Direction,
    order: usize,
    cross: bool,
    services: CategoryServices<MR>,
}

impl<MR: Semantics> Composition<MR> {
    /// Create a composition rule. `order` is at least 1 and crossing is
    /// only allowed at order 1; other settings are clamped to that.
    pub fn new(direction: Direction, order: usize, cross: bool, services: CategoryServices<MR>) -> Self {
        let order = order.max(1);
        let cross = cross && order == 1;
        let label = if cross {
            CROSSING_COMPOSITION_LABEL
        } else {
            COMPOSITION_LABEL
        };
        Composition {
            name: RuleName::new(label, Some(direction), order),
            direction,
            order,
            cross,
            services,
        }
    }

    pub fn forward(services: CategoryServices<MR>) -> Self {
        Self::new(Direction::Forward, 1, false, services)
    }

    pub fn backward(services: CategoryServices<MR>) -> Self {
        Self::new(Direction::Backward, 1, false, services)
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn is_crossing(&self) -> bool {
        self.cross
    }

    fn compose(&self, primary: &Category<MR>, secondary: &Category<MR>) -> Option<ParseRuleResult<MR>> {
        if !primary.is_complex() || !secondary.is_complex() {
            return None;
        }
        let expected = match self.direction {
            Direction::Forward => Slash::Forward,
            Direction::Backward => Slash::Backward,
        };
        if primary.slash()? != expected {
            return None;
        }
        let result = self.services.compose(primary, secondary, self.order, self.cross);
        trace!(rule = %self.name, %primary, %secondary, ok = result.is_some(), "composition");
        Some(ParseRuleResult::new(self.name.clone(), result?))
    }
}

impl<MR: Semantics> BinaryRule<MR> for Composition<MR> {
    fn apply(
        &self,
        left: &Category<MR>,
        right: &Category<MR>,
        _span: &SentenceSpan,
    ) -> Option<ParseRuleResult<MR>> {
        match self.direction {
            Direction::Forward => self.compose(left, right),
            Direction::Backward => self.compose(right, left),
        }
    }

    fn name(&self) -> &RuleName {
        &self.name
    }
}
