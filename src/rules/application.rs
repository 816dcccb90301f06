//! Forward and backward application.
//!
//! `X/Y Y => X` and `Y X\Y => X`.

use super::{BinaryRule, Direction, ParseRuleResult, RuleName, SentenceSpan};
use crate::category::{Category, CategoryServices, Semantics};
use crate::syntax::Slash;

pub const APPLICATION_LABEL: &str = "apply";

/// Function application in one direction.
#[derive(Debug, Clone)]
pub struct Application<MR> {
    name: RuleName,
    direction: Direction,
    services: CategoryServices<MR>,
}

impl<MR: Semantics> Application<MR> {
    pub fn new(direction: Direction, services: CategoryServices<MR>) -> Self {
        Application {
            name: RuleName::directed(APPLICATION_LABEL, direction),
            direction,
            services,
        }
    }

    pub fn forward(services: CategoryServices<MR>) -> Self {
        Self::new(Direction::Forward, services)
    }

    pub fn backward(services: CategoryServices<MR>) -> Self {
        Self::new(Direction::Backward, services)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn services(&self) -> &CategoryServices<MR> {
        &self.services
    }

    /// Apply `function` to `argument` if the function's slash points the
    /// way this rule consumes arguments.
    fn apply_function(
        &self,
        function: &Category<MR>,
        argument: &Category<MR>,
    ) -> Option<ParseRuleResult<MR>> {
        let expected = match self.direction {
            Direction::Forward => Slash::Forward,
            Direction::Backward => Slash::Backward,
        };
        if function.slash()? != expected {
            return None;
        }
        let result = self.services.apply(function, argument)?;
        Some(ParseRuleResult::new(self.name.clone(), result))
    }
}

impl<MR: Semantics> BinaryRule<MR> for Application<MR> {
    fn apply(
        &self,
        left: &Category<MR>,
        right: &Category<MR>,
        _span: &SentenceSpan,
    ) -> Option<ParseRuleResult<MR>> {
        match self.direction {
            Direction::Forward => self.apply_function(left, right),
            Direction::Backward => self.apply_function(right, left),
        }
    }

    fn name(&self) -> &RuleName {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SyntaxRegistry;
    use crate::term::Term;
    use std::sync::Arc;

    fn services() -> CategoryServices<Term> {
        CategoryServices::new(Arc::new(SyntaxRegistry::new()))
    }

    #[test]
    fn test_forward_application() {
        let cs = services();
        let rule = Application::forward(cs.clone());
        let span = SentenceSpan::new(0, 1, 3);
        let the = cs.read("NP/N : (lambda $0 (the $0))").unwrap();
        let dog = cs.read("N : dog").unwrap();
        let result = rule.apply(&the, &dog, &span).unwrap();
        assert_eq!(result.rule_name.to_string(), ">apply");
        assert_eq!(result.result, cs.read("NP : (the dog)").unwrap());
        assert!(rule.apply(&dog, &the, &span).is_none());
    }

    #[test]
    fn test_backward_application() {
        let cs = services();
        let rule = Application::backward(cs.clone());
        let span = SentenceSpan::new(0, 2, 3);
        let np = cs.read("NP : rex").unwrap();
        let barks = cs.read("S\\NP : (lambda $0 (bark $0))").unwrap();
        let result = rule.apply(&np, &barks, &span).unwrap();
        assert_eq!(result.rule_name.to_string(), "<apply");
        assert_eq!(result.result, cs.read("S : (bark rex)").unwrap());

        // A forward function is not consumed backward.
        let forward = cs.read("S/NP : (lambda $0 (bark $0))").unwrap();
        assert!(rule.apply(&np, &forward, &span).is_none());
    }
}
