//! Word skipping: an EMPTY category next to another category is absorbed.

use super::{BinaryRule, Direction, ParseRuleResult, RuleName, SentenceSpan};
use crate::category::{Category, CategoryServices, Semantics};

pub const SKIPPING_LABEL: &str = "skip";

/// `X EMPTY => X` (forward) and `EMPTY X => X` (backward).
#[derive(Debug, Clone)]
pub struct SkippingRule<MR> {
    name: RuleName,
    direction: Direction,
    empty: Category<MR>,
}

impl<MR: Semantics> SkippingRule<MR> {
    pub fn new(direction: Direction, services: &CategoryServices<MR>) -> Self {
        SkippingRule {
            name: RuleName::directed(SKIPPING_LABEL, direction),
            direction,
            empty: services.empty_category(),
        }
    }
}

impl<MR: Semantics> BinaryRule<MR> for SkippingRule<MR> {
    fn apply(
        &self,
        left: &Category<MR>,
        right: &Category<MR>,
        _span: &SentenceSpan,
    ) -> Option<ParseRuleResult<MR>> {
        let (skipped, kept) = match self.direction {
            Direction::Forward => (right, left),
            Direction::Backward => (left, right),
        };
        if skipped == &self.empty {
            Some(ParseRuleResult::new(self.name.clone(), kept.clone()))
        } else {
            None
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

    #[test]
    fn test_skipping() {
        let cs: CategoryServices<Term> = CategoryServices::new(Arc::new(SyntaxRegistry::new()));
        let span = SentenceSpan::new(0, 1, 2);
        let empty = cs.empty_category();
        let np = cs.read("NP : rex").unwrap();

        let backward = SkippingRule::new(Direction::Backward, &cs);
        let result = backward.apply(&empty, &np, &span).unwrap();
        assert_eq!(result.result, np);
        assert_eq!(result.rule_name.to_string(), "<skip");
        assert!(backward.apply(&np, &empty, &span).is_none());

        let forward = SkippingRule::new(Direction::Forward, &cs);
        assert_eq!(forward.apply(&np, &empty, &span).unwrap().result, np);
        assert!(forward.apply(&empty, &np, &span).is_none());
        assert!(forward.apply(&np, &np, &span).is_none());
    }
}
