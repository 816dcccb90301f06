//! Unary rules: application type shifting and type raising.

use super::{type_raising_name, Direction, ParseRuleResult, SentenceSpan, UnaryRule, UnaryRuleName};
use crate::category::{Category, CategoryServices, Semantics};
use crate::syntax::{Slash, Syntax};

/// Shift a category by applying a fixed function category to it.
#[derive(Debug, Clone)]
pub struct ApplicationTypeShifting<MR> {
    name: UnaryRuleName,
    function: Category<MR>,
    input_syntax: Syntax,
    services: CategoryServices<MR>,
    sentence_start_only: bool,
    sentence_end_only: bool,
    match_syntax: bool,
}

impl<MR: Semantics> ApplicationTypeShifting<MR> {
    /// Returns `None` unless `function` is complex with semantics.
    pub fn new(label: &str, function: Category<MR>, services: CategoryServices<MR>) -> Option<Self> {
        function.semantics()?;
        let input_syntax = function.syntax().right()?.clone();
        Some(ApplicationTypeShifting {
            name: UnaryRuleName::new(label),
            function,
            input_syntax,
            services,
            sentence_start_only: false,
            sentence_end_only: false,
            match_syntax: false,
        })
    }

    /// Only shift spans starting the sentence.
    pub fn start_only(mut self, value: bool) -> Self {
        self.sentence_start_only = value;
        self
    }

    /// Only shift spans ending the sentence.
    pub fn end_only(mut self, value: bool) -> Self {
        self.sentence_end_only = value;
        self
    }

    /// Only shift the complete sentence span.
    pub fn complete_only(self) -> Self {
        self.start_only(true).end_only(true)
    }

    /// Require the input syntax to equal the function's argument rather
    /// than unify with it.
    pub fn match_syntax(mut self, value: bool) -> Self {
        self.match_syntax = value;
        self
    }

    fn span_allowed(&self, span: &SentenceSpan) -> bool {
        (!self.sentence_start_only || span.is_start()) && (!self.sentence_end_only || span.is_end())
    }
}

impl<MR: Semantics> UnaryRule<MR> for ApplicationTypeShifting<MR> {
    fn apply(&self, category: &Category<MR>, span: &SentenceSpan) -> Option<ParseRuleResult<MR>> {
        if !self.span_allowed(span) {
            return None;
        }
        if self.match_syntax && &self.input_syntax != category.syntax() {
            return None;
        }
        let shifted = self.services.apply(&self.function, category)?;
        Some(ParseRuleResult::new(self.name.clone().into(), shifted))
    }

    fn is_valid_argument(&self, category: &Category<MR>, span: &SentenceSpan) -> bool {
        if !self.span_allowed(span) {
            return false;
        }
        if self.match_syntax {
            &self.input_syntax == category.syntax()
        } else {
            self.input_syntax.unifies_with(category.syntax())
        }
    }

    fn name(&self) -> &UnaryRuleName {
        &self.name
    }
}

/// Type raising `X => T/(T\X)` (forward) or `X => T\(T/X)` (backward) for a
/// fixed argument syntax `X` and result `T`.
#[derive(Debug, Clone)]
pub struct TypeRaising {
    name: UnaryRuleName,
    direction: Direction,
    inner_argument: Syntax,
    final_result: Syntax,
}

impl TypeRaising {
    pub fn new(direction: Direction, inner_argument: Syntax, final_result: Syntax) -> Self {
        TypeRaising {
            name: type_raising_name(direction),
            direction,
            inner_argument,
            final_result,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl<MR: Semantics> UnaryRule<MR> for TypeRaising {
    fn apply(&self, category: &Category<MR>, _span: &SentenceSpan) -> Option<ParseRuleResult<MR>> {
        let unification = self.inner_argument.unify(category.syntax())?;
        if unification.syntax.has_attribute_variable() && self.final_result.has_attribute_variable() {
            return None;
        }
        let raised = category.semantics()?.type_raise()?;
        let (outer, inner) = match self.direction {
            Direction::Forward => (Slash::Forward, Slash::Backward),
            Direction::Backward => (Slash::Backward, Slash::Forward),
        };
        let syntax = Syntax::complex(
            self.final_result.clone(),
            Syntax::complex(self.final_result.clone(), unification.syntax, inner),
            outer,
        );
        Some(ParseRuleResult::new(
            self.name.clone().into(),
            Category::new(syntax, Some(raised)),
        ))
    }

    fn is_valid_argument(&self, category: &Category<MR>, _span: &SentenceSpan) -> bool {
        category.semantics().is_some() && self.inner_argument.unifies_with(category.syntax())
    }

    fn name(&self) -> &UnaryRuleName {
        &self.name
    }
}
