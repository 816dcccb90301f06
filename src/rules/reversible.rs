//! Reversible application.
//!
//! Given one child and the result of an application, hypothesize the other
//! child. The missing semantics is extracted through
//! [`InvertibleSemantics`]; the missing syntax is generated in several
//! forms:
//! 1. The literal form read off the known child and the result
//! 2. Attributes shared by both sides of a hypothesized function replaced
//!    by the attribute variable
//! 3. A simple argument's concrete attribute stripped
//! 4. For a hypothesized simple argument, each configured attribute added
//!
//! Every candidate is re-checked by forward application in debug builds.

use super::{
    Application, BinaryRule, Direction, ParseRuleResult, ReversibleBinaryRule, RuleName,
    SentenceSpan,
};
use crate::category::{Category, CategoryServices, InvertibleSemantics, Semantics};
use crate::syntax::{Slash, Syntax, VARIABLE_ATTRIBUTE};
use indexmap::IndexSet;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Application that can run backwards.
#[derive(Debug, Clone)]
pub struct ReversibleApplication<MR> {
    application: Application<MR>,
    max_subset_size: usize,
    depth_limit: usize,
    nf_constraint: bool,
    syntactic_attributes: Vec<Arc<str>>,
}

impl<MR: InvertibleSemantics> ReversibleApplication<MR> {
    pub fn new(
        direction: Direction,
        services: CategoryServices<MR>,
        max_subset_size: usize,
        depth_limit: usize,
        nf_constraint: bool,
        syntactic_attributes: &[&str],
    ) -> Self {
        info!(
            %direction,
            depth_limit,
            max_subset_size,
            ?syntactic_attributes,
            "init reversible application"
        );
        ReversibleApplication {
            application: Application::new(direction, services),
            max_subset_size,
            depth_limit,
            nf_constraint,
            syntactic_attributes: syntactic_attributes.iter().map(|a| Arc::from(*a)).collect(),
        }
    }

    fn services(&self) -> &CategoryServices<MR> {
        self.application.services()
    }

    fn is_forward(&self) -> bool {
        self.application.direction() == Direction::Forward
    }

    fn function_slash(&self) -> Slash {
        if self.is_forward() {
            Slash::Forward
        } else {
            Slash::Backward
        }
    }

    /// Re-run forward application and compare the result syntax.
    fn verify(
        &self,
        function: &Category<MR>,
        argument: &Category<MR>,
        result: &Category<MR>,
        span: &SentenceSpan,
    ) -> bool {
        let actual = if self.is_forward() {
            self.apply(function, argument, span)
        } else {
            self.apply(argument, function, span)
        };
        actual.is_some_and(|actual| actual.result.syntax() == result.syntax())
    }

    /// Hypothesize the function given its argument and the result.
    fn reverse_from_argument(
        &self,
        argument: &Category<MR>,
        result: &Category<MR>,
        span: &SentenceSpan,
    ) -> IndexSet<Category<MR>> {
        let mut categories = IndexSet::new();
        let (Some(argument_semantics), Some(result_semantics)) =
            (argument.semantics(), result.semantics())
        else {
            return categories;
        };
        let Some(function) = MR::application_function(
            result_semantics,
            argument_semantics,
            self.max_subset_size,
            self.depth_limit,
        ) else {
            return categories;
        };

        if self.nf_constraint {
            // A type-raised argument leaning back at the function would
            // create a spurious second derivation.
            let leans_back = match argument.slash() {
                Some(Slash::Backward) => self.is_forward(),
                Some(Slash::Forward) => !self.is_forward(),
                _ => false,
            };
            if leans_back && MR::application_argument(argument_semantics, result_semantics).is_some() {
                return categories;
            }
        }

        let registry = self.services().registry();
        let base = Syntax::complex(
            result.syntax().clone(),
            argument.syntax().clone(),
            self.function_slash(),
        );
        let mut forms = vec![base.clone()];
        if !base.has_attribute_variable() {
            let (Some(left), Some(right)) = (base.left(), base.right()) else {
                return categories;
            };
            let right_attributes = right.attributes();
            let variable: Arc<str> = Arc::from(VARIABLE_ATTRIBUTE);
            let mut mutual: Vec<Arc<str>> = left
                .attributes()
                .into_iter()
                .filter(|a| right_attributes.contains(a))
                .collect();
            mutual.sort();
            for attribute in mutual {
                if let Some(generalized) = registry.replace_attribute(&base, &attribute, Some(&variable)) {
                    forms.push(generalized);
                }
            }
        }
        if let Some(simple) = argument.syntax().as_simple() {
            if simple.attribute().is_some() && !simple.has_variable() {
                forms.push(Syntax::complex(
                    result.syntax().clone(),
                    Syntax::Simple(simple.strip_attribute()),
                    self.function_slash(),
                ));
            }
        }

        for syntax in forms {
            let candidate = Category::new(syntax, Some(function.clone()));
            debug_assert!(
                self.verify(&candidate, argument, result, span),
                "invalid reverse application from argument: argument={}, result={}, function={}",
                argument,
                result,
                candidate
            );
            categories.insert(candidate);
        }
        categories
    }

    /// Hypothesize the argument given the function and the result.
    fn reverse_from_function(
        &self,
        function: &Category<MR>,
        result: &Category<MR>,
        span: &SentenceSpan,
    ) -> IndexSet<Category<MR>> {
        let mut categories = IndexSet::new();
        let (Some(function_semantics), Some(result_semantics)) =
            (function.semantics(), result.semantics())
        else {
            return categories;
        };
        let Some(complex) = function.syntax().as_complex() else {
            return categories;
        };
        if complex.slash() != self.function_slash() {
            return categories;
        }

        let result_syntax = result.syntax();
        let (base, variable_set) = if complex.left() == result_syntax {
            (complex.right().clone(), false)
        } else if complex.right().has_attribute_variable()
            && complex.left().has_attribute_variable()
            && is_valid_syntax_transformation(result_syntax, complex.left())
        {
            let assignment = complex
                .left()
                .unify(result_syntax)
                .and_then(|unification| unification.assignment);
            let Some(assignment) = assignment else {
                return categories;
            };
            match self
                .services()
                .registry()
                .set_variable(complex.right(), Some(&assignment))
            {
                Some(syntax) => (syntax, true),
                None => {
                    debug!(%function, %result, "variable setting failed");
                    return categories;
                }
            }
        } else {
            return categories;
        };

        let mut forms = vec![base.clone()];
        if !variable_set {
            match &base {
                Syntax::Complex(inner) => {
                    if let Some(simple) = inner.right().as_simple() {
                        if simple.attribute().is_some() && !simple.has_variable() {
                            forms.push(Syntax::complex(
                                inner.left().clone(),
                                Syntax::Simple(simple.strip_attribute()),
                                inner.slash(),
                            ));
                        }
                    }
                }
                Syntax::Simple(simple) => {
                    if simple.attribute().is_none() {
                        let registry = self.services().registry();
                        for attribute in &self.syntactic_attributes {
                            if let Some(cloned) = registry.clone_with_attribute(simple, attribute) {
                                forms.push(Syntax::Simple(cloned));
                            }
                        }
                    }
                }
            }
        }

        let Some(argument) = MR::application_argument(function_semantics, result_semantics) else {
            return categories;
        };
        for syntax in forms {
            let candidate = Category::new(syntax, Some(argument.clone()));
            debug_assert!(
                self.verify(function, &candidate, result, span),
                "invalid reverse application from function: function={}, result={}, argument={}",
                function,
                result,
                candidate
            );
            categories.insert(candidate);
        }
        categories
    }
}

/// Whether `function_yield` can produce `result` once its attribute
/// variable is set.
fn is_valid_syntax_transformation(result: &Syntax, function_yield: &Syntax) -> bool {
    match (result, function_yield) {
        (Syntax::Complex(r), Syntax::Complex(f)) => {
            r.slash() == f.slash()
                && is_valid_syntax_transformation(r.left(), f.left())
                && is_valid_syntax_transformation(r.right(), f.right())
        }
        (Syntax::Simple(_), Syntax::Simple(f)) => result == function_yield || f.has_variable(),
        _ => false,
    }
}

impl<MR: InvertibleSemantics> BinaryRule<MR> for ReversibleApplication<MR> {
    fn apply(
        &self,
        left: &Category<MR>,
        right: &Category<MR>,
        span: &SentenceSpan,
    ) -> Option<ParseRuleResult<MR>> {
        self.application.apply(left, right, span)
    }

    fn name(&self) -> &RuleName {
        self.application.name()
    }
}

impl<MR: InvertibleSemantics> ReversibleBinaryRule<MR> for ReversibleApplication<MR> {
    fn reverse_apply_left(
        &self,
        left: &Category<MR>,
        result: &Category<MR>,
        span: &SentenceSpan,
    ) -> IndexSet<Category<MR>> {
        if self.is_forward() {
            self.reverse_from_function(left, result, span)
        } else {
            self.reverse_from_argument(left, result, span)
        }
    }

    fn reverse_apply_right(
        &self,
        right: &Category<MR>,
        result: &Category<MR>,
        span: &SentenceSpan,
    ) -> IndexSet<Category<MR>> {
        if self.is_forward() {
            self.reverse_from_argument(right, result, span)
        } else {
            self.reverse_from_function(right, result, span)
        }
    }
}

/// Sorted attributes appearing in `categories`, for callers that build the
/// attribute list of a reversible rule from a lexicon.
pub fn collect_attributes<'a, MR: Semantics + 'a>(
    categories: impl IntoIterator<Item = &'a Category<MR>>,
) -> Vec<Arc<str>> {
    let mut attributes: FxHashSet<Arc<str>> = FxHashSet::default();
    for category in categories {
        attributes.extend(category.syntax().attributes());
    }
    let mut sorted: Vec<_> = attributes.into_iter().collect();
    sorted.sort();
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SyntaxRegistry;
    use crate::term::Term;

    fn services() -> CategoryServices<Term> {
        CategoryServices::new(Arc::new(SyntaxRegistry::new()))
    }

    fn forward(cs: &CategoryServices<Term>, attributes: &[&str]) -> ReversibleApplication<Term> {
        ReversibleApplication::new(Direction::Forward, cs.clone(), 3, 5, false, attributes)
    }

    #[test]
    fn test_reverse_apply_right_round_trip() {
        let cs = services();
        let rule = forward(&cs, &[]);
        let span = SentenceSpan::new(0, 1, 2);
        let function = cs.read("S/NP : (lambda $0 (bark $0))").unwrap();
        let argument = cs.read("NP : rex").unwrap();
        let result = rule.apply(&function, &argument, &span).unwrap().result;

        let functions = rule.reverse_apply_right(&argument, &result, &span);
        assert!(functions.iter().any(|f| f.equals_no_sem(&function)));
        assert!(functions.contains(&function));
    }

    #[test]
    fn test_reverse_apply_left_round_trip() {
        let cs = services();
        let rule = forward(&cs, &[]);
        let span = SentenceSpan::new(0, 1, 2);
        let function = cs.read("S/NP : (lambda $0 (bark $0))").unwrap();
        let argument = cs.read("NP : rex").unwrap();
        let result = rule.apply(&function, &argument, &span).unwrap().result;

        let arguments = rule.reverse_apply_left(&function, &result, &span);
        assert_eq!(arguments.len(), 1);
        assert!(arguments.contains(&argument));
    }

    #[test]
    fn test_backward_reverse() {
        let cs = services();
        let rule = ReversibleApplication::new(Direction::Backward, cs.clone(), 3, 5, false, &[]);
        let span = SentenceSpan::new(0, 1, 2);
        let argument = cs.read("NP : rex").unwrap();
        let function = cs.read("S\\NP : (lambda $0 (bark $0))").unwrap();
        let result = rule.apply(&argument, &function, &span).unwrap().result;

        let functions = rule.reverse_apply_left(&argument, &result, &span);
        assert!(functions.iter().any(|f| f.equals_no_sem(&function)));
        let arguments = rule.reverse_apply_right(&function, &result, &span);
        assert!(arguments.contains(&argument));
    }

    #[test]
    fn test_reverse_generalizes_attributes() {
        let cs = services();
        let rule = forward(&cs, &[]);
        let span = SentenceSpan::new(0, 1, 2);
        let argument = cs.read("NP[pl] : dogs").unwrap();
        let result = cs.read("S[pl] : (bark dogs)").unwrap();
        let functions = rule.reverse_apply_right(&argument, &result, &span);
        let syntaxes: Vec<String> = functions.iter().map(|f| f.syntax().to_string()).collect();
        assert!(syntaxes.contains(&"S[pl]/NP[pl]".to_string()));
        assert!(syntaxes.contains(&"S[x]/NP[x]".to_string()));
        assert!(syntaxes.contains(&"S[pl]/NP".to_string()));
    }

    #[test]
    fn test_reverse_adds_syntactic_attributes() {
        let cs = services();
        let rule = forward(&cs, &["pl", "sg"]);
        let span = SentenceSpan::new(0, 1, 2);
        let function = cs.read("S/NP : (lambda $0 (bark $0))").unwrap();
        let result = cs.read("S : (bark rex)").unwrap();
        let arguments = rule.reverse_apply_left(&function, &result, &span);
        let syntaxes: Vec<String> = arguments.iter().map(|a| a.syntax().to_string()).collect();
        assert_eq!(syntaxes, vec!["NP", "NP[pl]", "NP[sg]"]);
    }

    #[test]
    fn test_reverse_from_function_with_variable() {
        let cs = services();
        let rule = forward(&cs, &[]);
        let span = SentenceSpan::new(0, 1, 2);
        let function = cs.read("S[x]/NP[x] : (lambda $0 (bark $0))").unwrap();
        let result = cs.read("S[pl] : (bark dogs)").unwrap();
        let arguments = rule.reverse_apply_left(&function, &result, &span);
        assert_eq!(arguments.len(), 1);
        assert_eq!(arguments[0].to_string(), "NP[pl] : dogs");
    }

    #[test]
    fn test_reverse_requires_semantics() {
        let cs = services();
        let rule = forward(&cs, &[]);
        let span = SentenceSpan::new(0, 1, 2);
        let argument = cs.read("NP").unwrap();
        let result = cs.read("S : (bark rex)").unwrap();
        assert!(rule.reverse_apply_right(&argument, &result, &span).is_empty());
    }

    #[test]
    fn test_nf_constraint_blocks_backward_leaning_argument() {
        let cs = services();
        let span = SentenceSpan::new(0, 1, 2);
        // The argument could itself consume the hypothesized function.
        let argument = cs.read("S\\NP : (lambda $0 (g $0))").unwrap();
        let result = cs.read("S : (g (lambda $0 (g $0)))").unwrap();

        let unconstrained = forward(&cs, &[]);
        let functions = unconstrained.reverse_apply_right(&argument, &result, &span);
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].syntax().to_string(), "S/(S\\NP)");

        let constrained = ReversibleApplication::new(Direction::Forward, cs.clone(), 3, 5, true, &[]);
        assert!(constrained
            .reverse_apply_right(&argument, &result, &span)
            .is_empty());
    }

    #[test]
    fn test_collect_attributes() {
        let cs = services();
        let categories = vec![
            cs.read("S[dcl]\\NP[pl] : (lambda $0 (bark $0))").unwrap(),
            cs.read("NP[sg] : rex").unwrap(),
        ];
        let attributes = collect_attributes(&categories);
        let names: Vec<&str> = attributes.iter().map(|a| a.as_ref()).collect();
        assert_eq!(names, vec!["dcl", "pl", "sg"]);
    }
}
