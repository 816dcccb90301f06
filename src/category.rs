//! Categories: a syntax paired with an optional semantics.
//!
//! The semantics type is opaque to the chart. Anything implementing
//! [`Semantics`] can be parsed; reversible rules additionally need
//! [`InvertibleSemantics`]. [`CategoryServices`] implements the two
//! combinators every binary rule is built from:
//!
//! 1. `apply(function, argument)`: unify the function's argument syntax with
//!    the argument, propagate the variable binding into the yield, apply the
//!    semantics.
//! 2. `compose(primary, secondary, order, cross)`: descend `order` levels
//!    into the secondary, unify the primary's argument with what is left,
//!    then rebuild the secondary's arguments around the primary's yield.

use crate::registry::SyntaxRegistry;
use crate::syntax::{Slash, Syntax, SyntaxError};
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

/// Opaque meaning representation carried by categories.
pub trait Semantics: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Parse a semantics string.
    fn read(input: &str) -> Result<Self, Self::Error>;

    /// Apply `self` as a function to `argument`. `None` when undefined.
    fn apply(&self, argument: &Self) -> Option<Self>;

    /// Compose `self` with `secondary`, abstracting over `order` arguments.
    fn compose(&self, secondary: &Self, order: usize) -> Option<Self>;

    /// Type-raise `self`. Semantics without a raising operation return `None`.
    fn type_raise(&self) -> Option<Self> {
        None
    }
}

/// Semantics that can undo application, needed by reversible rules.
pub trait InvertibleSemantics: Semantics {
    /// Find `f` with `f(argument) == result`. `max_subset_size` bounds the
    /// number of grouped literal arguments extracted together and
    /// `depth_limit` the depth of extracted sub-expressions.
    fn application_function(
        result: &Self,
        argument: &Self,
        max_subset_size: usize,
        depth_limit: usize,
    ) -> Option<Self>;

    /// Find `a` with `function(a) == result`.
    fn application_argument(function: &Self, result: &Self) -> Option<Self>;
}

/// Errors raised while reading categories.
#[derive(Debug, Error)]
pub enum CategoryError {
    #[error("invalid syntax in category {input:?}: {source}")]
    Syntax {
        input: String,
        #[source]
        source: SyntaxError,
    },
    #[error("invalid semantics in category {input:?}: {source}")]
    Semantics {
        input: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Result type for category operations.
pub type CategoryResult<T> = Result<T, CategoryError>;

/// A syntactic category with optional semantics. `None` semantics marks an
/// unrealized meaning, e.g. the EMPTY category of a skipped word.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Category<MR> {
    syntax: Syntax,
    semantics: Option<MR>,
}

impl<MR: Semantics> Category<MR> {
    pub fn new(syntax: Syntax, semantics: Option<MR>) -> Self {
        Category { syntax, semantics }
    }

    pub fn syntax(&self) -> &Syntax {
        &self.syntax
    }

    pub fn semantics(&self) -> Option<&MR> {
        self.semantics.as_ref()
    }

    pub fn is_complex(&self) -> bool {
        self.syntax.is_complex()
    }

    /// The outer slash of a complex category.
    pub fn slash(&self) -> Option<Slash> {
        self.syntax.slash()
    }

    /// Structural equality of the syntax alone.
    pub fn equals_no_sem(&self, other: &Category<MR>) -> bool {
        self.syntax == other.syntax
    }

    /// Whether the syntaxes unify, ignoring semantics.
    pub fn matches_no_sem(&self, other: &Category<MR>) -> bool {
        self.syntax.unifies_with(&other.syntax)
    }

    pub fn clone_with_new_semantics(&self, semantics: Option<MR>) -> Self {
        Category {
            syntax: self.syntax.clone(),
            semantics,
        }
    }
}

impl<MR: Semantics> fmt::Display for Category<MR> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.semantics {
            Some(semantics) => write!(f, "{} : {}", self.syntax, semantics),
            None => write!(f, "{}", self.syntax),
        }
    }
}

/// Category combinators and parsing over a shared syntax registry.
#[derive(Debug)]
pub struct CategoryServices<MR> {
    registry: Arc<SyntaxRegistry>,
    _semantics: PhantomData<fn() -> MR>,
}

impl<MR> Clone for CategoryServices<MR> {
    fn clone(&self) -> Self {
        CategoryServices {
            registry: self.registry.clone(),
            _semantics: PhantomData,
        }
    }
}

impl<MR: Semantics> CategoryServices<MR> {
    pub fn new(registry: Arc<SyntaxRegistry>) -> Self {
        CategoryServices {
            registry,
            _semantics: PhantomData,
        }
    }

    pub fn registry(&self) -> &SyntaxRegistry {
        &self.registry
    }

    pub fn shared_registry(&self) -> Arc<SyntaxRegistry> {
        self.registry.clone()
    }

    /// The EMPTY category with no semantics.
    pub fn empty_category(&self) -> Category<MR> {
        Category::new(self.registry.empty(), None)
    }

    /// Apply a complex `function` to `argument`.
    pub fn apply(&self, function: &Category<MR>, argument: &Category<MR>) -> Option<Category<MR>> {
        let function_semantics = function.semantics()?;
        let argument_semantics = argument.semantics()?;
        let complex = function.syntax().as_complex()?;
        if complex.slash() == Slash::Vertical {
            return None;
        }
        let unification = complex.right().unify(argument.syntax())?;
        let syntax = self
            .registry
            .set_variable(complex.left(), unification.assignment.as_ref())?;
        let semantics = function_semantics.apply(argument_semantics)?;
        Some(Category::new(syntax, Some(semantics)))
    }

    /// Compose `primary` with `secondary` at the given order (at least 1).
    /// Crossing is only defined for first-order composition.
    pub fn compose(
        &self,
        primary: &Category<MR>,
        secondary: &Category<MR>,
        order: usize,
        cross: bool,
    ) -> Option<Category<MR>> {
        debug_assert!(order > 0, "composition order must be at least 1");
        debug_assert!(!cross || order == 1, "crossing only at order 1");
        if order == 0 || (cross && order != 1) {
            return None;
        }
        let primary_complex = primary.syntax().as_complex()?;
        let primary_slash = primary_complex.slash();
        if primary_slash == Slash::Vertical {
            return None;
        }
        let primary_semantics = primary.semantics()?;
        let secondary_semantics = secondary.semantics()?;

        let mut arguments = Vec::with_capacity(order);
        let mut current = secondary.syntax();
        for _ in 0..order {
            let complex = current.as_complex()?;
            arguments.push((complex.right().clone(), complex.slash()));
            current = complex.left();
        }

        if order == 1 {
            let secondary_slash = arguments[0].1;
            if secondary_slash == Slash::Vertical {
                return None;
            }
            if cross == (primary_slash == secondary_slash) {
                return None;
            }
        }

        let unification = primary_complex.right().unify(current)?;
        let yield_syntax = self
            .registry
            .set_variable(primary_complex.left(), unification.assignment.as_ref())?;
        let semantics = primary_semantics.compose(secondary_semantics, order)?;
        let syntax = arguments
            .into_iter()
            .rev()
            .fold(yield_syntax, |acc, (argument, slash)| Syntax::complex(acc, argument, slash));
        Some(Category::new(syntax, Some(semantics)))
    }

    /// Read a category of the form `SYNTAX : semantics`. Without a colon the
    /// semantics is `None`.
    pub fn read(&self, input: &str) -> CategoryResult<Category<MR>> {
        let trimmed = input.trim();
        let (syntax_str, semantics) = match trimmed.find(':') {
            Some(colon) => (
                &trimmed[..colon],
                Some(self.read_semantics(trimmed[colon + 1..].trim())?),
            ),
            None => (trimmed, None),
        };
        let syntax = self
            .registry
            .read(syntax_str)
            .map_err(|source| CategoryError::Syntax {
                input: input.to_string(),
                source,
            })?;
        Ok(Category::new(syntax, semantics))
    }

    pub fn read_semantics(&self, input: &str) -> CategoryResult<MR> {
        MR::read(input).map_err(|source| CategoryError::Semantics {
            input: input.to_string(),
            source: Box::new(source),
        })
    }
}
