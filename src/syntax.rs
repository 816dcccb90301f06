//! Syntactic types and attribute unification.
//!
//! A syntax is either simple (`NP`, `S[dcl]`) or complex (`S\NP`, `(S\NP)/NP`).
//! Simple syntax may carry one attribute; the attribute `x` is a variable
//! that unification binds. A single unification call records at most one
//! binding per side, so `S[x]\NP[x]` can only agree on one value of `x`.

use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// The reserved attribute that acts as a unification variable.
pub const VARIABLE_ATTRIBUTE: &str = "x";

/// Reserved word; never a legal attribute in syntax strings.
pub const NO_ATTRIBUTE: &str = "none";

/// Errors raised while reading or registering syntax.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    #[error("unknown syntax name: {0}")]
    UnknownName(String),
    #[error("'none' is a reserved word: {0}")]
    ReservedAttribute(String),
    #[error("invalid attribute placement: {0}")]
    InvalidAttributePlacement(String),
    #[error("invalid syntax: {0}")]
    Invalid(String),
    #[error("no outer slash found in {0}")]
    NoOuterSlash(String),
    #[error("syntax label already registered: {0}")]
    AlreadyRegistered(String),
}

/// Result type for syntax operations.
pub type SyntaxResult<T> = Result<T, SyntaxError>;

/// Direction of a complex syntax.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Slash {
    /// `/`: argument to the right.
    Forward,
    /// `\`: argument to the left.
    Backward,
    /// `|`: either side, never used by application.
    Vertical,
}

impl Slash {
    pub fn from_char(c: char) -> Option<Slash> {
        match c {
            '/' => Some(Slash::Forward),
            '\\' => Some(Slash::Backward),
            '|' => Some(Slash::Vertical),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Slash::Forward => '/',
            Slash::Backward => '\\',
            Slash::Vertical => '|',
        }
    }
}

impl fmt::Display for Slash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// An atomic syntactic type with an optional attribute.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SimpleSyntax {
    label: Arc<str>,
    attribute: Option<Arc<str>>,
}

impl SimpleSyntax {
    /// Build without any registry check. Public construction goes through
    /// [`crate::registry::SyntaxRegistry`].
    pub(crate) fn new(label: Arc<str>, attribute: Option<Arc<str>>) -> Self {
        SimpleSyntax { label, attribute }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn attribute(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    pub(crate) fn attribute_arc(&self) -> Option<&Arc<str>> {
        self.attribute.as_ref()
    }

    /// Whether the attribute is the variable `x`.
    pub fn has_variable(&self) -> bool {
        self.attribute() == Some(VARIABLE_ATTRIBUTE)
    }

    /// Same label, different attribute.
    pub fn with_attribute(&self, attribute: Option<Arc<str>>) -> SimpleSyntax {
        SimpleSyntax {
            label: self.label.clone(),
            attribute,
        }
    }

    pub fn strip_attribute(&self) -> SimpleSyntax {
        self.with_attribute(None)
    }
}

impl fmt::Display for SimpleSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.attribute {
            Some(attribute) => write!(f, "{}[{}]", self.label, attribute),
            None => write!(f, "{}", self.label),
        }
    }
}

/// A functional syntactic type `left slash right`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ComplexSyntax {
    left: Syntax,
    right: Syntax,
    slash: Slash,
    num_slashes: usize,
}

impl ComplexSyntax {
    pub fn left(&self) -> &Syntax {
        &self.left
    }

    pub fn right(&self) -> &Syntax {
        &self.right
    }

    pub fn slash(&self) -> Slash {
        self.slash
    }
}

/// A syntactic type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Syntax {
    Simple(SimpleSyntax),
    Complex(Arc<ComplexSyntax>),
}

/// The value a syntax variable was bound to during unification.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Binding {
    /// The variable met a syntax without attribute.
    NoAttribute,
    /// The variable met a concrete attribute.
    Attribute(Arc<str>),
}

impl Binding {
    /// The attribute the variable should be replaced with.
    pub fn attribute(&self) -> Option<&Arc<str>> {
        match self {
            Binding::NoAttribute => None,
            Binding::Attribute(attribute) => Some(attribute),
        }
    }
}

/// The result of a successful unification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unification {
    /// The unified syntax.
    pub syntax: Syntax,
    /// Binding of the receiver's variable, if one was made.
    pub assignment: Option<Binding>,
}

impl Unification {
    pub fn is_variable_assigned(&self) -> bool {
        self.assignment.is_some()
    }
}

/// Tracks the single binding allowed per side during one unification.
#[derive(Debug, Default)]
struct UnificationHelper {
    this_binding: Option<Binding>,
    other_binding: Option<Binding>,
}

impl UnificationHelper {
    fn bind(slot: &mut Option<Binding>, value: Binding) -> bool {
        match slot {
            Some(existing) => *existing == value,
            None => {
                *slot = Some(value);
                true
            }
        }
    }

    fn bind_this(&mut self, value: Binding) -> bool {
        Self::bind(&mut self.this_binding, value)
    }

    fn bind_other(&mut self, value: Binding) -> bool {
        Self::bind(&mut self.other_binding, value)
    }
}

impl Syntax {
    /// Create a complex syntax.
    pub fn complex(left: Syntax, right: Syntax, slash: Slash) -> Self {
        let num_slashes = 1 + left.num_slashes() + right.num_slashes();
        Syntax::Complex(Arc::new(ComplexSyntax {
            left,
            right,
            slash,
            num_slashes,
        }))
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, Syntax::Complex(_))
    }

    pub fn as_simple(&self) -> Option<&SimpleSyntax> {
        match self {
            Syntax::Simple(simple) => Some(simple),
            Syntax::Complex(_) => None,
        }
    }

    pub fn as_complex(&self) -> Option<&ComplexSyntax> {
        match self {
            Syntax::Complex(complex) => Some(complex),
            Syntax::Simple(_) => None,
        }
    }

    /// The result side of a complex syntax.
    pub fn left(&self) -> Option<&Syntax> {
        self.as_complex().map(ComplexSyntax::left)
    }

    /// The argument side of a complex syntax.
    pub fn right(&self) -> Option<&Syntax> {
        self.as_complex().map(ComplexSyntax::right)
    }

    pub fn slash(&self) -> Option<Slash> {
        self.as_complex().map(ComplexSyntax::slash)
    }

    pub fn num_slashes(&self) -> usize {
        match self {
            Syntax::Simple(_) => 0,
            Syntax::Complex(complex) => complex.num_slashes,
        }
    }

    /// Number of arguments along the result spine: `(S\NP)/NP` has two.
    pub fn num_arguments(&self) -> usize {
        match self {
            Syntax::Simple(_) => 0,
            Syntax::Complex(complex) => 1 + complex.left.num_arguments(),
        }
    }

    pub fn has_attribute_variable(&self) -> bool {
        match self {
            Syntax::Simple(simple) => simple.has_variable(),
            Syntax::Complex(complex) => {
                complex.left.has_attribute_variable() || complex.right.has_attribute_variable()
            }
        }
    }

    /// All concrete attributes that occur in this syntax.
    pub fn attributes(&self) -> FxHashSet<Arc<str>> {
        let mut result = FxHashSet::default();
        self.collect_attributes(&mut result);
        result
    }

    fn collect_attributes(&self, result: &mut FxHashSet<Arc<str>>) {
        match self {
            Syntax::Simple(simple) => {
                if let Some(attribute) = simple.attribute_arc() {
                    if &**attribute != VARIABLE_ATTRIBUTE {
                        result.insert(attribute.clone());
                    }
                }
            }
            Syntax::Complex(complex) => {
                complex.left.collect_attributes(result);
                complex.right.collect_attributes(result);
            }
        }
    }

    /// Rebuild the syntax, transforming every simple leaf.
    pub(crate) fn try_map_simple<F>(&self, f: &mut F) -> Option<Syntax>
    where
        F: FnMut(&SimpleSyntax) -> Option<SimpleSyntax>,
    {
        match self {
            Syntax::Simple(simple) => f(simple).map(Syntax::Simple),
            Syntax::Complex(complex) => {
                let left = complex.left.try_map_simple(f)?;
                let right = complex.right.try_map_simple(f)?;
                Some(Syntax::complex(left, right, complex.slash))
            }
        }
    }

    fn map_simple<F>(&self, mut f: F) -> Syntax
    where
        F: FnMut(&SimpleSyntax) -> SimpleSyntax,
    {
        match self.try_map_simple(&mut |simple| Some(f(simple))) {
            Some(syntax) => syntax,
            None => self.clone(),
        }
    }

    /// Remove every attribute, variables included.
    pub fn strip_attributes(&self) -> Syntax {
        self.map_simple(SimpleSyntax::strip_attribute)
    }

    /// Remove variable attributes only.
    pub fn strip_variables(&self) -> Syntax {
        self.map_simple(|simple| {
            if simple.has_variable() {
                simple.strip_attribute()
            } else {
                simple.clone()
            }
        })
    }

    pub fn contains_sub_syntax(&self, sub: &Syntax) -> bool {
        if self == sub {
            return true;
        }
        match self {
            Syntax::Simple(_) => false,
            Syntax::Complex(complex) => {
                complex.left.contains_sub_syntax(sub) || complex.right.contains_sub_syntax(sub)
            }
        }
    }

    /// Replace every occurrence of `sub` with `replacement`.
    pub fn replace(&self, sub: &Syntax, replacement: &Syntax) -> Syntax {
        if self == sub {
            return replacement.clone();
        }
        match self {
            Syntax::Simple(_) => self.clone(),
            Syntax::Complex(complex) => Syntax::complex(
                complex.left.replace(sub, replacement),
                complex.right.replace(sub, replacement),
                complex.slash,
            ),
        }
    }

    /// Unify this syntax with `other`.
    ///
    /// Returns `None` when the two do not unify. The returned assignment is
    /// the binding made for this side's variable, if any.
    pub fn unify(&self, other: &Syntax) -> Option<Unification> {
        if self.num_slashes() != other.num_slashes() {
            return None;
        }
        let mut helper = UnificationHelper::default();
        let syntax = self.unify_with(other, &mut helper)?;
        Some(Unification {
            syntax,
            assignment: helper.this_binding,
        })
    }

    /// Whether the two unify, ignoring the result.
    pub fn unifies_with(&self, other: &Syntax) -> bool {
        self.unify(other).is_some()
    }

    fn unify_with(&self, other: &Syntax, helper: &mut UnificationHelper) -> Option<Syntax> {
        match (self, other) {
            (Syntax::Simple(a), Syntax::Simple(b)) => unify_simple(a, b, helper).map(Syntax::Simple),
            (Syntax::Complex(a), Syntax::Complex(b)) => {
                if a.slash != b.slash {
                    return None;
                }
                let right = a.right.unify_with(&b.right, helper)?;
                let left = a.left.unify_with(&b.left, helper)?;
                Some(Syntax::complex(left, right, a.slash))
            }
            _ => None,
        }
    }
}

fn unify_simple(
    this: &SimpleSyntax,
    other: &SimpleSyntax,
    helper: &mut UnificationHelper,
) -> Option<SimpleSyntax> {
    if this.label != other.label {
        return None;
    }
    match (this.attribute(), other.attribute()) {
        (None, None) => Some(other.clone()),
        (None, Some(VARIABLE_ATTRIBUTE)) => helper
            .bind_other(Binding::NoAttribute)
            .then(|| this.clone()),
        (None, Some(_)) => Some(other.clone()),
        (Some(VARIABLE_ATTRIBUTE), None) => helper
            .bind_this(Binding::NoAttribute)
            .then(|| other.clone()),
        (Some(VARIABLE_ATTRIBUTE), Some(VARIABLE_ATTRIBUTE)) => Some(this.clone()),
        (Some(VARIABLE_ATTRIBUTE), Some(_)) => {
            let value = other.attribute_arc()?.clone();
            helper
                .bind_this(Binding::Attribute(value))
                .then(|| other.clone())
        }
        (Some(_), None) => Some(this.clone()),
        (Some(_), Some(VARIABLE_ATTRIBUTE)) => {
            let value = this.attribute_arc()?.clone();
            helper
                .bind_other(Binding::Attribute(value))
                .then(|| this.clone())
        }
        (Some(a), Some(b)) => (a == b).then(|| this.clone()),
    }
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Syntax::Simple(simple) => write!(f, "{}", simple),
            Syntax::Complex(complex) => {
                write!(f, "{}{}", complex.left, complex.slash)?;
                if complex.right.is_complex() {
                    write!(f, "({})", complex.right)
                } else {
                    write!(f, "{}", complex.right)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SyntaxRegistry;
    use proptest::prelude::*;

    fn read(s: &str) -> Syntax {
        SyntaxRegistry::new().read(s).unwrap()
    }

    #[test]
    fn test_num_slashes() {
        assert_eq!(read("NP").num_slashes(), 0);
        assert_eq!(read("S\\NP").num_slashes(), 1);
        assert_eq!(read("(S\\NP)/(S\\NP)").num_slashes(), 3);
        assert_eq!(read("(S\\NP)/NP").num_arguments(), 2);
    }

    #[test]
    fn test_display_left_associative() {
        assert_eq!(read("(S\\NP)/NP").to_string(), "S\\NP/NP");
        assert_eq!(read("S/(S\\NP)").to_string(), "S/(S\\NP)");
        assert_eq!(read("S[dcl]\\NP[x]").to_string(), "S[dcl]\\NP[x]");
    }

    #[test]
    fn test_unify_identical() {
        let a = read("S\\NP");
        let u = a.unify(&a).unwrap();
        assert_eq!(u.syntax, a);
        assert!(!u.is_variable_assigned());
    }

    #[test]
    fn test_unify_slash_count_mismatch() {
        assert!(read("S").unify(&read("S\\NP")).is_none());
    }

    #[test]
    fn test_unify_slash_direction_mismatch() {
        assert!(read("S/NP").unify(&read("S\\NP")).is_none());
    }

    #[test]
    fn test_unify_label_mismatch() {
        assert!(read("NP").unify(&read("N")).is_none());
    }

    #[test]
    fn test_unify_variable_binds_attribute() {
        let u = read("NP[x]").unify(&read("NP[pl]")).unwrap();
        assert_eq!(u.syntax, read("NP[pl]"));
        assert_eq!(u.assignment, Some(Binding::Attribute("pl".into())));
    }

    #[test]
    fn test_unify_variable_binds_no_attribute() {
        let u = read("NP[x]").unify(&read("NP")).unwrap();
        assert_eq!(u.syntax, read("NP"));
        assert_eq!(u.assignment, Some(Binding::NoAttribute));
    }

    #[test]
    fn test_unify_variable_consistent_within_call() {
        assert!(read("S[x]/NP[x]").unify(&read("S[dcl]/NP[dcl]")).is_some());
        assert!(read("S[x]/NP[x]").unify(&read("S[dcl]/NP[pl]")).is_none());
    }

    #[test]
    fn test_unify_other_side_variable_not_reported() {
        let u = read("NP[pl]").unify(&read("NP[x]")).unwrap();
        assert_eq!(u.syntax, read("NP[pl]"));
        assert!(!u.is_variable_assigned());
    }

    #[test]
    fn test_unify_concrete_attributes() {
        assert!(read("NP[pl]").unify(&read("NP[pl]")).is_some());
        assert!(read("NP[pl]").unify(&read("NP[sg]")).is_none());
    }

    #[test]
    fn test_unify_unattributed_accepts_concrete() {
        let u = read("NP").unify(&read("NP[pl]")).unwrap();
        assert_eq!(u.syntax, read("NP[pl]"));
        let u = read("NP[pl]").unify(&read("NP")).unwrap();
        assert_eq!(u.syntax, read("NP[pl]"));
    }

    #[test]
    fn test_strip_and_attributes() {
        let s = read("S[dcl]\\NP[x]/NP[pl]");
        assert!(s.has_attribute_variable());
        assert_eq!(s.strip_variables().to_string(), "S[dcl]\\NP/NP[pl]");
        assert_eq!(s.strip_attributes().to_string(), "S\\NP/NP");
        let attributes = s.attributes();
        assert_eq!(attributes.len(), 2);
        assert!(attributes.contains("dcl"));
        assert!(attributes.contains("pl"));
    }

    #[test]
    fn test_replace_and_contains() {
        let s = read("(S\\NP)/NP");
        let np = read("NP");
        assert!(s.contains_sub_syntax(&np));
        assert!(s.contains_sub_syntax(&read("S\\NP")));
        assert!(!s.contains_sub_syntax(&read("PP")));
        assert_eq!(s.replace(&np, &read("PP")).to_string(), "S\\PP/PP");
    }

    fn arb_syntax() -> impl Strategy<Value = Syntax> {
        let leaf = (
            prop::sample::select(vec!["S", "NP", "N", "PP"]),
            prop::option::of(prop::sample::select(vec!["dcl", "pl", "x"])),
        )
            .prop_map(|(label, attribute)| {
                Syntax::Simple(SimpleSyntax::new(label.into(), attribute.map(Into::into)))
            });
        leaf.prop_recursive(4, 24, 2, |inner| {
            (
                inner.clone(),
                inner,
                prop::sample::select(vec![Slash::Forward, Slash::Backward, Slash::Vertical]),
            )
                .prop_map(|(left, right, slash)| Syntax::complex(left, right, slash))
        })
    }

    proptest! {
        #[test]
        fn prop_read_display_round_trip(syntax in arb_syntax()) {
            let registry = SyntaxRegistry::new();
            let read_back = registry.read(&syntax.to_string()).unwrap();
            prop_assert_eq!(read_back, syntax);
        }

        #[test]
        fn prop_unify_with_self(syntax in arb_syntax()) {
            let u = syntax.unify(&syntax);
            prop_assert!(u.is_some());
            prop_assert_eq!(u.unwrap().syntax.num_slashes(), syntax.num_slashes());
        }

        #[test]
        fn prop_num_slashes_invariant(left in arb_syntax(), right in arb_syntax()) {
            let complex = Syntax::complex(left.clone(), right.clone(), Slash::Forward);
            prop_assert_eq!(complex.num_slashes(), 1 + left.num_slashes() + right.num_slashes());
        }
    }
}
