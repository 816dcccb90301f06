//! Lambda-calculus logical forms.
//!
//! `Term` is the reference semantics shipped with the crate: variables,
//! constants, n-ary application and lambda abstraction. Terms produced by
//! the [`Semantics`] operations are beta-normal and alpha-canonical (binders
//! numbered in pre-order), so structural equality is alpha-equivalence.

use crate::category::{InvertibleSemantics, Semantics};
use crate::reader::{read_term, ReadError};
use crate::subst::{match_var, normalize, Subst};
use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::Arc;

/// Unique identifier for variables.
pub type VarId = u32;

/// A logical form.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Term {
    /// A bound (or, transiently, free) variable.
    Var(VarId),
    /// A constant or predicate symbol.
    Const(Arc<str>),
    /// Application of a functor to one or more arguments.
    App { functor: Box<Term>, args: Vec<Term> },
    /// Lambda abstraction.
    Lambda { var: VarId, body: Box<Term> },
}

impl Term {
    /// Create a new variable term.
    pub fn var(id: VarId) -> Self {
        Term::Var(id)
    }

    /// Create a new constant term.
    pub fn constant(name: impl Into<Arc<str>>) -> Self {
        Term::Const(name.into())
    }

    /// Apply `functor` to `args`. With no arguments, returns the functor.
    pub fn app(functor: Term, args: Vec<Term>) -> Self {
        if args.is_empty() {
            return functor;
        }
        Term::App {
            functor: Box::new(functor),
            args,
        }
    }

    /// Create a lambda abstraction.
    pub fn lambda(var: VarId, body: Term) -> Self {
        Term::Lambda {
            var,
            body: Box::new(body),
        }
    }

    pub fn is_lambda(&self) -> bool {
        matches!(self, Term::Lambda { .. })
    }

    /// Number of directly nested leading lambdas.
    pub fn num_leading_lambdas(&self) -> usize {
        match self {
            Term::Lambda { body, .. } => 1 + body.num_leading_lambdas(),
            _ => 0,
        }
    }

    /// Collect the free variables of this term.
    pub fn free_vars(&self) -> FxHashSet<VarId> {
        let mut result = FxHashSet::default();
        let mut bound = Vec::new();
        self.collect_free_vars(&mut bound, &mut result);
        result
    }

    fn collect_free_vars(&self, bound: &mut Vec<VarId>, result: &mut FxHashSet<VarId>) {
        match self {
            Term::Var(v) => {
                if !bound.contains(v) {
                    result.insert(*v);
                }
            }
            Term::Const(_) => {}
            Term::App { functor, args } => {
                functor.collect_free_vars(bound, result);
                for arg in args {
                    arg.collect_free_vars(bound, result);
                }
            }
            Term::Lambda { var, body } => {
                bound.push(*var);
                body.collect_free_vars(bound, result);
                bound.pop();
            }
        }
    }

    pub fn has_free_var(&self, var: VarId) -> bool {
        self.free_vars().contains(&var)
    }

    /// Check if this term has no free variables.
    pub fn is_closed(&self) -> bool {
        self.free_vars().is_empty()
    }

    /// The largest variable id occurring anywhere, bound or free.
    pub fn max_var(&self) -> Option<VarId> {
        match self {
            Term::Var(v) => Some(*v),
            Term::Const(_) => None,
            Term::App { functor, args } => args
                .iter()
                .map(Term::max_var)
                .fold(functor.max_var(), Option::max),
            Term::Lambda { var, body } => Some(*var).max(body.max_var()),
        }
    }

    /// First id that is guaranteed fresh for this term.
    pub fn next_free_id(&self) -> VarId {
        self.max_var().map_or(0, |v| v + 1)
    }

    /// Rename binders in pre-order, starting after the largest free variable.
    pub fn canonicalize(&self) -> Term {
        let mut next = self.free_vars().into_iter().max().map_or(0, |v| v + 1);
        let mut env = Vec::new();
        self.rename_binders(&mut next, &mut env)
    }

    fn rename_binders(&self, next: &mut VarId, env: &mut Vec<(VarId, VarId)>) -> Term {
        match self {
            Term::Var(v) => match env.iter().rev().find(|(old, _)| old == v) {
                Some((_, new)) => Term::Var(*new),
                None => Term::Var(*v),
            },
            Term::Const(_) => self.clone(),
            Term::App { functor, args } => Term::App {
                functor: Box::new(functor.rename_binders(next, env)),
                args: args.iter().map(|a| a.rename_binders(next, env)).collect(),
            },
            Term::Lambda { var, body } => {
                let new = *next;
                *next += 1;
                env.push((*var, new));
                let body = body.rename_binders(next, env);
                env.pop();
                Term::lambda(new, body)
            }
        }
    }

    /// Equality up to renaming of bound variables.
    pub fn alpha_eq(&self, other: &Term) -> bool {
        self.canonicalize() == other.canonicalize()
    }

    /// Replace closed occurrences of `needle` up to `depth_limit` with `var`.
    fn abstract_occurrences(
        &self,
        needle: &Term,
        var: VarId,
        depth: usize,
        depth_limit: usize,
        found: &mut bool,
    ) -> Term {
        if depth <= depth_limit && self.is_closed() && self.alpha_eq(needle) {
            *found = true;
            return Term::Var(var);
        }
        match self {
            Term::Var(_) | Term::Const(_) => self.clone(),
            Term::App { functor, args } => Term::App {
                functor: Box::new(functor.abstract_occurrences(needle, var, depth + 1, depth_limit, found)),
                args: args
                    .iter()
                    .map(|a| a.abstract_occurrences(needle, var, depth + 1, depth_limit, found))
                    .collect(),
            },
            Term::Lambda { var: binder, body } => Term::lambda(
                *binder,
                body.abstract_occurrences(needle, var, depth + 1, depth_limit, found),
            ),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Var(v) => write!(f, "${}", v),
            Term::Const(c) => write!(f, "{}", c),
            Term::App { functor, args } => {
                write!(f, "({}", functor)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                write!(f, ")")
            }
            Term::Lambda { var, body } => write!(f, "(lambda ${} {})", var, body),
        }
    }
}

impl Semantics for Term {
    type Error = ReadError;

    fn read(input: &str) -> Result<Self, Self::Error> {
        Ok(read_term(input)?.canonicalize())
    }

    fn apply(&self, argument: &Self) -> Option<Self> {
        if !self.is_lambda() {
            return None;
        }
        normalize(&Term::app(self.clone(), vec![argument.clone()]))
            .ok()
            .map(|t| t.canonicalize())
    }

    fn compose(&self, secondary: &Self, order: usize) -> Option<Self> {
        if order == 0 || !self.is_lambda() || secondary.num_leading_lambdas() < order {
            return None;
        }
        let mut subst = Subst::with_next_var(self.next_free_id().max(secondary.next_free_id()));
        let vars: Vec<VarId> = (0..order).map(|_| subst.fresh_var()).collect();
        let inner = Term::app(secondary.clone(), vars.iter().map(|v| Term::Var(*v)).collect());
        let body = Term::app(self.clone(), vec![inner]);
        let composed = vars.iter().rev().fold(body, |acc, v| Term::lambda(*v, acc));
        normalize(&composed).ok().map(|t| t.canonicalize())
    }

    fn type_raise(&self) -> Option<Self> {
        let f = self.next_free_id();
        Some(Term::lambda(f, Term::app(Term::Var(f), vec![self.clone()])).canonicalize())
    }
}

impl InvertibleSemantics for Term {
    /// Abstract every closed occurrence of `argument` in `result`. Terms
    /// carry no grouped literals, so `max_subset_size` has no effect here.
    fn application_function(
        result: &Self,
        argument: &Self,
        _max_subset_size: usize,
        depth_limit: usize,
    ) -> Option<Self> {
        let var = result.next_free_id().max(argument.next_free_id());
        let mut found = false;
        let body = result.abstract_occurrences(argument, var, 0, depth_limit, &mut found);
        if !found {
            return None;
        }
        let function = Term::lambda(var, body).canonicalize();
        let check = function.apply(argument)?;
        check.alpha_eq(result).then_some(function)
    }

    fn application_argument(function: &Self, result: &Self) -> Option<Self> {
        let Term::Lambda { var, body } = function else {
            return None;
        };
        let argument = match_var(body, *var, result)?.canonicalize();
        let check = function.apply(&argument)?;
        check.alpha_eq(result).then_some(argument)
    }
}
