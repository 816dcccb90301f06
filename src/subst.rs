//! Substitution, beta reduction and matching for lambda terms.
//!
//! This module provides the term-level machinery behind the reference
//! semantics: capture-avoiding substitution, normal-order reduction with a
//! step budget, and one-variable higher-order matching modulo alpha.

use crate::term::{Term, VarId};
use rustc_hash::FxHashMap;
use std::fmt;
use thiserror::Error;

/// Maximum number of beta steps taken by [`normalize`].
pub const DEFAULT_FUEL: usize = 10_000;

/// Errors that can occur during reduction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReduceError {
    #[error("beta reduction did not terminate within {0} steps")]
    OutOfFuel(usize),
}

/// A substitution mapping variables to terms.
#[derive(Clone, Debug, Default)]
pub struct Subst {
    bindings: FxHashMap<VarId, Term>,
    next_var: VarId,
}

impl Subst {
    /// Create a new empty substitution.
    pub fn new() -> Self {
        Subst {
            bindings: FxHashMap::default(),
            next_var: 0,
        }
    }

    /// Create a substitution with a starting variable counter. The counter
    /// must exceed every id in the terms it will be applied to.
    pub fn with_next_var(next_var: VarId) -> Self {
        Subst {
            bindings: FxHashMap::default(),
            next_var,
        }
    }

    /// Get the next fresh variable ID and increment counter.
    pub fn fresh_var(&mut self) -> VarId {
        let v = self.next_var;
        self.next_var += 1;
        v
    }

    pub fn next_var_id(&self) -> VarId {
        self.next_var
    }

    pub fn get(&self, var: VarId) -> Option<&Term> {
        self.bindings.get(&var)
    }

    pub fn bind(&mut self, var: VarId, term: Term) {
        self.bindings.insert(var, term);
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Apply this substitution to a term. Binders that would capture a free
    /// variable of some bound term are renamed to fresh ids.
    pub fn apply(&mut self, term: &Term) -> Term {
        match term {
            Term::Var(v) => self.bindings.get(v).cloned().unwrap_or(Term::Var(*v)),
            Term::Const(_) => term.clone(),
            Term::App { functor, args } => Term::App {
                functor: Box::new(self.apply(functor)),
                args: args.iter().map(|a| self.apply(a)).collect(),
            },
            Term::Lambda { var, body } => {
                let shadowed = self.bindings.remove(var);
                let captures = self.bindings.values().any(|t| t.has_free_var(*var));
                let result = if captures {
                    let fresh = self.fresh_var();
                    self.bindings.insert(*var, Term::Var(fresh));
                    let body = self.apply(body);
                    self.bindings.remove(var);
                    Term::lambda(fresh, body)
                } else {
                    Term::lambda(*var, self.apply(body))
                };
                if let Some(t) = shadowed {
                    self.bindings.insert(*var, t);
                }
                result
            }
        }
    }
}

impl fmt::Display for Subst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<_> = self.bindings.iter().collect();
        entries.sort_by_key(|(v, _)| **v);
        write!(f, "{{")?;
        for (i, (var, term)) in entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "${} -> {}", var, term)?;
        }
        write!(f, "}}")
    }
}

/// Reduce a term to beta-normal form using [`DEFAULT_FUEL`].
pub fn normalize(term: &Term) -> Result<Term, ReduceError> {
    normalize_with_fuel(term, DEFAULT_FUEL)
}

/// Reduce a term to beta-normal form in normal order, failing after
/// `fuel` beta steps. Nested applications are flattened.
pub fn normalize_with_fuel(term: &Term, fuel: usize) -> Result<Term, ReduceError> {
    let mut reducer = Reducer {
        fuel,
        limit: fuel,
        next_var: term.next_free_id(),
    };
    reducer.reduce(term)
}

struct Reducer {
    fuel: usize,
    limit: usize,
    next_var: VarId,
}

impl Reducer {
    fn step(&mut self) -> Result<(), ReduceError> {
        if self.fuel == 0 {
            return Err(ReduceError::OutOfFuel(self.limit));
        }
        self.fuel -= 1;
        Ok(())
    }

    fn reduce(&mut self, term: &Term) -> Result<Term, ReduceError> {
        match term {
            Term::Var(_) | Term::Const(_) => Ok(term.clone()),
            Term::Lambda { var, body } => Ok(Term::lambda(*var, self.reduce(body)?)),
            Term::App { functor, args } => {
                let head = self.reduce(functor)?;
                match head {
                    Term::Lambda { var, body } => {
                        let Some((first, rest)) = args.split_first() else {
                            return Ok(Term::Lambda { var, body });
                        };
                        self.step()?;
                        let mut subst = Subst::with_next_var(self.next_var);
                        subst.bind(var, first.clone());
                        let reduced = subst.apply(&body);
                        self.next_var = subst.next_var_id();
                        self.reduce(&Term::app(reduced, rest.to_vec()))
                    }
                    Term::App {
                        functor: inner,
                        args: mut inner_args,
                    } => {
                        for arg in args {
                            inner_args.push(self.reduce(arg)?);
                        }
                        Ok(Term::App {
                            functor: inner,
                            args: inner_args,
                        })
                    }
                    head => {
                        let args = args
                            .iter()
                            .map(|a| self.reduce(a))
                            .collect::<Result<Vec<_>, _>>()?;
                        Ok(Term::app(head, args))
                    }
                }
            }
        }
    }
}

/// Find `value` such that `pattern[var := value]` is alpha-equivalent to
/// `target`. Returns `None` when no such value exists or when `var` does not
/// occur in `pattern`.
pub fn match_var(pattern: &Term, var: VarId, target: &Term) -> Option<Term> {
    let mut matcher = Matcher {
        var,
        binding: None,
        env: Vec::new(),
    };
    if matcher.matches(pattern, target) {
        matcher.binding
    } else {
        None
    }
}

struct Matcher {
    var: VarId,
    binding: Option<Term>,
    /// Binder pairs (pattern, target) currently in scope.
    env: Vec<(VarId, VarId)>,
}

impl Matcher {
    fn matches(&mut self, pattern: &Term, target: &Term) -> bool {
        match (pattern, target) {
            (Term::Var(p), _) if *p == self.var && !self.env.iter().any(|(b, _)| b == p) => {
                let free = target.free_vars();
                if self.env.iter().any(|(_, t)| free.contains(t)) {
                    return false;
                }
                match &self.binding {
                    Some(existing) => existing.alpha_eq(target),
                    None => {
                        self.binding = Some(target.clone());
                        true
                    }
                }
            }
            (Term::Var(p), Term::Var(t)) => match self.env.iter().rev().find(|(b, _)| b == p) {
                Some((_, bound)) => bound == t,
                None => p == t && !self.env.iter().any(|(_, b)| b == t),
            },
            (Term::Const(a), Term::Const(b)) => a == b,
            (
                Term::App { functor: pf, args: pa },
                Term::App { functor: tf, args: ta },
            ) => {
                pa.len() == ta.len()
                    && self.matches(pf, tf)
                    && pa.iter().zip(ta).all(|(p, t)| self.matches(p, t))
            }
            (Term::Lambda { var: pv, body: pb }, Term::Lambda { var: tv, body: tb }) => {
                self.env.push((*pv, *tv));
                let ok = self.matches(pb, tb);
                self.env.pop();
                ok
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(name: &str) -> Term {
        Term::constant(name)
    }

    #[test]
    fn test_substitution() {
        let mut subst = Subst::with_next_var(10);
        subst.bind(0, c("rex"));
        let term = Term::app(c("bark"), vec![Term::var(0)]);
        assert_eq!(subst.apply(&term), Term::app(c("bark"), vec![c("rex")]));
        assert_eq!(subst.len(), 1);
    }

    #[test]
    fn test_substitution_respects_shadowing() {
        let mut subst = Subst::with_next_var(10);
        subst.bind(0, c("rex"));
        let term = Term::lambda(0, Term::var(0));
        assert_eq!(subst.apply(&term), term);
    }

    #[test]
    fn test_substitution_avoids_capture() {
        // (lambda $1 ($0 $1)) with $0 := $1 must rename the binder
        let mut subst = Subst::with_next_var(5);
        subst.bind(0, Term::var(1));
        let term = Term::lambda(1, Term::app(Term::var(0), vec![Term::var(1)]));
        let result = subst.apply(&term);
        assert_eq!(
            result,
            Term::lambda(5, Term::app(Term::var(1), vec![Term::var(5)]))
        );
    }

    #[test]
    fn test_normalize_beta() {
        let f = Term::lambda(0, Term::app(c("bark"), vec![Term::var(0)]));
        let term = Term::app(f, vec![c("rex")]);
        assert_eq!(normalize(&term).unwrap(), Term::app(c("bark"), vec![c("rex")]));
    }

    #[test]
    fn test_normalize_flattens_application() {
        let f = Term::lambda(0, Term::app(c("see"), vec![Term::var(0)]));
        let term = Term::app(Term::app(f, vec![c("a")]), vec![c("b")]);
        assert_eq!(
            normalize(&term).unwrap(),
            Term::app(c("see"), vec![c("a"), c("b")])
        );
    }

    #[test]
    fn test_normalize_diverges() {
        // omega = (lambda $0 ($0 $0)), (omega omega) never terminates
        let omega = Term::lambda(0, Term::app(Term::var(0), vec![Term::var(0)]));
        let term = Term::app(omega.clone(), vec![omega]);
        assert_eq!(
            normalize_with_fuel(&term, 50),
            Err(ReduceError::OutOfFuel(50))
        );
    }

    #[test]
    fn test_match_var() {
        let pattern = Term::app(c("bark"), vec![Term::var(0)]);
        let target = Term::app(c("bark"), vec![c("rex")]);
        assert_eq!(match_var(&pattern, 0, &target), Some(c("rex")));
        assert_eq!(match_var(&pattern, 0, &c("rex")), None);
    }

    #[test]
    fn test_match_var_consistent() {
        let pattern = Term::app(c("eq"), vec![Term::var(0), Term::var(0)]);
        let same = Term::app(c("eq"), vec![c("a"), c("a")]);
        let different = Term::app(c("eq"), vec![c("a"), c("b")]);
        assert_eq!(match_var(&pattern, 0, &same), Some(c("a")));
        assert_eq!(match_var(&pattern, 0, &different), None);
    }

    #[test]
    fn test_match_var_rejects_escaping_binder() {
        // (lambda $1 ($0 $1)) against (lambda $1 (f $1 $1)) would need $0 := (f $1)
        let pattern = Term::lambda(1, Term::app(Term::var(0), vec![Term::var(1)]));
        let target = Term::lambda(
            1,
            Term::app(c("f"), vec![Term::var(1), Term::var(1)]),
        );
        assert_eq!(match_var(&pattern, 0, &target), None);
    }

    #[test]
    fn test_subst_display() {
        let mut subst = Subst::new();
        subst.bind(1, c("b"));
        subst.bind(0, c("a"));
        assert_eq!(subst.to_string(), "{$0 -> a, $1 -> b}");
    }
}
