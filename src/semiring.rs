//! Semirings used to accumulate cell scores.
//!
//! Every packed cell carries three aggregates over its derivation forest:
//! - MaxPlus (Viterbi score in log space: max and +)
//! - LogReal (log inside score: log-sum-exp and +)
//! - Count (number of packed derivation trees: + and *)

use ordered_float::OrderedFloat;
use std::fmt::Debug;
use std::ops::{Add, Mul};

/// A semiring provides addition (aggregation over alternatives) and
/// multiplication (combination of children).
pub trait Semiring: Clone + Debug + Default + PartialEq + Add<Output = Self> + Mul<Output = Self> {
    /// The additive identity (zero element).
    fn zero() -> Self;

    /// The multiplicative identity (one element).
    fn one() -> Self;

    /// Check if this value is the additive identity.
    fn is_zero(&self) -> bool;

    /// Check if two values are approximately equal.
    fn approx_eq(&self, other: &Self) -> bool;

    /// Multiply an iterator of values, starting from `one`.
    fn product<I: IntoIterator<Item = Self>>(values: I) -> Self {
        values.into_iter().fold(Self::one(), |acc, v| acc * v)
    }
}

/// Numerically stable `log(exp(a) + exp(b))`.
pub fn log_add(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

/// Log-space Viterbi semiring: max and +.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MaxPlus(pub OrderedFloat<f64>);

impl MaxPlus {
    pub fn new(x: f64) -> Self {
        MaxPlus(OrderedFloat(x))
    }

    pub fn value(&self) -> f64 {
        self.0.into_inner()
    }
}

impl Default for MaxPlus {
    fn default() -> Self {
        Self::zero()
    }
}

impl Semiring for MaxPlus {
    fn zero() -> Self {
        MaxPlus::new(f64::NEG_INFINITY)
    }

    fn one() -> Self {
        MaxPlus::new(0.0)
    }

    fn is_zero(&self) -> bool {
        self.0.is_infinite() && self.0.is_sign_negative()
    }

    fn approx_eq(&self, other: &Self) -> bool {
        if self.is_zero() || other.is_zero() {
            return self.is_zero() && other.is_zero();
        }
        (self.value() - other.value()).abs() < 1e-10
    }
}

impl Add for MaxPlus {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        MaxPlus(self.0.max(other.0))
    }
}

impl Mul for MaxPlus {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        MaxPlus::new(self.value() + other.value())
    }
}

/// Log-space real semiring: log-sum-exp and +.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LogReal(pub f64);

impl LogReal {
    pub fn new(x: f64) -> Self {
        LogReal(x)
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Default for LogReal {
    fn default() -> Self {
        Self::zero()
    }
}

impl Semiring for LogReal {
    fn zero() -> Self {
        LogReal(f64::NEG_INFINITY)
    }

    fn one() -> Self {
        LogReal(0.0)
    }

    fn is_zero(&self) -> bool {
        self.0 == f64::NEG_INFINITY
    }

    fn approx_eq(&self, other: &Self) -> bool {
        if self.is_zero() || other.is_zero() {
            return self.is_zero() && other.is_zero();
        }
        (self.0 - other.0).abs() < 1e-10
    }
}

impl Add for LogReal {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        LogReal(log_add(self.0, other.0))
    }
}

impl Mul for LogReal {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        LogReal(self.0 + other.0)
    }
}

/// Counting semiring: natural numbers with + and *.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Count(pub u64);

impl Count {
    pub fn new(x: u64) -> Self {
        Count(x)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Semiring for Count {
    fn zero() -> Self {
        Count(0)
    }

    fn one() -> Self {
        Count(1)
    }

    fn is_zero(&self) -> bool {
        self.0 == 0
    }

    fn approx_eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Add for Count {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Count(self.0.saturating_add(other.0))
    }
}

impl Mul for Count {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        Count(self.0.saturating_mul(other.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maxplus_semiring() {
        let a = MaxPlus::new(-3.0);
        let b = MaxPlus::new(-5.0);

        assert_eq!(a + b, MaxPlus::new(-3.0));
        assert_eq!(a * b, MaxPlus::new(-8.0));

        // Identity elements
        assert_eq!(a + MaxPlus::zero(), a);
        assert_eq!(a * MaxPlus::one(), a);
        assert!(MaxPlus::default().is_zero());
    }

    #[test]
    fn test_logreal_semiring() {
        let a = LogReal::new(0.5f64.ln());
        let b = LogReal::new(0.25f64.ln());

        assert!((a + b).approx_eq(&LogReal::new(0.75f64.ln())));
        assert!((a * b).approx_eq(&LogReal::new(0.125f64.ln())));
        assert!((a + LogReal::zero()).approx_eq(&a));
        assert!(LogReal::zero().is_zero());
    }

    #[test]
    fn test_log_add_extremes() {
        assert_eq!(log_add(f64::NEG_INFINITY, 1.0), 1.0);
        assert_eq!(log_add(2.0, f64::NEG_INFINITY), 2.0);
        assert!((log_add(1000.0, 1000.0) - (1000.0 + 2f64.ln())).abs() < 1e-9);
    }

    #[test]
    fn test_count_semiring() {
        let a = Count::new(3);
        let b = Count::new(4);

        assert_eq!(a + b, Count::new(7));
        assert_eq!(a * b, Count::new(12));
        assert_eq!(Count::product(vec![a, b, Count::new(2)]), Count::new(24));
        assert_eq!(Count::new(u64::MAX) * b, Count::new(u64::MAX));
    }
}
