//! Scoring: sparse feature vectors, models and pruners.
//!
//! The chart only needs three things from a model:
//! 1. `compute_features(step)`: the local features of a derivation step
//! 2. `score(features)`: a real-valued score of those features
//! 3. `lexicon()`: the lexicon queried for every span
//!
//! [`LinearModel`] scores by a dot product with a weight vector, with the
//! features produced by a list of pluggable [`FeatureSet`]s.

use crate::category::Semantics;
use crate::lexicon::ImmutableLexicon;
use crate::step::Step;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// A sparse real-valued vector keyed by feature name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeatureVector {
    values: FxHashMap<Arc<str>, f64>,
}

impl FeatureVector {
    pub fn new() -> Self {
        FeatureVector {
            values: FxHashMap::default(),
        }
    }

    pub fn get(&self, key: &str) -> f64 {
        self.values.get(key).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, key: &str, value: f64) {
        if value == 0.0 {
            self.values.remove(key);
        } else {
            self.values.insert(Arc::from(key), value);
        }
    }

    /// Add `value` to feature `key`.
    pub fn add_to(&mut self, key: &str, value: f64) {
        let updated = self.get(key) + value;
        self.set(key, updated);
    }

    /// Add `other` into this vector.
    pub fn add(&mut self, other: &FeatureVector) {
        self.add_scaled(other, 1.0);
    }

    /// Add `scale * other` into this vector.
    pub fn add_scaled(&mut self, other: &FeatureVector, scale: f64) {
        for (key, value) in &other.values {
            let updated = self.get(key) + scale * value;
            if updated == 0.0 {
                self.values.remove(key);
            } else {
                self.values.insert(key.clone(), updated);
            }
        }
    }

    pub fn scale(&mut self, factor: f64) {
        if factor == 0.0 {
            self.values.clear();
            return;
        }
        for value in self.values.values_mut() {
            *value *= factor;
        }
    }

    pub fn dot(&self, other: &FeatureVector) -> f64 {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small
            .values
            .iter()
            .map(|(key, value)| value * large.get(key))
            .sum()
    }

    /// Mean of `vectors`; empty input gives the zero vector.
    pub fn average<'a, I>(vectors: I) -> FeatureVector
    where
        I: IntoIterator<Item = &'a FeatureVector>,
    {
        let mut sum = FeatureVector::new();
        let mut count = 0usize;
        for vector in vectors {
            sum.add(vector);
            count += 1;
        }
        if count > 1 {
            sum.scale(1.0 / count as f64);
        }
        sum
    }

    /// Number of non-zero features.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(key, value)| (key.as_ref(), *value))
    }
}

impl fmt::Display for FeatureVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        write!(f, "{{")?;
        for (i, (key, value)) in entries.into_iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        write!(f, "}}")
    }
}

/// Scores derivation steps.
pub trait Model<MR: Semantics> {
    /// Local features of `step`, excluding its children.
    fn compute_features(&self, step: &Step<MR>) -> FeatureVector;

    fn score(&self, features: &FeatureVector) -> f64;

    /// The lexicon consulted for every span.
    fn lexicon(&self) -> Arc<dyn ImmutableLexicon<MR>>;
}

/// Hard pruning of semantics. `true` rejects.
pub trait Pruner<MR: Semantics>: Send + Sync {
    fn prune(&self, semantics: &MR) -> bool;
}

impl<MR, F> Pruner<MR> for F
where
    MR: Semantics,
    F: Fn(&MR) -> bool + Send + Sync,
{
    fn prune(&self, semantics: &MR) -> bool {
        self(semantics)
    }
}

/// A group of features computed for each step.
pub trait FeatureSet<MR: Semantics>: Send + Sync {
    fn set_features(&self, step: &Step<MR>, features: &mut FeatureVector);
}

/// One indicator feature per lexical entry, plus one per entry origin.
#[derive(Clone, Debug)]
pub struct LexicalFeatureSet {
    tag: Arc<str>,
    scale: f64,
}

impl Default for LexicalFeatureSet {
    fn default() -> Self {
        Self::new("LEX", 1.0)
    }
}

impl LexicalFeatureSet {
    pub fn new(tag: &str, scale: f64) -> Self {
        LexicalFeatureSet {
            tag: Arc::from(tag),
            scale,
        }
    }

    /// Name of the feature firing for `entry`.
    pub fn feature_name<MR: Semantics>(&self, entry: &crate::lexicon::LexicalEntry<MR>) -> String {
        format!("{}#{}", self.tag, entry)
    }
}

impl<MR: Semantics> FeatureSet<MR> for LexicalFeatureSet {
    fn set_features(&self, step: &Step<MR>, features: &mut FeatureVector) {
        if let Some(entry) = step.lexical_entry() {
            features.add_to(&self.feature_name(entry), self.scale);
            if let Some(origin) = entry.origin() {
                features.add_to(&format!("{}ORIGIN#{}", self.tag, origin), self.scale);
            }
        }
    }
}

/// One indicator feature per rule name.
#[derive(Clone, Debug)]
pub struct RuleFeatureSet {
    tag: Arc<str>,
    scale: f64,
}

impl Default for RuleFeatureSet {
    fn default() -> Self {
        Self::new("RULE", 1.0)
    }
}

impl RuleFeatureSet {
    pub fn new(tag: &str, scale: f64) -> Self {
        RuleFeatureSet {
            tag: Arc::from(tag),
            scale,
        }
    }

    pub fn feature_name(&self, rule: &crate::rules::RuleName) -> String {
        format!("{}#{}", self.tag, rule)
    }
}

impl<MR: Semantics> FeatureSet<MR> for RuleFeatureSet {
    fn set_features(&self, step: &Step<MR>, features: &mut FeatureVector) {
        features.add_to(&self.feature_name(step.rule_name()), self.scale);
    }
}

/// Linear model: `score(f) = w . f`.
pub struct LinearModel<MR: Semantics> {
    lexicon: Arc<dyn ImmutableLexicon<MR>>,
    feature_sets: Vec<Box<dyn FeatureSet<MR>>>,
    weights: FeatureVector,
}

impl<MR: Semantics> LinearModel<MR> {
    pub fn new(lexicon: Arc<dyn ImmutableLexicon<MR>>) -> Self {
        LinearModel {
            lexicon,
            feature_sets: Vec::new(),
            weights: FeatureVector::new(),
        }
    }

    pub fn with_feature_set(mut self, feature_set: impl FeatureSet<MR> + 'static) -> Self {
        self.feature_sets.push(Box::new(feature_set));
        self
    }

    pub fn with_weight(mut self, key: &str, value: f64) -> Self {
        self.weights.set(key, value);
        self
    }

    pub fn weights(&self) -> &FeatureVector {
        &self.weights
    }

    /// Perceptron-style update: `w += rate * delta`.
    pub fn update(&mut self, delta: &FeatureVector, rate: f64) {
        self.weights.add_scaled(delta, rate);
    }
}

impl<MR: Semantics> Model<MR> for LinearModel<MR> {
    fn compute_features(&self, step: &Step<MR>) -> FeatureVector {
        let mut features = FeatureVector::new();
        for feature_set in &self.feature_sets {
            feature_set.set_features(step, &mut features);
        }
        features
    }

    fn score(&self, features: &FeatureVector) -> f64 {
        self.weights.dot(features)
    }

    fn lexicon(&self) -> Arc<dyn ImmutableLexicon<MR>> {
        self.lexicon.clone()
    }
}
