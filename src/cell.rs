//! Packed chart cells.
//!
//! A cell is one `(span, category)` signature. It packs every step deriving
//! that category over that span and keeps, incrementally:
//! - the Viterbi score and the steps achieving it (ties are all kept)
//! - the log inside score over all packed steps
//! - the number of packed trees and of Viterbi trees
//!
//! Cells are mutable while their span is being built and shared through
//! `Rc` once it is sealed.

use crate::category::{Category, Semantics};
use crate::lexicon::LexicalEntry;
use crate::model::FeatureVector;
use crate::rules::RuleName;
use crate::semiring::{Count, LogReal, MaxPlus, Semiring};
use crate::step::Step;
use indexmap::IndexSet;
use rustc_hash::FxHashSet;
use std::cell::OnceCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[derive(Debug)]
pub struct Cell<MR> {
    category: Category<MR>,
    start: usize,
    end: usize,
    full_parse: bool,
    steps: IndexSet<Step<MR>>,
    /// Indexes into `steps` of the max-scoring steps.
    max_steps: Vec<usize>,
    viterbi: MaxPlus,
    inside: LogReal,
    num_parses: Count,
    num_viterbi_parses: Count,
    max_avg_features: OnceCell<FeatureVector>,
}

impl<MR: Semantics> Cell<MR> {
    pub fn new(step: Step<MR>) -> Self {
        let mut cell = Cell {
            category: step.root().clone(),
            start: step.start(),
            end: step.end(),
            full_parse: step.is_full_parse(),
            steps: IndexSet::new(),
            max_steps: Vec::new(),
            viterbi: MaxPlus::zero(),
            inside: LogReal::zero(),
            num_parses: Count::zero(),
            num_viterbi_parses: Count::zero(),
            max_avg_features: OnceCell::new(),
        };
        cell.add_step(step);
        cell
    }

    /// Pack `step` into this cell. Returns whether the set of max-scoring
    /// steps changed. Duplicate steps are ignored.
    pub fn add_step(&mut self, step: Step<MR>) -> bool {
        assert!(
            step.root() == &self.category && step.start() == self.start && step.end() == self.end,
            "packing step {} into cell {}",
            step,
            self
        );
        if self.steps.contains(&step) {
            return false;
        }
        let score = step.viterbi();
        let step_parses = step.num_viterbi_parses();
        self.inside = self.inside + step.inside();
        self.num_parses = self.num_parses + step.num_parses();
        let (index, _) = self.steps.insert_full(step);
        let changed = if self.max_steps.is_empty() || (score > self.viterbi && !score.approx_eq(&self.viterbi)) {
            self.viterbi = score;
            self.max_steps = vec![index];
            self.num_viterbi_parses = step_parses;
            true
        } else if score.approx_eq(&self.viterbi) {
            self.max_steps.push(index);
            self.num_viterbi_parses = self.num_viterbi_parses + step_parses;
            true
        } else {
            false
        };
        if changed {
            self.max_avg_features = OnceCell::new();
        }
        changed
    }

    /// Merge the steps of `other`, which must have the same signature.
    /// Returns whether the max-scoring steps changed.
    pub fn add_cell(&mut self, other: Cell<MR>) -> bool {
        debug_assert!(self == &other, "merging cells with different signatures");
        let mut changed = false;
        for step in other.steps {
            changed |= self.add_step(step);
        }
        changed
    }

    pub fn category(&self) -> &Category<MR> {
        &self.category
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn is_full_parse(&self) -> bool {
        self.full_parse
    }

    pub fn steps(&self) -> impl Iterator<Item = &Step<MR>> {
        self.steps.iter()
    }

    pub fn num_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn max_steps(&self) -> impl Iterator<Item = &Step<MR>> {
        self.max_steps.iter().filter_map(|&i| self.steps.get_index(i))
    }

    pub fn viterbi(&self) -> MaxPlus {
        self.viterbi
    }

    pub fn viterbi_score(&self) -> f64 {
        self.viterbi.value()
    }

    pub fn inside(&self) -> LogReal {
        self.inside
    }

    /// Number of packed derivation trees.
    pub fn num_parses(&self) -> Count {
        self.num_parses
    }

    /// Number of derivation trees achieving the Viterbi score.
    pub fn num_viterbi_parses(&self) -> Count {
        self.num_viterbi_parses
    }

    pub fn has_lexical_step(&self) -> bool {
        self.steps.iter().any(Step::is_lexical)
    }

    pub fn is_overloaded(&self) -> bool {
        self.steps.iter().any(Step::is_overloaded)
    }

    /// Features of the max-scoring trees, averaged over every tie.
    pub fn max_avg_features(&self) -> &FeatureVector {
        self.max_avg_features.get_or_init(|| {
            let per_step: Vec<FeatureVector> = self
                .max_steps()
                .map(|step| {
                    let mut features = step.local_features().clone();
                    for child in step.children() {
                        features.add(child.max_avg_features());
                    }
                    features
                })
                .collect();
            FeatureVector::average(&per_step)
        })
    }

    /// Lexical entries used anywhere in the packed forest.
    pub fn all_lexical_entries(&self) -> IndexSet<Arc<LexicalEntry<MR>>> {
        let mut entries = IndexSet::new();
        let mut visited = FxHashSet::default();
        self.collect_entries(false, &mut entries, &mut visited);
        entries
    }

    /// Lexical entries used in the max-scoring trees.
    pub fn max_lexical_entries(&self) -> IndexSet<Arc<LexicalEntry<MR>>> {
        let mut entries = IndexSet::new();
        let mut visited = FxHashSet::default();
        self.collect_entries(true, &mut entries, &mut visited);
        entries
    }

    fn collect_entries(
        &self,
        max_only: bool,
        entries: &mut IndexSet<Arc<LexicalEntry<MR>>>,
        visited: &mut FxHashSet<*const Cell<MR>>,
    ) {
        if !visited.insert(self as *const Cell<MR>) {
            return;
        }
        let steps: Box<dyn Iterator<Item = &Step<MR>>> = if max_only {
            Box::new(self.max_steps())
        } else {
            Box::new(self.steps())
        };
        for step in steps {
            if let Some(entry) = step.lexical_entry() {
                entries.insert(entry.clone());
            }
            for child in step.children() {
                child.collect_entries(max_only, entries, visited);
            }
        }
    }

    /// Rule names used in the max-scoring trees.
    pub fn max_rules_used(&self) -> IndexSet<RuleName> {
        let mut rules = IndexSet::new();
        let mut visited = FxHashSet::default();
        self.collect_rules(&mut rules, &mut visited);
        rules
    }

    fn collect_rules(&self, rules: &mut IndexSet<RuleName>, visited: &mut FxHashSet<*const Cell<MR>>) {
        if !visited.insert(self as *const Cell<MR>) {
            return;
        }
        for step in self.max_steps() {
            rules.insert(step.rule_name().clone());
            for child in step.children() {
                child.collect_rules(rules, visited);
            }
        }
    }
}

impl<MR: Semantics> PartialEq for Cell<MR> {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start
            && self.end == other.end
            && self.full_parse == other.full_parse
            && self.category == other.category
    }
}

impl<MR: Semantics> Eq for Cell<MR> {}

impl<MR: Semantics> Hash for Cell<MR> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.start.hash(state);
        self.end.hash(state);
        self.category.hash(state);
    }
}

impl<MR: Semantics> fmt::Display for Cell<MR> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}-{} : {} : steps={} : {:.4}]",
            self.start,
            self.end,
            self.category,
            self.steps.len(),
            self.viterbi.value()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::CategoryServices;
    use crate::lexicon::{LexicalEntry, Lexicon, TokenSeq};
    use crate::model::{LexicalFeatureSet, LinearModel, Model, RuleFeatureSet};
    use crate::registry::SyntaxRegistry;
    use crate::rules::{
        Application, BinaryRule, Composition, LexicalRule, ParseRuleResult, SentenceSpan,
    };
    use crate::term::Term;
    use std::rc::Rc;

    struct Fixture {
        cs: CategoryServices<Term>,
        model: LinearModel<Term>,
        sentence: TokenSeq,
    }

    impl Fixture {
        fn new() -> Self {
            let cs = CategoryServices::new(Arc::new(SyntaxRegistry::new()));
            let mut lexicon = Lexicon::new();
            lexicon
                .add_entries_from_str(
                    "not :- S/S : (lambda $0 (not $0))\n\
                     see :- S/NP : (lambda $0 (see $0))\n\
                     rex :- NP : rex",
                    &cs,
                    None,
                )
                .unwrap();
            let model = LinearModel::new(Arc::new(lexicon))
                .with_feature_set(LexicalFeatureSet::default())
                .with_feature_set(RuleFeatureSet::default())
                .with_weight("RULE#>comp1", 1.0);
            Fixture {
                cs,
                model,
                sentence: TokenSeq::from_sentence("not see rex"),
            }
        }

        fn lexical(&self, index: usize) -> Rc<Cell<Term>> {
            let span = SentenceSpan::new(index, index, self.sentence.len());
            let lexicon = self.model.lexicon();
            let result = LexicalRule::new()
                .apply(&self.sentence, &span, lexicon.as_ref())
                .pop()
                .unwrap();
            Rc::new(Cell::new(Step::lexical(result, index, index, false, &self.model)))
        }

        fn combine(
            &self,
            rule: &dyn BinaryRule<Term>,
            left: &Rc<Cell<Term>>,
            right: &Rc<Cell<Term>>,
        ) -> Step<Term> {
            let span = SentenceSpan::new(left.start(), right.end(), self.sentence.len());
            let result: ParseRuleResult<Term> =
                rule.apply(left.category(), right.category(), &span).unwrap();
            Step::binary(result, left.clone(), right.clone(), false, &self.model)
        }
    }

    #[test]
    fn test_packing_keeps_max() {
        let fx = Fixture::new();
        let apply = Application::forward(fx.cs.clone());
        let compose = Composition::forward(fx.cs.clone());
        let (not, see, rex) = (fx.lexical(0), fx.lexical(1), fx.lexical(2));

        let see_rex = Rc::new(Cell::new(fx.combine(&apply, &see, &rex)));
        let not_see = Rc::new(Cell::new(fx.combine(&compose, &not, &see)));
        assert_eq!(not_see.viterbi_score(), 1.0);

        let by_application = fx.combine(&apply, &not, &see_rex);
        let by_composition = fx.combine(&apply, &not_see, &rex);
        assert_eq!(by_application.root(), by_composition.root());

        let mut cell = Cell::new(by_application);
        assert_eq!(cell.viterbi_score(), 0.0);
        assert!(cell.add_step(by_composition));
        assert_eq!(cell.num_steps(), 2);
        assert_eq!(cell.viterbi_score(), 1.0);
        assert_eq!(cell.max_steps().count(), 1);
        assert_eq!(cell.num_parses(), Count::new(2));
        assert_eq!(cell.num_viterbi_parses(), Count::new(1));
        let expected_inside = crate::semiring::log_add(0.0, 1.0);
        assert!((cell.inside().value() - expected_inside).abs() < 1e-9);

        let rules = cell.max_rules_used();
        assert!(rules.iter().any(|r| r.to_string() == ">comp1"));
        assert!(rules.iter().any(|r| r.to_string() == "lex"));
        assert_eq!(cell.max_avg_features().get("RULE#>comp1"), 1.0);
        assert_eq!(cell.max_avg_features().get("RULE#>apply"), 1.0);
        assert_eq!(cell.max_avg_features().get("RULE#lex"), 3.0);
    }

    #[test]
    fn test_duplicate_step_ignored() {
        let fx = Fixture::new();
        let apply = Application::forward(fx.cs.clone());
        let (see, rex) = (fx.lexical(1), fx.lexical(2));
        let mut cell = Cell::new(fx.combine(&apply, &see, &rex));
        assert!(!cell.add_step(fx.combine(&apply, &see, &rex)));
        assert_eq!(cell.num_steps(), 1);
        assert_eq!(cell.num_parses(), Count::new(1));
        assert!(cell.inside().approx_eq(&LogReal::one()));
    }

    #[test]
    fn test_ties_average_features() {
        let fx = Fixture::new();
        let rex = fx.lexical(2);
        let see = fx.lexical(1);
        let apply = Application::forward(fx.cs.clone());
        let mut cell = Cell::new(fx.combine(&apply, &see, &rex));
        // A second, tied derivation of the same category with a different
        // lexical entry.
        let entry = LexicalEntry::new(
            TokenSeq::of(["see", "rex"]),
            fx.cs.read("S : (see rex)").unwrap(),
            true,
        );
        let lexicon = Lexicon::from_entries([entry]);
        let span = SentenceSpan::new(1, 2, 3);
        let result = LexicalRule::new()
            .apply(&fx.sentence, &span, &lexicon)
            .pop()
            .unwrap();
        let tied = Step::lexical(result, 1, 2, false, &fx.model);
        assert!(cell.add_step(tied));
        assert_eq!(cell.max_steps().count(), 2);
        assert_eq!(cell.num_viterbi_parses(), Count::new(2));
        assert!(cell.has_lexical_step());
        assert_eq!(cell.max_avg_features().get("RULE#>apply"), 0.5);
        assert_eq!(cell.all_lexical_entries().len(), 3);
        assert_eq!(cell.max_lexical_entries().len(), 3);
    }
}
