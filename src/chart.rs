//! The CKY chart.
//!
//! A triangular table of sealed spans, each holding the cells that survived
//! the beam for that span, best first. Spans are built in a [`BeamQueue`]:
//! an indexed heap keyed by category, so that a candidate with an existing
//! signature is merged in place and re-ranked, and the lowest-scoring cell
//! is evicted when the beam overflows.

use crate::category::{Category, Semantics};
use crate::cell::Cell;
use crate::lexicon::TokenSeq;
use crate::model::FeatureVector;
use crate::semiring::{LogReal, MaxPlus, Semiring};
use priority_queue::PriorityQueue;
use rustc_hash::FxHashMap;
use std::cmp::Reverse;
use std::fmt;
use std::rc::Rc;

/// Eviction order: lowest score first, then latest inserted first.
type Priority = Reverse<(MaxPlus, Reverse<u64>)>;

fn priority<MR: Semantics>(cell: &Cell<MR>, seq: u64) -> Priority {
    Reverse((cell.viterbi(), Reverse(seq)))
}

#[derive(Debug)]
struct Queued<MR> {
    seq: u64,
    cell: Cell<MR>,
}

/// Beam-bounded cell collection for one span under construction.
///
/// Lexical cells are exempt from eviction unless `prune_lexical_cells` is
/// set. When `break_ties` is off, a group of cells tied at the lowest score
/// is evicted together, so the survivors do not depend on insertion order.
#[derive(Debug)]
pub struct BeamQueue<MR: Semantics> {
    capacity: usize,
    prune_lexical_cells: bool,
    break_ties: bool,
    cells: FxHashMap<Category<MR>, Queued<MR>>,
    queue: PriorityQueue<Category<MR>, Priority>,
    next_seq: u64,
    pruned: bool,
}

impl<MR: Semantics> BeamQueue<MR> {
    pub fn new(capacity: usize, prune_lexical_cells: bool, break_ties: bool) -> Self {
        BeamQueue {
            capacity,
            prune_lexical_cells,
            break_ties,
            cells: FxHashMap::default(),
            queue: PriorityQueue::new(),
            next_seq: 0,
            pruned: false,
        }
    }

    /// A queue that never evicts.
    pub fn unbounded() -> Self {
        Self::new(usize::MAX, true, true)
    }

    fn is_exempt(&self, cell: &Cell<MR>) -> bool {
        !self.prune_lexical_cells && cell.has_lexical_step()
    }

    /// Offer a candidate. A candidate with an existing signature is merged
    /// into it; otherwise it is inserted and the beam trimmed. Returns
    /// whether the queue changed.
    pub fn offer(&mut self, cell: Cell<MR>) -> bool {
        let category = cell.category().clone();
        if let Some(queued) = self.cells.get_mut(&category) {
            let changed = queued.cell.add_cell(cell);
            if !self.prune_lexical_cells && queued.cell.has_lexical_step() {
                self.queue.remove(&category);
            } else if changed {
                self.queue
                    .change_priority(&category, priority(&queued.cell, queued.seq));
            }
            return changed;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        if !self.is_exempt(&cell) {
            self.queue.push(category.clone(), priority(&cell, seq));
        }
        self.cells.insert(category.clone(), Queued { seq, cell });
        self.trim();
        self.cells.contains_key(&category)
    }

    /// Offer every cell of `other`, in its insertion order.
    pub fn offer_all(&mut self, other: BeamQueue<MR>) {
        self.pruned |= other.pruned;
        for cell in other.into_ordered(|queued| queued.seq) {
            self.offer(cell);
        }
    }

    fn trim(&mut self) {
        while self.queue.len() > self.capacity {
            if self.break_ties {
                self.evict_lowest();
                continue;
            }
            let lowest = match self.queue.peek() {
                Some((_, Reverse((score, _)))) => *score,
                None => break,
            };
            while matches!(self.queue.peek(), Some((_, Reverse((score, _)))) if score.approx_eq(&lowest))
            {
                self.evict_lowest();
            }
        }
    }

    fn evict_lowest(&mut self) {
        if let Some((category, _)) = self.queue.pop() {
            self.cells.remove(&category);
            self.pruned = true;
        }
    }

    pub fn get(&self, category: &Category<MR>) -> Option<&Cell<MR>> {
        self.cells.get(category).map(|queued| &queued.cell)
    }

    pub fn contains(&self, category: &Category<MR>) -> bool {
        self.cells.contains_key(category)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Whether any cell was evicted.
    pub fn is_pruned(&self) -> bool {
        self.pruned
    }

    pub fn cells(&self) -> impl Iterator<Item = &Cell<MR>> {
        self.cells.values().map(|queued| &queued.cell)
    }

    fn into_ordered<K: Ord>(self, key: impl Fn(&Queued<MR>) -> K) -> Vec<Cell<MR>> {
        let mut queued: Vec<Queued<MR>> = self.cells.into_values().collect();
        queued.sort_by_key(|q| key(q));
        queued.into_iter().map(|q| q.cell).collect()
    }

    /// Cells best first, earlier insertions first among ties.
    pub fn into_cells(self) -> Vec<Cell<MR>> {
        self.into_ordered(|queued| (Reverse(queued.cell.viterbi()), queued.seq))
    }
}

/// Summary counts over a chart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChartStats {
    pub cells: usize,
    pub steps: usize,
    pub pruned_spans: usize,
}

/// A triangular chart over a sentence.
#[derive(Debug)]
pub struct Chart<MR> {
    tokens: TokenSeq,
    beam_size: usize,
    prune_lexical_cells: bool,
    break_ties: bool,
    spans: Vec<Vec<Rc<Cell<MR>>>>,
    pruned: Vec<bool>,
    external_pruning: bool,
}

impl<MR: Semantics> Chart<MR> {
    pub fn new(tokens: TokenSeq, beam_size: usize, prune_lexical_cells: bool, break_ties: bool) -> Self {
        let n = tokens.len();
        Chart {
            tokens,
            beam_size,
            prune_lexical_cells,
            break_ties,
            spans: vec![Vec::new(); n * n],
            pruned: vec![false; n * n],
            external_pruning: false,
        }
    }

    fn index(&self, start: usize, end: usize) -> usize {
        debug_assert!(start <= end && end < self.tokens.len(), "span out of range");
        start * self.tokens.len() + end
    }

    pub fn tokens(&self) -> &TokenSeq {
        &self.tokens
    }

    pub fn sentence_length(&self) -> usize {
        self.tokens.len()
    }

    pub fn beam_size(&self) -> usize {
        self.beam_size
    }

    /// An empty beam for a span of this chart.
    pub fn new_queue(&self) -> BeamQueue<MR> {
        BeamQueue::new(self.beam_size, self.prune_lexical_cells, self.break_ties)
    }

    /// Store the survivors of `queue` as the cells of `[start, end]`.
    pub fn seal_span(&mut self, start: usize, end: usize, queue: BeamQueue<MR>) {
        let index = self.index(start, end);
        self.pruned[index] = queue.is_pruned();
        self.spans[index] = queue.into_cells().into_iter().map(Rc::new).collect();
    }

    /// Cells of `[start, end]`, best first.
    pub fn cells(&self, start: usize, end: usize) -> &[Rc<Cell<MR>>] {
        &self.spans[self.index(start, end)]
    }

    pub fn span_size(&self, start: usize, end: usize) -> usize {
        self.cells(start, end).len()
    }

    pub fn is_pruned(&self, start: usize, end: usize) -> bool {
        self.pruned[self.index(start, end)]
    }

    pub fn pruned_spans(&self) -> Vec<(usize, usize)> {
        self.span_indices()
            .filter(|&(start, end)| self.is_pruned(start, end))
            .collect()
    }

    /// Record that an external pruner rejected a candidate.
    pub fn set_external_pruning(&mut self) {
        self.external_pruning = true;
    }

    pub fn has_external_pruning(&self) -> bool {
        self.external_pruning
    }

    /// No candidate was dropped by the beam or by an external pruner.
    pub fn is_exact(&self) -> bool {
        !self.external_pruning && !self.pruned.iter().any(|&p| p)
    }

    fn span_indices(&self) -> impl Iterator<Item = (usize, usize)> {
        let n = self.tokens.len();
        (0..n).flat_map(move |start| (start..n).map(move |end| (start, end)))
    }

    /// All cells, shorter spans first.
    pub fn iter(&self) -> impl Iterator<Item = &Rc<Cell<MR>>> {
        let n = self.tokens.len();
        (1..=n)
            .flat_map(move |width| (0..=n - width).map(move |start| (start, start + width - 1)))
            .flat_map(move |(start, end)| self.cells(start, end).iter())
    }

    /// Cells over the whole sentence flagged as full parses.
    pub fn full_parses(&self) -> impl Iterator<Item = &Rc<Cell<MR>>> {
        let cells = match self.tokens.len() {
            0 => &[][..],
            n => self.cells(0, n - 1),
        };
        cells.iter().filter(|cell| cell.is_full_parse())
    }

    /// Log partition function over the full parses. Negative infinity when
    /// there are none.
    pub fn log_norm(&self) -> f64 {
        self.full_parses()
            .map(|cell| cell.inside())
            .fold(LogReal::zero(), |acc, x| acc + x)
            .value()
    }

    /// Expected local features under the distribution over full parses
    /// accepted by `filter`, computed by inside-outside.
    pub fn expected_features(&self, filter: Option<&dyn Fn(&Category<MR>) -> bool>) -> FeatureVector {
        let mut expected = FeatureVector::new();
        let roots: Vec<&Rc<Cell<MR>>> = self
            .full_parses()
            .filter(|cell| filter.map_or(true, |accept| accept(cell.category())))
            .collect();
        if roots.is_empty() {
            return expected;
        }
        let log_z = roots
            .iter()
            .map(|cell| cell.inside())
            .fold(LogReal::zero(), |acc, x| acc + x);

        let mut outside: FxHashMap<*const Cell<MR>, LogReal> = FxHashMap::default();
        for root in &roots {
            outside.insert(Rc::as_ptr(root), LogReal::one());
        }

        // Children always cover strictly shorter spans, so a cell's outside
        // score is complete before its own steps are visited.
        let n = self.tokens.len();
        for width in (1..=n).rev() {
            for start in 0..=n - width {
                for cell in self.cells(start, start + width - 1) {
                    let Some(&cell_outside) = outside.get(&Rc::as_ptr(cell)) else {
                        continue;
                    };
                    for step in cell.steps() {
                        let mass = cell_outside * step.inside();
                        let posterior = (mass.value() - log_z.value()).exp();
                        expected.add_scaled(step.local_features(), posterior);
                        let children = step.children();
                        for (i, child) in children.iter().enumerate() {
                            let siblings = LogReal::product(
                                children
                                    .iter()
                                    .enumerate()
                                    .filter(|&(j, _)| j != i)
                                    .map(|(_, sibling)| sibling.inside()),
                            );
                            let contribution =
                                cell_outside * LogReal::new(step.local_score()) * siblings;
                            let entry = outside
                                .entry(Rc::as_ptr(child))
                                .or_insert_with(LogReal::zero);
                            *entry = *entry + contribution;
                        }
                    }
                }
            }
        }
        expected
    }

    pub fn stats(&self) -> ChartStats {
        let mut stats = ChartStats {
            pruned_spans: self.pruned.iter().filter(|&&p| p).count(),
            ..ChartStats::default()
        };
        for cell in self.iter() {
            stats.cells += 1;
            stats.steps += cell.num_steps();
        }
        stats
    }
}

impl<MR: Semantics> fmt::Display for Chart<MR> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.tokens.len();
        for width in 1..=n {
            for start in 0..=n - width {
                let end = start + width - 1;
                let cells = self.cells(start, end);
                if cells.is_empty() {
                    continue;
                }
                writeln!(
                    f,
                    "{}-{} [{}] ({}){}",
                    start,
                    end,
                    self.tokens.sub(start, end + 1),
                    cells.len(),
                    if self.is_pruned(start, end) { " pruned" } else { "" }
                )?;
                for cell in cells {
                    writeln!(f, "  {}", cell)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::CategoryServices;
    use crate::lexicon::{LexicalEntry, Lexicon};
    use crate::model::{LinearModel, RuleFeatureSet};
    use crate::registry::SyntaxRegistry;
    use crate::rules::{LexicalRule, SentenceSpan};
    use crate::step::Step;
    use crate::term::Term;
    use std::sync::Arc;

    struct Fixture {
        cs: CategoryServices<Term>,
        sentence: TokenSeq,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                cs: CategoryServices::new(Arc::new(SyntaxRegistry::new())),
                sentence: TokenSeq::from_sentence("a b"),
            }
        }

        /// A single-step lexical cell over `[0, 1]` scored `score`.
        fn cell(&self, category: &str, score: f64) -> Cell<Term> {
            self.cell_with(category, score, false)
        }

        /// As `cell`; the `dynamic` flag makes the entry, and so the step,
        /// distinct from the non-dynamic one.
        fn cell_with(&self, category: &str, score: f64, dynamic: bool) -> Cell<Term> {
            let entry = LexicalEntry::new(
                self.sentence.clone(),
                self.cs.read(category).unwrap(),
                dynamic,
            );
            let lexicon = Lexicon::from_entries([entry]);
            let model = LinearModel::new(Arc::new(Lexicon::new()))
                .with_feature_set(RuleFeatureSet::default())
                .with_weight("RULE#lex", score);
            let result = LexicalRule::new()
                .apply(&self.sentence, &SentenceSpan::new(0, 1, 2), &lexicon)
                .pop()
                .unwrap();
            Cell::new(Step::lexical(result, 0, 1, false, &model))
        }
    }

    #[test]
    fn test_beam_keeps_best() {
        let fx = Fixture::new();
        let mut queue = BeamQueue::new(2, true, true);
        assert!(queue.offer(fx.cell("NP : a", 1.0)));
        assert!(queue.offer(fx.cell("NP : b", 3.0)));
        assert!(queue.offer(fx.cell("NP : c", 2.0)));
        assert!(!queue.offer(fx.cell("NP : d", 0.5)));
        assert_eq!(queue.len(), 2);
        assert!(queue.is_pruned());
        let scores: Vec<f64> = queue.into_cells().iter().map(Cell::viterbi_score).collect();
        assert_eq!(scores, vec![3.0, 2.0]);
    }

    #[test]
    fn test_merge_reranks() {
        let fx = Fixture::new();
        let mut queue = BeamQueue::new(2, true, true);
        queue.offer(fx.cell("NP : a", 1.0));
        queue.offer(fx.cell("NP : b", 2.0));
        // Same signature as `a`, better score: merged, then `b` is last.
        assert!(queue.offer(fx.cell_with("NP : a", 5.0, true)));
        assert_eq!(queue.len(), 2);
        queue.offer(fx.cell("NP : c", 3.0));
        assert!(!queue.contains(&fx.cs.read("NP : b").unwrap()));
        let a = queue.get(&fx.cs.read("NP : a").unwrap()).unwrap();
        assert_eq!(a.num_steps(), 2);
        assert_eq!(a.viterbi_score(), 5.0);
    }

    #[test]
    fn test_ties_dropped_together() {
        let fx = Fixture::new();
        let mut queue = BeamQueue::new(2, true, false);
        queue.offer(fx.cell("NP : a", 3.0));
        queue.offer(fx.cell("NP : b", 1.0));
        queue.offer(fx.cell("NP : c", 1.0));
        assert_eq!(queue.len(), 1);

        let mut breaking = BeamQueue::new(2, true, true);
        breaking.offer(fx.cell("NP : a", 3.0));
        breaking.offer(fx.cell("NP : b", 1.0));
        breaking.offer(fx.cell("NP : c", 1.0));
        assert_eq!(breaking.len(), 2);
        assert!(breaking.contains(&fx.cs.read("NP : b").unwrap()));
    }

    #[test]
    fn test_lexical_exemption() {
        let fx = Fixture::new();
        let mut queue = BeamQueue::new(1, false, true);
        queue.offer(fx.cell("NP : a", 1.0));
        queue.offer(fx.cell("NP : b", 2.0));
        assert_eq!(queue.len(), 2);
        assert!(!queue.is_pruned());
    }

    #[test]
    fn test_seal_and_log_norm() {
        let fx = Fixture::new();
        let mut chart: Chart<Term> = Chart::new(fx.sentence.clone(), 10, false, false);
        let mut queue = chart.new_queue();
        queue.offer(fx.cell("NP : a", 1.0));
        queue.offer(fx.cell("NP : b", 2.0));
        chart.seal_span(0, 1, queue);
        assert_eq!(chart.span_size(0, 1), 2);
        assert_eq!(chart.cells(0, 1)[0].viterbi_score(), 2.0);
        assert_eq!(chart.span_size(0, 0), 0);
        assert!(chart.is_exact());
        // Neither cell is flagged as a full parse.
        assert_eq!(chart.full_parses().count(), 0);
        assert_eq!(chart.log_norm(), f64::NEG_INFINITY);
        assert!(chart.expected_features(None).is_empty());
        assert_eq!(
            chart.stats(),
            ChartStats {
                cells: 2,
                steps: 2,
                pruned_spans: 0
            }
        );
    }
}
