//! The CKY parser.
//!
//! Spans are filled by increasing width. For each span `[start, end]`:
//! 1. Lexical cells: every entry of the sentence lexicon for exactly the
//!    tokens under the span
//! 2. Binary cells: every binary rule over every pair of cells from every
//!    split point, either accumulated per split and then offered to the
//!    beam, or offered to the beam as they are produced
//!    (`prune_during_split`, order dependent under small beams)
//! 3. Unary cells: every unary rule over every cell from 1 and 2, once; the
//!    unary result overloads each step of the source cell
//! 4. The beam survivors are sealed into the chart
//!
//! Every candidate is hard-pruned first: it is dropped when its semantics
//! is missing (except for the EMPTY category of skipped words) or rejected
//! by the pruner. The beam then only ranks by score.

use crate::category::{Category, CategoryServices, Semantics};
use crate::cell::Cell;
use crate::chart::{BeamQueue, Chart};
use crate::lexicon::{
    CompositeLexicon, ImmutableLexicon, LexicalEntry, SentenceLexiconGenerator,
    SkippingLexiconGenerator, TokenSeq,
};
use crate::model::{FeatureVector, Model, Pruner};
use crate::rules::{
    Application, BinaryRule, CkyBinaryRule, Composition, Direction, LexicalRule,
    NormalFormValidator, RuleName, SentenceSpan, SkippingRule, UnaryRule,
};
use crate::semiring::Semiring;
use crate::step::{Step, StepError};
use indexmap::IndexSet;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, trace};

/// Fatal failure of a parse.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("invalid derivation step: {0}")]
    Step(#[from] StepError),
}

pub type ParserResult<T> = Result<T, ParserError>;

/// Decides which categories over the whole sentence are complete parses.
pub type CompleteParseFilter<MR> = Arc<dyn Fn(&Category<MR>) -> bool + Send + Sync>;

/// Construction-time parser configuration.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Maximum number of non-exempt cells kept per span.
    pub beam_size: usize,
    /// Whether lexical cells compete in the beam.
    pub prune_lexical_cells: bool,
    /// Evict one of a tie group at the beam boundary instead of all of it.
    pub break_ties: bool,
    /// Offer binary results to the bounded beam as they are produced.
    pub prune_during_split: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            beam_size: 50,
            prune_lexical_cells: false,
            break_ties: false,
            prune_during_split: false,
        }
    }
}

/// Per-parse options.
pub struct ParseOptions<MR: Semantics> {
    pub pruner: Option<Arc<dyn Pruner<MR>>>,
    /// Extra entries available to this parse only.
    pub temporary_lexicon: Option<Arc<dyn ImmutableLexicon<MR>>>,
    /// Add an EMPTY entry for every token.
    pub word_skipping: bool,
    /// Overrides the configured beam size.
    pub beam_size: Option<usize>,
}

impl<MR: Semantics> Default for ParseOptions<MR> {
    fn default() -> Self {
        ParseOptions {
            pruner: None,
            temporary_lexicon: None,
            word_skipping: false,
            beam_size: None,
        }
    }
}

impl<MR: Semantics> ParseOptions<MR> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pruner(mut self, pruner: impl Pruner<MR> + 'static) -> Self {
        self.pruner = Some(Arc::new(pruner));
        self
    }

    pub fn with_temporary_lexicon(mut self, lexicon: Arc<dyn ImmutableLexicon<MR>>) -> Self {
        self.temporary_lexicon = Some(lexicon);
        self
    }

    pub fn with_word_skipping(mut self, word_skipping: bool) -> Self {
        self.word_skipping = word_skipping;
        self
    }

    pub fn with_beam_size(mut self, beam_size: usize) -> Self {
        self.beam_size = Some(beam_size);
        self
    }
}

/// Counters collected during one parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub spans: usize,
    pub lexical_results: usize,
    pub binary_attempts: usize,
    pub binary_results: usize,
    pub unary_results: usize,
    pub hard_pruned: usize,
    pub pruned_spans: usize,
    pub cells: usize,
    pub steps: usize,
}

impl fmt::Display for ParseStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "spans={} lexical={} binary={}/{} unary={} hard_pruned={} pruned_spans={} cells={} steps={}",
            self.spans,
            self.lexical_results,
            self.binary_results,
            self.binary_attempts,
            self.unary_results,
            self.hard_pruned,
            self.pruned_spans,
            self.cells,
            self.steps
        )
    }
}

/// A full parse: a packed cell over the whole sentence.
#[derive(Debug)]
pub struct Derivation<MR> {
    cell: Rc<Cell<MR>>,
}

impl<MR> Clone for Derivation<MR> {
    fn clone(&self) -> Self {
        Derivation {
            cell: self.cell.clone(),
        }
    }
}

impl<MR: Semantics> Derivation<MR> {
    pub fn cell(&self) -> &Cell<MR> {
        &self.cell
    }

    /// Viterbi score.
    pub fn score(&self) -> f64 {
        self.cell.viterbi_score()
    }

    pub fn log_inside_score(&self) -> f64 {
        self.cell.inside().value()
    }

    pub fn category(&self) -> &Category<MR> {
        self.cell.category()
    }

    pub fn semantics(&self) -> Option<&MR> {
        self.cell.category().semantics()
    }

    pub fn all_lexical_entries(&self) -> IndexSet<Arc<LexicalEntry<MR>>> {
        self.cell.all_lexical_entries()
    }

    pub fn max_lexical_entries(&self) -> IndexSet<Arc<LexicalEntry<MR>>> {
        self.cell.max_lexical_entries()
    }

    pub fn average_max_features(&self) -> FeatureVector {
        self.cell.max_avg_features().clone()
    }

    /// Number of packed derivation trees.
    pub fn num_parses(&self) -> u64 {
        self.cell.num_parses().value()
    }

    pub fn num_viterbi_parses(&self) -> u64 {
        self.cell.num_viterbi_parses().value()
    }

    pub fn max_rules_used(&self) -> IndexSet<RuleName> {
        self.cell.max_rules_used()
    }
}

impl<MR: Semantics> fmt::Display for Derivation<MR> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ; {}", self.category(), self.score())
    }
}

/// The result of one parse.
#[derive(Debug)]
pub struct ParserOutput<MR> {
    chart: Chart<MR>,
    parse_time: Duration,
    stats: ParseStats,
}

impl<MR: Semantics> ParserOutput<MR> {
    pub fn chart(&self) -> &Chart<MR> {
        &self.chart
    }

    pub fn all_parses(&self) -> Vec<Derivation<MR>> {
        self.chart
            .full_parses()
            .map(|cell| Derivation { cell: cell.clone() })
            .collect()
    }

    /// Full parses with the highest Viterbi score, ties included.
    pub fn best_parses(&self) -> Vec<Derivation<MR>> {
        let all = self.all_parses();
        match all.iter().map(|d| d.cell.viterbi()).max() {
            Some(best) => all
                .into_iter()
                .filter(|d| d.cell.viterbi().approx_eq(&best))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Full parses whose semantics equals `semantics`.
    pub fn parses_for(&self, semantics: &MR) -> Vec<Derivation<MR>> {
        self.all_parses()
            .into_iter()
            .filter(|d| d.semantics() == Some(semantics))
            .collect()
    }

    pub fn parse_time(&self) -> Duration {
        self.parse_time
    }

    pub fn parse_time_ms(&self) -> u64 {
        self.parse_time.as_millis() as u64
    }

    /// No candidate was lost to the beam or to the pruner.
    pub fn is_exact(&self) -> bool {
        self.chart.is_exact()
    }

    pub fn log_norm(&self) -> f64 {
        self.chart.log_norm()
    }

    pub fn expected_features(&self, filter: Option<&dyn Fn(&Category<MR>) -> bool>) -> FeatureVector {
        self.chart.expected_features(filter)
    }

    pub fn stats(&self) -> &ParseStats {
        &self.stats
    }
}

/// Mutable state of one parse.
struct ParseState<'a, MR: Semantics> {
    model: &'a dyn Model<MR>,
    pruner: Option<&'a dyn Pruner<MR>>,
    stats: ParseStats,
    external_pruning: bool,
}

/// A CKY chart parser.
pub struct CkyParser<MR: Semantics> {
    config: ParserConfig,
    services: CategoryServices<MR>,
    binary_rules: Vec<CkyBinaryRule<MR>>,
    unary_rules: Vec<Arc<dyn UnaryRule<MR>>>,
    lexical_rule: LexicalRule,
    generators: Vec<Arc<dyn SentenceLexiconGenerator<MR>>>,
    skipping: SkippingLexiconGenerator<MR>,
    complete_parse_filter: CompleteParseFilter<MR>,
    empty: Category<MR>,
}

impl<MR: Semantics> CkyParser<MR> {
    pub fn builder(services: CategoryServices<MR>) -> CkyParserBuilder<MR> {
        CkyParserBuilder::new(services)
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn services(&self) -> &CategoryServices<MR> {
        &self.services
    }

    pub fn parse(&self, sentence: &TokenSeq, model: &dyn Model<MR>) -> ParserResult<ParserOutput<MR>> {
        self.parse_with(sentence, model, &ParseOptions::default())
    }

    pub fn parse_with(
        &self,
        sentence: &TokenSeq,
        model: &dyn Model<MR>,
        options: &ParseOptions<MR>,
    ) -> ParserResult<ParserOutput<MR>> {
        let started = Instant::now();
        let n = sentence.len();
        let beam_size = options.beam_size.unwrap_or(self.config.beam_size);
        let mut chart = Chart::new(
            sentence.clone(),
            beam_size,
            self.config.prune_lexical_cells,
            self.config.break_ties,
        );
        let lexicon = self.sentence_lexicon(sentence, model, options);
        let mut state = ParseState {
            model,
            pruner: options.pruner.as_deref(),
            stats: ParseStats::default(),
            external_pruning: false,
        };

        for width in 1..=n {
            for start in 0..=n - width {
                let span = SentenceSpan::new(start, start + width - 1, n);
                let mut queue = chart.new_queue();
                self.add_lexical_cells(sentence, &span, &lexicon, &mut state, &mut queue);
                if width > 1 {
                    self.add_binary_cells(&chart, &span, &mut state, &mut queue);
                }
                self.add_unary_cells(&span, &mut state, &mut queue)?;
                debug!(
                    %span,
                    cells = queue.len(),
                    pruned = queue.is_pruned(),
                    "processed span"
                );
                chart.seal_span(span.start, span.end, queue);
                state.stats.spans += 1;
            }
        }

        if state.external_pruning {
            chart.set_external_pruning();
        }
        let chart_stats = chart.stats();
        state.stats.cells = chart_stats.cells;
        state.stats.steps = chart_stats.steps;
        state.stats.pruned_spans = chart_stats.pruned_spans;
        let parse_time = started.elapsed();
        debug!(
            sentence = %sentence,
            parses = chart.full_parses().count(),
            ms = parse_time.as_millis() as u64,
            stats = %state.stats,
            "parse finished"
        );
        Ok(ParserOutput {
            chart,
            parse_time,
            stats: state.stats,
        })
    }

    fn sentence_lexicon(
        &self,
        sentence: &TokenSeq,
        model: &dyn Model<MR>,
        options: &ParseOptions<MR>,
    ) -> CompositeLexicon<MR> {
        let mut lexicon = CompositeLexicon::new().with_layer(model.lexicon());
        if let Some(temporary) = &options.temporary_lexicon {
            lexicon.push(temporary.clone());
        }
        if options.word_skipping {
            lexicon.push(Arc::new(self.skipping.generate(sentence)));
        }
        for generator in &self.generators {
            lexicon.push(Arc::new(generator.generate(sentence)));
        }
        lexicon
    }

    fn is_full_parse(&self, span: &SentenceSpan, category: &Category<MR>) -> bool {
        span.is_complete() && (self.complete_parse_filter)(category)
    }

    /// Whether `category` is dropped before reaching the beam.
    ///
    /// Over the complete span a category the complete-parse filter rejects
    /// can never become a full parse. Before the unary pass it survives only
    /// if some unary rule accepts it as an argument.
    fn hard_prune(
        &self,
        category: &Category<MR>,
        span: &SentenceSpan,
        pre_unary: bool,
        state: &mut ParseState<'_, MR>,
    ) -> bool {
        let reason = match category.semantics() {
            None if category.syntax() != self.empty.syntax() => Some("no semantics"),
            Some(semantics) if state.pruner.is_some_and(|pruner| pruner.prune(semantics)) => {
                state.external_pruning = true;
                Some("pruner")
            }
            _ if span.is_complete() && !(self.complete_parse_filter)(category) => {
                let shiftable = pre_unary
                    && self
                        .unary_rules
                        .iter()
                        .any(|rule| rule.is_valid_argument(category, span));
                (!shiftable).then_some("not a full parse")
            }
            _ => None,
        };
        match reason {
            Some(reason) => {
                state.stats.hard_pruned += 1;
                trace!(%category, reason, "hard pruned");
                true
            }
            None => false,
        }
    }

    fn add_lexical_cells(
        &self,
        sentence: &TokenSeq,
        span: &SentenceSpan,
        lexicon: &CompositeLexicon<MR>,
        state: &mut ParseState<'_, MR>,
        queue: &mut BeamQueue<MR>,
    ) {
        for result in self.lexical_rule.apply(sentence, span, lexicon) {
            if self.hard_prune(result.category(), span, true, state) {
                continue;
            }
            let full_parse = self.is_full_parse(span, result.category());
            let step = Step::lexical(result, span.start, span.end, full_parse, state.model);
            state.stats.lexical_results += 1;
            queue.offer(Cell::new(step));
        }
    }

    fn add_binary_cells(
        &self,
        chart: &Chart<MR>,
        span: &SentenceSpan,
        state: &mut ParseState<'_, MR>,
        queue: &mut BeamQueue<MR>,
    ) {
        for split in span.start..span.end {
            if self.config.prune_during_split {
                self.process_split(chart, span, split, state, queue);
            } else {
                let mut accumulated = BeamQueue::unbounded();
                self.process_split(chart, span, split, state, &mut accumulated);
                queue.offer_all(accumulated);
            }
        }
    }

    /// Combine the cells of `[start, split]` with those of
    /// `[split + 1, end]`.
    fn process_split(
        &self,
        chart: &Chart<MR>,
        span: &SentenceSpan,
        split: usize,
        state: &mut ParseState<'_, MR>,
        queue: &mut BeamQueue<MR>,
    ) {
        for left in chart.cells(span.start, split) {
            for right in chart.cells(split + 1, span.end) {
                for rule in &self.binary_rules {
                    state.stats.binary_attempts += 1;
                    let Some(result) = rule.apply(left, right, span) else {
                        continue;
                    };
                    trace!(rule = %result.rule_name, left = %left.category(), right = %right.category(), result = %result.result, "binary");
                    if self.hard_prune(&result.result, span, true, state) {
                        continue;
                    }
                    let full_parse = self.is_full_parse(span, &result.result);
                    let step = Step::binary(result, left.clone(), right.clone(), full_parse, state.model);
                    state.stats.binary_results += 1;
                    queue.offer(Cell::new(step));
                }
            }
        }
    }

    /// Apply every unary rule once to every cell built so far for `span`.
    fn add_unary_cells(
        &self,
        span: &SentenceSpan,
        state: &mut ParseState<'_, MR>,
        queue: &mut BeamQueue<MR>,
    ) -> ParserResult<()> {
        if self.unary_rules.is_empty() {
            return Ok(());
        }
        let mut shifted = Vec::new();
        for cell in queue.cells().filter(|cell| !cell.is_overloaded()) {
            for rule in &self.unary_rules {
                if !rule.is_valid_argument(cell.category(), span) {
                    continue;
                }
                let Some(result) = rule.apply(cell.category(), span) else {
                    continue;
                };
                if self.hard_prune(&result.result, span, false, state) {
                    continue;
                }
                let full_parse = self.is_full_parse(span, &result.result);
                let mut overloaded: Option<Cell<MR>> = None;
                // Overload every packed step, not only the first.
                for step in cell.steps() {
                    let step = step.overload_with_unary(&result, full_parse, state.model)?;
                    match overloaded.as_mut() {
                        Some(target) => {
                            target.add_step(step);
                        }
                        None => overloaded = Some(Cell::new(step)),
                    }
                }
                shifted.extend(overloaded);
            }
        }
        state.stats.unary_results += shifted.len();
        for cell in shifted {
            queue.offer(cell);
        }
        Ok(())
    }
}

/// Builder for [`CkyParser`].
pub struct CkyParserBuilder<MR: Semantics> {
    services: CategoryServices<MR>,
    config: ParserConfig,
    binary_rules: Vec<Arc<dyn BinaryRule<MR>>>,
    unary_rules: Vec<Arc<dyn UnaryRule<MR>>>,
    generators: Vec<Arc<dyn SentenceLexiconGenerator<MR>>>,
    normal_form: Option<Arc<dyn NormalFormValidator<MR>>>,
    complete_parse_filter: Option<CompleteParseFilter<MR>>,
    word_skipping: bool,
}

impl<MR: Semantics> CkyParserBuilder<MR> {
    pub fn new(services: CategoryServices<MR>) -> Self {
        CkyParserBuilder {
            services,
            config: ParserConfig::default(),
            binary_rules: Vec::new(),
            unary_rules: Vec::new(),
            generators: Vec::new(),
            normal_form: None,
            complete_parse_filter: None,
            word_skipping: false,
        }
    }

    pub fn config(mut self, config: ParserConfig) -> Self {
        self.config = config;
        self
    }

    pub fn beam_size(mut self, beam_size: usize) -> Self {
        self.config.beam_size = beam_size;
        self
    }

    pub fn prune_lexical_cells(mut self, prune: bool) -> Self {
        self.config.prune_lexical_cells = prune;
        self
    }

    pub fn break_ties(mut self, break_ties: bool) -> Self {
        self.config.break_ties = break_ties;
        self
    }

    pub fn prune_during_split(mut self, prune: bool) -> Self {
        self.config.prune_during_split = prune;
        self
    }

    pub fn binary_rule(mut self, rule: impl BinaryRule<MR> + 'static) -> Self {
        self.binary_rules.push(Arc::new(rule));
        self
    }

    /// Forward and backward application and first-order composition.
    pub fn standard_rules(self) -> Self {
        let services = self.services.clone();
        self.binary_rule(Application::forward(services.clone()))
            .binary_rule(Application::backward(services.clone()))
            .binary_rule(Composition::forward(services.clone()))
            .binary_rule(Composition::backward(services))
    }

    pub fn unary_rule(mut self, rule: impl UnaryRule<MR> + 'static) -> Self {
        self.unary_rules.push(Arc::new(rule));
        self
    }

    pub fn sentence_lexicon_generator(
        mut self,
        generator: impl SentenceLexiconGenerator<MR> + 'static,
    ) -> Self {
        self.generators.push(Arc::new(generator));
        self
    }

    /// Check every binary rule against `validator`.
    pub fn normal_form(mut self, validator: impl NormalFormValidator<MR> + 'static) -> Self {
        self.normal_form = Some(Arc::new(validator));
        self
    }

    /// Which complete-span categories count as full parses. Defaults to
    /// every category except EMPTY.
    pub fn complete_parse_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Category<MR>) -> bool + Send + Sync + 'static,
    {
        self.complete_parse_filter = Some(Arc::new(filter));
        self
    }

    /// Add the skipping rules that absorb EMPTY cells on either side. The
    /// EMPTY entries themselves come from [`ParseOptions::word_skipping`].
    pub fn word_skipping(mut self, word_skipping: bool) -> Self {
        self.word_skipping = word_skipping;
        self
    }

    pub fn build(self) -> CkyParser<MR> {
        let mut rules = self.binary_rules;
        if self.word_skipping {
            rules.push(Arc::new(SkippingRule::new(Direction::Forward, &self.services)));
            rules.push(Arc::new(SkippingRule::new(Direction::Backward, &self.services)));
        }
        let binary_rules: Vec<CkyBinaryRule<MR>> = rules
            .into_iter()
            .map(|rule| {
                let rule = CkyBinaryRule::new(rule);
                match &self.normal_form {
                    Some(validator) => rule.with_validator(validator.clone()),
                    None => rule,
                }
            })
            .collect();
        info!(
            beam_size = self.config.beam_size,
            prune_lexical_cells = self.config.prune_lexical_cells,
            break_ties = self.config.break_ties,
            prune_during_split = self.config.prune_during_split,
            binary_rules = binary_rules.len(),
            unary_rules = self.unary_rules.len(),
            "built CKY parser"
        );
        let empty = self.services.empty_category();
        let complete_parse_filter: CompleteParseFilter<MR> = match self.complete_parse_filter {
            Some(filter) => filter,
            None => {
                let empty = empty.syntax().clone();
                Arc::new(move |category: &Category<MR>| category.syntax() != &empty)
            }
        };
        CkyParser {
            config: self.config,
            skipping: SkippingLexiconGenerator::new(&self.services),
            empty,
            services: self.services,
            binary_rules,
            unary_rules: self.unary_rules,
            lexical_rule: LexicalRule::new(),
            generators: self.generators,
            complete_parse_filter,
        }
    }
}
