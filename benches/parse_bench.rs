//! Benchmarks for end-to-end CKY parsing.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ccg_chart::model::{LexicalFeatureSet, RuleFeatureSet};
use ccg_chart::rules::{EisnerNormalForm, TypeRaising};
use ccg_chart::term::Term;
use ccg_chart::{
    CategoryServices, CkyParser, Direction, Lexicon, LinearModel, SyntaxRegistry, TokenSeq,
};
use std::sync::Arc;

const GRAMMAR: &str = "
    the :- NP/N : (lambda $0 (the $0))
    a :- NP/N : (lambda $0 (a $0))
    big :- N/N : (lambda $0 (big $0))
    old :- N/N : (lambda $0 (old $0))
    dog :- N : dog
    cat :- N : cat
    saw :- (S\\NP)/NP : (lambda $0 (lambda $1 (see $1 $0)))
    with :- (N\\N)/NP : (lambda $0 (lambda $1 (with $1 $0)))
    with :- ((S\\NP)\\(S\\NP))/NP : (lambda $0 (lambda $1 (lambda $2 (with ($1 $2) $0))))
";

fn setup(normal_form: bool) -> (CkyParser<Term>, LinearModel<Term>) {
    let cs: CategoryServices<Term> = CategoryServices::new(Arc::new(SyntaxRegistry::new()));
    let mut lexicon = Lexicon::new();
    lexicon.add_entries_from_str(GRAMMAR, &cs, None).unwrap();
    let model = LinearModel::new(Arc::new(lexicon))
        .with_feature_set(LexicalFeatureSet::default())
        .with_feature_set(RuleFeatureSet::default())
        .with_weight("RULE#>comp1", -0.5);

    let registry = cs.registry();
    let mut builder = CkyParser::builder(cs.clone())
        .standard_rules()
        .beam_size(50)
        .unary_rule(TypeRaising::new(
            Direction::Forward,
            registry.read("NP").unwrap(),
            registry.read("S").unwrap(),
        ));
    if normal_form {
        builder = builder.normal_form(EisnerNormalForm);
    }
    (builder.build(), model)
}

fn sentence(length: usize) -> TokenSeq {
    let mut words = vec!["the", "big", "dog", "saw", "a", "cat"];
    while words.len() < length {
        words.extend(["with", "the", "old", "dog"]);
    }
    TokenSeq::of(words)
}

fn bench_parse_lengths(c: &mut Criterion) {
    let (parser, model) = setup(false);
    let mut group = c.benchmark_group("parse");
    for length in [6, 10, 14] {
        let tokens = sentence(length);
        group.bench_with_input(BenchmarkId::from_parameter(tokens.len()), &tokens, |b, tokens| {
            b.iter(|| parser.parse(black_box(tokens), &model).unwrap())
        });
    }
    group.finish();
}

fn bench_normal_form(c: &mut Criterion) {
    let (parser, model) = setup(true);
    let tokens = sentence(10);

    c.bench_function("parse_eisner_10", |b| {
        b.iter(|| parser.parse(black_box(&tokens), &model).unwrap())
    });
}

criterion_group!(benches, bench_parse_lengths, bench_normal_form);
criterion_main!(benches);
