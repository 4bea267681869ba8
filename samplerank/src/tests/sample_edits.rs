use crate::acceptor::FixedTempAcceptor;
use crate::context::SamplerContext;
use crate::extra_feature::{ExtraFeature, ParenthesisFeature, PhrasePairFeature};
use crate::features::FeatureSet;
use crate::model::NgramLanguageModel;
use crate::operator::{
    self, FlipOperator, GibbsOperator, MergeSplitOperator, Proposal, TranslationSwapOperator,
};
use crate::options::{Span, TranslationOptionCollection};
use crate::sample::Sample;
use crate::selector::AcceptorSelector;
use crate::test_utils::{TOY_LAYOUT, toy_collection, toy_language_model};
use crate::utils::split_words;

fn collection() -> TranslationOptionCollection {
    toy_collection(
        "das haus ist klein",
        &[
            (0, 1, "the", -0.2),
            (0, 1, "a", -0.5),
            (1, 2, "house", -0.3),
            (1, 2, "home", -0.4),
            (2, 3, "is", -0.1),
            (2, 3, "( is", -0.9),
            (3, 4, "small", -0.2),
            (3, 4, "big )", -0.6),
            (0, 2, "the house", -0.4),
            (1, 3, "house is", -0.3),
            (2, 4, "is small", -0.5),
        ],
    )
}

fn features(lm: &NgramLanguageModel) -> FeatureSet<'_> {
    FeatureSet::new(TOY_LAYOUT, lm)
        .extra(ExtraFeature::PhrasePair(PhrasePairFeature::new()))
        .extra(ExtraFeature::Parenthesis(ParenthesisFeature::default()))
}

fn monotone(toc: &TranslationOptionCollection, features: &FeatureSet) -> Sample {
    let derivation: Vec<_> = (0..toc.source_len())
        .map(|i| toc.options(Span::new(i, i + 1))[0].clone())
        .collect();
    Sample::new(toc.source_words().to_vec(), &derivation, features).unwrap()
}

fn assert_consistent(sample: &Sample, features: &FeatureSet) {
    sample.check_consistency().unwrap();
    let joined: Vec<&str> = sample
        .target_order()
        .flat_map(|id| sample.node(id).option().target())
        .map(String::as_str)
        .collect();
    assert_eq!(joined, sample.target_words());
    let expected = features.compute_features(sample);
    assert!(
        expected.approx_eq(sample.feature_values(), 1e-6),
        "{expected:?} vs {:?}",
        sample.feature_values()
    );
}

fn first_proposal(
    op: &mut dyn GibbsOperator,
    sample: &Sample,
    toc: &TranslationOptionCollection,
    features: &FeatureSet,
) -> Proposal {
    op.reset_iterator(sample);
    while op.keep_going() {
        if let Some(proposal) = op.propose(sample, toc, features) {
            return proposal;
        }
        op.next();
    }
    panic!("{} proposed nothing", op.name());
}

/// ランダムな書き換えを繰り返しても二つの順序と素性値のキャッシュが整合することのテスト
#[test]
fn test_random_sweeps_keep_sample_consistent() {
    let lm = toy_language_model();
    let features = features(&lm);
    let toc = collection();

    for seed in 0..4 {
        let mut sample = monotone(&toc, &features);
        let mut ctx = SamplerContext::new(seed, TOY_LAYOUT.default_weights());
        let mut selector = AcceptorSelector::new(FixedTempAcceptor::new(5.0).unwrap());
        let mut operators: Vec<Box<dyn GibbsOperator>> = vec![
            Box::new(MergeSplitOperator::new(0)),
            Box::new(TranslationSwapOperator::new(0)),
            Box::new(FlipOperator::new()),
        ];
        for iteration in 0..30 {
            let op = operators[iteration % 3].as_mut();
            operator::sweep(op, &mut sample, &toc, &features, &mut selector, &mut ctx, iteration)
                .unwrap();
            assert_consistent(&sample, &features);
        }
    }
}

/// 入れ替えを二回行うと元の導出に戻ることのテスト
#[test]
fn test_flip_twice_restores() {
    let lm = toy_language_model();
    let features = features(&lm);
    let toc = collection();
    let mut sample = monotone(&toc, &features);
    let original_words = sample.target_words().to_vec();
    let original_features = sample.feature_values().clone();
    let mut op = FlipOperator::new();

    let proposal = first_proposal(&mut op, &sample, &toc, &features);
    proposal.deltas[0].apply(&mut sample, &proposal.no_change).unwrap();
    assert_consistent(&sample, &features);
    assert_eq!(split_words("house the is small"), sample.target_words());

    let proposal = first_proposal(&mut op, &sample, &toc, &features);
    proposal.deltas[0].apply(&mut sample, &proposal.no_change).unwrap();
    assert_consistent(&sample, &features);
    assert_eq!(original_words, sample.target_words());
    assert!(original_features.approx_eq(sample.feature_values(), 1e-9));
}

/// 入れ替えで離れた位置のノードを交換した後も間のノードが保たれることのテスト
#[test]
fn test_flip_non_contiguous() {
    let lm = toy_language_model();
    let features = features(&lm);
    let toc = collection();
    let mut sample = monotone(&toc, &features);
    let mut op = FlipOperator::new();

    // Pairs are visited as (0, 1), (0, 2), ...
    op.reset_iterator(&sample);
    op.next();
    let proposal = op.propose(&sample, &toc, &features).unwrap();
    proposal.deltas[0].apply(&mut sample, &proposal.no_change).unwrap();
    assert_consistent(&sample, &features);
    assert_eq!(split_words("is house the small"), sample.target_words());
}

/// 前提条件を満たさない編集はエラーを返し、サンプルを変更しないことのテスト
#[test]
fn test_invalid_edits_leave_sample_untouched() {
    let lm = toy_language_model();
    let features = features(&lm);
    let toc = collection();
    let mut sample = monotone(&toc, &features);
    let before = sample.clone();
    let delta = TOY_LAYOUT.zeros();

    // No node covers [0, 2) exactly.
    let merged = &toc.options(Span::new(0, 2))[0];
    assert!(sample.change_target(merged, &delta).is_err());
    // The two options are not adjacent.
    let the = &toc.options(Span::new(0, 1))[0];
    let is = &toc.options(Span::new(2, 3))[0];
    assert!(sample.split_target(the, is, &delta).is_err());
    // The node at [0, 1) already precedes [1, 2).
    let house = &toc.options(Span::new(1, 2))[0];
    let next = sample.node_at_source(2);
    assert!(sample.flip_nodes(the, house, None, next, &delta).is_err());
    // Stale bounds.
    assert!(sample.flip_nodes(house, the, None, None, &delta).is_err());
    // A merge must cover exactly two phrases.
    let wide = toy_collection("das haus ist klein", &[(0, 3, "x", -1.0)]);
    assert!(sample.merge_target(&wide.options(Span::new(0, 3))[0], &delta).is_err());

    sample.check_consistency().unwrap();
    assert_eq!(before.target_words(), sample.target_words());
    assert!(before.feature_values().approx_eq(sample.feature_values(), 0.0));

    // Valid edits succeed afterwards.
    let three = &toc.options(Span::new(1, 3))[0];
    sample.merge_target(three, &delta).unwrap();
    sample.check_consistency().unwrap();
    assert_eq!(split_words("the house is small"), sample.target_words());
    assert_eq!(3, sample.num_nodes());
}

/// 目的言語側で離れた二つのノードの結合のテスト
#[test]
fn test_merge_nodes_apart_in_target() {
    let lm = toy_language_model();
    let features = features(&lm);
    let toc = collection();
    let option =
        |start: usize, end: usize, i: usize| toc.options(Span::new(start, end))[i].clone();
    let source = toc.source_words().to_vec();

    // (flipped pair index, merged span, expected derivation in target order)
    let cases = [
        (
            1,
            Span::new(2, 4),
            vec![option(2, 4, 0), option(1, 2, 0), option(0, 1, 0)],
        ),
        (
            2,
            Span::new(0, 2),
            vec![option(3, 4, 0), option(0, 2, 0), option(2, 3, 0)],
        ),
    ];
    for (skip, span, derivation) in cases {
        let mut sample = monotone(&toc, &features);
        let mut op = FlipOperator::new();
        op.reset_iterator(&sample);
        for _ in 0..skip {
            op.next();
        }
        let proposal = op.propose(&sample, &toc, &features).unwrap();
        proposal.deltas[0].apply(&mut sample, &proposal.no_change).unwrap();
        assert_consistent(&sample, &features);

        let left = sample.node_at_source(span.start).unwrap();
        let right = sample.node_at_source(span.end - 1).unwrap();
        let (a, b) = (sample.node(left).target(), sample.node(right).target());
        assert!(a.end != b.start && b.end != a.start);

        let expected = Sample::new(source.clone(), &derivation, &features).unwrap();
        let delta = expected.feature_values() - sample.feature_values();
        sample.merge_target(&toc.options(span)[0], &delta).unwrap();
        assert_consistent(&sample, &features);
        assert_eq!(expected.target_words(), sample.target_words());
        assert_eq!(3, sample.num_nodes());
        assert!(expected.feature_values().approx_eq(sample.feature_values(), 1e-6));
    }
}
