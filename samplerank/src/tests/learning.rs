use crate::acceptor::GreedyAcceptor;
use crate::context::SamplerContext;
use crate::feature_vector::FeatureVector;
use crate::features::FeatureSet;
use crate::gain::SentenceBleu;
use crate::learner::{MiraConfig, OnlineLearner, PerceptronLearner};
use crate::model::ModelBuilder;
use crate::operator::{self, TranslationSwapOperator};
use crate::options::TranslationOptionCollection;
use crate::sample::Sample;
use crate::sampler::{Sampler, SamplerConfig};
use crate::selector::{DeltaSelector, SampleRankConfig, SampleRankSelector};
use crate::test_utils::{TOY_LAYOUT, toy_collection, toy_language_model};
use crate::trainer::{Corpus, LearnerKind, Trainer, TrainerConfig};
use crate::utils::split_words;
use crate::weights::WeightAverager;

const PHRASE_TABLE: &str = include_str!("./resources/phrase_table.txt");
const ARPA: &str = include_str!("./resources/toy.arpa");
const SOURCE: &str = include_str!("./resources/source.txt");
const REFERENCE: &str = include_str!("./resources/reference.txt");

fn collection() -> TranslationOptionCollection {
    toy_collection(
        "s0 s1",
        &[
            (0, 1, "the", -0.1),
            (0, 1, "a", -1.0),
            (1, 2, "house", -0.1),
            (1, 2, "home", -1.0),
        ],
    )
}

/// 一回の訳語交換の走査を、SampleRankの選択器で行います。
fn swap_sweep(
    config: SampleRankConfig,
    learner: &mut dyn OnlineLearner,
    averager: &mut WeightAverager,
    burn_in: bool,
) -> (Sample, FeatureVector) {
    let lm = toy_language_model();
    let features = FeatureSet::new(TOY_LAYOUT, &lm);
    let toc = collection();
    let mut sample = Sample::new(
        toc.source_words().to_vec(),
        &toc.seed_derivation().unwrap(),
        &features,
    )
    .unwrap();
    let gain = SentenceBleu::new(&[split_words("a home")]).unwrap();
    let mut ctx = SamplerContext::new(0, TOY_LAYOUT.default_weights());
    let mut selector = SampleRankSelector::new(
        config,
        Box::new(GreedyAcceptor::new()),
        Box::new(GreedyAcceptor::new()),
        learner,
        &gain,
        averager,
    );
    selector.set_burn_in(burn_in);
    let mut op = TranslationSwapOperator::new(0);
    operator::sweep(&mut op, &mut sample, &toc, &features, &mut selector, &mut ctx, 0).unwrap();
    (sample, ctx.weights)
}

/// モデルの好む候補より利得の高い候補がある場合に重みが更新されることのテスト
#[test]
fn test_rank_inversion_updates_weights() {
    let mut learner = PerceptronLearner::new(1.0).unwrap();
    let mut averager = WeightAverager::new(1).unwrap();
    let (sample, weights) = swap_sweep(
        SampleRankConfig::default(),
        &mut learner,
        &mut averager,
        false,
    );

    assert!(learner.num_updates() >= 1);
    // The preferred options have the higher translation model scores.
    assert!(weights.dense(TOY_LAYOUT.tm(0)) < 1.0);
    assert_eq!(2, averager.num_collected());
    // The model choice is kept unless the target is followed.
    assert!(sample.translation().starts_with("the "));
}

/// 目標の候補に従う設定のテスト
#[test]
fn test_update_target_follows_gain() {
    let mut learner = PerceptronLearner::new(1.0).unwrap();
    let mut averager = WeightAverager::new(1).unwrap();
    let (sample, _) = swap_sweep(
        SampleRankConfig::default().update_target(true),
        &mut learner,
        &mut averager,
        false,
    );
    assert_eq!("a home", sample.translation());
}

/// バーンイン中は学習しないことのテスト
#[test]
fn test_no_updates_during_burn_in() {
    let mut learner = PerceptronLearner::new(1.0).unwrap();
    let mut averager = WeightAverager::new(1).unwrap();
    let (sample, weights) = swap_sweep(
        SampleRankConfig::default(),
        &mut learner,
        &mut averager,
        true,
    );
    assert_eq!(0, learner.num_updates());
    assert_eq!(0, averager.num_collected());
    assert!(weights.approx_eq(&TOY_LAYOUT.default_weights(), 0.0));
    assert_eq!("the house", sample.translation());
}

/// コーパスからの学習と重みの書き出しのテスト
#[test]
fn test_train_and_dump() {
    let model = ModelBuilder::from_readers(PHRASE_TABLE.as_bytes(), ARPA.as_bytes()).unwrap();
    let corpus = Corpus::from_readers(SOURCE.as_bytes(), [REFERENCE.as_bytes()]).unwrap();
    assert_eq!(2, corpus.len());

    let dir = tempfile::tempdir().unwrap();
    let stem = dir.path().join("weights");
    let config = TrainerConfig::new()
        .epochs(2)
        .unwrap()
        .batch_lines(1)
        .unwrap()
        .seed(11)
        .learner(LearnerKind::Mira(MiraConfig::default()))
        .sampler(SamplerConfig::default().iterations(5))
        .dump_weights(&stem, 1, true, false)
        .unwrap();
    let weights = Trainer::new(config).train(&corpus, &model).unwrap();

    let layout = model.layout();
    assert_eq!(layout.len(), weights.dense_len());
    // One dump per batch.
    for i in 0..4 {
        let mut name = stem.clone().into_os_string();
        name.push(format!("_{i}"));
        assert!(std::path::Path::new(&name).exists());
    }
    let mut name = stem.into_os_string();
    name.push("_3");
    let dumped = FeatureVector::read(std::fs::File::open(name).unwrap(), &layout).unwrap();
    assert!(dumped.approx_eq(&weights, 1e-9));
}

/// エポックごとの温度の拡大縮小が連鎖の温度に反映されることのテスト
#[test]
fn test_tempering_follows_epoch_temperature() {
    let model = ModelBuilder::from_readers(PHRASE_TABLE.as_bytes(), ARPA.as_bytes()).unwrap();
    let corpus = Corpus::from_readers(SOURCE.as_bytes(), [REFERENCE.as_bytes()]).unwrap();

    let sampler_config = SamplerConfig::default()
        .iterations(5)
        .temperatures(vec![1.0, 2.0])
        .unwrap()
        .exchange_prob(1.0)
        .unwrap();
    let config = TrainerConfig::new()
        .epochs(3)
        .unwrap()
        .temperature(0.5, 0.5)
        .unwrap()
        .sampler(sampler_config.clone());
    let trainer = Trainer::new(config);
    assert_eq!(0.5, trainer.epoch_temperature(0));
    assert_eq!(0.25, trainer.epoch_temperature(1));
    assert_eq!(0.125, trainer.epoch_temperature(2));

    let mut sampler = Sampler::new(sampler_config).unwrap();
    for epoch in 0..3 {
        let temperature = trainer.epoch_temperature(epoch);
        sampler.set_target_temperature(temperature).unwrap();
        assert_eq!(
            &[temperature, 2.0 * temperature],
            sampler.config().chain_temperatures()
        );
    }

    let weights = trainer.train(&corpus, &model).unwrap();
    assert_eq!(model.layout().len(), weights.dense_len());
}
