//! Gibbsサンプリングのベンチマーク
//!
//! 小さな翻訳モデルを使い、各オペレーターによる走査と
//! 交換ありのサンプリングの速度、モデルの読み込み速度を計測します。

use std::time::Duration;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use samplerank::selector::AcceptorSelector;
use samplerank::utils::split_words;
use samplerank::{
    FeatureSet, FixedTempAcceptor, Model, ModelBuilder, Sample, Sampler, SamplerConfig,
    SamplerContext, TranslationOptionCollection,
};

const PHRASE_TABLE: &str = "das ||| the ||| 0.6\n\
                            das ||| a ||| 0.3\n\
                            das ||| that ||| 0.1\n\
                            haus ||| house ||| 0.7\n\
                            haus ||| home ||| 0.2\n\
                            ist ||| is ||| 0.9\n\
                            ist ||| 's ||| 0.1\n\
                            klein ||| small ||| 0.6\n\
                            klein ||| little ||| 0.3\n\
                            nicht ||| not ||| 0.8\n\
                            sehr ||| very ||| 0.7\n\
                            das haus ||| the house ||| 0.5\n\
                            ist klein ||| is small ||| 0.6\n\
                            ist nicht ||| is not ||| 0.7\n\
                            sehr klein ||| very small ||| 0.5\n";

const ARPA: &str = "\\data\\\nngram 1=13\nngram 2=6\n\n\\1-grams:\n\
                    -99\t<s>\t-0.3\n-1.0\t</s>\n-1.2\tthe\t-0.4\n-1.3\ta\t-0.3\n\
                    -2.0\tthat\n-1.5\thouse\t-0.3\n-1.6\thome\n-1.4\tis\t-0.3\n\
                    -2.2\t's\n-1.7\tsmall\n-1.9\tlittle\n-1.6\tnot\t-0.2\n-1.8\tvery\t-0.2\n\n\
                    \\2-grams:\n-0.4\t<s> the\n-0.5\tthe house\n-0.3\thouse is\n\
                    -0.6\tis small\n-0.4\tis not\n-0.5\tvery small\n\n\\end\\\n";

const SENTENCE: &str = "das haus ist nicht sehr klein";

fn model() -> Model {
    ModelBuilder::from_readers(PHRASE_TABLE.as_bytes(), ARPA.as_bytes()).unwrap()
}

fn run(model: &Model, config: &SamplerConfig, seed: u64) -> usize {
    let layout = model.layout();
    let weights = layout.default_weights();
    let source = split_words(SENTENCE);
    let toc =
        TranslationOptionCollection::from_phrase_table(model.phrase_table(), source.clone(), &weights)
            .unwrap();
    let features = FeatureSet::new(layout, model.language_model());
    let mut sample = Sample::new(source, &toc.seed_derivation().unwrap(), &features).unwrap();
    let mut ctx = SamplerContext::new(seed, weights);
    let mut selector = AcceptorSelector::new(FixedTempAcceptor::new(1.0).unwrap());
    let stats = Sampler::new(config.clone())
        .unwrap()
        .run(&mut sample, &toc, &features, &mut selector, &mut ctx, &mut [], |_| false)
        .unwrap();
    stats.applied
}

fn bench_operators(c: &mut Criterion) {
    let model = model();
    let iterations = 200;

    let mut group = c.benchmark_group("Sweeps");
    group.throughput(Throughput::Elements(iterations as u64));
    group.warm_up_time(Duration::from_secs(1));
    group.measurement_time(Duration::from_secs(5));

    let operators = [
        ("merge-split", (1.0, 0.0, 0.0)),
        ("translation-swap", (0.0, 1.0, 0.0)),
        ("flip", (0.0, 0.0, 1.0)),
    ];
    for (name, (ms, swap, flip)) in operators {
        let config = SamplerConfig::default()
            .iterations(iterations)
            .operator_probs(ms, swap, flip)
            .unwrap();
        group.bench_function(BenchmarkId::new("Operator", name), |b| {
            b.iter(|| run(&model, &config, 0));
        });
    }

    let config = SamplerConfig::default()
        .iterations(iterations)
        .temperatures(vec![1.0, 2.0, 4.0, 8.0])
        .unwrap()
        .exchange_prob(0.5)
        .unwrap();
    group.bench_function(BenchmarkId::new("Tempering", "4 chains"), |b| {
        b.iter(|| run(&model, &config, 0));
    });
    group.finish();
}

fn bench_model_loading(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");
    model()
        .write(std::fs::File::create(&path).unwrap())
        .unwrap();

    let mut group = c.benchmark_group("Model Loading");
    group.bench_function("from_readers", |b| b.iter(model));
    group.bench_function("from_path", |b| {
        b.iter(|| Model::from_path(&path).unwrap());
    });
    group.finish();
}

criterion_group!(benches, bench_operators, bench_model_loading);
criterion_main!(benches);
