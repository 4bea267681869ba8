//! 重みの学習モジュール
//!
//! 対訳コーパスとバイナリモデルを読み込み、SampleRankで学習した平均化された重みを
//! テキスト形式で書き出します。

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;
use thiserror::Error;

use samplerank::errors::SampleRankError;
use samplerank::learner::{MarginMode, MiraConfig, UpdateNormaliser};
use samplerank::selector::{SampleRankConfig, TargetAssigner};
use samplerank::trainer::{Corpus, LearnerKind, Trainer, TrainerConfig};
use samplerank::{FeatureVector, Model, SamplerConfig};

/// 学習アルゴリズム
#[derive(Clone, Copy, Debug)]
enum Algorithm {
    Perceptron,
    Mira,
    MiraPlus,
}

impl FromStr for Algorithm {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "perceptron" => Ok(Self::Perceptron),
            "mira" => Ok(Self::Mira),
            "mira+" | "mira-plus" => Ok(Self::MiraPlus),
            _ => Err("Could not parse a learner"),
        }
    }
}

/// 目標の候補の決め方
#[derive(Clone, Copy, Debug)]
struct Assigner(TargetAssigner);

impl FromStr for Assigner {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "best" => Ok(Self(TargetAssigner::Best)),
            "closest" => Ok(Self(TargetAssigner::ClosestBest)),
            "chiang" => Ok(Self(TargetAssigner::Chiang)),
            _ => Err("Could not parse a target assigner"),
        }
    }
}

/// 学習コマンドの引数
#[derive(Parser, Debug)]
#[clap(name = "train", about = "SampleRank weight trainer")]
pub struct Args {
    /// Binary model (in zstd).
    #[clap(short = 'm', long)]
    model_in: PathBuf,

    /// Source sentences, one per line.
    #[clap(short = 's', long)]
    source_in: PathBuf,

    /// Reference translations, one per line. Can be given several times.
    #[clap(short = 'r', long, required = true)]
    reference_in: Vec<PathBuf>,

    /// A file to which the averaged weights are output.
    #[clap(short = 'o', long)]
    weights_out: PathBuf,

    /// Initial weights. The defaults of the model are used if not given.
    #[clap(short = 'w', long)]
    weights_in: Option<PathBuf>,

    /// Number of passes over the corpus.
    #[clap(long, default_value = "1")]
    epochs: usize,

    /// Number of sentences between weight dumps and progress reports.
    #[clap(long, default_value = "1")]
    batch_lines: usize,

    /// Seed of the random number generator.
    #[clap(long, default_value = "0")]
    seed: u64,

    /// Number of sampling iterations per sentence.
    #[clap(short = 'i', long, default_value = "1000")]
    iterations: usize,

    /// Number of burn-in iterations per sentence.
    #[clap(short = 'b', long, default_value = "0")]
    burn_in: usize,

    /// Fixed sampling temperature.
    #[clap(long, default_value = "1.0")]
    temperature: f64,

    /// Factor applied to the temperature at the end of each epoch.
    #[clap(long, default_value = "1.0")]
    temperature_scaling: f64,

    /// Burn-in annealing: start, stop, floor and ratio.
    #[clap(long, value_delimiter(','))]
    burn_in_annealing: Vec<f64>,

    /// Temperatures of the tempering chains in ascending order.
    ///
    /// The ladder is rescaled every epoch so that its first temperature equals the fixed
    /// temperature of the epoch.
    #[clap(long, value_delimiter(','))]
    chain_temperatures: Vec<f64>,

    /// Probability of attempting a chain exchange after each sweep.
    #[clap(long, default_value = "0.0")]
    exchange_prob: f64,

    /// Probabilities of the merge-split, translation swap and flip operators.
    #[clap(long, value_delimiter(','))]
    operator_probs: Vec<f64>,

    /// Number of options per span considered by the operators. 0 means no limit.
    #[clap(long, default_value = "20")]
    toption_limit: usize,

    /// Online learner. Choices are perceptron, mira, and mira+.
    #[clap(short = 'a', long, default_value = "mira")]
    learner: Algorithm,

    /// Learning rate of the perceptron.
    #[clap(long, default_value = "1.0")]
    learning_rate: f64,

    /// Fixed MIRA margin. The gain gap scaled by --margin-scale is used if not given.
    #[clap(long)]
    fixed_margin: Option<f64>,

    /// Scale of the gain gap used as the MIRA margin.
    #[clap(long, default_value = "1.0")]
    margin_scale: f64,

    /// Upper bound of the MIRA step size.
    #[clap(long)]
    slack: Option<f64>,

    /// Rescales MIRA updates to this L2 norm.
    #[clap(long)]
    l2_normalise: Option<f64>,

    /// Target assignment. Choices are best, closest, and chiang.
    #[clap(long, default_value = "best")]
    assigner: Assigner,

    /// Gain difference below which a ranking violation is ignored.
    #[clap(long, default_value = "0.0")]
    tolerance: f64,

    /// Updates on every proposal, not only on ranking violations.
    #[clap(long)]
    always_update: bool,

    /// Moves the chain to the target instead of the sampled candidate.
    #[clap(long)]
    update_target: bool,

    /// Averages every n-th weight update.
    #[clap(long, default_value = "1")]
    averaging_lag: usize,

    /// Stem of the intermediate weight dumps.
    #[clap(long, requires = "dump_freq")]
    dump_stem: Option<PathBuf>,

    /// Dump frequency, counted in samples or batches.
    #[clap(long)]
    dump_freq: Option<usize>,

    /// Counts the dump frequency in batches.
    #[clap(long)]
    dump_by_batch: bool,

    /// Dumps the current weights instead of the averaged ones.
    #[clap(long)]
    dump_current: bool,

    /// Enables the sparse phrase pair feature.
    #[clap(long)]
    phrase_pair_feature: bool,

    /// Maximum distortion. No limit if not given.
    #[clap(long)]
    max_distortion: Option<usize>,
}

/// 学習処理中に発生する可能性のあるエラー
#[derive(Debug, Error)]
pub enum TrainError {
    /// 入出力エラー
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// 学習処理エラー
    #[error("Training process failed: {0}")]
    SampleRank(#[from] SampleRankError),

    /// オペレーターの確率の数が不正
    #[error("--operator-probs takes 3 values, got {0}")]
    OperatorProbs(usize),
}

fn learner_kind(args: &Args) -> Result<LearnerKind, TrainError> {
    let margin = match args.fixed_margin {
        Some(margin) => MarginMode::Fixed(margin),
        None => MarginMode::GainScaled(args.margin_scale),
    };
    let mira = MiraConfig::default()
        .margin(margin)?
        .slack(args.slack)?
        .normaliser(args.l2_normalise.map(UpdateNormaliser::L2));
    Ok(match args.learner {
        Algorithm::Perceptron => LearnerKind::Perceptron(args.learning_rate),
        Algorithm::Mira => LearnerKind::Mira(mira),
        Algorithm::MiraPlus => LearnerKind::MiraPlus(mira),
    })
}

fn sampler_config(args: &Args) -> Result<SamplerConfig, TrainError> {
    let mut config = SamplerConfig::default()
        .iterations(args.iterations)
        .burn_in(args.burn_in)
        .exchange_prob(args.exchange_prob)?
        .toption_limit(args.toption_limit);
    if !args.chain_temperatures.is_empty() {
        config = config.temperatures(args.chain_temperatures.clone())?;
    }
    match *args.operator_probs.as_slice() {
        [] => {}
        [ms, swap, flip] => config = config.operator_probs(ms, swap, flip)?,
        _ => return Err(TrainError::OperatorProbs(args.operator_probs.len())),
    }
    Ok(config)
}

fn trainer_config(args: &Args, model: &Model) -> Result<TrainerConfig, TrainError> {
    let sample_rank = SampleRankConfig::default()
        .tolerance(args.tolerance)
        .always_update(args.always_update)
        .update_target(args.update_target)
        .assigner(args.assigner.0);
    let mut config = TrainerConfig::new()
        .epochs(args.epochs)?
        .batch_lines(args.batch_lines)?
        .seed(args.seed)
        .temperature(args.temperature, args.temperature_scaling)?
        .averaging_lag(args.averaging_lag)?
        .learner(learner_kind(args)?)
        .sampler(sampler_config(args)?)
        .sample_rank(sample_rank)
        .phrase_pair_feature(args.phrase_pair_feature)
        .max_distortion(args.max_distortion);
    if !args.burn_in_annealing.is_empty() {
        config = config.burn_in_annealing(&args.burn_in_annealing)?;
    }
    if let Some(stem) = &args.dump_stem {
        let frequency = args.dump_freq.unwrap_or(0);
        config = config.dump_weights(stem, frequency, args.dump_by_batch, args.dump_current)?;
    }
    if let Some(path) = &args.weights_in {
        let rdr = BufReader::new(File::open(path)?);
        config = config.initial_weights(FeatureVector::read(rdr, &model.layout())?);
    }
    Ok(config)
}

/// 学習コマンドを実行する
///
/// # エラー
///
/// ファイルの読み書きや学習に失敗した場合、`TrainError`を返します。
pub fn run(args: Args) -> Result<(), TrainError> {
    eprintln!("Loading the model...");
    let model = Model::from_zstd(&args.model_in)?;

    eprintln!("Loading the corpus...");
    let source = BufReader::new(File::open(&args.source_in)?);
    let references = args
        .reference_in
        .iter()
        .map(|path| Ok(BufReader::new(File::open(path)?)))
        .collect::<io::Result<Vec<_>>>()?;
    let corpus = Corpus::from_readers(source, references)?;
    eprintln!("{} sentences", corpus.len());

    let config = trainer_config(&args, &model)?;
    eprintln!("Start training...");
    let weights = Trainer::new(config).train(&corpus, &model)?;

    let mut wtr = BufWriter::new(File::create(&args.weights_out)?);
    weights.write(&mut wtr, &model.layout())?;
    wtr.flush()?;
    eprintln!("Finish training. Weights written to {}", args.weights_out.display());

    Ok(())
}
