//! Gibbsサンプリングで翻訳するユーティリティ
//!
//! このバイナリは、標準入力から読み込んだ原言語文を一行ずつサンプリングし、
//! 指定された出力形式(best、samples、detail)で結果を出力します。

use std::error::Error;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::str::FromStr;

use samplerank::collector::PrintCollector;
use samplerank::extra_feature::{ExtraFeature, PhrasePairFeature};
use samplerank::selector::{AcceptorSelector, DeltaSelector};
use samplerank::utils::split_words;
use samplerank::{
    FeatureSet, FeatureVector, FixedTempAcceptor, GreedyAcceptor, MaxTranslationCollector, Model,
    Sample, Sampler, SamplerConfig, SamplerContext, TranslationOptionCollection,
};

use clap::Parser;

/// 出力モード
#[derive(Clone, Debug)]
enum OutputMode {
    Best,
    Samples,
    Detail,
}

impl FromStr for OutputMode {
    type Err = &'static str;

    fn from_str(mode: &str) -> Result<Self, Self::Err> {
        match mode {
            "best" => Ok(Self::Best),
            "samples" => Ok(Self::Samples),
            "detail" => Ok(Self::Detail),
            _ => Err("Could not parse a mode"),
        }
    }
}

/// コマンドライン引数
#[derive(Parser, Debug)]
#[clap(name = "decode", about = "Translates sentences by Gibbs sampling")]
struct Args {
    /// Binary model (in zstd).
    #[clap(short = 'm', long)]
    model_in: PathBuf,

    /// Weights. The defaults of the model are used if not given.
    #[clap(short = 'w', long)]
    weights_in: Option<PathBuf>,

    /// Output mode. Choices are best, samples, and detail.
    ///
    /// `best` prints the most frequently sampled translation, `samples` prints every
    /// collected sample, and `detail` adds feature values and importance weights.
    /// Samples of each sentence are followed by an empty line.
    #[clap(short = 'O', long, default_value = "best")]
    output_mode: OutputMode,

    /// Number of sampling iterations per sentence.
    #[clap(short = 'i', long, default_value = "1000")]
    iterations: usize,

    /// Number of burn-in iterations per sentence.
    #[clap(short = 'b', long, default_value = "0")]
    burn_in: usize,

    /// Collects every n-th sample.
    #[clap(long, default_value = "1")]
    lag: usize,

    /// Seed of the random number generator.
    #[clap(long, default_value = "0")]
    seed: u64,

    /// Sampling temperature.
    #[clap(short = 'T', long, default_value = "1.0")]
    temperature: f64,

    /// Always picks the highest-scoring proposal.
    #[clap(long)]
    greedy: bool,

    /// Burn-in annealing: start, stop, floor and ratio.
    #[clap(long, value_delimiter(','))]
    burn_in_annealing: Vec<f64>,

    /// Temperatures of the tempering chains in ascending order.
    ///
    /// The ladder is rescaled so that its first temperature equals --temperature.
    #[clap(long, value_delimiter(','))]
    chain_temperatures: Vec<f64>,

    /// Probability of attempting a chain exchange after each sweep.
    #[clap(long, default_value = "0.0")]
    exchange_prob: f64,

    /// Number of options per span considered by the operators. 0 means no limit.
    #[clap(long, default_value = "20")]
    toption_limit: usize,

    /// Enables the sparse phrase pair feature.
    #[clap(long)]
    phrase_pair_feature: bool,

    /// Maximum distortion. No limit if not given.
    #[clap(long)]
    max_distortion: Option<usize>,
}

fn sampler_config(args: &Args) -> Result<SamplerConfig, Box<dyn Error>> {
    let mut config = SamplerConfig::default()
        .iterations(args.iterations)
        .burn_in(args.burn_in)
        .lag(args.lag)?
        .exchange_prob(args.exchange_prob)?
        .toption_limit(args.toption_limit);
    if !args.chain_temperatures.is_empty() {
        config = config.temperatures(args.chain_temperatures.clone())?;
    }
    config = config.rescale_temperatures(args.temperature)?;
    if !args.burn_in_annealing.is_empty() {
        config = config.burn_in_annealing(&args.burn_in_annealing)?;
    }
    Ok(config)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();

    eprintln!("Loading the model...");
    let model = Model::from_zstd(&args.model_in)?;
    let layout = model.layout();
    let weights = match &args.weights_in {
        Some(path) => FeatureVector::read(BufReader::new(File::open(path)?), &layout)?,
        None => layout.default_weights(),
    };

    let mut features =
        FeatureSet::new(layout, model.language_model()).max_distortion(args.max_distortion);
    if args.phrase_pair_feature {
        features = features.extra(ExtraFeature::PhrasePair(PhrasePairFeature::new()));
    }
    let config = sampler_config(&args)?;
    let mut ctx = SamplerContext::new(args.seed, weights);
    let mut selector: Box<dyn DeltaSelector> = if args.greedy {
        Box::new(AcceptorSelector::new(GreedyAcceptor::new()))
    } else {
        Box::new(AcceptorSelector::new(FixedTempAcceptor::new(args.temperature)?))
    };

    eprintln!("Ready to decode");

    let is_tty = atty::is(atty::Stream::Stdout);

    let out = std::io::stdout();
    let mut out = BufWriter::new(out.lock());
    let lines = std::io::stdin().lock().lines();
    for line in lines {
        let line = line?;
        let source = split_words(&line);
        if source.is_empty() {
            out.write_all(b"\n")?;
            continue;
        }
        let toc = TranslationOptionCollection::from_phrase_table(
            model.phrase_table(),
            source.clone(),
            &ctx.weights,
        )?;
        let mut sample = Sample::new(source, &toc.seed_derivation()?, &features)?;
        let mut sampler = Sampler::new(config.clone())?;

        match args.output_mode {
            OutputMode::Best => {
                let mut best = MaxTranslationCollector::new();
                sampler.run(
                    &mut sample,
                    &toc,
                    &features,
                    selector.as_mut(),
                    &mut ctx,
                    &mut [&mut best],
                    |_| false,
                )?;
                let translation = best.max().map_or(String::new(), |(t, _)| t.to_string());
                out.write_all(translation.as_bytes())?;
                out.write_all(b"\n")?;
            }
            OutputMode::Samples | OutputMode::Detail => {
                let detail = matches!(args.output_mode, OutputMode::Detail);
                let mut printer = PrintCollector::new(&mut out, &layout).detail(detail);
                sampler.run(
                    &mut sample,
                    &toc,
                    &features,
                    selector.as_mut(),
                    &mut ctx,
                    &mut [&mut printer],
                    |_| false,
                )?;
                out.write_all(b"\n")?;
            }
        }
        if is_tty {
            out.flush()?;
        }
    }

    Ok(())
}
