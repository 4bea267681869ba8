//! SampleRankによる重みの学習
//!
//! 各文についてGibbsサンプリングを行い、サンプリング中に見つかった順位の逆転から
//! オンライン学習器で重みを更新します。学習結果は平均化された重みです。
//!
//! # 使用例
//!
//! ```
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use samplerank::model::ModelBuilder;
//! use samplerank::sampler::SamplerConfig;
//! use samplerank::trainer::{Corpus, Trainer, TrainerConfig};
//!
//! let phrases = "das ||| the ||| 0.6\n\
//!                das ||| that ||| 0.4\n\
//!                haus ||| house ||| 0.7\n\
//!                haus ||| home ||| 0.3\n";
//! let arpa = "\\data\\\nngram 1=5\n\n\\1-grams:\n\
//!             -1.0\t<s>\n-1.0\t</s>\n-0.5\tthe\n-0.7\thouse\n-0.9\tthat\n\n\\end\\\n";
//! let model = ModelBuilder::from_readers(phrases.as_bytes(), arpa.as_bytes())?;
//!
//! let corpus = Corpus::from_readers("das haus\n".as_bytes(), ["the house\n".as_bytes()])?;
//! let config = TrainerConfig::new()
//!     .epochs(2)?
//!     .sampler(SamplerConfig::default().iterations(10).operator_probs(1.0, 0.0, 0.0)?);
//! let weights = Trainer::new(config).train(&corpus, &model)?;
//! assert_eq!(model.layout().len(), weights.dense_len());
//! # Ok(())
//! # }
//! ```

mod config;
mod corpus;

use crate::acceptor::{AnnealedAcceptor, FixedTempAcceptor};
use crate::annealing::AnnealingSchedule;
use crate::context::SamplerContext;
use crate::errors::Result;
use crate::extra_feature::{ExtraFeature, PhrasePairFeature};
use crate::feature_vector::FeatureVector;
use crate::features::FeatureSet;
use crate::gain::SentenceBleu;
use crate::model::Model;
use crate::options::TranslationOptionCollection;
use crate::sample::Sample;
use crate::sampler::Sampler;
use crate::selector::SampleRankSelector;
use crate::weights::WeightAverager;

pub use crate::trainer::config::{LearnerKind, TrainerConfig};
pub use crate::trainer::corpus::{Corpus, Example};

/// SampleRankのトレーナー
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    /// 設定からトレーナーを作成します。
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    /// 設定
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// エポック`epoch`(0始まり)の固定温度
    ///
    /// 連鎖0の選択器と連鎖の交換は、どちらもこの温度を使います。
    /// 他の連鎖の温度は、サンプラーの設定での比を保ったまま追従します。
    pub fn epoch_temperature(&self, epoch: usize) -> f64 {
        let mut temperature = self.config.temperature;
        for _ in 0..epoch {
            temperature *= self.config.temperature_scaling;
        }
        temperature
    }

    /// 学習を行い、平均化された重みを返します。
    ///
    /// # 引数
    ///
    /// * `corpus` - 学習に使う対訳コーパス
    /// * `model` - 翻訳モデル
    ///
    /// # エラー
    ///
    /// 設定が不正な場合や、初期導出を作れない文がある場合、
    /// 重みの書き出しに失敗した場合にエラーを返します。
    pub fn train(&self, corpus: &Corpus, model: &Model) -> Result<FeatureVector> {
        let config = &self.config;
        let layout = model.layout();
        let weights = config
            .initial_weights
            .clone()
            .unwrap_or_else(|| layout.default_weights());
        let mut ctx = SamplerContext::new(config.seed, weights);
        let mut averager = WeightAverager::new(config.averaging_lag)?;
        let mut dumper = config.dump.as_ref().map(|d| d.dumper()).transpose()?;
        let mut learner = config.learner.build()?;
        let mut sampler = Sampler::new(config.sampler.clone())?;

        let mut features = FeatureSet::new(layout, model.language_model())
            .max_distortion(config.max_distortion);
        if config.phrase_pair_feature {
            features = features.extra(ExtraFeature::PhrasePair(PhrasePairFeature::new()));
        }

        for epoch in 0..config.epochs {
            let temperature = self.epoch_temperature(epoch);
            sampler.set_target_temperature(temperature)?;
            log::info!("epoch {epoch}: fixed temperature {temperature}");
            for (b, batch) in corpus.chunks(config.batch_lines).enumerate() {
                // Options are ranked by the averaged weights once any have been collected.
                let ranking = averager.average(&ctx.weights);
                let mut num_samples = 0;
                for example in batch {
                    let toc = TranslationOptionCollection::from_phrase_table(
                        model.phrase_table(),
                        example.source.clone(),
                        &ranking,
                    )?;
                    let seed = toc.seed_derivation()?;
                    let mut sample = Sample::new(example.source.clone(), &seed, &features)?;
                    let gain = SentenceBleu::new(&example.references)?;
                    let burn_in_schedule = config.burn_in_schedule.unwrap_or(
                        AnnealingSchedule::Exponential {
                            start: temperature,
                            stop: temperature,
                            floor: temperature,
                            ratio: 1.0,
                        },
                    );
                    let mut selector = SampleRankSelector::new(
                        config.sample_rank,
                        Box::new(FixedTempAcceptor::new(temperature)?),
                        Box::new(AnnealedAcceptor::new(burn_in_schedule)),
                        learner.as_mut(),
                        &gain,
                        &mut averager,
                    );
                    let stats = sampler.run(
                        &mut sample,
                        &toc,
                        &features,
                        &mut selector,
                        &mut ctx,
                        &mut [],
                        |_| false,
                    )?;
                    num_samples += stats.samples;
                    log::debug!("final translation: {}", sample.translation());
                }

                if let Some(dumper) = dumper.as_mut() {
                    let ticks = if dumper.counts_batches() { 1 } else { num_samples };
                    for _ in 0..ticks {
                        dumper.tick(&averager, &ctx.weights, &layout)?;
                    }
                }
                log::info!(
                    "epoch {epoch} batch {b}: {} updates, {} weights averaged",
                    learner.num_updates(),
                    averager.num_collected()
                );
            }
        }

        Ok(averager.average(&ctx.weights))
    }
}
