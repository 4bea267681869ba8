//! 学習の設定

use std::path::PathBuf;

use crate::annealing::AnnealingSchedule;
use crate::errors::{Result, SampleRankError};
use crate::feature_vector::FeatureVector;
use crate::learner::{MiraConfig, MiraLearner, MiraPlusLearner, OnlineLearner, PerceptronLearner};
use crate::sampler::SamplerConfig;
use crate::selector::SampleRankConfig;
use crate::weights::WeightDumper;

/// 学習器の種類
#[derive(Clone, Copy, Debug)]
pub enum LearnerKind {
    /// 学習率を指定したパーセプトロン
    Perceptron(f64),
    /// MIRA
    Mira(MiraConfig),
    /// 最適解の制約を加えたMIRA
    MiraPlus(MiraConfig),
}

impl LearnerKind {
    pub(crate) fn build(&self) -> Result<Box<dyn OnlineLearner>> {
        Ok(match *self {
            Self::Perceptron(learning_rate) => Box::new(PerceptronLearner::new(learning_rate)?),
            Self::Mira(config) => Box::new(MiraLearner::new(config)),
            Self::MiraPlus(config) => Box::new(MiraPlusLearner::new(config)),
        })
    }
}

/// 重みの書き出しの設定
#[derive(Clone, Debug)]
pub(crate) struct DumpConfig {
    pub(crate) stem: PathBuf,
    pub(crate) frequency: usize,
    pub(crate) by_batch: bool,
    pub(crate) current: bool,
}

impl DumpConfig {
    pub(crate) fn dumper(&self) -> Result<WeightDumper> {
        Ok(WeightDumper::new(&self.stem, self.frequency)?
            .by_batch(self.by_batch)
            .dump_current(self.current))
    }
}

/// SampleRankによる学習の設定
#[derive(Clone, Debug)]
pub struct TrainerConfig {
    pub(crate) epochs: usize,
    pub(crate) batch_lines: usize,
    pub(crate) seed: u64,
    pub(crate) temperature: f64,
    pub(crate) temperature_scaling: f64,
    pub(crate) burn_in_schedule: Option<AnnealingSchedule>,
    pub(crate) averaging_lag: usize,
    pub(crate) learner: LearnerKind,
    pub(crate) sampler: SamplerConfig,
    pub(crate) sample_rank: SampleRankConfig,
    pub(crate) dump: Option<DumpConfig>,
    pub(crate) initial_weights: Option<FeatureVector>,
    pub(crate) phrase_pair_feature: bool,
    pub(crate) max_distortion: Option<usize>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            epochs: 1,
            batch_lines: 1,
            seed: 0,
            temperature: 1.0,
            temperature_scaling: 1.0,
            burn_in_schedule: None,
            averaging_lag: 1,
            learner: LearnerKind::Mira(MiraConfig::default()),
            sampler: SamplerConfig::default(),
            sample_rank: SampleRankConfig::default(),
            dump: None,
            initial_weights: None,
            phrase_pair_feature: false,
            max_distortion: None,
        }
    }
}

impl TrainerConfig {
    /// 設定を既定値で作成します。
    pub fn new() -> Self {
        Self::default()
    }

    /// エポック数
    ///
    /// # エラー
    ///
    /// 0の場合にエラーを返します。
    pub fn epochs(mut self, epochs: usize) -> Result<Self> {
        if epochs == 0 {
            return Err(SampleRankError::invalid_argument(
                "epochs",
                "the number of epochs must be positive",
            ));
        }
        self.epochs = epochs;
        Ok(self)
    }

    /// 一つのバッチに含める文の数。翻訳候補はバッチごとに平均の重みで並べ替えられます。
    ///
    /// # エラー
    ///
    /// 0の場合にエラーを返します。
    pub fn batch_lines(mut self, batch_lines: usize) -> Result<Self> {
        if batch_lines == 0 {
            return Err(SampleRankError::invalid_argument(
                "batch_lines",
                "the batch size must be positive",
            ));
        }
        self.batch_lines = batch_lines;
        Ok(self)
    }

    /// 乱数のシード
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// サンプリング中の固定温度と、エポックの終わりに掛ける倍率
    ///
    /// # エラー
    ///
    /// いずれかが正の有限値でない場合にエラーを返します。
    pub fn temperature(mut self, temperature: f64, scaling: f64) -> Result<Self> {
        if !(temperature > 0.0 && temperature.is_finite()) {
            return Err(SampleRankError::invalid_argument(
                "temperature",
                "the fixed temperature must be positive",
            ));
        }
        if !(scaling > 0.0 && scaling.is_finite()) {
            return Err(SampleRankError::invalid_argument(
                "scaling",
                "the temperature scaling must be positive",
            ));
        }
        self.temperature = temperature;
        self.temperature_scaling = scaling;
        Ok(self)
    }

    /// バーンインの焼きなまし(開始温度、閾値、下限、倍率)
    ///
    /// 指定しない場合、バーンインも固定温度で行います。
    ///
    /// # エラー
    ///
    /// 値がちょうど四つでない場合にエラーを返します。
    pub fn burn_in_annealing(mut self, values: &[f64]) -> Result<Self> {
        self.burn_in_schedule = Some(AnnealingSchedule::exponential(values)?);
        Ok(self)
    }

    /// 重みを平均化する間隔
    ///
    /// # エラー
    ///
    /// 0の場合にエラーを返します。
    pub fn averaging_lag(mut self, lag: usize) -> Result<Self> {
        if lag == 0 {
            return Err(SampleRankError::invalid_argument(
                "lag",
                "the averaging lag must be positive",
            ));
        }
        self.averaging_lag = lag;
        Ok(self)
    }

    /// 学習器
    pub fn learner(mut self, learner: LearnerKind) -> Self {
        self.learner = learner;
        self
    }

    /// サンプラーの設定
    pub fn sampler(mut self, sampler: SamplerConfig) -> Self {
        self.sampler = sampler;
        self
    }

    /// SampleRankの設定
    pub fn sample_rank(mut self, sample_rank: SampleRankConfig) -> Self {
        self.sample_rank = sample_rank;
        self
    }

    /// 重みの書き出し
    ///
    /// # 引数
    ///
    /// * `stem` - 書き出し先の接頭辞
    /// * `frequency` - 書き出しの頻度
    /// * `by_batch` - 頻度をバッチ単位で数えるかどうか。偽の場合はサンプル単位です。
    /// * `current` - 平均ではなく現在の重みを書き出すかどうか
    ///
    /// # エラー
    ///
    /// `frequency`が0の場合にエラーを返します。
    pub fn dump_weights<P>(
        mut self,
        stem: P,
        frequency: usize,
        by_batch: bool,
        current: bool,
    ) -> Result<Self>
    where
        P: Into<PathBuf>,
    {
        if frequency == 0 {
            return Err(SampleRankError::invalid_argument(
                "frequency",
                "a weight dump stem requires a positive dump frequency",
            ));
        }
        self.dump = Some(DumpConfig {
            stem: stem.into(),
            frequency,
            by_batch,
            current,
        });
        Ok(self)
    }

    /// 初期の重み。指定しない場合はレイアウトの既定値を使います。
    pub fn initial_weights(mut self, weights: FeatureVector) -> Self {
        self.initial_weights = Some(weights);
        self
    }

    /// フレーズ対の指示素性を使うかどうか
    pub fn phrase_pair_feature(mut self, enabled: bool) -> Self {
        self.phrase_pair_feature = enabled;
        self
    }

    /// 歪みの上限
    pub fn max_distortion(mut self, max_distortion: Option<usize>) -> Self {
        self.max_distortion = max_distortion;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        assert!(TrainerConfig::new().epochs(0).is_err());
        assert!(TrainerConfig::new().batch_lines(0).is_err());
        assert!(TrainerConfig::new().temperature(0.0, 1.0).is_err());
        assert!(TrainerConfig::new().temperature(1.0, -1.0).is_err());
        assert!(TrainerConfig::new().burn_in_annealing(&[10.0, 1.0]).is_err());
        assert!(TrainerConfig::new().dump_weights("w", 0, false, false).is_err());
        assert!(TrainerConfig::new().burn_in_annealing(&[10.0, 1.0, 1.0, 0.9]).is_ok());
    }
}
