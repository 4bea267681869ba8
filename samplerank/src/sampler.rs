//! Gibbsサンプラー
//!
//! サンプラーはバーンイン、サンプリング、終了の三つの状態を持ちます。
//!
//! - バーンイン: 焼きなましの温度で走査します。利得の計算と学習は行いません。
//! - サンプリング: 選択器が利得を計算して学習し、収集器にサンプルを渡します。
//! - 終了: 反復回数の上限、外部の停止条件、またはサンプル数の上限に達した状態です。
//!
//! 複数の連鎖を異なる温度で走らせるレプリカ交換にも対応します。
//! 最も温度の低い連鎖(連鎖0)だけが収集と学習の対象です。

use rand::Rng;

use crate::acceptor::{AnnealedAcceptor, FixedTempAcceptor};
use crate::annealing::AnnealingSchedule;
use crate::collector::{ImportanceCorrection, SampleCollector};
use crate::context::SamplerContext;
use crate::errors::{Result, SampleRankError};
use crate::features::FeatureSet;
use crate::operator::{
    self, FlipOperator, GibbsOperator, MergeSplitOperator, TranslationSwapOperator,
};
use crate::options::TranslationOptionCollection;
use crate::sample::Sample;
use crate::selector::{AcceptorSelector, DeltaSelector};

const PROBABILITY_TOLERANCE: f64 = 1e-5;

/// サンプラーの状態
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplerState {
    /// バーンイン中
    BurnIn,
    /// サンプリング中
    Sampling,
    /// 終了
    Terminal,
}

/// サンプラーの設定
#[derive(Clone, Debug)]
pub struct SamplerConfig {
    iterations: usize,
    burn_in: usize,
    lag: usize,
    max_samples: Option<usize>,
    temperatures: Vec<f64>,
    exchange_prob: f64,
    burn_in_schedule: Option<AnnealingSchedule>,
    operator_probs: [f64; 3],
    toption_limit: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            iterations: 1000,
            burn_in: 0,
            lag: 1,
            max_samples: None,
            temperatures: vec![1.0],
            exchange_prob: 0.0,
            burn_in_schedule: None,
            operator_probs: [1.0 / 3.0; 3],
            toption_limit: 20,
        }
    }
}

impl SamplerConfig {
    /// サンプリングの反復回数
    pub fn iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// バーンインの反復回数
    pub fn burn_in(mut self, burn_in: usize) -> Self {
        self.burn_in = burn_in;
        self
    }

    /// 何回の反復ごとにサンプルを収集するか
    ///
    /// # エラー
    ///
    /// `lag`が0の場合にエラーを返します。
    pub fn lag(mut self, lag: usize) -> Result<Self> {
        if lag == 0 {
            return Err(SampleRankError::invalid_argument(
                "lag",
                "the collection lag must be positive",
            ));
        }
        self.lag = lag;
        Ok(self)
    }

    /// 収集するサンプル数の上限
    pub fn max_samples(mut self, max_samples: Option<usize>) -> Self {
        self.max_samples = max_samples;
        self
    }

    /// 各連鎖の温度。先頭が目標の温度です。
    ///
    /// # エラー
    ///
    /// 空の場合や、温度が正でない場合、昇順でない場合にエラーを返します。
    pub fn temperatures(mut self, temperatures: Vec<f64>) -> Result<Self> {
        if temperatures.is_empty() {
            return Err(SampleRankError::invalid_argument(
                "temperatures",
                "at least one chain temperature is required",
            ));
        }
        if temperatures.iter().any(|&t| !(t > 0.0 && t.is_finite())) {
            return Err(SampleRankError::invalid_argument(
                "temperatures",
                "chain temperatures must be positive",
            ));
        }
        if temperatures.windows(2).any(|w| w[0] > w[1]) {
            return Err(SampleRankError::invalid_argument(
                "temperatures",
                "chain temperatures must be in ascending order",
            ));
        }
        self.temperatures = temperatures;
        Ok(self)
    }

    /// 目標の温度(連鎖0の温度)を変更します。
    ///
    /// 他の連鎖の温度は、目標の温度との比を保ったまま拡大縮小されます。
    ///
    /// # エラー
    ///
    /// 温度が正の有限値でない場合にエラーを返します。
    pub fn rescale_temperatures(mut self, temperature: f64) -> Result<Self> {
        if !(temperature > 0.0 && temperature.is_finite()) {
            return Err(SampleRankError::invalid_argument(
                "temperature",
                "the target temperature must be positive",
            ));
        }
        let ratio = temperature / self.temperatures[0];
        for t in &mut self.temperatures[1..] {
            *t *= ratio;
        }
        self.temperatures[0] = temperature;
        Ok(self)
    }

    /// 走査のたびに連鎖の交換を試みる確率
    ///
    /// # エラー
    ///
    /// `[0, 1]`の範囲外の場合にエラーを返します。
    pub fn exchange_prob(mut self, exchange_prob: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&exchange_prob) {
            return Err(SampleRankError::invalid_argument(
                "exchange_prob",
                "the exchange probability must be in [0, 1]",
            ));
        }
        self.exchange_prob = exchange_prob;
        Ok(self)
    }

    /// バーンインの焼きなまし(開始温度、閾値、下限、倍率)
    ///
    /// # エラー
    ///
    /// 値がちょうど四つでない場合や、不正な値を含む場合にエラーを返します。
    pub fn burn_in_annealing(mut self, values: &[f64]) -> Result<Self> {
        self.burn_in_schedule = Some(AnnealingSchedule::exponential(values)?);
        Ok(self)
    }

    /// 各オペレーターを選ぶ確率(結合分割、訳語交換、入れ替え)
    ///
    /// # エラー
    ///
    /// 負の値を含む場合や、和が1でない場合にエラーを返します。
    pub fn operator_probs(mut self, merge_split: f64, swap: f64, flip: f64) -> Result<Self> {
        let probs = [merge_split, swap, flip];
        if probs.iter().any(|&p| p < 0.0) {
            return Err(SampleRankError::invalid_argument(
                "operator_probs",
                "operator probabilities must not be negative",
            ));
        }
        let sum: f64 = probs.iter().sum();
        if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(SampleRankError::invalid_argument(
                "operator_probs",
                format!("operator probabilities must sum to 1, got {sum}"),
            ));
        }
        self.operator_probs = probs;
        Ok(self)
    }

    /// オペレーターが区間ごとに考慮する翻訳候補の数。0は無制限です。
    pub fn toption_limit(mut self, toption_limit: usize) -> Self {
        self.toption_limit = toption_limit;
        self
    }

    /// 各連鎖の温度
    pub fn chain_temperatures(&self) -> &[f64] {
        &self.temperatures
    }
}

/// 一回の実行の集計
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SamplerStats {
    /// 走査の回数
    pub sweeps: usize,
    /// 連鎖0で適用された書き換えの数
    pub applied: usize,
    /// 収集したサンプルの数
    pub samples: usize,
    /// 成立した連鎖の交換の数
    pub exchanges: usize,
}

/// Gibbsサンプラー
pub struct Sampler {
    config: SamplerConfig,
    operators: Vec<(f64, Box<dyn GibbsOperator>)>,
    chain_selectors: Vec<AcceptorSelector<FixedTempAcceptor>>,
    burn_in_selector: Option<AcceptorSelector<AnnealedAcceptor>>,
    correction: ImportanceCorrection,
    state: SamplerState,
}

impl Sampler {
    /// 設定からサンプラーを作成します。
    ///
    /// # エラー
    ///
    /// 連鎖の温度から選択器を作れない場合にエラーを返します。
    pub fn new(config: SamplerConfig) -> Result<Self> {
        let [merge_split, swap, flip] = config.operator_probs;
        let merge_split_op: Box<dyn GibbsOperator> =
            Box::new(MergeSplitOperator::new(config.toption_limit));
        let swap_op: Box<dyn GibbsOperator> =
            Box::new(TranslationSwapOperator::new(config.toption_limit));
        let flip_op: Box<dyn GibbsOperator> = Box::new(FlipOperator::new());
        let operators = vec![(merge_split, merge_split_op), (swap, swap_op), (flip, flip_op)];
        let chain_selectors = hot_chain_selectors(&config.temperatures)?;
        let burn_in_selector = config
            .burn_in_schedule
            .map(|schedule| AcceptorSelector::new(AnnealedAcceptor::new(schedule)));
        Ok(Self {
            config,
            operators,
            chain_selectors,
            burn_in_selector,
            correction: ImportanceCorrection::default(),
            state: SamplerState::BurnIn,
        })
    }

    /// 収集の前に取り除く補助素性を設定します。
    pub fn importance_correction(mut self, correction: ImportanceCorrection) -> Self {
        self.correction = correction;
        self
    }

    /// 設定
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// 目標の温度を変更し、他の連鎖の選択器を作り直します。
    ///
    /// 連鎖0の選択器は呼び出し側が渡すため、その温度と交換で使う温度を揃えるために使います。
    ///
    /// # エラー
    ///
    /// 温度が正の有限値でない場合にエラーを返します。
    pub fn set_target_temperature(&mut self, temperature: f64) -> Result<()> {
        let config = self.config.clone().rescale_temperatures(temperature)?;
        self.chain_selectors = hot_chain_selectors(&config.temperatures)?;
        self.config = config;
        Ok(())
    }

    /// 現在の状態
    pub fn state(&self) -> SamplerState {
        self.state
    }

    fn choose_operator(&self, ctx: &mut SamplerContext) -> usize {
        let u: f64 = ctx.rng.random();
        let mut acc = 0.0;
        for (i, (p, _)) in self.operators.iter().enumerate() {
            acc += p;
            if u < acc {
                return i;
            }
        }
        // Rounding can leave u above the last cumulative sum.
        self.operators
            .iter()
            .rposition(|(p, _)| *p > 0.0)
            .unwrap_or(0)
    }

    fn transition(&mut self, iteration: usize, stopped: bool, stats: &SamplerStats) {
        let next = if stopped
            || iteration >= self.config.burn_in + self.config.iterations
            || self.config.max_samples.is_some_and(|m| stats.samples >= m)
        {
            SamplerState::Terminal
        } else if iteration >= self.config.burn_in {
            SamplerState::Sampling
        } else {
            SamplerState::BurnIn
        };
        if next != self.state {
            log::debug!("sampler: {:?} -> {:?} after {iteration} sweeps", self.state, next);
            self.state = next;
        }
    }

    /// サンプリングを実行します。
    ///
    /// 終了時には`sample`が連鎖0の最終状態に置き換えられます。
    ///
    /// # 引数
    ///
    /// * `sample` - 初期サンプル
    /// * `toc` - 翻訳候補の集合
    /// * `features` - 素性の集合
    /// * `selector` - 連鎖0の選択器
    /// * `ctx` - 乱数生成器と重み
    /// * `collectors` - サンプルの収集器
    /// * `stop` - 走査ごとに確認される停止条件。完了した走査数を受け取ります。
    ///
    /// # エラー
    ///
    /// 書き換えの適用や収集に失敗した場合にエラーを返します。
    #[allow(clippy::too_many_arguments)]
    pub fn run<F>(
        &mut self,
        sample: &mut Sample,
        toc: &TranslationOptionCollection,
        features: &FeatureSet,
        selector: &mut dyn DeltaSelector,
        ctx: &mut SamplerContext,
        collectors: &mut [&mut dyn SampleCollector],
        mut stop: F,
    ) -> Result<SamplerStats>
    where
        F: FnMut(usize) -> bool,
    {
        let mut chains = vec![sample.clone(); self.config.temperatures.len()];
        let mut stats = SamplerStats::default();
        self.state = SamplerState::BurnIn;
        self.transition(0, false, &stats);

        while self.state != SamplerState::Terminal {
            let burn_in = self.state == SamplerState::BurnIn;
            let iteration = if burn_in {
                stats.sweeps
            } else {
                stats.sweeps - self.config.burn_in
            };
            let op = self.choose_operator(ctx);
            let gibbs = self.operators[op].1.as_mut();

            selector.set_burn_in(burn_in);
            let chain_selector: &mut dyn DeltaSelector = match self.burn_in_selector.as_mut() {
                Some(annealed) if burn_in => annealed as &mut dyn DeltaSelector,
                _ => &mut *selector,
            };
            stats.applied += operator::sweep(
                gibbs,
                &mut chains[0],
                toc,
                features,
                chain_selector,
                ctx,
                iteration,
            )?;
            for (chain, chain_selector) in chains[1..].iter_mut().zip(&mut self.chain_selectors) {
                operator::sweep(gibbs, chain, toc, features, chain_selector, ctx, iteration)?;
            }

            if chains.len() > 1 && ctx.rng.random::<f64>() < self.config.exchange_prob {
                stats.exchanges += exchange(&mut chains, &self.config.temperatures, ctx);
            }

            if !burn_in && iteration % self.config.lag == 0 {
                let mut fv = chains[0].feature_values().clone();
                let importance_weight = self.correction.strip(&mut fv, &ctx.weights);
                for collector in collectors.iter_mut() {
                    collector.collect(&chains[0], &fv, importance_weight)?;
                }
                stats.samples += 1;
            }

            stats.sweeps += 1;
            let stopped = stop(stats.sweeps);
            self.transition(stats.sweeps, stopped, &stats);
        }

        log::debug!(
            "sampler finished: {} sweeps, {} samples, {} exchanges",
            stats.sweeps,
            stats.samples,
            stats.exchanges
        );
        *sample = chains.swap_remove(0);
        Ok(stats)
    }
}

fn hot_chain_selectors(
    temperatures: &[f64],
) -> Result<Vec<AcceptorSelector<FixedTempAcceptor>>> {
    temperatures[1..]
        .iter()
        .map(|&t| Ok(AcceptorSelector::new(FixedTempAcceptor::new(t)?)))
        .collect()
}

/// 隣接する連鎖の交換を試みます。
///
/// 範囲内の軸をランダムに選んで交換を試み、その左右の範囲で再帰的に繰り返します。
/// 軸`k`での交換の受理確率の対数は`(s_k - s_{k+1})(1/T_{k+1} - 1/T_k)`です。
///
/// # 戻り値
///
/// 成立した交換の数
pub fn exchange(chains: &mut [Sample], temperatures: &[f64], ctx: &mut SamplerContext) -> usize {
    if chains.len() < 2 {
        return 0;
    }
    let k = ctx.rng.random_range(0..chains.len() - 1);
    let s_k = chains[k].feature_values().inner_product(&ctx.weights);
    let s_next = chains[k + 1].feature_values().inner_product(&ctx.weights);
    let log_alpha = (s_k - s_next) * (1.0 / temperatures[k + 1] - 1.0 / temperatures[k]);
    let u: f64 = ctx.rng.random();
    let mut exchanged = 0;
    if u.ln() < log_alpha {
        log::debug!("exchanged chains {k} and {}", k + 1);
        chains.swap(k, k + 1);
        exchanged += 1;
    }
    let (left, right) = chains.split_at_mut(k + 1);
    exchanged += exchange(&mut left[..k], &temperatures[..k], ctx);
    exchanged += exchange(&mut right[1..], &temperatures[k + 2..], ctx);
    exchanged
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 設定の検証のテスト
    #[test]
    fn test_config_validation() {
        assert!(SamplerConfig::default().lag(0).is_err());
        assert!(SamplerConfig::default().temperatures(vec![]).is_err());
        assert!(SamplerConfig::default().temperatures(vec![1.0, 0.5]).is_err());
        assert!(SamplerConfig::default().temperatures(vec![1.0, -2.0]).is_err());
        assert!(SamplerConfig::default().exchange_prob(1.5).is_err());
        assert!(SamplerConfig::default().operator_probs(0.5, 0.5, 0.5).is_err());
        assert!(SamplerConfig::default().operator_probs(1.5, -0.5, 0.0).is_err());

        let config = SamplerConfig::default()
            .temperatures(vec![1.0, 2.0, 4.0])
            .unwrap()
            .operator_probs(0.5, 0.25, 0.25)
            .unwrap();
        assert_eq!(config.chain_temperatures(), &[1.0, 2.0, 4.0]);

        let config = config.rescale_temperatures(0.5).unwrap();
        assert_eq!(config.chain_temperatures(), &[0.5, 1.0, 2.0]);
        assert!(config.rescale_temperatures(0.0).is_err());
    }
}
