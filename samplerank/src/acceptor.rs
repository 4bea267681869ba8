//! 候補の選択器
//!
//! 候補のスコアから一つの候補を選びます。

use rand::Rng;

use crate::annealing::AnnealingSchedule;
use crate::context::SamplerRng;
use crate::errors::{Result, SampleRankError};
use crate::utils::{log_add, log_sum_exp};

/// 候補のスコアから一つを選ぶ選択器
pub trait SampleAcceptor {
    /// 候補を一つ選び、その位置を返します。候補がない場合は`None`を返します。
    ///
    /// # 引数
    ///
    /// * `scores` - 各候補の重み付きスコア
    /// * `iteration` - 現在の反復回数。焼きなましで使われます。
    /// * `rng` - 乱数生成器
    fn choose(&self, scores: &[f64], iteration: usize, rng: &mut SamplerRng) -> Option<usize>;
}

/// 最もスコアの高い候補を選びます。同点の場合は先頭に近いものを選びます。
#[derive(Clone, Copy, Debug, Default)]
pub struct GreedyAcceptor {}

impl GreedyAcceptor {
    /// 新しい選択器を作成します。
    pub fn new() -> Self {
        Self::default()
    }
}

impl SampleAcceptor for GreedyAcceptor {
    fn choose(&self, scores: &[f64], _iteration: usize, _rng: &mut SamplerRng) -> Option<usize> {
        argmax(scores)
    }
}

/// 固定温度で候補をサンプリングします。
#[derive(Clone, Copy, Debug)]
pub struct FixedTempAcceptor {
    temperature: f64,
}

impl FixedTempAcceptor {
    /// 温度を指定して作成します。
    ///
    /// # エラー
    ///
    /// 温度が正の有限値でない場合にエラーを返します。
    pub fn new(temperature: f64) -> Result<Self> {
        if !(temperature > 0.0 && temperature.is_finite()) {
            return Err(SampleRankError::invalid_argument(
                "temperature",
                format!("the temperature must be positive, got {temperature}"),
            ));
        }
        Ok(Self { temperature })
    }

    /// 温度
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// 温度を`factor`倍します。
    ///
    /// # エラー
    ///
    /// 結果の温度が正の有限値でない場合にエラーを返します。
    pub fn scale(&mut self, factor: f64) -> Result<()> {
        *self = Self::new(self.temperature * factor)?;
        Ok(())
    }
}

impl SampleAcceptor for FixedTempAcceptor {
    fn choose(&self, scores: &[f64], _iteration: usize, rng: &mut SamplerRng) -> Option<usize> {
        sample_index(scores, self.temperature, rng)
    }
}

/// 焼きなましのスケジュールに従う温度で候補をサンプリングします。
#[derive(Clone, Copy, Debug)]
pub struct AnnealedAcceptor {
    schedule: AnnealingSchedule,
}

impl AnnealedAcceptor {
    /// スケジュールを指定して作成します。
    pub fn new(schedule: AnnealingSchedule) -> Self {
        Self { schedule }
    }
}

impl SampleAcceptor for AnnealedAcceptor {
    fn choose(&self, scores: &[f64], iteration: usize, rng: &mut SamplerRng) -> Option<usize> {
        sample_index(scores, self.schedule.temperature(iteration), rng)
    }
}

/// 最大値の位置。同点の場合は先頭に近いものを返します。
pub fn argmax(scores: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &s) in scores.iter().enumerate() {
        if best.is_none_or(|(_, b)| s > b) {
            best = Some((i, s));
        }
    }
    best.map(|(i, _)| i)
}

/// スコアを温度で割り、正規化した対数確率を返します。
///
/// # 例
///
/// ```
/// use samplerank::acceptor::normalised_log_probs;
///
/// let probs = normalised_log_probs(&[0.0, 0.0], 1.0);
/// assert!((probs[0] - 0.5f64.ln()).abs() < 1e-12);
/// ```
pub fn normalised_log_probs(scores: &[f64], temperature: f64) -> Vec<f64> {
    let scaled: Vec<f64> = scores.iter().map(|s| s / temperature).collect();
    let z = log_sum_exp(&scaled);
    scaled.into_iter().map(|s| s - z).collect()
}

/// 一様乱数一つを使った対数空間での逆関数法で位置を選びます。
fn sample_index(scores: &[f64], temperature: f64, rng: &mut SamplerRng) -> Option<usize> {
    if scores.is_empty() {
        return None;
    }
    let log_probs = normalised_log_probs(scores, temperature);
    if log_probs.iter().any(|p| p.is_nan()) {
        log::debug!("degenerate scores {scores:?}, falling back to argmax");
        return argmax(scores);
    }
    let target = rng.random::<f64>().ln();
    let mut cumulative = f64::NEG_INFINITY;
    for (i, &p) in log_probs.iter().enumerate() {
        cumulative = log_add(cumulative, p);
        if target <= cumulative {
            return Some(i);
        }
    }
    // Rounding can leave the total slightly below 0.
    log_probs.iter().rposition(|&p| p > f64::NEG_INFINITY)
}
