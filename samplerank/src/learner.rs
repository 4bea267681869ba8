//! オンライン学習器
//!
//! サンプリング中の順位の逆転(モデルのスコアでは下なのに利得では上の候補)から重みを更新します。

use crate::errors::{Result, SampleRankError};
use crate::feature_vector::FeatureVector;
use crate::hildreth::Hildreth;

/// 学習器に渡される候補
#[derive(Clone, Debug)]
pub struct Candidate {
    /// 候補を適用した場合のサンプル全体の素性値
    pub features: FeatureVector,
    /// 候補の利得
    pub gain: f64,
}

impl Candidate {
    /// 重みの下でのスコア
    pub fn score(&self, weights: &FeatureVector) -> f64 {
        self.features.inner_product(weights)
    }
}

/// オンライン学習器
pub trait OnlineLearner {
    /// 学習器の名前
    fn name(&self) -> &'static str;

    /// 重みを更新します。
    ///
    /// # 引数
    ///
    /// * `current` - 選ばれた候補
    /// * `target` - 目標の候補
    /// * `optimal` - これまでに見つかった最も利得の高い解
    /// * `weights` - 更新される重み
    ///
    /// # 戻り値
    ///
    /// 重みが変更された場合は`true`
    fn update(
        &mut self,
        current: &Candidate,
        target: &Candidate,
        optimal: Option<&Candidate>,
        weights: &mut FeatureVector,
    ) -> bool;

    /// 最も利得の高い解を使うかどうか
    fn uses_optimal(&self) -> bool {
        false
    }

    /// これまでに重みを変更した回数
    fn num_updates(&self) -> usize;
}

/// 更新ベクトルの正規化
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UpdateNormaliser {
    /// L1ノルムを指定の値にします。
    L1(f64),
    /// L2ノルムを指定の値にします。
    L2(f64),
}

impl UpdateNormaliser {
    /// 更新ベクトルを正規化します。零ベクトルはそのままです。
    pub fn normalise(&self, update: &mut FeatureVector) {
        let (norm, target) = match *self {
            Self::L1(target) => (update.l1_norm(), target),
            Self::L2(target) => (update.l2_norm(), target),
        };
        if norm > 0.0 {
            *update *= target / norm;
        }
    }
}

/// パーセプトロン
#[derive(Clone, Debug)]
pub struct PerceptronLearner {
    learning_rate: f64,
    num_updates: usize,
}

impl PerceptronLearner {
    /// 学習率を指定して作成します。
    ///
    /// # エラー
    ///
    /// 学習率が正の有限値でない場合にエラーを返します。
    pub fn new(learning_rate: f64) -> Result<Self> {
        if !(learning_rate > 0.0 && learning_rate.is_finite()) {
            return Err(SampleRankError::invalid_argument(
                "learning_rate",
                "the learning rate must be positive",
            ));
        }
        Ok(Self {
            learning_rate,
            num_updates: 0,
        })
    }
}

impl OnlineLearner for PerceptronLearner {
    fn name(&self) -> &'static str {
        "perceptron"
    }

    fn update(
        &mut self,
        current: &Candidate,
        target: &Candidate,
        _optimal: Option<&Candidate>,
        weights: &mut FeatureVector,
    ) -> bool {
        if target.gain <= current.gain {
            return false;
        }
        weights.add_scaled(&target.features, self.learning_rate);
        weights.add_scaled(&current.features, -self.learning_rate);
        self.num_updates += 1;
        true
    }

    fn num_updates(&self) -> usize {
        self.num_updates
    }
}

/// MIRAのマージンの決め方
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MarginMode {
    /// 固定のマージン
    Fixed(f64),
    /// 利得の差に係数を掛けたマージン
    GainScaled(f64),
}

impl MarginMode {
    fn margin(&self, gain_gap: f64) -> f64 {
        match *self {
            Self::Fixed(margin) => margin,
            Self::GainScaled(scale) => scale * gain_gap,
        }
    }
}

/// MIRAの共通の設定
#[derive(Clone, Copy, Debug)]
pub struct MiraConfig {
    margin: MarginMode,
    slack: Option<f64>,
    normaliser: Option<UpdateNormaliser>,
}

impl Default for MiraConfig {
    fn default() -> Self {
        Self {
            margin: MarginMode::GainScaled(1.0),
            slack: None,
            normaliser: None,
        }
    }
}

impl MiraConfig {
    /// マージンの決め方を設定します。
    ///
    /// # エラー
    ///
    /// マージンまたは係数が正の有限値でない場合にエラーを返します。
    pub fn margin(mut self, margin: MarginMode) -> Result<Self> {
        let (MarginMode::Fixed(v) | MarginMode::GainScaled(v)) = margin;
        if !(v > 0.0 && v.is_finite()) {
            return Err(SampleRankError::invalid_argument(
                "margin",
                format!("the margin must be positive, got {v}"),
            ));
        }
        self.margin = margin;
        Ok(self)
    }

    /// 双対変数の上限を設定します。`None`は無制限です。
    ///
    /// # エラー
    ///
    /// 上限が正でない場合にエラーを返します。
    pub fn slack(mut self, slack: Option<f64>) -> Result<Self> {
        if let Some(c) = slack
            && !(c > 0.0)
        {
            return Err(SampleRankError::invalid_argument(
                "slack",
                format!("the slack must be positive, got {c}"),
            ));
        }
        self.slack = slack;
        Ok(self)
    }

    /// 更新ベクトルの正規化を設定します。
    pub fn normaliser(mut self, normaliser: Option<UpdateNormaliser>) -> Self {
        self.normaliser = normaliser;
        self
    }
}

/// 一つの制約のMIRA
#[derive(Clone, Debug, Default)]
pub struct MiraLearner {
    config: MiraConfig,
    num_updates: usize,
}

impl MiraLearner {
    /// 設定を指定して作成します。
    pub fn new(config: MiraConfig) -> Self {
        Self {
            config,
            num_updates: 0,
        }
    }
}

impl OnlineLearner for MiraLearner {
    fn name(&self) -> &'static str {
        "mira"
    }

    fn update(
        &mut self,
        current: &Candidate,
        target: &Candidate,
        _optimal: Option<&Candidate>,
        weights: &mut FeatureVector,
    ) -> bool {
        let gain_gap = target.gain - current.gain;
        if gain_gap == 0.0 {
            return false;
        }
        let score_gap = target.score(weights) - current.score(weights);
        let b = self.config.margin.margin(gain_gap) - score_gap;
        if b <= 0.0 {
            return false;
        }
        let a = &target.features - &current.features;
        let norm = a.l2_norm_squared();
        if norm == 0.0 {
            log::warn!("the target and the current sample have identical features, skipping update");
            return false;
        }
        let mut alpha = b / norm;
        if let Some(c) = self.config.slack {
            alpha = alpha.min(c);
        }
        let mut update = a;
        update *= alpha;
        if let Some(normaliser) = &self.config.normaliser {
            normaliser.normalise(&mut update);
        }
        *weights += &update;
        self.num_updates += 1;
        true
    }

    fn num_updates(&self) -> usize {
        self.num_updates
    }
}

/// 最も利得の高い解も使う、最大3制約のMIRA
///
/// 1. 目標のスコア - 選ばれた候補のスコア >= マージン
/// 2. 最適解のスコア - 目標のスコア >= マージン
/// 3. 最適解のスコア - 選ばれた候補のスコア >= マージン
///
/// 制約2と3は、最適解の利得が目標の利得を上回る場合にだけ加えられます。
/// 制約1は利得が等しくても加えられるため、固定マージンでは同じ利得の候補の間でも更新が起こります。
#[derive(Clone, Debug, Default)]
pub struct MiraPlusLearner {
    config: MiraConfig,
    num_updates: usize,
}

impl MiraPlusLearner {
    /// 設定を指定して作成します。
    pub fn new(config: MiraConfig) -> Self {
        Self {
            config,
            num_updates: 0,
        }
    }
}

impl OnlineLearner for MiraPlusLearner {
    fn name(&self) -> &'static str {
        "mira+"
    }

    fn update(
        &mut self,
        current: &Candidate,
        target: &Candidate,
        optimal: Option<&Candidate>,
        weights: &mut FeatureVector,
    ) -> bool {
        let mut pairs = vec![(target, current)];
        if let Some(optimal) = optimal
            && optimal.gain > target.gain
        {
            pairs.push((optimal, target));
            pairs.push((optimal, current));
        }

        let mut a = vec![];
        let mut b = vec![];
        for (better, worse) in pairs {
            let dist = &better.features - &worse.features;
            if dist.is_zero() {
                log::warn!("skipping a constraint between identical feature vectors");
                continue;
            }
            let gain_gap = better.gain - worse.gain;
            b.push(
                self.config.margin.margin(gain_gap) - (better.score(weights) - worse.score(weights)),
            );
            a.push(dist);
        }
        if b.iter().all(|&v| v <= 0.0) {
            return false;
        }

        let alpha = Hildreth::new().bound(self.config.slack).solve(&a, &b);
        let mut update = FeatureVector::new();
        for (dist, alpha) in a.iter().zip(alpha) {
            update.add_scaled(dist, alpha);
        }
        if update.is_zero() {
            return false;
        }
        if let Some(normaliser) = &self.config.normaliser {
            normaliser.normalise(&mut update);
        }
        *weights += &update;
        self.num_updates += 1;
        true
    }

    fn uses_optimal(&self) -> bool {
        true
    }

    fn num_updates(&self) -> usize {
        self.num_updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(values: &[f64], gain: f64) -> Candidate {
        let mut features = FeatureVector::zeros(values.len());
        for (i, &v) in values.iter().enumerate() {
            features.set_dense(i, v);
        }
        Candidate { features, gain }
    }

    #[test]
    fn test_perceptron() {
        let mut learner = PerceptronLearner::new(0.5).unwrap();
        let mut weights = FeatureVector::zeros(2);
        let current = candidate(&[1.0, 0.0], 0.2);
        let target = candidate(&[0.0, 1.0], 0.4);
        assert!(learner.update(&current, &target, None, &mut weights));
        assert_eq!(&[-0.5, 0.5], weights.dense_values());
        assert!(!learner.update(&target, &current, None, &mut weights));
        assert_eq!(1, learner.num_updates());
        assert!(PerceptronLearner::new(0.0).is_err());
    }

    #[test]
    fn test_mira_equal_gains() {
        let mut learner = MiraLearner::default();
        let mut weights = FeatureVector::zeros(2);
        let current = candidate(&[1.0, 0.0], 0.3);
        let target = candidate(&[0.0, 1.0], 0.3);
        assert!(!learner.update(&current, &target, None, &mut weights));
        assert!(weights.is_zero());
    }

    #[test]
    fn test_mira_margin_satisfied() {
        let config = MiraConfig::default().margin(MarginMode::Fixed(1.0)).unwrap();
        let mut learner = MiraLearner::new(config);
        let mut weights = FeatureVector::zeros(2);
        weights.set_dense(1, 2.0);
        let current = candidate(&[1.0, 0.0], 0.1);
        let target = candidate(&[0.0, 1.0], 0.5);
        // score gap is 2, which already meets the margin
        assert!(!learner.update(&current, &target, None, &mut weights));
        assert_eq!(&[0.0, 2.0], weights.dense_values());
    }

    #[test]
    fn test_mira_closed_form() {
        let config = MiraConfig::default()
            .margin(MarginMode::GainScaled(10.0))
            .unwrap();
        let mut learner = MiraLearner::new(config);
        let mut weights = FeatureVector::zeros(2);
        let current = candidate(&[1.0, 0.0], 0.1);
        let target = candidate(&[0.0, 1.0], 0.2);
        assert!(learner.update(&current, &target, None, &mut weights));
        // b = 1.0, |a|^2 = 2
        assert!((weights.dense(0) + 0.5).abs() < 1e-9);
        assert!((weights.dense(1) - 0.5).abs() < 1e-9);
        let gap = target.score(&weights) - current.score(&weights);
        assert!((gap - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_mira_slack_and_normaliser() {
        let config = MiraConfig::default()
            .margin(MarginMode::Fixed(10.0))
            .unwrap()
            .slack(Some(0.1))
            .unwrap();
        let mut learner = MiraLearner::new(config);
        let mut weights = FeatureVector::zeros(2);
        let current = candidate(&[1.0, 0.0], 0.1);
        let target = candidate(&[0.0, 1.0], 0.2);
        assert!(learner.update(&current, &target, None, &mut weights));
        assert!((weights.dense(1) - 0.1).abs() < 1e-9);

        let config = MiraConfig::default().normaliser(Some(UpdateNormaliser::L1(1.0)));
        let mut learner = MiraLearner::new(config);
        let mut weights = FeatureVector::zeros(2);
        assert!(learner.update(&current, &target, None, &mut weights));
        assert!((weights.l1_norm() - 1.0).abs() < 1e-9);

        assert!(MiraConfig::default().slack(Some(0.0)).is_err());
        assert!(MiraConfig::default().margin(MarginMode::Fixed(-1.0)).is_err());
    }

    #[test]
    fn test_mira_identical_features() {
        let mut learner = MiraLearner::default();
        let mut weights = FeatureVector::zeros(2);
        let current = candidate(&[1.0, 1.0], 0.1);
        let target = candidate(&[1.0, 1.0], 0.2);
        assert!(!learner.update(&current, &target, None, &mut weights));
    }

    #[test]
    fn test_mira_plus_uses_optimal() {
        let config = MiraConfig::default().margin(MarginMode::Fixed(1.0)).unwrap();
        let mut learner = MiraPlusLearner::new(config);
        assert!(learner.uses_optimal());
        let mut weights = FeatureVector::zeros(3);
        let current = candidate(&[1.0, 0.0, 0.0], 0.1);
        let target = candidate(&[0.0, 1.0, 0.0], 0.2);
        let optimal = candidate(&[0.0, 0.0, 1.0], 0.5);
        assert!(learner.update(&current, &target, Some(&optimal), &mut weights));
        for (better, worse) in [(&target, &current), (&optimal, &target), (&optimal, &current)] {
            let gap = better.score(&weights) - worse.score(&weights);
            assert!(gap >= 1.0 - 1e-6, "{gap}");
        }
    }

    #[test]
    fn test_mira_plus_equal_gains() {
        let config = MiraConfig::default().margin(MarginMode::Fixed(1.0)).unwrap();
        let mut learner = MiraPlusLearner::new(config);
        let mut weights = FeatureVector::zeros(2);
        let current = candidate(&[1.0, 0.0], 0.3);
        let target = candidate(&[0.0, 1.0], 0.3);
        assert!(learner.update(&current, &target, None, &mut weights));
        let gap = target.score(&weights) - current.score(&weights);
        assert!((gap - 1.0).abs() < 1e-6, "{gap}");

        // A gain-scaled margin is zero here and the ordering already holds.
        let mut learner = MiraPlusLearner::new(MiraConfig::default());
        assert!(!learner.update(&current, &target, None, &mut weights));
        assert_eq!(0, learner.num_updates());
    }
}
