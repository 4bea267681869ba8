//! サンプルの収集
//!
//! サンプラーは収集対象の反復ごとに、最も温度の低い連鎖のサンプルを各収集器へ渡します。
//! 収集器はサンプルを変更しません。

use std::io::Write;

use hashbrown::HashMap;

use crate::errors::Result;
use crate::feature_vector::{FeatureLayout, FeatureVector};
use crate::sample::Sample;

/// サンプルの収集器
pub trait SampleCollector {
    /// サンプルを一つ受け取ります。
    ///
    /// # 引数
    ///
    /// * `sample` - 現在のサンプル
    /// * `features` - 補助素性を取り除いた素性値
    /// * `importance_weight` - 補助素性に対する重要度重み
    ///
    /// # エラー
    ///
    /// 書き出しに失敗した場合にエラーを返します。
    fn collect(
        &mut self,
        sample: &Sample,
        features: &FeatureVector,
        importance_weight: f64,
    ) -> Result<()>;
}

/// 探索のためだけに加えられた補助素性の補正
///
/// 補助素性は重み付きスコアには寄与しますが、収集や学習の前に素性値から取り除かれ、
/// その寄与は重要度重み`exp(-Σ w_i f_i)`として渡されます。
#[derive(Clone, Debug, Default)]
pub struct ImportanceCorrection {
    names: Vec<String>,
}

impl ImportanceCorrection {
    /// 補助素性の名前から作成します。
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// 補助素性がないかどうか
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// 補助素性を`features`から取り除き、重要度重みを返します。
    pub fn strip(&self, features: &mut FeatureVector, weights: &FeatureVector) -> f64 {
        let mut auxiliary = 0.0;
        for name in &self.names {
            auxiliary += features.remove_sparse(name) * weights.sparse(name);
        }
        (-auxiliary).exp()
    }

    /// 補助素性を`features`から取り除きます。
    pub fn remove(&self, features: &mut FeatureVector) {
        for name in &self.names {
            features.remove_sparse(name);
        }
    }
}

/// 最も多くサンプリングされた訳文を求めます。
#[derive(Clone, Debug, Default)]
pub struct MaxTranslationCollector {
    counts: HashMap<String, f64>,
    // Keeps the first-seen order for deterministic tie breaking.
    order: Vec<String>,
    total: f64,
}

impl MaxTranslationCollector {
    /// 新しい収集器を作成します。
    pub fn new() -> Self {
        Self::default()
    }

    /// 重み付きの出現数
    pub fn count(&self, translation: &str) -> f64 {
        self.counts.get(translation).copied().unwrap_or(0.0)
    }

    /// 重みの総和
    pub fn total(&self) -> f64 {
        self.total
    }

    /// 異なり訳文の数
    pub fn num_translations(&self) -> usize {
        self.order.len()
    }

    /// 最も重み付き出現数の多い訳文と、その割合
    ///
    /// 同数の場合は先にサンプリングされた訳文を返します。
    pub fn max(&self) -> Option<(&str, f64)> {
        let mut best: Option<(&str, f64)> = None;
        for translation in &self.order {
            let count = self.counts[translation];
            if best.is_none_or(|(_, c)| count > c) {
                best = Some((translation, count));
            }
        }
        best.map(|(t, c)| (t, if self.total > 0.0 { c / self.total } else { 0.0 }))
    }
}

impl SampleCollector for MaxTranslationCollector {
    fn collect(
        &mut self,
        sample: &Sample,
        _features: &FeatureVector,
        importance_weight: f64,
    ) -> Result<()> {
        let translation = sample.translation();
        if let Some(count) = self.counts.get_mut(&translation) {
            *count += importance_weight;
        } else {
            self.order.push(translation.clone());
            self.counts.insert(translation, importance_weight);
        }
        self.total += importance_weight;
        Ok(())
    }
}

/// 素性値の期待値を求めます。
#[derive(Clone, Debug, Default)]
pub struct FeatureExpectationCollector {
    sum: FeatureVector,
    total: f64,
    num_samples: usize,
}

impl FeatureExpectationCollector {
    /// 新しい収集器を作成します。
    pub fn new() -> Self {
        Self::default()
    }

    /// 収集したサンプルの数
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// 重要度重みで重み付けした素性値の平均
    pub fn expectation(&self) -> FeatureVector {
        let mut mean = self.sum.clone();
        if self.total > 0.0 {
            mean /= self.total;
        }
        mean
    }
}

impl SampleCollector for FeatureExpectationCollector {
    fn collect(
        &mut self,
        _sample: &Sample,
        features: &FeatureVector,
        importance_weight: f64,
    ) -> Result<()> {
        self.sum.add_scaled(features, importance_weight);
        self.total += importance_weight;
        self.num_samples += 1;
        Ok(())
    }
}

/// サンプルを一行ずつ書き出します。
pub struct PrintCollector<'a, W> {
    wtr: W,
    layout: &'a FeatureLayout,
    detail: bool,
}

impl<'a, W> PrintCollector<'a, W>
where
    W: Write,
{
    /// 書き出し先を指定して作成します。
    pub fn new(wtr: W, layout: &'a FeatureLayout) -> Self {
        Self {
            wtr,
            layout,
            detail: false,
        }
    }

    /// 素性値と重要度重みも書き出すかどうか
    pub fn detail(mut self, detail: bool) -> Self {
        self.detail = detail;
        self
    }

    /// 書き出し先を返します。
    pub fn into_inner(self) -> W {
        self.wtr
    }
}

impl<W> SampleCollector for PrintCollector<'_, W>
where
    W: Write,
{
    fn collect(
        &mut self,
        sample: &Sample,
        features: &FeatureVector,
        importance_weight: f64,
    ) -> Result<()> {
        write!(self.wtr, "{}", sample.translation())?;
        if self.detail {
            write!(self.wtr, " |||")?;
            for (i, &v) in features.dense_values().iter().enumerate() {
                if let Some(name) = self.layout.name(i) {
                    write!(self.wtr, " {name}={v}")?;
                }
            }
            let mut sparse: Vec<(&str, f64)> = features.sparse_iter().collect();
            sparse.sort_unstable_by(|a, b| a.0.cmp(b.0));
            for (name, v) in sparse {
                write!(self.wtr, " {name}={v}")?;
            }
            write!(self.wtr, " ||| {importance_weight}")?;
        }
        writeln!(self.wtr)?;
        Ok(())
    }
}
