//! 密と疎を組み合わせた素性ベクトル。
//!
//! 翻訳モデルの各成分、言語モデル、単語ペナルティ、歪みといった中核素性は
//! [`FeatureLayout`]で定まる位置の密ベクトルに格納し、
//! それ以外の素性(フレーズ対の指示素性など)は名前をキーとする疎ベクトルに格納します。
//! ノードごとのスコア内訳、サンプル全体の素性値、重みベクトルのすべてがこの型を使います。

use std::io::{BufRead, BufReader, Read, Write};
use std::ops::{Add, AddAssign, DivAssign, MulAssign, Sub, SubAssign};

use hashbrown::HashMap;

use crate::errors::{Result, SampleRankError};

/// 言語モデル素性の名前
pub const LM_FEATURE: &str = "LM";
/// 単語ペナルティ素性の名前
pub const WORD_PENALTY_FEATURE: &str = "WordPenalty";
/// 線形歪み素性の名前
pub const DISTORTION_FEATURE: &str = "Distortion";
/// 翻訳モデル成分の名前の接頭辞
pub const TRANSLATION_MODEL_PREFIX: &str = "TranslationModel_";

/// 密な中核素性の並び。
///
/// 先頭から翻訳モデルの`num_tm`成分、言語モデル、単語ペナルティ、歪みの順に並びます。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeatureLayout {
    num_tm: usize,
}

impl FeatureLayout {
    /// 翻訳モデルの成分数を指定してレイアウトを作成します。
    pub const fn new(num_tm: usize) -> Self {
        Self { num_tm }
    }

    /// 翻訳モデルの成分数
    #[inline(always)]
    pub const fn num_tm(&self) -> usize {
        self.num_tm
    }

    /// 翻訳モデル第`i`成分の位置
    #[inline(always)]
    pub const fn tm(&self, i: usize) -> usize {
        i
    }

    /// 言語モデル素性の位置
    #[inline(always)]
    pub const fn lm(&self) -> usize {
        self.num_tm
    }

    /// 単語ペナルティ素性の位置
    #[inline(always)]
    pub const fn word_penalty(&self) -> usize {
        self.num_tm + 1
    }

    /// 歪み素性の位置
    #[inline(always)]
    pub const fn distortion(&self) -> usize {
        self.num_tm + 2
    }

    /// 密な素性の総数
    #[inline(always)]
    pub const fn len(&self) -> usize {
        self.num_tm + 3
    }

    /// 密な素性が一つもないかどうか(常に偽)
    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// 密な位置`i`の素性名を返します。
    pub fn name(&self, i: usize) -> Option<String> {
        if i < self.num_tm {
            Some(format!("{TRANSLATION_MODEL_PREFIX}{i}"))
        } else if i == self.lm() {
            Some(LM_FEATURE.to_string())
        } else if i == self.word_penalty() {
            Some(WORD_PENALTY_FEATURE.to_string())
        } else if i == self.distortion() {
            Some(DISTORTION_FEATURE.to_string())
        } else {
            None
        }
    }

    /// 素性名に対応する密な位置を返します。疎な素性の場合は`None`です。
    pub fn index_of(&self, name: &str) -> Option<usize> {
        match name {
            LM_FEATURE => Some(self.lm()),
            WORD_PENALTY_FEATURE => Some(self.word_penalty()),
            DISTORTION_FEATURE => Some(self.distortion()),
            _ => {
                let i: usize = name.strip_prefix(TRANSLATION_MODEL_PREFIX)?.parse().ok()?;
                (i < self.num_tm).then_some(i)
            }
        }
    }

    /// このレイアウトの長さを持つゼロベクトルを作成します。
    pub fn zeros(&self) -> FeatureVector {
        FeatureVector::zeros(self.len())
    }

    /// 重みファイルがない場合に使う初期の重み
    ///
    /// 翻訳モデルと言語モデルは1.0、単語ペナルティは0.0、歪みは0.1です。
    pub fn default_weights(&self) -> FeatureVector {
        let mut weights = self.zeros();
        for i in 0..self.num_tm {
            weights.set_dense(self.tm(i), 1.0);
        }
        weights.set_dense(self.lm(), 1.0);
        weights.set_dense(self.distortion(), 0.1);
        weights
    }
}

/// 密成分と疎成分からなる素性ベクトル
///
/// 存在しない成分は0として扱われます。
#[derive(Clone, Debug, Default)]
pub struct FeatureVector {
    dense: Vec<f64>,
    sparse: HashMap<String, f64>,
}

impl FeatureVector {
    /// 空のベクトルを作成します。
    pub fn new() -> Self {
        Self::default()
    }

    /// 長さ`len`の密成分を持つゼロベクトルを作成します。
    pub fn zeros(len: usize) -> Self {
        Self {
            dense: vec![0.0; len],
            sparse: HashMap::new(),
        }
    }

    /// 密成分の長さ
    #[inline(always)]
    pub fn dense_len(&self) -> usize {
        self.dense.len()
    }

    /// 密成分のスライス
    #[inline(always)]
    pub fn dense_values(&self) -> &[f64] {
        &self.dense
    }

    /// 密な位置`i`の値を返します。
    #[inline(always)]
    pub fn dense(&self, i: usize) -> f64 {
        self.dense.get(i).copied().unwrap_or(0.0)
    }

    /// 密な位置`i`に値を設定します。必要に応じて密成分を伸ばします。
    pub fn set_dense(&mut self, i: usize, value: f64) {
        if i >= self.dense.len() {
            self.dense.resize(i + 1, 0.0);
        }
        self.dense[i] = value;
    }

    /// 密な位置`i`に値を加えます。
    pub fn add_dense(&mut self, i: usize, value: f64) {
        if i >= self.dense.len() {
            self.dense.resize(i + 1, 0.0);
        }
        self.dense[i] += value;
    }

    /// 疎な素性`name`の値を返します。
    pub fn sparse(&self, name: &str) -> f64 {
        self.sparse.get(name).copied().unwrap_or(0.0)
    }

    /// 疎な素性`name`に値を設定します。
    pub fn set_sparse<S>(&mut self, name: S, value: f64)
    where
        S: Into<String>,
    {
        self.sparse.insert(name.into(), value);
    }

    /// 疎な素性`name`に値を加えます。
    pub fn add_sparse(&mut self, name: &str, value: f64) {
        if let Some(v) = self.sparse.get_mut(name) {
            *v += value;
        } else {
            self.sparse.insert(name.to_string(), value);
        }
    }

    /// 疎な素性`name`を取り除き、その値を返します。
    pub fn remove_sparse(&mut self, name: &str) -> f64 {
        self.sparse.remove(name).unwrap_or(0.0)
    }

    /// 疎成分を名前とともに列挙します。順序は不定です。
    pub fn sparse_iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.sparse.iter().map(|(k, &v)| (k.as_str(), v))
    }

    /// 疎成分の数
    pub fn num_sparse(&self) -> usize {
        self.sparse.len()
    }

    /// 内積を計算します。
    pub fn inner_product(&self, other: &Self) -> f64 {
        let mut result: f64 = self
            .dense
            .iter()
            .zip(&other.dense)
            .map(|(a, b)| a * b)
            .sum();
        let (small, large) = if self.sparse.len() <= other.sparse.len() {
            (&self.sparse, &other.sparse)
        } else {
            (&other.sparse, &self.sparse)
        };
        for (k, v) in small {
            if let Some(w) = large.get(k) {
                result += v * w;
            }
        }
        result
    }

    /// L1ノルム
    pub fn l1_norm(&self) -> f64 {
        self.dense.iter().map(|v| v.abs()).sum::<f64>()
            + self.sparse.values().map(|v| v.abs()).sum::<f64>()
    }

    /// L2ノルムの二乗
    pub fn l2_norm_squared(&self) -> f64 {
        self.inner_product(self)
    }

    /// L2ノルム
    pub fn l2_norm(&self) -> f64 {
        self.l2_norm_squared().sqrt()
    }

    /// すべての成分が0かどうか
    pub fn is_zero(&self) -> bool {
        self.dense.iter().all(|&v| v == 0.0) && self.sparse.values().all(|&v| v == 0.0)
    }

    /// `self += scale * other`
    pub fn add_scaled(&mut self, other: &Self, scale: f64) {
        if other.dense.len() > self.dense.len() {
            self.dense.resize(other.dense.len(), 0.0);
        }
        for (a, b) in self.dense.iter_mut().zip(&other.dense) {
            *a += scale * b;
        }
        for (k, v) in &other.sparse {
            self.add_sparse(k, scale * v);
        }
    }

    /// 二つのベクトルが成分ごとに`tol`以内で一致するかどうか
    pub fn approx_eq(&self, other: &Self, tol: f64) -> bool {
        let len = self.dense.len().max(other.dense.len());
        if (0..len).any(|i| (self.dense(i) - other.dense(i)).abs() > tol) {
            return false;
        }
        self.sparse
            .iter()
            .all(|(k, v)| (v - other.sparse(k)).abs() <= tol)
            && other
                .sparse
                .iter()
                .all(|(k, v)| (v - self.sparse(k)).abs() <= tol)
    }

    /// `name value`形式の行から重みベクトルを読み込みます。
    ///
    /// レイアウトに含まれる名前は密成分に、それ以外は疎成分に格納されます。
    /// 空行と`#`で始まる行は無視されます。
    ///
    /// # 引数
    ///
    /// * `rdr` - 重みファイルのリーダー
    /// * `layout` - 密な素性のレイアウト
    ///
    /// # エラー
    ///
    /// 行が二つの欄からなっていない場合や、値を解析できない場合に
    /// [`SampleRankError`]を返します。
    pub fn read<R>(rdr: R, layout: &FeatureLayout) -> Result<Self>
    where
        R: Read,
    {
        let mut weights = layout.zeros();
        for line in BufReader::new(rdr).lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut spl = line.split_ascii_whitespace();
            let (Some(name), Some(value), None) = (spl.next(), spl.next(), spl.next()) else {
                return Err(SampleRankError::invalid_format(
                    "weights",
                    format!("a line must be `name value`: {line}"),
                ));
            };
            let value: f64 = value.parse().map_err(|_| {
                SampleRankError::invalid_format("weights", format!("invalid value: {line}"))
            })?;
            match layout.index_of(name) {
                Some(i) => weights.set_dense(i, value),
                None => weights.set_sparse(name, value),
            }
        }
        Ok(weights)
    }

    /// 重みベクトルを`name value`形式で書き出します。
    ///
    /// 密成分はレイアウトの順に、疎成分は名前の辞書順に出力します。
    ///
    /// # エラー
    ///
    /// 密成分の長さがレイアウトと一致しない場合や、書き込みに失敗した場合に
    /// [`SampleRankError`]を返します。
    pub fn write<W>(&self, mut wtr: W, layout: &FeatureLayout) -> Result<()>
    where
        W: Write,
    {
        if self.dense.len() > layout.len() {
            return Err(SampleRankError::invalid_argument(
                "layout",
                format!(
                    "the vector has {} dense features but the layout has {}",
                    self.dense.len(),
                    layout.len()
                ),
            ));
        }
        for i in 0..layout.len() {
            if let Some(name) = layout.name(i) {
                writeln!(wtr, "{} {}", name, self.dense(i))?;
            }
        }
        let mut sparse: Vec<_> = self.sparse.iter().collect();
        sparse.sort_unstable_by(|a, b| a.0.cmp(b.0));
        for (name, value) in sparse {
            writeln!(wtr, "{name} {value}")?;
        }
        Ok(())
    }
}

impl AddAssign<&FeatureVector> for FeatureVector {
    fn add_assign(&mut self, rhs: &FeatureVector) {
        self.add_scaled(rhs, 1.0);
    }
}

impl SubAssign<&FeatureVector> for FeatureVector {
    fn sub_assign(&mut self, rhs: &FeatureVector) {
        self.add_scaled(rhs, -1.0);
    }
}

impl MulAssign<f64> for FeatureVector {
    fn mul_assign(&mut self, rhs: f64) {
        self.dense.iter_mut().for_each(|v| *v *= rhs);
        self.sparse.values_mut().for_each(|v| *v *= rhs);
    }
}

impl DivAssign<f64> for FeatureVector {
    fn div_assign(&mut self, rhs: f64) {
        self.dense.iter_mut().for_each(|v| *v /= rhs);
        self.sparse.values_mut().for_each(|v| *v /= rhs);
    }
}

impl Add for &FeatureVector {
    type Output = FeatureVector;

    fn add(self, rhs: &FeatureVector) -> FeatureVector {
        let mut result = self.clone();
        result += rhs;
        result
    }
}

impl Sub for &FeatureVector {
    type Output = FeatureVector;

    fn sub(self, rhs: &FeatureVector) -> FeatureVector {
        let mut result = self.clone();
        result -= rhs;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_names() {
        let layout = FeatureLayout::new(2);
        assert_eq!(5, layout.len());
        assert_eq!(Some("TranslationModel_1".to_string()), layout.name(1));
        assert_eq!(Some("Distortion".to_string()), layout.name(4));
        assert_eq!(None, layout.name(5));
        assert_eq!(Some(3), layout.index_of("WordPenalty"));
        assert_eq!(None, layout.index_of("TranslationModel_2"));
        assert_eq!(None, layout.index_of("pp:a|b"));
    }

    #[test]
    fn test_arithmetic() {
        let mut a = FeatureVector::zeros(2);
        a.set_dense(0, 1.0);
        a.set_sparse("x", 2.0);
        let mut b = FeatureVector::zeros(3);
        b.set_dense(2, 4.0);
        b.set_sparse("x", 1.0);
        b.set_sparse("y", -3.0);

        let c = &a + &b;
        assert_eq!(3, c.dense_len());
        assert_eq!(1.0, c.dense(0));
        assert_eq!(4.0, c.dense(2));
        assert_eq!(3.0, c.sparse("x"));
        assert_eq!(-3.0, c.sparse("y"));

        let d = &c - &b;
        assert!(d.approx_eq(&a, 1e-12));

        assert_eq!(2.0, a.inner_product(&b));
        assert_eq!(3.0, a.l1_norm());
        assert_eq!(5.0, a.l2_norm_squared());

        let mut e = a.clone();
        e *= 2.0;
        e /= 4.0;
        assert_eq!(0.5, e.dense(0));
        assert_eq!(1.0, e.sparse("x"));
    }

    #[test]
    fn test_missing_components_are_zero() {
        let mut a = FeatureVector::zeros(1);
        a.set_sparse("z", 0.0);
        assert!(a.approx_eq(&FeatureVector::new(), 0.0));
        assert!(a.is_zero());
        assert_eq!(0.0, a.dense(10));
    }

    #[test]
    fn test_read_write_weights() {
        let layout = FeatureLayout::new(1);
        let text = "# weights\nTranslationModel_0 0.5\nLM 1\n\nWordPenalty -0.25\npp:a|b 2\n";
        let w = FeatureVector::read(text.as_bytes(), &layout).unwrap();
        assert_eq!(0.5, w.dense(layout.tm(0)));
        assert_eq!(1.0, w.dense(layout.lm()));
        assert_eq!(-0.25, w.dense(layout.word_penalty()));
        assert_eq!(0.0, w.dense(layout.distortion()));
        assert_eq!(2.0, w.sparse("pp:a|b"));

        let mut buf = vec![];
        w.write(&mut buf, &layout).unwrap();
        let s = String::from_utf8(buf).unwrap();
        assert_eq!(
            "TranslationModel_0 0.5\nLM 1\nWordPenalty -0.25\nDistortion 0\npp:a|b 2\n",
            s
        );
    }

    #[test]
    fn test_read_weights_invalid() {
        let layout = FeatureLayout::new(1);
        assert!(FeatureVector::read("LM one\n".as_bytes(), &layout).is_err());
        assert!(FeatureVector::read("LM 1 2\n".as_bytes(), &layout).is_err());
    }
}
