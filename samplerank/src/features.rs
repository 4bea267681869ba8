//! 素性の計算
//!
//! 導出全体の素性値の計算と、局所的な書き換えに対する言語モデルの再計算を行います。

use crate::extra_feature::ExtraFeature;
use crate::feature_vector::{FeatureLayout, FeatureVector};
use crate::model::{BOS, EOS, LanguageModel};
use crate::options::Span;
use crate::sample::Sample;

/// 出力文の一部の書き換え
///
/// 出力文の区間`region`を単語列`words`で置き換えることを表します。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rewrite<'a> {
    /// 置き換えられる区間
    pub region: Span,
    /// 置き換え後の単語列
    pub words: Vec<&'a str>,
}

impl<'a> Rewrite<'a> {
    /// 書き換えを適用した後の出力文を返します。
    ///
    /// # 例
    ///
    /// ```
    /// use samplerank::features::Rewrite;
    /// use samplerank::options::Span;
    /// use samplerank::utils::split_words;
    ///
    /// let words = split_words("a b c d");
    /// let rewrite = Rewrite { region: Span::new(1, 3), words: vec!["x"] };
    /// assert_eq!(vec!["a", "x", "d"], rewrite.apply(&words));
    /// ```
    pub fn apply(&self, words: &'a [String]) -> Vec<&'a str> {
        let mut result = Vec::with_capacity(words.len() + self.words.len());
        result.extend(words[..self.region.start].iter().map(String::as_str));
        result.extend_from_slice(&self.words);
        result.extend(words[self.region.end..].iter().map(String::as_str));
        result
    }
}

/// 導出の素性を計算する素性関数の集合
pub struct FeatureSet<'a> {
    layout: FeatureLayout,
    language_model: &'a dyn LanguageModel,
    extras: Vec<ExtraFeature>,
    max_distortion: Option<usize>,
}

impl<'a> FeatureSet<'a> {
    /// 中核素性だけからなる集合を作成します。歪みの上限はありません。
    pub fn new(layout: FeatureLayout, language_model: &'a dyn LanguageModel) -> Self {
        Self {
            layout,
            language_model,
            extras: vec![],
            max_distortion: None,
        }
    }

    /// 追加の素性を加えます。
    pub fn extra(mut self, feature: ExtraFeature) -> Self {
        self.extras.push(feature);
        self
    }

    /// 並べ替えで許す歪みの最大値を設定します。`None`は無制限です。
    pub fn max_distortion(mut self, limit: Option<usize>) -> Self {
        self.max_distortion = limit;
        self
    }

    /// 密な素性のレイアウト
    #[inline(always)]
    pub fn layout(&self) -> &FeatureLayout {
        &self.layout
    }

    /// 言語モデル
    #[inline(always)]
    pub fn language_model(&self) -> &dyn LanguageModel {
        self.language_model
    }

    /// 追加の素性
    #[inline(always)]
    pub fn extras(&self) -> &[ExtraFeature] {
        &self.extras
    }

    /// 歪みの値`score`が上限の範囲内かどうか
    pub fn within_distortion_limit(&self, score: f64) -> bool {
        self.max_distortion
            .is_none_or(|limit| score.abs() <= limit as f64)
    }

    /// 書き換えによって影響を受けるn-gramの言語モデルスコアを計算します。
    ///
    /// 書き換え後の単語に加えて、区間の後ろ`order - 1`語までの単語を再計算します。
    /// 区間の前は文頭記号で、区間の後ろが文末に届く場合は文末記号で補います。
    /// 同じ区間に対する二つの書き換えのスコアの差は、文全体のスコアの差に一致します。
    ///
    /// # 引数
    ///
    /// * `words` - 現在の出力文
    /// * `rewrite` - 書き換え
    ///
    /// # 戻り値
    ///
    /// 自然対数の確率の和
    pub fn lm_rewrite_score(&self, words: &[String], rewrite: &Rewrite) -> f64 {
        let n = self.language_model.order().saturating_sub(1);
        let region = rewrite.region;

        let pre_start = region.start.saturating_sub(n);
        let mut seq: Vec<&str> = Vec::with_capacity(2 * n + rewrite.words.len() + 1);
        seq.extend(std::iter::repeat_n(BOS, n - (region.start - pre_start)));
        seq.extend(words[pre_start..region.start].iter().map(String::as_str));
        let first = seq.len();
        seq.extend_from_slice(&rewrite.words);
        let post_end = words.len().min(region.end + n);
        seq.extend(words[region.end..post_end].iter().map(String::as_str));
        if region.end + n > words.len() {
            seq.push(EOS);
        }

        (first..seq.len())
            .map(|i| {
                self.language_model
                    .log_prob(&seq[i.saturating_sub(n)..i], seq[i])
            })
            .sum()
    }

    /// 出力文全体の言語モデルスコア
    pub fn lm_sentence_score(&self, words: &[String]) -> f64 {
        let rewrite = Rewrite {
            region: Span::new(0, words.len()),
            words: words.iter().map(String::as_str).collect(),
        };
        self.lm_rewrite_score(words, &rewrite)
    }

    /// サンプルの素性値を最初から計算します。
    ///
    /// 各ノードのスコア内訳の和に、単語ペナルティ、言語モデル、歪み、追加の素性を加えたものです。
    pub fn compute_features(&self, sample: &Sample) -> FeatureVector {
        let mut fv = self.layout.zeros();
        let words = sample.target_words();
        let mut prev = None;
        for id in sample.target_order() {
            let node = sample.node(id);
            fv += node.scores();
            fv.add_dense(
                self.layout.distortion(),
                distortion_score(prev, node.source()),
            );
            prev = Some(node.source());
        }
        fv.add_dense(self.layout.word_penalty(), -(words.len() as f64));
        fv.add_dense(self.layout.lm(), self.lm_sentence_score(words));
        for extra in &self.extras {
            extra.compute_score(sample, &mut fv);
        }
        fv
    }
}

/// 線形歪み
///
/// 目的言語順で直前のフレーズの原言語側の終端と、現在のフレーズの原言語側の始端の距離を負にしたものです。
/// 直前のフレーズがない場合は位置0から測ります。
pub fn distortion_score(prev: Option<Span>, current: Span) -> f64 {
    let prev_end = prev.map_or(0, |p| p.end);
    -(prev_end.abs_diff(current.start) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::test_utils::toy_language_model;
    use crate::utils::split_words;

    #[test]
    fn test_distortion_score() {
        assert_eq!(0.0, distortion_score(None, Span::new(0, 2)));
        assert_eq!(-2.0, distortion_score(None, Span::new(2, 3)));
        assert_eq!(0.0, distortion_score(Some(Span::new(0, 2)), Span::new(2, 3)));
        assert_eq!(-3.0, distortion_score(Some(Span::new(2, 4)), Span::new(0, 1)));
    }

    #[test]
    fn test_lm_rewrite_matches_full_rescoring() {
        let lm = toy_language_model();
        let features = FeatureSet::new(FeatureLayout::new(1), &lm);
        let words = split_words("the house is small today");

        for (region, replacement) in [
            (Span::new(1, 2), vec!["home"]),
            (Span::new(0, 2), vec!["a", "small", "house"]),
            (Span::new(3, 5), vec!["big"]),
            (Span::new(2, 3), vec![]),
        ] {
            let before = Rewrite {
                region,
                words: words[region.range()].iter().map(String::as_str).collect(),
            };
            let after = Rewrite {
                region,
                words: replacement,
            };
            let new_words: Vec<String> =
                after.apply(&words).into_iter().map(String::from).collect();

            let local = features.lm_rewrite_score(&words, &after)
                - features.lm_rewrite_score(&words, &before);
            let full =
                features.lm_sentence_score(&new_words) - features.lm_sentence_score(&words);
            assert!((local - full).abs() < 1e-9, "{region:?}: {local} vs {full}");
        }
    }
}
