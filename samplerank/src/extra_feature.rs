//! 追加の素性
//!
//! 中核素性以外の素性は、次の差分計算の規約を満たす必要があります。
//!
//! - 導出全体に対する値の計算
//! - 一つの区間の書き換え(置換、結合)
//! - 目的言語側で隣接する二つの区間の書き換え(分割、隣接した対の置換)
//! - 隣接しない二つの区間の書き換え(離れた対の置換)
//! - 二つの区間の入れ替え
//!
//! 差分計算のメソッドは、書き換えによって影響を受ける部分の書き換え後の値を`acc`に加えます。
//! 変化なしの候補も同じ規約で計算されるため、二つの差が素性値の差分になります。

use crate::feature_vector::FeatureVector;
use crate::features::Rewrite;
use crate::options::{Span, TranslationOption};
use crate::sample::{Sample, TargetGap};

/// 追加の素性
#[derive(Clone, Debug)]
pub enum ExtraFeature {
    /// 適用されたフレーズ対ごとの指示素性
    PhrasePair(PhrasePairFeature),
    /// 対応の取れていない括弧の数
    Parenthesis(ParenthesisFeature),
}

impl ExtraFeature {
    /// 導出全体に対する値を`acc`に加えます。
    pub fn compute_score(&self, sample: &Sample, acc: &mut FeatureVector) {
        match self {
            Self::PhrasePair(f) => {
                for id in sample.source_order() {
                    f.add_option(sample, sample.node(id).option(), acc);
                }
            }
            Self::Parenthesis(f) => f.add_counts(sample.target_words().iter().map(String::as_str), acc),
        }
    }

    /// 区間`gap`を`option`で書き換えた場合の値を`acc`に加えます。
    pub fn single_update(
        &self,
        sample: &Sample,
        option: &TranslationOption,
        gap: &TargetGap,
        acc: &mut FeatureVector,
    ) {
        match self {
            Self::PhrasePair(f) => f.add_option(sample, option, acc),
            Self::Parenthesis(f) => {
                let rewrite = Rewrite {
                    region: gap.segment,
                    words: option.target().iter().map(String::as_str).collect(),
                };
                f.add_counts(rewrite.apply(sample.target_words()).into_iter(), acc);
            }
        }
    }

    /// 区間`gap`を`left`と`right`を連結したもので書き換えた場合の値を`acc`に加えます。
    pub fn contiguous_pair_update(
        &self,
        sample: &Sample,
        left: &TranslationOption,
        right: &TranslationOption,
        gap: &TargetGap,
        acc: &mut FeatureVector,
    ) {
        match self {
            Self::PhrasePair(f) => {
                f.add_option(sample, left, acc);
                f.add_option(sample, right, acc);
            }
            Self::Parenthesis(f) => {
                let rewrite = Rewrite {
                    region: gap.segment,
                    words: left
                        .target()
                        .iter()
                        .chain(right.target())
                        .map(String::as_str)
                        .collect(),
                };
                f.add_counts(rewrite.apply(sample.target_words()).into_iter(), acc);
            }
        }
    }

    /// 離れた二つの区間をそれぞれ`left`と`right`で書き換えた場合の値を`acc`に加えます。
    pub fn discontiguous_pair_update(
        &self,
        sample: &Sample,
        left: &TranslationOption,
        right: &TranslationOption,
        left_gap: &TargetGap,
        right_gap: &TargetGap,
        acc: &mut FeatureVector,
    ) {
        match self {
            Self::PhrasePair(f) => {
                f.add_option(sample, left, acc);
                f.add_option(sample, right, acc);
            }
            Self::Parenthesis(f) => {
                let rewrite = bracketed_rewrite(sample, left, right, left_gap, right_gap);
                f.add_counts(rewrite.apply(sample.target_words()).into_iter(), acc);
            }
        }
    }

    /// 二つの区間を入れ替えた場合の値を`acc`に加えます。
    ///
    /// `left`は`left_gap`の位置に、`right`は`right_gap`の位置に置かれます。
    pub fn flip_update(
        &self,
        sample: &Sample,
        left: &TranslationOption,
        right: &TranslationOption,
        left_gap: &TargetGap,
        right_gap: &TargetGap,
        acc: &mut FeatureVector,
    ) {
        // Flipping keeps both phrase pairs, so only the word order changes.
        self.discontiguous_pair_update(sample, left, right, left_gap, right_gap, acc);
    }
}

/// `left_gap`の始端から`right_gap`の終端までを、間の単語を保ったまま書き換えます。
pub(crate) fn bracketed_rewrite<'a>(
    sample: &'a Sample,
    left: &'a TranslationOption,
    right: &'a TranslationOption,
    left_gap: &TargetGap,
    right_gap: &TargetGap,
) -> Rewrite<'a> {
    let middle = &sample.target_words()[left_gap.segment.end..right_gap.segment.start];
    Rewrite {
        region: Span::new(left_gap.segment.start, right_gap.segment.end),
        words: left
            .target()
            .iter()
            .chain(middle)
            .chain(right.target())
            .map(String::as_str)
            .collect(),
    }
}

/// フレーズ対の指示素性`pp:<source>|<target>`
#[derive(Clone, Debug, Default)]
pub struct PhrasePairFeature {}

impl PhrasePairFeature {
    /// 素性名の接頭辞
    pub const PREFIX: &'static str = "pp:";

    /// 新しい素性を作成します。
    pub fn new() -> Self {
        Self::default()
    }

    /// 翻訳候補に対応する素性名
    pub fn feature_name(&self, source: &[String], option: &TranslationOption) -> String {
        format!(
            "{}{}|{}",
            Self::PREFIX,
            source[option.source().range()].join(" "),
            option.target().join(" ")
        )
    }

    fn add_option(&self, sample: &Sample, option: &TranslationOption, acc: &mut FeatureVector) {
        acc.add_sparse(&self.feature_name(sample.source_words(), option), 1.0);
    }
}

/// 括弧の対応を数える素性
///
/// 括弧の組ごとに、対応の取れていない括弧の数を`Parenthesis:<open><close>`に加えます。
#[derive(Clone, Debug)]
pub struct ParenthesisFeature {
    pairs: Vec<(String, String, String)>,
}

impl Default for ParenthesisFeature {
    fn default() -> Self {
        Self::new(&[("(", ")"), ("[", "]"), ("{", "}")])
    }
}

impl ParenthesisFeature {
    /// 括弧の組を指定して作成します。
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        Self {
            pairs: pairs
                .iter()
                .map(|&(open, close)| {
                    (
                        open.to_string(),
                        close.to_string(),
                        format!("Parenthesis:{open}{close}"),
                    )
                })
                .collect(),
        }
    }

    /// 括弧の組`i`の素性名
    pub fn feature_name(&self, i: usize) -> Option<&str> {
        self.pairs.get(i).map(|(_, _, name)| name.as_str())
    }

    /// 単語列中の対応の取れていない括弧を組ごとに数えます。
    pub fn count_unmatched<'w, I>(&self, words: I) -> Vec<usize>
    where
        I: Iterator<Item = &'w str>,
    {
        let mut depth = vec![0usize; self.pairs.len()];
        let mut unmatched = vec![0usize; self.pairs.len()];
        for word in words {
            for (i, (open, close, _)) in self.pairs.iter().enumerate() {
                if word == open {
                    depth[i] += 1;
                } else if word == close {
                    if depth[i] == 0 {
                        unmatched[i] += 1;
                    } else {
                        depth[i] -= 1;
                    }
                }
            }
        }
        unmatched.iter().zip(&depth).map(|(u, d)| u + d).collect()
    }

    fn add_counts<'w, I>(&self, words: I, acc: &mut FeatureVector)
    where
        I: Iterator<Item = &'w str>,
    {
        for ((_, _, name), count) in self.pairs.iter().zip(self.count_unmatched(words)) {
            if count != 0 {
                acc.add_sparse(name, count as f64);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_unmatched() {
        let f = ParenthesisFeature::new(&[("(", ")"), ("[", "]")]);
        let words = ["(", "a", ")", ")", "[", "b"];
        assert_eq!(vec![1, 1], f.count_unmatched(words.into_iter()));
        assert_eq!(vec![0, 0], f.count_unmatched(["(", "(", ")", ")"].into_iter()));
        assert_eq!(Some("Parenthesis:[]"), f.feature_name(1));
        assert_eq!(None, f.feature_name(2));
    }

    #[test]
    fn test_phrase_pair_name() {
        let f = PhrasePairFeature::new();
        let source = crate::utils::split_words("das haus ist");
        let option = TranslationOption::new(
            Span::new(0, 2),
            crate::utils::split_words("the house"),
            FeatureVector::new(),
        );
        assert_eq!("pp:das haus|the house", f.feature_name(&source, &option));
    }
}
