//! 導出の書き換え候補(デルタ)
//!
//! デルタはサンプルを変更せずに、書き換えを適用した場合の素性値の変化を見積もります。
//! 見積もりは書き換えの影響を受ける部分だけを対象とし、
//! 同じ位置の「変化なし」のデルタとの差が、サンプル全体の素性値の差分になります。
//! サンプルが一度でも書き換えられると、それ以前に作られたデルタは無効になります。

use std::sync::Arc;

use crate::errors::Result;
use crate::extra_feature::bracketed_rewrite;
use crate::feature_vector::FeatureVector;
use crate::features::{FeatureSet, Rewrite};
use crate::options::OptionRef;
use crate::sample::{Sample, TargetGap};

/// 書き換えの種類
///
/// 二つの候補を持つ種類では、`left`と`right`は書き換え後の目的言語順に並びます。
#[derive(Clone, Debug)]
pub enum DeltaKind {
    /// 一つのノードの翻訳候補の置換
    Translation {
        /// 新しい翻訳候補
        option: OptionRef,
        /// 置き換えられるノードの位置
        gap: TargetGap,
    },
    /// 原言語側で隣接する二つのノードの結合
    Merge {
        /// 二つの区間を覆う翻訳候補
        option: OptionRef,
        /// 結合される二つのノードをまとめた位置
        gap: TargetGap,
    },
    /// 一つのノードの分割
    Split {
        /// 分割後の左の翻訳候補
        left: OptionRef,
        /// 分割後の右の翻訳候補
        right: OptionRef,
        /// 分割されるノードの位置
        gap: TargetGap,
    },
    /// 分割を保った二つのノードの同時置換
    Paired {
        /// 目的言語順で前のノードの翻訳候補
        left: OptionRef,
        /// 目的言語順で後ろのノードの翻訳候補
        right: OptionRef,
        /// 前のノードの位置
        left_gap: TargetGap,
        /// 後ろのノードの位置
        right_gap: TargetGap,
    },
    /// 二つのノードの目的言語順の入れ替え
    Flip {
        /// `left_gap`の位置に移る翻訳候補
        left: OptionRef,
        /// `right_gap`の位置に移る翻訳候補
        right: OptionRef,
        /// 目的言語順で前にあるノードの位置
        left_gap: TargetGap,
        /// 目的言語順で後ろにあるノードの位置
        right_gap: TargetGap,
    },
}

impl DeltaKind {
    fn options(&self) -> impl Iterator<Item = &OptionRef> {
        let (first, second) = match self {
            Self::Translation { option, .. } | Self::Merge { option, .. } => (option, None),
            Self::Split { left, right, .. }
            | Self::Paired { left, right, .. }
            | Self::Flip { left, right, .. } => (left, Some(right)),
        };
        std::iter::once(first).chain(second)
    }

    /// 出力文に対する書き換え
    pub fn rewrite<'a>(&'a self, sample: &'a Sample) -> Rewrite<'a> {
        fn joined<'a>(options: &[&'a OptionRef], gap: &TargetGap) -> Rewrite<'a> {
            Rewrite {
                region: gap.segment,
                words: options
                    .iter()
                    .flat_map(|&o| o.target())
                    .map(String::as_str)
                    .collect(),
            }
        }
        match self {
            Self::Translation { option, gap } | Self::Merge { option, gap } => {
                joined(&[option], gap)
            }
            Self::Split { left, right, gap } => joined(&[left, right], gap),
            Self::Paired {
                left,
                right,
                left_gap,
                right_gap,
            }
            | Self::Flip {
                left,
                right,
                left_gap,
                right_gap,
            } => bracketed_rewrite(sample, left, right, left_gap, right_gap),
        }
    }
}

/// 書き換えの候補とその見積もり
#[derive(Clone, Debug)]
pub struct TranslationDelta {
    kind: DeltaKind,
    scores: FeatureVector,
    score: f64,
}

impl TranslationDelta {
    fn new(sample: &Sample, features: &FeatureSet, kind: DeltaKind, distortion: f64) -> Self {
        let layout = features.layout();
        let mut scores = layout.zeros();
        let mut num_words = 0;
        for option in kind.options() {
            scores += option.scores();
            num_words += option.target().len();
        }
        scores.add_dense(layout.word_penalty(), -(num_words as f64));
        scores.add_dense(layout.distortion(), distortion);

        let rewrite = kind.rewrite(sample);
        scores.add_dense(
            layout.lm(),
            features.lm_rewrite_score(sample.target_words(), &rewrite),
        );

        for extra in features.extras() {
            match &kind {
                DeltaKind::Translation { option, gap } | DeltaKind::Merge { option, gap } => {
                    extra.single_update(sample, option, gap, &mut scores)
                }
                DeltaKind::Split { left, right, gap } => {
                    extra.contiguous_pair_update(sample, left, right, gap, &mut scores)
                }
                DeltaKind::Paired {
                    left,
                    right,
                    left_gap,
                    right_gap,
                } => {
                    if left_gap.segment.end == right_gap.segment.start {
                        let gap = TargetGap {
                            prev: left_gap.prev,
                            next: right_gap.next,
                            segment: rewrite.region,
                        };
                        extra.contiguous_pair_update(sample, left, right, &gap, &mut scores)
                    } else {
                        extra.discontiguous_pair_update(
                            sample,
                            left,
                            right,
                            left_gap,
                            right_gap,
                            &mut scores,
                        )
                    }
                }
                DeltaKind::Flip {
                    left,
                    right,
                    left_gap,
                    right_gap,
                } => extra.flip_update(sample, left, right, left_gap, right_gap, &mut scores),
            }
        }

        Self {
            kind,
            scores,
            score: 0.0,
        }
    }

    /// 一つのノードの置換
    pub fn translation(
        sample: &Sample,
        features: &FeatureSet,
        option: &OptionRef,
        gap: TargetGap,
    ) -> Self {
        let kind = DeltaKind::Translation {
            option: Arc::clone(option),
            gap,
        };
        Self::new(sample, features, kind, 0.0)
    }

    /// 隣接する二つのノードの結合。`gap`は二つのノードをまとめた位置です。
    pub fn merge(
        sample: &Sample,
        features: &FeatureSet,
        option: &OptionRef,
        gap: TargetGap,
    ) -> Self {
        let kind = DeltaKind::Merge {
            option: Arc::clone(option),
            gap,
        };
        Self::new(sample, features, kind, 0.0)
    }

    /// 一つのノードの単調な分割
    pub fn split(
        sample: &Sample,
        features: &FeatureSet,
        left: &OptionRef,
        right: &OptionRef,
        gap: TargetGap,
    ) -> Self {
        let kind = DeltaKind::Split {
            left: Arc::clone(left),
            right: Arc::clone(right),
            gap,
        };
        Self::new(sample, features, kind, 0.0)
    }

    /// 二つのノードの同時置換
    ///
    /// `distortion`は二つのノードに関わる歪みの値で、入れ替えの「変化なし」の候補として使う場合に指定します。
    pub fn paired(
        sample: &Sample,
        features: &FeatureSet,
        (left, right): (&OptionRef, &OptionRef),
        (left_gap, right_gap): (TargetGap, TargetGap),
        distortion: f64,
    ) -> Self {
        let kind = DeltaKind::Paired {
            left: Arc::clone(left),
            right: Arc::clone(right),
            left_gap,
            right_gap,
        };
        Self::new(sample, features, kind, distortion)
    }

    /// 二つのノードの入れ替え
    ///
    /// `distortion`は入れ替え後の、二つのノードに関わる歪みの値です。
    pub fn flip(
        sample: &Sample,
        features: &FeatureSet,
        (left, right): (&OptionRef, &OptionRef),
        (left_gap, right_gap): (TargetGap, TargetGap),
        distortion: f64,
    ) -> Self {
        let kind = DeltaKind::Flip {
            left: Arc::clone(left),
            right: Arc::clone(right),
            left_gap,
            right_gap,
        };
        Self::new(sample, features, kind, distortion)
    }

    /// 書き換えの種類
    #[inline(always)]
    pub fn kind(&self) -> &DeltaKind {
        &self.kind
    }

    /// 影響を受ける部分の素性値
    #[inline(always)]
    pub fn scores(&self) -> &FeatureVector {
        &self.scores
    }

    /// 重み付きスコア。[`Self::update_weighted_score`]で計算されます。
    #[inline(always)]
    pub fn score(&self) -> f64 {
        self.score
    }

    /// 重みとの内積で重み付きスコアを計算し直します。
    pub fn update_weighted_score(&mut self, weights: &FeatureVector) {
        self.score = self.scores.inner_product(weights);
    }

    /// 適用した場合の出力文
    pub fn new_sentence<'a>(&'a self, sample: &'a Sample) -> Vec<&'a str> {
        self.kind.rewrite(sample).apply(sample.target_words())
    }

    /// 適用した場合のサンプル全体の素性値
    pub fn new_feature_values(&self, sample: &Sample, no_change: &Self) -> FeatureVector {
        let mut fv = sample.feature_values() - &no_change.scores;
        fv += &self.scores;
        fv
    }

    /// 書き換えをサンプルに適用します。
    ///
    /// 素性値の差分は、このデルタと`no_change`の見積もりの差です。
    ///
    /// # エラー
    ///
    /// デルタが作られた後にサンプルが書き換えられていて、適用できない場合にエラーを返します。
    pub fn apply(&self, sample: &mut Sample, no_change: &Self) -> Result<()> {
        let delta = &self.scores - &no_change.scores;
        match &self.kind {
            DeltaKind::Translation { option, .. } => sample.change_target(option, &delta),
            DeltaKind::Merge { option, .. } => sample.merge_target(option, &delta),
            DeltaKind::Split { left, right, .. } => sample.split_target(left, right, &delta),
            DeltaKind::Paired { left, right, .. } => {
                sample.change_target_pair(left, right, &delta)
            }
            DeltaKind::Flip {
                left,
                right,
                left_gap,
                right_gap,
            } => sample.flip_nodes(left, right, left_gap.prev, right_gap.next, &delta),
        }
    }
}
