//! Gibbsオペレーター
//!
//! オペレーターはサンプルを走査し、走査位置ごとに互いに排他的な書き換え候補の集合と、
//! 「変化なし」を表す候補を一つ作ります。オペレーター自身はサンプルを変更しません。
//! 一回の走査(スイープ)では、走査位置ごとに候補を作り、選択器が選んだ候補を適用します。

mod flip;
mod merge_split;
mod translation_swap;

use crate::context::SamplerContext;
use crate::delta::TranslationDelta;
use crate::errors::Result;
use crate::feature_vector::FeatureVector;
use crate::features::FeatureSet;
use crate::options::TranslationOptionCollection;
use crate::sample::Sample;
use crate::selector::DeltaSelector;

pub use crate::operator::flip::FlipOperator;
pub use crate::operator::merge_split::MergeSplitOperator;
pub use crate::operator::translation_swap::TranslationSwapOperator;

/// 一つの走査位置での書き換え候補
#[derive(Clone, Debug)]
pub struct Proposal {
    /// 互いに排他的な候補
    pub deltas: Vec<TranslationDelta>,
    /// 差分計算の基準となる「変化なし」の候補
    pub no_change: TranslationDelta,
    /// `deltas`のうち「変化なし」と同じ候補の位置
    pub no_change_index: Option<usize>,
}

impl Proposal {
    /// 重みとの内積で各候補のスコアを計算し直します。
    pub fn update_scores(&mut self, weights: &FeatureVector) {
        for delta in &mut self.deltas {
            delta.update_weighted_score(weights);
        }
        self.no_change.update_weighted_score(weights);
    }

    /// 各候補の重み付きスコア
    pub fn scores(&self) -> Vec<f64> {
        self.deltas.iter().map(TranslationDelta::score).collect()
    }

    /// 候補`i`を適用した場合のサンプル全体の素性値
    pub fn feature_values(&self, sample: &Sample, i: usize) -> FeatureVector {
        self.deltas[i].new_feature_values(sample, &self.no_change)
    }
}

/// Gibbsオペレーター
pub trait GibbsOperator {
    /// オペレーターの名前
    fn name(&self) -> &'static str;

    /// 走査位置を先頭に戻します。
    fn reset_iterator(&mut self, sample: &Sample);

    /// 走査位置が残っているかどうか
    fn keep_going(&self) -> bool;

    /// 次の走査位置に進みます。
    fn next(&mut self);

    /// 現在の走査位置で書き換え候補を作ります。候補がない場合は`None`を返します。
    fn propose(
        &self,
        sample: &Sample,
        toc: &TranslationOptionCollection,
        features: &FeatureSet,
    ) -> Option<Proposal>;
}

/// オペレーターで一回の走査を行います。
///
/// # 戻り値
///
/// 「変化なし」以外の候補が適用された回数
///
/// # エラー
///
/// 選ばれた候補を適用できなかった場合にエラーを返します。
pub fn sweep(
    operator: &mut dyn GibbsOperator,
    sample: &mut Sample,
    toc: &TranslationOptionCollection,
    features: &FeatureSet,
    selector: &mut dyn DeltaSelector,
    ctx: &mut SamplerContext,
    iteration: usize,
) -> Result<usize> {
    let mut applied = 0;
    operator.reset_iterator(sample);
    while operator.keep_going() {
        if let Some(mut proposal) = operator.propose(sample, toc, features) {
            proposal.update_scores(&ctx.weights);
            let chosen = selector.select(sample, &proposal, ctx, iteration);
            log::debug!(
                "{}: {} candidates, chose {:?}",
                operator.name(),
                proposal.deltas.len(),
                chosen
            );
            if let Some(i) = chosen
                && Some(i) != proposal.no_change_index
            {
                proposal.deltas[i].apply(sample, &proposal.no_change)?;
                applied += 1;
            }
        }
        operator.next();
    }
    Ok(applied)
}
