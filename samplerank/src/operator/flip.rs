use crate::delta::TranslationDelta;
use crate::features::{FeatureSet, distortion_score};
use crate::operator::{GibbsOperator, Proposal};
use crate::options::TranslationOptionCollection;
use crate::sample::Sample;

/// 入れ替えオペレーター
///
/// 走査の開始時に原言語側の分割点を集め、二つの区間の組ごとに目的言語順の入れ替えを提案します。
/// 入れ替え後の歪みのいずれかが上限を超える場合、その入れ替えは提案されません。
#[derive(Clone, Debug, Default)]
pub struct FlipOperator {
    starts: Vec<usize>,
    first: usize,
    second: usize,
}

impl FlipOperator {
    /// 新しいオペレーターを作成します。
    pub fn new() -> Self {
        Self::default()
    }
}

impl GibbsOperator for FlipOperator {
    fn name(&self) -> &'static str {
        "flip"
    }

    fn reset_iterator(&mut self, sample: &Sample) {
        self.starts = sample
            .source_order()
            .map(|id| sample.node(id).source().start)
            .collect();
        self.first = 0;
        self.second = 1;
    }

    fn keep_going(&self) -> bool {
        self.second < self.starts.len()
    }

    fn next(&mut self) {
        self.second += 1;
        if self.second >= self.starts.len() {
            self.first += 1;
            self.second = self.first + 1;
        }
    }

    fn propose(
        &self,
        sample: &Sample,
        _toc: &TranslationOptionCollection,
        features: &FeatureSet,
    ) -> Option<Proposal> {
        let a = sample.node_at_source(self.starts[self.first])?;
        let b = sample.node_at_source(self.starts[self.second])?;
        if a == b {
            return None;
        }
        let (x, y) = if sample.node(a).target().start < sample.node(b).target().start {
            (a, b)
        } else {
            (b, a)
        };
        let (xn, yn) = (sample.node(x), sample.node(y));
        let (xs, ys) = (xn.source(), yn.source());
        let prev = xn.tgt_prev().map(|id| sample.node(id).source());
        let next = yn.tgt_next().map(|id| sample.node(id).source());

        // Distortion terms touching the two phrases, before and after the flip.
        let (mut current, mut flipped) = if xn.tgt_next() == Some(y) {
            (
                vec![distortion_score(prev, xs), distortion_score(Some(xs), ys)],
                vec![distortion_score(prev, ys), distortion_score(Some(ys), xs)],
            )
        } else {
            let m1 = sample.node(xn.tgt_next()?).source();
            let mk = sample.node(yn.tgt_prev()?).source();
            (
                vec![
                    distortion_score(prev, xs),
                    distortion_score(Some(xs), m1),
                    distortion_score(Some(mk), ys),
                ],
                vec![
                    distortion_score(prev, ys),
                    distortion_score(Some(ys), m1),
                    distortion_score(Some(mk), xs),
                ],
            )
        };
        if let Some(next) = next {
            current.push(distortion_score(Some(ys), next));
            flipped.push(distortion_score(Some(xs), next));
        }
        if !flipped.iter().all(|&d| features.within_distortion_limit(d)) {
            return None;
        }

        let gaps = (sample.gap(x), sample.gap(y));
        let no_change = TranslationDelta::paired(
            sample,
            features,
            (xn.option(), yn.option()),
            gaps,
            current.iter().sum(),
        );
        let flip = TranslationDelta::flip(
            sample,
            features,
            (yn.option(), xn.option()),
            gaps,
            flipped.iter().sum(),
        );
        Some(Proposal {
            deltas: vec![flip, no_change.clone()],
            no_change,
            no_change_index: Some(1),
        })
    }
}
