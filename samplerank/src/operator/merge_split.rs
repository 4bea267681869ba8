use std::sync::Arc;

use crate::delta::TranslationDelta;
use crate::features::FeatureSet;
use crate::operator::{GibbsOperator, Proposal};
use crate::options::{Span, TranslationOptionCollection};
use crate::sample::{NodeId, Sample};

/// 結合・分割オペレーター
///
/// 原言語の単語間の境界を順に走査します。
///
/// - 境界が現在の分割点の場合: 両側の区間を覆う候補による結合と、分割を保った両側の同時置換
/// - 境界がノードの内側の場合: ノードの置換と、境界での分割
#[derive(Clone, Debug)]
pub struct MergeSplitOperator {
    toption_limit: usize,
    position: usize,
    end: usize,
}

impl MergeSplitOperator {
    /// 区間ごとに考慮する候補の数を指定して作成します。0は無制限です。
    pub fn new(toption_limit: usize) -> Self {
        Self {
            toption_limit,
            position: 1,
            end: 0,
        }
    }

    fn propose_at_split(
        &self,
        sample: &Sample,
        toc: &TranslationOptionCollection,
        features: &FeatureSet,
        left: NodeId,
        right: NodeId,
    ) -> Proposal {
        let (ln, rn) = (sample.node(left), sample.node(right));
        let (first, second) = if ln.target().start < rn.target().start {
            (left, right)
        } else {
            (right, left)
        };
        let (fnode, snode) = (sample.node(first), sample.node(second));
        let gaps = (sample.gap(first), sample.gap(second));
        let current = (fnode.option(), snode.option());
        let no_change = TranslationDelta::paired(sample, features, current, gaps, 0.0);

        let mut deltas = vec![];
        // Only monotone neighbours are merged.
        if ln.tgt_next() == Some(right) {
            let span = Span::new(ln.source().start, rn.source().end);
            let gap = sample.joint_gap(left, right);
            for option in toc.pruned(span, self.toption_limit) {
                deltas.push(TranslationDelta::merge(sample, features, option, gap));
            }
        }

        let mut no_change_index = None;
        for a in toc.pruned(fnode.source(), self.toption_limit) {
            for b in toc.pruned(snode.source(), self.toption_limit) {
                if Arc::ptr_eq(a, current.0) && Arc::ptr_eq(b, current.1) {
                    no_change_index = Some(deltas.len());
                    deltas.push(no_change.clone());
                } else {
                    deltas.push(TranslationDelta::paired(sample, features, (a, b), gaps, 0.0));
                }
            }
        }
        if no_change_index.is_none() {
            no_change_index = Some(deltas.len());
            deltas.push(no_change.clone());
        }

        Proposal {
            deltas,
            no_change,
            no_change_index,
        }
    }

    fn propose_inside(
        &self,
        sample: &Sample,
        toc: &TranslationOptionCollection,
        features: &FeatureSet,
        id: NodeId,
    ) -> Proposal {
        let node = sample.node(id);
        let span = node.source();
        let gap = sample.gap(id);
        let current = node.option();
        let no_change = TranslationDelta::translation(sample, features, current, gap);

        let mut deltas = vec![];
        let mut no_change_index = None;
        for option in toc.pruned(span, self.toption_limit) {
            if Arc::ptr_eq(option, current) {
                no_change_index = Some(deltas.len());
                deltas.push(no_change.clone());
            } else {
                deltas.push(TranslationDelta::translation(sample, features, option, gap));
            }
        }
        if no_change_index.is_none() {
            no_change_index = Some(deltas.len());
            deltas.push(no_change.clone());
        }

        let p = self.position;
        for left in toc.pruned(Span::new(span.start, p), self.toption_limit) {
            for right in toc.pruned(Span::new(p, span.end), self.toption_limit) {
                deltas.push(TranslationDelta::split(sample, features, left, right, gap));
            }
        }

        Proposal {
            deltas,
            no_change,
            no_change_index,
        }
    }
}

impl GibbsOperator for MergeSplitOperator {
    fn name(&self) -> &'static str {
        "merge-split"
    }

    fn reset_iterator(&mut self, sample: &Sample) {
        self.position = 1;
        self.end = sample.source_len();
    }

    fn keep_going(&self) -> bool {
        self.position < self.end
    }

    fn next(&mut self) {
        self.position += 1;
    }

    fn propose(
        &self,
        sample: &Sample,
        toc: &TranslationOptionCollection,
        features: &FeatureSet,
    ) -> Option<Proposal> {
        let right = sample.node_at_source(self.position)?;
        let proposal = if sample.node(right).source().start == self.position {
            let left = sample.node_at_source(self.position - 1)?;
            self.propose_at_split(sample, toc, features, left, right)
        } else {
            self.propose_inside(sample, toc, features, right)
        };
        (proposal.deltas.len() > 1).then_some(proposal)
    }
}
