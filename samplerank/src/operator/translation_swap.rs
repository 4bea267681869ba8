use std::sync::Arc;

use crate::delta::TranslationDelta;
use crate::features::FeatureSet;
use crate::operator::{GibbsOperator, Proposal};
use crate::options::TranslationOptionCollection;
use crate::sample::Sample;

/// 置換オペレーター
///
/// 分割と順序を保ったまま、各ノードの翻訳候補を置き換えます。
#[derive(Clone, Debug)]
pub struct TranslationSwapOperator {
    toption_limit: usize,
    position: usize,
    end: usize,
}

impl TranslationSwapOperator {
    /// 区間ごとに考慮する候補の数を指定して作成します。0は無制限です。
    pub fn new(toption_limit: usize) -> Self {
        Self {
            toption_limit,
            position: 0,
            end: 0,
        }
    }
}

impl GibbsOperator for TranslationSwapOperator {
    fn name(&self) -> &'static str {
        "translation-swap"
    }

    fn reset_iterator(&mut self, sample: &Sample) {
        self.position = 0;
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
        let id = sample.node_at_source(self.position)?;
        let node = sample.node(id);
        if node.source().start != self.position {
            return None;
        }
        let gap = sample.gap(id);
        let current = node.option();
        let no_change = TranslationDelta::translation(sample, features, current, gap);

        let mut deltas = vec![];
        let mut no_change_index = None;
        for option in toc.pruned(node.source(), self.toption_limit) {
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
        if deltas.len() < 2 {
            return None;
        }

        Some(Proposal {
            deltas,
            no_change,
            no_change_index,
        })
    }
}
