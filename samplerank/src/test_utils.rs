//! テスト用ユーティリティ
//!
//! テストコードで使用する便利なマクロや関数を提供します。

use crate::feature_vector::FeatureLayout;
use crate::model::NgramLanguageModel;
use crate::options::{Span, TranslationOption, TranslationOptionCollection};
use crate::utils::split_words;

macro_rules! hashmap {
    ( $($k:expr => $v:expr,)* ) => {
        {
            #[allow(unused_mut)]
            let mut h = hashbrown::HashMap::new();
            $(
                h.insert($k, $v);
            )*
            h
        }
    };
    ( $($k:expr => $v:expr),* ) => {
        hashmap![$( $k => $v, )*]
    };
}

pub(crate) use hashmap;

/// テストで使う翻訳モデルの成分数
pub(crate) const TOY_LAYOUT: FeatureLayout = FeatureLayout::new(1);

const TOY_ARPA: &str = include_str!("./tests/resources/toy.arpa");

/// 小さなbigram言語モデル
pub(crate) fn toy_language_model() -> NgramLanguageModel {
    NgramLanguageModel::from_arpa(TOY_ARPA.as_bytes()).unwrap()
}

/// `(start, end, target, tm)`の組から翻訳候補の集合を作ります。
pub(crate) fn toy_collection(
    source: &str,
    options: &[(usize, usize, &str, f64)],
) -> TranslationOptionCollection {
    let mut toc = TranslationOptionCollection::new(split_words(source)).unwrap();
    for &(start, end, target, tm) in options {
        let mut scores = TOY_LAYOUT.zeros();
        scores.set_dense(TOY_LAYOUT.tm(0), tm);
        toc.add(TranslationOption::new(
            Span::new(start, end),
            split_words(target),
            scores,
        ))
        .unwrap();
    }
    toc
}
