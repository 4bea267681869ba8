//! # SampleRank
//!
//! フレーズベース統計的機械翻訳のためのGibbsサンプリングデコーダーと、
//! SampleRankによるオンライン学習の実装です。
//!
//! ## 概要
//!
//! 入力文の導出(フレーズ対の列)をサンプルとして保持し、
//! オペレーターが提案する局所的な書き換え(訳語の交換、結合と分割、並べ替え)を
//! 差分計算したスコアに基づいて選択することで、導出の空間をサンプリングします。
//! サンプリング中に見つかった、モデルのスコアと利得(文単位のBLEU)の順位の逆転から
//! パーセプトロンやMIRAで重みを更新します。
//!
//! ## 主な機能
//!
//! - **二重順序のサンプル**: 原言語順と目的言語順を同時に保持するアリーナ上の導出
//! - **差分スコア計算**: 書き換えの影響範囲だけを再計算する言語モデルと追加素性
//! - **レプリカ交換**: 温度の異なる複数の連鎖と、その間の交換
//! - **オンライン学習**: パーセプトロン、MIRA、Hildrethのアルゴリズムを用いたMIRA+
//! - **高速なモデル読み込み**: rkyvによるフレーズテーブルと言語モデルのアーカイブ
//!
//! ## 使用例
//!
//! ```
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use samplerank::{
//!     FeatureSet, GreedyAcceptor, MaxTranslationCollector, ModelBuilder, Sample, Sampler,
//!     SamplerConfig, SamplerContext, TranslationOptionCollection,
//! };
//! use samplerank::selector::AcceptorSelector;
//! use samplerank::utils::split_words;
//!
//! let phrases = "das ||| the ||| 0.6\n\
//!                das haus ||| the house ||| 0.5\n\
//!                haus ||| house ||| 0.7\n\
//!                haus ||| home ||| 0.3\n";
//! let arpa = "\\data\\\nngram 1=5\n\n\\1-grams:\n\
//!             -1.0\t<s>\n-1.0\t</s>\n-0.5\tthe\n-0.7\thouse\n-2.0\thome\n\n\\end\\\n";
//! let model = ModelBuilder::from_readers(phrases.as_bytes(), arpa.as_bytes())?;
//! let layout = model.layout();
//! let weights = layout.default_weights();
//!
//! let source = split_words("das haus");
//! let toc = TranslationOptionCollection::from_phrase_table(
//!     model.phrase_table(),
//!     source.clone(),
//!     &weights,
//! )?;
//! let features = FeatureSet::new(layout, model.language_model());
//! let mut sample = Sample::new(source, &toc.seed_derivation()?, &features)?;
//!
//! let mut ctx = SamplerContext::new(42, weights);
//! let mut selector = AcceptorSelector::new(GreedyAcceptor::new());
//! let mut best = MaxTranslationCollector::new();
//! let mut sampler = Sampler::new(SamplerConfig::default().iterations(5))?;
//! sampler.run(
//!     &mut sample,
//!     &toc,
//!     &features,
//!     &mut selector,
//!     &mut ctx,
//!     &mut [&mut best],
//!     |_| false,
//! )?;
//!
//! assert_eq!(Some("the house"), best.max().map(|(t, _)| t));
//! # Ok(())
//! # }
//! ```
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod acceptor;
pub mod annealing;
pub mod collector;
pub mod context;
pub mod delta;

/// エラー型の定義
pub mod errors;

pub mod extra_feature;
pub mod feature_vector;
pub mod features;
pub mod gain;
pub mod hildreth;
pub mod learner;

/// フレーズテーブルと言語モデル
pub mod model;

pub mod operator;
pub mod options;
pub mod sample;
pub mod sampler;
pub mod selector;
pub mod trainer;

/// 内部ユーティリティ関数
pub mod utils;

pub mod weights;

#[cfg(test)]
mod test_utils;
#[cfg(test)]
mod tests;

// Re-exports
pub use acceptor::{FixedTempAcceptor, GreedyAcceptor, SampleAcceptor};
pub use collector::{MaxTranslationCollector, SampleCollector};
pub use context::SamplerContext;
pub use feature_vector::{FeatureLayout, FeatureVector};
pub use features::FeatureSet;
pub use model::{Model, ModelBuilder};
pub use options::TranslationOptionCollection;
pub use sample::Sample;
pub use sampler::{Sampler, SamplerConfig};

/// このライブラリのバージョン番号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
