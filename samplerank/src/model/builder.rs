//! テキスト形式のリソースから[`Model`]を構築するビルダー

use std::io::Read;

use crate::errors::{Result, SampleRankError};
use crate::model::{LanguageModel, Model, NgramLanguageModel, PhraseTable};

/// テキスト形式のフレーズテーブルとARPA言語モデルから[`Model`]を構築するビルダー
pub struct ModelBuilder {}

impl ModelBuilder {
    /// リーダーからモデルを構築します。
    ///
    /// # 引数
    ///
    ///  - `phrase_table_rdr`: フレーズテーブル(`source ||| target ||| scores`)のリーダー
    ///  - `arpa_rdr`: ARPA形式の言語モデルのリーダー
    ///
    /// # エラー
    ///
    /// どちらかの入力が不正な場合、またはフレーズテーブルが空の場合に
    /// [`SampleRankError`]を返します。
    ///
    /// # 例
    ///
    /// ```
    /// use samplerank::model::ModelBuilder;
    ///
    /// let phrases = "das haus ||| the house ||| 0.8\n";
    /// let arpa = "\\data\\\nngram 1=2\n\\1-grams:\n-1 the\n-1 house\n\\end\\\n";
    /// let model = ModelBuilder::from_readers(phrases.as_bytes(), arpa.as_bytes()).unwrap();
    /// assert_eq!(1, model.layout().num_tm());
    /// ```
    pub fn from_readers<P, L>(phrase_table_rdr: P, arpa_rdr: L) -> Result<Model>
    where
        P: Read,
        L: Read,
    {
        let phrase_table = PhraseTable::from_reader(phrase_table_rdr)?;
        if phrase_table.is_empty() {
            return Err(SampleRankError::invalid_argument(
                "phrase_table_rdr",
                "the phrase table has no entries",
            ));
        }
        let language_model = NgramLanguageModel::from_arpa(arpa_rdr)?;
        log::info!(
            "model built: {} phrase pairs, {}-gram language model with {} n-grams",
            phrase_table.len(),
            language_model.order(),
            language_model.entries().len(),
        );
        Ok(Model::new(phrase_table, language_model))
    }
}
