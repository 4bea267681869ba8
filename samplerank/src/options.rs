//! 翻訳候補(フレーズ対)とその集合
//!
//! 入力文の各区間に対する翻訳候補を、サンプリング開始前に一度だけ列挙します。
//! サンプリング中は読み取り専用です。

use std::ops::Range;
use std::sync::Arc;

use hashbrown::HashMap;

use crate::errors::{Result, SampleRankError};
use crate::feature_vector::{FeatureLayout, FeatureVector};
use crate::model::PhraseTable;

/// 未知語に付与される疎な素性の名前
pub const UNKNOWN_WORD_PENALTY: &str = "UnknownWordPenalty";

/// 半開区間`[start, end)`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    /// 開始位置
    pub start: usize,
    /// 終了位置(この位置を含まない)
    pub end: usize,
}

impl Span {
    /// 新しい区間を作成します。
    #[inline(always)]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// 区間の長さ
    #[inline(always)]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    /// 空の区間かどうか
    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// 位置`i`を含むかどうか
    #[inline(always)]
    pub const fn contains(&self, i: usize) -> bool {
        self.start <= i && i < self.end
    }

    /// `Range`に変換します。
    #[inline(always)]
    pub const fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// 翻訳候補
///
/// 原言語側の区間、目的言語側の単語列、静的なスコア内訳を持ちます。
/// 一度作られた候補が変更されることはありません。
#[derive(Debug)]
pub struct TranslationOption {
    source: Span,
    target: Vec<String>,
    scores: FeatureVector,
}

/// 共有される翻訳候補への参照
pub type OptionRef = Arc<TranslationOption>;

impl TranslationOption {
    /// 新しい翻訳候補を作成します。
    pub fn new(source: Span, target: Vec<String>, scores: FeatureVector) -> Self {
        Self {
            source,
            target,
            scores,
        }
    }

    /// 原言語側の区間
    #[inline(always)]
    pub fn source(&self) -> Span {
        self.source
    }

    /// 目的言語側の単語列
    #[inline(always)]
    pub fn target(&self) -> &[String] {
        &self.target
    }

    /// 静的なスコア内訳
    #[inline(always)]
    pub fn scores(&self) -> &FeatureVector {
        &self.scores
    }

    /// 重みの下での静的なスコア(単語ペナルティを含む)
    pub fn static_score(&self, weights: &FeatureVector, layout: &FeatureLayout) -> f64 {
        self.scores.inner_product(weights)
            - weights.dense(layout.word_penalty()) * self.target.len() as f64
    }
}

/// 入力文一つ分の翻訳候補の集合
///
/// 各区間の候補リストは静的スコアの降順に並びます。
#[derive(Debug, Default)]
pub struct TranslationOptionCollection {
    source: Vec<String>,
    spans: HashMap<Span, Vec<OptionRef>>,
}

impl TranslationOptionCollection {
    /// 空の集合を作成します。
    ///
    /// # エラー
    ///
    /// 入力文が空の場合にエラーを返します。
    pub fn new(source: Vec<String>) -> Result<Self> {
        if source.is_empty() {
            return Err(SampleRankError::invalid_argument(
                "source",
                "the source sentence must not be empty",
            ));
        }
        Ok(Self {
            source,
            spans: HashMap::new(),
        })
    }

    /// フレーズテーブルから翻訳候補を列挙します。
    ///
    /// 原言語の単語一語に対する候補が一つもない場合は、その単語をそのまま出力する候補を追加します。
    ///
    /// # 引数
    ///
    /// * `table` - フレーズテーブル
    /// * `source` - 入力文の単語列
    /// * `weights` - 候補の並び替えに使う重み
    ///
    /// # エラー
    ///
    /// 入力文が空の場合にエラーを返します。
    pub fn from_phrase_table(
        table: &PhraseTable,
        source: Vec<String>,
        weights: &FeatureVector,
    ) -> Result<Self> {
        let layout = FeatureLayout::new(table.num_scores());
        let mut collection = Self::new(source)?;
        let n = collection.source.len();
        for start in 0..n {
            let max_end = n.min(start + table.max_source_len());
            for end in start + 1..=max_end {
                let span = Span::new(start, end);
                let options: Vec<OptionRef> = table
                    .lookup(&collection.source[span.range()])
                    .map(|entry| {
                        let mut scores = layout.zeros();
                        for (i, &s) in entry.scores.iter().enumerate() {
                            scores.set_dense(layout.tm(i), f64::from(s));
                        }
                        Arc::new(TranslationOption::new(span, entry.target.clone(), scores))
                    })
                    .collect();
                if !options.is_empty() {
                    collection.spans.insert(span, options);
                }
            }
            let unit = Span::new(start, start + 1);
            if !collection.spans.contains_key(&unit) {
                log::debug!("unknown word: {}", collection.source[start]);
                let mut scores = layout.zeros();
                scores.set_sparse(UNKNOWN_WORD_PENALTY, -1.0);
                let target = vec![collection.source[start].clone()];
                collection
                    .spans
                    .insert(unit, vec![Arc::new(TranslationOption::new(unit, target, scores))]);
            }
        }
        collection.sort_options(weights, &layout);
        Ok(collection)
    }

    /// 翻訳候補を追加します。
    ///
    /// # エラー
    ///
    /// 候補の区間が空の場合や入力文の外にある場合にエラーを返します。
    pub fn add(&mut self, option: TranslationOption) -> Result<OptionRef> {
        let span = option.source();
        if span.is_empty() || span.end > self.source.len() {
            return Err(SampleRankError::invalid_argument(
                "option",
                format!("span {span:?} is outside the sentence"),
            ));
        }
        let option = Arc::new(option);
        self.spans.entry(span).or_default().push(Arc::clone(&option));
        Ok(option)
    }

    /// 各区間の候補を静的スコアの降順に並べ替えます。
    pub fn sort_options(&mut self, weights: &FeatureVector, layout: &FeatureLayout) {
        for options in self.spans.values_mut() {
            options.sort_by(|a, b| {
                b.static_score(weights, layout)
                    .total_cmp(&a.static_score(weights, layout))
            });
        }
    }

    /// 入力文の単語列
    pub fn source_words(&self) -> &[String] {
        &self.source
    }

    /// 入力文の長さ
    pub fn source_len(&self) -> usize {
        self.source.len()
    }

    /// 区間`span`の翻訳候補のリスト。候補がない場合は空のスライスを返します。
    pub fn options(&self, span: Span) -> &[OptionRef] {
        self.spans.get(&span).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 区間`span`の上位`limit`個の翻訳候補。`limit`が0の場合はすべてを返します。
    pub fn pruned(&self, span: Span, limit: usize) -> &[OptionRef] {
        let options = self.options(span);
        if limit == 0 || limit >= options.len() {
            options
        } else {
            &options[..limit]
        }
    }

    /// 初期導出を作ります。
    ///
    /// 左から順に、候補が存在する最長の区間を選び、その最上位の候補を使います。
    /// 結果は目的言語側の順(この場合は原言語側と同じ順)に並びます。
    ///
    /// # エラー
    ///
    /// どの候補にも覆われない位置がある場合にエラーを返します。
    pub fn seed_derivation(&self) -> Result<Vec<OptionRef>> {
        let n = self.source.len();
        let mut derivation = vec![];
        let mut start = 0;
        while start < n {
            let best = (start + 1..=n)
                .rev()
                .find_map(|end| self.options(Span::new(start, end)).first());
            let Some(option) = best else {
                return Err(SampleRankError::invalid_state(
                    "cannot seed a derivation",
                    format!("no translation option covers position {start}"),
                ));
            };
            derivation.push(Arc::clone(option));
            start = option.source().end;
        }
        Ok(derivation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::utils::split_words;

    fn table() -> PhraseTable {
        let text = "das ||| the ||| 0.5\n\
                    das ||| that ||| 0.25\n\
                    das haus ||| the house ||| 0.4\n\
                    haus ||| house ||| 0.9\n";
        PhraseTable::from_reader(text.as_bytes()).unwrap()
    }

    #[test]
    fn test_from_phrase_table() {
        let layout = FeatureLayout::new(1);
        let mut weights = layout.zeros();
        weights.set_dense(layout.tm(0), 1.0);
        let toc = TranslationOptionCollection::from_phrase_table(
            &table(),
            split_words("das haus ist"),
            &weights,
        )
        .unwrap();

        let das = toc.options(Span::new(0, 1));
        assert_eq!(2, das.len());
        assert_eq!(&["the".to_string()], das[0].target());
        assert_eq!(1, toc.pruned(Span::new(0, 1), 1).len());
        assert_eq!(2, toc.pruned(Span::new(0, 1), 0).len());
        assert_eq!(1, toc.options(Span::new(0, 2)).len());
        assert!(toc.options(Span::new(1, 3)).is_empty());

        let ist = toc.options(Span::new(2, 3));
        assert_eq!(1, ist.len());
        assert_eq!(&["ist".to_string()], ist[0].target());
        assert_eq!(-1.0, ist[0].scores().sparse(UNKNOWN_WORD_PENALTY));
    }

    #[test]
    fn test_seed_derivation() {
        let layout = FeatureLayout::new(1);
        let toc = TranslationOptionCollection::from_phrase_table(
            &table(),
            split_words("das haus ist"),
            &layout.zeros(),
        )
        .unwrap();
        let seed = toc.seed_derivation().unwrap();
        let spans: Vec<Span> = seed.iter().map(|o| o.source()).collect();
        assert_eq!(vec![Span::new(0, 2), Span::new(2, 3)], spans);
    }

    #[test]
    fn test_seed_derivation_uncovered() {
        let mut toc = TranslationOptionCollection::new(split_words("a b")).unwrap();
        toc.add(TranslationOption::new(
            Span::new(0, 1),
            split_words("x"),
            FeatureVector::zeros(4),
        ))
        .unwrap();
        assert!(toc.seed_derivation().is_err());
        assert!(
            toc.add(TranslationOption::new(
                Span::new(1, 3),
                split_words("y"),
                FeatureVector::zeros(4),
            ))
            .is_err()
        );
    }
}
