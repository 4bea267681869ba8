//! フレーズテーブル
//!
//! `source ||| target ||| p1 p2 ... pk`形式のテキストを読み込み、
//! 原言語フレーズから候補エントリを引けるようにします。
//! 確率は自然対数で保持します。

use std::io::{BufRead, BufReader, Read};

use hashbrown::HashMap;
use rkyv::{Archive, Deserialize, Serialize};

use crate::errors::{Result, SampleRankError};
use crate::utils::split_words;

const FIELD_SEPARATOR: &str = "|||";

/// フレーズテーブルの一行
#[derive(Archive, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PhraseEntry {
    /// 原言語側の単語列
    pub source: Vec<String>,
    /// 目的言語側の単語列
    pub target: Vec<String>,
    /// 翻訳モデルの各成分(自然対数)
    pub scores: Vec<f32>,
}

/// 原言語フレーズで索引付けされたフレーズテーブル
#[derive(Clone, Debug, Default)]
pub struct PhraseTable {
    num_scores: usize,
    max_source_len: usize,
    entries: Vec<PhraseEntry>,
    index: HashMap<Vec<String>, Vec<usize>>,
}

impl PhraseTable {
    /// エントリ列からフレーズテーブルを構築します。
    ///
    /// # エラー
    ///
    /// エントリごとにスコアの成分数が異なる場合や、
    /// 原言語側・目的言語側が空のエントリがある場合にエラーを返します。
    pub fn from_entries(entries: Vec<PhraseEntry>) -> Result<Self> {
        let num_scores = entries.first().map_or(0, |e| e.scores.len());
        let mut max_source_len = 0;
        let mut index: HashMap<Vec<String>, Vec<usize>> = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            if entry.scores.len() != num_scores {
                return Err(SampleRankError::invalid_format(
                    "phrase_table",
                    format!(
                        "entry {} has {} scores, expected {}",
                        i,
                        entry.scores.len(),
                        num_scores
                    ),
                ));
            }
            if entry.source.is_empty() || entry.target.is_empty() {
                return Err(SampleRankError::invalid_format(
                    "phrase_table",
                    format!("entry {i} has an empty phrase"),
                ));
            }
            max_source_len = max_source_len.max(entry.source.len());
            index.entry(entry.source.clone()).or_default().push(i);
        }
        Ok(Self {
            num_scores,
            max_source_len,
            entries,
            index,
        })
    }

    /// テキスト形式のフレーズテーブルを読み込みます。
    ///
    /// 空行と`#`で始まる行は無視されます。4番目以降の欄(アラインメントなど)も無視されます。
    ///
    /// # 引数
    ///
    /// * `rdr` - フレーズテーブルのリーダー
    ///
    /// # エラー
    ///
    /// 欄が足りない場合、確率が正の数でない場合、成分数が揃っていない場合に
    /// [`SampleRankError`]を返します。
    ///
    /// # 例
    ///
    /// ```
    /// use samplerank::model::PhraseTable;
    ///
    /// let text = "das haus ||| the house ||| 0.8 0.5\nhaus ||| house ||| 0.9 0.7\n";
    /// let table = PhraseTable::from_reader(text.as_bytes()).unwrap();
    /// assert_eq!(2, table.num_scores());
    /// assert_eq!(2, table.max_source_len());
    /// ```
    pub fn from_reader<R>(rdr: R) -> Result<Self>
    where
        R: Read,
    {
        let mut entries = vec![];
        for (lineno, line) in BufReader::new(rdr).lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            entries.push(Self::parse_line(line).map_err(|e| match e {
                SampleRankError::InvalidFormat(e) => SampleRankError::invalid_format(
                    "phrase_table",
                    format!("line {}: {}", lineno + 1, e.msg),
                ),
                e => e,
            })?);
        }
        Self::from_entries(entries)
    }

    fn parse_line(line: &str) -> Result<PhraseEntry> {
        let mut spl = line.split(FIELD_SEPARATOR);
        let (Some(source), Some(target), Some(scores)) = (spl.next(), spl.next(), spl.next())
        else {
            return Err(SampleRankError::invalid_format(
                "phrase_table",
                "a line must have `source ||| target ||| scores`",
            ));
        };
        let mut parsed = vec![];
        for field in scores.split_ascii_whitespace() {
            let p: f64 = field.parse().map_err(|_| {
                SampleRankError::invalid_format("phrase_table", format!("invalid score {field}"))
            })?;
            if p <= 0.0 || !p.is_finite() {
                return Err(SampleRankError::invalid_format(
                    "phrase_table",
                    format!("a probability must be positive: {field}"),
                ));
            }
            parsed.push(p.ln() as f32);
        }
        Ok(PhraseEntry {
            source: split_words(source),
            target: split_words(target),
            scores: parsed,
        })
    }

    /// 翻訳モデルの成分数
    pub fn num_scores(&self) -> usize {
        self.num_scores
    }

    /// 最長の原言語フレーズの単語数
    pub fn max_source_len(&self) -> usize {
        self.max_source_len
    }

    /// エントリ数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// エントリが一つもないかどうか
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 全エントリ
    pub fn entries(&self) -> &[PhraseEntry] {
        &self.entries
    }

    /// 原言語フレーズに一致するエントリを列挙します。
    pub fn lookup<'a>(&'a self, source: &[String]) -> impl Iterator<Item = &'a PhraseEntry> + use<'a> {
        self.index
            .get(source)
            .into_iter()
            .flatten()
            .map(|&i| &self.entries[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_phrase_table() {
        let text = "# comment\n\
                    das ||| the ||| 0.5 1\n\
                    das ||| that ||| 0.25 1 ||| 0-0\n\
                    haus ||| house ||| 1 1\n";
        let table = PhraseTable::from_reader(text.as_bytes()).unwrap();
        assert_eq!(3, table.len());
        assert_eq!(2, table.num_scores());
        assert_eq!(1, table.max_source_len());

        let das: Vec<_> = table.lookup(&["das".to_string()]).collect();
        assert_eq!(2, das.len());
        assert_eq!(vec!["the".to_string()], das[0].target);
        assert!((das[0].scores[0] - 0.5f32.ln()).abs() < 1e-6);
        assert_eq!(0.0, das[0].scores[1]);

        assert_eq!(0, table.lookup(&["auto".to_string()]).count());
    }

    #[test]
    fn test_parse_phrase_table_invalid() {
        assert!(PhraseTable::from_reader("das ||| the\n".as_bytes()).is_err());
        assert!(PhraseTable::from_reader("das ||| the ||| 0\n".as_bytes()).is_err());
        assert!(PhraseTable::from_reader("das ||| the ||| x\n".as_bytes()).is_err());
        assert!(PhraseTable::from_reader(" ||| the ||| 0.5\n".as_bytes()).is_err());
        assert!(
            PhraseTable::from_reader("a ||| b ||| 0.5\nc ||| d ||| 0.5 0.5\n".as_bytes()).is_err()
        );
    }
}
