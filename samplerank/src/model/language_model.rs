//! n-gram言語モデル
//!
//! ARPA形式のバックオフ付きn-gramモデルを読み込み、
//! 文脈と単語から自然対数の確率を返します。

use std::f64::consts::LN_10;
use std::io::{BufRead, BufReader, Read};

use hashbrown::HashMap;
use rkyv::{Archive, Deserialize, Serialize};

use crate::errors::{Result, SampleRankError};

/// 文頭記号
pub const BOS: &str = "<s>";
/// 文末記号
pub const EOS: &str = "</s>";
/// 未知語記号
pub const UNK: &str = "<unk>";

/// 未知語に`<unk>`がない場合に使う常用対数確率
const UNKNOWN_LOG10_PROB: f32 = -100.0;

/// 言語モデルのスコアラー
///
/// 文脈は直前の単語列で、最も新しい単語が末尾に来ます。
/// 実装は`order() - 1`語より長い文脈を受け取った場合、末尾の部分だけを使わなければなりません。
pub trait LanguageModel {
    /// n-gramの次数
    fn order(&self) -> usize;

    /// `ln P(word | context)`を返します。
    fn log_prob(&self, context: &[&str], word: &str) -> f64;
}

/// ARPAファイルの一行に対応するn-gramエントリ
#[derive(Archive, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NgramEntry {
    /// n-gramの単語列
    pub words: Vec<String>,
    /// 常用対数確率
    pub log_prob: f32,
    /// 常用対数のバックオフ重み
    pub backoff: f32,
}

/// バックオフ付きn-gram言語モデル
#[derive(Clone, Debug)]
pub struct NgramLanguageModel {
    order: usize,
    entries: Vec<NgramEntry>,
    vocab: HashMap<String, u32>,
    index: HashMap<Vec<u32>, usize>,
    unk_id: Option<u32>,
}

impl NgramLanguageModel {
    /// エントリ列から言語モデルを構築します。
    ///
    /// # エラー
    ///
    /// 次数が0の場合、エントリの長さが次数を超える場合、空のエントリがある場合に
    /// エラーを返します。
    pub fn from_entries(order: usize, entries: Vec<NgramEntry>) -> Result<Self> {
        if order == 0 {
            return Err(SampleRankError::invalid_argument(
                "order",
                "the n-gram order must be positive",
            ));
        }
        let mut vocab = HashMap::new();
        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if entry.words.is_empty() || entry.words.len() > order {
                return Err(SampleRankError::invalid_format(
                    "arpa",
                    format!("n-gram {} has length {}", i, entry.words.len()),
                ));
            }
            let mut key = Vec::with_capacity(entry.words.len());
            for w in &entry.words {
                let next_id = u32::try_from(vocab.len())?;
                key.push(*vocab.entry(w.clone()).or_insert(next_id));
            }
            index.insert(key, i);
        }
        let unk_id = vocab.get(UNK).copied();
        Ok(Self {
            order,
            entries,
            vocab,
            index,
            unk_id,
        })
    }

    /// ARPA形式の言語モデルを読み込みます。
    ///
    /// # 引数
    ///
    /// * `rdr` - ARPAファイルのリーダー
    ///
    /// # エラー
    ///
    /// `\data\`節がない場合、n-gramの行が不正な場合、
    /// 宣言された次数を超えるn-gramがある場合にエラーを返します。
    pub fn from_arpa<R>(rdr: R) -> Result<Self>
    where
        R: Read,
    {
        let (order, entries) = Self::parse_arpa(rdr)?;
        Self::from_entries(order, entries)
    }

    pub(crate) fn parse_arpa<R>(rdr: R) -> Result<(usize, Vec<NgramEntry>)>
    where
        R: Read,
    {
        let mut declared: Vec<usize> = vec![];
        let mut entries = vec![];
        let mut in_data = false;
        let mut current: Option<usize> = None;
        let mut seen_end = false;

        for line in BufReader::new(rdr).lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line == "\\data\\" {
                in_data = true;
                continue;
            }
            if line == "\\end\\" {
                seen_end = true;
                break;
            }
            if let Some(rest) = line.strip_prefix('\\') {
                let n = rest
                    .strip_suffix("-grams:")
                    .and_then(|n| n.parse::<usize>().ok())
                    .ok_or_else(|| {
                        SampleRankError::invalid_format("arpa", format!("unknown section {line}"))
                    })?;
                if n == 0 || n > declared.len() {
                    return Err(SampleRankError::invalid_format(
                        "arpa",
                        format!("section {n} is not declared in \\data\\"),
                    ));
                }
                current = Some(n);
                in_data = false;
                continue;
            }
            if in_data {
                let Some(decl) = line.strip_prefix("ngram ") else {
                    return Err(SampleRankError::invalid_format(
                        "arpa",
                        format!("invalid data line {line}"),
                    ));
                };
                let mut spl = decl.split('=');
                let (Some(n), Some(count), None) = (spl.next(), spl.next(), spl.next()) else {
                    return Err(SampleRankError::invalid_format(
                        "arpa",
                        format!("invalid data line {line}"),
                    ));
                };
                let n: usize = n.trim().parse()?;
                let count: usize = count.trim().parse()?;
                if n != declared.len() + 1 {
                    return Err(SampleRankError::invalid_format(
                        "arpa",
                        "n-gram counts must be declared in order",
                    ));
                }
                declared.push(count);
                continue;
            }
            let Some(n) = current else {
                // Text before `\data\` is a free-form header.
                continue;
            };
            let fields: Vec<&str> = line.split_ascii_whitespace().collect();
            let backoff = match fields.len() {
                l if l == n + 1 => 0.0,
                l if l == n + 2 => fields[n + 1].parse::<f32>()?,
                _ => {
                    return Err(SampleRankError::invalid_format(
                        "arpa",
                        format!("invalid {n}-gram line {line}"),
                    ));
                }
            };
            entries.push(NgramEntry {
                words: fields[1..=n].iter().map(|w| w.to_string()).collect(),
                log_prob: fields[0].parse()?,
                backoff,
            });
        }

        if declared.is_empty() {
            return Err(SampleRankError::invalid_format(
                "arpa",
                "missing \\data\\ section",
            ));
        }
        if !seen_end {
            log::warn!("ARPA file has no \\end\\ marker");
        }
        let total: usize = declared.iter().sum();
        if total != entries.len() {
            log::warn!(
                "ARPA header declares {} n-grams but {} were read",
                total,
                entries.len()
            );
        }
        Ok((declared.len(), entries))
    }

    /// 全エントリ
    pub fn entries(&self) -> &[NgramEntry] {
        &self.entries
    }

    /// 語彙サイズ
    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    fn word_id(&self, word: &str) -> Option<u32> {
        self.vocab.get(word).copied().or(self.unk_id)
    }

    /// 常用対数でのバックオフ確率
    fn log10_prob(&self, context: &[Option<u32>], word: Option<u32>) -> f32 {
        let Some(word) = word else {
            return UNKNOWN_LOG10_PROB;
        };
        let mut key: Vec<u32> = Vec::with_capacity(context.len() + 1);
        // Longest matching suffix first.
        for start in 0..=context.len() {
            let suffix = &context[start..];
            if suffix.iter().any(Option::is_none) {
                continue;
            }
            key.clear();
            key.extend(suffix.iter().flatten());
            key.push(word);
            if let Some(&i) = self.index.get(&key) {
                let mut result = self.entries[i].log_prob;
                for s in 0..start {
                    result += self.backoff(&context[s..]);
                }
                return result;
            }
        }
        UNKNOWN_LOG10_PROB
    }

    fn backoff(&self, context: &[Option<u32>]) -> f32 {
        if context.iter().any(Option::is_none) {
            return 0.0;
        }
        let key: Vec<u32> = context.iter().flatten().copied().collect();
        self.index
            .get(&key)
            .map_or(0.0, |&i| self.entries[i].backoff)
    }
}

impl LanguageModel for NgramLanguageModel {
    fn order(&self) -> usize {
        self.order
    }

    fn log_prob(&self, context: &[&str], word: &str) -> f64 {
        let context = &context[context.len().saturating_sub(self.order - 1)..];
        let ids: Vec<Option<u32>> = context.iter().map(|w| self.word_id(w)).collect();
        f64::from(self.log10_prob(&ids, self.word_id(word))) * LN_10
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARPA: &str = "\
header text

\\data\\
ngram 1=4
ngram 2=2

\\1-grams:
-1.0 <s> -0.5
-0.5 a -0.25
-0.7 b
-2.0 <unk>

\\2-grams:
-0.1 <s> a
-0.2 a b

\\end\\
";

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_parse_arpa() {
        let lm = NgramLanguageModel::from_arpa(ARPA.as_bytes()).unwrap();
        assert_eq!(2, lm.order());
        assert_eq!(6, lm.entries().len());
        assert_eq!(4, lm.vocab_size());
    }

    #[test]
    fn test_log_prob_with_backoff() {
        let lm = NgramLanguageModel::from_arpa(ARPA.as_bytes()).unwrap();
        assert!(approx(-0.1 * LN_10, lm.log_prob(&[BOS], "a")));
        assert!(approx(-0.2 * LN_10, lm.log_prob(&["a"], "b")));
        // b follows b: backoff(b)=0 + p(b)
        assert!(approx(-0.7 * LN_10, lm.log_prob(&["b"], "b")));
        // a follows a: backoff(a) + p(a)
        assert!(approx(-0.75 * LN_10, lm.log_prob(&["a"], "a")));
        // long contexts are truncated
        assert!(approx(-0.2 * LN_10, lm.log_prob(&["b", "b", "a"], "b")));
    }

    #[test]
    fn test_unknown_words() {
        let lm = NgramLanguageModel::from_arpa(ARPA.as_bytes()).unwrap();
        assert!(approx(-2.0 * LN_10, lm.log_prob(&["b"], "zzz")));

        let no_unk = "\\data\\\nngram 1=1\n\\1-grams:\n-0.5 a\n\\end\\\n";
        let lm = NgramLanguageModel::from_arpa(no_unk.as_bytes()).unwrap();
        assert!(approx(-100.0 * LN_10, lm.log_prob(&[], "zzz")));
    }

    #[test]
    fn test_parse_arpa_invalid() {
        assert!(NgramLanguageModel::from_arpa("\\1-grams:\n-1 a\n".as_bytes()).is_err());
        let bad = "\\data\\\nngram 1=1\n\\1-grams:\n-1 a b c\n\\end\\\n";
        assert!(NgramLanguageModel::from_arpa(bad.as_bytes()).is_err());
        let undeclared = "\\data\\\nngram 1=1\n\\2-grams:\n-1 a b\n\\end\\\n";
        assert!(NgramLanguageModel::from_arpa(undeclared.as_bytes()).is_err());
    }
}
