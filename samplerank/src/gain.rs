//! 利得関数
//!
//! 候補の出力文の良さを参照訳との比較で測ります。

use std::ops::AddAssign;

use hashbrown::HashMap;

use crate::errors::{Result, SampleRankError};

/// BLEUのn-gramの最大次数
pub const BLEU_ORDER: usize = 4;

/// 出力文の利得を測る関数
pub trait GainFunction {
    /// 出力文`hypothesis`の利得
    fn gain(&self, hypothesis: &[&str]) -> f64;
}

/// BLEUの十分統計量
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BleuStats {
    /// 次数ごとの一致数
    pub matches: [usize; BLEU_ORDER],
    /// 次数ごとの出力文のn-gram数
    pub totals: [usize; BLEU_ORDER],
    /// 出力文の長さ
    pub hyp_len: usize,
    /// 参照訳の長さ
    pub ref_len: usize,
}

impl AddAssign<&BleuStats> for BleuStats {
    fn add_assign(&mut self, rhs: &BleuStats) {
        for n in 0..BLEU_ORDER {
            self.matches[n] += rhs.matches[n];
            self.totals[n] += rhs.totals[n];
        }
        self.hyp_len += rhs.hyp_len;
        self.ref_len += rhs.ref_len;
    }
}

impl BleuStats {
    /// 次数ごとの精度
    pub fn precisions(&self) -> [f64; BLEU_ORDER] {
        let mut result = [0.0; BLEU_ORDER];
        for (n, p) in result.iter_mut().enumerate() {
            if self.totals[n] != 0 {
                *p = self.matches[n] as f64 / self.totals[n] as f64;
            }
        }
        result
    }

    /// 短さに対するペナルティ
    pub fn brevity_penalty(&self) -> f64 {
        if self.hyp_len == 0 {
            0.0
        } else if self.hyp_len < self.ref_len {
            (1.0 - self.ref_len as f64 / self.hyp_len as f64).exp()
        } else {
            1.0
        }
    }

    /// 平滑化なしのBLEU。いずれかの次数の一致数が0の場合は0です。
    pub fn bleu(&self) -> f64 {
        if self.matches.contains(&0) {
            return 0.0;
        }
        let log_precision: f64 = self
            .precisions()
            .iter()
            .map(|p| p.ln())
            .sum::<f64>()
            / BLEU_ORDER as f64;
        self.brevity_penalty() * log_precision.exp()
    }

    /// 2次以上の一致数と総数に1を加えて平滑化したBLEU
    pub fn smoothed_bleu(&self) -> f64 {
        if self.matches[0] == 0 {
            return 0.0;
        }
        let mut log_precision = (self.matches[0] as f64 / self.totals[0] as f64).ln();
        for n in 1..BLEU_ORDER {
            log_precision +=
                ((self.matches[n] + 1) as f64 / (self.totals[n] + 1) as f64).ln();
        }
        self.brevity_penalty() * (log_precision / BLEU_ORDER as f64).exp()
    }
}

/// 一つの入力文に対する参照訳の集合
#[derive(Clone, Debug)]
pub struct References {
    max_counts: HashMap<String, usize>,
    lengths: Vec<usize>,
}

fn count_ngrams<S>(words: &[S]) -> HashMap<String, usize>
where
    S: AsRef<str>,
{
    let mut counts = HashMap::new();
    for n in 1..=BLEU_ORDER {
        for window in words.windows(n) {
            let key = window
                .iter()
                .map(AsRef::as_ref)
                .collect::<Vec<&str>>()
                .join(" ");
            *counts.entry(key).or_insert(0) += 1;
        }
    }
    counts
}

impl References {
    /// 参照訳の集合を作成します。
    ///
    /// # エラー
    ///
    /// 参照訳が一つもない場合にエラーを返します。
    pub fn new(references: &[Vec<String>]) -> Result<Self> {
        if references.is_empty() {
            return Err(SampleRankError::invalid_argument(
                "references",
                "at least one reference is required",
            ));
        }
        let mut max_counts: HashMap<String, usize> = HashMap::new();
        for reference in references {
            for (ngram, count) in count_ngrams(reference) {
                let entry = max_counts.entry(ngram).or_insert(0);
                *entry = (*entry).max(count);
            }
        }
        Ok(Self {
            max_counts,
            lengths: references.iter().map(Vec::len).collect(),
        })
    }

    /// 出力文の長さに最も近い参照訳の長さ。同じ距離の場合は短い方です。
    pub fn closest_length(&self, hyp_len: usize) -> usize {
        self.lengths
            .iter()
            .copied()
            .min_by_key(|&len| (len.abs_diff(hyp_len), len))
            .unwrap_or(0)
    }

    /// 出力文の十分統計量を計算します。
    pub fn stats<S>(&self, hypothesis: &[S]) -> BleuStats
    where
        S: AsRef<str>,
    {
        let mut stats = BleuStats {
            hyp_len: hypothesis.len(),
            ref_len: self.closest_length(hypothesis.len()),
            ..Default::default()
        };
        for (ngram, count) in count_ngrams(hypothesis) {
            let n = ngram.split(' ').count() - 1;
            stats.totals[n] += count;
            if let Some(&max) = self.max_counts.get(&ngram) {
                stats.matches[n] += count.min(max);
            }
        }
        stats
    }
}

/// 平滑化した文単位のBLEU
#[derive(Clone, Debug)]
pub struct SentenceBleu {
    references: References,
}

impl SentenceBleu {
    /// 参照訳から作成します。
    ///
    /// # エラー
    ///
    /// 参照訳が一つもない場合にエラーを返します。
    ///
    /// # 例
    ///
    /// ```
    /// use samplerank::gain::{GainFunction, SentenceBleu};
    /// use samplerank::utils::split_words;
    ///
    /// let bleu = SentenceBleu::new(&[split_words("the house is small")]).unwrap();
    /// assert!((bleu.gain(&["the", "house", "is", "small"]) - 1.0).abs() < 1e-12);
    /// assert!(bleu.gain(&["a", "cat"]) == 0.0);
    /// ```
    pub fn new(references: &[Vec<String>]) -> Result<Self> {
        Ok(Self {
            references: References::new(references)?,
        })
    }

    /// 参照訳の集合
    pub fn references(&self) -> &References {
        &self.references
    }
}

impl GainFunction for SentenceBleu {
    fn gain(&self, hypothesis: &[&str]) -> f64 {
        self.references.stats(hypothesis).smoothed_bleu()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::utils::split_words;

    #[test]
    fn test_stats_clipping() {
        let refs = References::new(&[split_words("the cat"), split_words("the the dog")]).unwrap();
        let stats = refs.stats(&["the", "the", "the"]);
        assert_eq!([2, 1, 0, 0], stats.matches);
        assert_eq!([3, 2, 1, 0], stats.totals);
        assert_eq!(3, stats.hyp_len);
        assert_eq!(3, stats.ref_len);
    }

    #[test]
    fn test_closest_length_tie() {
        let refs = References::new(&[split_words("a b c d"), split_words("a b")]).unwrap();
        assert_eq!(2, refs.closest_length(3));
        assert_eq!(4, refs.closest_length(5));
    }

    #[test]
    fn test_brevity_penalty() {
        let bleu = SentenceBleu::new(&[split_words("a b c d e f")]).unwrap();
        let full = bleu.gain(&["a", "b", "c", "d", "e", "f"]);
        let short = bleu.gain(&["a", "b", "c"]);
        assert!((full - 1.0).abs() < 1e-12);
        assert!(short < full);
        let stats = bleu.references().stats(&["a", "b", "c"]);
        assert!((stats.brevity_penalty() - (-1f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_corpus_bleu() {
        let refs = References::new(&[split_words("a b c d e")]).unwrap();
        let mut total = BleuStats::default();
        total += &refs.stats(&["a", "b", "c", "d", "e"]);
        assert!((total.bleu() - 1.0).abs() < 1e-12);
        total += &refs.stats(&["x", "y"]);
        assert!(total.bleu() < 1.0);
        assert_eq!(0.0, refs.stats(&["a", "x", "b"]).bleu());
        assert!(References::new(&[]).is_err());
    }
}
