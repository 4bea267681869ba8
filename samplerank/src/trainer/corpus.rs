//! 対訳コーパス
//!
//! 入力文のファイルと一つ以上の参照訳のファイルを行ごとに対応付けます。

use std::io::{BufRead, BufReader, Read};
use std::ops::Deref;

use crate::errors::{Result, SampleRankError};
use crate::utils::split_words;

/// 入力文と参照訳の組
#[derive(Clone, Debug)]
pub struct Example {
    pub(crate) source: Vec<String>,
    pub(crate) references: Vec<Vec<String>>,
}

impl Example {
    /// 入力文と参照訳から作成します。
    pub fn new(source: Vec<String>, references: Vec<Vec<String>>) -> Self {
        Self { source, references }
    }

    /// 入力文の単語列
    pub fn source(&self) -> &[String] {
        &self.source
    }

    /// 参照訳の単語列
    pub fn references(&self) -> &[Vec<String>] {
        &self.references
    }
}

/// 対訳コーパス
#[derive(Clone, Debug, Default)]
pub struct Corpus {
    pub(crate) examples: Vec<Example>,
}

fn read_lines<R>(rdr: R) -> Result<Vec<Vec<String>>>
where
    R: Read,
{
    BufReader::new(rdr)
        .lines()
        .map(|line| Ok(split_words(&line?)))
        .collect()
}

impl Corpus {
    /// 一行一文のファイルからコーパスを読み込みます。
    ///
    /// # 引数
    ///
    /// * `source_rdr` - 入力文のリーダー
    /// * `reference_rdrs` - 参照訳のリーダー。各ファイルが入力文と同じ行数を持つ必要があります。
    ///
    /// # エラー
    ///
    /// 参照訳がない場合、行数が一致しない場合、空の入力文がある場合にエラーを返します。
    pub fn from_readers<S, I, R>(source_rdr: S, reference_rdrs: I) -> Result<Self>
    where
        S: Read,
        I: IntoIterator<Item = R>,
        R: Read,
    {
        let sources = read_lines(source_rdr)?;
        let references = reference_rdrs
            .into_iter()
            .map(read_lines)
            .collect::<Result<Vec<_>>>()?;
        if references.is_empty() {
            return Err(SampleRankError::invalid_argument(
                "reference_rdrs",
                "at least one reference file is required",
            ));
        }
        for (i, refs) in references.iter().enumerate() {
            if refs.len() != sources.len() {
                return Err(SampleRankError::invalid_format(
                    "reference_rdrs",
                    format!(
                        "reference file {i} has {} lines but the source has {}",
                        refs.len(),
                        sources.len()
                    ),
                ));
            }
        }
        let mut examples = Vec::with_capacity(sources.len());
        for (i, source) in sources.into_iter().enumerate() {
            if source.is_empty() {
                return Err(SampleRankError::invalid_format(
                    "source_rdr",
                    format!("line {} is empty", i + 1),
                ));
            }
            let refs = references.iter().map(|r| r[i].clone()).collect();
            examples.push(Example::new(source, refs));
        }
        Ok(Self { examples })
    }
}

impl Deref for Corpus {
    type Target = [Example];

    fn deref(&self) -> &Self::Target {
        &self.examples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_corpus() {
        let source = "das haus\nes ist klein\n";
        let ref1 = "the house\nit is small\n";
        let ref2 = "the home\nit is little\n";
        let corpus = Corpus::from_readers(source.as_bytes(), [ref1.as_bytes(), ref2.as_bytes()])
            .unwrap();
        assert_eq!(2, corpus.len());
        assert_eq!(&["es", "ist", "klein"], corpus[1].source());
        assert_eq!(
            vec![split_words("it is small"), split_words("it is little")],
            corpus[1].references()
        );
    }

    #[test]
    fn test_load_corpus_mismatch() {
        let result = Corpus::from_readers("a\nb\n".as_bytes(), ["x\n".as_bytes()]);
        assert!(result.is_err());
        let result = Corpus::from_readers("a\n".as_bytes(), Vec::<&[u8]>::new());
        assert!(result.is_err());
        let result = Corpus::from_readers("a\n\n".as_bytes(), ["x\ny\n".as_bytes()]);
        assert!(result.is_err());
    }
}
