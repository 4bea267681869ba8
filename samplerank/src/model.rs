//! 翻訳モデル
//!
//! フレーズテーブルとn-gram言語モデルをまとめたモデルです。
//! テキスト形式から[`ModelBuilder`]で構築し、rkyvのバイナリ形式で保存・読み込みします。
//!
//! # バイナリ形式
//!
//! 先頭に[`MODEL_MAGIC`]、続いて16バイト境界までのパディング、その後にrkyvのアーカイブが続きます。
pub(crate) mod builder;
pub(crate) mod language_model;
pub(crate) mod phrase_table;

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use memmap2::Mmap;
use rkyv::rancor::Error;
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};

use crate::errors::{Result, SampleRankError};
use crate::feature_vector::FeatureLayout;

pub use crate::model::builder::ModelBuilder;
pub use crate::model::language_model::{
    BOS, EOS, LanguageModel, NgramEntry, NgramLanguageModel, UNK,
};
pub use crate::model::phrase_table::{PhraseEntry, PhraseTable};

/// モデルファイルを識別するマジックバイト。
///
/// "0.1"はモデルフォーマットのバージョンで、クレートのバージョンとは独立しています。
pub const MODEL_MAGIC: &[u8] = b"SampleRankModel 0.1\n";

const MODEL_MAGIC_LEN: usize = MODEL_MAGIC.len();
const RKYV_ALIGNMENT: usize = 16;
const PADDING_LEN: usize = (RKYV_ALIGNMENT - (MODEL_MAGIC_LEN % RKYV_ALIGNMENT)) % RKYV_ALIGNMENT;
const DATA_START: usize = MODEL_MAGIC_LEN + PADDING_LEN;

/// シリアライズされるモデルの中身
#[derive(Archive, Serialize, Deserialize, Debug)]
pub(crate) struct ModelData {
    pub(crate) phrases: Vec<PhraseEntry>,
    pub(crate) order: u32,
    pub(crate) ngrams: Vec<NgramEntry>,
}

/// フレーズテーブルと言語モデルからなる翻訳モデル
#[derive(Clone, Debug)]
pub struct Model {
    phrase_table: PhraseTable,
    language_model: NgramLanguageModel,
}

impl Model {
    /// 構築済みのコンポーネントからモデルを作成します。
    pub fn new(phrase_table: PhraseTable, language_model: NgramLanguageModel) -> Self {
        Self {
            phrase_table,
            language_model,
        }
    }

    fn from_data(data: ModelData) -> Result<Self> {
        let order = usize::try_from(data.order)?;
        Ok(Self {
            phrase_table: PhraseTable::from_entries(data.phrases)?,
            language_model: NgramLanguageModel::from_entries(order, data.ngrams)?,
        })
    }

    /// フレーズテーブル
    pub fn phrase_table(&self) -> &PhraseTable {
        &self.phrase_table
    }

    /// 言語モデル
    pub fn language_model(&self) -> &NgramLanguageModel {
        &self.language_model
    }

    /// このモデルに対応する素性レイアウト
    pub fn layout(&self) -> FeatureLayout {
        FeatureLayout::new(self.phrase_table.num_scores())
    }

    /// モデルをバイナリ形式で書き出します。
    ///
    /// # 引数
    ///
    /// * `wtr` - 書き込み先
    ///
    /// # エラー
    ///
    /// 書き込みまたはrkyvのシリアライズに失敗した場合にエラーを返します。
    pub fn write<W>(&self, mut wtr: W) -> Result<()>
    where
        W: Write,
    {
        let data = ModelData {
            phrases: self.phrase_table.entries().to_vec(),
            order: u32::try_from(self.language_model.order())?,
            ngrams: self.language_model.entries().to_vec(),
        };

        wtr.write_all(MODEL_MAGIC)?;
        let padding_bytes = vec![0xFF; PADDING_LEN];
        wtr.write_all(&padding_bytes)?;

        let bytes = rkyv::to_bytes::<Error>(&data).map_err(|e| {
            SampleRankError::invalid_state("rkyv serialization failed".to_string(), e.to_string())
        })?;
        wtr.write_all(&bytes)?;

        Ok(())
    }

    /// リーダーからモデルを読み込みます。
    ///
    /// すべての内容をメモリに読み込んでから検証します。
    ///
    /// # エラー
    ///
    /// マジックバイトが一致しない場合や、アーカイブの検証に失敗した場合にエラーを返します。
    pub fn read<R: Read>(mut rdr: R) -> Result<Self> {
        let mut magic = [0; MODEL_MAGIC_LEN];
        rdr.read_exact(&mut magic)?;
        if magic != MODEL_MAGIC {
            return Err(SampleRankError::invalid_argument(
                "rdr",
                "The magic number of the input model mismatches.",
            ));
        }

        let mut padding_buf = vec![0; PADDING_LEN];
        rdr.read_exact(&mut padding_buf)?;

        let mut buffer = Vec::new();
        rdr.read_to_end(&mut buffer)?;

        let mut aligned_bytes = AlignedVec::<RKYV_ALIGNMENT>::with_capacity(buffer.len());
        aligned_bytes.extend_from_slice(&buffer);

        Self::from_archive(&aligned_bytes)
    }

    /// メモリマップを使ってファイルパスからモデルを読み込みます。
    ///
    /// # エラー
    ///
    /// ファイルを開けない場合や、内容が不正な場合にエラーを返します。
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path.as_ref()).map_err(|e| {
            SampleRankError::invalid_argument("path", format!("Failed to open model file: {e}"))
        })?;
        let mut magic = [0u8; MODEL_MAGIC_LEN];
        file.read_exact(&mut magic)?;
        if magic != MODEL_MAGIC {
            return Err(SampleRankError::invalid_argument(
                "path",
                "The magic number of the input model mismatches.",
            ));
        }

        // SAFETY: the mapping is only read while `mmap` is alive and the model is
        // deserialized into owned data before returning.
        let mmap = unsafe { Mmap::map(&file)? };
        let Some(data_bytes) = mmap.get(DATA_START..) else {
            return Err(SampleRankError::invalid_argument(
                "path",
                "Model file too small or corrupted.",
            ));
        };
        Self::from_archive(data_bytes)
    }

    /// Zstandardで圧縮されたモデルファイルを読み込みます。
    ///
    /// # エラー
    ///
    /// 展開に失敗した場合や、内容が不正な場合にエラーを返します。
    pub fn from_zstd<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            SampleRankError::invalid_argument("path", format!("Failed to open model file: {e}"))
        })?;
        let decoder = zstd::Decoder::new(file)?;
        Self::read(decoder)
    }

    fn from_archive(bytes: &[u8]) -> Result<Self> {
        let data = rkyv::from_bytes::<ModelData, Error>(bytes).map_err(|e| {
            SampleRankError::invalid_state(
                "rkyv validation failed. The model file may be corrupted or incompatible."
                    .to_string(),
                e.to_string(),
            )
        })?;
        Self::from_data(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHRASES: &str = "das ||| the ||| 0.5\nhaus ||| house ||| 0.8\n";
    const ARPA: &str = "\\data\\\nngram 1=3\n\\1-grams:\n-1 the\n-1 house\n-1 </s>\n\\end\\\n";

    #[test]
    fn test_write_read() {
        let model = ModelBuilder::from_readers(PHRASES.as_bytes(), ARPA.as_bytes()).unwrap();
        let mut buf = vec![];
        model.write(&mut buf).unwrap();
        assert!(buf.starts_with(MODEL_MAGIC));

        let other = Model::read(buf.as_slice()).unwrap();
        assert_eq!(model.phrase_table().entries(), other.phrase_table().entries());
        assert_eq!(
            model.language_model().entries(),
            other.language_model().entries()
        );
        assert_eq!(1, other.language_model().order());
        assert_eq!(FeatureLayout::new(1), other.layout());
    }

    #[test]
    fn test_from_path_and_zstd() {
        let model = ModelBuilder::from_readers(PHRASES.as_bytes(), ARPA.as_bytes()).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let raw_path = dir.path().join("model.bin");
        model.write(File::create(&raw_path).unwrap()).unwrap();
        let other = Model::from_path(&raw_path).unwrap();
        assert_eq!(2, other.phrase_table().len());

        let zst_path = dir.path().join("model.zst");
        let mut encoder = zstd::Encoder::new(File::create(&zst_path).unwrap(), 3).unwrap();
        model.write(&mut encoder).unwrap();
        encoder.finish().unwrap();
        let other = Model::from_zstd(&zst_path).unwrap();
        assert_eq!(3, other.language_model().entries().len());
    }

    #[test]
    fn test_read_bad_magic() {
        let bytes = b"NotAModel 0.1\n........................";
        assert!(Model::read(&bytes[..]).is_err());
    }
}
