//! バイナリモデルのビルドモジュール
//!
//! テキスト形式のフレーズテーブルとARPA形式の言語モデルを読み込み、
//! zstdで圧縮したrkyvアーカイブとして書き出します。

use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

use clap::Parser;
use samplerank::errors::SampleRankError;
use samplerank::model::LanguageModel;
use samplerank::{Model, ModelBuilder};

/// ビルドコマンドの引数
#[derive(Parser, Debug)]
#[clap(name = "build", about = "A program to compile a translation model.")]
pub struct Args {
    /// Phrase table (`source ||| target ||| scores`).
    #[clap(short = 'p', long)]
    phrase_table_in: PathBuf,

    /// N-gram language model in the ARPA format.
    #[clap(short = 'l', long)]
    lm_in: PathBuf,

    /// File to which the binary model is output (in zstd).
    #[clap(short = 'o', long)]
    model_out: PathBuf,

    /// Compression level of zstd.
    #[clap(long, default_value = "19")]
    level: i32,
}

/// ビルド処理中に発生する可能性のあるエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// 入出力エラー
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// モデル構築エラー
    #[error("Model building failed: {0}")]
    SampleRank(#[from] SampleRankError),
}

/// ビルドコマンドを実行する
///
/// # エラー
///
/// ファイルの読み書きやモデルの構築に失敗した場合、`BuildError`を返します。
pub fn run(args: Args) -> Result<(), BuildError> {
    eprintln!("Compiling the model...");
    let model = build_model(&args)?;
    eprintln!(
        "{} phrase pairs, {}-gram language model",
        model.phrase_table().len(),
        model.language_model().order()
    );

    eprintln!("Writing the model...");
    let file = File::create(&args.model_out)?;
    let mut encoder = zstd::Encoder::new(file, args.level)?;
    model.write(&mut encoder)?;
    encoder.finish()?;

    eprintln!("Successfully built the model to {}", args.model_out.display());
    Ok(())
}

fn build_model(args: &Args) -> Result<Model, BuildError> {
    let phrase_table = BufReader::new(File::open(&args.phrase_table_in)?);
    let lm = BufReader::new(File::open(&args.lm_in)?);
    Ok(ModelBuilder::from_readers(phrase_table, lm)?)
}
