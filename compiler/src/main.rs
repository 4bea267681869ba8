//! SampleRankのモデルコンパイラ
//!
//! フレーズテーブルと言語モデルからバイナリモデルを構築するサブコマンドと、
//! 対訳コーパスから重みを学習するサブコマンドを提供します。

mod build;
mod train;

use clap::Parser;
use thiserror::Error;

use crate::{build::BuildError, train::TrainError};

/// コマンドライン引数の構造体
#[derive(Parser, Debug)]
#[clap(name = "compile", version)]
struct Cli {
    /// 実行するサブコマンド
    #[clap(subcommand)]
    command: Command,
}

/// 利用可能なサブコマンド
#[derive(Parser, Debug)]
enum Command {
    /// フレーズテーブルとARPA形式の言語モデルからバイナリモデルを構築します
    Build(build::Args),

    /// SampleRankで重みを学習します
    ///
    /// 対訳コーパスの各文でGibbsサンプリングを行い、順位の逆転から重みを更新します。
    Train(train::Args),
}

/// コンパイラの実行中に発生する可能性のあるエラー
#[derive(Debug, Error)]
pub enum CompileError {
    /// モデル構築中のエラー
    #[error(transparent)]
    BuildError(#[from] BuildError),
    /// 学習中のエラー
    #[error(transparent)]
    TrainError(#[from] TrainError),
}

fn main() -> Result<(), CompileError> {
    // Training progress is reported at the info level.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Build(args) => Ok(build::run(args)?),
        Command::Train(args) => Ok(train::run(args)?),
    }
}
