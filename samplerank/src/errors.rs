//! エラー型の定義
//!
//! 設定の誤り、モデルファイルの破損、サンプルに対する不正な編集が呼び出し元に報告されます。
//! 数値的な退化(ノルム0の制約など)はエラーにならず、その場で回復されます。

use std::num::{ParseFloatError, ParseIntError, TryFromIntError};

/// エラー型を[`SampleRankError`]に固定したResult型
pub type Result<T, E = SampleRankError> = std::result::Result<T, E>;

/// SampleRankのエラー型
#[derive(Debug, thiserror::Error)]
pub enum SampleRankError {
    /// 引数や設定値が範囲外
    #[error(transparent)]
    InvalidArgument(InvalidArgumentError),

    /// フレーズテーブル、ARPAファイル、重みファイルなどの書式の誤り
    #[error(transparent)]
    InvalidFormat(InvalidFormatError),

    /// 現在のサンプルに適用できない編集
    #[error(transparent)]
    InvalidState(InvalidStateError),

    /// 語彙数が識別子の範囲を超えた
    #[error(transparent)]
    TryFromInt(#[from] TryFromIntError),

    /// 数値として読めない値
    #[error(transparent)]
    ParseFloat(#[from] ParseFloatError),

    /// 整数として読めない値
    #[error(transparent)]
    ParseInt(#[from] ParseIntError),

    /// I/Oエラー
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// モデルのアーカイブの検証やシリアライズの失敗
    #[error(transparent)]
    RkyvError(#[from] rkyv::rancor::Error),
}

impl SampleRankError {
    /// 無効な引数エラーを生成します
    ///
    /// # 引数
    ///
    /// * `arg` - 引数の名前
    /// * `msg` - エラーメッセージ
    pub(crate) fn invalid_argument<S>(arg: &'static str, msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::InvalidArgument(InvalidArgumentError {
            arg,
            msg: msg.into(),
        })
    }

    /// 無効なフォーマットエラーを生成します
    pub(crate) fn invalid_format<S>(arg: &'static str, msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::InvalidFormat(InvalidFormatError {
            arg,
            msg: msg.into(),
        })
    }

    /// 無効な状態エラーを生成します
    ///
    /// # 引数
    ///
    /// * `context` - 失敗した操作や対象
    /// * `cause` - 失敗の理由
    pub(crate) fn invalid_state<S, M>(context: S, cause: M) -> Self
    where
        S: Into<String>,
        M: Into<String>,
    {
        Self::InvalidState(InvalidStateError {
            context: context.into(),
            cause: cause.into(),
        })
    }
}

/// 引数が無効な場合に使用されるエラー
#[derive(Debug, thiserror::Error)]
#[error("invalid argument `{arg}`: {msg}")]
pub struct InvalidArgumentError {
    pub(crate) arg: &'static str,
    pub(crate) msg: String,
}

/// 入力の書式が無効な場合に使用されるエラー
#[derive(Debug, thiserror::Error)]
#[error("invalid {arg} format: {msg}")]
pub struct InvalidFormatError {
    pub(crate) arg: &'static str,
    pub(crate) msg: String,
}

/// サンプルの編集の前提条件が満たされない場合に使用されるエラー
///
/// このエラーが返された時点で、対象のサンプルは変更されていません。
#[derive(Debug, thiserror::Error)]
#[error("{context}: {cause}")]
pub struct InvalidStateError {
    pub(crate) context: String,
    pub(crate) cause: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// エラーメッセージの書式のテスト
    #[test]
    fn test_display() {
        let e = SampleRankError::invalid_argument("lag", "the collection lag must be positive");
        assert_eq!(
            "invalid argument `lag`: the collection lag must be positive",
            e.to_string()
        );
        let e = SampleRankError::invalid_format("ARPA", "missing \\data\\");
        assert_eq!("invalid ARPA format: missing \\data\\", e.to_string());
        let e = SampleRankError::invalid_state("merge", "not adjacent");
        assert_eq!("merge: not adjacent", e.to_string());

        let e = SampleRankError::from("x".parse::<f64>().unwrap_err());
        assert!(matches!(e, SampleRankError::ParseFloat(_)));
    }
}
