//! SampleRankのテストモジュール群
//!
//! サンプルの編集、サンプリング、学習の一連の動作を検証するテストを含みます。

mod learning;
mod sample_edits;
