//! サンプリングの実行文脈
//!
//! 乱数生成器と重みベクトルをまとめ、サンプラー、オペレーター、学習器に明示的に渡します。

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::feature_vector::FeatureVector;

/// サンプリングで使う乱数生成器
pub type SamplerRng = Xoshiro256PlusPlus;

/// 乱数生成器と重みベクトル
///
/// 同じシードからは同じサンプル列が得られます。
#[derive(Clone, Debug)]
pub struct SamplerContext {
    /// 乱数生成器
    pub rng: SamplerRng,
    /// 重みベクトル。学習器だけが更新します。
    pub weights: FeatureVector,
}

impl SamplerContext {
    /// シードと初期の重みから文脈を作成します。
    pub fn new(seed: u64, weights: FeatureVector) -> Self {
        Self {
            rng: SamplerRng::seed_from_u64(seed),
            weights,
        }
    }
}
