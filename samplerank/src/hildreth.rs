//! Hildrethのアルゴリズム
//!
//! 線形不等式制約`a_k · Δw >= b_k`の下で`‖Δw‖²`を最小化する二次計画問題を、
//! 双対変数の座標上昇法で解きます。解は`Δw = Σ α_k a_k`で与えられます。
//!
//! 各反復では最もKKT条件に違反している制約を選び、
//! 他の双対変数を固定したまま、その制約の余裕を0にする更新を行います。
//! グラム行列の列は、その制約が初めて選ばれたときに計算されます。

use crate::feature_vector::FeatureVector;

const ZERO: f64 = 1e-12;

/// Hildrethのアルゴリズムのソルバー
#[derive(Clone, Copy, Debug)]
pub struct Hildreth {
    bound: Option<f64>,
    max_iter: usize,
    epsilon: f64,
}

impl Default for Hildreth {
    fn default() -> Self {
        Self {
            bound: None,
            max_iter: 10000,
            epsilon: 1e-8,
        }
    }
}

impl Hildreth {
    /// 上限なしのソルバーを作成します。
    pub fn new() -> Self {
        Self::default()
    }

    /// 双対変数の上限`C`を設定します。`0 <= α_k <= C`になります。
    pub fn bound(mut self, bound: Option<f64>) -> Self {
        self.bound = bound;
        self
    }

    /// 反復回数の上限を設定します。
    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// 収束判定の閾値を設定します。
    pub fn epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// 制約系を解き、双対変数`α`を返します。
    ///
    /// 反復回数の上限に達した場合は、その時点の解を返します。
    ///
    /// # 引数
    ///
    /// * `a` - 制約の方向ベクトル
    /// * `b` - 制約の余裕
    ///
    /// # パニック
    ///
    /// `a`と`b`の長さが異なる場合、パニックします。
    ///
    /// # 例
    ///
    /// ```
    /// use samplerank::feature_vector::FeatureVector;
    /// use samplerank::hildreth::Hildreth;
    ///
    /// let mut a = FeatureVector::zeros(1);
    /// a.set_dense(0, 2.0);
    /// let alpha = Hildreth::new().solve(&[a], &[1.0]);
    /// assert!((alpha[0] - 0.25).abs() < 1e-9);
    /// ```
    pub fn solve(&self, a: &[FeatureVector], b: &[f64]) -> Vec<f64> {
        assert_eq!(a.len(), b.len());
        let m = a.len();
        let mut alpha = vec![0.0; m];
        if m == 0 {
            return alpha;
        }

        let mut gram = vec![vec![0.0; m]; m];
        let mut computed = vec![false; m];
        for (i, ai) in a.iter().enumerate() {
            gram[i][i] = ai.l2_norm_squared();
        }

        let mut f = b.to_vec();
        let mut kkt = f.clone();
        let (mut max_i, mut max_kkt) = Self::most_violated(&kkt);

        let mut iter = 0;
        while max_kkt >= self.epsilon && iter < self.max_iter {
            let diag = gram[max_i][max_i];
            let diff = if diag <= ZERO { 0.0 } else { f[max_i] / diag };
            let tried = alpha[max_i] + diff;
            let add = if tried < 0.0 {
                -alpha[max_i]
            } else if let Some(c) = self.bound
                && tried > c
            {
                c - alpha[max_i]
            } else {
                diff
            };
            alpha[max_i] += add;

            if !computed[max_i] {
                for k in 0..m {
                    if k != max_i {
                        gram[k][max_i] = a[k].inner_product(&a[max_i]);
                    }
                }
                computed[max_i] = true;
            }

            for i in 0..m {
                f[i] -= add * gram[i][max_i];
                kkt[i] = f[i];
                match self.bound {
                    Some(c) if alpha[i] > c - ZERO => kkt[i] = -kkt[i],
                    _ if alpha[i] > ZERO => kkt[i] = f[i].abs(),
                    _ => {}
                }
            }
            (max_i, max_kkt) = Self::most_violated(&kkt);
            iter += 1;
        }
        if iter == self.max_iter {
            log::debug!("hildreth stopped at {iter} iterations, max kkt {max_kkt}");
        }
        alpha
    }

    fn most_violated(kkt: &[f64]) -> (usize, f64) {
        let mut best = (0, f64::NEG_INFINITY);
        for (i, &v) in kkt.iter().enumerate() {
            if v > best.1 {
                best = (i, v);
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(values: &[f64]) -> FeatureVector {
        let mut v = FeatureVector::zeros(values.len());
        for (i, &x) in values.iter().enumerate() {
            v.set_dense(i, x);
        }
        v
    }

    #[test]
    fn test_two_active_constraints() {
        let a = [vector(&[1.0, 0.0]), vector(&[1.0, 1.0])];
        let alpha = Hildreth::new().solve(&a, &[1.0, 1.5]);
        assert!((alpha[0] - 0.5).abs() < 1e-6, "{alpha:?}");
        assert!((alpha[1] - 0.5).abs() < 1e-6, "{alpha:?}");
    }

    #[test]
    fn test_one_inactive_constraint() {
        let a = [vector(&[1.0, 0.0]), vector(&[1.0, 1.0])];
        let alpha = Hildreth::new().solve(&a, &[1.0, 3.0]);
        assert!(alpha[0].abs() < 1e-6, "{alpha:?}");
        assert!((alpha[1] - 1.5).abs() < 1e-6, "{alpha:?}");
    }

    #[test]
    fn test_satisfied_constraints() {
        let a = [vector(&[1.0, 0.0])];
        assert_eq!(vec![0.0], Hildreth::new().solve(&a, &[-1.0]));
        assert!(Hildreth::new().solve(&[], &[]).is_empty());
    }

    #[test]
    fn test_infeasible_bounded() {
        let a = [vector(&[1.0, 0.0]), vector(&[-1.0, 0.0])];
        let alpha = Hildreth::new()
            .bound(Some(1.0))
            .max_iter(100)
            .solve(&a, &[1.0, 1.0]);
        for x in alpha {
            assert!((0.0..=1.0).contains(&x));
        }
    }

    #[test]
    fn test_collinear_bounded() {
        let a = [vector(&[1.0, 1.0]), vector(&[1.0, 1.0 + 1e-9]), vector(&[0.0, 0.0])];
        let alpha = Hildreth::new()
            .bound(Some(0.3))
            .solve(&a, &[5.0, 5.0, 1.0]);
        assert_eq!(3, alpha.len());
        for x in alpha {
            assert!((-1e-12..=0.3 + 1e-12).contains(&x));
        }
    }
}
