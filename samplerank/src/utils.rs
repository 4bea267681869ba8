//! 数値計算と文字列処理の小さなヘルパー関数を提供するモジュール
//!
//! - 対数空間での加算
//! - 空白区切りの単語列の分割

/// 対数空間で`ln(exp(a) + exp(b))`を計算します。
///
/// 片方が負の無限大の場合は、もう片方をそのまま返します。
#[inline]
pub fn log_add(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

/// 対数空間で値の総和`ln(Σ exp(x_i))`を計算します。
///
/// 空の入力に対しては負の無限大を返します。
///
/// # 例
///
/// ```
/// use samplerank::utils::log_sum_exp;
///
/// let s = log_sum_exp(&[0.0, 0.0]);
/// assert!((s - 2f64.ln()).abs() < 1e-12);
/// ```
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// 空白で区切られた単語列を分割します。
pub fn split_words(text: &str) -> Vec<String> {
    text.split_ascii_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_add() {
        let v = log_add(1f64.ln(), 3f64.ln());
        assert!((v - 4f64.ln()).abs() < 1e-12);
        assert_eq!(2.0, log_add(f64::NEG_INFINITY, 2.0));
        assert_eq!(2.0, log_add(2.0, f64::NEG_INFINITY));
    }

    #[test]
    fn test_log_sum_exp() {
        let v = log_sum_exp(&[1000.0, 1000.0]);
        assert!((v - (1000.0 + 2f64.ln())).abs() < 1e-9);
        assert_eq!(f64::NEG_INFINITY, log_sum_exp(&[]));
    }

    #[test]
    fn test_split_words() {
        assert_eq!(vec!["a", "b"], split_words("  a b\t"));
    }
}
