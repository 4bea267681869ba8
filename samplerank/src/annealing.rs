//! 焼きなましのスケジュール
//!
//! 反復回数から温度を求める純粋な関数です。

use crate::errors::{Result, SampleRankError};

/// 焼きなましのスケジュール
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AnnealingSchedule {
    /// `max_temp`から`len`回の反復で0.5に向けて線形に下げます。温度は1.0を下回りません。
    Linear {
        /// 温度を下げる反復回数
        len: usize,
        /// 初期温度
        max_temp: f64,
    },
    /// `start * ratio^t`で下げ、`stop`を下回った後は`floor`に固定します。
    Exponential {
        /// 初期温度
        start: f64,
        /// 下限への切り替えの閾値
        stop: f64,
        /// 切り替え後の温度
        floor: f64,
        /// 反復ごとの倍率
        ratio: f64,
    },
}

impl AnnealingSchedule {
    /// 線形のスケジュールを作成します。
    ///
    /// # エラー
    ///
    /// `len`が0の場合や、`max_temp`が正でない場合にエラーを返します。
    pub fn linear(len: usize, max_temp: f64) -> Result<Self> {
        if len == 0 {
            return Err(SampleRankError::invalid_argument(
                "len",
                "the annealing length must be positive",
            ));
        }
        if !(max_temp > 0.0 && max_temp.is_finite()) {
            return Err(SampleRankError::invalid_argument(
                "max_temp",
                "the temperature must be positive",
            ));
        }
        Ok(Self::Linear { len, max_temp })
    }

    /// 指数的なスケジュールを`[start, stop, floor, ratio]`の四つの値から作成します。
    ///
    /// # エラー
    ///
    /// 値の数が4でない場合、温度が正でない場合、`ratio`が`(0, 1]`にない場合にエラーを返します。
    ///
    /// # 例
    ///
    /// ```
    /// use samplerank::annealing::AnnealingSchedule;
    ///
    /// let schedule = AnnealingSchedule::exponential(&[10.0, 1.0, 0.5, 0.5]).unwrap();
    /// assert_eq!(10.0, schedule.temperature(0));
    /// assert_eq!(5.0, schedule.temperature(1));
    /// assert_eq!(0.5, schedule.temperature(4));
    /// assert!(AnnealingSchedule::exponential(&[10.0, 1.0, 0.5]).is_err());
    /// ```
    pub fn exponential(values: &[f64]) -> Result<Self> {
        let &[start, stop, floor, ratio] = values else {
            return Err(SampleRankError::invalid_argument(
                "values",
                format!(
                    "exponential annealing takes 4 values (start, stop, floor, ratio), got {}",
                    values.len()
                ),
            ));
        };
        if [start, stop, floor].iter().any(|t| !(*t > 0.0 && t.is_finite())) {
            return Err(SampleRankError::invalid_argument(
                "values",
                "temperatures must be positive",
            ));
        }
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(SampleRankError::invalid_argument(
                "values",
                "the ratio must be in (0, 1]",
            ));
        }
        Ok(Self::Exponential {
            start,
            stop,
            floor,
            ratio,
        })
    }

    /// 反復`t`の温度
    pub fn temperature(&self, t: usize) -> f64 {
        match *self {
            Self::Linear { len, max_temp } => {
                let progress = t as f64 / len as f64;
                (max_temp - (max_temp - 0.5) * progress).max(1.0)
            }
            Self::Exponential {
                start,
                stop,
                floor,
                ratio,
            } => {
                let temp = start * ratio.powf(t as f64);
                if temp < stop { floor } else { temp }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear() {
        let schedule = AnnealingSchedule::linear(10, 5.5).unwrap();
        assert_eq!(5.5, schedule.temperature(0));
        assert!((schedule.temperature(5) - 3.0).abs() < 1e-12);
        assert_eq!(1.0, schedule.temperature(10));
        assert_eq!(1.0, schedule.temperature(100));
    }

    #[test]
    fn test_exponential_floor() {
        let schedule = AnnealingSchedule::exponential(&[8.0, 1.5, 0.1, 0.5]).unwrap();
        assert_eq!(8.0, schedule.temperature(0));
        assert_eq!(2.0, schedule.temperature(2));
        assert_eq!(0.1, schedule.temperature(3));
        assert_eq!(0.1, schedule.temperature(50));
    }

    #[test]
    fn test_invalid() {
        assert!(AnnealingSchedule::linear(0, 5.0).is_err());
        assert!(AnnealingSchedule::linear(10, -1.0).is_err());
        assert!(AnnealingSchedule::exponential(&[1.0, 1.0, 1.0, 1.5]).is_err());
        assert!(AnnealingSchedule::exponential(&[1.0, 0.0, 1.0, 0.5]).is_err());
    }
}
