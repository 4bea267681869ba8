//! 重みの平均化と書き出し

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::errors::{Result, SampleRankError};
use crate::feature_vector::{FeatureLayout, FeatureVector};

/// 重みの平均化
///
/// 学習中の重みを`lag`回ごとに足し合わせ、その平均を返します。
#[derive(Clone, Debug)]
pub struct WeightAverager {
    lag: usize,
    seen: usize,
    collected: usize,
    total: FeatureVector,
}

impl WeightAverager {
    /// 足し合わせる間隔を指定して作成します。
    ///
    /// # エラー
    ///
    /// `lag`が0の場合にエラーを返します。
    pub fn new(lag: usize) -> Result<Self> {
        if lag == 0 {
            return Err(SampleRankError::invalid_argument(
                "lag",
                "the averaging lag must be positive",
            ));
        }
        Ok(Self {
            lag,
            seen: 0,
            collected: 0,
            total: FeatureVector::new(),
        })
    }

    /// 現在の重みを記録します。`lag`回に一回だけ足し合わされます。
    pub fn record(&mut self, weights: &FeatureVector) {
        self.seen += 1;
        if self.seen % self.lag == 0 {
            self.total += weights;
            self.collected += 1;
        }
    }

    /// 足し合わされた重みの数
    pub fn num_collected(&self) -> usize {
        self.collected
    }

    /// 平均の重み。まだ何も足し合わされていない場合は`current`を返します。
    pub fn average(&self, current: &FeatureVector) -> FeatureVector {
        if self.collected == 0 {
            return current.clone();
        }
        let mut average = self.total.clone();
        average /= self.collected as f64;
        average
    }
}

/// 重みの定期的な書き出し
///
/// `frequency`回の記録ごとに`<stem>_<n>`へ重みを書き出します。
/// 記録の単位はサンプルまたはバッチです。
#[derive(Clone, Debug)]
pub struct WeightDumper {
    stem: PathBuf,
    frequency: usize,
    by_batch: bool,
    dump_current: bool,
    count: usize,
    index: usize,
}

impl WeightDumper {
    /// 書き出し先の接頭辞と頻度を指定して作成します。
    ///
    /// # エラー
    ///
    /// `frequency`が0の場合にエラーを返します。
    pub fn new<P>(stem: P, frequency: usize) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        if frequency == 0 {
            return Err(SampleRankError::invalid_argument(
                "frequency",
                "a weight dump stem requires a positive dump frequency",
            ));
        }
        Ok(Self {
            stem: stem.as_ref().to_path_buf(),
            frequency,
            by_batch: false,
            dump_current: false,
            count: 0,
            index: 0,
        })
    }

    /// バッチ単位で数えるかどうか
    pub fn by_batch(mut self, by_batch: bool) -> Self {
        self.by_batch = by_batch;
        self
    }

    /// 平均ではなく現在の重みを書き出すかどうか
    pub fn dump_current(mut self, dump_current: bool) -> Self {
        self.dump_current = dump_current;
        self
    }

    /// バッチ単位で数えるかどうか
    pub fn counts_batches(&self) -> bool {
        self.by_batch
    }

    /// 記録を一つ数え、頻度に達した場合は重みを書き出します。
    ///
    /// # 戻り値
    ///
    /// 書き出した場合はそのパス
    ///
    /// # エラー
    ///
    /// 書き出しに失敗した場合にエラーを返します。
    pub fn tick(
        &mut self,
        averager: &WeightAverager,
        weights: &FeatureVector,
        layout: &FeatureLayout,
    ) -> Result<Option<PathBuf>> {
        self.count += 1;
        if self.count % self.frequency != 0 {
            return Ok(None);
        }
        self.dump(averager, weights, layout).map(Some)
    }

    /// 重みを直ちに書き出します。
    ///
    /// # エラー
    ///
    /// 書き出しに失敗した場合にエラーを返します。
    pub fn dump(
        &mut self,
        averager: &WeightAverager,
        weights: &FeatureVector,
        layout: &FeatureLayout,
    ) -> Result<PathBuf> {
        let mut name = self.stem.clone().into_os_string();
        name.push(format!("_{}", self.index));
        let path = PathBuf::from(name);
        let mut wtr = BufWriter::new(File::create(&path)?);
        if self.dump_current {
            weights.write(&mut wtr, layout)?;
        } else {
            averager.average(weights).write(&mut wtr, layout)?;
        }
        wtr.flush()?;
        log::info!("dumped weights to {}", path.display());
        self.index += 1;
        Ok(path)
    }
}
