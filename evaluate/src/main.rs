//! 翻訳の精度を評価するユーティリティ
//!
//! このバイナリは、出力訳のファイルを一つ以上の参照訳のファイルと比較し、
//! コーパス単位のBLEUとn-gramごとの精度を計算します。

use std::error::Error;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use samplerank::gain::{BleuStats, References};
use samplerank::utils::split_words;

use clap::Parser;

/// コマンドライン引数
#[derive(Parser, Debug)]
#[clap(name = "evaluate", about = "Evaluate the translation quality")]
struct Args {
    /// Translations to be evaluated, one per line.
    #[clap(short = 't', long)]
    test_in: PathBuf,

    /// Reference translations, one per line. Can be given several times.
    #[clap(short = 'r', long, required = true)]
    reference_in: Vec<PathBuf>,
}

fn read_lines(path: &Path) -> Result<Vec<Vec<String>>, Box<dyn Error>> {
    let rdr = BufReader::new(File::open(path)?);
    let mut lines = vec![];
    for line in rdr.lines() {
        lines.push(split_words(&line?));
    }
    Ok(lines)
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let hypotheses = read_lines(&args.test_in)?;
    let mut references = vec![];
    for path in &args.reference_in {
        let lines = read_lines(path)?;
        if lines.len() != hypotheses.len() {
            return Err(format!(
                "{} has {} lines, but {} has {}",
                path.display(),
                lines.len(),
                args.test_in.display(),
                hypotheses.len()
            )
            .into());
        }
        references.push(lines);
    }

    eprintln!("Evaluating {} sentences...", hypotheses.len());

    let mut stats = BleuStats::default();
    for (i, hypothesis) in hypotheses.iter().enumerate() {
        let refs: Vec<Vec<String>> = references.iter().map(|r| r[i].clone()).collect();
        stats += &References::new(&refs)?.stats(hypothesis);
    }

    let precisions = stats.precisions();
    println!("BLEU = {}", stats.bleu());
    for (n, p) in precisions.iter().enumerate() {
        println!("Precision{} = {p}", n + 1);
    }
    println!("BP = {}", stats.brevity_penalty());
    println!("Ratio = {}", stats.hyp_len as f64 / stats.ref_len.max(1) as f64);

    Ok(())
}
