//! 候補の選択とSampleRankによる学習
//!
//! [`DeltaSelector`]は走査位置ごとの候補の集合から一つを選びます。
//! [`SampleRankSelector`]は選択のたびに利得を計算し、順位の逆転があれば重みを更新します。

use crate::acceptor::{SampleAcceptor, argmax};
use crate::collector::ImportanceCorrection;
use crate::context::SamplerContext;
use crate::feature_vector::FeatureVector;
use crate::gain::GainFunction;
use crate::learner::{Candidate, OnlineLearner};
use crate::operator::Proposal;
use crate::options::UNKNOWN_WORD_PENALTY;
use crate::sample::Sample;
use crate::weights::WeightAverager;

/// 候補の集合から一つを選ぶ選択器
pub trait DeltaSelector {
    /// 候補を一つ選び、その位置を返します。
    fn select(
        &mut self,
        sample: &Sample,
        proposal: &Proposal,
        ctx: &mut SamplerContext,
        iteration: usize,
    ) -> Option<usize>;

    /// バーンイン中かどうかを設定します。
    fn set_burn_in(&mut self, _burn_in: bool) {}
}

/// スコアだけから選ぶ選択器
#[derive(Clone, Debug)]
pub struct AcceptorSelector<A> {
    acceptor: A,
}

impl<A> AcceptorSelector<A>
where
    A: SampleAcceptor,
{
    /// 選択器を包んで作成します。
    pub fn new(acceptor: A) -> Self {
        Self { acceptor }
    }

    /// 包まれた選択器
    pub fn acceptor_mut(&mut self) -> &mut A {
        &mut self.acceptor
    }
}

impl<A> DeltaSelector for AcceptorSelector<A>
where
    A: SampleAcceptor,
{
    fn select(
        &mut self,
        _sample: &Sample,
        proposal: &Proposal,
        ctx: &mut SamplerContext,
        iteration: usize,
    ) -> Option<usize> {
        self.acceptor
            .choose(&proposal.scores(), iteration, &mut ctx.rng)
    }
}

/// 学習の目標とする候補の決め方
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TargetAssigner {
    /// 利得が最大の候補
    #[default]
    Best,
    /// 選ばれた候補より利得が高い候補のうち、スコアが最も近いもの
    ClosestBest,
    /// 利得とスコアの和が最大の候補
    Chiang,
}

impl TargetAssigner {
    /// 目標の候補の位置を返します。該当する候補がない場合は`None`を返します。
    pub fn assign(&self, gains: &[f64], scores: &[f64], chosen: usize) -> Option<usize> {
        match self {
            Self::Best => argmax(gains),
            Self::ClosestBest => {
                let mut best: Option<(usize, f64)> = None;
                for (i, (&g, &s)) in gains.iter().zip(scores).enumerate() {
                    if g > gains[chosen] {
                        let diff = scores[chosen] - s;
                        if best.is_none_or(|(_, d)| diff < d) {
                            best = Some((i, diff));
                        }
                    }
                }
                best.map(|(i, _)| i)
            }
            Self::Chiang => {
                let combined: Vec<f64> = gains.iter().zip(scores).map(|(g, s)| g + s).collect();
                argmax(&combined)
            }
        }
    }
}

/// SampleRankの設定
#[derive(Clone, Copy, Debug, Default)]
pub struct SampleRankConfig {
    tolerance: f64,
    always_update: bool,
    update_target: bool,
    assigner: TargetAssigner,
    ignore_unknown_word_penalty: bool,
}

impl SampleRankConfig {
    /// 利得の差がこの値以下の逆転は無視されます。
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// 逆転がなくても常に学習器を呼ぶかどうか
    pub fn always_update(mut self, always_update: bool) -> Self {
        self.always_update = always_update;
        self
    }

    /// 選ばれた候補の代わりに目標の候補を適用するかどうか
    pub fn update_target(mut self, update_target: bool) -> Self {
        self.update_target = update_target;
        self
    }

    /// 目標の候補の決め方
    pub fn assigner(mut self, assigner: TargetAssigner) -> Self {
        self.assigner = assigner;
        self
    }

    /// 学習で未知語ペナルティを無視するかどうか
    pub fn ignore_unknown_word_penalty(mut self, ignore: bool) -> Self {
        self.ignore_unknown_word_penalty = ignore;
        self
    }
}

/// SampleRankによる学習を行う選択器
pub struct SampleRankSelector<'a> {
    config: SampleRankConfig,
    acceptor: Box<dyn SampleAcceptor + 'a>,
    burn_in_acceptor: Box<dyn SampleAcceptor + 'a>,
    learner: &'a mut dyn OnlineLearner,
    gain: &'a dyn GainFunction,
    averager: &'a mut WeightAverager,
    correction: ImportanceCorrection,
    optimal: Option<Candidate>,
    burn_in: bool,
}

impl<'a> SampleRankSelector<'a> {
    /// 新しい選択器を作成します。
    ///
    /// # 引数
    ///
    /// * `config` - 設定
    /// * `acceptor` - サンプリング中の選択器
    /// * `burn_in_acceptor` - バーンイン中の選択器
    /// * `learner` - 学習器
    /// * `gain` - 文の利得関数
    /// * `averager` - 選択のたびに重みを記録する平均化器
    pub fn new(
        config: SampleRankConfig,
        acceptor: Box<dyn SampleAcceptor + 'a>,
        burn_in_acceptor: Box<dyn SampleAcceptor + 'a>,
        learner: &'a mut dyn OnlineLearner,
        gain: &'a dyn GainFunction,
        averager: &'a mut WeightAverager,
    ) -> Self {
        Self {
            config,
            acceptor,
            burn_in_acceptor,
            learner,
            gain,
            averager,
            correction: ImportanceCorrection::default(),
            optimal: None,
            burn_in: false,
        }
    }

    /// 学習の前に取り除く補助素性を設定します。
    pub fn importance_correction(mut self, correction: ImportanceCorrection) -> Self {
        self.correction = correction;
        self
    }

    /// これまでに見つかった最も利得の高い解
    pub fn optimal(&self) -> Option<&Candidate> {
        self.optimal.as_ref()
    }

    /// 学習器
    pub fn learner(&self) -> &dyn OnlineLearner {
        &*self.learner
    }

    fn candidate(&self, sample: &Sample, proposal: &Proposal, i: usize, gain: f64) -> Candidate {
        let mut features: FeatureVector = proposal.feature_values(sample, i);
        self.correction.remove(&mut features);
        if self.config.ignore_unknown_word_penalty {
            features.remove_sparse(UNKNOWN_WORD_PENALTY);
        }
        Candidate { features, gain }
    }

    fn update_optimal(&mut self, sample: &Sample, proposal: &Proposal, gains: &[f64]) {
        let Some(best) = argmax(gains) else {
            return;
        };
        if self.optimal.as_ref().is_none_or(|o| gains[best] > o.gain) {
            log::debug!("new optimal gain {}", gains[best]);
            self.optimal = Some(self.candidate(sample, proposal, best, gains[best]));
        }
    }
}

impl DeltaSelector for SampleRankSelector<'_> {
    fn select(
        &mut self,
        sample: &Sample,
        proposal: &Proposal,
        ctx: &mut SamplerContext,
        iteration: usize,
    ) -> Option<usize> {
        let scores = proposal.scores();
        if self.burn_in {
            return self.burn_in_acceptor.choose(&scores, iteration, &mut ctx.rng);
        }
        let chosen = self.acceptor.choose(&scores, iteration, &mut ctx.rng)?;

        let gains: Vec<f64> = proposal
            .deltas
            .iter()
            .map(|delta| self.gain.gain(&delta.new_sentence(sample)))
            .collect();
        let Some(target) = self.config.assigner.assign(&gains, &scores, chosen) else {
            return Some(chosen);
        };
        if self.learner.uses_optimal() {
            self.update_optimal(sample, proposal, &gains);
        }

        let (cs, ts) = (scores[chosen], scores[target]);
        let (cg, tg) = (gains[chosen], gains[target]);
        let tolerance = self.config.tolerance;
        if self.config.always_update
            || (cs > ts && cg + tolerance < tg)
            || (cs < ts && cg - tolerance > tg)
        {
            let current = self.candidate(sample, proposal, chosen, cg);
            let target = self.candidate(sample, proposal, target, tg);
            if self
                .learner
                .update(&current, &target, self.optimal.as_ref(), &mut ctx.weights)
            {
                log::debug!(
                    "{} update: gain {cg} -> {tg}, score {cs} -> {ts}",
                    self.learner.name()
                );
            }
        }
        self.averager.record(&ctx.weights);

        if self.config.update_target {
            Some(target)
        } else {
            Some(chosen)
        }
    }

    fn set_burn_in(&mut self, burn_in: bool) {
        self.burn_in = burn_in;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_assigners() {
        let gains = [0.2, 0.5, 0.4, 0.1];
        let scores = [3.0, -1.0, 2.5, 5.0];
        assert_eq!(Some(1), TargetAssigner::Best.assign(&gains, &scores, 0));
        assert_eq!(Some(2), TargetAssigner::ClosestBest.assign(&gains, &scores, 0));
        assert_eq!(None, TargetAssigner::ClosestBest.assign(&gains, &scores, 1));
        assert_eq!(Some(3), TargetAssigner::Chiang.assign(&gains, &scores, 0));
    }
}
