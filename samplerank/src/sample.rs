//! サンプル(導出の状態)
//!
//! サンプルは適用済みのフレーズ対([`DerivationNode`])の集合で、
//! 各ノードは二つの全順序に同時に属します。
//!
//! - 原言語順: 原言語側の区間の順。入力文`[0, N)`を重複なく覆います。
//! - 目的言語順: 目的言語側の区間の順。連結すると出力文になります。
//!
//! ノードはサンプルが所有するアリーナに整数IDで格納され、
//! 二つの順序は各ノードの前後リンクとして表現されます。
//! 編集操作は前提条件をすべて検証してから実行されるため、
//! エラーを返した場合にサンプルが中途半端に更新されることはありません。

use std::sync::Arc;

use crate::errors::{Result, SampleRankError};
use crate::feature_vector::FeatureVector;
use crate::features::FeatureSet;
use crate::options::{OptionRef, Span};

/// アリーナ内のノードID
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    #[inline(always)]
    const fn index(self) -> usize {
        self.0
    }
}

/// 導出中の一つのフレーズ対
#[derive(Clone, Debug)]
pub struct DerivationNode {
    source: Span,
    target: Span,
    option: OptionRef,
    src_prev: Option<NodeId>,
    src_next: Option<NodeId>,
    tgt_prev: Option<NodeId>,
    tgt_next: Option<NodeId>,
}

impl DerivationNode {
    fn new(option: &OptionRef, target_start: usize) -> Self {
        Self {
            source: option.source(),
            target: Span::new(target_start, target_start + option.target().len()),
            option: Arc::clone(option),
            src_prev: None,
            src_next: None,
            tgt_prev: None,
            tgt_next: None,
        }
    }

    /// 原言語側の区間
    #[inline(always)]
    pub fn source(&self) -> Span {
        self.source
    }

    /// 出力文における目的言語側の区間
    #[inline(always)]
    pub fn target(&self) -> Span {
        self.target
    }

    /// 適用されている翻訳候補
    #[inline(always)]
    pub fn option(&self) -> &OptionRef {
        &self.option
    }

    /// このノードのスコア内訳
    #[inline(always)]
    pub fn scores(&self) -> &FeatureVector {
        self.option.scores()
    }

    /// 原言語順で直前のノード
    #[inline(always)]
    pub fn src_prev(&self) -> Option<NodeId> {
        self.src_prev
    }

    /// 原言語順で直後のノード
    #[inline(always)]
    pub fn src_next(&self) -> Option<NodeId> {
        self.src_next
    }

    /// 目的言語順で直前のノード
    #[inline(always)]
    pub fn tgt_prev(&self) -> Option<NodeId> {
        self.tgt_prev
    }

    /// 目的言語順で直後のノード
    #[inline(always)]
    pub fn tgt_next(&self) -> Option<NodeId> {
        self.tgt_next
    }
}

/// 編集の適用位置
///
/// 出力文中の区間と、その区間の前後にあるノードを表します。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetGap {
    /// 区間の直前のノード
    pub prev: Option<NodeId>,
    /// 区間の直後のノード
    pub next: Option<NodeId>,
    /// 出力文中の区間
    pub segment: Span,
}

/// Gibbsサンプラーの状態
#[derive(Clone, Debug)]
pub struct Sample {
    source: Vec<String>,
    nodes: Vec<Option<DerivationNode>>,
    free: Vec<NodeId>,
    source_index: Vec<NodeId>,
    source_first: Option<NodeId>,
    target_first: Option<NodeId>,
    target_last: Option<NodeId>,
    target_words: Vec<String>,
    feature_values: FeatureVector,
}

impl Sample {
    /// 目的言語順に並んだ翻訳候補からサンプルを作成します。
    ///
    /// # 引数
    ///
    /// * `source` - 入力文の単語列
    /// * `derivation` - 目的言語順に並んだ翻訳候補
    /// * `features` - 素性の集合
    ///
    /// # エラー
    ///
    /// 入力文が空の場合や、候補の区間が入力文を重複なく覆っていない場合にエラーを返します。
    pub fn new(source: Vec<String>, derivation: &[OptionRef], features: &FeatureSet) -> Result<Self> {
        let n = source.len();
        if n == 0 {
            return Err(SampleRankError::invalid_argument(
                "source",
                "the source sentence must not be empty",
            ));
        }
        let mut covered = vec![false; n];
        for option in derivation {
            let span = option.source();
            if span.is_empty() || span.end > n {
                return Err(SampleRankError::invalid_argument(
                    "derivation",
                    format!("span {span:?} is outside the sentence"),
                ));
            }
            for c in &mut covered[span.range()] {
                if *c {
                    return Err(SampleRankError::invalid_argument(
                        "derivation",
                        format!("span {span:?} overlaps another phrase"),
                    ));
                }
                *c = true;
            }
        }
        if let Some(i) = covered.iter().position(|&c| !c) {
            return Err(SampleRankError::invalid_argument(
                "derivation",
                format!("position {i} is not covered"),
            ));
        }

        let mut sample = Self {
            source,
            nodes: Vec::with_capacity(derivation.len()),
            free: vec![],
            source_index: vec![NodeId(0); n],
            source_first: None,
            target_first: None,
            target_last: None,
            target_words: vec![],
            feature_values: FeatureVector::new(),
        };

        let mut ids = Vec::with_capacity(derivation.len());
        let mut pos = 0;
        for option in derivation {
            let id = sample.alloc(DerivationNode::new(option, pos));
            pos += option.target().len();
            sample.target_words.extend(option.target().iter().cloned());
            ids.push(id);
        }
        sample.link_target(None, &ids, None);
        ids.sort_unstable_by_key(|&id| sample.node(id).source.start);
        sample.link_source(None, &ids, None);

        sample.feature_values = features.compute_features(&sample);
        Ok(sample)
    }

    /// 入力文の単語列
    #[inline(always)]
    pub fn source_words(&self) -> &[String] {
        &self.source
    }

    /// 入力文の長さ
    #[inline(always)]
    pub fn source_len(&self) -> usize {
        self.source.len()
    }

    /// 出力文の単語列
    #[inline(always)]
    pub fn target_words(&self) -> &[String] {
        &self.target_words
    }

    /// 出力文を空白区切りで連結した文字列
    pub fn translation(&self) -> String {
        self.target_words.join(" ")
    }

    /// 集約された素性値
    #[inline(always)]
    pub fn feature_values(&self) -> &FeatureVector {
        &self.feature_values
    }

    /// 生きているノードの数
    pub fn num_nodes(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// 原言語の位置`i`を覆うノード。O(1)で求まります。
    #[inline(always)]
    pub fn node_at_source(&self, i: usize) -> Option<NodeId> {
        self.source_index.get(i).copied()
    }

    /// 原言語順で最初のノード
    pub fn source_first(&self) -> Option<NodeId> {
        self.source_first
    }

    /// 目的言語順で最初のノード
    pub fn target_first(&self) -> Option<NodeId> {
        self.target_first
    }

    /// 目的言語順で最後のノード
    pub fn target_last(&self) -> Option<NodeId> {
        self.target_last
    }

    /// ノードを返します。解放済みのIDの場合は`None`です。
    pub fn get(&self, id: NodeId) -> Option<&DerivationNode> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    /// ノードを返します。
    ///
    /// # パニック
    ///
    /// 解放済みのIDが渡された場合、パニックします。
    pub fn node(&self, id: NodeId) -> &DerivationNode {
        match self.get(id) {
            Some(node) => node,
            None => unreachable!("dangling node id {id:?}"),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut DerivationNode {
        match self.nodes.get_mut(id.index()).and_then(Option::as_mut) {
            Some(node) => node,
            None => unreachable!("dangling node id {id:?}"),
        }
    }

    /// 原言語順にノードを列挙します。
    pub fn source_order(&self) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.source_first, |&id| self.node(id).src_next)
    }

    /// 目的言語順にノードを列挙します。
    pub fn target_order(&self) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.target_first, |&id| self.node(id).tgt_next)
    }

    /// ノード一つ分の編集位置
    pub fn gap(&self, id: NodeId) -> TargetGap {
        let node = self.node(id);
        TargetGap {
            prev: node.tgt_prev,
            next: node.tgt_next,
            segment: node.target,
        }
    }

    /// 目的言語順で隣接する二つのノードをまとめた編集位置
    pub fn joint_gap(&self, first: NodeId, second: NodeId) -> TargetGap {
        let (first, second) = (self.node(first), self.node(second));
        TargetGap {
            prev: first.tgt_prev,
            next: second.tgt_next,
            segment: Span::new(first.target.start, second.target.end),
        }
    }

    fn alloc(&mut self, node: DerivationNode) -> NodeId {
        if let Some(id) = self.free.pop() {
            self.nodes[id.index()] = Some(node);
            id
        } else {
            self.nodes.push(Some(node));
            NodeId(self.nodes.len() - 1)
        }
    }

    fn release(&mut self, id: NodeId) {
        self.nodes[id.index()] = None;
        self.free.push(id);
    }

    /// `prev`と`next`の間に`ids`を原言語順で繋ぎ、位置の索引を更新します。
    fn link_source(&mut self, prev: Option<NodeId>, ids: &[NodeId], next: Option<NodeId>) {
        let mut p = prev;
        for &id in ids {
            self.node_mut(id).src_prev = p;
            match p {
                Some(pid) => self.node_mut(pid).src_next = Some(id),
                None => self.source_first = Some(id),
            }
            let span = self.node(id).source;
            self.source_index[span.range()].fill(id);
            p = Some(id);
        }
        match p {
            Some(pid) => self.node_mut(pid).src_next = next,
            None => self.source_first = next,
        }
        if let Some(nid) = next {
            self.node_mut(nid).src_prev = p;
        }
    }

    /// `prev`と`next`の間に`ids`を目的言語順で繋ぎます。
    fn link_target(&mut self, prev: Option<NodeId>, ids: &[NodeId], next: Option<NodeId>) {
        let mut p = prev;
        for &id in ids {
            self.node_mut(id).tgt_prev = p;
            match p {
                Some(pid) => self.node_mut(pid).tgt_next = Some(id),
                None => self.target_first = Some(id),
            }
            p = Some(id);
        }
        match p {
            Some(pid) => self.node_mut(pid).tgt_next = next,
            None => self.target_first = next,
        }
        match next {
            Some(nid) => self.node_mut(nid).tgt_prev = p,
            None => self.target_last = p,
        }
    }

    /// 原言語順の`first..=last`を`new`で置き換えます。
    fn replace_source(&mut self, first: NodeId, last: NodeId, new: &[NodeId]) {
        let prev = self.node(first).src_prev;
        let next = self.node(last).src_next;
        self.link_source(prev, new, next);
    }

    /// 目的言語順の`first..=last`を`new`で置き換えます。
    fn replace_target(&mut self, first: NodeId, last: NodeId, new: &[NodeId]) {
        let prev = self.node(first).tgt_prev;
        let next = self.node(last).tgt_next;
        self.link_target(prev, new, next);
    }

    /// `from`以降のノードの目的言語側の区間を`pos`から詰め直します。
    ///
    /// `barrier`を通過した後は、区間がすでに正しいノードに達した時点で終了します。
    fn reflow(&mut self, from: Option<NodeId>, mut pos: usize, barrier: Option<NodeId>) {
        let mut cur = from;
        let mut past_barrier = barrier.is_none();
        while let Some(id) = cur {
            let node = self.node_mut(id);
            if past_barrier && node.target.start == pos {
                break;
            }
            let len = node.target.len();
            node.target = Span::new(pos, pos + len);
            pos += len;
            if Some(id) == barrier {
                past_barrier = true;
            }
            cur = node.tgt_next;
        }
    }

    /// 原言語側の区間がちょうど`span`であるノードを返します。
    fn exact_node(&self, span: Span) -> Result<NodeId> {
        match self.node_at_source(span.start) {
            Some(id) if self.node(id).source == span => Ok(id),
            _ => Err(SampleRankError::invalid_state(
                "span mismatch",
                format!("{span:?} is not a phrase of the current derivation"),
            )),
        }
    }

    /// ノードの翻訳候補を置き換えます。分割と目的言語側の位置は変わりません。
    ///
    /// # 引数
    ///
    /// * `option` - 新しい翻訳候補。その区間と一致するノードが置き換えられます。
    /// * `delta` - 素性値の差分
    ///
    /// # エラー
    ///
    /// 候補の区間に一致するノードがない場合にエラーを返します。
    pub fn change_target(&mut self, option: &OptionRef, delta: &FeatureVector) -> Result<()> {
        let old = self.exact_node(option.source())?;
        let old_target = self.node(old).target;

        let new = self.alloc(DerivationNode::new(option, old_target.start));
        self.replace_source(old, old, &[new]);
        self.replace_target(old, old, &[new]);
        self.release(old);

        self.target_words
            .splice(old_target.range(), option.target().iter().cloned());
        let (next, end) = {
            let node = self.node(new);
            (node.tgt_next, node.target.end)
        };
        self.reflow(next, end, None);
        self.feature_values += delta;
        Ok(())
    }

    /// 分割を保ったまま二つのノードの翻訳候補を同時に置き換えます。
    ///
    /// # エラー
    ///
    /// いずれかの候補の区間に一致するノードがない場合や、
    /// 二つの候補が同じノードを指す場合にエラーを返します。
    pub fn change_target_pair(
        &mut self,
        first: &OptionRef,
        second: &OptionRef,
        delta: &FeatureVector,
    ) -> Result<()> {
        let a = self.exact_node(first.source())?;
        let b = self.exact_node(second.source())?;
        if a == b {
            return Err(SampleRankError::invalid_state(
                "paired update",
                "both options refer to the same phrase",
            ));
        }
        let ((x, x_option), (y, y_option)) =
            if self.node(a).target.start < self.node(b).target.start {
                ((a, first), (b, second))
            } else {
                ((b, second), (a, first))
            };
        let (xs, ys) = (self.node(x).target, self.node(y).target);

        let nx = self.alloc(DerivationNode::new(x_option, xs.start));
        let ny = self.alloc(DerivationNode::new(y_option, ys.start));
        self.replace_source(x, x, &[nx]);
        self.replace_target(x, x, &[nx]);
        self.replace_source(y, y, &[ny]);
        self.replace_target(y, y, &[ny]);
        self.release(x);
        self.release(y);

        self.target_words
            .splice(ys.range(), y_option.target().iter().cloned());
        self.target_words
            .splice(xs.range(), x_option.target().iter().cloned());
        self.reflow(Some(nx), xs.start, Some(ny));
        self.feature_values += delta;
        Ok(())
    }

    /// 原言語側で隣接する二つのノードを、両方を覆う一つのノードに置き換えます。
    ///
    /// 新しいノードは、二つのうち目的言語順で先にあったノードの位置に置かれます。
    /// 二つが目的言語側で隣接していない場合、間にあるノードの区間はずらされます。
    ///
    /// # エラー
    ///
    /// 候補の区間がちょうど二つの隣接ノードで覆われていない場合にエラーを返します。
    pub fn merge_target(&mut self, option: &OptionRef, delta: &FeatureVector) -> Result<()> {
        let span = option.source();
        let invalid = || {
            SampleRankError::invalid_state(
                "merge",
                format!("{span:?} is not covered by exactly two adjacent phrases"),
            )
        };
        if span.len() < 2 {
            return Err(invalid());
        }
        let (Some(left), Some(right)) = (
            self.node_at_source(span.start),
            self.node_at_source(span.end - 1),
        ) else {
            return Err(invalid());
        };
        if left == right
            || self.node(left).source.start != span.start
            || self.node(right).source.end != span.end
            || self.node(left).src_next != Some(right)
        {
            return Err(invalid());
        }

        let (t1, t2) = if self.node(left).target.start < self.node(right).target.start {
            (left, right)
        } else {
            (right, left)
        };
        let (s1, s2) = (self.node(t1).target, self.node(t2).target);
        let adjacent = self.node(t1).tgt_next == Some(t2);

        let new = self.alloc(DerivationNode::new(option, s1.start));
        self.replace_source(left, right, &[new]);
        if adjacent {
            self.replace_target(t1, t2, &[new]);
            self.target_words
                .splice(s1.start..s2.end, option.target().iter().cloned());
        } else {
            self.replace_target(t2, t2, &[]);
            self.replace_target(t1, t1, &[new]);
            self.target_words.drain(s2.range());
            self.target_words
                .splice(s1.range(), option.target().iter().cloned());
        }
        let after = if adjacent { None } else { self.node(t2).tgt_next };
        self.release(left);
        self.release(right);

        let (next, end) = {
            let node = self.node(new);
            (node.tgt_next, node.target.end)
        };
        self.reflow(next, end, after);
        self.feature_values += delta;
        Ok(())
    }

    /// 一つのノードを原言語側の分割点で二つに分けます。目的言語側の順序は原言語側と同じです。
    ///
    /// # エラー
    ///
    /// 二つの候補が原言語側で隣接していない場合や、
    /// その和に一致するノードがない場合にエラーを返します。
    pub fn split_target(
        &mut self,
        left: &OptionRef,
        right: &OptionRef,
        delta: &FeatureVector,
    ) -> Result<()> {
        let (ls, rs) = (left.source(), right.source());
        if ls.end != rs.start {
            return Err(SampleRankError::invalid_state(
                "split",
                format!("{ls:?} and {rs:?} are not adjacent"),
            ));
        }
        let old = self.exact_node(Span::new(ls.start, rs.end))?;
        let old_target = self.node(old).target;

        let l = self.alloc(DerivationNode::new(left, old_target.start));
        let r = self.alloc(DerivationNode::new(
            right,
            old_target.start + left.target().len(),
        ));
        self.replace_source(old, old, &[l, r]);
        self.replace_target(old, old, &[l, r]);
        self.release(old);

        self.target_words.splice(
            old_target.range(),
            left.target().iter().chain(right.target()).cloned(),
        );
        let (next, end) = {
            let node = self.node(r);
            (node.tgt_next, node.target.end)
        };
        self.reflow(next, end, None);
        self.feature_values += delta;
        Ok(())
    }

    /// 二つのノードの目的言語側の順序を入れ替えます。原言語側の区間は変わりません。
    ///
    /// 入れ替え後は`left`が先、`right`が後になります。
    /// つまり現在は`right`の区間のノードが目的言語順で先にある必要があります。
    ///
    /// # 引数
    ///
    /// * `left` - 入れ替え後に先に来る翻訳候補
    /// * `right` - 入れ替え後に後に来る翻訳候補
    /// * `prev_bound` - 入れ替える範囲の直前のノード
    /// * `next_bound` - 入れ替える範囲の直後のノード
    /// * `delta` - 素性値の差分
    ///
    /// # エラー
    ///
    /// 区間に一致するノードがない場合、現在の順序が逆の場合、
    /// 境界のノードが現在の状態と一致しない場合にエラーを返します。
    pub fn flip_nodes(
        &mut self,
        left: &OptionRef,
        right: &OptionRef,
        prev_bound: Option<NodeId>,
        next_bound: Option<NodeId>,
        delta: &FeatureVector,
    ) -> Result<()> {
        let x = self.exact_node(right.source())?;
        let y = self.exact_node(left.source())?;
        if x == y {
            return Err(SampleRankError::invalid_state(
                "flip",
                "both options refer to the same phrase",
            ));
        }
        let (xs, ys) = (self.node(x).target, self.node(y).target);
        if xs.start >= ys.start {
            return Err(SampleRankError::invalid_state(
                "flip",
                format!("{:?} does not precede {:?} in the target", right.source(), left.source()),
            ));
        }
        if self.node(x).tgt_prev != prev_bound || self.node(y).tgt_next != next_bound {
            return Err(SampleRankError::invalid_state(
                "flip",
                "the bounds do not match the current derivation",
            ));
        }
        let contiguous = self.node(x).tgt_next == Some(y);

        let ny = self.alloc(DerivationNode::new(left, xs.start));
        let nx = self.alloc(DerivationNode::new(right, ys.start));
        self.replace_source(x, x, &[nx]);
        self.replace_source(y, y, &[ny]);
        if contiguous {
            self.replace_target(x, y, &[ny, nx]);
        } else {
            self.replace_target(x, x, &[ny]);
            self.replace_target(y, y, &[nx]);
        }
        self.release(x);
        self.release(y);

        let words: Vec<String> = left
            .target()
            .iter()
            .chain(&self.target_words[xs.end..ys.start])
            .chain(right.target())
            .cloned()
            .collect();
        self.target_words.splice(xs.start..ys.end, words);
        self.reflow(Some(ny), xs.start, Some(nx));
        self.feature_values += delta;
        Ok(())
    }

    /// 二つの順序とキャッシュが互いに整合しているかを検証します。
    ///
    /// # エラー
    ///
    /// 不整合が見つかった場合、その内容を含むエラーを返します。
    pub fn check_consistency(&self) -> Result<()> {
        let fail = |msg: String| Err(SampleRankError::invalid_state("inconsistent sample", msg));

        let mut pos = 0;
        let mut prev = None;
        let mut count = 0;
        for id in self.source_order() {
            let node = self.node(id);
            if node.source.start != pos || node.source.is_empty() {
                return fail(format!("source order is broken at {pos}"));
            }
            if node.src_prev != prev {
                return fail(format!("source back-link of {id:?} is broken"));
            }
            if self.source_index[node.source.range()].iter().any(|&i| i != id) {
                return fail(format!("position index of {:?} is stale", node.source));
            }
            pos = node.source.end;
            prev = Some(id);
            count += 1;
        }
        if pos != self.source.len() {
            return fail(format!("source order covers {pos} of {} words", self.source.len()));
        }

        let mut pos = 0;
        let mut prev = None;
        let mut target_count = 0;
        for id in self.target_order() {
            let node = self.node(id);
            if node.target.start != pos || node.target.len() != node.option.target().len() {
                return fail(format!("target order is broken at {pos}"));
            }
            if node.tgt_prev != prev {
                return fail(format!("target back-link of {id:?} is broken"));
            }
            if self.target_words.get(node.target.range()) != Some(node.option.target()) {
                return fail(format!("cached words differ at {:?}", node.target));
            }
            pos = node.target.end;
            prev = Some(id);
            target_count += 1;
        }
        if pos != self.target_words.len() || prev != self.target_last {
            return fail("target order does not cover the cached words".to_string());
        }
        if count != target_count || count != self.num_nodes() {
            return fail(format!(
                "{} live nodes, {} in source order, {} in target order",
                self.num_nodes(),
                count,
                target_count
            ));
        }
        Ok(())
    }
}
