//! 自己対戦ロールアウト生成モジュール
//!
//! 学習データ生成のための短い自己対戦（ロールアウト）を実装する。
//!
//! # 概要
//!
//! - `classify_leaf`: 探索結果とリーフ評価の一致で EVAL / FIXED を判定
//! - `RolloutRecord`: 1ロールアウト分のリーフ特徴量・種別・教師値
//! - `RolloutWorker`: ワーカー専用の評価器スナップショット・置換表・
//!   探索補助状態・乱数を所有し、ロールアウトを生成する
//!
//! # ロールアウト手順
//!
//! 1. コーパスから一様ランダムにルート局面を選ぶ
//! 2. 置換表を完全無効化する（探索補助状態は持ち越す）
//! 3. ルートが終局でなければランダムに1手進める
//! 4. 最大 `max_half_moves` 回、探索 → 読み筋末端の評価 → 分類 → 記録。
//!    EVAL なら読み筋の初手を指して続行、FIXED なら打ち切る

use std::sync::mpsc::Sender;

use log::debug;
use rand::Rng;
use rand::rngs::StdRng;

use crate::board::Position;
use crate::evaluator::{EvalCache, Evaluator};
use crate::features::FeatureConverter;
use crate::network::ValueModel;
use crate::score::{SCORE_MAX, SCORE_MIN, Score, unscale};
use crate::search::{SearchHeuristics, search_node_limited};
use crate::tt::{NodeBudget, TranspositionTable};

/// リーフの種別
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PositionKind {
    /// 探索値と静的評価が一致した通常局面（TDで調整する）
    Eval,
    /// 終局など探索が特別な値を返した局面（教師値で固定する）
    Fixed,
}

/// リーフを分類する
///
/// 読み筋が空でなく、リーフの静的評価が白番視点のルート探索値と
/// 一致するときだけ `Eval`。読み筋が空なら必ず `Fixed`。
///
/// # Examples
///
/// ```
/// use evalforge::learning::{PositionKind, classify_leaf};
///
/// assert_eq!(classify_leaf(3, 120, 120), PositionKind::Eval);
/// assert_eq!(classify_leaf(3, 120, 10_040), PositionKind::Fixed);
/// assert_eq!(classify_leaf(0, 120, 120), PositionKind::Fixed);
/// ```
#[inline]
pub fn classify_leaf(pv_len: usize, leaf_score_white: Score, root_score_white: Score) -> PositionKind {
    if pv_len > 0 && leaf_score_white == root_score_white {
        PositionKind::Eval
    } else {
        PositionKind::Fixed
    }
}

/// 1ロールアウト分の記録
///
/// 3本の列は常に同じ長さ。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RolloutRecord {
    leaves: Vec<Vec<f32>>,
    kinds: Vec<PositionKind>,
    scores: Vec<f32>,
}

impl RolloutRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// リーフを1つ追加
    ///
    /// * `leaf` - リーフ局面の特徴量
    /// * `kind` - 種別
    /// * `score` - 白番視点のルート探索値（`[-1, 1]` に正規化済み）
    pub fn push(&mut self, leaf: Vec<f32>, kind: PositionKind, score: f32) {
        self.leaves.push(leaf);
        self.kinds.push(kind);
        self.scores.push(score);
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn leaves(&self) -> &[Vec<f32>] {
        &self.leaves
    }

    pub fn kinds(&self) -> &[PositionKind] {
        &self.kinds
    }

    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    /// FIXED リーフの数
    pub fn fixed_count(&self) -> usize {
        self.kinds.iter().filter(|&&k| k == PositionKind::Fixed).count()
    }
}

/// ロールアウト生成の設定
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RolloutSettings {
    /// 1ロールアウトで探索する最大半手数
    pub max_half_moves: usize,
    /// 1回の探索のノード予算
    pub node_budget: NodeBudget,
}

/// ロールアウト生成ワーカー
///
/// 全ての状態をワーカーが所有する。スレッド間で共有しない。
pub struct RolloutWorker<P: Position, F, M> {
    id: usize,
    evaluator: EvalCache<P, F, M>,
    tt: TranspositionTable<P>,
    heuristics: SearchHeuristics<P>,
    rng: StdRng,
    settings: RolloutSettings,
}

impl<P, F, M> RolloutWorker<P, F, M>
where
    P: Position,
    F: FeatureConverter<P>,
    M: ValueModel,
{
    /// ワーカーを作成
    ///
    /// * `evaluator` - 正準評価器のスナップショット（空キャッシュ）
    /// * `tt_size_bytes` - 専用置換表のサイズ
    /// * `rng` - ワーカー専用の乱数列
    pub fn new(
        id: usize,
        evaluator: EvalCache<P, F, M>,
        tt_size_bytes: usize,
        settings: RolloutSettings,
        rng: StdRng,
    ) -> Self {
        Self {
            id,
            evaluator,
            tt: TranspositionTable::with_size_bytes(tt_size_bytes),
            heuristics: SearchHeuristics::new(),
            rng,
            settings,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn evaluator(&self) -> &EvalCache<P, F, M> {
        &self.evaluator
    }

    /// ロールアウトを1本生成
    ///
    /// `roots` は空でないこと。
    pub fn generate_rollout(&mut self, roots: &[P]) -> RolloutRecord {
        debug_assert!(!roots.is_empty(), "empty corpus");
        let mut pos = roots[self.rng.random_range(0..roots.len())].clone();

        self.tt.invalidate_all_entries();

        // 奇数手ずらすためにランダムに1手進める
        if !pos.status().is_terminal() {
            let moves = pos.legal_moves();
            let mv = moves[self.rng.random_range(0..moves.len())];
            pos.apply_move(mv);
        }

        let mut record = RolloutRecord::new();
        for _ in 0..self.settings.max_half_moves {
            if pos.status().is_terminal() {
                break;
            }

            let result = search_node_limited(
                &pos,
                self.settings.node_budget,
                &mut self.evaluator,
                &mut self.heuristics,
                &mut self.tt,
            );

            let mut leaf = pos.clone();
            leaf.apply_variation(&result.pv);

            let root_score_white = result.score * pos.side_to_move().white_sign();
            let leaf_score_white = self.evaluator.evaluate_for_white(&leaf, SCORE_MIN, SCORE_MAX);
            let kind = classify_leaf(result.pv.len(), leaf_score_white, root_score_white);

            record.push(
                self.evaluator.features().convert(&leaf),
                kind,
                unscale(root_score_white),
            );

            match kind {
                PositionKind::Eval => {
                    pos.apply_move(result.pv[0]);
                    self.heuristics.move_made();
                    self.tt.age_table();
                }
                PositionKind::Fixed => break,
            }
        }

        record
    }

    /// `quota` 本のロールアウトを生成して `sender` に送る
    ///
    /// 受信側が切断されていたら打ち切る。送信できた本数を返す。
    pub fn run(&mut self, roots: &[P], quota: usize, sender: &Sender<RolloutRecord>) -> usize {
        let mut sent = 0;
        let mut leaves = 0;
        for _ in 0..quota {
            let record = self.generate_rollout(roots);
            leaves += record.len();
            if sender.send(record).is_err() {
                break;
            }
            sent += 1;
        }
        let stats = self.evaluator.cache_stats();
        debug!(
            "worker {}: {} rollouts, {} leaves, eval cache hit rate {:.1}%, tt occupancy {:.1}%",
            self.id,
            sent,
            leaves,
            stats.hit_rate() * 100.0,
            self.tt.occupancy() * 100.0
        );
        sent
    }
}

/// ロールアウト数をワーカーに分配する
///
/// 先頭のワーカーから余りを1本ずつ多く受け持つ。合計は常に `total`。
pub fn split_quota(total: usize, workers: usize) -> Vec<usize> {
    let workers = workers.max(1);
    let base = total / workers;
    let extra = total % workers;
    (0..workers).map(|w| base + usize::from(w < extra)).collect()
}
