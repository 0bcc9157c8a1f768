//! ノード予算制限付き探索
//!
//! ノード予算を子ノードに均等配分するアルファベータ探索。
//! 予算を段階的に増やす反復深化で、置換表の最善手を手順付けに再利用する。
//! 学習ループからは`search_node_limited`のみを使う。
//!
//! 探索側の補助状態（キラー手、カウンター手、履歴）は`SearchHeuristics`にまとめ、
//! ワーカーごとに保持してロールアウト間で引き継ぐ。

use crate::board::Position;
use crate::evaluator::Evaluator;
use crate::score::{SCORE_MAX, SCORE_MIN, Score};
use crate::tt::{Bound, NodeBudget, TranspositionTable};

/// 最大探索手数（これを超えたら静的評価）
pub const MAX_PLY: usize = 64;

/// 反復深化の初期予算
const INITIAL_BUDGET: NodeBudget = 1;

/// 反復深化の予算倍率
const BUDGET_GROWTH: NodeBudget = 4;

/// 手順付けの優先度
const HASH_MOVE_PRIORITY: i64 = 1 << 40;
const KILLER_PRIORITY: [i64; 2] = [1 << 39, 1 << 38];
const COUNTER_PRIORITY: i64 = 1 << 37;

/// キラー手（手数ごとに2手）
#[derive(Clone, Debug)]
pub struct Killer<M> {
    slots: Vec<[Option<M>; 2]>,
}

impl<M: Copy + Eq> Killer<M> {
    /// 空のキラー表
    pub fn new() -> Self {
        Self {
            slots: vec![[None, None]; MAX_PLY + 1],
        }
    }

    /// カットを起こした手を記録
    pub fn notify(&mut self, ply: usize, mv: M) {
        let Some(slot) = self.slots.get_mut(ply) else {
            return;
        };
        if slot[0] != Some(mv) {
            slot[1] = slot[0];
            slot[0] = Some(mv);
        }
    }

    /// 指定手数のキラー手
    pub fn get(&self, ply: usize) -> [Option<M>; 2] {
        self.slots.get(ply).copied().unwrap_or([None, None])
    }

    /// 実戦で1手進んだので手数を1つずらす
    pub fn move_made(&mut self) {
        self.slots.remove(0);
        self.slots.push([None, None]);
    }
}

impl<M: Copy + Eq> Default for Killer<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// カウンター手（直前の手 → それに対してカットを起こした手）
#[derive(Clone, Debug)]
pub struct CounterMove<P: Position> {
    table: Vec<Option<P::Move>>,
}

impl<P: Position> CounterMove<P> {
    /// 空のカウンター表
    pub fn new() -> Self {
        Self {
            table: vec![None; P::MOVE_SLOTS],
        }
    }

    /// 記録
    pub fn update(&mut self, prev: P::Move, mv: P::Move) {
        self.table[P::move_index(prev)] = Some(mv);
    }

    /// 参照
    pub fn get(&self, prev: P::Move) -> Option<P::Move> {
        self.table[P::move_index(prev)]
    }
}

impl<P: Position> Default for CounterMove<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// 履歴ヒューリスティック（手番×着手のカット回数重み）
#[derive(Clone, Debug)]
pub struct History {
    slots: usize,
    table: Vec<i64>,
}

impl History {
    /// 着手インデックス数を指定して作成
    pub fn new(move_slots: usize) -> Self {
        Self {
            slots: move_slots,
            table: vec![0; move_slots * 2],
        }
    }

    #[inline]
    fn idx(&self, side: usize, move_index: usize) -> usize {
        side * self.slots + move_index
    }

    /// カットを起こした手を記録（予算が大きいほど重い）
    pub fn notify_cutoff(&mut self, side: usize, move_index: usize, budget: NodeBudget) {
        let weight = 64 - (budget.max(1) as u64).leading_zeros() as i64;
        let i = self.idx(side, move_index);
        self.table[i] += weight * weight;
    }

    /// 重み
    pub fn score(&self, side: usize, move_index: usize) -> i64 {
        self.table[self.idx(side, move_index)]
    }

    /// 実戦で1手進んだので重みを減衰させる
    pub fn notify_move_made(&mut self) {
        for v in self.table.iter_mut() {
            *v /= 2;
        }
    }
}

/// ワーカーごとに保持する探索補助状態
#[derive(Clone, Debug)]
pub struct SearchHeuristics<P: Position> {
    /// キラー手
    pub killer: Killer<P::Move>,
    /// カウンター手
    pub counter: CounterMove<P>,
    /// 履歴
    pub history: History,
}

impl<P: Position> SearchHeuristics<P> {
    /// 空の状態
    pub fn new() -> Self {
        Self {
            killer: Killer::new(),
            counter: CounterMove::new(),
            history: History::new(P::MOVE_SLOTS),
        }
    }

    /// 実戦で1手進んだときの軽い減衰
    pub fn move_made(&mut self) {
        self.killer.move_made();
        self.history.notify_move_made();
    }
}

impl<P: Position> Default for SearchHeuristics<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// 探索結果
#[derive(Clone, Debug)]
pub struct SearchResult<M> {
    /// 読み筋（空の場合あり）
    pub pv: Vec<M>,
    /// 評価値（ルート手番視点）
    pub score: Score,
    /// 探索ノード数
    pub nodes: u64,
}

/// 探索コンテキスト
struct Searcher<'a, P: Position, E: Evaluator<P>> {
    evaluator: &'a mut E,
    heuristics: &'a mut SearchHeuristics<P>,
    tt: &'a mut TranspositionTable<P>,
    nodes: u64,
}

impl<P: Position, E: Evaluator<P>> Searcher<'_, P, E> {
    /// 静的評価（手番視点）
    fn static_eval(&mut self, pos: &P, alpha: Score, beta: Score) -> Score {
        let sign = pos.side_to_move().white_sign();
        let (lower, upper) = if sign > 0 {
            (alpha, beta)
        } else {
            (-beta, -alpha)
        };
        self.evaluator.evaluate_for_white(pos, lower, upper) * sign
    }

    /// 手順付け
    fn order_moves(
        &self,
        pos: &P,
        moves: &mut [P::Move],
        hash_move: Option<P::Move>,
        ply: usize,
        prev: Option<P::Move>,
    ) {
        let side = pos.side_to_move() as usize;
        let killers = self.heuristics.killer.get(ply);
        let counter = prev.and_then(|p| self.heuristics.counter.get(p));

        moves.sort_by_cached_key(|&mv| {
            let priority = if Some(mv) == hash_move {
                HASH_MOVE_PRIORITY
            } else if Some(mv) == killers[0] {
                KILLER_PRIORITY[0]
            } else if Some(mv) == killers[1] {
                KILLER_PRIORITY[1]
            } else if Some(mv) == counter {
                COUNTER_PRIORITY
            } else {
                self.heuristics.history.score(side, P::move_index(mv))
            };
            std::cmp::Reverse(priority)
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn negamax(
        &mut self,
        pos: &P,
        budget: NodeBudget,
        mut alpha: Score,
        beta: Score,
        ply: usize,
        prev: Option<P::Move>,
        pv: &mut Vec<P::Move>,
    ) -> Score {
        self.nodes += 1;
        pv.clear();

        // 終局
        if let Some(white) = pos.decided_score_for_white() {
            return white * pos.side_to_move().white_sign();
        }

        // 予算切れ → 静的評価
        if budget < 1 || ply >= MAX_PLY {
            return self.static_eval(pos, alpha, beta);
        }

        // 子ノードに1以上を配れない予算は末端として扱う（総ノード数 <= 予算）
        let mut moves = pos.legal_moves();
        debug_assert!(!moves.is_empty(), "ongoing position without moves");
        if budget <= moves.len() as NodeBudget {
            return self.static_eval(pos, alpha, beta);
        }

        // 置換表（ルートでは打ち切らない。窓の外に出る境界のみ使う）
        let mut hash_move = None;
        if let Some(entry) = self.tt.probe(pos.fingerprint()).copied() {
            hash_move = entry.best_move;
            if ply > 0 && entry.node_budget >= budget {
                let s = entry.score;
                let cutoff = match entry.kind {
                    Bound::Exact => s >= beta || s <= alpha,
                    Bound::Lower => s >= beta,
                    Bound::Upper => s <= alpha,
                };
                if cutoff {
                    return s;
                }
            }
        }

        self.order_moves(pos, &mut moves, hash_move, ply, prev);

        let child_budget = (budget - 1) / moves.len() as NodeBudget;
        let alpha_orig = alpha;
        let mut best = SCORE_MIN;
        let mut best_move = None;
        let mut child_pv = Vec::new();

        for &mv in &moves {
            let mut child = pos.clone();
            child.apply_move(mv);
            self.tt.prefetch(child.fingerprint());

            let score = -self.negamax(&child, child_budget, -beta, -alpha, ply + 1, Some(mv), &mut child_pv);

            if score > best || best_move.is_none() {
                best = score;
                best_move = Some(mv);
            }
            if score > alpha {
                alpha = score;
                pv.clear();
                pv.push(mv);
                pv.extend_from_slice(&child_pv);
            }
            if alpha >= beta {
                let side = pos.side_to_move() as usize;
                self.heuristics.killer.notify(ply, mv);
                self.heuristics
                    .history
                    .notify_cutoff(side, P::move_index(mv), budget);
                if let Some(p) = prev {
                    self.heuristics.counter.update(p, mv);
                }
                break;
            }
        }

        let kind = if best <= alpha_orig {
            Bound::Upper
        } else if best >= beta {
            Bound::Lower
        } else {
            Bound::Exact
        };
        self.tt.store(pos, best_move, best, budget, kind);

        best
    }
}

/// ノード予算制限付き探索
///
/// # Arguments
///
/// * `pos` - ルート局面
/// * `node_budget` - ノード予算（0以下ならルートの静的評価のみ）
/// * `evaluator` - 評価関数（ワーカー専用のスナップショット）
/// * `heuristics` - ワーカー専用の探索補助状態
/// * `tt` - ワーカー専用の置換表
///
/// # Returns
///
/// 読み筋とルート手番視点の評価値。ルートが終局、または予算が0以下のとき読み筋は空。
pub fn search_node_limited<P, E>(
    pos: &P,
    node_budget: NodeBudget,
    evaluator: &mut E,
    heuristics: &mut SearchHeuristics<P>,
    tt: &mut TranspositionTable<P>,
) -> SearchResult<P::Move>
where
    P: Position,
    E: Evaluator<P>,
{
    let mut searcher = Searcher {
        evaluator,
        heuristics,
        tt,
        nodes: 0,
    };

    let mut pv = Vec::new();
    let mut budget = INITIAL_BUDGET.min(node_budget);
    let score = loop {
        let score = searcher.negamax(pos, budget, SCORE_MIN, SCORE_MAX, 0, None, &mut pv);
        if budget >= node_budget {
            break score;
        }
        budget = budget.saturating_mul(BUDGET_GROWTH).min(node_budget);
    };

    SearchResult {
        pv,
        score,
        nodes: searcher.nodes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{BitBoard, Color, GameStatus, OthelloMove};
    use crate::evaluator::MaterialEvaluator;

    fn run(pos: &BitBoard, budget: NodeBudget) -> SearchResult<OthelloMove> {
        let mut eval = MaterialEvaluator::default();
        let mut heur = SearchHeuristics::new();
        let mut tt = TranspositionTable::new(4096);
        search_node_limited(pos, budget, &mut eval, &mut heur, &mut tt)
    }

    #[test]
    fn test_zero_budget_returns_static_eval() {
        let board = BitBoard::new();
        let result = run(&board, 0);
        assert!(result.pv.is_empty());
        assert_eq!(result.score, 0);
        assert_eq!(result.nodes, 1);
    }

    #[test]
    fn test_pv_is_legal_and_score_matches_leaf() {
        let board = BitBoard::new();
        let result = run(&board, 256);
        assert!(!result.pv.is_empty());

        // 読み筋は合法手の列
        let mut leaf = board;
        for &mv in &result.pv {
            assert!(leaf.legal_moves().contains(&mv));
            leaf.apply_move(mv);
        }

        // 読み筋の末端の静的評価がルートの評価値と一致する
        let mut eval = MaterialEvaluator::default();
        let white = eval.evaluate_for_white(&leaf, SCORE_MIN, SCORE_MAX);
        assert_eq!(white, result.score * board.side_to_move().white_sign());
    }

    #[test]
    fn test_terminal_root_has_empty_pv() {
        let board = BitBoard::from_masks(u64::MAX, 0, Color::White);
        assert_eq!(board.status(), GameStatus::BlackWins);
        let result = run(&board, 64);
        assert!(result.pv.is_empty());
        // 白番視点で負け
        assert!(result.score < 0);
    }

    #[test]
    fn test_node_count_is_bounded() {
        let board = BitBoard::new();
        let result = run(&board, 100);
        // 各反復は予算以下、反復深化の合計でも予算の3倍以内
        assert!(result.nodes <= 100 * 3, "nodes = {}", result.nodes);
    }

    #[test]
    fn test_killer_move_made_shifts() {
        let mut killer = Killer::<u8>::new();
        killer.notify(1, 7);
        killer.notify(1, 9);
        assert_eq!(killer.get(1), [Some(9), Some(7)]);
        killer.move_made();
        assert_eq!(killer.get(0), [Some(9), Some(7)]);
        assert_eq!(killer.get(1), [None, None]);
    }

    #[test]
    fn test_history_decay() {
        let mut history = History::new(65);
        history.notify_cutoff(0, 3, 16);
        let before = history.score(0, 3);
        assert!(before > 0);
        history.notify_move_made();
        assert_eq!(history.score(0, 3), before / 2);
        assert_eq!(history.score(1, 3), 0);
    }

    #[test]
    fn test_counter_move() {
        let mut counter = CounterMove::<BitBoard>::new();
        counter.update(OthelloMove::square(19), OthelloMove::square(18));
        assert_eq!(
            counter.get(OthelloMove::square(19)),
            Some(OthelloMove::square(18))
        );
        assert_eq!(counter.get(OthelloMove::PASS), None);
    }

    #[test]
    fn test_search_stores_into_table() {
        let board = BitBoard::new();
        let mut eval = MaterialEvaluator::default();
        let mut heur = SearchHeuristics::new();
        let mut tt = TranspositionTable::new(4096);
        let result = search_node_limited(&board, 64, &mut eval, &mut heur, &mut tt);
        let entry = tt.peek(board.fingerprint()).copied().unwrap();
        assert_eq!(entry.score, result.score);
        assert_eq!(entry.best_move, result.pv.first().copied());
    }
}
