//! 評価関数と評価キャッシュ
//!
//! 探索は [`Evaluator`] トレイト越しに静的評価を呼び出す。
//! [`EvalCache`] は値ネットワークの出力を局面のフィンガープリントで
//! 直接マップ方式にメモ化する。

use std::marker::PhantomData;
use std::mem::size_of;

use crate::board::Position;
use crate::features::FeatureConverter;
use crate::network::ValueModel;
use crate::score::{EVAL_LIMIT, Score, scale};

/// 静的評価関数
///
/// スコアは常に白番視点。`lower`/`upper` は探索窓のヒントであり、
/// 実装はこれを無視してよい。
pub trait Evaluator<P: Position> {
    fn evaluate_for_white(&mut self, pos: &P, lower: Score, upper: Score) -> Score;
}

/// 石差1あたりの評価値
pub const MATERIAL_UNIT: Score = EVAL_LIMIT / 64;

/// 石差のみで評価する評価関数
///
/// ブートストラップ学習の教師として使う。
#[derive(Debug, Clone, Copy, Default)]
pub struct MaterialEvaluator;

impl MaterialEvaluator {
    /// 白番視点の石差評価
    #[inline]
    pub fn material_score<P: Position>(pos: &P) -> Score {
        (pos.material_balance() * MATERIAL_UNIT).clamp(-EVAL_LIMIT, EVAL_LIMIT)
    }
}

impl<P: Position> Evaluator<P> for MaterialEvaluator {
    fn evaluate_for_white(&mut self, pos: &P, _lower: Score, _upper: Score) -> Score {
        Self::material_score(pos)
    }
}

/// キャッシュスロット
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EvalSlot {
    fingerprint: u64,
    score: Score,
}

/// キャッシュの統計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub probes: u64,
    pub hits: u64,
}

impl CacheStats {
    /// ヒット率（プローブ0回なら0.0）
    pub fn hit_rate(&self) -> f64 {
        if self.probes == 0 {
            0.0
        } else {
            self.hits as f64 / self.probes as f64
        }
    }
}

/// 直接マップ方式の評価キャッシュ
///
/// # 不変条件
///
/// - ヒット時はキャッシュ済みの値をそのまま返す（`lower`/`upper` は無関係）
/// - ミス時はスロットを無条件に上書きする（世代・置換判定なし）
///
/// 並行利用は想定しない。ワーカーごとに [`EvalCache::snapshot`] で
/// 重みのコピーと空のキャッシュを持たせる。
#[derive(Debug)]
pub struct EvalCache<P, F, M> {
    model: M,
    features: F,
    slots: Vec<Option<EvalSlot>>,
    buf: Vec<f32>,
    stats: CacheStats,
    _position: PhantomData<fn(&P)>,
}

impl<P, F, M> EvalCache<P, F, M>
where
    P: Position,
    F: FeatureConverter<P>,
    M: ValueModel,
{
    /// スロット数を指定して作成（最低1スロット）
    pub fn new(model: M, features: F, slots: usize) -> Self {
        debug_assert_eq!(model.num_inputs(), features.num_features());
        Self {
            model,
            buf: Vec::with_capacity(features.num_features()),
            features,
            slots: vec![None; slots.max(1)],
            stats: CacheStats::default(),
            _position: PhantomData,
        }
    }

    /// バイト数からスロット数を決めて作成
    pub fn with_size_bytes(model: M, features: F, bytes: usize) -> Self {
        Self::new(model, features, bytes / size_of::<Option<EvalSlot>>())
    }

    /// 保持しているモデル
    pub fn model(&self) -> &M {
        &self.model
    }

    /// モデルへの可変参照
    ///
    /// バッチ学習はキャッシュを経由せずに重みを直接更新する。
    /// 更新後のキャッシュ内容は古くなるので、必要なら
    /// [`EvalCache::clear_cache`] を呼ぶこと。
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn features(&self) -> &F {
        &self.features
    }

    /// 重みのコピーと空のキャッシュを持つ独立したインスタンス
    pub fn snapshot(&self) -> Self {
        Self::new(self.model.clone(), self.features.clone(), self.slots.len())
    }

    /// 全スロットを空にする
    pub fn clear_cache(&mut self) {
        self.slots.fill(None);
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.stats
    }

    #[inline]
    fn index(&self, fingerprint: u64) -> usize {
        (fingerprint % self.slots.len() as u64) as usize
    }
}

impl<P, F, M> Evaluator<P> for EvalCache<P, F, M>
where
    P: Position,
    F: FeatureConverter<P>,
    M: ValueModel,
{
    fn evaluate_for_white(&mut self, pos: &P, _lower: Score, _upper: Score) -> Score {
        let fingerprint = pos.fingerprint();
        let idx = self.index(fingerprint);
        self.stats.probes += 1;

        if let Some(slot) = self.slots[idx].filter(|s| s.fingerprint == fingerprint) {
            self.stats.hits += 1;
            return slot.score;
        }

        self.features.convert_into(pos, &mut self.buf);
        let score = scale(self.model.forward_single(&self.buf));
        self.slots[idx] = Some(EvalSlot { fingerprint, score });
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::BitBoard;
    use crate::features::{OTHELLO_NUM_FEATURES, OthelloFeatures};
    use crate::network::ValueNetwork;
    use crate::score::{SCORE_MAX, SCORE_MIN};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    type Cache = EvalCache<BitBoard, OthelloFeatures, ValueNetwork>;

    fn cache(slots: usize) -> Cache {
        let mut rng = StdRng::seed_from_u64(11);
        let net = ValueNetwork::new(OTHELLO_NUM_FEATURES, 8, 0.01, &mut rng);
        EvalCache::new(net, OthelloFeatures, slots)
    }

    fn positions(n: usize) -> Vec<BitBoard> {
        let mut out = vec![BitBoard::new()];
        let mut pos = BitBoard::new();
        while out.len() < n {
            let moves = pos.legal_moves();
            pos.apply_move(moves[out.len() % moves.len()]);
            out.push(pos);
        }
        out
    }

    #[test]
    fn test_material_evaluator_initial_is_zero() {
        let mut eval = MaterialEvaluator;
        assert_eq!(eval.evaluate_for_white(&BitBoard::new(), SCORE_MIN, SCORE_MAX), 0);
    }

    #[test]
    fn test_material_evaluator_sign() {
        // 白が多い局面は正
        let pos = BitBoard::from_masks(0b1, 0b1110, crate::board::Color::Black);
        assert_eq!(MaterialEvaluator::material_score(&pos), 2 * MATERIAL_UNIT);
    }

    #[test]
    fn test_idempotent_across_bounds() {
        let mut c = cache(1024);
        let pos = positions(3)[2];
        let first = c.evaluate_for_white(&pos, SCORE_MIN, SCORE_MAX);
        let second = c.evaluate_for_white(&pos, -5, 5);
        let third = c.evaluate_for_white(&pos, 100, 101);
        assert_eq!(first, second);
        assert_eq!(first, third);
        assert_eq!(c.cache_stats(), CacheStats { probes: 3, hits: 2 });
    }

    #[test]
    fn test_hit_returns_cached_value_even_if_model_changed() {
        let mut c = cache(1024);
        let pos = BitBoard::new();
        let before = c.evaluate_for_white(&pos, SCORE_MIN, SCORE_MAX);
        *c.model_mut() = {
            let mut rng = StdRng::seed_from_u64(99);
            ValueNetwork::new(OTHELLO_NUM_FEATURES, 8, 0.01, &mut rng)
        };
        assert_eq!(c.evaluate_for_white(&pos, SCORE_MIN, SCORE_MAX), before);
        c.clear_cache();
        let fresh = scale(c.model().forward_single(&OthelloFeatures.convert(&pos)));
        assert_eq!(c.evaluate_for_white(&pos, SCORE_MIN, SCORE_MAX), fresh);
    }

    #[test]
    fn test_distinct_slots_do_not_interfere() {
        let slots = 1 << 16;
        let mut c = cache(slots);
        let all = positions(12);

        // 異なるスロットに落ちる2局面を選ぶ
        let a = all[0];
        let b = all
            .iter()
            .copied()
            .find(|p| {
                p.fingerprint() != a.fingerprint()
                    && p.fingerprint() % slots as u64 != a.fingerprint() % slots as u64
            })
            .unwrap();

        let score_a = c.evaluate_for_white(&a, SCORE_MIN, SCORE_MAX);
        let score_b = c.evaluate_for_white(&b, SCORE_MIN, SCORE_MAX);
        let hits_before = c.cache_stats().hits;
        assert_eq!(c.evaluate_for_white(&a, SCORE_MIN, SCORE_MAX), score_a);
        assert_eq!(c.evaluate_for_white(&b, SCORE_MIN, SCORE_MAX), score_b);
        assert_eq!(c.cache_stats().hits, hits_before + 2);
    }

    #[test]
    fn test_collision_overwrites_slot() {
        // 1スロットなら後勝ち
        let mut c = cache(1);
        let all = positions(2);
        c.evaluate_for_white(&all[0], SCORE_MIN, SCORE_MAX);
        c.evaluate_for_white(&all[1], SCORE_MIN, SCORE_MAX);
        c.evaluate_for_white(&all[0], SCORE_MIN, SCORE_MAX);
        assert_eq!(c.cache_stats().hits, 0);
        c.evaluate_for_white(&all[0], SCORE_MIN, SCORE_MAX);
        assert_eq!(c.cache_stats().hits, 1);
    }

    #[test]
    fn test_snapshot_has_empty_cache_and_same_weights() {
        let mut c = cache(64);
        let pos = BitBoard::new();
        let score = c.evaluate_for_white(&pos, SCORE_MIN, SCORE_MAX);

        let mut snap = c.snapshot();
        assert_eq!(snap.cache_stats(), CacheStats::default());
        assert_eq!(snap.slot_count(), 64);
        assert_eq!(snap.evaluate_for_white(&pos, SCORE_MIN, SCORE_MAX), score);
        assert_eq!(snap.cache_stats().hits, 0);
    }

    #[test]
    fn test_with_size_bytes_at_least_one_slot() {
        let mut rng = StdRng::seed_from_u64(1);
        let net = ValueNetwork::new(OTHELLO_NUM_FEATURES, 4, 0.01, &mut rng);
        let c: Cache = EvalCache::with_size_bytes(net, OthelloFeatures, 0);
        assert_eq!(c.slot_count(), 1);
    }
}
